//! RPC framing

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::{RpcError, RpcResult};
use super::ServiceId;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Status byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    /// Request handled
    Ok = 0,
    /// No service registered under the requested id
    UnknownService = 1,
}

/// Encode a request frame.
pub(crate) fn encode_request(service: ServiceId, body: &[u8]) -> RpcResult<Vec<u8>> {
    let len = body.len() + 4;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    frame.extend_from_slice(&service.to_le_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Read one request. `None` when the peer closed the connection between
/// requests.
pub(super) async fn read_request<R>(reader: &mut R) -> RpcResult<Option<(ServiceId, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(RpcError::Io(e)),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }
    if len < 4 {
        return Err(RpcError::Malformed(format!("request length {} below header", len)));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    let service = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    frame.drain(..4);
    Ok(Some((service, frame)))
}

/// Write one response.
pub(super) async fn write_response<W>(
    writer: &mut W,
    status: ResponseStatus,
    body: &[u8],
) -> RpcResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = body.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    frame.push(status as u8);
    frame.extend_from_slice(body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Blocking one-shot call: connect, send one request, read the response.
pub fn call(address: SocketAddr, service: ServiceId, body: &[u8]) -> RpcResult<Vec<u8>> {
    let mut stream = TcpStream::connect(address)?;
    stream.write_all(&encode_request(service, body)?)?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(RpcError::Malformed(format!("response length {}", len)));
    }

    let mut frame = vec![0u8; len];
    stream.read_exact(&mut frame)?;
    match frame[0] {
        0 => Ok(frame.split_off(1)),
        status => Err(RpcError::Status { service, status }),
    }
}
