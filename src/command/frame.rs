//! Command envelope and its codec
//!
//! The envelope is a closed tagged type: every kind this layer understands
//! is a [`CommandKind`] variant, and an unknown discriminator is rejected at
//! decode time before any payload byte is read.
//!
//! # Fidelity policy
//!
//! Legacy streams were produced by treating the payload as a C string: the
//! encoder wrote the bytes up to the first zero byte plus a terminator, and
//! the decoder scanned to that terminator. A payload with an embedded zero
//! byte is therefore truncated at the zero. [`FramePolicy::NulTerminated`]
//! keeps that behavior for byte compatibility with existing streams;
//! [`FramePolicy::Exact`] writes and reads exactly `length` raw bytes and is
//! the default. The two layouts are not interchangeable: a stream must be
//! read with the policy it was written with.

use std::io::{self, Cursor, Read, Write};

use serde::{Deserialize, Serialize};

use super::errors::{FrameError, FrameResult};

/// Size of the fixed header: kind (u16) + length (u32).
pub const FRAME_HEADER_LEN: usize = 6;

/// Most payload bytes reserved before any arrive. A header can claim up
/// to 4 GiB; buffers grow with the bytes actually read.
const INITIAL_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Command kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandKind {
    /// Opaque application command carried through the log
    Container = 3,
}

impl CommandKind {
    /// Convert from the wire discriminator, `None` for unknown values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            3 => Some(CommandKind::Container),
            _ => None,
        }
    }

    /// Wire discriminator.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Payload layout on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePolicy {
    /// `length` raw bytes, zero bytes preserved
    #[default]
    Exact,
    /// Legacy layout: bytes up to the first zero, then a zero terminator
    NulTerminated,
}

/// A command as it travels through the replicated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    kind: CommandKind,
    payload: Vec<u8>,
}

impl CommandEnvelope {
    /// Wrap an application payload as a container command.
    pub fn container(payload: Vec<u8>) -> Self {
        Self {
            kind: CommandKind::Container,
            payload,
        }
    }

    /// Copy caller-supplied bytes into a new container command.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::container(bytes.to_vec())
    }

    /// Kind discriminator.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Payload length in bytes. Always equal to `payload().len()`.
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Borrowed view of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Encoder/decoder bound to one [`FramePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandCodec {
    policy: FramePolicy,
}

impl CommandCodec {
    /// Create a codec for the given policy.
    pub fn new(policy: FramePolicy) -> Self {
        Self { policy }
    }

    /// Policy this codec writes and expects.
    pub fn policy(&self) -> FramePolicy {
        self.policy
    }

    /// Encode an envelope into a fresh buffer.
    pub fn encode(&self, envelope: &CommandEnvelope) -> FrameResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + envelope.length() + 1);
        self.write_to(envelope, &mut buf)?;
        Ok(buf)
    }

    /// Write an envelope to a stream.
    pub fn write_to<W: Write>(&self, envelope: &CommandEnvelope, writer: &mut W) -> FrameResult<()> {
        let length = u32::try_from(envelope.length())
            .map_err(|_| FrameError::PayloadTooLarge(envelope.length()))?;

        writer.write_all(&envelope.kind.as_u16().to_le_bytes())?;
        writer.write_all(&length.to_le_bytes())?;

        match self.policy {
            FramePolicy::Exact => writer.write_all(envelope.payload())?,
            FramePolicy::NulTerminated => {
                let payload = envelope.payload();
                let text_len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                writer.write_all(&payload[..text_len])?;
                writer.write_all(&[0])?;
            }
        }

        Ok(())
    }

    /// Decode an envelope from a byte slice.
    ///
    /// Trailing bytes after the frame are ignored.
    pub fn decode(&self, bytes: &[u8]) -> FrameResult<CommandEnvelope> {
        self.read_from(&mut Cursor::new(bytes))
    }

    /// Read one envelope from a stream.
    pub fn read_from<R: Read>(&self, reader: &mut R) -> FrameResult<CommandEnvelope> {
        let mut kind_buf = [0u8; 2];
        read_full(reader, &mut kind_buf)?;
        let raw_kind = u16::from_le_bytes(kind_buf);
        let kind = CommandKind::from_u16(raw_kind).ok_or(FrameError::UnknownKind(raw_kind))?;

        let mut len_buf = [0u8; 4];
        read_full(reader, &mut len_buf)?;
        let length = u32::from_le_bytes(len_buf) as usize;

        let payload = match self.policy {
            FramePolicy::Exact => read_exact_payload(reader, length)?,
            FramePolicy::NulTerminated => read_terminated(reader, length)?,
        };

        Ok(CommandEnvelope { kind, payload })
    }
}

/// Fill `buf` completely, reporting how far the stream got on EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> FrameResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: buf.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(())
}

/// Read `length` payload bytes, or report how many the stream had.
fn read_exact_payload<R: Read>(reader: &mut R, length: usize) -> FrameResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(length.min(INITIAL_PAYLOAD_CAPACITY));
    reader.by_ref().take(length as u64).read_to_end(&mut payload)?;
    if payload.len() < length {
        return Err(FrameError::Truncated {
            expected: length,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

/// Scan to the zero terminator. A well-formed legacy frame never carries
/// more than `length` text bytes, so the scan is bounded by `length + 1`.
fn read_terminated<R: Read>(reader: &mut R, length: usize) -> FrameResult<Vec<u8>> {
    let mut text = Vec::with_capacity(length.min(INITIAL_PAYLOAD_CAPACITY));
    let mut byte = [0u8; 1];
    loop {
        if text.len() > length {
            return Err(FrameError::Truncated {
                expected: length + 1,
                actual: text.len(),
            });
        }
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: length + 1,
                    actual: text.len(),
                })
            }
            Ok(_) if byte[0] == 0 => return Ok(text),
            Ok(_) => text.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> CommandCodec {
        CommandCodec::new(FramePolicy::Exact)
    }

    fn legacy() -> CommandCodec {
        CommandCodec::new(FramePolicy::NulTerminated)
    }

    #[test]
    fn test_kind_discriminator() {
        assert_eq!(CommandKind::from_u16(3), Some(CommandKind::Container));
        assert_eq!(CommandKind::from_u16(0), None);
        assert_eq!(CommandKind::Container.as_u16(), 3);
    }

    #[test]
    fn test_exact_layout() {
        let bytes = exact().encode(&CommandEnvelope::from_slice(b"hi")).unwrap();
        assert_eq!(bytes, vec![3, 0, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_legacy_layout_appends_terminator() {
        let bytes = legacy().encode(&CommandEnvelope::from_slice(b"hi")).unwrap();
        assert_eq!(bytes, vec![3, 0, 2, 0, 0, 0, b'h', b'i', 0]);
    }

    #[test]
    fn test_roundtrip_without_zero_bytes() {
        let envelope = CommandEnvelope::from_slice(b"set x 42");
        for codec in [exact(), legacy()] {
            let decoded = codec.decode(&codec.encode(&envelope).unwrap()).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn test_exact_preserves_embedded_zero() {
        let envelope = CommandEnvelope::from_slice(b"abc\0");
        let decoded = exact().decode(&exact().encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded.payload(), b"abc\0");
        assert_eq!(decoded.length(), 4);
    }

    #[test]
    fn test_legacy_truncates_at_embedded_zero() {
        let envelope = CommandEnvelope::from_slice(b"ab\0cd");
        let bytes = legacy().encode(&envelope).unwrap();
        // Declared length still says 5
        assert_eq!(&bytes[2..6], &5u32.to_le_bytes());
        let decoded = legacy().decode(&bytes).unwrap();
        assert_eq!(decoded.payload(), b"ab");
        assert_eq!(decoded.length(), 2);
    }

    #[test]
    fn test_empty_payload() {
        let envelope = CommandEnvelope::container(Vec::new());
        for codec in [exact(), legacy()] {
            let decoded = codec.decode(&codec.encode(&envelope).unwrap()).unwrap();
            assert_eq!(decoded.length(), 0);
        }
    }

    #[test]
    fn test_oversized_length_claim_is_truncated() {
        for codec in [exact(), legacy()] {
            let header = [3, 0, 0xff, 0xff, 0xff, 0xff];
            match codec.decode(&header) {
                Err(FrameError::Truncated { expected, actual }) => {
                    assert!(expected >= u32::MAX as usize);
                    assert_eq!(actual, 0);
                }
                other => panic!("expected Truncated, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = exact().encode(&CommandEnvelope::from_slice(b"abcdef")).unwrap();
        bytes.truncate(bytes.len() - 2);
        match exact().decode(&bytes) {
            Err(FrameError::Truncated { expected, actual }) => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 4);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_header() {
        let err = exact().decode(&[3, 0, 1]).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_legacy_missing_terminator() {
        let bytes = vec![3, 0, 3, 0, 0, 0, b'a', b'b', b'c'];
        assert!(legacy().decode(&bytes).unwrap_err().is_truncated());
    }

    #[test]
    fn test_legacy_runaway_text_rejected() {
        let bytes = vec![3, 0, 1, 0, 0, 0, b'a', b'b', b'c', 0];
        assert!(legacy().decode(&bytes).unwrap_err().is_truncated());
    }

    #[test]
    fn test_unknown_kind_does_not_read_payload() {
        let bytes = vec![9, 0, 0xff, 0xff, 0xff, 0xff];
        match exact().decode(&bytes) {
            Err(FrameError::UnknownKind(9)) => {}
            other => panic!("expected UnknownKind, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_of_frames() {
        let codec = exact();
        let mut stream = Vec::new();
        codec
            .write_to(&CommandEnvelope::from_slice(b"one"), &mut stream)
            .unwrap();
        codec
            .write_to(&CommandEnvelope::from_slice(b"two"), &mut stream)
            .unwrap();

        let mut cursor = Cursor::new(stream);
        assert_eq!(codec.read_from(&mut cursor).unwrap().payload(), b"one");
        assert_eq!(codec.read_from(&mut cursor).unwrap().payload(), b"two");
        assert!(codec.read_from(&mut cursor).unwrap_err().is_truncated());
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: FramePolicy = serde_json::from_str("\"nul_terminated\"").unwrap();
        assert_eq!(policy, FramePolicy::NulTerminated);
        assert_eq!(serde_json::to_string(&FramePolicy::Exact).unwrap(), "\"exact\"");
    }
}
