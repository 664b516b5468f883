//! Command framing
//!
//! A command envelope is the unit of replication. It is encoded on the
//! submitting node, carried through consensus as opaque bytes, and decoded
//! again on every node that learns it.
//!
//! Wire layout (little-endian):
//!
//! ```text
//! [kind: u16][length: u32][payload ...]
//! ```
//!
//! How the payload bytes are laid out depends on the [`FramePolicy`]:
//! `Exact` writes `length` raw bytes, `NulTerminated` reproduces the legacy
//! text-terminated stream.
//!
//! The kind travels inside the frame. The legacy stream is `[length][payload]`
//! only, with the kind carried by the outer message header; these frames are
//! therefore not byte-compatible with it, under either policy. The in-frame
//! kind lets a learner reject a foreign frame without any outer header.

mod errors;
mod frame;

pub use errors::{FrameError, FrameResult};
pub use frame::{CommandCodec, CommandEnvelope, CommandKind, FramePolicy, FRAME_HEADER_LEN};
