//! Byte channels and wire framing between a sender and a receiver.
//!
//! A transfer runs over one duplex [`Channel`] with two logical directions:
//! the *request* direction (sender → receiver) carries the manifest and chunk
//! bytes, the *response* direction (receiver → sender) carries control flags
//! and chunk requests.
//!
//! - [`Channel`]: a closed set of transports (named FIFOs, TCP, in-process
//!   memory pipes) behind the common [`Transport`] capability.
//! - [`write_frame`] / [`read_frame`]: fixed-width ASCII decimal length
//!   followed by the payload, bounded by [`MAX_FRAME_SIZE`].
//! - [`ControlFlag`]: continue/stop marker preceding every response-direction
//!   message.
//! - [`ChunkRequest`]: the JSON request for one chunk.

mod channel;
mod error;
mod frame;
mod message;

#[cfg(unix)]
pub use channel::FifoChannel;
pub use channel::{Channel, ChannelKind, MemoryChannel, REQUEST_FIFO, RESPONSE_FIFO, Role, TcpChannel};
pub use error::NetError;
pub use frame::{
    ControlFlag, FIELD_WIDTH, MAX_FRAME_SIZE, read_field, read_flag, read_frame, write_field,
    write_flag, write_frame,
};
pub use message::{ChunkRequest, recv_request, send_request};

/// Blocking byte transport shared by every channel variant.
///
/// Each endpoint reads from its inbound direction and writes to its outbound
/// direction. Reads and writes are all-or-error.
pub trait Transport: Send {
    /// Fill `buf` completely from the inbound direction.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError>;

    /// Write all of `buf` to the outbound direction.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError>;

    /// Release the underlying handles. Later reads and writes fail with
    /// [`NetError::Closed`].
    fn close(&mut self) -> Result<(), NetError>;
}
