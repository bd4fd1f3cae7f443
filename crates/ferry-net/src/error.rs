//! Error types for channel and framing operations.

/// Errors that can occur while moving bytes across a channel.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// An I/O error on the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer hung up, or the channel was closed locally.
    #[error("channel closed")]
    Closed,

    /// A read or write exceeded the configured timeout.
    #[error("channel timed out")]
    Timeout,

    /// A frame announced (or tried to send) more bytes than allowed.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u64, max: usize },

    /// Zero-length frames are never valid.
    #[error("empty frame")]
    EmptyFrame,

    /// A fixed-width numeric field did not hold a decimal number.
    #[error("malformed numeric field: {0}")]
    MalformedField(String),

    /// A frame buffer could not be allocated.
    #[error("failed to allocate a {0}-byte frame buffer")]
    Allocation(usize),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl NetError {
    /// Classify an I/O error from a blocking read or write.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                NetError::Closed
            }
            ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::Timeout,
            _ => NetError::Io(err),
        }
    }
}
