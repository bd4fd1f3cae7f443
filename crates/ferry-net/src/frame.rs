//! Fixed-width decimal fields, length-prefixed frames, and control flags.
//!
//! Every numeric field on the wire is ASCII decimal, NUL-padded to
//! [`FIELD_WIDTH`] bytes. A frame is a length field followed by exactly that
//! many payload bytes.

use tracing::trace;

use crate::Transport;
use crate::error::NetError;

/// Width of every numeric field on the wire.
pub const FIELD_WIDTH: usize = 128;

/// Largest payload a frame may carry: 64 MiB.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Marker sent by the receiver before every response-direction message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlag {
    /// A chunk request follows.
    Continue,
    /// The receiver needs nothing more; the session is over.
    Stop,
}

impl ControlFlag {
    fn code(self) -> u64 {
        match self {
            ControlFlag::Continue => 0,
            ControlFlag::Stop => 1,
        }
    }
}

/// Write `value` as a NUL-padded decimal field.
pub fn write_field<T: Transport + ?Sized>(channel: &mut T, value: u64) -> Result<(), NetError> {
    let mut field = [0u8; FIELD_WIDTH];
    let digits = value.to_string();
    field[..digits.len()].copy_from_slice(digits.as_bytes());
    channel.write_all(&field)
}

/// Read one NUL-padded decimal field.
pub fn read_field<T: Transport + ?Sized>(channel: &mut T) -> Result<u64, NetError> {
    let mut field = [0u8; FIELD_WIDTH];
    channel.read_exact(&mut field)?;
    parse_field(&field)
}

fn parse_field(field: &[u8]) -> Result<u64, NetError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let (digits, padding) = field.split_at(end);
    if digits.is_empty()
        || !digits.iter().all(u8::is_ascii_digit)
        || padding.iter().any(|&b| b != 0)
    {
        let shown = String::from_utf8_lossy(&digits[..digits.len().min(32)]).into_owned();
        return Err(NetError::MalformedField(shown));
    }
    // Only ASCII digits remain, so the sole failure mode is overflow.
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NetError::MalformedField("value exceeds 64 bits".into()))
}

fn check_len(len: u64) -> Result<usize, NetError> {
    if len == 0 {
        return Err(NetError::EmptyFrame);
    }
    usize::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_FRAME_SIZE)
        .ok_or(NetError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        })
}

/// Send a length-prefixed frame. Empty or oversized payloads are refused.
pub fn write_frame<T: Transport + ?Sized>(channel: &mut T, payload: &[u8]) -> Result<(), NetError> {
    check_len(payload.len() as u64)?;
    write_field(channel, payload.len() as u64)?;
    channel.write_all(payload)?;
    trace!(len = payload.len(), "wrote frame");
    Ok(())
}

/// Receive a length-prefixed frame, validating the announced length first.
pub fn read_frame<T: Transport + ?Sized>(channel: &mut T) -> Result<Vec<u8>, NetError> {
    let len = check_len(read_field(channel)?)?;
    let mut payload = Vec::new();
    payload
        .try_reserve_exact(len)
        .map_err(|_| NetError::Allocation(len))?;
    payload.resize(len, 0);
    channel.read_exact(&mut payload)?;
    trace!(len, "read frame");
    Ok(payload)
}

pub fn write_flag<T: Transport + ?Sized>(channel: &mut T, flag: ControlFlag) -> Result<(), NetError> {
    write_field(channel, flag.code())
}

/// Read a control flag. Zero means continue; any other value means stop.
pub fn read_flag<T: Transport + ?Sized>(channel: &mut T) -> Result<ControlFlag, NetError> {
    Ok(match read_field(channel)? {
        0 => ControlFlag::Continue,
        _ => ControlFlag::Stop,
    })
}
