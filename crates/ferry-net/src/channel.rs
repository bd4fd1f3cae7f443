//! Channel transport variants.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Transport;
use crate::error::NetError;

/// File name of the FIFO carrying the request direction (sender → receiver).
pub const REQUEST_FIFO: &str = "request";

/// File name of the FIFO carrying the response direction (receiver → sender).
pub const RESPONSE_FIFO: &str = "response";

/// Which end of a transfer an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Configured transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Fifo,
    Tcp,
}

/// One endpoint of a duplex byte channel.
pub enum Channel {
    #[cfg(unix)]
    Fifo(FifoChannel),
    Tcp(TcpChannel),
    Memory(MemoryChannel),
}

impl Channel {
    /// Two connected in-process endpoints: `(sender_end, receiver_end)`.
    pub fn memory_pair() -> (Channel, Channel) {
        let (a, b) = MemoryChannel::pair();
        (Channel::Memory(a), Channel::Memory(b))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Channel::Fifo(_) => "fifo",
            Channel::Tcp(_) => "tcp",
            Channel::Memory(_) => "memory",
        }
    }
}

impl Transport for Channel {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        match self {
            #[cfg(unix)]
            Channel::Fifo(c) => c.read_exact(buf),
            Channel::Tcp(c) => c.read_exact(buf),
            Channel::Memory(c) => c.read_exact(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
        match self {
            #[cfg(unix)]
            Channel::Fifo(c) => c.write_all(buf),
            Channel::Tcp(c) => c.write_all(buf),
            Channel::Memory(c) => c.write_all(buf),
        }
    }

    fn close(&mut self) -> Result<(), NetError> {
        match self {
            #[cfg(unix)]
            Channel::Fifo(c) => c.close(),
            Channel::Tcp(c) => c.close(),
            Channel::Memory(c) => c.close(),
        }
    }
}

// ---------------------------------------------------------------------------
// Named FIFOs
// ---------------------------------------------------------------------------

#[cfg(unix)]
pub use fifo::FifoChannel;

#[cfg(unix)]
mod fifo {
    use std::ffi::CString;
    use std::fs::{self, File, OpenOptions};
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::FileTypeExt;
    use std::path::Path;

    use tracing::debug;

    use super::{REQUEST_FIFO, RESPONSE_FIFO, Role};
    use crate::Transport;
    use crate::error::NetError;

    /// A pair of named pipes, `request` and `response`, in one directory.
    pub struct FifoChannel {
        inbound: Option<File>,
        outbound: Option<File>,
    }

    impl FifoChannel {
        /// Create the FIFOs if needed and open this role's ends.
        ///
        /// Both roles open `request` first and `response` second; each open
        /// blocks until the peer opens the other end of the same pipe.
        pub fn open(dir: &Path, role: Role) -> Result<Self, NetError> {
            let request = dir.join(REQUEST_FIFO);
            let response = dir.join(RESPONSE_FIFO);
            ensure_fifo(&request)?;
            ensure_fifo(&response)?;

            let (inbound, outbound) = match role {
                Role::Sender => {
                    let out = OpenOptions::new().write(true).open(&request)?;
                    let inp = File::open(&response)?;
                    (inp, out)
                }
                Role::Receiver => {
                    let inp = File::open(&request)?;
                    let out = OpenOptions::new().write(true).open(&response)?;
                    (inp, out)
                }
            };
            debug!(dir = %dir.display(), ?role, "opened fifo channel");
            Ok(Self {
                inbound: Some(inbound),
                outbound: Some(outbound),
            })
        }
    }

    impl Transport for FifoChannel {
        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
            let file = self.inbound.as_mut().ok_or(NetError::Closed)?;
            file.read_exact(buf).map_err(NetError::from_io)
        }

        fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
            let file = self.outbound.as_mut().ok_or(NetError::Closed)?;
            file.write_all(buf).map_err(NetError::from_io)
        }

        fn close(&mut self) -> Result<(), NetError> {
            self.outbound.take();
            self.inbound.take();
            Ok(())
        }
    }

    fn ensure_fifo(path: &Path) -> Result<(), NetError> {
        match fs::metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
            Ok(_) => {
                return Err(NetError::Io(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("{} exists and is not a FIFO", path.display()),
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(NetError::Io(e)),
        }

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;

        // SAFETY: `c_path` is a valid NUL-terminated C string that outlives
        // the call. `mkfifo` only reads it.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // The peer may have created it first.
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(NetError::Io(err));
            }
        }
        debug!(path = %path.display(), "created fifo");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// One TCP stream carrying both directions.
///
/// The receiver listens and the sender connects.
pub struct TcpChannel {
    stream: Option<TcpStream>,
}

impl TcpChannel {
    /// Connect to a listening receiver.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Option<Duration>) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, timeout)
    }

    /// Accept one sender on `listener`.
    pub fn accept(listener: &TcpListener, timeout: Option<Duration>) -> Result<Self, NetError> {
        let (stream, peer) = listener.accept()?;
        debug!(%peer, "accepted tcp sender");
        Self::from_stream(stream, timeout)
    }

    /// Wrap a connected stream. `timeout` bounds every blocking read and write.
    pub fn from_stream(stream: TcpStream, timeout: Option<Duration>) -> Result<Self, NetError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(Self {
            stream: Some(stream),
        })
    }
}

impl Transport for TcpChannel {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        stream.read_exact(buf).map_err(NetError::from_io)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        stream.write_all(buf).map_err(NetError::from_io)
    }

    fn close(&mut self) -> Result<(), NetError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => return Err(NetError::Io(e)),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-process memory pipes
// ---------------------------------------------------------------------------

/// In-process endpoint backed by two unbounded crossbeam channels.
///
/// Each `write_all` enqueues one buffer; reads reassemble bytes across buffer
/// boundaries. Dropping or closing one end makes the other end's reads fail
/// with [`NetError::Closed`] once buffered data is drained.
pub struct MemoryChannel {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
    read_timeout: Option<Duration>,
}

impl MemoryChannel {
    /// Two connected endpoints.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx,
            pending: Vec::new(),
            pos: 0,
            read_timeout: None,
        }
    }

    /// Fail reads that wait longer than `timeout` for data.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    fn refill(&mut self) -> Result<(), NetError> {
        let next = match self.read_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => NetError::Timeout,
                RecvTimeoutError::Disconnected => NetError::Closed,
            })?,
            None => self.rx.recv().map_err(|_| NetError::Closed)?,
        };
        self.pending = next;
        self.pos = 0;
        Ok(())
    }
}

impl Transport for MemoryChannel {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pos == self.pending.len() {
                self.refill()?;
                continue;
            }
            let n = (buf.len() - filled).min(self.pending.len() - self.pos);
            buf[filled..filled + n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
            self.pos += n;
            filled += n;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
        if buf.is_empty() {
            return Ok(());
        }
        let tx = self.tx.as_ref().ok_or(NetError::Closed)?;
        tx.send(buf.to_vec()).map_err(|_| NetError::Closed)
    }

    fn close(&mut self) -> Result<(), NetError> {
        self.tx.take();
        Ok(())
    }
}
