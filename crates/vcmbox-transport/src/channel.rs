use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use vcmbox_message::Message;

use crate::error::{Result, TransportError};
use crate::traits::Mailbox;

/// Mailbox property character device.
pub const DEFAULT_DEVICE: &str = "/dev/vcio";

/// `_IOWR(100, 0, char *)`: the property-channel request on the mailbox device.
pub const IOCTL_MBOX_PROPERTY: u64 = iowr(100, 0, std::mem::size_of::<*mut libc::c_char>());

const fn iowr(ty: u64, nr: u64, size: usize) -> u64 {
    const IOC_WRITE: u64 = 1;
    const IOC_READ: u64 = 2;
    ((IOC_READ | IOC_WRITE) << 30) | ((size as u64) << 16) | (ty << 8) | nr
}

/// Configuration for a mailbox channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Device path. Default: `/dev/vcio`.
    pub device_path: PathBuf,
    /// Deadline for one exchange. Default: none, the call blocks until the
    /// firmware answers.
    pub timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE),
            timeout: None,
        }
    }
}

type Completion = (io::Result<()>, Message);

/// An open handle on the mailbox device.
///
/// Exchanges are strictly one at a time. With a timeout configured the
/// device call runs on a helper thread; if the deadline passes, the call is
/// abandoned and the channel reports [`TransportError::Busy`] until the
/// firmware finally answers it.
pub struct Channel {
    fd: Option<Arc<OwnedFd>>,
    config: ChannelConfig,
    pending: Option<Receiver<Completion>>,
}

impl Channel {
    /// Open the default mailbox device.
    pub fn open() -> Result<Self> {
        Self::open_with_config(ChannelConfig::default())
    }

    /// Open with explicit configuration.
    pub fn open_with_config(config: ChannelConfig) -> Result<Self> {
        // All data travels in the ioctl buffer; read-only access is enough.
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(&config.device_path)
            .map_err(|source| TransportError::DeviceUnavailable {
                path: config.device_path.clone(),
                source,
            })?;

        info!(path = ?config.device_path, timeout = ?config.timeout, "opened mailbox channel");
        Ok(Self {
            fd: Some(Arc::new(OwnedFd::from(file))),
            config,
            pending: None,
        })
    }

    /// Release the device handle. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.fd.take().is_some() {
            debug!(path = ?self.config.device_path, "closed mailbox channel");
        }
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn reap_pending(&mut self) -> Result<()> {
        if let Some(rx) = &self.pending {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Disconnected) => {
                    debug!("abandoned mailbox exchange completed");
                    self.pending = None;
                }
                Err(TryRecvError::Empty) => return Err(TransportError::Busy),
            }
        }
        Ok(())
    }

    fn exchange_with_deadline(
        &mut self,
        fd: Arc<OwnedFd>,
        msg: &mut Message,
        timeout: Duration,
    ) -> Result<()> {
        let (tx, rx) = mpsc::sync_channel::<Completion>(1);
        let mut owned = *msg;
        std::thread::Builder::new()
            .name("vcmbox-exchange".to_string())
            .spawn(move || {
                let result = mbox_property(fd.as_fd(), &mut owned);
                let _ = tx.send((result, owned));
            })
            .map_err(TransportError::IoctlFailed)?;

        match rx.recv_timeout(timeout) {
            Ok((result, reply)) => {
                result.map_err(TransportError::IoctlFailed)?;
                *msg = reply;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, tag = msg.tag, "mailbox exchange timed out; abandoning call");
                self.pending = Some(rx);
                Err(TransportError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::IoctlFailed(
                io::Error::other("exchange thread exited without an answer"),
            )),
        }
    }
}

impl Mailbox for Channel {
    fn exchange(&mut self, msg: &mut Message) -> Result<()> {
        let fd = self.fd.clone().ok_or(TransportError::Closed)?;
        self.reap_pending()?;

        trace!(tag = msg.tag, request = ?msg.to_bytes(), "mailbox request");
        match self.config.timeout {
            None => mbox_property(fd.as_fd(), msg).map_err(TransportError::IoctlFailed)?,
            Some(timeout) => self.exchange_with_deadline(fd, msg, timeout)?,
        }
        trace!(tag = msg.tag, code = msg.code, response = ?msg.to_bytes(), "mailbox response");
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("path", &self.config.device_path)
            .field("open", &self.is_open())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

fn mbox_property(fd: BorrowedFd<'_>, msg: &mut Message) -> io::Result<()> {
    // SAFETY: `fd` is an open descriptor for the lifetime of the call and
    // `msg` is a valid, 16-byte aligned buffer of at least `msg.len` bytes
    // that the driver reads and rewrites in place.
    let rc = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            IOCTL_MBOX_PROPERTY as _,
            (msg as *mut Message).cast::<libc::c_void>(),
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl crate::shared::Shared<Channel> {
    /// Open a channel and wrap it for sharing.
    pub fn open_with_config(config: ChannelConfig) -> Result<Self> {
        Channel::open_with_config(config).map(Self::new)
    }

    /// Close the device handle for every clone.
    pub fn close(&self) {
        self.with(Channel::close);
    }
}

/// A mailbox channel shared between threads.
pub type SharedChannel = crate::shared::Shared<Channel>;
