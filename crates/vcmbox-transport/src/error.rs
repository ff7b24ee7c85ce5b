use std::io;
use std::path::PathBuf;
use std::time::Duration;

use vcmbox_message::MessageError;

/// Errors that can occur talking to the mailbox or memory devices.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The mailbox or memory device could not be opened.
    #[error("cannot open {path}: {}: {source}", device_hint(.source))]
    DeviceUnavailable { path: PathBuf, source: io::Error },

    /// The device-control call itself failed.
    #[error("mailbox ioctl failed: {0}")]
    IoctlFailed(#[source] io::Error),

    /// The firmware answer could not be decoded.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// No answer within the configured deadline.
    #[error("mailbox exchange timed out after {0:?}")]
    Timeout(Duration),

    /// A timed-out exchange is still outstanding on this channel.
    #[error("mailbox channel busy with an abandoned exchange")]
    Busy,

    /// The channel has been closed.
    #[error("mailbox channel closed")]
    Closed,

    /// Mapping a physical range failed.
    #[error("cannot map {size} bytes at {addr:#x}: {source}")]
    MappingFailed {
        addr: u64,
        size: usize,
        source: io::Error,
    },

    /// An access falls outside a mapped segment.
    #[error("access of {len} bytes at offset {offset} exceeds segment of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}

impl TransportError {
    /// The underlying OS error, when there is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            TransportError::DeviceUnavailable { source, .. }
            | TransportError::MappingFailed { source, .. }
            | TransportError::IoctlFailed(source) => Some(source),
            _ => None,
        }
    }
}

fn device_hint(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::NotFound => "device not found (is the firmware driver loaded?)",
        io::ErrorKind::PermissionDenied => {
            "permission denied (run as root or add the user to the video group)"
        }
        _ => "device unavailable",
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
