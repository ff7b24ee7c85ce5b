use vcmbox_message::Tag;
use vcmbox_transport::TransportError;

use crate::handle::{BusAddress, Handle, HandleState, Transition};

/// Errors that can occur managing co-processor memory.
#[derive(Debug, thiserror::Error)]
pub enum MemError {
    /// Device, ioctl or message-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The transition is not allowed from the handle's current state.
    #[error("cannot {op} handle {handle}: handle is {state}")]
    InvalidStateTransition {
        handle: Handle,
        state: HandleState,
        op: Transition,
    },

    /// The firmware answered a lock with bus address zero.
    #[error("firmware refused to lock handle {0}")]
    LockRejected(Handle),

    /// The firmware answered with a non-zero status word.
    #[error("{tag} failed with status {status:#x}")]
    FirmwareStatus { tag: Tag, status: u32 },

    /// The firmware answered without a result word.
    #[error("{0} returned no result")]
    EmptyResponse(Tag),

    /// The address does not belong to a locked allocation.
    #[error("bus address {0} is not a locked allocation")]
    NotLocked(BusAddress),

    /// The requested size cannot be rounded to a page multiple.
    #[error("allocation size {0} too large")]
    SizeOverflow(u32),

    /// Alignment must be a power of two.
    #[error("alignment {0} is not a power of two")]
    BadAlignment(u32),
}

pub type Result<T> = std::result::Result<T, MemError>;
