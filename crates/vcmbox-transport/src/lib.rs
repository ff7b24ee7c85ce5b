//! Mailbox device transport.
//!
//! This is the only layer that touches the operating system:
//! - [`Channel`] owns the mailbox character device and performs one blocking
//!   device-control call per message
//! - [`Shared`] serializes exchanges when threads share a channel
//! - [`PhysMem`] maps physical ranges into the process through the memory
//!   device
//!
//! Everything above talks to the firmware through the [`Mailbox`] trait.

pub mod error;
pub mod page;
pub mod shared;
pub mod traits;

#[cfg(unix)]
pub mod channel;
#[cfg(unix)]
pub mod mem;

pub use error::{Result, TransportError};
pub use page::{page_roundup, PAGE_SIZE};
pub use shared::Shared;
pub use traits::Mailbox;

#[cfg(unix)]
pub use channel::{Channel, ChannelConfig, SharedChannel, DEFAULT_DEVICE, IOCTL_MBOX_PROPERTY};
#[cfg(unix)]
pub use mem::{map_segment, MappedSegment, MemConfig, PhysMem, DEFAULT_MEM_DEVICE};
