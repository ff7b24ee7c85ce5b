//! Host-side client for the VideoCore mailbox property interface.
//!
//! vcmbox allocates and locks co-processor memory, hands out bus addresses,
//! and asks the firmware to run code at them.
//!
//! # Crate Structure
//!
//! - [`message`]: Fixed-layout property message codec
//! - [`transport`]: Mailbox device channel and physical memory mapping
//! - [`mem`]: Memory handle lifecycle, code execution and a firmware simulator

/// Re-export message types.
pub mod message {
    pub use vcmbox_message::*;
}

/// Re-export transport types.
pub mod transport {
    pub use vcmbox_transport::*;
}

/// Re-export lifecycle and execution types.
pub mod mem {
    pub use vcmbox_mem::*;
}
