//! Co-processor memory lifecycle and remote execution.
//!
//! This is the layer callers use. Allocate firmware memory, lock it to get a
//! bus address, run code there, then unlock and free it:
//!
//! ```text
//! allocate -> lock -> (map + copy payload) -> execute -> unlock -> free
//! ```
//!
//! [`MemoryManager`] tracks every handle through that state machine and
//! rejects out-of-order transitions before they reach the firmware.

pub mod error;
pub mod exec;
pub mod flags;
pub mod handle;
pub mod manager;
pub mod sim;

pub use error::{MemError, Result};
pub use exec::{execute, execute_with_registers, EXECUTE_REGISTERS};
pub use flags::{AllocFlags, CacheMode, InitMode};
pub use handle::{BusAddress, Handle, HandleState, Transition};
pub use manager::{Allocation, ManagerConfig, MemoryManager};
pub use sim::Simulator;
