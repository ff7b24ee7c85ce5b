use std::fmt;

use serde::Serialize;

/// Firmware memory handle. Zero means "no allocation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of locked memory as seen from the co-processor bus.
///
/// Opaque to this crate: never dereferenced, only handed back to the firmware
/// or translated for mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct BusAddress(pub u32);

impl BusAddress {
    pub const NULL: BusAddress = BusAddress(0);

    /// The two top bits select the cache alias; the rest is the physical address.
    pub const ALIAS_MASK: u32 = 0xC000_0000;

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Physical address suitable for mapping through the memory device.
    pub const fn to_phys(self) -> u64 {
        (self.0 & !Self::ALIAS_MASK) as u64
    }

    /// Address `bytes` further on, if it does not wrap.
    pub fn offset(self, bytes: u32) -> Option<BusAddress> {
        self.0.checked_add(bytes).map(BusAddress)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Lifecycle state of one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Unallocated,
    Allocated,
    Locked,
    Unlocked,
    Freed,
}

impl HandleState {
    /// Whether the firmware still holds memory for the handle.
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            HandleState::Allocated | HandleState::Locked | HandleState::Unlocked
        )
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleState::Unallocated => "unallocated",
            HandleState::Allocated => "allocated",
            HandleState::Locked => "locked",
            HandleState::Unlocked => "unlocked",
            HandleState::Freed => "freed",
        })
    }
}

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Allocate,
    Lock,
    Unlock,
    Free,
}

impl Transition {
    /// Whether the transition may start from `state`.
    pub const fn allowed_from(self, state: HandleState) -> bool {
        match self {
            Transition::Allocate => matches!(state, HandleState::Unallocated | HandleState::Freed),
            Transition::Lock => matches!(state, HandleState::Allocated),
            Transition::Unlock => matches!(state, HandleState::Locked),
            Transition::Free => matches!(state, HandleState::Allocated | HandleState::Unlocked),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Transition::Allocate => "allocate",
            Transition::Lock => "lock",
            Transition::Unlock => "unlock",
            Transition::Free => "free",
        }
    }

    /// State after the transition succeeds.
    pub const fn target(self) -> HandleState {
        match self {
            Transition::Allocate => HandleState::Allocated,
            Transition::Lock => HandleState::Locked,
            Transition::Unlock => HandleState::Unlocked,
            Transition::Free => HandleState::Freed,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
