//! Firmware allocation flags.
//!
//! The firmware takes a raw bitset, but several fields inside it are
//! exclusive choices. They are modelled here as enums so that a caller can
//! only ever build a combination the firmware understands.

use std::fmt;

use serde::Serialize;

const DISCARDABLE: u32 = 1 << 0;
const CACHE_SHIFT: u32 = 2;
const CACHE_MASK: u32 = 3 << CACHE_SHIFT;
const ZERO: u32 = 1 << 4;
const NO_INIT: u32 = 1 << 5;
const HINT_PERMALOCK: u32 = 1 << 6;
const KNOWN: u32 = DISCARDABLE | CACHE_MASK | ZERO | NO_INIT | HINT_PERMALOCK;

/// Which bus alias the allocation is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Normal allocating alias. Not for use from the host CPU.
    #[default]
    Normal,
    /// Uncached alias (`0xC` bus alias).
    Direct,
    /// Non-allocating in L2 but coherent (`0x8` alias).
    Coherent,
    /// Direct and coherent together: allocating in L2, non-allocating in L1.
    L1NonAllocating,
}

impl CacheMode {
    pub const fn bits(self) -> u32 {
        let mode = match self {
            CacheMode::Normal => 0,
            CacheMode::Direct => 1,
            CacheMode::Coherent => 2,
            CacheMode::L1NonAllocating => 3,
        };
        mode << CACHE_SHIFT
    }

    const fn from_field(field: u32) -> Self {
        match field & 3 {
            0 => CacheMode::Normal,
            1 => CacheMode::Direct,
            2 => CacheMode::Coherent,
            _ => CacheMode::L1NonAllocating,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            CacheMode::Normal => "normal",
            CacheMode::Direct => "direct",
            CacheMode::Coherent => "coherent",
            CacheMode::L1NonAllocating => "l1_nonallocating",
        }
    }
}

/// How the firmware initialises new memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Firmware default: every byte set to `0xff`.
    #[default]
    Ones,
    /// Every byte zeroed.
    Zero,
    /// Left as found.
    Uninitialized,
}

impl InitMode {
    pub const fn bits(self) -> u32 {
        match self {
            InitMode::Ones => 0,
            InitMode::Zero => ZERO,
            InitMode::Uninitialized => NO_INIT,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            InitMode::Ones => "ones",
            InitMode::Zero => "zero",
            InitMode::Uninitialized => "uninitialized",
        }
    }
}

/// Typed allocation flags.
///
/// ```
/// use vcmbox_mem::{AllocFlags, CacheMode, InitMode};
///
/// let flags = AllocFlags::new().cache(CacheMode::Direct).init(InitMode::Zero);
/// assert_eq!(flags.bits(), 0x14);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct AllocFlags {
    discardable: bool,
    cache: CacheMode,
    init: InitMode,
    permalock: bool,
}

impl AllocFlags {
    pub const fn new() -> Self {
        Self {
            discardable: false,
            cache: CacheMode::Normal,
            init: InitMode::Ones,
            permalock: false,
        }
    }

    /// The firmware may shrink the allocation to zero at any time.
    pub const fn discardable(self) -> Self {
        Self {
            discardable: true,
            ..self
        }
    }

    pub const fn cache(self, cache: CacheMode) -> Self {
        Self { cache, ..self }
    }

    pub const fn init(self, init: InitMode) -> Self {
        Self { init, ..self }
    }

    /// Hint that the memory stays locked for long periods.
    pub const fn permalock(self) -> Self {
        Self {
            permalock: true,
            ..self
        }
    }

    pub const fn is_discardable(&self) -> bool {
        self.discardable
    }

    pub const fn cache_mode(&self) -> CacheMode {
        self.cache
    }

    pub const fn init_mode(&self) -> InitMode {
        self.init
    }

    pub const fn is_permalock(&self) -> bool {
        self.permalock
    }

    /// Raw bitset sent to the firmware.
    pub const fn bits(&self) -> u32 {
        let mut bits = self.cache.bits() | self.init.bits();
        if self.discardable {
            bits |= DISCARDABLE;
        }
        if self.permalock {
            bits |= HINT_PERMALOCK;
        }
        bits
    }

    /// Parse a raw bitset. Unknown bits, or zero-init together with no-init,
    /// are rejected.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !KNOWN != 0 {
            return None;
        }
        let init = match (bits & ZERO != 0, bits & NO_INIT != 0) {
            (false, false) => InitMode::Ones,
            (true, false) => InitMode::Zero,
            (false, true) => InitMode::Uninitialized,
            (true, true) => return None,
        };
        Some(Self {
            discardable: bits & DISCARDABLE != 0,
            cache: CacheMode::from_field(bits >> CACHE_SHIFT),
            init,
            permalock: bits & HINT_PERMALOCK != 0,
        })
    }
}

impl fmt::Display for AllocFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.cache.name(), self.init.name())?;
        if self.discardable {
            f.write_str("|discardable")?;
        }
        if self.permalock {
            f.write_str("|permalock")?;
        }
        Ok(())
    }
}
