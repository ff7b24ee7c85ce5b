//! Firmware command tags.
//!
//! Tag values are defined by the VideoCore firmware and are stable. Each tag
//! has a fixed request and response shape in 32-bit words.

use std::fmt;

use crate::error::MessageError;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Firmware build revision.
    GetFirmwareRevision = 0x0000_0001,
    /// Board revision code.
    GetBoardRevision = 0x0001_0002,
    /// Allocate co-processor memory: size, alignment, flags -> handle.
    AllocateMemory = 0x0003_000C,
    /// Lock an allocation in place: handle -> bus address.
    LockMemory = 0x0003_000D,
    /// Unlock an allocation: handle -> status.
    UnlockMemory = 0x0003_000E,
    /// Release an allocation: handle -> status.
    ReleaseMemory = 0x0003_000F,
    /// Run code at a bus address: address, r0..r5 -> r0.
    ExecuteCode = 0x0003_0010,
}

impl Tag {
    pub const ALL: [Tag; 7] = [
        Tag::GetFirmwareRevision,
        Tag::GetBoardRevision,
        Tag::AllocateMemory,
        Tag::LockMemory,
        Tag::UnlockMemory,
        Tag::ReleaseMemory,
        Tag::ExecuteCode,
    ];

    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_u32() == value)
    }

    /// Number of argument words the firmware expects.
    pub const fn request_words(self) -> usize {
        match self {
            Tag::GetFirmwareRevision | Tag::GetBoardRevision => 0,
            Tag::AllocateMemory => 3,
            Tag::LockMemory | Tag::UnlockMemory | Tag::ReleaseMemory => 1,
            Tag::ExecuteCode => 7,
        }
    }

    /// Number of result words the firmware writes back.
    pub const fn response_words(self) -> usize {
        1
    }

    pub const fn name(self) -> &'static str {
        match self {
            Tag::GetFirmwareRevision => "get_firmware_revision",
            Tag::GetBoardRevision => "get_board_revision",
            Tag::AllocateMemory => "allocate_memory",
            Tag::LockMemory => "lock_memory",
            Tag::UnlockMemory => "unlock_memory",
            Tag::ReleaseMemory => "release_memory",
            Tag::ExecuteCode => "execute_code",
        }
    }
}

impl TryFrom<u32> for Tag {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_u32(value).ok_or(MessageError::UnknownTag(value))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_match_firmware() {
        assert_eq!(Tag::AllocateMemory.as_u32(), 0x3000c);
        assert_eq!(Tag::LockMemory.as_u32(), 0x3000d);
        assert_eq!(Tag::UnlockMemory.as_u32(), 0x3000e);
        assert_eq!(Tag::ReleaseMemory.as_u32(), 0x3000f);
        assert_eq!(Tag::ExecuteCode.as_u32(), 0x30010);
    }

    #[test]
    fn from_u32_covers_every_tag() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_u32(tag.as_u32()), Some(tag));
        }
        assert_eq!(Tag::from_u32(0xdead), None);
    }

    #[test]
    fn try_from_unknown_tag() {
        let err = Tag::try_from(0x4_0000).unwrap_err();
        assert_eq!(err, MessageError::UnknownTag(0x4_0000));
    }

    #[test]
    fn execute_shape() {
        assert_eq!(Tag::ExecuteCode.request_words(), 7);
        assert_eq!(Tag::ExecuteCode.response_words(), 1);
    }
}
