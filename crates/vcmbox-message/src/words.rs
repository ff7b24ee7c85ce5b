use std::fmt;

use crate::error::{MessageError, Result};

/// Value words available in one message (108 bytes).
pub const PAYLOAD_WORDS: usize = 27;

/// Fixed-capacity word buffer with an explicit length.
///
/// Mirrors the message value area: never allocates and never grows past
/// [`PAYLOAD_WORDS`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Words {
    buf: [u32; PAYLOAD_WORDS],
    len: usize,
}

impl Words {
    pub const fn new() -> Self {
        Self {
            buf: [0; PAYLOAD_WORDS],
            len: 0,
        }
    }

    /// Copy `words` into a new buffer, failing if they do not fit.
    pub fn from_slice(words: &[u32]) -> Result<Self> {
        if words.len() > PAYLOAD_WORDS {
            return Err(MessageError::PayloadTooLarge {
                words: words.len(),
                max: PAYLOAD_WORDS,
            });
        }
        let mut out = Self::new();
        out.buf[..words.len()].copy_from_slice(words);
        out.len = words.len();
        Ok(out)
    }

    /// Append one word.
    pub fn push(&mut self, word: u32) -> Result<()> {
        if self.len == PAYLOAD_WORDS {
            return Err(MessageError::PayloadTooLarge {
                words: self.len + 1,
                max: PAYLOAD_WORDS,
            });
        }
        self.buf[self.len] = word;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        PAYLOAD_WORDS
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.buf[..self.len]
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.as_slice().get(index).copied()
    }

    /// First result word, which is where every supported tag puts its answer.
    pub fn first(&self) -> Option<u32> {
        self.get(0)
    }
}

impl Default for Words {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Words {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.as_slice().iter().map(|w| format!("{w:#010x}")))
            .finish()
    }
}

impl AsRef<[u32]> for Words {
    fn as_ref(&self) -> &[u32] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_tracks_length() {
        let words = Words::from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words.as_slice(), &[1, 2, 3]);
        assert_eq!(words.first(), Some(1));
        assert_eq!(words.get(3), None);
    }

    #[test]
    fn from_slice_rejects_overflow() {
        let too_many = [0u32; PAYLOAD_WORDS + 1];
        let err = Words::from_slice(&too_many).unwrap_err();
        assert_eq!(
            err,
            MessageError::PayloadTooLarge {
                words: PAYLOAD_WORDS + 1,
                max: PAYLOAD_WORDS
            }
        );
    }

    #[test]
    fn push_until_full() {
        let mut words = Words::new();
        for i in 0..PAYLOAD_WORDS as u32 {
            words.push(i).unwrap();
        }
        assert!(matches!(
            words.push(99),
            Err(MessageError::PayloadTooLarge { .. })
        ));
        assert_eq!(words.len(), PAYLOAD_WORDS);
    }

    #[test]
    fn empty_buffer() {
        let words = Words::default();
        assert!(words.is_empty());
        assert_eq!(words.first(), None);
        assert_eq!(words.capacity(), PAYLOAD_WORDS);
    }
}
