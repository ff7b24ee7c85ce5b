/// Errors that can occur while building or parsing mailbox messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The request does not fit in the fixed value buffer.
    #[error("payload too large ({words} words, max {max})")]
    PayloadTooLarge { words: usize, max: usize },

    /// The buffer came back with the response bit clear; the firmware never
    /// processed it.
    #[error("firmware did not answer the request (code {code:#010x})")]
    NotAResponse { code: u32 },

    /// The firmware flagged the response as partial.
    #[error("partial response for tag {tag:#010x}")]
    Partial { tag: u32 },

    /// A byte-level message is shorter than its header or declared length.
    #[error("message truncated ({len} bytes, need {need})")]
    Truncated { len: usize, need: usize },

    /// A length field is inconsistent with the fixed message layout.
    #[error("invalid message length field ({len} bytes)")]
    BadLength { len: u32 },

    /// The command tag is not one this codec knows.
    #[error("unknown command tag {0:#010x}")]
    UnknownTag(u32),
}

pub type Result<T> = std::result::Result<T, MessageError>;
