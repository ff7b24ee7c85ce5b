//! Fixed-layout message codec for the VideoCore mailbox property interface.
//!
//! Every request is a single 16-byte aligned buffer:
//! - 5 header words: total length, request/response code, command tag,
//!   value buffer capacity, request data length
//! - 27 value words shared by the request arguments and the response
//! - a zero end tag
//!
//! The firmware rewrites the buffer in place. [`encode`] builds a request,
//! [`decode`] validates the response code and extracts the result words.

pub mod codec;
pub mod error;
pub mod tag;
pub mod words;

pub use codec::{
    decode, encode, encode_raw, Message, HEADER_BYTES, HEADER_WORDS, MAX_MESSAGE_BYTES,
    REQUEST, RESPONSE_PARTIAL, RESPONSE_SUCCESS,
};
pub use error::{MessageError, Result};
pub use tag::Tag;
pub use words::{Words, PAYLOAD_WORDS};
