use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{MessageError, Result};
use crate::tag::Tag;
use crate::words::{Words, PAYLOAD_WORDS};

/// Header: length, code, tag, capacity, data length.
pub const HEADER_WORDS: usize = 5;

pub const HEADER_BYTES: usize = HEADER_WORDS * 4;

/// Largest wire image: header, full value area and the end tag.
pub const MAX_MESSAGE_BYTES: usize = (PAYLOAD_WORDS + 6) * 4;

/// Code written by the host for every request.
pub const REQUEST: u32 = 0x0000_0000;

/// Code written back by the firmware on success.
pub const RESPONSE_SUCCESS: u32 = 0x8000_0000;

/// Code written back by the firmware when it could only partially answer.
pub const RESPONSE_PARTIAL: u32 = 0x8000_0001;

const RESPONSE_BIT: u32 = 0x8000_0000;

/// One mailbox property message, laid out exactly as the firmware reads it.
///
/// ```text
/// ┌──────┬──────┬──────┬──────────┬──────────┬─────────────────┬─────┐
/// │ len  │ code │ tag  │ capacity │ data_len │ words[27]       │ end │
/// │ (B)  │      │      │ (B)      │ (B)      │ args / results  │ 0   │
/// └──────┴──────┴──────┴──────────┴──────────┴─────────────────┴─────┘
/// ```
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Total length in bytes, header and end tag included.
    pub len: u32,
    /// Zero for a request, bit 31 set once the firmware has answered.
    pub code: u32,
    /// Command tag.
    pub tag: u32,
    /// Value buffer capacity in bytes.
    pub capacity: u32,
    /// Request data length in bytes; the firmware sets bit 31 and the
    /// response length on answer.
    pub data_len: u32,
    /// Arguments on the way in, results on the way out.
    pub words: [u32; PAYLOAD_WORDS],
    end_tag: u32,
}

impl Message {
    pub const fn zeroed() -> Self {
        Self {
            len: 0,
            code: 0,
            tag: 0,
            capacity: 0,
            data_len: 0,
            words: [0; PAYLOAD_WORDS],
            end_tag: 0,
        }
    }

    /// The command tag, if it is one this codec knows.
    pub fn known_tag(&self) -> Option<Tag> {
        Tag::from_u32(self.tag)
    }

    pub fn is_response(&self) -> bool {
        self.code & RESPONSE_BIT != 0
    }

    /// Zero every value word past the request data, end tag included.
    pub fn pad(&mut self) {
        let start = (self.data_len as usize / 4).min(PAYLOAD_WORDS);
        self.words[start..].fill(0);
        self.end_tag = 0;
    }

    fn header(&self) -> [u32; HEADER_WORDS] {
        [self.len, self.code, self.tag, self.capacity, self.data_len]
    }

    /// Little-endian wire image, `len` bytes long.
    pub fn to_bytes(&self) -> Bytes {
        let len = (self.len as usize).clamp(HEADER_BYTES, MAX_MESSAGE_BYTES) & !3;
        let mut dst = BytesMut::with_capacity(len);
        let all = self
            .header()
            .into_iter()
            .chain(self.words)
            .chain(std::iter::once(self.end_tag));
        for word in all.take(len / 4) {
            dst.put_u32_le(word);
        }
        dst.freeze()
    }

    /// Parse a little-endian wire image.
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_BYTES {
            return Err(MessageError::Truncated {
                len: src.len(),
                need: HEADER_BYTES,
            });
        }

        let mut buf = src;
        let len = buf.get_u32_le();
        let declared = len as usize;
        if !(HEADER_BYTES..=MAX_MESSAGE_BYTES).contains(&declared) || declared % 4 != 0 {
            return Err(MessageError::BadLength { len });
        }
        if src.len() < declared {
            return Err(MessageError::Truncated {
                len: src.len(),
                need: declared,
            });
        }

        let mut msg = Self::zeroed();
        msg.len = len;
        msg.code = buf.get_u32_le();
        msg.tag = buf.get_u32_le();
        msg.capacity = buf.get_u32_le();
        msg.data_len = buf.get_u32_le();
        if msg.capacity as usize > PAYLOAD_WORDS * 4 {
            return Err(MessageError::BadLength { len: msg.capacity });
        }

        let body_words = (declared - HEADER_BYTES) / 4;
        for slot in msg.words.iter_mut().take(body_words) {
            *slot = buf.get_u32_le();
        }
        Ok(msg)
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Build a request for a known tag.
///
/// The value capacity is the larger of the argument count and the tag's
/// response size, so the firmware always has room to answer.
pub fn encode(tag: Tag, input: &[u32]) -> Result<Message> {
    encode_raw(tag.as_u32(), input, tag.response_words())
}

/// Build a request for an arbitrary tag value.
pub fn encode_raw(tag: u32, input: &[u32], response_words: usize) -> Result<Message> {
    let args = Words::from_slice(input)?;
    let capacity_words = args.len().max(response_words);
    if capacity_words > PAYLOAD_WORDS {
        return Err(MessageError::PayloadTooLarge {
            words: capacity_words,
            max: PAYLOAD_WORDS,
        });
    }

    let mut msg = Message::zeroed();
    msg.words[..args.len()].copy_from_slice(args.as_slice());
    msg.tag = tag;
    msg.capacity = (capacity_words * 4) as u32;
    msg.data_len = (args.len() * 4) as u32;
    msg.len = ((capacity_words + 6) * 4) as u32;
    msg.code = REQUEST;
    msg.pad();

    trace!(
        tag,
        args = args.len(),
        capacity = capacity_words,
        "encoded mailbox request"
    );
    Ok(msg)
}

/// Validate a response and return its result words.
///
/// The caller interprets the words according to the tag it sent.
pub fn decode(msg: &Message) -> Result<Words> {
    if !msg.is_response() {
        return Err(MessageError::NotAResponse { code: msg.code });
    }
    if msg.code == RESPONSE_PARTIAL {
        return Err(MessageError::Partial { tag: msg.tag });
    }

    let capacity_words = (msg.capacity as usize / 4).min(PAYLOAD_WORDS);
    let reported = if msg.data_len & RESPONSE_BIT != 0 {
        (msg.data_len & !RESPONSE_BIT) as usize / 4
    } else {
        msg.data_len as usize / 4
    };
    Words::from_slice(&msg.words[..reported.min(capacity_words)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(msg: &mut Message) {
        msg.code = RESPONSE_SUCCESS;
    }

    #[test]
    fn layout_matches_firmware_buffer() {
        assert_eq!(std::mem::align_of::<Message>(), 16);
        assert_eq!(std::mem::offset_of!(Message, words), HEADER_BYTES);
        assert!(std::mem::size_of::<Message>() >= MAX_MESSAGE_BYTES);
    }

    #[test]
    fn encode_allocate_request() {
        let msg = encode(Tag::AllocateMemory, &[0x10000, 0x1000, 0x14]).unwrap();
        assert_eq!(msg.tag, 0x3000c);
        assert_eq!(msg.code, REQUEST);
        assert_eq!(msg.data_len, 12);
        assert_eq!(msg.capacity, 12);
        assert_eq!(msg.len, (3 + 6) * 4);
        assert_eq!(&msg.words[..3], &[0x10000, 0x1000, 0x14]);
        assert!(msg.words[3..].iter().all(|w| *w == 0));
    }

    #[test]
    fn encode_rounds_capacity_to_response_size() {
        let msg = encode(Tag::GetFirmwareRevision, &[]).unwrap();
        assert_eq!(msg.data_len, 0);
        assert_eq!(msg.capacity, 4);
        assert_eq!(msg.len, (1 + 6) * 4);
    }

    #[test]
    fn encode_full_value_area() {
        let input = [7u32; PAYLOAD_WORDS];
        let msg = encode_raw(0x1234, &input, 1).unwrap();
        assert_eq!(msg.len as usize, MAX_MESSAGE_BYTES);
        assert_eq!(msg.capacity as usize, PAYLOAD_WORDS * 4);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let input = [0u32; PAYLOAD_WORDS + 1];
        let err = encode_raw(0x1234, &input, 1).unwrap_err();
        assert!(matches!(err, MessageError::PayloadTooLarge { .. }));
    }

    #[test]
    fn encode_rejects_oversized_response() {
        let err = encode_raw(0x1234, &[], PAYLOAD_WORDS + 1).unwrap_err();
        assert_eq!(
            err,
            MessageError::PayloadTooLarge {
                words: PAYLOAD_WORDS + 1,
                max: PAYLOAD_WORDS
            }
        );
    }

    #[test]
    fn pad_clears_stale_words() {
        let mut msg = encode(Tag::LockMemory, &[5]).unwrap();
        msg.words[1..10].fill(0xffff_ffff);
        msg.pad();
        assert_eq!(msg.words[0], 5);
        assert!(msg.words[1..].iter().all(|w| *w == 0));
    }

    #[test]
    fn loopback_round_trips_every_tag() {
        for tag in Tag::ALL {
            let input: Vec<u32> = (1..=tag.request_words() as u32).collect();
            let mut msg = encode(tag, &input).unwrap();
            loopback(&mut msg);
            assert_eq!(msg.known_tag(), Some(tag));
            let out = decode(&msg).unwrap();
            assert_eq!(out.as_slice(), input.as_slice());
        }
    }

    #[test]
    fn decode_request_echo_is_not_a_response() {
        let mut msg = encode(Tag::LockMemory, &[9]).unwrap();
        msg.words.fill(0xdead_beef);
        msg.code = 0x7fff_ffff;
        let err = decode(&msg).unwrap_err();
        assert_eq!(err, MessageError::NotAResponse { code: 0x7fff_ffff });
    }

    #[test]
    fn decode_partial_response() {
        let mut msg = encode(Tag::UnlockMemory, &[3]).unwrap();
        msg.code = RESPONSE_PARTIAL;
        let err = decode(&msg).unwrap_err();
        assert_eq!(err, MessageError::Partial { tag: 0x3000e });
    }

    #[test]
    fn decode_uses_reported_response_length() {
        let mut msg = encode(Tag::AllocateMemory, &[0x1000, 0x1000, 0]).unwrap();
        msg.code = RESPONSE_SUCCESS;
        msg.words[0] = 42;
        msg.data_len = RESPONSE_BIT | 4;
        let out = decode(&msg).unwrap();
        assert_eq!(out.as_slice(), &[42]);
    }

    #[test]
    fn decode_clamps_to_capacity() {
        let mut msg = encode(Tag::LockMemory, &[1]).unwrap();
        msg.code = RESPONSE_SUCCESS;
        msg.data_len = RESPONSE_BIT | 64;
        let out = decode(&msg).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn wire_image_round_trip() {
        let msg = encode(Tag::ExecuteCode, &[0xc000_1000, 1, 0, 0, 0, 0, 0]).unwrap();
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), msg.len as usize);
        assert_eq!(&bytes[..4], &msg.len.to_le_bytes());
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn from_bytes_rejects_short_buffers() {
        let err = Message::from_bytes(&[0u8; 8]).unwrap_err();
        assert_eq!(err, MessageError::Truncated { len: 8, need: HEADER_BYTES });

        let msg = encode(Tag::LockMemory, &[1]).unwrap();
        let bytes = msg.to_bytes();
        let err = Message::from_bytes(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, MessageError::Truncated { .. }));
    }

    #[test]
    fn from_bytes_rejects_bad_length() {
        let mut raw = vec![0u8; 256];
        raw[..4].copy_from_slice(&512u32.to_le_bytes());
        let err = Message::from_bytes(&raw).unwrap_err();
        assert_eq!(err, MessageError::BadLength { len: 512 });
    }
}
