use tracing::debug;
use vcmbox_message::{decode, encode, Message, Tag, Words};

use crate::error::Result;

/// Something that can carry one property message to the firmware and back.
///
/// Implementations mutate `msg` in place, the way the firmware does. One
/// exchange is in flight at a time per implementor; `&mut self` enforces it.
pub trait Mailbox {
    /// Perform one synchronous exchange.
    fn exchange(&mut self, msg: &mut Message) -> Result<()>;

    /// Encode a request for `tag`, exchange it and decode the result words.
    fn call(&mut self, tag: Tag, args: &[u32]) -> Result<Words> {
        let mut msg = encode(tag, args)?;
        self.exchange(&mut msg)?;
        let words = decode(&msg)?;
        debug!(tag = tag.name(), result = ?words.first(), "mailbox call");
        Ok(words)
    }
}

impl<M: Mailbox + ?Sized> Mailbox for &mut M {
    fn exchange(&mut self, msg: &mut Message) -> Result<()> {
        (**self).exchange(msg)
    }
}

impl<M: Mailbox + ?Sized> Mailbox for Box<M> {
    fn exchange(&mut self, msg: &mut Message) -> Result<()> {
        (**self).exchange(msg)
    }
}

#[cfg(test)]
mod tests {
    use vcmbox_message::{MessageError, RESPONSE_SUCCESS};

    use super::*;
    use crate::error::TransportError;

    /// Marks every message answered without touching the payload.
    struct Loopback {
        exchanges: usize,
    }

    impl Mailbox for Loopback {
        fn exchange(&mut self, msg: &mut Message) -> Result<()> {
            self.exchanges += 1;
            msg.code = RESPONSE_SUCCESS;
            Ok(())
        }
    }

    /// Hands every request back untouched.
    struct Echo;

    impl Mailbox for Echo {
        fn exchange(&mut self, _msg: &mut Message) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn call_round_trips_through_loopback() {
        let mut mailbox = Loopback { exchanges: 0 };
        let words = mailbox.call(Tag::LockMemory, &[7]).unwrap();
        assert_eq!(words.as_slice(), &[7]);
        assert_eq!(mailbox.exchanges, 1);
    }

    fn first_result<M: Mailbox>(mut mailbox: M, tag: Tag, args: &[u32]) -> Option<u32> {
        mailbox.call(tag, args).unwrap().first()
    }

    #[test]
    fn call_through_mut_reference_and_box() {
        let mut mailbox = Loopback { exchanges: 0 };
        assert_eq!(first_result(&mut mailbox, Tag::UnlockMemory, &[1]), Some(1));
        assert_eq!(mailbox.exchanges, 1);

        let boxed: Box<dyn Mailbox> = Box::new(mailbox);
        assert_eq!(first_result(boxed, Tag::ReleaseMemory, &[2]), Some(2));
    }

    #[test]
    fn unanswered_request_is_reported() {
        let err = Echo.call(Tag::GetFirmwareRevision, &[]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Message(MessageError::NotAResponse { code: 0 })
        ));
    }

    #[test]
    fn oversized_call_never_reaches_the_device() {
        let mut mailbox = Loopback { exchanges: 0 };
        let args = [0u32; 40];
        let err = mailbox.call(Tag::ExecuteCode, &args).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Message(MessageError::PayloadTooLarge { .. })
        ));
        assert_eq!(mailbox.exchanges, 0);
    }
}
