use std::sync::{Arc, Mutex, PoisonError};

use vcmbox_message::Message;

use crate::error::Result;
use crate::traits::Mailbox;

/// A mailbox shared between threads.
///
/// Every exchange takes the lock, so at most one message is in flight on the
/// underlying mailbox at a time. Clones share the same mailbox. A lock
/// poisoned by a panicking holder is recovered; the mailbox itself carries no
/// half-written state between exchanges.
#[derive(Debug)]
pub struct Shared<M> {
    inner: Arc<Mutex<M>>,
}

impl<M> Shared<M> {
    pub fn new(mailbox: M) -> Self {
        Self {
            inner: Arc::new(Mutex::new(mailbox)),
        }
    }

    /// Run `f` with exclusive access to the wrapped mailbox.
    pub fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<M> Clone for Shared<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Mailbox> Mailbox for Shared<M> {
    fn exchange(&mut self, msg: &mut Message) -> Result<()> {
        self.with(|mailbox| mailbox.exchange(msg))
    }
}
