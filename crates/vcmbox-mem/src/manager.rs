use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use vcmbox_message::Tag;
use vcmbox_transport::{page_roundup, Mailbox, PAGE_SIZE};

use crate::error::{MemError, Result};
use crate::exec;
use crate::flags::AllocFlags;
use crate::handle::{BusAddress, Handle, HandleState, Transition};

/// Configuration for a [`MemoryManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Alignment requested for every allocation. Default: one page.
    pub alignment: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            alignment: PAGE_SIZE as u32,
        }
    }
}

/// What the manager knows about one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub handle: Handle,
    /// Page-rounded size sent to the firmware.
    pub size: u32,
    pub flags: AllocFlags,
    pub state: HandleState,
    /// Present only while the handle is locked.
    pub bus_address: Option<BusAddress>,
}

/// Drives firmware memory handles through allocate, lock, unlock and free.
///
/// Every transition is one mailbox exchange. Transitions that do not fit the
/// handle's current state are rejected without touching the mailbox, and a
/// failed exchange leaves the recorded state as it was. Handle zero is the
/// firmware's "no allocation" and every transition on it is a no-op.
///
/// The manager owns its mailbox, so `&mut self` serializes transitions. Wrap
/// the manager in a mutex to share it between threads.
#[derive(Debug)]
pub struct MemoryManager<M> {
    mailbox: M,
    config: ManagerConfig,
    table: HashMap<Handle, Allocation>,
}

impl<M: Mailbox> MemoryManager<M> {
    pub fn new(mailbox: M) -> Self {
        Self::with_config(mailbox, ManagerConfig::default())
    }

    pub fn with_config(mailbox: M, config: ManagerConfig) -> Self {
        Self {
            mailbox,
            config,
            table: HashMap::new(),
        }
    }

    /// Allocate `size` bytes (rounded up to whole pages).
    ///
    /// Returns [`Handle::NULL`] when the firmware has no memory to give;
    /// that is not an error.
    pub fn allocate(&mut self, size: u32, flags: AllocFlags) -> Result<Handle> {
        self.allocate_aligned(size, self.config.alignment, flags)
    }

    /// Allocate with an explicit alignment.
    pub fn allocate_aligned(
        &mut self,
        size: u32,
        alignment: u32,
        flags: AllocFlags,
    ) -> Result<Handle> {
        if !alignment.is_power_of_two() {
            return Err(MemError::BadAlignment(alignment));
        }
        let rounded = page_roundup(size as usize)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(MemError::SizeOverflow(size))?;

        let words = self
            .mailbox
            .call(Tag::AllocateMemory, &[rounded, alignment, flags.bits()])?;
        let handle = Handle(words.first().unwrap_or(0));
        if handle.is_null() {
            warn!(size = rounded, %flags, "firmware returned no allocation");
            return Ok(Handle::NULL);
        }

        // A reissued live handle keeps its recorded state and bus address.
        self.check(handle, Transition::Allocate)?;
        self.table.insert(
            handle,
            Allocation {
                handle,
                size: rounded,
                flags,
                state: HandleState::Allocated,
                bus_address: None,
            },
        );
        debug!(%handle, size = rounded, %flags, "allocated");
        Ok(handle)
    }

    /// Lock an allocation and return its bus address.
    pub fn lock(&mut self, handle: Handle) -> Result<BusAddress> {
        if handle.is_null() {
            return Ok(BusAddress::NULL);
        }
        self.check(handle, Transition::Lock)?;

        let words = self.mailbox.call(Tag::LockMemory, &[handle.0])?;
        let bus = BusAddress(words.first().unwrap_or(0));
        if bus.is_null() {
            warn!(%handle, "firmware refused lock");
            return Err(MemError::LockRejected(handle));
        }

        self.advance(handle, Transition::Lock, Some(bus));
        debug!(%handle, %bus, "locked");
        Ok(bus)
    }

    /// Unlock a locked allocation. Returns the firmware status (always 0).
    ///
    /// Unlocking a handle this manager never allocated is a no-op.
    pub fn unlock(&mut self, handle: Handle) -> Result<u32> {
        if handle.is_null() || self.state(handle) == HandleState::Unallocated {
            return Ok(0);
        }
        self.check(handle, Transition::Unlock)?;
        self.status_call(Tag::UnlockMemory, handle)?;
        self.advance(handle, Transition::Unlock, None);
        debug!(%handle, "unlocked");
        Ok(0)
    }

    /// Free an allocated or unlocked handle. Returns the firmware status
    /// (always 0).
    ///
    /// Freeing a handle this manager never allocated is a no-op.
    pub fn free(&mut self, handle: Handle) -> Result<u32> {
        if handle.is_null() || self.state(handle) == HandleState::Unallocated {
            return Ok(0);
        }
        self.check(handle, Transition::Free)?;
        self.status_call(Tag::ReleaseMemory, handle)?;
        self.advance(handle, Transition::Free, None);
        debug!(%handle, "freed");
        Ok(0)
    }

    /// Unlock if locked, then free. No-op for handles that are not live.
    pub fn release(&mut self, handle: Handle) -> Result<()> {
        if self.state(handle) == HandleState::Locked {
            self.unlock(handle)?;
        }
        if matches!(self.state(handle), HandleState::Allocated | HandleState::Unlocked) {
            self.free(handle)?;
        }
        Ok(())
    }

    /// Release every live handle, stopping at the first failure.
    pub fn release_all(&mut self) -> Result<()> {
        let mut live: Vec<Handle> = self.live_handles().collect();
        live.sort();
        for handle in live {
            self.release(handle)?;
        }
        Ok(())
    }

    /// Run code at `addr`, which must lie inside a locked allocation.
    pub fn execute(&mut self, addr: BusAddress, arg: u32) -> Result<i32> {
        self.execute_with_registers(addr, [arg, 0, 0, 0, 0, 0])
    }

    /// Run code at `addr` with all six argument registers.
    pub fn execute_with_registers(
        &mut self,
        addr: BusAddress,
        registers: [u32; exec::EXECUTE_REGISTERS],
    ) -> Result<i32> {
        if addr.is_null() || self.locked_containing(addr).is_none() {
            return Err(MemError::NotLocked(addr));
        }
        exec::execute_with_registers(&mut self.mailbox, addr, registers)
    }

    /// The locked allocation whose bus range covers `addr`.
    pub fn locked_containing(&self, addr: BusAddress) -> Option<&Allocation> {
        self.table.values().find(|a| {
            a.state == HandleState::Locked
                && a.bus_address
                    .is_some_and(|bus| addr.0 >= bus.0 && addr.0 - bus.0 < a.size)
        })
    }

    /// Current state of `handle`; handles never seen are unallocated.
    pub fn state(&self, handle: Handle) -> HandleState {
        self.table
            .get(&handle)
            .map(|a| a.state)
            .unwrap_or(HandleState::Unallocated)
    }

    pub fn allocation(&self, handle: Handle) -> Option<&Allocation> {
        self.table.get(&handle)
    }

    /// Bus address of `handle` while it is locked.
    pub fn bus_address(&self, handle: Handle) -> Option<BusAddress> {
        self.table.get(&handle).and_then(|a| a.bus_address)
    }

    /// Handles the firmware still holds memory for.
    pub fn live_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.table
            .values()
            .filter(|a| a.state.is_live())
            .map(|a| a.handle)
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    pub fn mailbox_mut(&mut self) -> &mut M {
        &mut self.mailbox
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Give back the mailbox. Live handles are not released.
    pub fn into_inner(self) -> M {
        self.mailbox
    }

    fn check(&self, handle: Handle, op: Transition) -> Result<()> {
        let state = self.state(handle);
        if op.allowed_from(state) {
            Ok(())
        } else {
            warn!(%handle, %state, %op, "rejected lifecycle transition");
            Err(MemError::InvalidStateTransition { handle, state, op })
        }
    }

    fn advance(&mut self, handle: Handle, op: Transition, bus_address: Option<BusAddress>) {
        if let Some(entry) = self.table.get_mut(&handle) {
            entry.state = op.target();
            entry.bus_address = bus_address;
        }
    }

    fn status_call(&mut self, tag: Tag, handle: Handle) -> Result<()> {
        let words = self.mailbox.call(tag, &[handle.0])?;
        let status = words.first().ok_or(MemError::EmptyResponse(tag))?;
        if status != 0 {
            warn!(%handle, %tag, status, "firmware rejected transition");
            return Err(MemError::FirmwareStatus { tag, status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{CacheMode, InitMode};
    use crate::sim::Simulator;

    fn manager() -> MemoryManager<Simulator> {
        MemoryManager::new(Simulator::new())
    }

    fn direct_zero() -> AllocFlags {
        AllocFlags::new().cache(CacheMode::Direct).init(InitMode::Zero)
    }

    #[test]
    fn allocation_size_is_page_rounded() {
        let mut mgr = manager();
        let handle = mgr.allocate(0xffff, direct_zero()).unwrap();
        let allocation = mgr.allocation(handle).unwrap();
        assert_eq!(allocation.size, 0x10000);
        assert_eq!(allocation.state, HandleState::Allocated);
        assert_eq!(allocation.flags, direct_zero());
    }

    #[test]
    fn lock_twice_is_rejected_without_exchange() {
        let mut mgr = manager();
        let handle = mgr.allocate(4096, direct_zero()).unwrap();
        mgr.lock(handle).unwrap();
        let before = mgr.mailbox().exchanges();

        let err = mgr.lock(handle).unwrap_err();
        assert!(matches!(
            err,
            MemError::InvalidStateTransition {
                state: HandleState::Locked,
                op: Transition::Lock,
                ..
            }
        ));
        assert_eq!(mgr.mailbox().exchanges(), before);
    }

    #[test]
    fn free_while_locked_is_rejected() {
        let mut mgr = manager();
        let handle = mgr.allocate(4096, direct_zero()).unwrap();
        mgr.lock(handle).unwrap();
        assert!(matches!(
            mgr.free(handle),
            Err(MemError::InvalidStateTransition { .. })
        ));
        assert_eq!(mgr.state(handle), HandleState::Locked);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut mgr = manager();
        let handle = mgr.allocate(4096, direct_zero()).unwrap();
        mgr.free(handle).unwrap();
        assert_eq!(mgr.state(handle), HandleState::Freed);
        assert!(matches!(
            mgr.free(handle),
            Err(MemError::InvalidStateTransition {
                state: HandleState::Freed,
                ..
            })
        ));
    }

    #[test]
    fn lock_of_unknown_handle_is_rejected() {
        let mut mgr = manager();
        let err = mgr.lock(Handle(77)).unwrap_err();
        assert!(matches!(
            err,
            MemError::InvalidStateTransition {
                state: HandleState::Unallocated,
                op: Transition::Lock,
                ..
            }
        ));
        assert_eq!(mgr.mailbox().exchanges(), 0);
    }

    #[test]
    fn bad_alignment_is_rejected() {
        let mut mgr = manager();
        assert!(matches!(
            mgr.allocate_aligned(4096, 3, AllocFlags::new()),
            Err(MemError::BadAlignment(3))
        ));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let mut mgr = manager();
        assert!(matches!(
            mgr.allocate(u32::MAX, AllocFlags::new()),
            Err(MemError::SizeOverflow(u32::MAX))
        ));
        assert_eq!(mgr.mailbox().exchanges(), 0);
    }

    #[test]
    fn execute_requires_locked_address() {
        let mut mgr = manager();
        let handle = mgr.allocate(4096, direct_zero()).unwrap();
        let bus = mgr.lock(handle).unwrap();
        mgr.unlock(handle).unwrap();
        assert!(matches!(
            mgr.execute(bus, 1),
            Err(MemError::NotLocked(addr)) if addr == bus
        ));
    }

    #[test]
    fn execute_accepts_entry_inside_locked_allocation() {
        let mut mgr = manager();
        let handle = mgr.allocate(0x2000, direct_zero()).unwrap();
        let bus = mgr.lock(handle).unwrap();
        let entry = bus.offset(0x100).unwrap();
        mgr.mailbox_mut()
            .write(entry, &[0x10, 0x62, 0x5a, 0x00])
            .unwrap();

        assert_eq!(mgr.execute(entry, 1).unwrap(), 2);
        assert_eq!(mgr.locked_containing(entry).map(|a| a.handle), Some(handle));
    }

    #[test]
    fn execute_rejects_address_past_locked_allocation() {
        let mut mgr = manager();
        let handle = mgr.allocate(0x1000, direct_zero()).unwrap();
        let bus = mgr.lock(handle).unwrap();
        let past_end = bus.offset(0x1000).unwrap();
        let before = mgr.mailbox().exchanges();

        assert!(matches!(
            mgr.execute(past_end, 1),
            Err(MemError::NotLocked(addr)) if addr == past_end
        ));
        assert_eq!(mgr.mailbox().exchanges(), before);
    }

    /// Answers every allocate with the same handle and every lock with a
    /// fixed bus address.
    struct SameHandle {
        locks: usize,
    }

    impl Mailbox for SameHandle {
        fn exchange(&mut self, msg: &mut vcmbox_message::Message) -> vcmbox_transport::Result<()> {
            msg.words[0] = match Tag::from_u32(msg.tag) {
                Some(Tag::AllocateMemory) => 7,
                Some(Tag::LockMemory) => {
                    self.locks += 1;
                    0xC000_0000
                }
                _ => 0,
            };
            msg.data_len = vcmbox_message::RESPONSE_SUCCESS | 4;
            msg.code = vcmbox_message::RESPONSE_SUCCESS;
            Ok(())
        }
    }

    #[test]
    fn reissued_live_handle_keeps_its_lock() {
        let mut mgr = MemoryManager::new(SameHandle { locks: 0 });
        let handle = mgr.allocate(4096, direct_zero()).unwrap();
        let bus = mgr.lock(handle).unwrap();

        let err = mgr.allocate(4096, direct_zero()).unwrap_err();
        assert!(matches!(
            err,
            MemError::InvalidStateTransition {
                handle: Handle(7),
                state: HandleState::Locked,
                op: Transition::Allocate,
            }
        ));
        assert_eq!(mgr.state(handle), HandleState::Locked);
        assert_eq!(mgr.bus_address(handle), Some(bus));

        assert!(mgr.lock(handle).is_err());
        assert_eq!(mgr.mailbox().locks, 1);
    }

    #[test]
    fn release_all_returns_everything() {
        let mut mgr = manager();
        let a = mgr.allocate(4096, direct_zero()).unwrap();
        let b = mgr.allocate(8192, direct_zero()).unwrap();
        mgr.lock(b).unwrap();
        mgr.release_all().unwrap();
        assert_eq!(mgr.state(a), HandleState::Freed);
        assert_eq!(mgr.state(b), HandleState::Freed);
        assert_eq!(mgr.live_handles().count(), 0);
        assert_eq!(mgr.mailbox().live_blocks(), 0);
    }

    #[test]
    fn allocation_serializes_for_reports() {
        let mut mgr = manager();
        let handle = mgr.allocate(100, direct_zero()).unwrap();
        mgr.lock(handle).unwrap();
        let json = serde_json::to_value(mgr.allocation(handle).unwrap()).unwrap();
        assert_eq!(json["state"], "locked");
        assert_eq!(json["size"], 4096);
        assert_eq!(json["flags"]["cache"], "direct");
    }
}
