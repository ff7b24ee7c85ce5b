use tracing::debug;
use vcmbox_message::Tag;
use vcmbox_transport::Mailbox;

use crate::error::{MemError, Result};
use crate::handle::BusAddress;

/// Argument registers (r0..r5) carried by an execute request.
pub const EXECUTE_REGISTERS: usize = 6;

/// Run the code at `addr` on the co-processor with `arg` in r0 and return r0.
///
/// Blocks until the routine returns. Nothing here checks that `addr` is
/// locked or holds valid instructions; [`MemoryManager::execute`] checks the
/// former.
///
/// [`MemoryManager::execute`]: crate::MemoryManager::execute
pub fn execute<M: Mailbox + ?Sized>(mailbox: &mut M, addr: BusAddress, arg: u32) -> Result<i32> {
    execute_with_registers(mailbox, addr, [arg, 0, 0, 0, 0, 0])
}

/// Run the code at `addr` with r0..r5 preloaded.
pub fn execute_with_registers<M: Mailbox + ?Sized>(
    mailbox: &mut M,
    addr: BusAddress,
    registers: [u32; EXECUTE_REGISTERS],
) -> Result<i32> {
    let mut args = [0u32; EXECUTE_REGISTERS + 1];
    args[0] = addr.0;
    args[1..].copy_from_slice(&registers);

    let words = mailbox.call(Tag::ExecuteCode, &args)?;
    let r0 = words
        .first()
        .ok_or(MemError::EmptyResponse(Tag::ExecuteCode))? as i32;
    debug!(%addr, r0, "executed co-processor code");
    Ok(r0)
}
