use std::path::Path;

use serde::Serialize;
use tracing::info;
use vcmbox_mem::{BusAddress, Handle, MemoryManager};

use crate::cmd::backend::Backend;
use crate::cmd::{Context, ExecArgs};
use crate::exit::{io_error, mem_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{hex, print_report, Report};

/// `add r0, #1; rts`
pub const INCREMENT_ROUTINE: [u8; 4] = [0x10, 0x62, 0x5a, 0x00];

#[derive(Debug, Serialize)]
struct ExecReport {
    backend: &'static str,
    handle: u32,
    bus_address: u32,
    size: u32,
    flags: String,
    payload_bytes: usize,
    arg: u32,
    result: i32,
}

impl Report for ExecReport {
    fn title(&self) -> &'static str {
        "vcmbox exec"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("backend", self.backend.to_string()),
            ("handle", self.handle.to_string()),
            ("bus_address", hex(self.bus_address)),
            ("size", hex(self.size)),
            ("flags", self.flags.clone()),
            ("payload_bytes", self.payload_bytes.to_string()),
            ("arg", self.arg.to_string()),
            ("result", self.result.to_string()),
        ]
    }

    fn raw(&self) -> String {
        self.result.to_string()
    }
}

pub fn run(args: ExecArgs, ctx: &Context) -> CliResult<i32> {
    let payload = match &args.file {
        Some(path) => read_payload(path)?,
        None => INCREMENT_ROUTINE.to_vec(),
    };
    if payload.len() > args.alloc.size as usize {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes but the allocation is only {} bytes",
                payload.len(),
                args.alloc.size
            ),
        ));
    }

    let flags = args.alloc.flags();
    let mut manager = MemoryManager::new(Backend::open(ctx)?);
    let backend = manager.mailbox().name();

    let handle = manager
        .allocate(args.alloc.size, flags)
        .map_err(|err| mem_error("allocate failed", err))?;
    if handle.is_null() {
        return Err(CliError::new(
            FAILURE,
            format!("firmware refused to allocate {} bytes", args.alloc.size),
        ));
    }

    let size = manager
        .allocation(handle)
        .map_or(args.alloc.size, |allocation| allocation.size);
    let outcome = run_locked(&mut manager, handle, &payload, args.arg);
    let released = manager.release(handle);
    let (bus, result) = outcome?;
    released.map_err(|err| mem_error("release failed", err))?;

    info!(%handle, %bus, result, "routine finished");
    let report = ExecReport {
        backend,
        handle: handle.0,
        bus_address: bus.0,
        size,
        flags: flags.to_string(),
        payload_bytes: payload.len(),
        arg: args.arg,
        result,
    };
    print_report(&report, ctx.format);
    Ok(SUCCESS)
}

fn read_payload(path: &Path) -> CliResult<Vec<u8>> {
    let payload =
        std::fs::read(path).map_err(|err| io_error(&format!("read {}", path.display()), err))?;
    if payload.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} is empty", path.display()),
        ));
    }
    Ok(payload)
}

fn run_locked(
    manager: &mut MemoryManager<Backend>,
    handle: Handle,
    payload: &[u8],
    arg: u32,
) -> CliResult<(BusAddress, i32)> {
    let bus = manager
        .lock(handle)
        .map_err(|err| mem_error("lock failed", err))?;
    manager.mailbox_mut().load(bus, payload)?;
    let result = manager
        .execute(bus, arg)
        .map_err(|err| mem_error("execute failed", err))?;
    Ok((bus, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_routine_is_add_then_return() {
        let words: Vec<u16> = INCREMENT_ROUTINE
            .chunks(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(words, vec![0x6210, 0x005a]);
    }
}
