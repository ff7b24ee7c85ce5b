use serde::Serialize;
use vcmbox_mem::{Handle, HandleState, MemError, MemoryManager, Transition};

use crate::cmd::backend::Backend;
use crate::cmd::{AllocArgs, Context};
use crate::exit::{mem_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{hex, print_report, Report};

#[derive(Debug, Serialize)]
struct Step {
    op: Transition,
    state: HandleState,
    value: u32,
}

#[derive(Debug, Serialize)]
struct AllocReport {
    backend: &'static str,
    handle: u32,
    flags: String,
    steps: Vec<Step>,
}

impl Report for AllocReport {
    fn title(&self) -> &'static str {
        "vcmbox alloc"
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("backend", self.backend.to_string()),
            ("handle", self.handle.to_string()),
            ("flags", self.flags.clone()),
        ];
        for step in &self.steps {
            fields.push((step.op.name(), format!("{} {}", hex(step.value), step.state)));
        }
        fields
    }

    fn raw(&self) -> String {
        self.steps
            .last()
            .map(|step| step.state.to_string())
            .unwrap_or_default()
    }
}

pub fn run(args: AllocArgs, ctx: &Context) -> CliResult<i32> {
    let flags = args.flags();
    let mut manager = MemoryManager::new(Backend::open(ctx)?);
    let backend = manager.mailbox().name();

    let handle = manager
        .allocate(args.size, flags)
        .map_err(|err| mem_error("allocate failed", err))?;
    if handle.is_null() {
        return Err(CliError::new(
            FAILURE,
            format!("firmware refused to allocate {} bytes", args.size),
        ));
    }

    let mut steps = vec![Step {
        op: Transition::Allocate,
        state: manager.state(handle),
        value: handle.0,
    }];
    let outcome = probe(&mut manager, handle, &mut steps);
    let released = manager.release(handle);
    outcome.map_err(|err| mem_error("lifecycle probe failed", err))?;
    released.map_err(|err| mem_error("release failed", err))?;

    let report = AllocReport {
        backend,
        handle: handle.0,
        flags: flags.to_string(),
        steps,
    };
    print_report(&report, ctx.format);
    Ok(SUCCESS)
}

fn probe(
    manager: &mut MemoryManager<Backend>,
    handle: Handle,
    steps: &mut Vec<Step>,
) -> Result<(), MemError> {
    let bus = manager.lock(handle)?;
    steps.push(Step {
        op: Transition::Lock,
        state: manager.state(handle),
        value: bus.0,
    });

    let status = manager.unlock(handle)?;
    steps.push(Step {
        op: Transition::Unlock,
        state: manager.state(handle),
        value: status,
    });

    let status = manager.free(handle)?;
    steps.push(Step {
        op: Transition::Free,
        state: manager.state(handle),
        value: status,
    });
    Ok(())
}
