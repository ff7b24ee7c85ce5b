use serde::Serialize;
use vcmbox_message::Tag;
use vcmbox_transport::Mailbox;

use crate::cmd::backend::Backend;
use crate::cmd::{Context, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{hex, OutputFormat};

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, ctx: &Context) -> CliResult<i32> {
    let mut checks = vec![platform_check(), mailbox_device_check(ctx), mem_device_check(ctx)];
    checks.extend(firmware_checks(ctx));
    checks.push(compiled_features_check());

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, ctx.format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("vcmbox doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<20} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_check() -> CheckResult {
    #[cfg(unix)]
    {
        CheckResult::new(
            "platform",
            CheckStatus::Pass,
            format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        )
    }

    #[cfg(not(unix))]
    {
        CheckResult::new(
            "platform",
            CheckStatus::Fail,
            "mailbox device access requires a Unix target",
        )
    }
}

fn mailbox_device_check(ctx: &Context) -> CheckResult {
    if ctx.simulate {
        return CheckResult::new("mailbox_device", CheckStatus::Skip, "simulator in use");
    }

    #[cfg(unix)]
    {
        use vcmbox_transport::{Channel, ChannelConfig};

        let config = ChannelConfig {
            device_path: ctx.device.clone(),
            timeout: ctx.timeout,
        };
        match Channel::open_with_config(config) {
            Ok(_) => CheckResult::new(
                "mailbox_device",
                CheckStatus::Pass,
                format!("{} opened", ctx.device.display()),
            ),
            Err(err) => CheckResult::new("mailbox_device", CheckStatus::Fail, err.to_string()),
        }
    }

    #[cfg(not(unix))]
    {
        CheckResult::new("mailbox_device", CheckStatus::Skip, "not supported")
    }
}

fn mem_device_check(ctx: &Context) -> CheckResult {
    if ctx.simulate {
        return CheckResult::new("mem_device", CheckStatus::Skip, "simulator in use");
    }

    #[cfg(unix)]
    {
        use vcmbox_transport::{MemConfig, PhysMem};

        let config = MemConfig {
            device_path: ctx.mem_device.clone(),
        };
        match PhysMem::open_with_config(&config) {
            Ok(mem) => CheckResult::new(
                "mem_device",
                CheckStatus::Pass,
                format!("{} opened read-write", mem.path().display()),
            ),
            Err(err) => CheckResult::new("mem_device", CheckStatus::Fail, err.to_string()),
        }
    }

    #[cfg(not(unix))]
    {
        CheckResult::new("mem_device", CheckStatus::Skip, "not supported")
    }
}

fn firmware_checks(ctx: &Context) -> Vec<CheckResult> {
    let mut backend = match Backend::open(ctx) {
        Ok(backend) => backend,
        Err(err) => {
            return vec![CheckResult::new(
                "firmware_revision",
                CheckStatus::Skip,
                format!("no mailbox: {err}"),
            )];
        }
    };

    let firmware = match backend.call(Tag::GetFirmwareRevision, &[]) {
        Ok(words) => CheckResult::new(
            "firmware_revision",
            CheckStatus::Pass,
            words.first().map(hex).unwrap_or_else(|| "empty response".to_string()),
        ),
        Err(err) => {
            return vec![CheckResult::new(
                "firmware_revision",
                CheckStatus::Fail,
                err.to_string(),
            )];
        }
    };

    let board = match backend.call(Tag::GetBoardRevision, &[]) {
        Ok(words) => CheckResult::new(
            "board_revision",
            CheckStatus::Info,
            words.first().map(hex).unwrap_or_else(|| "empty response".to_string()),
        ),
        Err(err) => CheckResult::new("board_revision", CheckStatus::Info, err.to_string()),
    };

    vec![firmware, board]
}

fn compiled_features_check() -> CheckResult {
    CheckResult::new(
        "compiled_features",
        CheckStatus::Info,
        format!("cli=true, unix={}", cfg!(unix)),
    )
}
