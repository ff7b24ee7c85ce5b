mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "vcmbox", version, about = "VideoCore mailbox memory and execution CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Mailbox character device.
    #[arg(
        long,
        value_name = "PATH",
        env = "VCMBOX_DEVICE",
        default_value = "/dev/vcio",
        global = true
    )]
    device: PathBuf,

    /// Physical memory device used to copy payloads.
    #[arg(
        long,
        value_name = "PATH",
        env = "VCMBOX_MEM_DEVICE",
        default_value = "/dev/mem",
        global = true
    )]
    mem_device: PathBuf,

    /// Deadline for each firmware exchange (e.g. 5s, 500ms). Default: wait forever.
    #[arg(long, value_name = "DURATION", global = true)]
    timeout: Option<String>,

    /// Answer requests from the in-process firmware simulator instead of the device.
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::parse_timeout(cli.timeout.as_deref()).and_then(|timeout| {
        let ctx = Context {
            format,
            device: cli.device,
            mem_device: cli.mem_device,
            timeout,
            simulate: cli.simulate,
        };
        cmd::run(cli.command, &ctx)
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
