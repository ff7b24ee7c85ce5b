use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use vcmbox_mem::{AllocFlags, CacheMode, InitMode};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod alloc;
pub mod backend;
pub mod doctor;
pub mod exec;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy a routine into locked firmware memory and run it.
    Exec(ExecArgs),
    /// Walk one allocation through its lifecycle and report each step.
    Alloc(AllocArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub device: PathBuf,
    pub mem_device: PathBuf,
    pub timeout: Option<Duration>,
    pub simulate: bool,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Exec(args) => exec::run(args, ctx),
        Command::Alloc(args) => alloc::run(args, ctx),
        Command::Doctor(args) => doctor::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CacheArg {
    Normal,
    Direct,
    Coherent,
    L1NonAllocating,
}

impl From<CacheArg> for CacheMode {
    fn from(arg: CacheArg) -> Self {
        match arg {
            CacheArg::Normal => CacheMode::Normal,
            CacheArg::Direct => CacheMode::Direct,
            CacheArg::Coherent => CacheMode::Coherent,
            CacheArg::L1NonAllocating => CacheMode::L1NonAllocating,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum InitArg {
    Ones,
    Zero,
    Uninitialized,
}

impl From<InitArg> for InitMode {
    fn from(arg: InitArg) -> Self {
        match arg {
            InitArg::Ones => InitMode::Ones,
            InitArg::Zero => InitMode::Zero,
            InitArg::Uninitialized => InitMode::Uninitialized,
        }
    }
}

#[derive(Args, Debug)]
pub struct AllocArgs {
    /// Bytes to allocate (decimal or 0x-prefixed hex). Rounded up to a page.
    #[arg(long, default_value = "0xffff", value_parser = parse_u32)]
    pub size: u32,
    /// Cache behaviour of the bus alias handed out on lock.
    #[arg(long, value_enum, default_value = "direct")]
    pub cache: CacheArg,
    /// Initial contents of the allocation.
    #[arg(long, value_enum, default_value = "zero")]
    pub init: InitArg,
    /// Let the firmware discard the contents while unlocked.
    #[arg(long)]
    pub discardable: bool,
    /// Keep the allocation locked until freed.
    #[arg(long)]
    pub permalock: bool,
}

impl AllocArgs {
    pub fn flags(&self) -> AllocFlags {
        let mut flags = AllocFlags::new()
            .cache(self.cache.into())
            .init(self.init.into());
        if self.discardable {
            flags = flags.discardable();
        }
        if self.permalock {
            flags = flags.permalock();
        }
        flags
    }
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub alloc: AllocArgs,
    /// Read the routine from a file instead of using the built-in increment routine.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Value passed in r0.
    #[arg(long, default_value = "1", value_parser = parse_u32)]
    pub arg: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid number: {input}"))
}

pub fn parse_timeout(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
