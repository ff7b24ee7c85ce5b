use std::fmt;
use std::io;

use vcmbox_mem::MemError;
use vcmbox_transport::TransportError;

// Process exit codes. 64 and up follow sysexits/coreutils conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(&err), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::DeviceUnavailable { source, .. }
        | TransportError::MappingFailed { source, .. } => io_code(source),
        TransportError::IoctlFailed(_)
        | TransportError::Message(_)
        | TransportError::Busy => TRANSPORT_ERROR,
        TransportError::Timeout(_) => TIMEOUT,
        TransportError::OutOfBounds { .. } => DATA_INVALID,
        TransportError::Closed => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn mem_error(context: &str, err: MemError) -> CliError {
    match err {
        MemError::Transport(err) => transport_error(context, err),
        MemError::LockRejected(_) | MemError::FirmwareStatus { .. } | MemError::EmptyResponse(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        MemError::SizeOverflow(_) | MemError::BadAlignment(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
