use vcmbox_message::MAX_MESSAGE_BYTES;
#[cfg(unix)]
use vcmbox_transport::IOCTL_MBOX_PROPERTY;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vcmbox {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vcmbox");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("VCMBOX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("VCMBOX_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("VCMBOX_RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("VCMBOX_GIT_HASH").unwrap_or("unknown"));
    println!("max_message_bytes: {MAX_MESSAGE_BYTES}");
    #[cfg(unix)]
    println!("ioctl_mbox_property: {IOCTL_MBOX_PROPERTY:#x}");
    println!("features: cli=true, unix={}", cfg!(unix));

    Ok(SUCCESS)
}
