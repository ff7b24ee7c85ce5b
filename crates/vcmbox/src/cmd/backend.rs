use tracing::debug;
use vcmbox_mem::{BusAddress, Simulator};
use vcmbox_message::Message;
use vcmbox_transport::{Mailbox, Result as TransportResult};
#[cfg(unix)]
use vcmbox_transport::{map_segment, Channel, ChannelConfig, MemConfig};

use crate::cmd::Context;
use crate::exit::{mem_error, CliResult};
#[cfg(unix)]
use crate::exit::transport_error;
#[cfg(not(unix))]
use crate::exit::{CliError, FAILURE};

/// Where firmware requests go: the real device or the in-process simulator.
pub enum Backend {
    #[cfg(unix)]
    Device { channel: Channel, mem: MemConfig },
    Simulated(Simulator),
}

impl Backend {
    pub fn open(ctx: &Context) -> CliResult<Self> {
        if ctx.simulate {
            debug!("using firmware simulator");
            return Ok(Self::Simulated(Simulator::new()));
        }
        Self::open_device(ctx)
    }

    #[cfg(unix)]
    fn open_device(ctx: &Context) -> CliResult<Self> {
        let channel = Channel::open_with_config(ChannelConfig {
            device_path: ctx.device.clone(),
            timeout: ctx.timeout,
        })
        .map_err(|err| transport_error("mailbox open failed", err))?;
        Ok(Self::Device {
            channel,
            mem: MemConfig {
                device_path: ctx.mem_device.clone(),
            },
        })
    }

    #[cfg(not(unix))]
    fn open_device(_ctx: &Context) -> CliResult<Self> {
        Err(CliError::new(
            FAILURE,
            "the mailbox device is only available on Unix targets; use --simulate",
        ))
    }

    /// Copy `payload` into locked memory starting at `bus`.
    pub fn load(&mut self, bus: BusAddress, payload: &[u8]) -> CliResult<()> {
        match self {
            #[cfg(unix)]
            Self::Device { mem, .. } => {
                let mut segment = map_segment(mem, bus.to_phys(), payload.len())
                    .map_err(|err| transport_error("map failed", err))?;
                segment
                    .copy_from(payload)
                    .map_err(|err| transport_error("copy failed", err))?;
                debug!(%bus, bytes = payload.len(), "payload copied");
                Ok(())
            }
            Self::Simulated(sim) => sim
                .write(bus, payload)
                .map_err(|err| mem_error("copy failed", err)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Device { .. } => "device",
            Self::Simulated(_) => "simulator",
        }
    }
}

impl Mailbox for Backend {
    fn exchange(&mut self, message: &mut Message) -> TransportResult<()> {
        match self {
            #[cfg(unix)]
            Self::Device { channel, .. } => channel.exchange(message),
            Self::Simulated(sim) => sim.exchange(message),
        }
    }
}
