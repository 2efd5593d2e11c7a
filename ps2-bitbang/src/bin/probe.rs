//! Run the PS/2 mouse handshake against the simulated device.
//!
//! Usage: `ps2-probe [config.json]`. Without an argument the config is
//! taken from `PS2_PROBE_CONFIG`, or defaults. Exits non-zero if the
//! handshake fails.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use ps2_bitbang::config::Config;
use ps2_bitbang::peripheral::Ps2Mouse;
use ps2_bitbang::ps2::Ps2Transport;
use ps2_bitbang::sim::{SimBus, SimLine, SimMouse};
use ps2_bitbang::tracing::{self, prelude::*};

fn main() -> Result<ExitCode> {
    tracing::init_journald_or_stdout();

    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(Path::new(&path))?,
        None => Config::load()?,
    };
    debug!(?config, "Loaded configuration");

    let bus = SimBus::new(SimMouse::new(config.simulation.clone()));
    let transport =
        Ps2Transport::with_config(bus, SimLine::Clock, SimLine::Data, &config.transport);
    let mut mouse = Ps2Mouse::new(transport);

    if !mouse.initialize() {
        error!("Mouse did not complete the handshake.");
        return Ok(ExitCode::FAILURE);
    }

    for n in 0..config.polls {
        match mouse.poll() {
            Ok(packet) => info!(
                n,
                "Packet {:02X} {:02X} {:02X}", packet[0], packet[1], packet[2]
            ),
            Err(e) => {
                error!("Poll failed: {}", e);
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    let bus = mouse.into_transport().into_platform();
    info!(
        elapsed_us = bus.elapsed().as_micros() as u64,
        frames = bus.device().frames(),
        "Done."
    );
    Ok(ExitCode::SUCCESS)
}
