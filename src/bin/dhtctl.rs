// dhtmon - DHT sensor monitor with serial commands, indicator LEDs, and LCD output
//
// Copyright 2021 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use dhtmon::channel::{SerialChannel, StdioChannel, TextChannel};
use dhtmon::config::{ControllerConfig, DEFAULT_BAUD_RATE};
use dhtmon::controller::Controller;
use dhtmon::delay::ThreadDelay;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::task;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_SERIAL_PATH: &str = "/dev/ttyACM0";

/// Switch monitor LEDs based on the temperature it reports
///
/// Read report lines written by `dhtmon` (or a compatible device) from a serial port
/// and send a command back to turn on the red LED when it's hot, the blue LED when
/// it's cold, and the green LED otherwise. All LEDs are turned off on shutdown.
#[derive(Debug, Parser)]
#[clap(name = "dhtctl", version = clap::crate_version ! ())]
struct DhtctlApplication {
    /// Serial device the monitor is connected to
    #[arg(long, default_value = DEFAULT_SERIAL_PATH)]
    serial: PathBuf,

    /// Bit rate of the serial device
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    /// Use stdin and stdout instead of a serial device
    #[arg(long)]
    stdio: bool,

    /// JSON file with thresholds, valid ranges, and command names to use
    #[arg(long)]
    config: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = DhtctlApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = match opts.config.as_ref() {
        Some(path) => ControllerConfig::from_path(path).unwrap_or_else(|e| {
            tracing::error!(message = "failed to load configuration", path = %path.display(), error = %e);
            process::exit(1)
        }),
        None => ControllerConfig::default(),
    };

    let channel: Box<dyn TextChannel + Send> = if opts.stdio {
        Box::new(StdioChannel::new())
    } else {
        Box::new(SerialChannel::open(&opts.serial, opts.baud_rate).unwrap_or_else(|e| {
            tracing::error!(message = "failed to open serial device", path = %opts.serial.display(), error = %e);
            process::exit(1)
        }))
    };

    tracing::info!(
        message = "starting controller",
        hot = config.temp_hot_threshold,
        cold = config.temp_cold_threshold,
    );

    let mut controller = Controller::new(config, channel);
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let mut handle = task::spawn_blocking(move || {
        controller.run(&flag, &mut ThreadDelay);
    });

    tokio::select! {
        _ = sigterm() => {}
        _ = sigint() => {}
        res = &mut handle => {
            tracing::error!("controller loop exited unexpectedly");
            return res.map_err(|e| e.into());
        }
    }

    running.store(false, Ordering::Release);
    handle.await?;

    tracing::info!("controller shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
