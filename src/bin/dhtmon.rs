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
use dhtmon::config::MonitorConfig;
use dhtmon::delay::ThreadDelay;
use dhtmon::indicator::open_indicators;
use dhtmon::lcd::{open_lcd, DEFAULT_ADDRESS};
use dhtmon::monitor::Monitor;
use dhtmon::sensor::{open_pin, DhtSensor};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::task;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_SERIAL_PATH: &str = "/dev/serial0";
const DEFAULT_I2C_BUS: u8 = 1;

/// BCM GPIO pin numbers of the red, green, and blue indicators
#[derive(Debug, Clone, Copy)]
struct LedPins {
    red: u8,
    green: u8,
    blue: u8,
}

fn parse_led_pins(s: &str) -> Result<LedPins, String> {
    let pins = s
        .split(',')
        .map(|p| p.trim().parse::<u8>().map_err(|e| format!("invalid pin '{}': {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;

    match pins.as_slice() {
        [red, green, blue] => Ok(LedPins {
            red: *red,
            green: *green,
            blue: *blue,
        }),
        _ => Err(format!("expected three comma separated pins, got {}", pins.len())),
    }
}

fn parse_i2c_address(s: &str) -> Result<u16, String> {
    let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };

    res.map_err(|e| format!("invalid I2C address '{}': {}", s, e))
}

/// Report temperature and humidity from a DHT sensor over a serial line
///
/// Read temperature and humidity from a DHT11 or DHT22 sensor connected to a data
/// pin of a local machine, usually a Raspberry PI, every two seconds and write each
/// reading to a serial port. Commands received over the same serial port switch one
/// of three indicator LEDs on. Readings can also be shown on a 16x2 LCD.
///
/// All pins are numbered based on the Broadcom SOC channel, not the physical pin
/// numbers of the header.
#[derive(Debug, Parser)]
#[clap(name = "dhtmon", version = clap::crate_version ! ())]
struct DhtmonApplication {
    /// BCM GPIO pin number the sensor data line is connected to
    #[arg(long)]
    bcm_pin: u8,

    /// BCM GPIO pin numbers of the red, green, and blue LEDs, comma separated.
    /// Commands are only read when LEDs are connected
    #[arg(long, value_parser = parse_led_pins)]
    led_pins: Option<LedPins>,

    /// Show readings on a 16x2 LCD connected via an I2C backpack
    #[arg(long)]
    lcd: bool,

    /// I2C address of the LCD backpack (usually 0x27 or 0x3F)
    #[arg(long, default_value_t = DEFAULT_ADDRESS, value_parser = parse_i2c_address)]
    lcd_address: u16,

    /// I2C bus the LCD is connected to
    #[arg(long, default_value_t = DEFAULT_I2C_BUS)]
    lcd_bus: u8,

    /// Serial device to write readings to and read commands from
    #[arg(long, default_value = DEFAULT_SERIAL_PATH)]
    serial: PathBuf,

    /// Use stdin and stdout instead of a serial device
    #[arg(long)]
    stdio: bool,

    /// JSON file with the sensor model, unit, delays, and command names to use
    #[arg(long)]
    config: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = DhtmonApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = match opts.config.as_ref() {
        Some(path) => MonitorConfig::from_path(path).unwrap_or_else(|e| {
            tracing::error!(message = "failed to load configuration", path = %path.display(), error = %e);
            process::exit(1)
        }),
        None => MonitorConfig::default(),
    };

    let pin = open_pin(opts.bcm_pin).unwrap_or_else(|e| {
        tracing::error!(message = "failed to initialize data pin", bcm_pin = opts.bcm_pin, error = %e);
        process::exit(1)
    });

    let channel: Box<dyn TextChannel + Send> = if opts.stdio {
        Box::new(StdioChannel::new())
    } else {
        Box::new(SerialChannel::open(&opts.serial, config.baud_rate).unwrap_or_else(|e| {
            tracing::error!(message = "failed to open serial device", path = %opts.serial.display(), error = %e);
            process::exit(1)
        }))
    };

    let sensor = DhtSensor::from_pin(config.model, pin);
    let mut monitor = Monitor::new(config, sensor, channel, ThreadDelay);

    if let Some(pins) = opts.led_pins {
        let indicators = open_indicators(pins.red, pins.green, pins.blue).unwrap_or_else(|e| {
            tracing::error!(message = "failed to initialize indicator pins", error = %e);
            process::exit(1)
        });

        monitor = monitor.with_indicators(indicators);
    }

    if opts.lcd {
        let lcd = open_lcd(opts.lcd_bus, opts.lcd_address).unwrap_or_else(|e| {
            tracing::error!(
                message = "failed to initialize LCD",
                bus = opts.lcd_bus,
                address = opts.lcd_address,
                error = %e,
            );
            process::exit(1)
        });

        monitor = monitor.with_display(lcd);
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    // The monitor loop blocks for the entire time it runs (reading the sensor,
    // waiting between cycles) so it gets a dedicated thread.
    let mut handle = task::spawn_blocking(move || {
        monitor.boot();
        monitor.run(&flag);
    });

    tracing::info!(
        message = "starting monitor",
        bcm_pin = opts.bcm_pin,
        leds = opts.led_pins.is_some(),
        lcd = opts.lcd,
    );

    // Wait for either SIGTERM or SIGINT to shutdown
    tokio::select! {
        _ = sigterm() => {}
        _ = sigint() => {}
        res = &mut handle => {
            tracing::error!("monitor loop exited unexpectedly");
            return res.map_err(|e| e.into());
        }
    }

    tracing::info!("stopping monitor after current cycle");
    running.store(false, Ordering::Release);
    handle.await?;

    tracing::info!("monitor shutdown");
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

#[cfg(test)]
mod test {
    use super::{parse_i2c_address, parse_led_pins};

    #[test]
    fn test_parse_led_pins() {
        let pins = parse_led_pins("17, 27,22").unwrap();
        assert_eq!((17, 27, 22), (pins.red, pins.green, pins.blue));
    }

    #[test]
    fn test_parse_led_pins_invalid() {
        assert!(parse_led_pins("17,27").is_err());
        assert!(parse_led_pins("17,27,22,23").is_err());
        assert!(parse_led_pins("17,red,22").is_err());
    }

    #[test]
    fn test_parse_i2c_address() {
        assert_eq!(Ok(0x27), parse_i2c_address("0x27"));
        assert_eq!(Ok(0x3F), parse_i2c_address("0X3f"));
        assert_eq!(Ok(39), parse_i2c_address("39"));
        assert!(parse_i2c_address("0xZZ").is_err());
    }
}
