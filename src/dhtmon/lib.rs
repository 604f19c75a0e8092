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

//! Read a DHT11 or DHT22 sensor, report readings over a serial line, and drive
//! indicator LEDs and an LCD.
//!
//! ## Features
//!
//! `dhtmon` reads temperature and humidity from a [DHT sensor](https://learn.adafruit.com/dht)
//! connected to a GPIO pin of a Raspberry PI every two seconds and writes a report line
//! to a serial port (or stdout):
//!
//! ```text
//! Temperature: 72.00 °F, Humidity: 45.00%
//! ```
//!
//! Optionally, three LEDs (red, green, and blue) can be connected to GPIO pins and switched
//! by sending one of the following commands, terminated by a newline, over the same serial
//! port. At most one command is handled per reading. Any other line turns all LEDs off and
//! is echoed back as `Unknown command: <line>`.
//!
//! * `LED_RED` - Turn on the red LED (`Red LED ON`).
//! * `LED_GREEN` - Turn on the green LED (`Green LED ON`).
//! * `LED_BLUE` - Turn on the blue LED (`Blue LED ON`).
//!
//! A 16x2 character LCD with a PCF8574 I2C backpack can be used to show the latest reading.
//! If the sensor can't be read, `ERROR: Failed to read sensor` is written instead of a report
//! and the LCD shows an error until the next successful reading.
//!
//! The `dhtctl` binary is the other end of the serial line: it parses report lines and sends
//! `LED_RED` when it's hot, `LED_BLUE` when it's cold, and `LED_GREEN` otherwise.
//!
//! ## Build
//!
//! `dhtmon` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//! Since it's meant to be run on a Raspberry PI, you will also likely need to cross-compile it.
//!
//! ```text
//! rustup target add armv7-unknown-linux-musleabihf
//! cargo build --release --target armv7-unknown-linux-musleabihf
//! ```
//!
//! ## Run
//!
//! In order to read and write the device `/dev/gpiomem`, `dhtmon` must run as `root` or a
//! member of the `gpio` group. Pin numbers are BCM GPIO numbers, not physical pin numbers.
//!
//! ```text
//! dhtmon --bcm-pin 4 --led-pins 17,27,22 --lcd --serial /dev/serial0
//! ```
//!
//! Behavior (sensor model, unit, delays, and command names) can be changed with a JSON
//! file passed via `--config`. All fields are optional.
//!
//! ```json
//! {
//!   "model": "dht11",
//!   "unit": "fahrenheit",
//!   "baud_rate": 9600,
//!   "settle_delay_ms": 1000,
//!   "cycle_delay_ms": 2000,
//!   "error_delay_ms": 2000,
//!   "display_columns": 16,
//!   "display_rows": 2,
//!   "vocabulary": { "red": "LED_RED", "green": "LED_GREEN", "blue": "LED_BLUE" }
//! }
//! ```
//!

pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod delay;
pub mod display;
pub mod indicator;
pub mod lcd;
pub mod monitor;
pub mod sample;
pub mod sensor;
