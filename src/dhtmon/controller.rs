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

use crate::channel::TextChannel;
use crate::config::ControllerConfig;
use crate::delay::Delay;
use crate::indicator::Color;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const REPORT_PREFIX: &str = "Temperature:";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Temperature and humidity parsed from a report line sent by the monitor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Report {
    pub temperature: f64,
    pub humidity: f64,
}

impl Report {
    /// Parse a line like `Temperature: 72.00 °F, Humidity: 45.00%`. The unit
    /// label is ignored and may be missing or garbled by the serial link.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(REPORT_PREFIX)?;
        let (temp_part, humidity_part) = rest.split_once(',')?;

        let temp_part = temp_part.trim_start();
        let temp_end = temp_part
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(temp_part.len());
        let temperature = temp_part[..temp_end].parse().ok()?;

        let humidity = humidity_part
            .trim()
            .strip_prefix("Humidity:")?
            .trim()
            .trim_end_matches('%')
            .trim_end()
            .parse()
            .ok()?;

        Some(Self { temperature, humidity })
    }
}

/// How the temperature compares to the comfort thresholds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comfort {
    Hot,
    Cold,
    Comfortable,
}

impl Comfort {
    pub fn classify(temperature: f64, config: &ControllerConfig) -> Self {
        if temperature > config.temp_hot_threshold {
            Comfort::Hot
        } else if temperature < config.temp_cold_threshold {
            Comfort::Cold
        } else {
            Comfort::Comfortable
        }
    }

    /// Indicator used to show this level of comfort.
    pub fn color(&self) -> Color {
        match self {
            Comfort::Hot => Color::Red,
            Comfort::Cold => Color::Blue,
            Comfort::Comfortable => Color::Green,
        }
    }
}

/// How the humidity compares to the humidity thresholds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HumidityLevel {
    High,
    Low,
    Normal,
}

impl HumidityLevel {
    pub fn classify(humidity: f64, config: &ControllerConfig) -> Self {
        if humidity > config.humidity_high_threshold {
            HumidityLevel::High
        } else if humidity < config.humidity_low_threshold {
            HumidityLevel::Low
        } else {
            HumidityLevel::Normal
        }
    }

    pub fn advice(&self) -> Option<&'static str> {
        match self {
            HumidityLevel::High => Some("high humidity, consider a dehumidifier"),
            HumidityLevel::Low => Some("low humidity, consider a humidifier"),
            HumidityLevel::Normal => None,
        }
    }
}

/// Result of handling one line received from the monitor.
#[derive(Clone, Debug, PartialEq)]
pub enum Handled {
    /// A command matching the reading was sent.
    Sent(Report, Comfort, HumidityLevel),
    /// The reading was valid but a command was sent too recently.
    Throttled(Report),
    /// The reading was outside the valid range for the sensor.
    OutOfRange(Report),
    /// The line looked like a report but couldn't be parsed.
    Malformed,
    /// Any other line, e.g. command acknowledgements or sensor errors.
    DeviceMessage,
}

/// Host side counterpart of the monitor: turns report lines into LED commands.
pub struct Controller {
    config: ControllerConfig,
    channel: Box<dyn TextChannel + Send>,
    last_sent: Option<Instant>,
}

impl Controller {
    pub fn new<C>(config: ControllerConfig, channel: C) -> Self
    where
        C: TextChannel + Send + 'static,
    {
        Self {
            config,
            channel: Box::new(channel),
            last_sent: None,
        }
    }

    /// Handle a single line received from the monitor at time `now`.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Handled {
        let line = line.trim();
        if !line.starts_with(REPORT_PREFIX) {
            tracing::info!(message = "device message", line = line);
            return Handled::DeviceMessage;
        }

        let report = match Report::parse(line) {
            Some(r) => r,
            None => {
                tracing::warn!(message = "unable to parse report", line = line);
                return Handled::Malformed;
            }
        };

        if !self.in_range(&report) {
            tracing::warn!(
                message = "reading outside of valid range",
                temperature = report.temperature,
                humidity = report.humidity,
            );
            return Handled::OutOfRange(report);
        }

        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.config.reading_interval() {
                tracing::debug!(message = "skipping reading, command sent recently", temperature = report.temperature);
                return Handled::Throttled(report);
            }
        }

        let comfort = Comfort::classify(report.temperature, &self.config);
        let humidity = HumidityLevel::classify(report.humidity, &self.config);
        let token = self.config.vocabulary.token(comfort.color()).to_owned();

        tracing::info!(
            message = "reading",
            temperature = report.temperature,
            humidity = report.humidity,
            comfort = ?comfort,
            command = %token,
        );

        if let Some(advice) = humidity.advice() {
            tracing::info!(message = advice, humidity = report.humidity);
        }

        self.send(&token);
        self.last_sent = Some(now);
        Handled::Sent(report, comfort, humidity)
    }

    /// Poll the channel for lines until `running` is set to false, then send
    /// the configured command to turn the indicators off.
    pub fn run(&mut self, running: &AtomicBool, delay: &mut dyn Delay) {
        while running.load(Ordering::Acquire) {
            match self.channel.read_line() {
                Ok(Some(line)) => {
                    self.handle_line(&line, Instant::now());
                }
                Ok(None) => delay.delay(POLL_INTERVAL),
                Err(e) => {
                    tracing::error!(message = "unable to read from monitor", error = %e);
                    delay.delay(POLL_INTERVAL);
                }
            }
        }

        self.shutdown();
    }

    /// Turn off all indicators on the monitor.
    pub fn shutdown(&mut self) {
        let off = self.config.off_command.clone();
        self.send(&off);
        tracing::info!("controller stopped");
    }

    fn in_range(&self, report: &Report) -> bool {
        (self.config.temp_min..=self.config.temp_max).contains(&report.temperature)
            && (self.config.humidity_min..=self.config.humidity_max).contains(&report.humidity)
    }

    fn send(&mut self, token: &str) {
        match self.channel.write_line(token) {
            Ok(_) => tracing::debug!(message = "sent command", command = token),
            Err(e) => tracing::error!(message = "unable to send command", command = token, error = %e),
        }
    }
}

impl Debug for Controller {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("last_sent", &self.last_sent)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{Comfort, Controller, Handled, HumidityLevel, Report};
    use crate::config::ControllerConfig;
    use crate::sample::Sample;
    use crate::sensor::{Humidity, TemperatureUnit};
    use crate::test::{MemoryChannel, RecordingDelay};
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    #[test]
    fn test_parse_report() {
        let report = Report::parse("Temperature: 72.50 \u{00B0}F, Humidity: 45.00%").unwrap();
        assert_eq!(72.5, report.temperature);
        assert_eq!(45.0, report.humidity);
    }

    #[test]
    fn test_parse_report_garbled_unit() {
        let report = Report::parse("Temperature: 72.5\u{00C2}\u{00B0}F, Humidity: 45.0%\r").unwrap();
        assert_eq!(72.5, report.temperature);
        assert_eq!(45.0, report.humidity);
    }

    #[test]
    fn test_parse_report_negative() {
        let report = Report::parse("Temperature: -3.25 \u{00B0}C, Humidity: 80.00%").unwrap();
        assert_eq!(-3.25, report.temperature);
    }

    #[test]
    fn test_parse_monitor_output() {
        let sample = Sample::new(68.4, TemperatureUnit::Fahrenheit, Humidity::from(51.0));
        let report = Report::parse(&sample.to_string()).unwrap();
        assert_eq!(68.4, report.temperature);
        assert_eq!(51.0, report.humidity);
    }

    #[test]
    fn test_parse_report_invalid() {
        assert_eq!(None, Report::parse("Temperature: abc, Humidity: 45%"));
        assert_eq!(None, Report::parse("Temperature: 72.0"));
        assert_eq!(None, Report::parse("Red LED ON"));
    }

    #[test]
    fn test_classify() {
        let config = ControllerConfig::default();
        assert_eq!(Comfort::Hot, Comfort::classify(78.5, &config));
        assert_eq!(Comfort::Comfortable, Comfort::classify(78.0, &config));
        assert_eq!(Comfort::Comfortable, Comfort::classify(68.0, &config));
        assert_eq!(Comfort::Cold, Comfort::classify(67.9, &config));

        assert_eq!(HumidityLevel::High, HumidityLevel::classify(61.0, &config));
        assert_eq!(HumidityLevel::Normal, HumidityLevel::classify(45.0, &config));
        assert_eq!(HumidityLevel::Low, HumidityLevel::classify(29.0, &config));
    }

    #[test]
    fn test_handle_sends_matching_command() {
        let channel = MemoryChannel::new();
        let mut controller = Controller::new(ControllerConfig::default(), channel.clone());
        let start = Instant::now();

        let res = controller.handle_line("Temperature: 80.00 \u{00B0}F, Humidity: 45.00%", start);
        assert!(matches!(res, Handled::Sent(_, Comfort::Hot, HumidityLevel::Normal)));
        assert_eq!(vec!["LED_RED".to_owned()], channel.take_written());

        let later = start + Duration::from_secs(5);
        controller.handle_line("Temperature: 60.00 \u{00B0}F, Humidity: 45.00%", later);
        assert_eq!(vec!["LED_BLUE".to_owned()], channel.take_written());

        let later = later + Duration::from_secs(6);
        controller.handle_line("Temperature: 70.00 \u{00B0}F, Humidity: 65.00%", later);
        assert_eq!(vec!["LED_GREEN".to_owned()], channel.take_written());
    }

    #[test]
    fn test_handle_throttles() {
        let channel = MemoryChannel::new();
        let mut controller = Controller::new(ControllerConfig::default(), channel.clone());
        let start = Instant::now();

        controller.handle_line("Temperature: 80.00 \u{00B0}F, Humidity: 45.00%", start);
        let res = controller.handle_line(
            "Temperature: 60.00 \u{00B0}F, Humidity: 45.00%",
            start + Duration::from_secs(2),
        );

        assert!(matches!(res, Handled::Throttled(_)));
        assert_eq!(vec!["LED_RED".to_owned()], channel.take_written());
    }

    #[test]
    fn test_handle_out_of_range() {
        let channel = MemoryChannel::new();
        let mut controller = Controller::new(ControllerConfig::default(), channel.clone());

        let res = controller.handle_line("Temperature: 200.00 \u{00B0}F, Humidity: 45.00%", Instant::now());
        assert!(matches!(res, Handled::OutOfRange(_)));
        assert!(channel.take_written().is_empty());
    }

    #[test]
    fn test_handle_other_lines() {
        let channel = MemoryChannel::new();
        let mut controller = Controller::new(ControllerConfig::default(), channel.clone());

        assert_eq!(Handled::DeviceMessage, controller.handle_line("DHT11 Sensor Started", Instant::now()));
        assert_eq!(Handled::DeviceMessage, controller.handle_line("ERROR: Failed to read sensor", Instant::now()));
        assert_eq!(Handled::Malformed, controller.handle_line("Temperature: ??", Instant::now()));
        assert!(channel.take_written().is_empty());
    }

    #[test]
    fn test_run_sends_off_on_stop() {
        let channel = MemoryChannel::new();
        let mut controller = Controller::new(ControllerConfig::default(), channel.clone());
        let running = AtomicBool::new(false);

        controller.run(&running, &mut RecordingDelay::new());
        assert_eq!(vec!["LED_OFF".to_owned()], channel.take_written());
    }
}
