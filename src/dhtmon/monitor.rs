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
use crate::command::Command;
use crate::config::MonitorConfig;
use crate::delay::Delay;
use crate::display::{CharacterDisplay, DisplayContent};
use crate::indicator::{IndicatorState, Indicators};
use crate::sample::Sample;
use crate::sensor::{Sensor, SensorErrorKind};
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Written to the text channel when the sensor can't be read.
pub const SENSOR_ERROR_MESSAGE: &str = "ERROR: Failed to read sensor";

/// What happened during a single cycle of the monitor loop.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// The sensor read failed, nothing was reported and no command was handled.
    SensorFailure(SensorErrorKind),
    /// The sample was reported and at most one command was handled.
    Reported(Sample, Option<Command>),
}

/// Sensor polling loop that reports readings over a text channel, optionally
/// shows them on a display, and switches indicators based on commands received
/// over the same channel.
///
/// Everything happens sequentially on the calling thread, including the waits
/// between cycles.
pub struct Monitor {
    config: MonitorConfig,
    sensor: Box<dyn Sensor + Send>,
    channel: Box<dyn TextChannel + Send>,
    delay: Box<dyn Delay + Send>,
    indicators: Option<Indicators>,
    display: Option<Box<dyn CharacterDisplay + Send>>,
}

impl Monitor {
    pub fn new<S, C, D>(config: MonitorConfig, sensor: S, channel: C, delay: D) -> Self
    where
        S: Sensor + Send + 'static,
        C: TextChannel + Send + 'static,
        D: Delay + Send + 'static,
    {
        Self {
            config,
            sensor: Box::new(sensor),
            channel: Box::new(channel),
            delay: Box::new(delay),
            indicators: None,
            display: None,
        }
    }

    /// Drive the given indicators based on commands received.
    pub fn with_indicators(mut self, indicators: Indicators) -> Self {
        self.indicators = Some(indicators);
        self
    }

    /// Show readings on the given display.
    pub fn with_display<T>(mut self, display: T) -> Self
    where
        T: CharacterDisplay + Send + 'static,
    {
        self.display = Some(Box::new(display));
        self
    }

    /// Current indicator state or `None` if there are no indicators.
    pub fn indicator_state(&self) -> Option<IndicatorState> {
        self.indicators.as_ref().map(|i| i.state())
    }

    /// Put peripherals in their initial state, wait for the sensor to settle,
    /// and announce that the monitor has started.
    pub fn boot(&mut self) {
        if let Some(indicators) = self.indicators.as_mut() {
            indicators.clear();
        }

        if let Some(display) = self.display.as_mut() {
            let res = display
                .begin(self.config.display_columns, self.config.display_rows)
                .and_then(|_| {
                    DisplayContent::startup(self.config.model.name())
                        .render(&mut **display, self.config.display_columns)
                });

            if let Err(e) = res {
                tracing::error!(message = "unable to initialize display", error = %e);
            }
        }

        self.delay.delay(self.config.settle_delay());
        self.emit(&format!("{} Sensor Started", self.config.model.name()));

        tracing::info!(
            message = "monitor started",
            model = %self.config.model,
            unit = %self.config.unit,
            indicators = self.indicators.is_some(),
            display = self.display.is_some(),
        );
    }

    /// Run a single cycle: read the sensor, report, handle at most one command,
    /// and wait before returning.
    pub fn cycle(&mut self) -> CycleOutcome {
        let _span = tracing::debug_span!("monitor_cycle").entered();

        let sample = match Sample::acquire(&mut *self.sensor, self.config.unit) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(message = "unable to read sensor", kind = e.kind().as_label(), error = %e);
                self.emit(SENSOR_ERROR_MESSAGE);
                self.show(&DisplayContent::sensor_error());
                self.delay.delay(self.config.error_delay());
                return CycleOutcome::SensorFailure(e.kind());
            }
        };

        tracing::debug!(
            message = "read sensor",
            temperature = sample.temperature(),
            humidity = sample.humidity(),
        );

        self.emit(&sample.to_string());
        self.show(&DisplayContent::sample(&sample));

        let command = self.handle_command();
        self.delay.delay(self.config.cycle_delay());
        CycleOutcome::Reported(sample, command)
    }

    /// Run cycles until `running` is set to false. The flag is only checked
    /// between cycles.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.cycle();
        }

        tracing::info!("monitor stopped");
    }

    /// Consume at most one line from the channel and apply it to the indicators.
    /// Without indicators nothing is read and input stays queued in the channel.
    fn handle_command(&mut self) -> Option<Command> {
        let indicators = self.indicators.as_mut()?;

        let line = match self.channel.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(message = "unable to read command", error = %e);
                return None;
            }
        };

        let command = self.config.vocabulary.parse(&line);
        tracing::info!(message = "received command", command = %command);

        match command {
            Command::Activate(color) => indicators.activate(color),
            Command::Unknown(_) => indicators.clear(),
        }

        self.emit(&command.response());
        Some(command)
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = self.channel.write_line(line) {
            tracing::warn!(message = "unable to write to text channel", line = line, error = %e);
        }
    }

    fn show(&mut self, content: &DisplayContent) {
        if let Some(display) = self.display.as_mut() {
            if let Err(e) = content.render(&mut **display, self.config.display_columns) {
                tracing::warn!(message = "unable to update display", error = %e);
            }
        }
    }
}

impl Debug for Monitor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("indicators", &self.indicators)
            .field("display", &self.display.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{CycleOutcome, Monitor, SENSOR_ERROR_MESSAGE};
    use crate::command::Command;
    use crate::config::MonitorConfig;
    use crate::indicator::{Color, IndicatorState, Indicators};
    use crate::sensor::{Humidity, SensorErrorKind, TemperatureCelsius, TemperatureFahrenheit, TemperatureUnit};
    use crate::test::{FakeSensor, MemoryChannel, RecordingDelay, RecordingDisplay, RecordingLine};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct Harness {
        sensor: FakeSensor,
        channel: MemoryChannel,
        delay: RecordingDelay,
        display: RecordingDisplay,
        red: RecordingLine,
        green: RecordingLine,
        blue: RecordingLine,
        monitor: Monitor,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(MonitorConfig::default())
        }

        fn with_config(config: MonitorConfig) -> Self {
            let sensor = FakeSensor::new();
            let channel = MemoryChannel::new();
            let delay = RecordingDelay::new();
            let display = RecordingDisplay::new();
            let (red, green, blue) = (RecordingLine::new(), RecordingLine::new(), RecordingLine::new());

            let monitor = Monitor::new(config, sensor.clone(), channel.clone(), delay.clone())
                .with_indicators(Indicators::new(red.clone(), green.clone(), blue.clone()))
                .with_display(display.clone());

            Self {
                sensor,
                channel,
                delay,
                display,
                red,
                green,
                blue,
                monitor,
            }
        }

        fn push_fahrenheit(&self, temperature: f64, humidity: f64) {
            let c = TemperatureCelsius::from(TemperatureFahrenheit::from(temperature));
            self.sensor.push_ok(c, Humidity::from(humidity));
        }

        fn active(&self) -> (bool, bool, bool) {
            (self.red.is_active(), self.green.is_active(), self.blue.is_active())
        }
    }

    #[test]
    fn test_boot() {
        let mut h = Harness::new();
        h.monitor.boot();

        assert_eq!(vec!["DHT11 Sensor Started".to_owned()], h.channel.take_written());
        assert_eq!(vec![Duration::from_secs(1)], h.delay.delays());
        assert_eq!(Some(IndicatorState::Off), h.monitor.indicator_state());
        assert_eq!((16, 2), h.display.geometry());
        assert_eq!(vec!["DHT11 Monitor".to_owned(), "Starting...".to_owned()], h.display.rows());
    }

    #[test]
    fn test_first_valid_sample() {
        let mut h = Harness::new();
        h.monitor.boot();
        h.channel.take_written();
        h.delay.take();

        h.push_fahrenheit(72.0, 45.0);
        let outcome = h.monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, None)));
        assert_eq!(
            vec!["Temperature: 72.00 \u{00B0}F, Humidity: 45.00%".to_owned()],
            h.channel.take_written()
        );
        assert_eq!(
            vec!["Temp: 72.0\u{00B0}F".to_owned(), "Humidity: 45%".to_owned()],
            h.display.rows()
        );
        assert_eq!(vec![Duration::from_secs(2)], h.delay.take());
    }

    #[test]
    fn test_celsius_report() {
        let config = MonitorConfig {
            unit: TemperatureUnit::Celsius,
            ..Default::default()
        };

        let mut h = Harness::with_config(config);
        h.sensor.push_ok(TemperatureCelsius::from(21.5), Humidity::from(40.0));
        h.monitor.cycle();

        assert_eq!(
            vec!["Temperature: 21.50 \u{00B0}C, Humidity: 40.00%".to_owned()],
            h.channel.take_written()
        );
    }

    #[test]
    fn test_nan_temperature_skips_cycle() {
        let mut h = Harness::new();
        h.sensor.push_ok(TemperatureCelsius::from(f64::NAN), Humidity::from(45.0));
        h.channel.push_input("LED_RED");

        let outcome = h.monitor.cycle();

        assert_eq!(CycleOutcome::SensorFailure(SensorErrorKind::NotANumber), outcome);
        assert_eq!(vec![SENSOR_ERROR_MESSAGE.to_owned()], h.channel.take_written());
        assert_eq!(vec!["Sensor Error".to_owned(), "Check wiring".to_owned()], h.display.rows());
        assert_eq!(vec![Duration::from_secs(2)], h.delay.take());
        // Command is left for the next cycle
        assert_eq!(1, h.channel.pending_input());
        assert_eq!((false, false, false), h.active());
    }

    #[test]
    fn test_nan_humidity_skips_cycle() {
        let mut h = Harness::new();
        h.sensor.push_ok(TemperatureCelsius::from(20.0), Humidity::from(f64::NAN));

        let outcome = h.monitor.cycle();
        assert_eq!(CycleOutcome::SensorFailure(SensorErrorKind::NotANumber), outcome);
        assert_eq!(vec![SENSOR_ERROR_MESSAGE.to_owned()], h.channel.take_written());
    }

    #[test]
    fn test_read_error_skips_cycle() {
        let mut h = Harness::new();
        h.sensor.push_err(SensorErrorKind::ReadTimeout);

        let outcome = h.monitor.cycle();
        assert_eq!(CycleOutcome::SensorFailure(SensorErrorKind::ReadTimeout), outcome);
        assert_eq!(vec![SENSOR_ERROR_MESSAGE.to_owned()], h.channel.take_written());
    }

    #[test]
    fn test_failure_then_recovery() {
        let mut h = Harness::new();
        h.sensor.push_err(SensorErrorKind::Checksum);
        h.push_fahrenheit(70.0, 50.0);

        h.monitor.cycle();
        let outcome = h.monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, _)));
        assert_eq!(
            vec![
                SENSOR_ERROR_MESSAGE.to_owned(),
                "Temperature: 70.00 \u{00B0}F, Humidity: 50.00%".to_owned()
            ],
            h.channel.take_written()
        );
    }

    #[test]
    fn test_command_red_then_green() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("LED_RED");

        h.monitor.cycle();
        assert_eq!((true, false, false), h.active());
        assert_eq!(Some(IndicatorState::On(Color::Red)), h.monitor.indicator_state());

        h.channel.push_input("LED_GREEN");
        let outcome = h.monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, Some(Command::Activate(Color::Green)))));
        assert_eq!((false, true, false), h.active());
        assert_eq!(
            vec![
                "Temperature: 72.00 \u{00B0}F, Humidity: 45.00%".to_owned(),
                "Red LED ON".to_owned(),
                "Temperature: 72.00 \u{00B0}F, Humidity: 45.00%".to_owned(),
                "Green LED ON".to_owned(),
            ],
            h.channel.take_written()
        );
    }

    #[test]
    fn test_command_blue_trimmed() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("  LED_BLUE \r");

        h.monitor.cycle();
        assert_eq!((false, false, true), h.active());
        assert_eq!(Some(&"Blue LED ON".to_owned()), h.channel.take_written().last());
    }

    #[test]
    fn test_unknown_command_clears_indicators() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("LED_RED");
        h.monitor.cycle();

        h.channel.push_input("FOO");
        let outcome = h.monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, Some(Command::Unknown(_)))));
        assert_eq!((false, false, false), h.active());
        assert_eq!(Some(IndicatorState::Off), h.monitor.indicator_state());
        assert_eq!(Some(&"Unknown command: FOO".to_owned()), h.channel.take_written().last());
    }

    #[test]
    fn test_unknown_command_from_off() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("FOO");

        h.monitor.cycle();
        assert_eq!(Some(IndicatorState::Off), h.monitor.indicator_state());
        assert_eq!(Some(&"Unknown command: FOO".to_owned()), h.channel.take_written().last());
    }

    #[test]
    fn test_same_command_twice() {
        let mut h = Harness::new();
        for _ in 0..2 {
            h.push_fahrenheit(72.0, 45.0);
            h.channel.push_input("LED_RED");
            h.monitor.cycle();

            assert_eq!((true, false, false), h.active());
            assert_eq!(Some(&"Red LED ON".to_owned()), h.channel.take_written().last());
        }
    }

    #[test]
    fn test_no_command_keeps_state() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("LED_BLUE");

        h.monitor.cycle();
        let outcome = h.monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, None)));
        assert_eq!((false, false, true), h.active());
    }

    #[test]
    fn test_one_command_per_cycle() {
        let mut h = Harness::new();
        h.push_fahrenheit(72.0, 45.0);
        h.push_fahrenheit(72.0, 45.0);
        h.channel.push_input("LED_RED");
        h.channel.push_input("LED_GREEN");

        h.monitor.cycle();
        assert_eq!((true, false, false), h.active());
        assert_eq!(1, h.channel.pending_input());

        h.monitor.cycle();
        assert_eq!((false, true, false), h.active());
        assert_eq!(0, h.channel.pending_input());
    }

    #[test]
    fn test_custom_vocabulary() {
        let mut config = MonitorConfig::default();
        config.vocabulary.red = "HOT".to_owned();

        let mut h = Harness::with_config(config);
        h.push_fahrenheit(80.0, 45.0);
        h.push_fahrenheit(80.0, 45.0);
        h.channel.push_input("LED_RED");
        h.monitor.cycle();
        assert_eq!((false, false, false), h.active());

        h.channel.push_input("HOT");
        h.monitor.cycle();
        assert_eq!((true, false, false), h.active());
    }

    #[test]
    fn test_without_indicators_ignores_commands() {
        let sensor = FakeSensor::new();
        let channel = MemoryChannel::new();
        let mut monitor = Monitor::new(MonitorConfig::default(), sensor.clone(), channel.clone(), RecordingDelay::new());

        sensor.push_ok(TemperatureCelsius::from(22.0), Humidity::from(45.0));
        channel.push_input("LED_RED");
        monitor.boot();
        channel.take_written();
        let outcome = monitor.cycle();

        assert!(matches!(outcome, CycleOutcome::Reported(_, None)));
        assert_eq!(None, monitor.indicator_state());
        assert_eq!(
            vec!["Temperature: 71.60 \u{00B0}F, Humidity: 45.00%".to_owned()],
            channel.take_written()
        );
        assert_eq!(1, channel.pending_input());
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let mut h = Harness::new();
        let running = AtomicBool::new(false);

        h.monitor.run(&running);
        assert!(h.channel.take_written().is_empty());
    }
}
