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

use crate::command::Vocabulary;
use crate::sensor::{Model, TemperatureUnit};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Error loading or validating a configuration file
#[derive(Debug)]
pub enum ConfigError {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path, e) => write!(f, "unable to read {}: {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "unable to parse {}: {}", path.display(), e),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read(_, e) => Some(e),
            ConfigError::Parse(_, e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Deserialize a JSON config file, using defaults for any missing fields.
fn load<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_owned(), e))
}

/// Behavior of the monitor loop. Wiring (which pins, which serial device) is
/// given on the command line instead.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub model: Model,
    pub unit: TemperatureUnit,
    pub baud_rate: u32,
    pub settle_delay_ms: u64,
    pub cycle_delay_ms: u64,
    pub error_delay_ms: u64,
    pub display_columns: u8,
    pub display_rows: u8,
    pub vocabulary: Vocabulary,
}

impl MonitorConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be greater than zero"));
        }

        if self.settle_delay_ms == 0 || self.cycle_delay_ms == 0 || self.error_delay_ms == 0 {
            return Err(ConfigError::Invalid("delays must be greater than zero"));
        }

        // Readings always take two lines
        if self.display_columns == 0 || self.display_rows < 2 || self.display_rows > 4 {
            return Err(ConfigError::Invalid("display must have 2 to 4 rows and at least one column"));
        }

        let tokens = self.vocabulary.tokens();
        if tokens.iter().any(|t| t.is_empty() || t.chars().any(char::is_whitespace)) {
            return Err(ConfigError::Invalid("commands must be non-empty and contain no whitespace"));
        }

        if tokens[0] == tokens[1] || tokens[0] == tokens[2] || tokens[1] == tokens[2] {
            return Err(ConfigError::Invalid("commands must be distinct"));
        }

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model: Model::default(),
            unit: TemperatureUnit::default(),
            baud_rate: DEFAULT_BAUD_RATE,
            settle_delay_ms: 1000,
            cycle_delay_ms: 2000,
            error_delay_ms: 2000,
            display_columns: 16,
            display_rows: 2,
            vocabulary: Vocabulary::default(),
        }
    }
}

/// Thresholds and commands used by the host side controller.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub temp_hot_threshold: f64,
    pub temp_cold_threshold: f64,
    pub humidity_high_threshold: f64,
    pub humidity_low_threshold: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub reading_interval_ms: u64,
    pub vocabulary: Vocabulary,
    /// Sent on shutdown. Anything outside the vocabulary turns all indicators off.
    pub off_command: String,
}

impl ControllerConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temp_cold_threshold > self.temp_hot_threshold {
            return Err(ConfigError::Invalid("cold threshold must not be above hot threshold"));
        }

        if self.humidity_low_threshold > self.humidity_high_threshold {
            return Err(ConfigError::Invalid("low humidity threshold must not be above high threshold"));
        }

        if self.temp_min > self.temp_max || self.humidity_min > self.humidity_max {
            return Err(ConfigError::Invalid("valid range minimums must not be above maximums"));
        }

        if self.vocabulary.tokens().contains(&self.off_command.as_str()) {
            return Err(ConfigError::Invalid("off command must not activate an indicator"));
        }

        Ok(())
    }

    pub fn reading_interval(&self) -> Duration {
        Duration::from_millis(self.reading_interval_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            temp_hot_threshold: 78.0,
            temp_cold_threshold: 68.0,
            humidity_high_threshold: 60.0,
            humidity_low_threshold: 30.0,
            temp_min: -40.0,
            temp_max: 140.0,
            humidity_min: 0.0,
            humidity_max: 100.0,
            reading_interval_ms: 5000,
            vocabulary: Vocabulary::default(),
            off_command: "LED_OFF".to_owned(),
        }
    }
}
