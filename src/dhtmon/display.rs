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

use crate::sample::Sample;
use std::error::Error;
use std::fmt::{self, Formatter};

/// Potential kinds of errors that can be encountered driving a display
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum DisplayErrorKind {
    Initialization,
    Bus,
}

impl DisplayErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            DisplayErrorKind::Initialization => "initialization",
            DisplayErrorKind::Bus => "bus",
        }
    }
}

/// Error initializing or writing to a character display
#[derive(Debug)]
pub enum DisplayError {
    KindMsg(DisplayErrorKind, &'static str),
    KindMsgCause(DisplayErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl DisplayError {
    pub fn kind(&self) -> DisplayErrorKind {
        match self {
            DisplayError::KindMsg(kind, _) => *kind,
            DisplayError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::KindMsg(_, msg) => fmt::Display::fmt(msg, f),
            DisplayError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Fixed size text display addressed by column and row, like an HD44780 LCD.
///
/// Values are formatted by the caller, `print` writes text starting at the
/// current cursor position.
pub trait CharacterDisplay {
    fn begin(&mut self, columns: u8, rows: u8) -> Result<(), DisplayError>;
    fn clear(&mut self) -> Result<(), DisplayError>;
    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), DisplayError>;
    fn print(&mut self, text: &str) -> Result<(), DisplayError>;
}

/// Two lines of text shown on the display, fully rewritten each time they're rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayContent {
    first: String,
    second: String,
}

impl DisplayContent {
    pub fn new<A, B>(first: A, second: B) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Shown after boot until the first cycle completes.
    pub fn startup(model: &str) -> Self {
        Self::new(format!("{} Monitor", model), "Starting...")
    }

    /// Shown when the sensor could not be read.
    pub fn sensor_error() -> Self {
        Self::new("Sensor Error", "Check wiring")
    }

    pub fn sample(sample: &Sample) -> Self {
        Self::new(
            format!("Temp: {:.1}{}", sample.temperature(), sample.unit()),
            format!("Humidity: {:.0}%", sample.humidity()),
        )
    }

    pub fn lines(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }

    /// Clear the display and write both lines, truncated to `columns` characters.
    pub fn render(&self, display: &mut dyn CharacterDisplay, columns: u8) -> Result<(), DisplayError> {
        display.clear()?;
        display.set_cursor(0, 0)?;
        display.print(&truncate(&self.first, columns))?;
        display.set_cursor(0, 1)?;
        display.print(&truncate(&self.second, columns))
    }
}

fn truncate(line: &str, columns: u8) -> String {
    line.chars().take(columns as usize).collect()
}
