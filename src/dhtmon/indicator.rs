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

use rppal::gpio::{Gpio, OutputPin};
use std::error::Error;
use std::fmt::{self, Formatter};

/// One of the three indicator colors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub fn name(&self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.name(), f)
    }
}

/// Which indicator line, if any, is currently active.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndicatorState {
    Off,
    On(Color),
}

impl Default for IndicatorState {
    fn default() -> Self {
        IndicatorState::Off
    }
}

/// Error acquiring the GPIO lines used for indicators
#[derive(Debug)]
pub struct IndicatorError {
    color: Color,
    pin: u8,
    cause: Box<dyn Error + Send + Sync>,
}

impl fmt::Display for IndicatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to acquire {} indicator pin {}: {}",
            self.color.name().to_lowercase(),
            self.pin,
            self.cause
        )
    }
}

impl Error for IndicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Abstraction around an `rppal::gpio::OutputPin` to allow for easier testing.
pub trait OutputLine {
    fn set_active(&mut self);
    fn set_inactive(&mut self);
}

impl OutputLine for OutputPin {
    fn set_active(&mut self) {
        OutputPin::set_high(self);
    }

    fn set_inactive(&mut self) {
        OutputPin::set_low(self);
    }
}

/// Three indicator lines, at most one of which is active at a time.
pub struct Indicators {
    red: Box<dyn OutputLine + Send>,
    green: Box<dyn OutputLine + Send>,
    blue: Box<dyn OutputLine + Send>,
    state: IndicatorState,
}

impl Indicators {
    /// Create indicators from three output lines, driving all of them inactive.
    pub fn new<R, G, B>(red: R, green: G, blue: B) -> Self
    where
        R: OutputLine + Send + 'static,
        G: OutputLine + Send + 'static,
        B: OutputLine + Send + 'static,
    {
        let mut indicators = Self {
            red: Box::new(red),
            green: Box::new(green),
            blue: Box::new(blue),
            state: IndicatorState::Off,
        };

        indicators.clear();
        indicators
    }

    /// Drive all three lines inactive.
    pub fn clear(&mut self) {
        self.red.set_inactive();
        self.green.set_inactive();
        self.blue.set_inactive();
        self.state = IndicatorState::Off;
    }

    /// Activate the line for `color`, deactivating the other two.
    pub fn activate(&mut self, color: Color) {
        self.clear();
        match color {
            Color::Red => self.red.set_active(),
            Color::Green => self.green.set_active(),
            Color::Blue => self.blue.set_active(),
        }

        self.state = IndicatorState::On(color);
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }
}

impl fmt::Debug for Indicators {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indicators").field("state", &self.state).finish()
    }
}

/// Acquire output pins for the red, green, and blue indicators based on their
/// BCM GPIO pin numbers.
pub fn open_indicators(red: u8, green: u8, blue: u8) -> Result<Indicators, IndicatorError> {
    let controller = Gpio::new().map_err(|e| IndicatorError {
        color: Color::Red,
        pin: red,
        cause: Box::new(e),
    })?;

    let output = |color: Color, pin: u8| -> Result<OutputPin, IndicatorError> {
        controller
            .get(pin)
            .map(|p| p.into_output_low())
            .map_err(|e| IndicatorError {
                color,
                pin,
                cause: Box::new(e),
            })
    };

    Ok(Indicators::new(
        output(Color::Red, red)?,
        output(Color::Green, green)?,
        output(Color::Blue, blue)?,
    ))
}
