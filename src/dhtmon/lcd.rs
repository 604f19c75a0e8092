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

use crate::delay::{Delay, ThreadDelay};
use crate::display::{CharacterDisplay, DisplayError, DisplayErrorKind};
use rppal::i2c::I2c;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

/// Usual address of a PCF8574 I2C backpack.
pub const DEFAULT_ADDRESS: u16 = 0x27;

// PCF8574 pins: P0 = RS, P1 = RW, P2 = EN, P3 = backlight, P4 - P7 = D4 - D7
const REGISTER_SELECT: u8 = 0b0000_0001;
const ENABLE: u8 = 0b0000_0100;
const BACKLIGHT: u8 = 0b0000_1000;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE_LEFT: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_1LINE: u8 = 0x20;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

/// Degree sign in the HD44780 A00 character ROM.
const GLYPH_DEGREE: u8 = 0xDF;

/// Abstraction around the I2C port expander so the LCD protocol can be tested.
pub trait ExpanderBus {
    fn write_byte(&mut self, value: u8) -> Result<(), DisplayError>;
}

impl ExpanderBus for I2c {
    fn write_byte(&mut self, value: u8) -> Result<(), DisplayError> {
        self.write(&[value])
            .map(|_| ())
            .map_err(|e| DisplayError::KindMsgCause(DisplayErrorKind::Bus, "unable to write to I2C bus", Box::new(e)))
    }
}

/// HD44780 compatible LCD driven in 4-bit mode through a PCF8574 I2C backpack.
pub struct Lcd1602 {
    bus: Box<dyn ExpanderBus + Send>,
    delay: Box<dyn Delay + Send>,
    rows: u8,
}

impl Lcd1602 {
    pub fn new<T>(bus: T) -> Self
    where
        T: ExpanderBus + Send + 'static,
    {
        Self::with_delay(bus, ThreadDelay)
    }

    pub fn with_delay<T, D>(bus: T, delay: D) -> Self
    where
        T: ExpanderBus + Send + 'static,
        D: Delay + Send + 'static,
    {
        Self {
            bus: Box::new(bus),
            delay: Box::new(delay),
            rows: 2,
        }
    }

    fn pulse(&mut self, value: u8) -> Result<(), DisplayError> {
        // Data is latched on the falling edge of EN
        self.bus.write_byte(value | ENABLE)?;
        self.delay.delay(Duration::from_micros(1));
        self.bus.write_byte(value & !ENABLE)?;
        self.delay.delay(Duration::from_micros(50));
        Ok(())
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<(), DisplayError> {
        let value = (nibble & 0xF0) | mode | BACKLIGHT;
        self.bus.write_byte(value)?;
        self.pulse(value)
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), DisplayError> {
        self.write_nibble(value & 0xF0, mode)?;
        self.write_nibble(value << 4, mode)
    }

    fn command(&mut self, value: u8) -> Result<(), DisplayError> {
        self.send(value, 0)
    }

    fn data(&mut self, value: u8) -> Result<(), DisplayError> {
        self.send(value, REGISTER_SELECT)
    }
}

impl CharacterDisplay for Lcd1602 {
    fn begin(&mut self, _columns: u8, rows: u8) -> Result<(), DisplayError> {
        if rows == 0 || rows as usize > ROW_OFFSETS.len() {
            return Err(DisplayError::KindMsg(
                DisplayErrorKind::Initialization,
                "display must have between 1 and 4 rows",
            ));
        }

        self.rows = rows;

        // Power on wait, then the reset sequence from the HD44780 datasheet that
        // works regardless of which mode the controller was left in.
        self.delay.delay(Duration::from_millis(50));
        self.write_nibble(0x30, 0)?;
        self.delay.delay(Duration::from_millis(5));
        self.write_nibble(0x30, 0)?;
        self.delay.delay(Duration::from_millis(5));
        self.write_nibble(0x30, 0)?;
        self.delay.delay(Duration::from_micros(150));
        self.write_nibble(0x20, 0)?;

        let function = if rows > 1 {
            CMD_FUNCTION_4BIT_2LINE
        } else {
            CMD_FUNCTION_4BIT_1LINE
        };

        self.command(function)?;
        self.command(CMD_DISPLAY_ON)?;
        self.clear()?;
        self.command(CMD_ENTRY_MODE_LEFT)?;

        tracing::debug!(message = "initialized LCD", rows = rows);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.command(CMD_CLEAR)?;
        self.delay.delay(Duration::from_millis(2));
        Ok(())
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> Result<(), DisplayError> {
        let row = row.min(self.rows - 1) as usize;
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row] + col.min(0x27)))
    }

    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        for c in text.chars() {
            self.data(glyph(c))?;
        }

        Ok(())
    }
}

impl Debug for Lcd1602 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lcd1602").field("rows", &self.rows).finish()
    }
}

/// Map a character to the controller's character ROM.
fn glyph(c: char) -> u8 {
    match c {
        '\u{00B0}' => GLYPH_DEGREE,
        ' '..='}' => c as u8,
        _ => b'?',
    }
}

/// Open an LCD attached to the given I2C bus at the given address.
pub fn open_lcd(bus: u8, address: u16) -> Result<Lcd1602, DisplayError> {
    let mut i2c = I2c::with_bus(bus).map_err(|e| {
        DisplayError::KindMsgCause(
            DisplayErrorKind::Initialization,
            "unable to open I2C bus",
            Box::new(e),
        )
    })?;

    i2c.set_slave_address(address).map_err(|e| {
        DisplayError::KindMsgCause(
            DisplayErrorKind::Initialization,
            "unable to set I2C address for LCD",
            Box::new(e),
        )
    })?;

    Ok(Lcd1602::new(i2c))
}
