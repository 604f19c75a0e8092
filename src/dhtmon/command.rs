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

use crate::indicator::Color;
use serde::Deserialize;
use std::fmt::{self, Formatter};

pub const DEFAULT_RED: &str = "LED_RED";
pub const DEFAULT_GREEN: &str = "LED_GREEN";
pub const DEFAULT_BLUE: &str = "LED_BLUE";

/// Command received over the text channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Activate one indicator, deactivating the others.
    Activate(Color),
    /// Anything not in the vocabulary, already trimmed.
    Unknown(String),
}

impl Command {
    /// Line written back to the text channel after the command is applied.
    pub fn response(&self) -> String {
        match self {
            Command::Activate(color) => format!("{} LED ON", color),
            Command::Unknown(token) => format!("Unknown command: {}", token),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Command::Activate(color) => write!(f, "activate {}", color.name().to_lowercase()),
            Command::Unknown(token) => write!(f, "unknown {:?}", token),
        }
    }
}

/// Tokens accepted as commands for each indicator color. Matching is exact and
/// case sensitive after surrounding whitespace is removed from the line.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Vocabulary {
    pub red: String,
    pub green: String,
    pub blue: String,
}

impl Vocabulary {
    pub fn parse(&self, line: &str) -> Command {
        let token = line.trim();

        if token == self.red {
            Command::Activate(Color::Red)
        } else if token == self.green {
            Command::Activate(Color::Green)
        } else if token == self.blue {
            Command::Activate(Color::Blue)
        } else {
            Command::Unknown(token.to_owned())
        }
    }

    /// Token that activates the given color.
    pub fn token(&self, color: Color) -> &str {
        match color {
            Color::Red => self.red.as_str(),
            Color::Green => self.green.as_str(),
            Color::Blue => self.blue.as_str(),
        }
    }

    pub(crate) fn tokens(&self) -> [&str; 3] {
        [self.red.as_str(), self.green.as_str(), self.blue.as_str()]
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            red: DEFAULT_RED.to_owned(),
            green: DEFAULT_GREEN.to_owned(),
            blue: DEFAULT_BLUE.to_owned(),
        }
    }
}
