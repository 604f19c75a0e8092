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

use rppal::uart::{Parity, Uart};
use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

const READ_CHUNK: usize = 64;

/// Unterminated input longer than this is discarded, no command or report
/// line comes close to it.
const MAX_PARTIAL_LINE: usize = 256;

/// Potential kinds of errors that can be encountered using a text channel
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum ChannelErrorKind {
    Initialization,
    Io,
}

impl ChannelErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelErrorKind::Initialization => "initialization",
            ChannelErrorKind::Io => "io",
        }
    }
}

/// Error opening, reading, or writing a text channel
#[derive(Debug)]
pub enum ChannelError {
    KindMsg(ChannelErrorKind, &'static str),
    KindMsgCause(ChannelErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl ChannelError {
    pub fn kind(&self) -> ChannelErrorKind {
        match self {
            ChannelError::KindMsg(kind, _) => *kind,
            ChannelError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::KindMsg(_, msg) => fmt::Display::fmt(msg, f),
            ChannelError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for ChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChannelError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Line oriented, bidirectional text interface.
///
/// `read_line` never blocks: it returns `None` unless a complete newline
/// terminated line has been received. The returned line doesn't include the
/// newline but is otherwise untrimmed.
pub trait TextChannel {
    fn write_line(&mut self, line: &str) -> Result<(), ChannelError>;
    fn read_line(&mut self) -> Result<Option<String>, ChannelError>;
}

impl<T: TextChannel + ?Sized> TextChannel for Box<T> {
    fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        (**self).read_line()
    }
}

/// Bytes received but not yet split into lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let complete = self.pending.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        let partial = self.pending.len() - complete;
        if partial > MAX_PARTIAL_LINE {
            tracing::warn!(
                message = "discarding unterminated input",
                bytes = partial,
                max = MAX_PARTIAL_LINE,
            );
            self.pending.truncate(complete);
        }
    }

    /// Remove and return the first complete line, if there is one.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let rest = self.pending.split_off(end + 1);
        let mut line = std::mem::replace(&mut self.pending, rest);
        line.truncate(end);
        Some(decode_line(line))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Invalid UTF-8 is replaced rather than rejected so that a garbled line is
/// still treated as a line, regardless of which channel it arrived on.
fn decode_line(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Text channel over a serial port, 8 data bits, no parity, one stop bit.
pub struct SerialChannel {
    uart: Uart,
    buffer: LineBuffer,
}

impl SerialChannel {
    /// Open the serial device at `path` (e.g. `/dev/serial0` or `/dev/ttyACM0`).
    pub fn open<P: AsRef<Path>>(path: P, baud_rate: u32) -> Result<Self, ChannelError> {
        let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1).map_err(|e| {
            ChannelError::KindMsgCause(
                ChannelErrorKind::Initialization,
                "unable to open serial device",
                Box::new(e),
            )
        })?;

        // Reads return immediately with whatever is available
        uart.set_read_mode(0, Duration::ZERO).map_err(|e| {
            ChannelError::KindMsgCause(
                ChannelErrorKind::Initialization,
                "unable to set serial read mode",
                Box::new(e),
            )
        })?;

        uart.set_write_mode(true).map_err(|e| {
            ChannelError::KindMsgCause(
                ChannelErrorKind::Initialization,
                "unable to set serial write mode",
                Box::new(e),
            )
        })?;

        Ok(Self {
            uart,
            buffer: LineBuffer::new(),
        })
    }
}

impl TextChannel for SerialChannel {
    fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        let mut out = Vec::with_capacity(line.len() + 2);
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");

        self.uart
            .write(&out)
            .map(|_| ())
            .map_err(|e| ChannelError::KindMsgCause(ChannelErrorKind::Io, "unable to write to serial device", Box::new(e)))
    }

    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = self.uart.read(&mut chunk).map_err(|e| {
                ChannelError::KindMsgCause(ChannelErrorKind::Io, "unable to read from serial device", Box::new(e))
            })?;

            if n == 0 {
                break;
            }

            self.buffer.push(&chunk[..n]);
        }

        Ok(self.buffer.next_line())
    }
}

impl Debug for SerialChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("baud_rate", &self.uart.baud_rate())
            .finish()
    }
}

/// Text channel over the standard input and output of this process. Useful for
/// running without a serial port attached.
#[derive(Debug)]
pub struct StdioChannel {
    lines: Receiver<io::Result<Vec<u8>>>,
    closed: bool,
}

impl StdioChannel {
    pub fn new() -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()))
    }

    /// Read lines from `reader` instead of stdin, output still goes to stdout.
    pub(crate) fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        // Lines are read on a separate thread so that `read_line` never blocks
        // waiting for input. Lines are split on raw bytes and decoded the same
        // way as serial input.
        thread::spawn(move || {
            for line in reader.split(b'\n') {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self {
            lines: rx,
            closed: false,
        }
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TextChannel for StdioChannel {
    fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| ChannelError::KindMsgCause(ChannelErrorKind::Io, "unable to write to stdout", Box::new(e)))
    }

    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        if self.closed {
            return Ok(None);
        }

        match self.lines.try_recv() {
            Ok(Ok(line)) => Ok(Some(decode_line(line))),
            Ok(Err(e)) => Err(ChannelError::KindMsgCause(
                ChannelErrorKind::Io,
                "unable to read from stdin",
                Box::new(e),
            )),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("stdin closed, no further commands will be read");
                self.closed = true;
                Ok(None)
            }
        }
    }
}
