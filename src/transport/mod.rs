//! Transport abstraction (C1/C2): a byte-stream source with `open`/`close`/
//! `readline` and configurable line framing parameters, implemented once
//! over real serial ports ([`serial::SerialTransport`]) and once as a
//! deterministic generator for simulation mode ([`mock::MockTransport`]).
//!
//! `readline` never raises; transport faults come back as a [`ReadError`]
//! value so the decoder and runner can classify them without exceptional
//! control flow (the "error-as-value" discipline in the design notes).

pub mod mock;
pub mod serial;

use std::time::Duration;

/// Outcome of one `readline` call, alongside `OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The terminator was not seen before `read_timeout` elapsed.
    Timeout,
    /// A byte outside the printable ASCII range was received.
    NonAscii,
}

impl ReadError {
    pub fn as_code(&self) -> &'static str {
        match self {
            ReadError::Timeout => "TIMEOUT",
            ReadError::NonAscii => "NON_ASCII",
        }
    }
}

/// Result of a single `readline`: the device name, and either the received
/// line (possibly partial, on a fault) or the fault kind.
pub struct ReadLineResult {
    pub name: String,
    pub error: Result<(), ReadError>,
    pub line: String,
}

/// Parameters a decoder pushes onto a transport in `start()`, before the
/// first `readline`.
#[derive(Debug, Clone)]
pub struct LineParams {
    pub line_size: usize,
    pub terminator: String,
    pub baudrate: u32,
    pub read_timeout: Duration,
}

/// Capability set common to every transport kind.
pub trait Transport: Send {
    /// Open the underlying byte stream (serial port, or no-op for mocks).
    fn open(&mut self) -> std::io::Result<()>;

    /// Close the underlying byte stream.
    fn close(&mut self) -> std::io::Result<()>;

    /// Apply the framing parameters a decoder requires.
    fn set_params(&mut self, params: LineParams);

    /// Block (up to `read_timeout`) for one terminator-delimited line.
    fn readline(&mut self) -> ReadLineResult;
}
