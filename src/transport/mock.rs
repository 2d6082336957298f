//! Mock transport (C2): deterministic synthetic readings for simulation
//! mode, grounded on `mock_temperature_sensor.py`.
//!
//! `readline` sleeps ~1 second (mirroring the real instrument's sample
//! cadence) and assembles one line in the target sensor's frame format. A
//! `nan_channel` can be set to force one field to the sentinel value
//! `9999.9990`, which decoders must turn into `NaN`.

use std::thread::sleep;
use std::time::Duration;

use rand::Rng;

use crate::protocol::SensorType;

use super::{LineParams, ReadLineResult, Transport};

pub const MIN_TEMP: f64 = 18.0;
pub const MAX_TEMP: f64 = 30.0;
const NAN_SENTINEL: &str = "9999.9990";

pub struct MockTransport {
    name: String,
    sensor_type: SensorType,
    channels: usize,
    nan_channel: Option<usize>,
    terminator: String,
    opened: bool,
}

impl MockTransport {
    pub fn new(name: impl Into<String>, sensor_type: SensorType, channels: usize) -> Self {
        Self {
            name: name.into(),
            sensor_type,
            channels,
            nan_channel: None,
            terminator: "\r\n".to_string(),
            opened: false,
        }
    }

    /// Force the given 0-indexed channel to emit the NaN sentinel value on
    /// every read, for testing decoder NaN handling.
    pub fn with_nan_channel(mut self, channel: usize) -> Self {
        self.nan_channel = Some(channel);
        self
    }

    fn format_value(&self, i: usize) -> String {
        if self.nan_channel == Some(i) {
            return NAN_SENTINEL.to_string();
        }
        let value = rand::thread_rng().gen_range(MIN_TEMP..MAX_TEMP);
        format!("{value:09.4}")
    }

    fn format_temperature_field(&self, i: usize) -> String {
        format!("C{i:02}={}", self.format_value(i))
    }

    fn build_line(&self) -> String {
        match self.sensor_type {
            SensorType::Temperature => (0..self.channels)
                .map(|i| self.format_temperature_field(i))
                .collect::<Vec<_>>()
                .join(","),
            SensorType::Hx85a | SensorType::Hx85ba => (0..self.channels)
                .map(|i| self.format_value(i))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> std::io::Result<()> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.opened = false;
        Ok(())
    }

    fn set_params(&mut self, params: LineParams) {
        self.terminator = params.terminator;
    }

    fn readline(&mut self) -> ReadLineResult {
        sleep(Duration::from_secs(1));
        let line = format!("{}{}", self.build_line(), self.terminator);
        ReadLineResult {
            name: self.name.clone(),
            error: Ok(()),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_line_has_one_field_per_channel() {
        let mut t = MockTransport::new("Test01", SensorType::Temperature, 4);
        t.open().unwrap();
        t.set_params(LineParams {
            line_size: 0,
            terminator: "\r\n".to_string(),
            baudrate: 19200,
            read_timeout: Duration::from_millis(1),
        });
        let result = t.readline();
        assert!(result.error.is_ok());
        assert!(result.line.ends_with("\r\n"));
        let body = result.line.trim_end_matches("\r\n");
        assert_eq!(body.split(',').count(), 4);
        for (i, field) in body.split(',').enumerate() {
            assert!(field.starts_with(&format!("C{i:02}=")));
        }
    }

    #[test]
    fn nan_channel_emits_sentinel() {
        let mut t = MockTransport::new("Test01", SensorType::Temperature, 2).with_nan_channel(1);
        t.open().unwrap();
        t.set_params(LineParams {
            line_size: 0,
            terminator: "\r\n".to_string(),
            baudrate: 19200,
            read_timeout: Duration::from_millis(1),
        });
        let result = t.readline();
        assert!(result.line.contains("C01=9999.9990"));
    }

    #[test]
    fn humidity_line_has_no_preamble() {
        let mut t = MockTransport::new("Test02", SensorType::Hx85a, 3);
        t.open().unwrap();
        t.set_params(LineParams {
            line_size: 0,
            terminator: "\r\n".to_string(),
            baudrate: 19200,
            read_timeout: Duration::from_millis(1),
        });
        let result = t.readline();
        let body = result.line.trim_end_matches("\r\n");
        assert_eq!(body.split(',').count(), 3);
        assert!(!body.contains('C'));
    }
}
