//! SEL multi-channel temperature decoder, grounded line-by-line on
//! `sel_temperature_reader.py`.
//!
//! Frame (N channels): `C00=snnn.nnnn,C01=snnn.nnnn,...,C{N-1}=snnn.nnnn\r\n`.
//! Both 0-indexed (`C00=`) and 1-indexed (`C01=` for channel 0) preambles are
//! accepted for each channel, legacy compatibility preserved from the
//! source, see Open Question (a) in the design notes.

use crate::protocol::TelemetryRecord;
use crate::transport::{LineParams, Transport};

use super::{now_unix_seconds, Decoder};

pub const BAUDRATE: u32 = 19200;
pub const READ_TIMEOUT_MS: u64 = 1500;

const PREAMBLE_SIZE: usize = 4;
const VALUE_SIZE: usize = 9;
const DELIMITER: char = ',';
const TERMINATOR: &str = "\r\n";
const DEFAULT_VAL: f64 = f64::NAN;

pub struct SelTemperatureDecoder {
    name: String,
    channels: usize,
    transport: Box<dyn Transport>,
    preamble: Vec<String>,
    legacy_preamble: Vec<String>,
    line_size: usize,
}

impl SelTemperatureDecoder {
    pub fn new(name: impl Into<String>, channels: usize, transport: Box<dyn Transport>) -> Self {
        let preamble = (0..channels).map(|i| format!("C{i:02}=")).collect();
        let legacy_preamble = (0..channels).map(|i| format!("C{:02}=", i + 1)).collect();
        let line_size = channels * (PREAMBLE_SIZE + VALUE_SIZE + 1) - 1 + TERMINATOR.len();
        Self {
            name: name.into(),
            channels,
            transport,
            preamble,
            legacy_preamble,
            line_size,
        }
    }

    fn field_matches(&self, i: usize, field: &str) -> bool {
        field.len() >= PREAMBLE_SIZE
            && (field[..PREAMBLE_SIZE] == self.preamble[i] || field[..PREAMBLE_SIZE] == self.legacy_preamble[i])
    }
}

impl Decoder for SelTemperatureDecoder {
    fn start(&mut self) -> std::io::Result<()> {
        self.transport.open()?;
        self.transport.set_params(LineParams {
            line_size: self.line_size,
            terminator: TERMINATOR.to_string(),
            baudrate: BAUDRATE,
            read_timeout: std::time::Duration::from_millis(READ_TIMEOUT_MS),
        });
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        self.transport.close()
    }

    fn read(&mut self) -> TelemetryRecord {
        let mut values = vec![DEFAULT_VAL; self.channels];
        let result = self.transport.readline();
        let now = now_unix_seconds();

        let Err(transport_err) = result.error else {
            let line = result.line;
            if !line.ends_with(TERMINATOR) || line.len() != self.line_size {
                return TelemetryRecord::with_error(
                    result.name,
                    now,
                    format!("Malformed response. Terminator or line size incorrect: {line}"),
                    values,
                );
            }

            let body = &line[..line.len() - TERMINATOR.len()];
            let fields: Vec<&str> = body.splitn(self.channels, DELIMITER).collect();
            if fields.len() != self.channels {
                return TelemetryRecord::with_error(
                    result.name,
                    now,
                    "Malformed response. Channel preamble or channel data incorrect",
                    values,
                );
            }

            let mut err = "OK".to_string();
            for (i, field) in fields.iter().enumerate() {
                if self.field_matches(i, field) {
                    match field[PREAMBLE_SIZE..].parse::<f64>() {
                        Ok(v) => values[i] = v,
                        Err(_) => {
                            err = format!(
                                "Temperature data error. Could not convert value(s) to float: {line}"
                            );
                        }
                    }
                } else {
                    err = "Malformed response. Channel preamble or channel data incorrect".to_string();
                }
            }

            return TelemetryRecord::with_error(result.name, now, err, values);
        };

        TelemetryRecord::with_error(result.name, now, transport_err.as_code(), values)
    }
}
