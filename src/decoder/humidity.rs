//! HX85A / HX85BA humidity sensor decoders.
//!
//! Same framing discipline as the SEL decoder (strict line size, ASCII-only,
//! `\r\n` terminator, comma-delimited fixed-width fields) but with no
//! per-channel preamble: these instruments emit bare comma-separated
//! values. HX85A reports humidity/ambient/dew-point (3 fields); HX85BA adds
//! barometric pressure (4 fields).

use crate::protocol::TelemetryRecord;
use crate::transport::{LineParams, Transport};

use super::{now_unix_seconds, Decoder};

const VALUE_SIZE: usize = 9;
const DELIMITER: char = ',';
const TERMINATOR: &str = "\r\n";
const BAUDRATE: u32 = 19200;
const READ_TIMEOUT_MS: u64 = 1500;

/// Which humidity instrument this decoder speaks for, fixing its field
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumidityKind {
    Hx85a,
    Hx85ba,
}

impl HumidityKind {
    fn field_count(self) -> usize {
        match self {
            HumidityKind::Hx85a => 3,
            HumidityKind::Hx85ba => 4,
        }
    }
}

pub struct HumidityDecoder {
    name: String,
    kind: HumidityKind,
    transport: Box<dyn Transport>,
    line_size: usize,
}

impl HumidityDecoder {
    pub fn new(name: impl Into<String>, kind: HumidityKind, transport: Box<dyn Transport>) -> Self {
        let fields = kind.field_count();
        let line_size = fields * VALUE_SIZE + (fields - 1) + TERMINATOR.len();
        Self {
            name: name.into(),
            kind,
            transport,
            line_size,
        }
    }
}

impl Decoder for HumidityDecoder {
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
        let fields_n = self.kind.field_count();
        let mut values = vec![f64::NAN; fields_n];
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
            let fields: Vec<&str> = body.split(DELIMITER).collect();
            if fields.len() != fields_n {
                return TelemetryRecord::with_error(
                    result.name,
                    now,
                    "Malformed response. Channel data incorrect",
                    values,
                );
            }

            let mut err = "OK".to_string();
            for (i, field) in fields.iter().enumerate() {
                match field.parse::<f64>() {
                    Ok(v) => values[i] = v,
                    Err(_) => {
                        err = format!(
                            "Sensor data error. Could not convert value(s) to float: {line}"
                        );
                    }
                }
            }

            return TelemetryRecord::with_error(result.name, now, err, values);
        };

        TelemetryRecord::with_error(result.name, now, transport_err.as_code(), values)
    }
}
