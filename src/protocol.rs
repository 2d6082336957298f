//! Wire protocol: command/response/telemetry frames and the shared enums used
//! throughout the control plane.
//!
//! Every message on the socket is a single JSON object followed by `\r\n`
//! (see [`crate::server`]). This module only defines the shapes; framing and
//! I/O live in `server`.

use serde::{Deserialize, Serialize};
use serde::ser::{Serializer, SerializeSeq};
use std::fmt;

/// Default TCP port the controller listens on absent an `ESS_PORT` override.
pub const CONTROLLER_PORT: u16 = 5000;

/// Commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Configure,
    Start,
    Stop,
    Disconnect,
    Exit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::Configure => "configure",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Disconnect => "disconnect",
            Command::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

/// Response codes returned for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Ok,
    NotConfigured,
    NotStarted,
    AlreadyStarted,
    InvalidConfiguration,
    DeviceFailed,
}

/// How `dev_id` on a [`crate::config::DeviceConfig`] is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Ftdi,
    Serial,
}

/// The instrument protocol a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorType {
    #[serde(rename = "Temperature", alias = "TEMPERATURE")]
    Temperature,
    #[serde(rename = "HX85A")]
    Hx85a,
    #[serde(rename = "HX85BA")]
    Hx85ba,
}

/// A single ingress frame: `{"command": "...", "parameters": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFrame {
    pub command: Command,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// A command-response egress frame: `{"response": "OK"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFrame {
    pub response: ResponseCode,
}

/// Wrapper that serializes `f64::NAN` as JSON `null`.
///
/// `serde_json` refuses to serialize non-finite floats at all (it errors),
/// and standard JSON has no `NaN` literal, so unread/invalid channels are
/// represented on the wire as `null` rather than a value. See Open Question
/// (d) in the design notes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryValue(pub f64);

impl Serialize for TelemetryValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_none()
        }
    }
}

/// A telemetry-envelope egress frame:
/// `{"telemetry": [name, timestamp, error, value0, value1, ...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    pub telemetry: TelemetryRecord,
}

/// `[device_name, unix_timestamp_seconds, error_code, value_0, ..]`.
///
/// Serializes as a heterogeneous JSON array, matching the wire shape exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub name: String,
    pub timestamp: f64,
    pub error: String,
    pub values: Vec<TelemetryValue>,
}

impl TelemetryRecord {
    pub fn ok(name: impl Into<String>, timestamp: f64, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            error: "OK".to_string(),
            values: values.into_iter().map(TelemetryValue).collect(),
        }
    }

    pub fn with_error(
        name: impl Into<String>,
        timestamp: f64,
        error: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            error: error.into(),
            values: values.into_iter().map(TelemetryValue).collect(),
        }
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3 + self.values.len()))?;
        seq.serialize_element(&self.name)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.error)?;
        for v in &self.values {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

/// Keys used in the `configure` command's `parameters.configuration` payload.
pub mod key {
    pub const DEVICES: &str = "devices";
    pub const NAME: &str = "name";
    pub const CHANNELS: &str = "channels";
    pub const DEVICE_TYPE: &str = "device_type";
    pub const FTDI_ID: &str = "ftdi_id";
    pub const SERIAL_PORT: &str = "serial_port";
    pub const SENSOR_TYPE: &str = "sensor_type";
    pub const CONFIGURATION: &str = "configuration";
}
