//! Sensor decoders (C3): one per `sensor_type`, each owning a transport and
//! turning raw lines into [`crate::protocol::TelemetryRecord`]s.

pub mod humidity;
pub mod sel;

use crate::protocol::TelemetryRecord;

/// Capability set common to every decoder kind: open/configure the
/// transport, read and decode one line, close the transport.
pub trait Decoder: Send {
    fn start(&mut self) -> std::io::Result<()>;
    fn stop(&mut self) -> std::io::Result<()>;
    fn read(&mut self) -> TelemetryRecord;
}

/// Current time as seconds since the Unix epoch, the `timestamp` field of a
/// [`TelemetryRecord`]. Uses `chrono` (the teacher's timestamp dependency)
/// rather than rolling a `SystemTime` duration by hand.
pub(crate) fn now_unix_seconds() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 / 1e9
}
