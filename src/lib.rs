//! Environmental sensor controller: a single-client, line-delimited JSON
//! command/telemetry server fronting serial-attached temperature and
//! humidity instruments.
//!
//! See `SPEC_FULL.md` for the full component breakdown. Module-to-component
//! mapping:
//!
//! - [`protocol`]: wire schema, command/response/telemetry frames (C7)
//! - [`config`]: device configuration data model and validation
//! - [`transport`]: serial and mock byte-stream sources (C1/C2)
//! - [`decoder`]: SEL/HX85A/HX85BA line decoders (C3)
//! - [`runner`]: per-device acquisition task (C4)
//! - [`handler`]: command state machine and runner registry (C5)
//! - [`server`]: TCP accept loop and socket framing (C6)
//! - [`error`]: server-fatal error type

pub mod config;
pub mod decoder;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod runner;
pub mod server;
pub mod transport;
