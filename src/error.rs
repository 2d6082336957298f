//! Server-fatal errors: the only errors that escape the control plane and
//! terminate the process. Everything else (protocol errors, bad
//! configuration, transport faults, device failures) stays inside the
//! component boundary that produced it and surfaces as a response code or a
//! telemetry error string instead, see the propagation policy in
//! `SPEC_FULL.md` section 7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to bind controller socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read ESS_PORT from environment: {0}")]
    InvalidPort(std::num::ParseIntError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
