//! Process entry point: bootstraps logging and reads the minimal deployment
//! parameters (`ESS_HOST`, `ESS_PORT`, `ESS_SIMULATION_MODE`) from the
//! environment, then hands off to [`ess_controller::server::SocketServer`].
//!
//! Grounded on `run_ess_controller.py::main` (host/port/simulation_mode
//! construction, `logging.basicConfig` at entry). Configuration-file loading
//! and the observatory control client are out of scope, see `SPEC_FULL.md`.

use ess_controller::error::ControllerError;
use ess_controller::protocol::CONTROLLER_PORT;
use ess_controller::server::SocketServer;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let host = env_or("ESS_HOST", "0.0.0.0");
    let port: u16 = match std::env::var("ESS_PORT") {
        Ok(raw) => raw.parse().map_err(ControllerError::InvalidPort)?,
        Err(_) => CONTROLLER_PORT,
    };
    let simulation_mode = env_or("ESS_SIMULATION_MODE", "0") == "1";

    log::info!("constructing the sensor controller server");
    let server = SocketServer::new(host, port, simulation_mode);

    log::info!("starting the sensor controller server");
    server.run().await?;

    log::info!("sensor controller server exited cleanly");
    Ok(())
}
