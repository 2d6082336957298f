//! Device runner (C4): one acquisition task per configured device.
//!
//! Grounded on `sel_temperature_reader.py::read`, which offloads the
//! blocking `comport.readline()` call to the asyncio default executor via
//! `loop.run_in_executor(None, ...)`. This implementation carries that
//! pattern over directly as `tokio::task::spawn_blocking`, so the blocking
//! serial read never stalls the rest of the runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DeviceConfig;
use crate::decoder::humidity::{HumidityDecoder, HumidityKind};
use crate::decoder::sel::SelTemperatureDecoder;
use crate::decoder::Decoder;
use crate::protocol::{SensorType, TelemetryFrame, TelemetryRecord};
use crate::transport::mock::MockTransport;
use crate::transport::serial::SerialTransport;
use crate::transport::Transport;

/// Lifecycle state of one [`DeviceRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Stopping,
    Failed,
}

/// Build the decoder (and its owned transport) for one device configuration.
///
/// Three sensor kinds times two transport kinds, modeled as a factory keyed
/// by the config enums rather than inheritance, per the "polymorphic
/// decoders and transports" design note. Never fails: a `SerialTransport`
/// only resolves its OS port name once the acquisition loop calls
/// `decoder.start()`, so a missing instrument surfaces as a device-fatal
/// `DEVICE_FAILED` telemetry record instead of silently dropping the device
/// before a runner ever spawns.
fn build_decoder(config: &DeviceConfig, simulation_mode: bool) -> Box<dyn Decoder> {
    let channels = config.channel_count() as usize;
    let transport: Box<dyn Transport> = if simulation_mode {
        Box::new(MockTransport::new(config.name.clone(), config.sensor_type, channels))
    } else {
        Box::new(SerialTransport::new(config.name.clone(), config))
    };

    match config.sensor_type {
        SensorType::Temperature => {
            Box::new(SelTemperatureDecoder::new(config.name.clone(), channels, transport))
        }
        SensorType::Hx85a => {
            Box::new(HumidityDecoder::new(config.name.clone(), HumidityKind::Hx85a, transport))
        }
        SensorType::Hx85ba => {
            Box::new(HumidityDecoder::new(config.name.clone(), HumidityKind::Hx85ba, transport))
        }
    }
}

/// Handle the command handler holds for one spawned device runner.
pub struct DeviceRunner {
    pub name: String,
    state: Arc<std::sync::Mutex<RunnerState>>,
    cancel: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl DeviceRunner {
    /// Build the decoder, spawn the acquisition task, and return a handle to
    /// it. `telemetry_tx` is the single outbound channel the socket server
    /// writer task drains (the single-writer discipline of section 5).
    ///
    /// Always spawns: a device that cannot actually be opened (unresolvable
    /// FTDI serial number, missing OS path, ...) still gets a runner, which
    /// reports exactly that as a `DEVICE_FAILED` telemetry record once its
    /// loop calls `decoder.start()`.
    pub fn spawn(
        config: DeviceConfig,
        simulation_mode: bool,
        telemetry_tx: mpsc::Sender<TelemetryFrame>,
    ) -> Self {
        let name = config.name.clone();
        let decoder = build_decoder(&config, simulation_mode);
        let state = Arc::new(std::sync::Mutex::new(RunnerState::Idle));
        let cancel = Arc::new(AtomicBool::new(false));

        let task_state = state.clone();
        let task_cancel = cancel.clone();
        let task_name = name.clone();

        let join_handle = tokio::spawn(async move {
            run_acquisition_loop(task_name, decoder, task_state, task_cancel, telemetry_tx).await;
        });

        Self {
            name,
            state,
            cancel,
            join_handle: Some(join_handle),
        }
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap()
    }

    /// Signal cancellation and await the runner reaching `Idle` or `Failed`.
    pub async fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run_acquisition_loop(
    name: String,
    mut decoder: Box<dyn Decoder>,
    state: Arc<std::sync::Mutex<RunnerState>>,
    cancel: Arc<AtomicBool>,
    telemetry_tx: mpsc::Sender<TelemetryFrame>,
) {
    if let Err(e) = decoder.start() {
        warn!("device {name}: failed to start decoder: {e}");
        *state.lock().unwrap() = RunnerState::Failed;
        let record = TelemetryRecord::with_error(
            name.clone(),
            crate::decoder::now_unix_seconds(),
            format!("DEVICE_FAILED: {e}"),
            Vec::new(),
        );
        let _ = telemetry_tx.send(TelemetryFrame { telemetry: record }).await;
        return;
    }

    *state.lock().unwrap() = RunnerState::Running;
    info!("device {name}: acquisition started");

    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        // Offload the blocking serial read so other tasks keep running.
        let mut blocking_decoder = decoder;
        let (record, returned_decoder) = tokio::task::spawn_blocking(move || {
            let record = blocking_decoder.read();
            (record, blocking_decoder)
        })
        .await
        .unwrap_or_else(|join_err| {
            warn!("device {name}: acquisition task panicked: {join_err}");
            (
                TelemetryRecord::with_error(
                    name.clone(),
                    crate::decoder::now_unix_seconds(),
                    format!("DEVICE_FAILED: {join_err}"),
                    Vec::new(),
                ),
                // Unreachable in practice (the panic took the decoder with it),
                // but spawn_blocking's JoinError path needs a value of the right
                // shape; we exit the loop on the next iteration regardless.
                Box::new(DeadDecoder) as Box<dyn Decoder>,
            )
        });
        decoder = returned_decoder;

        debug!("device {name}: telemetry error={}", record.error);
        if record.error.starts_with("DEVICE_FAILED") {
            *state.lock().unwrap() = RunnerState::Failed;
            let _ = telemetry_tx.send(TelemetryFrame { telemetry: record }).await;
            break;
        }

        if telemetry_tx.send(TelemetryFrame { telemetry: record }).await.is_err() {
            // Writer side gone (client disconnected); nothing more to do.
            break;
        }

        tokio::task::yield_now().await;
    }

    *state.lock().unwrap() = RunnerState::Stopping;
    if let Err(e) = decoder.stop() {
        warn!("device {name}: failed to close decoder cleanly: {e}");
    }
    *state.lock().unwrap() = RunnerState::Idle;
    info!("device {name}: acquisition stopped");
}

/// Placeholder decoder substituted after a panicked acquisition task; its
/// `stop()` is a no-op since the real decoder (and its transport) were
/// dropped along with the panicked blocking task.
struct DeadDecoder;

impl Decoder for DeadDecoder {
    fn start(&mut self) -> std::io::Result<()> {
        Ok(())
    }
    fn stop(&mut self) -> std::io::Result<()> {
        Ok(())
    }
    fn read(&mut self) -> TelemetryRecord {
        TelemetryRecord::with_error(
            "dead",
            crate::decoder::now_unix_seconds(),
            "DEVICE_FAILED: decoder already stopped",
            Vec::new(),
        )
    }
}
