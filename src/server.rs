//! Socket server (C6): single-client TCP accept loop, `\r\n`-delimited JSON
//! framing, and the single-writer task that serializes command responses
//! and telemetry onto the socket.
//!
//! Grounded on `test_socket_server.py` (accept/port/framing/exit semantics)
//! and `run_ess_controller.py` (construction and the `srv.write` callback).

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::handler::CommandHandler;
use crate::protocol::{CommandFrame, ResponseCode, ResponseFrame, TelemetryFrame};

const TELEMETRY_CHANNEL_CAPACITY: usize = 256;

pub struct SocketServer {
    host: String,
    port: u16,
    simulation_mode: bool,
}

impl SocketServer {
    pub fn new(host: impl Into<String>, port: u16, simulation_mode: bool) -> Self {
        Self {
            host: host.into(),
            port,
            simulation_mode,
        }
    }

    /// Bind and run the accept loop until a client sends `exit`, or the
    /// process is interrupted. Only one client is served at a time; further
    /// connection attempts are rejected while one is active.
    pub async fn run(&self) -> Result<(), crate::error::ControllerError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| crate::error::ControllerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("listening on {addr} (simulation_mode={})", self.simulation_mode);

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("client connected: {peer}");
            let exit_requested = self.serve_client(stream).await;
            info!("client disconnected: {peer}");
            if exit_requested {
                info!("exit requested, shutting down");
                return Ok(());
            }
        }
    }

    /// Serve one client connection end to end. Returns `true` if the client
    /// requested `exit` (the whole server should stop), `false` if it merely
    /// disconnected or sent `disconnect` (the accept loop continues).
    async fn serve_client(&self, stream: TcpStream) -> bool {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let (telemetry_tx, mut telemetry_rx) = mpsc::channel::<TelemetryFrame>(TELEMETRY_CHANNEL_CAPACITY);
        let mut handler = CommandHandler::new(self.simulation_mode, telemetry_tx);

        let mut line = String::new();
        let mut exit_requested = false;

        loop {
            line.clear();
            tokio::select! {
                read_result = reader.read_line(&mut line) => {
                    match read_result {
                        Ok(0) => {
                            // Client closed the connection.
                            break;
                        }
                        Ok(_) => {
                            let trimmed = line.trim_end_matches(['\r', '\n']);
                            if trimmed.is_empty() {
                                continue;
                            }
                            let Ok(frame) = serde_json::from_str::<CommandFrame>(trimmed) else {
                                warn!("received malformed command frame: {trimmed}");
                                continue;
                            };
                            let is_exit = matches!(frame.command, crate::protocol::Command::Exit);
                            let is_disconnect = matches!(frame.command, crate::protocol::Command::Disconnect);
                            let response = handler.handle_command(frame.command, &frame.parameters).await;
                            if write_response(&mut write_half, response).await.is_err() {
                                break;
                            }
                            if is_exit {
                                exit_requested = true;
                                break;
                            }
                            if is_disconnect {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("socket read error: {e}");
                            break;
                        }
                    }
                }
                Some(frame) = telemetry_rx.recv() => {
                    if write_telemetry(&mut write_half, frame).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Client gone (clean or broken pipe): stop all runners unconditionally.
        handler.handle_command(crate::protocol::Command::Stop, &serde_json::Value::Null).await;
        exit_requested
    }
}

async fn write_response(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    response: ResponseCode,
) -> std::io::Result<()> {
    let frame = ResponseFrame { response };
    write_frame(write_half, &frame).await
}

async fn write_telemetry(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    frame: TelemetryFrame,
) -> std::io::Result<()> {
    write_frame(write_half, &frame).await
}

async fn write_frame<T: serde::Serialize>(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    frame: &T,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(frame).map_err(|e| {
        error!("failed to serialize outbound frame: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;
    payload.extend_from_slice(b"\r\n");
    write_half.write_all(&payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader as TokioBufReader};
    use tokio::net::TcpStream;

    async fn read_line(reader: &mut TokioBufReader<tokio::net::tcp::OwnedReadHalf>) -> serde_json::Value {
        let mut line = String::new();
        tokio::time::timeout(std::time::Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .expect("timed out reading response")
            .expect("read error");
        serde_json::from_str(line.trim_end_matches(['\r', '\n'])).expect("invalid JSON")
    }

    async fn write_command(
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        command: &str,
        parameters: serde_json::Value,
    ) {
        let frame = serde_json::json!({"command": command, "parameters": parameters});
        let mut bytes = serde_json::to_vec(&frame).unwrap();
        bytes.extend_from_slice(b"\r\n");
        writer.write_all(&bytes).await.unwrap();
    }

    async fn start_test_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        tokio::spawn(async move {
            let server = SocketServer::new("127.0.0.1", addr.port(), true);
            let _ = server.run().await;
        });
        // Give the spawned server a moment to bind before the caller connects.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        addr
    }

    #[tokio::test]
    async fn unconfigured_start_is_rejected() {
        let addr = start_test_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        write_command(&mut write_half, "start", serde_json::json!({})).await;
        let response = read_line(&mut reader).await;
        assert_eq!(response["response"], "NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn full_command_sequence_reaches_exit() {
        let addr = start_test_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = TokioBufReader::new(read_half);

        let configuration = serde_json::json!({"devices": [
            {"name": "Test1", "channels": 1, "device_type": "FTDI", "ftdi_id": "ABC", "sensor_type": "Temperature"}
        ]});
        write_command(&mut write_half, "configure", serde_json::json!({"configuration": configuration})).await;
        assert_eq!(read_line(&mut reader).await["response"], "OK");

        write_command(&mut write_half, "start", serde_json::json!({})).await;
        assert_eq!(read_line(&mut reader).await["response"], "OK");

        write_command(&mut write_half, "stop", serde_json::json!({})).await;
        assert_eq!(read_line(&mut reader).await["response"], "OK");

        write_command(&mut write_half, "exit", serde_json::json!({})).await;
        assert_eq!(read_line(&mut reader).await["response"], "OK");
    }
}
