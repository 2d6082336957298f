//! End-to-end socket server scenarios, grounded on
//! `original_source/tests/test_socket_server.py`.

use std::collections::HashSet;
use std::time::Duration;

use ess_controller::server::SocketServer;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

async fn start_server() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    tokio::spawn(async move {
        let server = SocketServer::new("127.0.0.1", addr.port(), true);
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

async fn connect(addr: std::net::SocketAddr) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = timeout(Duration::from_secs(1), TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half), write_half)
}

async fn write_command(writer: &mut tokio::net::tcp::OwnedWriteHalf, command: &str, parameters: Value) {
    let frame = json!({"command": command, "parameters": parameters});
    let mut bytes = serde_json::to_vec(&frame).unwrap();
    bytes.extend_from_slice(b"\r\n");
    writer.write_all(&bytes).await.unwrap();
}

async fn read_frame(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
    let mut line = String::new();
    timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a frame")
        .expect("read error");
    serde_json::from_str(line.trim_end_matches(['\r', '\n'])).expect("invalid JSON frame")
}

/// Read frames until one is a command response (skipping any interleaved
/// telemetry), matching the "response immediately follows its command"
/// ordering guarantee from section 5 while tolerating telemetry that may
/// have been queued ahead of it.
async fn read_response(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
    loop {
        let frame = read_frame(reader).await;
        if frame.get("response").is_some() {
            return frame;
        }
    }
}

#[tokio::test]
async fn scenario_three_devices_each_produce_telemetry() {
    let addr = start_server().await;
    let (mut reader, mut writer) = connect(addr).await;

    let configuration = json!({"devices": [
        {"name": "Test01", "channels": 4, "device_type": "FTDI", "ftdi_id": "ABC", "sensor_type": "Temperature"},
        {"name": "Test02", "device_type": "FTDI", "ftdi_id": "ABC", "sensor_type": "HX85A"},
        {"name": "Test03", "device_type": "FTDI", "ftdi_id": "ABC", "sensor_type": "HX85BA"},
    ]});
    write_command(&mut writer, "configure", json!({"configuration": configuration})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    write_command(&mut writer, "start", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    let mut seen_names: HashSet<String> = HashSet::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen_names.len() < 3 && tokio::time::Instant::now() < deadline {
        let frame = read_frame(&mut reader).await;
        let Some(telemetry) = frame.get("telemetry").and_then(Value::as_array) else {
            continue;
        };
        let name = telemetry[0].as_str().unwrap().to_string();
        match name.as_str() {
            "Test01" => assert_eq!(telemetry.len(), 7, "temperature record should have 3 + 4 entries"),
            "Test02" => assert_eq!(telemetry.len(), 6, "HX85A record should have 3 + 3 entries"),
            "Test03" => assert_eq!(telemetry.len(), 7, "HX85BA record should have 3 + 4 entries"),
            other => panic!("unexpected device name {other}"),
        }
        assert!(telemetry[1].as_f64().unwrap() >= 0.0);
        seen_names.insert(name);
    }
    assert_eq!(seen_names.len(), 3, "expected telemetry from all three configured devices");

    write_command(&mut writer, "exit", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");
}

#[tokio::test]
async fn scenario_stop_then_restart_without_resending_configuration() {
    let addr = start_server().await;
    let (mut reader, mut writer) = connect(addr).await;

    let configuration = json!({"devices": [
        {"name": "Test01", "channels": 2, "device_type": "FTDI", "ftdi_id": "ABC", "sensor_type": "Temperature"},
    ]});
    write_command(&mut writer, "configure", json!({"configuration": configuration})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    write_command(&mut writer, "start", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    // Wait for at least one telemetry record before stopping.
    loop {
        let frame = read_frame(&mut reader).await;
        if frame.get("telemetry").is_some() {
            break;
        }
    }

    write_command(&mut writer, "stop", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    // No configuration resent: start should still succeed.
    write_command(&mut writer, "start", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");

    let mut got_telemetry_again = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let frame = read_frame(&mut reader).await;
        if frame.get("telemetry").is_some() {
            got_telemetry_again = true;
            break;
        }
    }
    assert!(got_telemetry_again, "expected telemetry to resume after restart");

    write_command(&mut writer, "exit", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");
}

#[tokio::test]
async fn scenario_unconfigured_start_rejected_and_disconnect_frees_the_server() {
    let addr = start_server().await;
    {
        let (mut reader, mut writer) = connect(addr).await;
        write_command(&mut writer, "start", json!({})).await;
        assert_eq!(read_response(&mut reader).await["response"], "NOT_CONFIGURED");
        write_command(&mut writer, "disconnect", json!({})).await;
        assert_eq!(read_response(&mut reader).await["response"], "OK");
    }

    // A fresh client can connect after the previous one disconnected.
    let (mut reader, mut writer) = connect(addr).await;
    write_command(&mut writer, "start", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "NOT_CONFIGURED");
    write_command(&mut writer, "exit", json!({})).await;
    assert_eq!(read_response(&mut reader).await["response"], "OK");
}
