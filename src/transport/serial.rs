//! Real serial-port transport, grounded on the teacher's `WaterMonitor`
//! (`ser: Box<dyn serialport::SerialPort>`, opened via `serialport::open`)
//! and on `rpi_serial_hat.py`'s open/close contract.

use std::io::{self, Read};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};

use crate::config::DeviceConfig;
use crate::protocol::DeviceType;

use super::{LineParams, ReadError, ReadLineResult, Transport};

/// Resolve a device's addressing mode into an OS port name. Called from
/// `open()`, not at construction: a missing instrument must surface as a
/// device-fatal `DEVICE_FAILED` telemetry record once the runner starts, not
/// as a construction failure that silently drops the device before it ever
/// gets a runner.
///
/// `FTDI` devices are looked up by USB serial number via port enumeration;
/// `SERIAL` devices are addressed directly by OS device path.
fn resolve_port_name(device_type: DeviceType, dev_id: &str) -> io::Result<String> {
    match device_type {
        DeviceType::Serial => Ok(dev_id.to_string()),
        DeviceType::Ftdi => {
            let ports = serialport::available_ports().map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("failed to enumerate ports: {e}"))
            })?;
            for port in ports {
                if let SerialPortType::UsbPort(info) = &port.port_type {
                    if info.serial_number.as_deref() == Some(dev_id) {
                        return Ok(port.port_name);
                    }
                }
            }
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no USB serial port with serial number {dev_id:?}"),
            ))
        }
    }
}

pub struct SerialTransport {
    name: String,
    device_type: DeviceType,
    dev_id: String,
    baudrate: u32,
    line_size: usize,
    terminator: String,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(name: impl Into<String>, config: &DeviceConfig) -> Self {
        Self {
            name: name.into(),
            device_type: config.device_type,
            dev_id: config.dev_id.clone(),
            baudrate: 19200,
            line_size: 0,
            terminator: "\r\n".to_string(),
            read_timeout: Duration::from_millis(1500),
            port: None,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> io::Result<()> {
        let port_name = resolve_port_name(self.device_type, &self.dev_id)?;
        let port = serialport::new(&port_name, self.baudrate)
            .timeout(self.read_timeout)
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.port = None;
        Ok(())
    }

    fn set_params(&mut self, params: LineParams) {
        self.line_size = params.line_size;
        self.terminator = params.terminator;
        self.baudrate = params.baudrate;
        self.read_timeout = params.read_timeout;
        if let Some(port) = &mut self.port {
            let _ = port.set_baud_rate(self.baudrate);
            let _ = port.set_timeout(self.read_timeout);
        }
    }

    fn readline(&mut self) -> ReadLineResult {
        let Some(port) = self.port.as_mut() else {
            return ReadLineResult {
                name: self.name.clone(),
                error: Err(ReadError::Timeout),
                line: String::new(),
            };
        };

        let mut buf = vec![0u8; self.line_size.max(1)];
        let mut received = Vec::with_capacity(self.line_size);
        let term_bytes = self.terminator.as_bytes();
        let deadline = std::time::Instant::now() + self.read_timeout;

        loop {
            if received.ends_with(term_bytes) {
                break;
            }
            if received.len() >= self.line_size {
                break;
            }
            if std::time::Instant::now() >= deadline {
                return ReadLineResult {
                    name: self.name.clone(),
                    error: Err(ReadError::Timeout),
                    line: String::from_utf8_lossy(&received).to_string(),
                };
            }
            match port.read(&mut buf[..1]) {
                Ok(0) => break,
                Ok(_) => received.push(buf[0]),
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    return ReadLineResult {
                        name: self.name.clone(),
                        error: Err(ReadError::Timeout),
                        line: String::from_utf8_lossy(&received).to_string(),
                    };
                }
                Err(_) => {
                    return ReadLineResult {
                        name: self.name.clone(),
                        error: Err(ReadError::Timeout),
                        line: String::from_utf8_lossy(&received).to_string(),
                    };
                }
            }
        }

        if !received.iter().all(|b| b.is_ascii()) {
            return ReadLineResult {
                name: self.name.clone(),
                error: Err(ReadError::NonAscii),
                line: String::from_utf8_lossy(&received).to_string(),
            };
        }

        ReadLineResult {
            name: self.name.clone(),
            error: Ok(()),
            line: String::from_utf8_lossy(&received).to_string(),
        }
    }
}
