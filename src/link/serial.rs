use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use serialport::{SerialPort, SerialPortType};

use super::SerialTransport;
use crate::error::LinkError;

/// Serial port visible to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    /// Human readable description, e.g. "USB 2341:0043 Arduino Uno"
    pub description: String,
}

/// Enumerate serial ports, most likely boards first.
///
/// Enumeration failures are logged and reported as an empty list.
pub fn list_ports() -> Vec<PortInfo> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            warn!("[SerialLink] Port enumeration failed: {}", err);
            return Vec::new();
        }
    };

    let mut infos: Vec<(bool, PortInfo)> = ports
        .into_iter()
        .map(|port| {
            let (is_usb, description) = match &port.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb
                        .product
                        .clone()
                        .or_else(|| usb.manufacturer.clone())
                        .unwrap_or_default();
                    (
                        true,
                        format!("USB {:04x}:{:04x} {}", usb.vid, usb.pid, product)
                            .trim_end()
                            .to_string(),
                    )
                }
                SerialPortType::BluetoothPort => (false, "Bluetooth".to_string()),
                SerialPortType::PciPort => (false, "PCI".to_string()),
                SerialPortType::Unknown => (false, "Unknown".to_string()),
            };
            (
                is_usb,
                PortInfo {
                    name: port.port_name,
                    description,
                },
            )
        })
        .collect();

    infos.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    infos.into_iter().map(|(_, info)| info).collect()
}

/// Open `port` at `baud_rate` with the given read timeout
pub fn open_port(
    port: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<SerialPortTransport, LinkError> {
    let handle = serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|err| LinkError::OpenFailed {
            port: port.to_string(),
            reason: err.to_string(),
        })?;
    debug!("[SerialLink] Opened {} at {} baud", port, baud_rate);
    Ok(SerialPortTransport { port: handle })
}

/// [`SerialTransport`] backed by the `serialport` crate
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport for SerialPortTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let available = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(available as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
