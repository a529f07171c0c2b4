//! Trait abstraction for serial port operations to enable testing

use std::io::{self, Read};
use std::time::Duration;

use crate::error::{GroundlinkError, Result};

/// Read timeout applied to every opened device
const DEVICE_TIMEOUT: Duration = Duration::from_secs(2);

/// One enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// OS device path (e.g., /dev/ttyUSB0)
    pub path: String,
    /// USB manufacturer string, if reported
    pub manufacturer: Option<String>,
    /// USB product string, if reported
    pub product: Option<String>,
}

impl PortDescriptor {
    /// Human-readable name: `"<path> (<manufacturer> <product>)"`
    pub fn display_name(&self) -> String {
        format!(
            "{} ({} {})",
            self.path,
            self.manufacturer.as_deref().unwrap_or("unknown"),
            self.product.as_deref().unwrap_or("unknown"),
        )
    }
}

/// An open device handle
pub trait SerialDevice: Send {
    /// Number of bytes waiting in the OS input buffer
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Enumerates and opens serial devices
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend: Send + Sync {
    /// List the ports currently present on the system
    fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open `path` at `baud`
    fn open(&self, path: &str, baud: u32) -> Result<Box<dyn SerialDevice>>;
}

/// Backend talking to real hardware through `tokio_serial`'s blocking API
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

impl SerialBackend for SystemSerial {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| GroundlinkError::Serial(format!("Failed to enumerate ports: {}", e)))?;

        Ok(ports
            .into_iter()
            .map(|info| match info.port_type {
                tokio_serial::SerialPortType::UsbPort(usb) => PortDescriptor {
                    path: info.port_name,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                },
                _ => PortDescriptor {
                    path: info.port_name,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect())
    }

    fn open(&self, path: &str, baud: u32) -> Result<Box<dyn SerialDevice>> {
        let port = tokio_serial::new(path, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(DEVICE_TIMEOUT)
            .open()
            .map_err(|e| GroundlinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(Box::new(SystemDevice { port }))
    }
}

/// Wrapper around a blocking `tokio_serial::SerialPort`
struct SystemDevice {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SerialDevice for SystemDevice {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(waiting as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Scripted device for testing; clones share the same feed
    #[derive(Clone, Default)]
    pub struct ScriptedDevice {
        pub incoming: Arc<Mutex<VecDeque<u8>>>,
        pub read_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl ScriptedDevice {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn feed(&self, bytes: &[u8]) {
            self.incoming.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn set_read_error(&self, error: io::ErrorKind) {
            *self.read_error.lock().unwrap() = Some(error);
        }

        pub fn pending(&self) -> usize {
            self.incoming.lock().unwrap().len()
        }
    }

    impl SerialDevice for ScriptedDevice {
        fn bytes_available(&mut self) -> io::Result<usize> {
            if let Some(error) = *self.read_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock read error"));
            }
            Ok(self.incoming.lock().unwrap().len())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(error) = *self.read_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock read error"));
            }
            let mut incoming = self.incoming.lock().unwrap();
            let n = buf.len().min(incoming.len());
            for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    /// Descriptor helper for mocked enumeration
    pub fn usb_port(path: &str) -> PortDescriptor {
        PortDescriptor {
            path: path.to_string(),
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R".to_string()),
        }
    }

    /// Backend whose every `open` hands out a clone of `device`
    pub fn backend_with(paths: &[&str], device: ScriptedDevice) -> MockSerialBackend {
        let ports: Vec<PortDescriptor> = paths.iter().map(|p| usb_port(p)).collect();
        let mut backend = MockSerialBackend::new();
        backend
            .expect_list_ports()
            .returning(move || Ok(ports.clone()));
        backend
            .expect_open()
            .returning(move |_, _| Ok(Box::new(device.clone()) as Box<dyn SerialDevice>));
        backend
    }

    /// Backend with one scripted device per path
    pub fn backend_with_devices(devices: &[(&str, ScriptedDevice)]) -> MockSerialBackend {
        let ports: Vec<PortDescriptor> = devices.iter().map(|(p, _)| usb_port(p)).collect();
        let by_path: HashMap<String, ScriptedDevice> = devices
            .iter()
            .map(|(p, d)| (p.to_string(), d.clone()))
            .collect();

        let mut backend = MockSerialBackend::new();
        backend
            .expect_list_ports()
            .returning(move || Ok(ports.clone()));
        backend.expect_open().returning(move |path, _| {
            by_path
                .get(path)
                .cloned()
                .map(|d| Box::new(d) as Box<dyn SerialDevice>)
                .ok_or_else(|| GroundlinkError::Serial(format!("No such port {}", path)))
        });
        backend
    }
}
