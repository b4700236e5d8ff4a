use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use xbee_serial::{Transport, TransportError};

/// [Transport] over a host serial port
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    started: Instant,
}

impl SerialTransport {
    pub fn new() -> Self {
        SerialTransport {
            port: None,
            started: Instant::now(),
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::InitFailed)
    }
}

impl Transport for SerialTransport {
    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), TransportError> {
        match serialport::new(device, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
        {
            Ok(port) => {
                self.port = Some(port);
                Ok(())
            }
            Err(e) => {
                eprintln!("Failed to open \"{}\". Error: {}", device, e);
                Err(TransportError::InitFailed)
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                eprintln!("{:?}", e);
                Err(TransportError::Unknown)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        match self.port()?.write(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                eprintln!("{:?}", e);
                Err(TransportError::Unknown)
            }
        }
    }

    fn millis(&mut self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    fn delay(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn flush_rx(&mut self) {
        if let Some(port) = self.port.as_mut() {
            let _ = port.clear(serialport::ClearBuffer::Input);
        }
    }
}
