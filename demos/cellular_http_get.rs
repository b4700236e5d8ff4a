use std::env;

use xbee_serial::device::cellular::{CellularConfig, CellularRx, Protocol, SocketAddress};
use xbee_serial::{Callbacks, Config, Device, Transport, XBee};

mod serial_transport;
use serial_transport::SerialTransport;

const PORT_NAME: &'static str = "/dev/ttyUSB0";

struct Printer;

impl Callbacks<CellularRx> for Printer {
    fn on_receive(&mut self, packet: &CellularRx) {
        match packet {
            CellularRx::Socket { socket, payload } => {
                println!("socket {}: {}", socket, String::from_utf8_lossy(payload));
            }
            other => println!("received {:?}", other),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port_name = env::args().nth(1).unwrap_or_else(|| PORT_NAME.to_string());
    let apn = env::args().nth(2).unwrap_or_default();

    let mut xbee = XBee::cellular(SerialTransport::new(), Printer, Config::default());
    let wrap = |e: xbee_serial::Error| format!("{:?}", e);

    xbee.init(9_600, &port_name).map_err(wrap)?;
    xbee.configure(&CellularConfig::new(&apn, "", "").map_err(wrap)?)
        .map_err(wrap)?;
    xbee.connect().map_err(wrap)?;
    println!("firmware {:08x}", xbee.firmware_version().map_err(wrap)?);

    let socket = xbee.socket_create(Protocol::Tcp).map_err(wrap)?;
    xbee.socket_connect(socket, SocketAddress::Hostname("example.com"), 80)
        .map_err(wrap)?;
    xbee.socket_send(
        socket,
        b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .map_err(wrap)?;

    let started = xbee.transport().millis();
    while xbee.transport().millis().wrapping_sub(started) < 10_000 {
        xbee.process().map_err(wrap)?;
    }

    xbee.socket_close(socket).map_err(wrap)?;
    Ok(())
}
