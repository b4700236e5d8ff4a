use std::env;

use xbee_serial::device::lr::{LrConfig, LrPacket, LrRxPacket, SEND_FAILED};
use xbee_serial::device::{ModemStatus, TxStatus};
use xbee_serial::{Callbacks, Config, Device, Transport, XBee};

mod serial_transport;
use serial_transport::SerialTransport;

const PORT_NAME: &'static str = "/dev/ttyUSB0";

struct Printer;

impl Callbacks<LrRxPacket> for Printer {
    fn on_receive(&mut self, packet: &LrRxPacket) {
        println!(
            "downlink port {} rssi {} snr {}: {:02x?}",
            packet.port, packet.rssi, packet.snr, packet.payload
        );
    }

    fn on_send(&mut self, status: &TxStatus) {
        println!("tx status {:?}", status);
    }

    fn on_modem_status(&mut self, status: ModemStatus) {
        println!("modem status {:?}", status);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        return Err("usage: lr_uplink <APP EUI> <APP KEY>".into());
    }
    let wrap = |e: xbee_serial::Error| format!("{:?}", e);

    let config = LrConfig::default()
        .with_app_eui(&args[1])
        .map_err(wrap)?
        .with_app_key(&args[2])
        .map_err(wrap)?;

    let mut xbee = XBee::lr(SerialTransport::new(), Printer, Config::default());
    xbee.init(9_600, PORT_NAME).map_err(wrap)?;
    xbee.configure(&config).map_err(wrap)?;

    let mut dev_eui = [0; 16];
    println!("dev eui {}", xbee.get_dev_eui(&mut dev_eui).map_err(wrap)?);

    xbee.connect().map_err(wrap)?;

    let packet = LrPacket::new(2, true, b"hello").map_err(wrap)?;
    match xbee.send_data(&packet) {
        0 => println!("uplink delivered"),
        SEND_FAILED => eprintln!("uplink got no transmit status"),
        status => eprintln!("uplink failed with status {:02x}", status),
    }

    // give class A receive windows a chance to deliver a downlink
    let started = xbee.transport().millis();
    while xbee.transport().millis().wrapping_sub(started) < 5_000 {
        xbee.process().map_err(wrap)?;
    }
    Ok(())
}
