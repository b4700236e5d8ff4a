//! XBee LR (LoRaWAN)
//!
//! Keys and EUIs are taken as hex strings and validated before anything is written. Joining
//! is started with a join request frame and polled through `JS` (1 = joined). Uplinks wait for
//! their transmit status, which carries the LoRaWAN delivery result.
use heapless::Vec;

use super::{Callbacks, Device, Error, Family, TxStatus, XBee};
use crate::api::{ApiFrame, FrameType, MAX_PAYLOAD_LENGTH};
use crate::at::AtCommand;
use crate::config::{Config, ConnectMode};
use crate::hex;
use crate::transport::Transport;

pub const APP_KEY_LENGTH: usize = 16;
pub const EUI_LENGTH: usize = 8;
/// hex characters `get_dev_eui` writes
pub const DEV_EUI_HEX_LENGTH: usize = 2 * EUI_LENGTH;
pub const MAX_CHANNELS_MASK_LENGTH: usize = 16;
/// uplink payload room after id, port and options
pub const MAX_LR_PAYLOAD: usize = MAX_PAYLOAD_LENGTH - 3;
/// downlink payload room after port, rssi, snr and counter
pub const MAX_LR_RX_PAYLOAD: usize = MAX_PAYLOAD_LENGTH - 7;

/// Status byte `send_data` returns when the uplink never made it to a transmit status
pub const SEND_FAILED: u8 = 0xFF;

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum LrClass {
    A,
    B,
    C,
}

impl LrClass {
    pub fn from_char(c: char) -> Option<LrClass> {
        match c.to_ascii_uppercase() {
            'A' => Some(LrClass::A),
            'B' => Some(LrClass::B),
            'C' => Some(LrClass::C),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            LrClass::A => b'A',
            LrClass::B => b'B',
            LrClass::C => b'C',
        }
    }
}

/// Network settings pushed to the module on [Device::connect]. Unset fields keep whatever the
/// module has stored.
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct LrConfig {
    pub app_eui: Option<[u8; EUI_LENGTH]>,
    pub app_key: Option<[u8; APP_KEY_LENGTH]>,
    pub nwk_key: Option<[u8; APP_KEY_LENGTH]>,
    pub class: Option<LrClass>,
    pub region: Option<u8>,
}

impl LrConfig {
    pub fn with_app_eui(mut self, app_eui: &str) -> Result<Self, Error> {
        self.app_eui = Some(hex::decode_exact(app_eui)?);
        Ok(self)
    }

    pub fn with_app_key(mut self, app_key: &str) -> Result<Self, Error> {
        self.app_key = Some(hex::decode_exact(app_key)?);
        Ok(self)
    }

    pub fn with_nwk_key(mut self, nwk_key: &str) -> Result<Self, Error> {
        self.nwk_key = Some(hex::decode_exact(nwk_key)?);
        Ok(self)
    }

    pub fn with_class(mut self, class: LrClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_region(mut self, region: u8) -> Self {
        self.region = Some(region);
        self
    }
}

/// Uplink
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct LrPacket {
    pub port: u8,
    /// request a confirmed uplink
    pub ack: bool,
    pub payload: Vec<u8, MAX_LR_PAYLOAD>,
}

impl LrPacket {
    pub fn new(port: u8, ack: bool, payload: &[u8]) -> Result<Self, Error> {
        Ok(LrPacket {
            port,
            ack,
            payload: Vec::from_slice(payload).map_err(|_| Error::FrameTooLarge)?,
        })
    }
}

/// Downlink handed to [Callbacks::on_receive]
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct LrRxPacket {
    pub port: u8,
    pub rssi: i8,
    pub snr: i8,
    /// downlink frame counter
    pub counter: u32,
    /// only present in explicit RX frames (`0xD1`)
    pub data_rate: Option<u8>,
    /// only present in explicit RX frames (`0xD1`)
    pub frequency: Option<u32>,
    pub payload: Vec<u8, MAX_LR_RX_PAYLOAD>,
}

impl LrRxPacket {
    /// `0xD0`: `port | rssi | snr | counter[4] | payload`
    /// `0xD1`: `port | rssi | snr | data rate | counter[4] | frequency[4] | payload`
    pub fn parse(frame: &ApiFrame) -> Option<LrRxPacket> {
        match (frame.frame_type(), frame.data()) {
            (Ok(FrameType::LrRxPacket), [port, rssi, snr, c0, c1, c2, c3, payload @ ..]) => {
                Some(LrRxPacket {
                    port: *port,
                    rssi: *rssi as i8,
                    snr: *snr as i8,
                    counter: u32::from_be_bytes([*c0, *c1, *c2, *c3]),
                    data_rate: None,
                    frequency: None,
                    payload: Vec::from_slice(payload).ok()?,
                })
            }
            (
                Ok(FrameType::LrExplicitRxPacket),
                [port, rssi, snr, dr, c0, c1, c2, c3, f0, f1, f2, f3, payload @ ..],
            ) => Some(LrRxPacket {
                port: *port,
                rssi: *rssi as i8,
                snr: *snr as i8,
                counter: u32::from_be_bytes([*c0, *c1, *c2, *c3]),
                data_rate: Some(*dr),
                frequency: Some(u32::from_be_bytes([*f0, *f1, *f2, *f3])),
                payload: Vec::from_slice(payload).ok()?,
            }),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct Lr {
    config: LrConfig,
    tx_status_received: bool,
    delivery_status: u8,
    join_attempts: u32,
}

impl Family for Lr {
    type RxPacket = LrRxPacket;

    fn handle_rx_frame<C: Callbacks<LrRxPacket>>(&mut self, frame: &ApiFrame, callbacks: &mut C) {
        match LrRxPacket::parse(frame) {
            Some(packet) => {
                debug!(
                    "downlink port={=u8} rssi={=i8} len={=usize}",
                    packet.port,
                    packet.rssi,
                    packet.payload.len()
                );
                callbacks.on_receive(&packet);
            }
            None => debug!("unhandled frame type {=u8:x}", frame.raw_type()),
        }
    }

    fn handle_tx_status_frame<C: Callbacks<LrRxPacket>>(
        &mut self,
        frame: &ApiFrame,
        callbacks: &mut C,
    ) {
        if let Some(status) = TxStatus::parse(frame) {
            self.tx_status_received = true;
            self.delivery_status = status.delivery_status;
            callbacks.on_send(&status);
        }
    }
}

impl<T, C> XBee<T, C, Lr>
where
    T: Transport,
    C: Callbacks<LrRxPacket>,
{
    pub fn lr(transport: T, callbacks: C, config: Config) -> Self {
        XBee::new(transport, callbacks, Lr::default(), config)
    }

    pub fn lr_config(&self) -> &LrConfig {
        &self.family.config
    }

    /// Whether a transmit status arrived since the last uplink was sent
    pub fn tx_status_received(&self) -> bool {
        self.family.tx_status_received
    }

    /// Delivery status of the last transmit status, 0 means delivered
    pub fn delivery_status(&self) -> u8 {
        self.family.delivery_status
    }

    fn set_at(&mut self, command: AtCommand, parameter: &[u8]) -> Result<(), Error> {
        self.at_query(command, parameter).map(|_| ())
    }

    /// `AK`, 32 hex characters
    pub fn set_app_key(&mut self, app_key: &str) -> Result<(), Error> {
        let key: [u8; APP_KEY_LENGTH] = hex::decode_exact(app_key)?;
        self.set_at(AtCommand::Ak, &key)
    }

    /// `NK`, 32 hex characters
    pub fn set_nwk_key(&mut self, nwk_key: &str) -> Result<(), Error> {
        let key: [u8; APP_KEY_LENGTH] = hex::decode_exact(nwk_key)?;
        self.set_at(AtCommand::Nk, &key)
    }

    /// `AE`, 16 hex characters
    pub fn set_app_eui(&mut self, app_eui: &str) -> Result<(), Error> {
        let eui: [u8; EUI_LENGTH] = hex::decode_exact(app_eui)?;
        self.set_at(AtCommand::Ae, &eui)
    }

    /// `LC`, one of `A`, `B`, `C`
    pub fn set_class(&mut self, class: char) -> Result<(), Error> {
        let class = LrClass::from_char(class).ok_or(Error::InvalidArgument)?;
        self.set_at(AtCommand::Lc, &[class.as_byte()])
    }

    /// `J1`, milliseconds
    pub fn set_join_rx1_delay(&mut self, delay_ms: u32) -> Result<(), Error> {
        self.set_at(AtCommand::J1, &delay_ms.to_be_bytes())
    }

    /// `XF`, Hz
    pub fn set_rx2_frequency(&mut self, frequency: u32) -> Result<(), Error> {
        self.set_at(AtCommand::Xf, &frequency.to_be_bytes())
    }

    /// `CM`, an even number of hex characters
    pub fn set_channels_mask(&mut self, mask: &str) -> Result<(), Error> {
        let mut buf = [0u8; MAX_CHANNELS_MASK_LENGTH];
        let len = hex::decode(mask.as_bytes(), &mut buf)?;
        self.set_at(AtCommand::Cm, &buf[..len])
    }

    /// `LR`, region index as listed in the module manual
    pub fn set_region(&mut self, region: u8) -> Result<(), Error> {
        self.set_at(AtCommand::Lr, &[region])
    }

    /// Reads `DE` and renders it as uppercase hex into `buf`, which must hold at least
    /// [DEV_EUI_HEX_LENGTH] bytes.
    pub fn get_dev_eui<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str, Error> {
        if buf.len() < DEV_EUI_HEX_LENGTH {
            return Err(Error::BufferTooSmall);
        }
        let response = self.at_query(AtCommand::De, &[])?;
        if response.data.len() != EUI_LENGTH {
            warn!("DE answered with {=usize} bytes", response.data.len());
            return Err(Error::MalformedResponse);
        }
        hex::encode_upper(&response.data, buf).map_err(|_| Error::BufferTooSmall)
    }

    /// Pushes the stored [LrConfig] to the module, one acknowledged AT command per set field
    fn apply_lr_config(&mut self) -> Result<(), Error> {
        let config = self.family.config.clone();
        if let Some(region) = config.region {
            self.set_at(AtCommand::Lr, &[region])?;
        }
        if let Some(eui) = config.app_eui {
            self.set_at(AtCommand::Ae, &eui)?;
        }
        if let Some(key) = config.app_key {
            self.set_at(AtCommand::Ak, &key)?;
        }
        if let Some(key) = config.nwk_key {
            self.set_at(AtCommand::Nk, &key)?;
        }
        if let Some(class) = config.class {
            self.set_at(AtCommand::Lc, &[class.as_byte()])?;
        }
        Ok(())
    }

    /// Join request frame (`0x14`)
    fn send_join_request(&mut self) -> Result<(), Error> {
        let frame_id = self.frame_id;
        self.send_frame(&ApiFrame::new(FrameType::LrJoinRequest, &[frame_id, 0x00])?)?;
        self.next_frame_id();
        Ok(())
    }

    /// Polls `JS` once, sleeping after a miss only in blocking mode
    fn join_attempt(&mut self) -> bool {
        let joined = self.connected();
        if !joined && self.config.connect_mode == ConnectMode::Blocking {
            let delay = self.config.connect_retry_delay_ms;
            self.transport.delay(delay);
        }
        joined
    }

    fn send_uplink(&mut self, packet: &LrPacket) -> Result<u8, Error> {
        let frame_id = self.frame_id;
        let mut payload: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        payload
            .extend_from_slice(&[frame_id, packet.port, packet.ack as u8])
            .map_err(|_| Error::FrameTooLarge)?;
        payload
            .extend_from_slice(&packet.payload)
            .map_err(|_| Error::FrameTooLarge)?;
        self.family.tx_status_received = false;
        self.send_frame(&ApiFrame::new(FrameType::LrTxRequest, &payload)?)?;
        self.next_frame_id();

        let timeout = self.config.tx_status_timeout_ms;
        let frame = self.wait_for(timeout, |frame| match TxStatus::parse(frame) {
            Some(status) if status.frame_id == frame_id => Some(frame.clone()),
            _ => None,
        })?;
        self.family
            .handle_tx_status_frame(&frame, &mut self.callbacks);
        Ok(self.family.delivery_status)
    }
}

impl<T, C> Device for XBee<T, C, Lr>
where
    T: Transport,
    C: Callbacks<LrRxPacket>,
{
    type Config = LrConfig;
    type Packet = LrPacket;

    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), Error> {
        XBee::init(self, baud_rate, device)
    }

    /// Applies the stored [LrConfig], sends a join request and polls `JS`
    fn connect(&mut self) -> Result<(), Error> {
        let attempts = self.config.connect_attempts;
        match self.config.connect_mode {
            ConnectMode::Blocking => {
                info!("joining");
                self.apply_lr_config()?;
                self.send_join_request()?;
                for _attempt in 0..attempts {
                    debug!("join poll {=u32}", _attempt + 1);
                    if self.join_attempt() {
                        info!("joined");
                        return Ok(());
                    }
                }
                warn!("join failed after {=u32} polls", attempts);
                Err(Error::ConnectFailed)
            }
            ConnectMode::NonBlocking => {
                if self.family.join_attempts == 0 {
                    self.apply_lr_config()?;
                    self.send_join_request()?;
                }
                self.family.join_attempts += 1;
                if self.join_attempt() {
                    self.family.join_attempts = 0;
                    return Ok(());
                }
                if self.family.join_attempts >= attempts {
                    self.family.join_attempts = 0;
                    return Err(Error::ConnectFailed);
                }
                Err(Error::WouldBlock)
            }
        }
    }

    /// Leaves the network (`NR`)
    fn disconnect(&mut self) -> Result<(), Error> {
        self.send_at_command(AtCommand::Nr, &[]).map(|_| ())
    }

    /// Sends an uplink and waits for its transmit status. Returns the delivery status (0 is
    /// delivered) or [SEND_FAILED] when no status came back.
    fn send_data(&mut self, packet: &LrPacket) -> u8 {
        match self.send_uplink(packet) {
            Ok(status) => status,
            Err(_e) => {
                warn!("uplink failed: {}", _e);
                SEND_FAILED
            }
        }
    }

    fn process(&mut self) -> Result<(), Error> {
        XBee::process(self)
    }

    /// Software reset (`FR`)
    fn soft_reset(&mut self) -> Result<(), Error> {
        self.send_at_command(AtCommand::Fr, &[]).map(|_| ())
    }

    fn connected(&mut self) -> bool {
        match self.at_query(AtCommand::Js, &[]) {
            Ok(response) => response.data.first() == Some(&1),
            Err(_) => false,
        }
    }

    fn configure(&mut self, config: &LrConfig) -> Result<(), Error> {
        self.family.config = config.clone();
        Ok(())
    }

    fn handle_rx_frame(&mut self, frame: &ApiFrame) {
        self.family.handle_rx_frame(frame, &mut self.callbacks)
    }

    fn handle_tx_status_frame(&mut self, frame: &ApiFrame) {
        self.family.handle_tx_status_frame(frame, &mut self.callbacks)
    }
}
