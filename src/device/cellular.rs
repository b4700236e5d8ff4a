//! XBee 3 Cellular (LTE-M / NB-IoT)
//!
//! Network attach is polled through `AI` (0 = attached). Data goes out either as a one-shot
//! IPv4 transmit frame ([Device::send_data]) or through the extended socket frames, which keep
//! a small table of module assigned socket ids and their state.
use core::convert::TryFrom;
use heapless::{String, Vec};

use super::{Callbacks, Device, Error, Family, XBee};
use crate::api::{ApiFrame, FrameType, MAX_PAYLOAD_LENGTH};
use crate::at::AtCommand;
use crate::config::{Config, ConnectMode};
use crate::transport::Transport;

pub const MAX_SOCKETS: usize = 8;
pub const MAX_APN_LENGTH: usize = 100;
pub const MAX_SIM_PIN_LENGTH: usize = 8;
pub const MAX_CARRIER_LENGTH: usize = 16;
/// payload room in a `0x20` frame after id, protocol, port and address
pub const MAX_CELLULAR_PAYLOAD: usize = MAX_PAYLOAD_LENGTH - 8;
/// payload room behind the shortest receive header (`0xCD`: id, socket, status)
pub const MAX_SOCKET_PAYLOAD: usize = MAX_PAYLOAD_LENGTH - 3;

pub type CellularPayload = Vec<u8, MAX_CELLULAR_PAYLOAD>;
pub type SocketPayload = Vec<u8, MAX_SOCKET_PAYLOAD>;

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Protocol {
    Tcp,
    Udp,
}

impl From<Protocol> for u8 {
    fn from(p: Protocol) -> u8 {
        match p {
            Protocol::Tcp => 0x01,
            Protocol::Udp => 0x02,
        }
    }
}

impl TryFrom<u8> for Protocol {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Protocol::Tcp),
            0x02 => Ok(Protocol::Udp),
            _ => Err("unsupported protocol"),
        }
    }
}

/// APN, SIM PIN and carrier profile. Empty strings are left untouched on the module.
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct CellularConfig {
    pub apn: String<MAX_APN_LENGTH>,
    pub sim_pin: String<MAX_SIM_PIN_LENGTH>,
    pub carrier: String<MAX_CARRIER_LENGTH>,
}

impl CellularConfig {
    pub fn new(apn: &str, sim_pin: &str, carrier: &str) -> Result<Self, Error> {
        let mut config = CellularConfig::default();
        config.apn.push_str(apn).map_err(|_| Error::InvalidArgument)?;
        config
            .sim_pin
            .push_str(sim_pin)
            .map_err(|_| Error::InvalidArgument)?;
        config
            .carrier
            .push_str(carrier)
            .map_err(|_| Error::InvalidArgument)?;
        Ok(config)
    }
}

/// Outbound datagram for the `0x20` transmit frame
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct CellularPacket {
    pub protocol: Protocol,
    pub ip: [u8; 4],
    pub port: u16,
    pub payload: CellularPayload,
}

impl CellularPacket {
    pub fn new(protocol: Protocol, ip: [u8; 4], port: u16, payload: &[u8]) -> Result<Self, Error> {
        Ok(CellularPacket {
            protocol,
            ip,
            port,
            payload: Vec::from_slice(payload).map_err(|_| Error::FrameTooLarge)?,
        })
    }
}

/// Data handed to [Callbacks::on_receive]
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum CellularRx {
    /// `0xB0` RX IPv4
    Ip {
        protocol: u8,
        source: [u8; 4],
        source_port: u16,
        dest_port: u16,
        payload: SocketPayload,
    },
    /// `0xCD` data on a connected socket
    Socket { socket: u8, payload: SocketPayload },
    /// `0xCE` datagram on a bound socket
    SocketFrom {
        socket: u8,
        source: [u8; 4],
        source_port: u16,
        payload: SocketPayload,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum SocketState {
    Unopened,
    Created,
    Connected,
    Closed,
    Error,
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct Socket {
    pub id: u8,
    pub protocol: Protocol,
    pub state: SocketState,
}

pub enum SocketAddress<'a> {
    Ipv4([u8; 4]),
    Hostname(&'a str),
}

#[derive(Default)]
pub struct Cellular {
    config: CellularConfig,
    sockets: Vec<Socket, MAX_SOCKETS>,
    /// attempts spent so far by a non-blocking connect
    attach_attempts: u32,
}

impl Cellular {
    fn socket(&self, id: u8) -> Option<&Socket> {
        self.sockets.iter().find(|s| s.id == id)
    }

    fn set_state(&mut self, id: u8, state: SocketState) {
        if let Some(s) = self.sockets.iter_mut().find(|s| s.id == id) {
            debug!("socket {=u8} -> {}", id, state);
            s.state = state;
        }
    }

    fn has_free_slot(&self) -> bool {
        !self.sockets.is_full()
            || self
                .sockets
                .iter()
                .any(|s| matches!(s.state, SocketState::Closed | SocketState::Error))
    }

    fn insert(&mut self, socket: Socket) -> Result<(), Error> {
        let reusable = self.sockets.iter_mut().find(|s| {
            s.id == socket.id || matches!(s.state, SocketState::Closed | SocketState::Error)
        });
        match reusable {
            Some(slot) => *slot = socket,
            None => self
                .sockets
                .push(socket)
                .map_err(|_| Error::SocketTableFull)?,
        }
        Ok(())
    }
}

fn split_payload(data: &[u8]) -> SocketPayload {
    // every receive header is at least 3 bytes so this never truncates
    let len = data.len().min(MAX_SOCKET_PAYLOAD);
    Vec::from_slice(&data[..len]).unwrap_or_default()
}

impl Family for Cellular {
    type RxPacket = CellularRx;

    fn handle_rx_frame<C: Callbacks<CellularRx>>(&mut self, frame: &ApiFrame, callbacks: &mut C) {
        match (frame.frame_type(), frame.data()) {
            (
                Ok(FrameType::CellularRxIpv4),
                [a, b, c, d, dp0, dp1, sp0, sp1, protocol, _status, payload @ ..],
            ) => {
                let packet = CellularRx::Ip {
                    protocol: *protocol,
                    source: [*a, *b, *c, *d],
                    source_port: u16::from_be_bytes([*sp0, *sp1]),
                    dest_port: u16::from_be_bytes([*dp0, *dp1]),
                    payload: split_payload(payload),
                };
                callbacks.on_receive(&packet);
            }
            (Ok(FrameType::SocketReceive), [_id, socket, _status, payload @ ..]) => {
                trace!("socket {=u8} rx {=usize} bytes", *socket, payload.len());
                let packet = CellularRx::Socket {
                    socket: *socket,
                    payload: split_payload(payload),
                };
                callbacks.on_receive(&packet);
            }
            (
                Ok(FrameType::SocketReceiveFrom),
                [_id, socket, a, b, c, d, p0, p1, _status, payload @ ..],
            ) => {
                let packet = CellularRx::SocketFrom {
                    socket: *socket,
                    source: [*a, *b, *c, *d],
                    source_port: u16::from_be_bytes([*p0, *p1]),
                    payload: split_payload(payload),
                };
                callbacks.on_receive(&packet);
            }
            (Ok(FrameType::SocketStatus), [socket, status, ..]) => {
                info!("socket {=u8} status {=u8:x}", *socket, *status);
                if *status == 0 {
                    self.set_state(*socket, SocketState::Connected);
                } else {
                    self.set_state(*socket, SocketState::Closed);
                }
            }
            // a connect or close answer that arrived after its wait gave up
            (Ok(FrameType::SocketConnectResponse), [_id, socket, status, ..]) => {
                if *status == 0 {
                    self.set_state(*socket, SocketState::Connected);
                } else {
                    self.set_state(*socket, SocketState::Error);
                }
            }
            (Ok(FrameType::SocketCloseResponse), [_id, socket, ..]) => {
                self.set_state(*socket, SocketState::Closed);
            }
            (Ok(_t), _) => debug!("unhandled frame {} ({=usize} bytes)", _t, frame.len()),
            (Err(_raw), _) => warn!("unknown frame type {=u8:x}", _raw),
        }
    }
}

impl<T, C> XBee<T, C, Cellular>
where
    T: Transport,
    C: Callbacks<CellularRx>,
{
    pub fn cellular(transport: T, callbacks: C, config: Config) -> Self {
        XBee::new(transport, callbacks, Cellular::default(), config)
    }

    pub fn cellular_config(&self) -> &CellularConfig {
        &self.family.config
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.family.sockets
    }

    /// State of a socket, [SocketState::Unopened] for ids the driver does not know
    pub fn socket_state(&self, socket: u8) -> SocketState {
        self.family
            .socket(socket)
            .map(|s| s.state)
            .unwrap_or(SocketState::Unopened)
    }

    fn require_socket(&self, socket: u8, allowed: &[SocketState]) -> Result<Socket, Error> {
        let s = *self
            .family
            .socket(socket)
            .ok_or(Error::UnknownSocket(socket))?;
        if allowed.contains(&s.state) {
            Ok(s)
        } else {
            warn!("socket {=u8} is {}", socket, s.state);
            Err(Error::InvalidSocketState)
        }
    }

    /// Sends `frame id | body` as `request` and waits for the `response` frame carrying the same
    /// id.
    fn exchange(
        &mut self,
        request: FrameType,
        body: &[u8],
        response: FrameType,
        timeout_ms: u32,
    ) -> Result<ApiFrame, Error> {
        let frame_id = self.frame_id;
        let mut payload: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        payload.push(frame_id).map_err(|_| Error::FrameTooLarge)?;
        payload
            .extend_from_slice(body)
            .map_err(|_| Error::FrameTooLarge)?;
        self.send_frame(&ApiFrame::new(request, &payload)?)?;
        self.next_frame_id();
        self.wait_for(timeout_ms, |frame| {
            if frame.frame_type() == Ok(response) && frame.frame_id() == Some(frame_id) {
                Some(frame.clone())
            } else {
                None
            }
        })
    }

    fn wait_tx_status(&mut self, request: FrameType, body: &[u8]) -> Result<(), Error> {
        let timeout = self.config.tx_status_timeout_ms;
        let status = self.exchange(request, body, FrameType::TransmitStatus, timeout)?;
        match status.data() {
            [_, 0, ..] => Ok(()),
            [_, code, ..] => {
                warn!("transmit failed, status {=u8:x}", *code);
                Err(Error::DeliveryFailed(*code))
            }
            _ => Err(Error::DeliveryFailed(0xFF)),
        }
    }

    /// Fires the configured `PN`, `AN` and `CP` without waiting for answers
    fn apply_cellular_config(&mut self) -> Result<(), Error> {
        let config = self.family.config.clone();
        if !config.sim_pin.is_empty() {
            self.send_at_command(AtCommand::Pn, config.sim_pin.as_bytes())?;
        }
        if !config.apn.is_empty() {
            self.send_at_command(AtCommand::An, config.apn.as_bytes())?;
        }
        if !config.carrier.is_empty() {
            self.send_at_command(AtCommand::Cp, config.carrier.as_bytes())?;
        }
        Ok(())
    }

    /// Opens a socket (`0x40`) and returns the id the module assigned to it
    pub fn socket_create(&mut self, protocol: Protocol) -> Result<u8, Error> {
        if !self.family.has_free_slot() {
            return Err(Error::SocketTableFull);
        }
        let timeout = self.config.socket_timeout_ms;
        let response = self.exchange(
            FrameType::SocketCreate,
            &[protocol.into()],
            FrameType::SocketCreateResponse,
            timeout,
        )?;
        match response.data() {
            [_, id, 0, ..] => {
                info!("socket {=u8} created", *id);
                self.family.insert(Socket {
                    id: *id,
                    protocol,
                    state: SocketState::Created,
                })?;
                Ok(*id)
            }
            [_, _, status, ..] => Err(Error::SocketFailed(*status)),
            _ => Err(Error::SocketFailed(0xFF)),
        }
    }

    /// Connects a created socket (`0x42`) to an IPv4 address or a hostname
    pub fn socket_connect(
        &mut self,
        socket: u8,
        address: SocketAddress<'_>,
        port: u16,
    ) -> Result<(), Error> {
        self.require_socket(socket, &[SocketState::Created])?;
        let mut body: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        let [p0, p1] = port.to_be_bytes();
        let too_large = |_| Error::FrameTooLarge;
        match address {
            SocketAddress::Ipv4(ip) => {
                body.extend_from_slice(&[socket, p0, p1, 0x00])
                    .map_err(too_large)?;
                body.extend_from_slice(&ip).map_err(too_large)?;
            }
            SocketAddress::Hostname(host) => {
                if host.is_empty() {
                    return Err(Error::InvalidArgument);
                }
                body.extend_from_slice(&[socket, p0, p1, 0x01])
                    .map_err(too_large)?;
                body.extend_from_slice(host.as_bytes()).map_err(too_large)?;
            }
        }
        let timeout = self.config.socket_timeout_ms;
        let response = self.exchange(
            FrameType::SocketConnect,
            &body,
            FrameType::SocketConnectResponse,
            timeout,
        )?;
        match response.data() {
            [_, _, 0, ..] => {
                self.family.set_state(socket, SocketState::Connected);
                Ok(())
            }
            [_, _, status, ..] => {
                self.family.set_state(socket, SocketState::Error);
                Err(Error::SocketFailed(*status))
            }
            _ => Err(Error::SocketFailed(0xFF)),
        }
    }

    /// Sends on a connected socket (`0x44`) and waits for the transmit status
    pub fn socket_send(&mut self, socket: u8, payload: &[u8]) -> Result<(), Error> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.require_socket(socket, &[SocketState::Connected])?;
        let mut body: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        body.extend_from_slice(&[socket, 0x00])
            .map_err(|_| Error::FrameTooLarge)?;
        body.extend_from_slice(payload)
            .map_err(|_| Error::FrameTooLarge)?;
        self.wait_tx_status(FrameType::SocketSend, &body)
    }

    /// Sends a datagram to an explicit destination (`0x45`), for UDP sockets
    pub fn socket_send_to(
        &mut self,
        socket: u8,
        ip: [u8; 4],
        port: u16,
        payload: &[u8],
    ) -> Result<(), Error> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.require_socket(socket, &[SocketState::Created, SocketState::Connected])?;
        let mut body: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        let too_large = |_| Error::FrameTooLarge;
        body.push(socket).map_err(|_| Error::FrameTooLarge)?;
        body.extend_from_slice(&ip).map_err(too_large)?;
        body.extend_from_slice(&port.to_be_bytes()).map_err(too_large)?;
        body.push(0x00).map_err(|_| Error::FrameTooLarge)?;
        body.extend_from_slice(payload).map_err(too_large)?;
        self.wait_tx_status(FrameType::SocketSendTo, &body)
    }

    /// Binds a created socket to a local port (`0x46`) to receive datagrams
    pub fn socket_bind(&mut self, socket: u8, port: u16) -> Result<(), Error> {
        self.require_socket(socket, &[SocketState::Created])?;
        let [p0, p1] = port.to_be_bytes();
        let timeout = self.config.socket_timeout_ms;
        let response = self.exchange(
            FrameType::SocketBind,
            &[socket, p0, p1],
            FrameType::SocketBindResponse,
            timeout,
        )?;
        match response.data() {
            [_, _, 0, ..] => Ok(()),
            [_, _, status, ..] => Err(Error::SocketFailed(*status)),
            _ => Err(Error::SocketFailed(0xFF)),
        }
    }

    /// Sets a socket option (`0x41`)
    pub fn socket_set_option(&mut self, socket: u8, option: u8, value: &[u8]) -> Result<(), Error> {
        self.require_socket(socket, &[SocketState::Created, SocketState::Connected])?;
        let mut body: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
        body.extend_from_slice(&[socket, option])
            .map_err(|_| Error::FrameTooLarge)?;
        body.extend_from_slice(value)
            .map_err(|_| Error::FrameTooLarge)?;
        let timeout = self.config.socket_timeout_ms;
        let response = self.exchange(
            FrameType::SocketOption,
            &body,
            FrameType::SocketOptionResponse,
            timeout,
        )?;
        match response.data() {
            [_, _, _, 0, ..] => Ok(()),
            [_, _, _, status, ..] => Err(Error::SocketFailed(*status)),
            _ => Err(Error::SocketFailed(0xFF)),
        }
    }

    /// Closes a socket (`0x43`). Any close response frees the slot for reuse, whatever its
    /// status. Without a response the socket keeps its state.
    pub fn socket_close(&mut self, socket: u8) -> Result<(), Error> {
        self.require_socket(
            socket,
            &[
                SocketState::Created,
                SocketState::Connected,
                SocketState::Error,
            ],
        )?;
        let timeout = self.config.socket_timeout_ms;
        let response = self.exchange(
            FrameType::SocketClose,
            &[socket],
            FrameType::SocketCloseResponse,
            timeout,
        )?;
        self.family.set_state(socket, SocketState::Closed);
        match response.data() {
            [_, _, 0, ..] => Ok(()),
            [_, _, status, ..] => Err(Error::SocketFailed(*status)),
            _ => Err(Error::SocketFailed(0xFF)),
        }
    }

    /// Polls `AI` once. Only a blocking connect sleeps after a miss, a non-blocking caller
    /// paces the attempts itself.
    fn attach_attempt(&mut self) -> bool {
        let attached = self.connected();
        if !attached && self.config.connect_mode == ConnectMode::Blocking {
            let delay = self.config.connect_retry_delay_ms;
            self.transport.delay(delay);
        }
        attached
    }
}

/// `frame id | protocol | port | ipv4 | payload`
fn tx_ipv4_frame(frame_id: u8, packet: &CellularPacket) -> Result<ApiFrame, Error> {
    let too_large = |_| Error::FrameTooLarge;
    let mut payload: Vec<u8, MAX_PAYLOAD_LENGTH> = Vec::new();
    payload
        .extend_from_slice(&[frame_id, packet.protocol.into()])
        .map_err(too_large)?;
    payload
        .extend_from_slice(&packet.port.to_be_bytes())
        .map_err(too_large)?;
    payload.extend_from_slice(&packet.ip).map_err(too_large)?;
    payload
        .extend_from_slice(&packet.payload)
        .map_err(too_large)?;
    Ok(ApiFrame::new(FrameType::CellularTxIpv4, &payload)?)
}

impl<T, C> Device for XBee<T, C, Cellular>
where
    T: Transport,
    C: Callbacks<CellularRx>,
{
    type Config = CellularConfig;
    type Packet = CellularPacket;

    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), Error> {
        XBee::init(self, baud_rate, device)
    }

    fn connect(&mut self) -> Result<(), Error> {
        let attempts = self.config.connect_attempts;
        match self.config.connect_mode {
            ConnectMode::Blocking => {
                info!("applying cellular config and attaching");
                self.apply_cellular_config()?;
                for _attempt in 0..attempts {
                    debug!("attach attempt {=u32}", _attempt + 1);
                    if self.attach_attempt() {
                        info!("attached");
                        return Ok(());
                    }
                }
                warn!("network attach failed after {=u32} attempts", attempts);
                Err(Error::ConnectFailed)
            }
            ConnectMode::NonBlocking => {
                if self.family.attach_attempts == 0 {
                    self.apply_cellular_config()?;
                }
                self.family.attach_attempts += 1;
                if self.attach_attempt() {
                    self.family.attach_attempts = 0;
                    return Ok(());
                }
                if self.family.attach_attempts >= attempts {
                    self.family.attach_attempts = 0;
                    return Err(Error::ConnectFailed);
                }
                Err(Error::WouldBlock)
            }
        }
    }

    /// Shuts the modem down (`SD`)
    fn disconnect(&mut self) -> Result<(), Error> {
        self.send_at_command(AtCommand::Sd, &[]).map(|_| ())
    }

    /// `0x00` when the frame went out, `0xFF` otherwise. Delivery is reported later through
    /// [Callbacks::on_send].
    fn send_data(&mut self, packet: &CellularPacket) -> u8 {
        let sent = tx_ipv4_frame(self.frame_id, packet).and_then(|frame| self.send_frame(&frame));
        match sent {
            Ok(()) => {
                self.next_frame_id();
                0x00
            }
            Err(_e) => {
                warn!("send_data failed: {}", _e);
                0xFF
            }
        }
    }

    fn process(&mut self) -> Result<(), Error> {
        XBee::process(self)
    }

    /// Same as [Device::disconnect], the module has no separate soft reset
    fn soft_reset(&mut self) -> Result<(), Error> {
        self.send_at_command(AtCommand::Sd, &[]).map(|_| ())
    }

    fn connected(&mut self) -> bool {
        match self.at_query(AtCommand::Ai, &[]) {
            Ok(response) => response.data.first() == Some(&0),
            Err(_) => false,
        }
    }

    fn configure(&mut self, config: &CellularConfig) -> Result<(), Error> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TxStatus;
    use crate::mock::{at_response, MockTransport};
    use crate::transport::TransportError;

    #[derive(Default)]
    struct Inbox {
        packets: std::vec::Vec<CellularRx>,
        sent: std::vec::Vec<TxStatus>,
    }

    impl Callbacks<CellularRx> for Inbox {
        fn on_receive(&mut self, packet: &CellularRx) {
            self.packets.push(packet.clone());
        }

        fn on_send(&mut self, status: &TxStatus) {
            self.sent.push(*status);
        }
    }

    fn cellular(mock: &mut MockTransport) -> XBee<&mut MockTransport, Inbox, Cellular> {
        XBee::cellular(mock, Inbox::default(), Config::default())
    }

    /// Replies to socket requests the way a module with a free socket 0x03 would
    fn socket_responder(mock: &mut MockTransport) {
        mock.respond_to(FrameType::SocketCreate, |req| {
            ApiFrame::new(FrameType::SocketCreateResponse, &[req.data()[0], 0x03, 0x00]).ok()
        });
        mock.respond_to(FrameType::SocketConnect, |req| {
            ApiFrame::new(
                FrameType::SocketConnectResponse,
                &[req.data()[0], req.data()[1], 0x00],
            )
            .ok()
        });
        mock.respond_to(FrameType::SocketSend, |req| {
            ApiFrame::new(FrameType::TransmitStatus, &[req.data()[0], 0x00]).ok()
        });
        mock.respond_to(FrameType::SocketClose, |req| {
            ApiFrame::new(
                FrameType::SocketCloseResponse,
                &[req.data()[0], req.data()[1], 0x00],
            )
            .ok()
        });
    }

    #[test]
    fn test_connect_gives_up_after_attempt_budget() {
        let mut mock = MockTransport::new();
        // registered but never attached
        mock.respond_to_at(*b"AI", 0, &[0x23]);
        let mut dev = cellular(&mut mock);
        dev.configure(&CellularConfig::new("broadband", "", "").unwrap())
            .unwrap();
        assert_eq!(dev.connect(), Err(Error::ConnectFailed));
        drop(dev);

        assert_eq!(mock.delays, std::vec![1000; 20]);
        let sent = mock.sent_frames();
        // AN once, then one AI per attempt
        assert_eq!(sent.len(), 21);
        assert_eq!(&sent[0].data()[1..], b"ANbroadband");
        assert!(sent[1..].iter().all(|f| &f.data()[1..3] == b"AI"));
    }

    #[test]
    fn test_connect_applies_only_non_empty_settings() {
        let mut mock = MockTransport::new();
        mock.respond_to_at(*b"AI", 0, &[0x00]);
        let mut dev = cellular(&mut mock);
        dev.configure(&CellularConfig::new("hologram", "1234", "").unwrap())
            .unwrap();
        assert_eq!(dev.connect(), Ok(()));
        drop(dev);

        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 3);
        assert_eq!(&sent[0].data()[1..], b"PN1234");
        assert_eq!(&sent[1].data()[1..], b"ANhologram");
        assert_eq!(&sent[2].data()[1..], b"AI");
        assert!(mock.delays.is_empty());
    }

    #[test]
    fn test_non_blocking_connect_steps() {
        let mut mock = MockTransport::new();
        mock.respond_to_at(*b"AI", 0, &[0x23]);
        let mut dev = cellular(&mut mock);
        dev.set_config(Config {
            connect_mode: ConnectMode::NonBlocking,
            connect_attempts: 3,
            ..Config::default()
        });
        assert_eq!(dev.connect(), Err(Error::WouldBlock));
        assert_eq!(dev.connect(), Err(Error::WouldBlock));
        assert_eq!(dev.connect(), Err(Error::ConnectFailed));
        drop(dev);
        assert!(mock.delays.is_empty());
        // AN is not configured, so only the three AI polls went out
        assert_eq!(mock.sent_frames().len(), 3);
    }

    #[test]
    fn test_connected_is_false_on_at_error() {
        let mut mock = MockTransport::new();
        mock.respond_to_at(*b"AI", 1, &[]);
        let mut dev = cellular(&mut mock);
        assert!(!dev.connected());
    }

    #[test]
    fn test_config_rejects_oversized_strings() {
        let long = "x".repeat(MAX_APN_LENGTH + 1);
        assert_eq!(
            CellularConfig::new(&long, "", "").err(),
            Some(Error::InvalidArgument)
        );
        assert_eq!(
            CellularConfig::new("apn", "123456789", "").err(),
            Some(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_configure_does_no_io() {
        let mut mock = MockTransport::new();
        let mut dev = cellular(&mut mock);
        let cfg = CellularConfig::new("broadband", "", "AT&T").unwrap();
        dev.configure(&cfg).unwrap();
        assert_eq!(dev.cellular_config(), &cfg);
        drop(dev);
        assert_eq!(mock.write_calls, 0);
    }

    #[test]
    fn test_send_data_frame_layout() {
        let mut mock = MockTransport::new();
        let mut dev = cellular(&mut mock);
        let packet = CellularPacket::new(Protocol::Udp, [52, 43, 121, 77], 10001, b"hi").unwrap();
        assert_eq!(dev.send_data(&packet), 0x00);
        assert_eq!(dev.frame_id(), 2);
        drop(dev);

        let sent = mock.sent_frames();
        assert_eq!(sent[0].frame_type(), Ok(FrameType::CellularTxIpv4));
        assert_eq!(
            sent[0].data(),
            &[0x01, 0x02, 0x27, 0x11, 52, 43, 121, 77, b'h', b'i']
        );
    }

    #[test]
    fn test_send_data_reports_uart_failure() {
        let mut mock = MockTransport::new();
        mock.write_error = Some(TransportError::Unknown);
        let mut dev = cellular(&mut mock);
        let packet = CellularPacket::new(Protocol::Tcp, [1, 2, 3, 4], 80, b"x").unwrap();
        assert_eq!(dev.send_data(&packet), 0xFF);
    }

    #[test]
    fn test_packet_payload_is_bounded() {
        let payload = [0u8; MAX_CELLULAR_PAYLOAD + 1];
        assert_eq!(
            CellularPacket::new(Protocol::Tcp, [1, 2, 3, 4], 80, &payload).err(),
            Some(Error::FrameTooLarge)
        );
    }

    #[test]
    fn test_disconnect_and_soft_reset_send_sd() {
        let mut mock = MockTransport::new();
        let mut dev = cellular(&mut mock);
        dev.disconnect().unwrap();
        dev.soft_reset().unwrap();
        assert_eq!(dev.hard_reset(), Ok(()));
        drop(dev);
        let sent = mock.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data(), &[0x01, b'S', b'D']);
        assert_eq!(sent[1].data(), &[0x02, b'S', b'D']);
    }

    #[test]
    fn test_socket_lifecycle() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        let mut dev = cellular(&mut mock);

        assert_eq!(dev.socket_state(0x03), SocketState::Unopened);
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        assert_eq!(sock, 0x03);
        assert_eq!(dev.socket_state(sock), SocketState::Created);

        dev.socket_connect(sock, SocketAddress::Hostname("numbersapi.com"), 80)
            .unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Connected);

        dev.socket_send(sock, b"GET / HTTP/1.1\r\n\r\n").unwrap();
        dev.socket_close(sock).unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Closed);
        drop(dev);

        let sent = mock.sent_frames();
        assert_eq!(sent[0].data(), &[0x01, 0x01]);
        assert_eq!(&sent[1].data()[..5], &[0x02, 0x03, 0x00, 80, 0x01]);
        assert_eq!(&sent[1].data()[5..], b"numbersapi.com");
        assert_eq!(&sent[2].data()[..3], &[0x03, 0x03, 0x00]);
        assert_eq!(sent[3].data(), &[0x04, 0x03]);
    }

    #[test]
    fn test_socket_send_requires_connected_socket() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        let mut dev = cellular(&mut mock);

        assert_eq!(dev.socket_send(0x03, b"data"), Err(Error::UnknownSocket(0x03)));
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        let writes = dev.transport().write_calls;
        assert_eq!(dev.socket_send(sock, b"data"), Err(Error::InvalidSocketState));
        assert_eq!(dev.socket_send(sock, b""), Err(Error::InvalidArgument));
        assert_eq!(dev.transport().write_calls, writes);
    }

    #[test]
    fn test_socket_connect_ipv4_failure_marks_error() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        mock.respond_to(FrameType::SocketConnect, |req| {
            ApiFrame::new(
                FrameType::SocketConnectResponse,
                &[req.data()[0], req.data()[1], 0x02],
            )
            .ok()
        });
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Udp).unwrap();
        assert_eq!(
            dev.socket_connect(sock, SocketAddress::Ipv4([8, 8, 8, 8]), 53),
            Err(Error::SocketFailed(0x02))
        );
        assert_eq!(dev.socket_state(sock), SocketState::Error);
        drop(dev);
        let sent = mock.sent_frames();
        assert_eq!(sent[1].data(), &[0x02, 0x03, 0x00, 53, 0x00, 8, 8, 8, 8]);
    }

    #[test]
    fn test_socket_create_times_out() {
        let mut mock = MockTransport::new();
        let mut dev = cellular(&mut mock);
        dev.set_config(Config {
            socket_timeout_ms: 20,
            ..Config::default()
        });
        assert_eq!(dev.socket_create(Protocol::Tcp), Err(Error::Timeout));
        assert!(dev.sockets().is_empty());
    }

    #[test]
    fn test_udp_bind_send_to_and_receive_from() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        mock.respond_to(FrameType::SocketBind, |req| {
            ApiFrame::new(
                FrameType::SocketBindResponse,
                &[req.data()[0], req.data()[1], 0x00],
            )
            .ok()
        });
        mock.respond_to(FrameType::SocketSendTo, |req| {
            ApiFrame::new(FrameType::TransmitStatus, &[req.data()[0], 0x00]).ok()
        });
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Udp).unwrap();
        dev.socket_bind(sock, 0x1234).unwrap();
        dev.socket_send_to(sock, [52, 43, 121, 77], 10001, b"echo")
            .unwrap();

        dev.transport().inject(
            &ApiFrame::new(
                FrameType::SocketReceiveFrom,
                &[0x00, sock, 52, 43, 121, 77, 0x27, 0x11, 0x00, b'e', b'c', b'h', b'o'],
            )
            .unwrap(),
        );
        dev.process().unwrap();
        let (mock, inbox) = dev.release();

        let sent = mock.sent_frames();
        assert_eq!(sent[1].data(), &[0x02, 0x03, 0x12, 0x34]);
        assert_eq!(
            sent[2].data(),
            &[0x03, 0x03, 52, 43, 121, 77, 0x27, 0x11, 0x00, b'e', b'c', b'h', b'o']
        );
        assert_eq!(inbox.packets.len(), 1);
        match &inbox.packets[0] {
            CellularRx::SocketFrom {
                socket,
                source,
                source_port,
                payload,
            } => {
                assert_eq!(*socket, 0x03);
                assert_eq!(*source, [52, 43, 121, 77]);
                assert_eq!(*source_port, 10001);
                assert_eq!(&payload[..], b"echo");
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_socket_set_option() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        mock.respond_to(FrameType::SocketOption, |req| {
            let d = req.data();
            ApiFrame::new(FrameType::SocketOptionResponse, &[d[0], d[1], d[2], 0x00]).ok()
        });
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        dev.socket_set_option(sock, 0x00, &[0x00, 0x01]).unwrap();
        drop(dev);
        assert_eq!(mock.sent_frames()[1].data(), &[0x02, 0x03, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_socket_send_delivery_failure() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        mock.respond_to(FrameType::SocketSend, |req| {
            ApiFrame::new(FrameType::TransmitStatus, &[req.data()[0], 0x32]).ok()
        });
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        dev.socket_connect(sock, SocketAddress::Ipv4([1, 1, 1, 1]), 443)
            .unwrap();
        assert_eq!(dev.socket_send(sock, b"x"), Err(Error::DeliveryFailed(0x32)));
    }

    #[test]
    fn test_socket_status_closes_socket() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        dev.socket_connect(sock, SocketAddress::Ipv4([1, 1, 1, 1]), 80)
            .unwrap();
        dev.transport()
            .inject(&ApiFrame::new(FrameType::SocketStatus, &[sock, 0x0C]).unwrap());
        dev.process().unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Closed);
        assert_eq!(dev.socket_send(sock, b"x"), Err(Error::InvalidSocketState));
    }

    #[test]
    fn test_socket_close_timeout_keeps_state() {
        let mut mock = MockTransport::new();
        mock.respond_to(FrameType::SocketCreate, |req| {
            ApiFrame::new(FrameType::SocketCreateResponse, &[req.data()[0], 0x03, 0x00]).ok()
        });
        let mut dev = cellular(&mut mock);
        dev.set_config(Config {
            socket_timeout_ms: 20,
            ..Config::default()
        });
        let sock = dev.socket_create(Protocol::Udp).unwrap();
        assert_eq!(dev.socket_close(sock), Err(Error::Timeout));
        assert_eq!(dev.socket_state(sock), SocketState::Created);

        // the module still owns the socket, the slot must not be handed out again
        dev.transport().inject(
            &ApiFrame::new(FrameType::SocketCloseResponse, &[0x02, sock, 0x00]).unwrap(),
        );
        dev.process().unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Closed);
    }

    #[test]
    fn test_socket_close_write_failure_keeps_state() {
        let mut mock = MockTransport::new();
        socket_responder(&mut mock);
        let mut dev = cellular(&mut mock);
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        dev.transport().write_error = Some(TransportError::Unknown);
        assert_eq!(
            dev.socket_close(sock),
            Err(Error::Uart(TransportError::Unknown))
        );
        assert_eq!(dev.socket_state(sock), SocketState::Created);
    }

    #[test]
    fn test_late_socket_responses_update_table() {
        let mut mock = MockTransport::new();
        mock.respond_to(FrameType::SocketCreate, |req| {
            ApiFrame::new(FrameType::SocketCreateResponse, &[req.data()[0], 0x05, 0x00]).ok()
        });
        let mut dev = cellular(&mut mock);
        dev.set_config(Config {
            socket_timeout_ms: 20,
            ..Config::default()
        });
        let sock = dev.socket_create(Protocol::Tcp).unwrap();
        // nobody answers the connect in time
        assert_eq!(
            dev.socket_connect(sock, SocketAddress::Hostname("example.com"), 443),
            Err(Error::Timeout)
        );
        assert_eq!(dev.socket_state(sock), SocketState::Created);

        dev.transport().inject(
            &ApiFrame::new(FrameType::SocketConnectResponse, &[0x02, sock, 0x00]).unwrap(),
        );
        dev.process().unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Connected);

        dev.transport().inject(
            &ApiFrame::new(FrameType::SocketCloseResponse, &[0x03, sock, 0x00]).unwrap(),
        );
        dev.process().unwrap();
        assert_eq!(dev.socket_state(sock), SocketState::Closed);
    }

    #[test]
    fn test_socket_table_full_and_slot_reuse() {
        let mut mock = MockTransport::new();
        let mut next = 0u8;
        mock.respond_to(FrameType::SocketCreate, move |req| {
            next += 1;
            ApiFrame::new(FrameType::SocketCreateResponse, &[req.data()[0], next, 0x00]).ok()
        });
        mock.respond_to(FrameType::SocketClose, |req| {
            ApiFrame::new(
                FrameType::SocketCloseResponse,
                &[req.data()[0], req.data()[1], 0x00],
            )
            .ok()
        });
        let mut dev = cellular(&mut mock);
        for _ in 0..MAX_SOCKETS {
            dev.socket_create(Protocol::Udp).unwrap();
        }
        let writes = dev.transport().write_calls;
        assert_eq!(dev.socket_create(Protocol::Udp), Err(Error::SocketTableFull));
        assert_eq!(dev.transport().write_calls, writes);

        dev.socket_close(1).unwrap();
        let id = dev.socket_create(Protocol::Udp).unwrap();
        assert_eq!(id, MAX_SOCKETS as u8 + 1);
        assert_eq!(dev.sockets().len(), MAX_SOCKETS);
    }

    #[test]
    fn test_rx_ipv4_and_socket_receive_reach_callback() {
        let mut mock = MockTransport::new();
        mock.inject(
            &ApiFrame::new(
                FrameType::CellularRxIpv4,
                &[10, 0, 0, 1, 0x00, 0x50, 0x1F, 0x90, 0x01, 0x00, b'o', b'k'],
            )
            .unwrap(),
        );
        mock.inject(
            &ApiFrame::new(FrameType::SocketReceive, &[0x00, 0x02, 0x00, b'h', b'i']).unwrap(),
        );
        mock.inject(&ApiFrame::new(FrameType::TransmitStatus, &[0x09, 0x00]).unwrap());
        let mut dev = cellular(&mut mock);
        dev.process().unwrap();
        dev.process().unwrap();
        dev.process().unwrap();
        let (_, inbox) = dev.release();

        assert_eq!(inbox.packets.len(), 2);
        match &inbox.packets[0] {
            CellularRx::Ip {
                source,
                dest_port,
                source_port,
                payload,
                ..
            } => {
                assert_eq!(*source, [10, 0, 0, 1]);
                assert_eq!(*dest_port, 80);
                assert_eq!(*source_port, 8080);
                assert_eq!(&payload[..], b"ok");
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert!(matches!(
            &inbox.packets[1],
            CellularRx::Socket { socket: 0x02, payload } if &payload[..] == b"hi"
        ));
        assert_eq!(inbox.sent.len(), 1);
    }

    #[test]
    fn test_stale_connected_response_not_confused() {
        let mut mock = MockTransport::new();
        // answer for an earlier request id, must not count as our attach indicator
        mock.inject(&at_response(0x42, *b"AI", 0, &[0x00]));
        mock.respond_to_at(*b"AI", 0, &[0x23]);
        let mut dev = cellular(&mut mock);
        assert!(!dev.connected());
    }
}
