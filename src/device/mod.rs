//! The driver: one frame engine ([XBee]) shared by every module family.
//!
//! [XBee] owns the transport, the application callbacks, the frame id counter and the receive
//! state machine. The family type parameter carries the family specific state (socket table,
//! LoRaWAN join flags, ...) and decides what an inbound data frame means. Family specific
//! operations live in [cellular] and [lr] as inherent impls on `XBee<T, C, Family>` plus an
//! implementation of the uniform [Device] trait.
use core::convert::{TryFrom, TryInto};

use crate::api::{ApiFrame, FrameReader, FrameType, ReceiveError, MAX_FRAME_DATA_SIZE};
use crate::at::{AtCommand, AtResponse, AtStatus};
use crate::config::Config;
use crate::hex;
use crate::transport::{Transport, TransportError};

pub mod cellular;
pub mod lr;

pub use cellular::Cellular;
pub use lr::Lr;

#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Error {
    /// argument rejected before any I/O
    InvalidArgument,
    /// AT mnemonic not in the supported command set
    InvalidCommand,
    FrameTooLarge,
    Uart(TransportError),
    Receive(ReceiveError),
    /// no matching response within the time budget
    Timeout,
    /// module answered the AT command with a non-zero status
    AtCommandFailed(AtStatus),
    Hex(hex::Error),
    ConnectFailed,
    /// non-blocking connect attempt did not attach / join yet
    WouldBlock,
    UnknownSocket(u8),
    InvalidSocketState,
    SocketTableFull,
    /// module reported a non-zero socket status
    SocketFailed(u8),
    /// transmit status carried a non-zero delivery status
    DeliveryFailed(u8),
    BufferTooSmall,
    /// response data does not have the length the command defines
    MalformedResponse,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Error {
        Error::Uart(e)
    }
}

impl From<ReceiveError> for Error {
    fn from(e: ReceiveError) -> Error {
        match e {
            ReceiveError::Uart(e) => Error::Uart(e),
            e => Error::Receive(e),
        }
    }
}

impl From<hex::Error> for Error {
    fn from(e: hex::Error) -> Error {
        Error::Hex(e)
    }
}

impl From<crate::api::Error> for Error {
    fn from(_: crate::api::Error) -> Error {
        Error::FrameTooLarge
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ModemStatus {
    HardwareReset,
    WatchdogReset,
    Joined,
    Disassociated,
    VoltageSupplyLimitExceeded,
    ConfigChangedWhileJoining,
    Other(u8),
}

impl From<u8> for ModemStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ModemStatus::HardwareReset,
            0x01 => ModemStatus::WatchdogReset,
            0x02 => ModemStatus::Joined,
            0x03 => ModemStatus::Disassociated,
            0x0D => ModemStatus::VoltageSupplyLimitExceeded,
            0x11 => ModemStatus::ConfigChangedWhileJoining,
            v => ModemStatus::Other(v),
        }
    }
}

/// Transmit status (`0x89`): `frame id | delivery status`
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct TxStatus {
    pub frame_id: u8,
    /// 0 means delivered
    pub delivery_status: u8,
}

impl TxStatus {
    pub fn parse(frame: &ApiFrame) -> Option<TxStatus> {
        match frame.frame_type() {
            Ok(FrameType::TransmitStatus) | Ok(FrameType::ExtendedTransmitStatus) => {}
            _ => return None,
        }
        match frame.data() {
            [frame_id, delivery_status, ..] => Some(TxStatus {
                frame_id: *frame_id,
                delivery_status: *delivery_status,
            }),
            _ => None,
        }
    }
}

/// Application hooks invoked from the dispatcher. All methods default to doing nothing so an
/// application only overrides what it cares about; `()` ignores everything.
///
/// The callbacks run while the driver is mutably borrowed, so they get the decoded event only.
/// Record what is needed and act on it once the driver call returns.
pub trait Callbacks<P> {
    /// Unsolicited data from the network
    fn on_receive(&mut self, _packet: &P) {}

    /// Transmit status that no pending operation was waiting for
    fn on_send(&mut self, _status: &TxStatus) {}

    fn on_modem_status(&mut self, _status: ModemStatus) {}
}

impl<P> Callbacks<P> for () {}

/// Family specific state and inbound frame handling
pub trait Family {
    /// Decoded unsolicited data handed to [Callbacks::on_receive]
    type RxPacket;

    /// Data frames (RX packets, socket data, socket status, ...)
    fn handle_rx_frame<C: Callbacks<Self::RxPacket>>(
        &mut self,
        frame: &ApiFrame,
        callbacks: &mut C,
    );

    fn handle_tx_status_frame<C: Callbacks<Self::RxPacket>>(
        &mut self,
        frame: &ApiFrame,
        callbacks: &mut C,
    ) {
        if let Some(status) = TxStatus::parse(frame) {
            debug!(
                "tx status id={=u8} status={=u8}",
                status.frame_id, status.delivery_status
            );
            callbacks.on_send(&status);
        }
    }
}

/// Uniform operation set every module family provides
pub trait Device {
    type Config;
    /// Outbound packet accepted by [Device::send_data]
    type Packet;

    /// Opens the serial line
    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), Error>;

    /// Attaches (cellular) or joins (LoRaWAN) the network. Blocking or single step depending on
    /// [crate::ConnectMode].
    fn connect(&mut self) -> Result<(), Error>;

    fn disconnect(&mut self) -> Result<(), Error>;

    /// Returns the compact status byte of the family, 0 on success
    fn send_data(&mut self, packet: &Self::Packet) -> u8;

    /// One receive tick, dispatching at most one frame
    fn process(&mut self) -> Result<(), Error>;

    fn soft_reset(&mut self) -> Result<(), Error>;

    /// Pulling the reset line is up to the platform, the driver has nothing to do here
    fn hard_reset(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn connected(&mut self) -> bool;

    /// Stores the family configuration without talking to the module
    fn configure(&mut self, config: &Self::Config) -> Result<(), Error>;

    fn handle_rx_frame(&mut self, frame: &ApiFrame);

    fn handle_tx_status_frame(&mut self, frame: &ApiFrame);
}

pub struct XBee<T, C, F> {
    transport: T,
    callbacks: C,
    family: F,
    reader: FrameReader,
    /// when the partially assembled frame in `reader` started arriving
    frame_started_at: Option<u32>,
    frame_id: u8,
    config: Config,
    modem_status: Option<ModemStatus>,
}

impl<T, C, F> XBee<T, C, F>
where
    T: Transport,
    F: Family,
    C: Callbacks<F::RxPacket>,
{
    pub fn new(transport: T, callbacks: C, family: F, config: Config) -> Self {
        XBee {
            transport,
            callbacks,
            family,
            reader: FrameReader::new(),
            frame_started_at: None,
            frame_id: 1,
            config,
            modem_status: None,
        }
    }

    /// Tears the driver down and hands back what the application lent it
    pub fn release(self) -> (T, C) {
        (self.transport, self.callbacks)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    pub fn callbacks(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn last_modem_status(&self) -> Option<ModemStatus> {
        self.modem_status
    }

    /// The id the next correlated frame will carry
    pub fn frame_id(&self) -> u8 {
        self.frame_id
    }

    /// Hands out the current frame id and advances the counter. 0 is skipped on wrap since the
    /// module does not answer frames with id 0.
    pub fn next_frame_id(&mut self) -> u8 {
        let id = self.frame_id;
        self.frame_id = match self.frame_id.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        id
    }

    pub fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), Error> {
        info!("init uart baud={=u32}", baud_rate);
        self.transport.init(baud_rate, device)?;
        self.transport.flush_rx();
        self.reader.reset();
        self.frame_started_at = None;
        Ok(())
    }

    pub fn send_frame(&mut self, frame: &ApiFrame) -> Result<(), Error> {
        let encoded = frame.encode()?;
        trace!(
            "tx frame type={=u8:x} id={} len={=usize}",
            frame.raw_type(),
            frame.frame_id(),
            frame.len()
        );
        self.write_all(&encoded)
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        let start = self.transport.millis();
        while !buf.is_empty() {
            let written = self.transport.write(buf)?;
            if written > 0 {
                buf = &buf[written.min(buf.len())..];
                continue;
            }
            if self.transport.millis().wrapping_sub(start) >= self.config.write_timeout_ms {
                warn!("uart write stalled, {=usize} bytes left", buf.len());
                return Err(Error::Uart(TransportError::Timeout));
            }
            self.transport.delay(1);
        }
        Ok(())
    }

    /// Sends an AT command without waiting for the module's answer. Returns the frame id used.
    ///
    /// Unknown mnemonics are rejected with [Error::InvalidCommand] before anything is written.
    pub fn send_at_command<A>(&mut self, command: A, parameter: &[u8]) -> Result<u8, Error>
    where
        A: TryInto<AtCommand>,
    {
        let command = command.try_into().map_err(|_| Error::InvalidCommand)?;
        let frame_id = self.frame_id;
        let frame = ApiFrame::at_command(frame_id, command.mnemonic(), parameter)?;
        self.send_frame(&frame)?;
        self.next_frame_id();
        Ok(frame_id)
    }

    /// Sends an AT command and waits up to `timeout_ms` for the response with the same frame
    /// id. Frames arriving in the meantime are dispatched as usual.
    ///
    /// A response with a non-zero status is reported as [Error::AtCommandFailed].
    pub fn send_at_command_and_get_response<A>(
        &mut self,
        command: A,
        parameter: &[u8],
        timeout_ms: u32,
    ) -> Result<AtResponse, Error>
    where
        A: TryInto<AtCommand>,
    {
        let command = command.try_into().map_err(|_| Error::InvalidCommand)?;
        let mnemonic = command.mnemonic();
        let frame_id = self.send_at_command(command, parameter)?;
        let response = self.wait_for(timeout_ms, |frame| {
            AtResponse::parse(frame).filter(|r| r.frame_id == frame_id && r.mnemonic == mnemonic)
        })?;
        if response.is_ok() {
            Ok(response)
        } else {
            warn!("AT command {} failed: {}", command, response.status);
            Err(Error::AtCommandFailed(response.status))
        }
    }

    /// [Self::send_at_command_and_get_response] with the configured AT response timeout
    pub fn at_query<A>(&mut self, command: A, parameter: &[u8]) -> Result<AtResponse, Error>
    where
        A: TryInto<AtCommand>,
    {
        let timeout = self.config.at_response_timeout_ms;
        self.send_at_command_and_get_response(command, parameter, timeout)
    }

    /// Sets API options (`AO`)
    pub fn set_api_options(&mut self, options: u8) -> Result<(), Error> {
        self.at_query(AtCommand::Ao, &[options]).map(|_| ())
    }

    /// Persists the current settings (`WR`)
    pub fn write_config(&mut self) -> Result<(), Error> {
        self.at_query(AtCommand::Wr, &[]).map(|_| ())
    }

    /// Applies queued setting changes (`AC`)
    pub fn apply_changes(&mut self) -> Result<(), Error> {
        self.at_query(AtCommand::Ac, &[]).map(|_| ())
    }

    /// Firmware version (`VR`), big endian in the response
    pub fn firmware_version(&mut self) -> Result<u32, Error> {
        let response = self.at_query(AtCommand::Vr, &[])?;
        let version = response
            .data
            .iter()
            .take(4)
            .fold(0u32, |acc, b| (acc << 8) | *b as u32);
        Ok(version)
    }

    /// Reads whatever complete frame the transport has ready without waiting.
    ///
    /// Never reads past the end of the frame being assembled, so bytes of the next frame stay in
    /// the transport for the following call.
    pub fn poll_frame(&mut self) -> Result<Option<ApiFrame>, ReceiveError> {
        let mut buf = [0u8; MAX_FRAME_DATA_SIZE];
        loop {
            let wanted = self.reader.bytes_needed().min(buf.len());
            let read = self.transport.read(&mut buf[..wanted])?;
            if read == 0 {
                return Ok(None);
            }
            for byte in &buf[..read.min(wanted)] {
                if let Some(result) = self.reader.push(*byte) {
                    self.frame_started_at = None;
                    if let Ok(_frame) = &result {
                        trace!(
                            "rx frame type={=u8:x} id={} len={=usize}",
                            _frame.raw_type(),
                            _frame.frame_id(),
                            _frame.len()
                        );
                    }
                    return result.map(Some);
                }
            }
            if self.reader.is_idle() {
                self.frame_started_at = None;
            } else if self.frame_started_at.is_none() {
                self.frame_started_at = Some(self.transport.millis());
            }
        }
    }

    /// Waits up to `timeout_ms` for one complete frame.
    ///
    /// On timeout the error names the phase the reader was in. A partial frame survives the
    /// timeout and may complete on a later call, unless it has been stuck for longer than the
    /// configured read timeout, in which case it is dropped.
    pub fn receive_frame(&mut self, timeout_ms: u32) -> Result<ApiFrame, ReceiveError> {
        let start = self.transport.millis();
        loop {
            if let Some(frame) = self.poll_frame()? {
                return Ok(frame);
            }
            let now = self.transport.millis();
            if let Some(started) = self.frame_started_at {
                if now.wrapping_sub(started) >= self.config.read_timeout_ms {
                    let err = self.reader.timeout_error();
                    warn!("dropping stalled partial frame: {}", err);
                    self.reader.reset();
                    self.frame_started_at = None;
                    return Err(err);
                }
            }
            if now.wrapping_sub(start) >= timeout_ms {
                return Err(self.reader.timeout_error());
            }
            self.transport.delay(1);
        }
    }

    /// Bounded poll: receives frames until `matcher` accepts one or `timeout_ms` elapses.
    /// Frames the matcher passes on are dispatched, in arrival order.
    pub(crate) fn wait_for<R, M>(&mut self, timeout_ms: u32, mut matcher: M) -> Result<R, Error>
    where
        M: FnMut(&ApiFrame) -> Option<R>,
    {
        let start = self.transport.millis();
        loop {
            let elapsed = self.transport.millis().wrapping_sub(start);
            match self.receive_frame(timeout_ms.saturating_sub(elapsed)) {
                Ok(frame) => match matcher(&frame) {
                    Some(result) => return Ok(result),
                    None => self.handle_frame(&frame),
                },
                Err(ReceiveError::Uart(e)) => return Err(Error::Uart(e)),
                Err(_e @ ReceiveError::ChecksumMismatch { .. })
                | Err(_e @ ReceiveError::MalformedLength)
                | Err(_e @ ReceiveError::FrameTooLarge(_)) => {
                    warn!("dropped corrupt frame: {}", _e);
                }
                // timeouts fall through to the deadline check
                Err(_) => {}
            }
            if self.transport.millis().wrapping_sub(start) >= timeout_ms {
                debug!("no matching frame within {=u32} ms", timeout_ms);
                return Err(Error::Timeout);
            }
        }
    }

    /// Routes one inbound frame to its handler. Unknown and unexpected frames are logged and
    /// dropped.
    pub fn handle_frame(&mut self, frame: &ApiFrame) {
        match frame.frame_type() {
            Ok(FrameType::AtResponse) => match AtResponse::parse(frame) {
                Some(_response) => debug!(
                    "unsolicited AT response id={=u8} status={}",
                    _response.frame_id,
                    _response.status
                ),
                None => warn!("short AT response frame"),
            },
            Ok(FrameType::ModemStatus) => match frame.data().first() {
                Some(raw) => {
                    let status = ModemStatus::from(*raw);
                    info!("modem status: {}", status);
                    self.modem_status = Some(status);
                    self.callbacks.on_modem_status(status);
                }
                None => warn!("empty modem status frame"),
            },
            Ok(FrameType::TransmitStatus) | Ok(FrameType::ExtendedTransmitStatus) => {
                self.family
                    .handle_tx_status_frame(frame, &mut self.callbacks)
            }
            Ok(t) if t.is_request() => warn!("request frame {} on the receive side", t),
            Ok(_) => self.family.handle_rx_frame(frame, &mut self.callbacks),
            Err(_raw) => warn!("unknown frame type {=u8:x}", _raw),
        }
    }

    /// One receive tick: waits at most the configured process timeout for a frame and
    /// dispatches it. Corrupt frames are logged and dropped; only transport failures surface.
    pub fn process(&mut self) -> Result<(), Error> {
        match self.receive_frame(self.config.process_timeout_ms) {
            Ok(frame) => {
                self.handle_frame(&frame);
                Ok(())
            }
            Err(ReceiveError::Uart(e)) => Err(Error::Uart(e)),
            Err(_e @ ReceiveError::ChecksumMismatch { .. })
            | Err(_e @ ReceiveError::MalformedLength)
            | Err(_e @ ReceiveError::FrameTooLarge(_)) => {
                warn!("dropped corrupt frame: {}", _e);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

/// Looks up an AT command by mnemonic, mapping failure to [Error::InvalidCommand]
pub fn parse_at_command(mnemonic: &str) -> Result<AtCommand, Error> {
    AtCommand::try_from(mnemonic).map_err(|_| Error::InvalidCommand)
}
