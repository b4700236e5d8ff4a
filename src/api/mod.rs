//! XBee API frame definitions
//!
//! Every exchange with the module is an API frame:
//!
//! | name      | length in bytes | description                                          |
//! |-----------|-----------------|------------------------------------------------------|
//! | delimiter | 1               | always `0x7E`                                        |
//! | length    | 2               | big endian, counts the type byte and the payload     |
//! | type      | 1               | [FrameType]                                          |
//! | payload   | length - 1      | frame specific, usually starting with the frame id   |
//! | checksum  | 1               | `0xFF - (type + sum(payload))`, truncated to 8 bits  |
//!
//! The modules run in non-escaped API mode (`AP=1`) so no byte stuffing happens anywhere.
use core::convert::TryFrom;
use heapless::Vec;

pub mod codec;

pub use codec::{FrameReader, ReceiveError};

pub const START_DELIMITER: u8 = 0x7E;
/// Largest value the length field may carry (type byte + payload)
pub const MAX_FRAME_DATA_SIZE: usize = 256;
pub const MAX_PAYLOAD_LENGTH: usize = MAX_FRAME_DATA_SIZE - 1;
/// delimiter + length + type + payload + checksum
pub const MAX_ENCODED_FRAME_LENGTH: usize = 1 + 2 + MAX_FRAME_DATA_SIZE + 1;

pub type FramePayload = Vec<u8, MAX_PAYLOAD_LENGTH>;
pub type EncodedFrame = Vec<u8, MAX_ENCODED_FRAME_LENGTH>;

#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Error {
    /// payload would not fit into a single frame
    PayloadTooLarge(usize),
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
#[repr(u8)]
pub enum FrameType {
    AtCommand = 0x08,
    TransmitRequest = 0x10,
    LrJoinRequest = 0x14,
    CellularTxIpv4 = 0x20,
    SocketCreate = 0x40,
    SocketOption = 0x41,
    SocketConnect = 0x42,
    SocketClose = 0x43,
    SocketSend = 0x44,
    SocketSendTo = 0x45,
    SocketBind = 0x46,
    LrTxRequest = 0x50,
    AtResponse = 0x88,
    TransmitStatus = 0x89,
    ModemStatus = 0x8A,
    ExtendedTransmitStatus = 0x8B,
    CellularRxIpv4 = 0xB0,
    SocketCreateResponse = 0xC0,
    SocketOptionResponse = 0xC1,
    SocketConnectResponse = 0xC2,
    SocketCloseResponse = 0xC3,
    SocketBindResponse = 0xC6,
    SocketReceive = 0xCD,
    SocketReceiveFrom = 0xCE,
    SocketStatus = 0xCF,
    LrRxPacket = 0xD0,
    LrExplicitRxPacket = 0xD1,
}

impl TryFrom<u8> for FrameType {
    /// the unrecognized type byte
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x08 => Ok(FrameType::AtCommand),
            0x10 => Ok(FrameType::TransmitRequest),
            0x14 => Ok(FrameType::LrJoinRequest),
            0x20 => Ok(FrameType::CellularTxIpv4),
            0x40 => Ok(FrameType::SocketCreate),
            0x41 => Ok(FrameType::SocketOption),
            0x42 => Ok(FrameType::SocketConnect),
            0x43 => Ok(FrameType::SocketClose),
            0x44 => Ok(FrameType::SocketSend),
            0x45 => Ok(FrameType::SocketSendTo),
            0x46 => Ok(FrameType::SocketBind),
            0x50 => Ok(FrameType::LrTxRequest),
            0x88 => Ok(FrameType::AtResponse),
            0x89 => Ok(FrameType::TransmitStatus),
            0x8A => Ok(FrameType::ModemStatus),
            0x8B => Ok(FrameType::ExtendedTransmitStatus),
            0xB0 => Ok(FrameType::CellularRxIpv4),
            0xC0 => Ok(FrameType::SocketCreateResponse),
            0xC1 => Ok(FrameType::SocketOptionResponse),
            0xC2 => Ok(FrameType::SocketConnectResponse),
            0xC3 => Ok(FrameType::SocketCloseResponse),
            0xC6 => Ok(FrameType::SocketBindResponse),
            0xCD => Ok(FrameType::SocketReceive),
            0xCE => Ok(FrameType::SocketReceiveFrom),
            0xCF => Ok(FrameType::SocketStatus),
            0xD0 => Ok(FrameType::LrRxPacket),
            0xD1 => Ok(FrameType::LrExplicitRxPacket),
            v => Err(v),
        }
    }
}

impl FrameType {
    /// Host -> module frames. Seeing one of these on the receive side means the line is
    /// looped back or garbled.
    pub fn is_request(self) -> bool {
        (self as u8) < 0x80
    }

    /// Whether the first payload byte is a frame id used for correlation
    pub fn carries_frame_id(self) -> bool {
        !matches!(
            self,
            FrameType::ModemStatus
                | FrameType::CellularRxIpv4
                | FrameType::SocketStatus
                | FrameType::LrRxPacket
                | FrameType::LrExplicitRxPacket
        )
    }
}

/// Computes `0xFF - (type + sum(payload))` over 8 bits
pub fn checksum(frame_type: u8, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(frame_type, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// A single validated API frame. The checksum is not stored, it is recomputed on encode and
/// verified by [FrameReader] before a frame is ever constructed from wire bytes.
#[derive(Clone, PartialEq)]
pub struct ApiFrame {
    frame_type: u8,
    data: FramePayload,
}

#[cfg(feature = "std")]
impl core::fmt::Debug for ApiFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ApiFrame {{ type: {:02x}, data: {:02x?} }}",
            self.frame_type, self.data
        )
    }
}

impl ApiFrame {
    pub fn new(frame_type: FrameType, payload: &[u8]) -> Result<Self, Error> {
        Self::from_raw(frame_type as u8, payload)
    }

    /// Builds a frame from a raw type byte. Used on the receive path where the type may be
    /// one this crate does not know about.
    pub fn from_raw(frame_type: u8, payload: &[u8]) -> Result<Self, Error> {
        let data =
            FramePayload::from_slice(payload).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
        Ok(ApiFrame { frame_type, data })
    }

    /// AT command frame: `frame id | mnemonic[2] | parameter`
    pub fn at_command(frame_id: u8, mnemonic: [u8; 2], parameter: &[u8]) -> Result<Self, Error> {
        let too_large = |_| Error::PayloadTooLarge(3 + parameter.len());
        let mut data = FramePayload::new();
        data.push(frame_id).map_err(|_| Error::PayloadTooLarge(1))?;
        data.extend_from_slice(&mnemonic).map_err(too_large)?;
        data.extend_from_slice(parameter).map_err(too_large)?;
        Ok(ApiFrame {
            frame_type: FrameType::AtCommand as u8,
            data,
        })
    }

    pub fn raw_type(&self) -> u8 {
        self.frame_type
    }

    pub fn frame_type(&self) -> Result<FrameType, u8> {
        FrameType::try_from(self.frame_type)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length, without the type byte
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Frame id for frame types that carry one
    pub fn frame_id(&self) -> Option<u8> {
        match self.frame_type() {
            Ok(t) if t.carries_frame_id() => self.data.first().copied(),
            _ => None,
        }
    }

    pub fn checksum(&self) -> u8 {
        checksum(self.frame_type, &self.data)
    }

    pub fn encode(&self) -> Result<EncodedFrame, Error> {
        let too_large = |_| Error::PayloadTooLarge(self.data.len());
        let length = (self.data.len() + 1) as u16;
        let mut res = EncodedFrame::new();
        res.push(START_DELIMITER).map_err(|_| Error::PayloadTooLarge(0))?;
        res.extend_from_slice(&length.to_be_bytes())
            .map_err(too_large)?;
        res.push(self.frame_type).map_err(|_| Error::PayloadTooLarge(0))?;
        res.extend_from_slice(&self.data).map_err(too_large)?;
        res.push(self.checksum())
            .map_err(|_| Error::PayloadTooLarge(self.data.len()))?;
        Ok(res)
    }
}
