use defmt::Formatter;

use crate::api::{FrameType, ReceiveError};
use crate::at::{AtCommand, AtStatus};
use crate::device::cellular::{Protocol, SocketState};
use crate::device::lr::LrClass;
use crate::device::{Error, ModemStatus, TxStatus};
use crate::hex::Error as HexError;
use crate::transport::TransportError;

impl defmt::Format for TransportError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            TransportError::InitFailed => defmt::write!(fmt, "InitFailed"),
            TransportError::Timeout => defmt::write!(fmt, "Timeout"),
            TransportError::Overrun => defmt::write!(fmt, "Overrun"),
            TransportError::Unknown => defmt::write!(fmt, "Unknown"),
        }
    }
}

impl defmt::Format for HexError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            HexError::OddLength => defmt::write!(fmt, "OddLength"),
            HexError::InvalidLength { expected, actual } => defmt::write!(
                fmt,
                "InvalidLength(expected={=usize}, actual={=usize})",
                expected,
                actual
            ),
            HexError::BufferTooSmall {
                required,
                available,
            } => defmt::write!(
                fmt,
                "BufferTooSmall(required={=usize}, available={=usize})",
                required,
                available
            ),
            HexError::MalformedHex(base16::DecodeError::InvalidByte { index, byte }) => {
                defmt::write!(
                    fmt,
                    "MalformedHex(byte {=u8:x} at {=usize})",
                    byte,
                    index
                )
            }
            HexError::MalformedHex(base16::DecodeError::InvalidLength { length }) => {
                defmt::write!(fmt, "MalformedHex(length {=usize})", length)
            }
        }
    }
}

impl defmt::Format for FrameType {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "FrameType({=u8:x})", *self as u8)
    }
}

impl defmt::Format for ReceiveError {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            ReceiveError::TimeoutStartDelimiter => defmt::write!(fmt, "TimeoutStartDelimiter"),
            ReceiveError::TimeoutLength => defmt::write!(fmt, "TimeoutLength"),
            ReceiveError::TimeoutData => defmt::write!(fmt, "TimeoutData"),
            ReceiveError::TimeoutChecksum => defmt::write!(fmt, "TimeoutChecksum"),
            ReceiveError::ChecksumMismatch { expected, received } => defmt::write!(
                fmt,
                "ChecksumMismatch(expected={=u8:x}, received={=u8:x})",
                expected,
                received
            ),
            ReceiveError::MalformedLength => defmt::write!(fmt, "MalformedLength"),
            ReceiveError::FrameTooLarge(len) => defmt::write!(fmt, "FrameTooLarge({=u16})", len),
            ReceiveError::Uart(e) => defmt::write!(fmt, "Uart({})", e),
        }
    }
}

impl defmt::Format for AtCommand {
    fn format(&self, fmt: Formatter<'_>) {
        let [a, b] = self.mnemonic();
        defmt::write!(fmt, "AT{=char}{=char}", a as char, b as char)
    }
}

impl defmt::Format for AtStatus {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            AtStatus::Ok => defmt::write!(fmt, "Ok"),
            AtStatus::Error => defmt::write!(fmt, "Error"),
            AtStatus::InvalidCommand => defmt::write!(fmt, "InvalidCommand"),
            AtStatus::InvalidParameter => defmt::write!(fmt, "InvalidParameter"),
            AtStatus::TxFailure => defmt::write!(fmt, "TxFailure"),
            AtStatus::Other(v) => defmt::write!(fmt, "Other({=u8:x})", v),
        }
    }
}

impl defmt::Format for ModemStatus {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            ModemStatus::HardwareReset => defmt::write!(fmt, "HardwareReset"),
            ModemStatus::WatchdogReset => defmt::write!(fmt, "WatchdogReset"),
            ModemStatus::Joined => defmt::write!(fmt, "Joined"),
            ModemStatus::Disassociated => defmt::write!(fmt, "Disassociated"),
            ModemStatus::VoltageSupplyLimitExceeded => {
                defmt::write!(fmt, "VoltageSupplyLimitExceeded")
            }
            ModemStatus::ConfigChangedWhileJoining => {
                defmt::write!(fmt, "ConfigChangedWhileJoining")
            }
            ModemStatus::Other(v) => defmt::write!(fmt, "Other({=u8:x})", v),
        }
    }
}

impl defmt::Format for TxStatus {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "TxStatus(id={=u8}, status={=u8:x})",
            self.frame_id,
            self.delivery_status
        )
    }
}

impl defmt::Format for SocketState {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            SocketState::Unopened => defmt::write!(fmt, "Unopened"),
            SocketState::Created => defmt::write!(fmt, "Created"),
            SocketState::Connected => defmt::write!(fmt, "Connected"),
            SocketState::Closed => defmt::write!(fmt, "Closed"),
            SocketState::Error => defmt::write!(fmt, "Error"),
        }
    }
}

impl defmt::Format for Protocol {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            Protocol::Tcp => defmt::write!(fmt, "Tcp"),
            Protocol::Udp => defmt::write!(fmt, "Udp"),
        }
    }
}

impl defmt::Format for LrClass {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "Class{=char}", self.as_byte() as char)
    }
}

impl defmt::Format for Error {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            Error::InvalidArgument => defmt::write!(fmt, "InvalidArgument"),
            Error::InvalidCommand => defmt::write!(fmt, "InvalidCommand"),
            Error::FrameTooLarge => defmt::write!(fmt, "FrameTooLarge"),
            Error::Uart(e) => defmt::write!(fmt, "Uart({})", e),
            Error::Receive(e) => defmt::write!(fmt, "Receive({})", e),
            Error::Timeout => defmt::write!(fmt, "Timeout"),
            Error::AtCommandFailed(s) => defmt::write!(fmt, "AtCommandFailed({})", s),
            Error::Hex(e) => defmt::write!(fmt, "Hex({})", e),
            Error::ConnectFailed => defmt::write!(fmt, "ConnectFailed"),
            Error::WouldBlock => defmt::write!(fmt, "WouldBlock"),
            Error::UnknownSocket(id) => defmt::write!(fmt, "UnknownSocket({=u8})", id),
            Error::InvalidSocketState => defmt::write!(fmt, "InvalidSocketState"),
            Error::SocketTableFull => defmt::write!(fmt, "SocketTableFull"),
            Error::SocketFailed(s) => defmt::write!(fmt, "SocketFailed({=u8:x})", s),
            Error::DeliveryFailed(s) => defmt::write!(fmt, "DeliveryFailed({=u8:x})", s),
            Error::BufferTooSmall => defmt::write!(fmt, "BufferTooSmall"),
            Error::MalformedResponse => defmt::write!(fmt, "MalformedResponse"),
        }
    }
}
