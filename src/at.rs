//! AT command sub-protocol
//!
//! Each command is a fixed two character mnemonic carried inside an API frame of type
//! [crate::api::FrameType::AtCommand]. The module answers (for non-zero frame ids) with an
//! [crate::api::FrameType::AtResponse] frame laid out as
//! `frame id | mnemonic[2] | status | data`.
use core::convert::TryFrom;
use heapless::Vec;

use crate::api::{ApiFrame, FrameType, MAX_PAYLOAD_LENGTH};

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum AtCommand {
    /// Attach / association indicator
    Ai,
    /// SIM PIN
    Pn,
    /// Access point name
    An,
    /// Carrier profile
    Cp,
    /// Shut down
    Sd,
    /// Firmware version
    Vr,
    /// Software reset
    Fr,
    /// Apply changes
    Ac,
    /// Write to non-volatile memory
    Wr,
    /// API options
    Ao,
    /// Network reset
    Nr,
    /// API enable
    Ap,
    /// Baud rate
    Bd,
    /// Exit command mode
    Cn,
    /// Restore defaults
    Re,
    /// IP address
    My,
    /// IMEI
    Im,
    /// LoRaWAN device EUI
    De,
    /// LoRaWAN application key
    Ak,
    /// LoRaWAN application EUI (join EUI)
    Ae,
    /// LoRaWAN network key
    Nk,
    /// LoRaWAN join status
    Js,
    /// LoRaWAN class
    Lc,
    /// LoRaWAN join RX1 delay
    J1,
    /// LoRaWAN RX2 frequency
    Xf,
    /// LoRaWAN channels mask
    Cm,
    /// LoRaWAN region
    Lr,
    /// LoRaWAN test mode frequency
    Fq,
    /// LoRaWAN test mode transmit power
    Pw,
}

const COMMANDS: [(AtCommand, [u8; 2]); 29] = [
    (AtCommand::Ai, *b"AI"),
    (AtCommand::Pn, *b"PN"),
    (AtCommand::An, *b"AN"),
    (AtCommand::Cp, *b"CP"),
    (AtCommand::Sd, *b"SD"),
    (AtCommand::Vr, *b"VR"),
    (AtCommand::Fr, *b"FR"),
    (AtCommand::Ac, *b"AC"),
    (AtCommand::Wr, *b"WR"),
    (AtCommand::Ao, *b"AO"),
    (AtCommand::Nr, *b"NR"),
    (AtCommand::Ap, *b"AP"),
    (AtCommand::Bd, *b"BD"),
    (AtCommand::Cn, *b"CN"),
    (AtCommand::Re, *b"RE"),
    (AtCommand::My, *b"MY"),
    (AtCommand::Im, *b"IM"),
    (AtCommand::De, *b"DE"),
    (AtCommand::Ak, *b"AK"),
    (AtCommand::Ae, *b"AE"),
    (AtCommand::Nk, *b"NK"),
    (AtCommand::Js, *b"JS"),
    (AtCommand::Lc, *b"LC"),
    (AtCommand::J1, *b"J1"),
    (AtCommand::Xf, *b"XF"),
    (AtCommand::Cm, *b"CM"),
    (AtCommand::Lr, *b"LR"),
    (AtCommand::Fq, *b"FQ"),
    (AtCommand::Pw, *b"PW"),
];

impl AtCommand {
    pub fn mnemonic(self) -> [u8; 2] {
        COMMANDS
            .iter()
            .find(|(cmd, _)| *cmd == self)
            .map(|(_, m)| *m)
            // every variant has a row in the table, see test_every_command_has_a_mnemonic
            .unwrap_or(*b"AT")
    }

    pub fn from_mnemonic(mnemonic: [u8; 2]) -> Option<AtCommand> {
        let upper = [
            mnemonic[0].to_ascii_uppercase(),
            mnemonic[1].to_ascii_uppercase(),
        ];
        COMMANDS
            .iter()
            .find(|(_, m)| *m == upper)
            .map(|(cmd, _)| *cmd)
    }
}

impl TryFrom<&str> for AtCommand {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.as_bytes() {
            [a, b] => AtCommand::from_mnemonic([*a, *b]).ok_or("unknown AT command"),
            _ => Err("AT mnemonic must be two characters"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum AtStatus {
    Ok,
    Error,
    InvalidCommand,
    InvalidParameter,
    TxFailure,
    Other(u8),
}

impl From<u8> for AtStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => AtStatus::Ok,
            1 => AtStatus::Error,
            2 => AtStatus::InvalidCommand,
            3 => AtStatus::InvalidParameter,
            4 => AtStatus::TxFailure,
            v => AtStatus::Other(v),
        }
    }
}

/// Largest data section an AT response can carry: payload minus id, mnemonic and status
pub const MAX_AT_RESPONSE_DATA: usize = MAX_PAYLOAD_LENGTH - 4;

/// Decoded AT response frame
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct AtResponse {
    pub frame_id: u8,
    pub mnemonic: [u8; 2],
    pub status: AtStatus,
    pub data: Vec<u8, MAX_AT_RESPONSE_DATA>,
}

impl AtResponse {
    /// Parses an AT response frame. Returns `None` for any other frame type or a payload too
    /// short to hold the fixed header.
    pub fn parse(frame: &ApiFrame) -> Option<AtResponse> {
        if frame.frame_type() != Ok(FrameType::AtResponse) {
            return None;
        }
        match frame.data() {
            [frame_id, m0, m1, status, data @ ..] => Some(AtResponse {
                frame_id: *frame_id,
                mnemonic: [*m0, *m1],
                status: AtStatus::from(*status),
                data: Vec::from_slice(data).ok()?,
            }),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AtStatus::Ok
    }

    pub fn command(&self) -> Option<AtCommand> {
        AtCommand::from_mnemonic(self.mnemonic)
    }
}
