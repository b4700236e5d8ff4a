use heapless::Vec;

use super::{ApiFrame, MAX_FRAME_DATA_SIZE, START_DELIMITER};
use crate::transport::TransportError;

#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ReceiveError {
    TimeoutStartDelimiter,
    TimeoutLength,
    TimeoutData,
    TimeoutChecksum,
    ChecksumMismatch { expected: u8, received: u8 },
    /// length field of zero, there is not even a type byte
    MalformedLength,
    FrameTooLarge(u16),
    Uart(TransportError),
}

impl From<TransportError> for ReceiveError {
    fn from(e: TransportError) -> ReceiveError {
        ReceiveError::Uart(e)
    }
}

#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
enum State {
    Delimiter,
    LengthHigh,
    LengthLow { high: u8 },
    Data { length: u16 },
    Checksum,
}

/// Byte stream to [ApiFrame] state machine.
///
/// The reader keeps its state between calls so a frame trickling in over several reads (or
/// several `process` ticks) is still assembled. Anything before a start delimiter is dropped.
/// After a bad frame (checksum, length) the reader goes back to hunting for the next
/// delimiter, which is the only resynchronization the non-escaped protocol allows.
pub struct FrameReader {
    state: State,
    /// type byte followed by the payload
    buf: Vec<u8, MAX_FRAME_DATA_SIZE>,
    discarded: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            state: State::Delimiter,
            buf: Vec::new(),
            discarded: 0,
        }
    }

    /// How many bytes may be read from the line without running into the next frame
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            State::Delimiter => 1,
            State::LengthHigh => 2,
            State::LengthLow { .. } => 1,
            State::Data { length } => length as usize - self.buf.len(),
            State::Checksum => 1,
        }
    }

    /// True when no frame is partially assembled
    pub fn is_idle(&self) -> bool {
        self.state == State::Delimiter
    }

    /// Error to report when the caller gives up waiting in the current state
    pub fn timeout_error(&self) -> ReceiveError {
        match self.state {
            State::Delimiter => ReceiveError::TimeoutStartDelimiter,
            State::LengthHigh | State::LengthLow { .. } => ReceiveError::TimeoutLength,
            State::Data { .. } => ReceiveError::TimeoutData,
            State::Checksum => ReceiveError::TimeoutChecksum,
        }
    }

    /// Number of non-frame bytes thrown away while hunting for a delimiter
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Feeds one byte. Returns `Some` once a frame is complete or has been rejected.
    pub fn push(&mut self, byte: u8) -> Option<Result<ApiFrame, ReceiveError>> {
        match self.state {
            State::Delimiter => {
                if byte == START_DELIMITER {
                    self.buf.clear();
                    self.state = State::LengthHigh;
                } else {
                    self.discarded += 1;
                }
                None
            }
            State::LengthHigh => {
                self.state = State::LengthLow { high: byte };
                None
            }
            State::LengthLow { high } => {
                let length = u16::from_be_bytes([high, byte]);
                if length == 0 {
                    self.reset();
                    return Some(Err(ReceiveError::MalformedLength));
                }
                if length as usize > MAX_FRAME_DATA_SIZE {
                    self.reset();
                    return Some(Err(ReceiveError::FrameTooLarge(length)));
                }
                self.state = State::Data { length };
                None
            }
            State::Data { length } => {
                // bounded by the length check above
                if self.buf.push(byte).is_err() {
                    self.reset();
                    return Some(Err(ReceiveError::FrameTooLarge(length)));
                }
                if self.buf.len() == length as usize {
                    self.state = State::Checksum;
                }
                None
            }
            State::Checksum => {
                let expected = super::checksum(self.buf[0], &self.buf[1..]);
                let result = if expected == byte {
                    ApiFrame::from_raw(self.buf[0], &self.buf[1..])
                        .map_err(|_| ReceiveError::FrameTooLarge(self.buf.len() as u16))
                } else {
                    Err(ReceiveError::ChecksumMismatch {
                        expected,
                        received: byte,
                    })
                };
                self.reset();
                Some(result)
            }
        }
    }

    /// Drops any partially assembled frame and starts hunting for a delimiter
    pub fn reset(&mut self) {
        self.state = State::Delimiter;
        self.buf.clear();
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
