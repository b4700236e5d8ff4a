//! Scripted transport for unit tests.
//!
//! Time only moves when the driver calls `delay`, so timeouts are deterministic. Frames written
//! by the driver are decoded and offered to the registered responders; the most recently
//! registered responder that returns `Some` wins and its reply is queued for reading.
use std::boxed::Box;
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use crate::api::{ApiFrame, FrameReader, FrameType};
use crate::transport::{Transport, TransportError};

type Responder = Box<dyn FnMut(&ApiFrame) -> Option<ApiFrame>>;

pub fn at_response(frame_id: u8, mnemonic: [u8; 2], status: u8, data: &[u8]) -> ApiFrame {
    let mut payload = std::vec![frame_id, mnemonic[0], mnemonic[1], status];
    payload.extend_from_slice(data);
    ApiFrame::new(FrameType::AtResponse, &payload).unwrap()
}

pub struct MockTransport {
    pub now: u32,
    pub rx: VecDeque<u8>,
    /// every byte the driver wrote, in order
    pub written: Vec<u8>,
    pub write_calls: usize,
    pub read_calls: usize,
    pub delays: Vec<u32>,
    pub init_calls: Vec<(u32, String)>,
    pub init_error: Option<TransportError>,
    pub write_error: Option<TransportError>,
    /// accept at most this many bytes per write call
    pub write_chunk: Option<usize>,
    responders: Vec<Responder>,
    tx_reader: FrameReader,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            now: 0,
            rx: VecDeque::new(),
            written: Vec::new(),
            write_calls: 0,
            read_calls: 0,
            delays: Vec::new(),
            init_calls: Vec::new(),
            init_error: None,
            write_error: None,
            write_chunk: None,
            responders: Vec::new(),
            tx_reader: FrameReader::new(),
        }
    }

    pub fn inject_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn inject(&mut self, frame: &ApiFrame) {
        let encoded = frame.encode().unwrap();
        self.inject_bytes(&encoded);
    }

    /// Replies to requests of `frame_type`
    pub fn respond_to<F>(&mut self, frame_type: FrameType, mut f: F)
    where
        F: FnMut(&ApiFrame) -> Option<ApiFrame> + 'static,
    {
        self.responders.push(Box::new(move |req: &ApiFrame| {
            if req.frame_type() == Ok(frame_type) {
                f(req)
            } else {
                None
            }
        }));
    }

    /// Answers AT commands with `mnemonic` using the request's frame id
    pub fn respond_to_at(&mut self, mnemonic: [u8; 2], status: u8, data: &[u8]) {
        let data = data.to_vec();
        self.respond_to(FrameType::AtCommand, move |req| match req.data() {
            [id, m0, m1, ..] if [*m0, *m1] == mnemonic => {
                Some(at_response(*id, mnemonic, status, &data))
            }
            _ => None,
        });
    }

    /// Frames decoded from everything written so far
    pub fn sent_frames(&self) -> Vec<ApiFrame> {
        let mut reader = FrameReader::new();
        self.written
            .iter()
            .filter_map(|b| reader.push(*b))
            .map(|res| res.unwrap())
            .collect()
    }

    fn on_written(&mut self, bytes: &[u8]) {
        for b in bytes {
            if let Some(Ok(frame)) = self.tx_reader.push(*b) {
                let reply = self
                    .responders
                    .iter_mut()
                    .rev()
                    .find_map(|responder| responder(&frame));
                if let Some(reply) = reply {
                    self.inject(&reply);
                }
            }
        }
    }
}

impl Transport for MockTransport {
    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), TransportError> {
        self.init_calls.push((baud_rate, String::from(device)));
        match self.init_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.read_calls += 1;
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        self.write_calls += 1;
        if let Some(e) = self.write_error {
            return Err(e);
        }
        let n = self.write_chunk.map_or(buf.len(), |c| c.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        self.on_written(&buf[..n]);
        Ok(n)
    }

    fn millis(&mut self) -> u32 {
        self.now
    }

    fn delay(&mut self, ms: u32) {
        self.delays.push(ms);
        self.now = self.now.wrapping_add(ms);
    }

    fn flush_rx(&mut self) {
        self.rx.clear();
    }
}
