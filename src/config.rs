/// How [crate::Device::connect] waits for the network
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ConnectMode {
    /// loop internally until attached/joined or the attempt budget is spent
    Blocking,
    /// make a single attempt per call, returning [crate::Error::WouldBlock] while not yet
    /// connected; the caller drives the attempts and their pacing, the retry delay is not
    /// slept in this mode
    NonBlocking,
}

/// Driver timing and retry settings. All durations are milliseconds measured with
/// [crate::Transport::millis].
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct Config {
    /// budget for reading the rest of a frame once its delimiter has been seen
    pub read_timeout_ms: u32,
    /// budget for pushing one frame into the transport
    pub write_timeout_ms: u32,
    /// how long a single `process` tick may wait for a frame, 0 polls once
    pub process_timeout_ms: u32,
    pub at_response_timeout_ms: u32,
    pub socket_timeout_ms: u32,
    pub tx_status_timeout_ms: u32,
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u32,
    pub connect_mode: ConnectMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            read_timeout_ms: 2000,
            write_timeout_ms: 10,
            process_timeout_ms: 0,
            at_response_timeout_ms: 5000,
            socket_timeout_ms: 5000,
            tx_status_timeout_ms: 5000,
            connect_attempts: 20,
            connect_retry_delay_ms: 1000,
            connect_mode: ConnectMode::Blocking,
        }
    }
}
