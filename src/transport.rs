//! Platform seam
//!
//! The driver never touches hardware directly. Whatever owns the UART and a millisecond clock
//! implements [Transport] and hands it to [crate::XBee]. On a host that is usually a thin
//! wrapper around the `serialport` crate (see `demos/`), on a microcontroller a HAL serial
//! peripheral plus a timer.

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum TransportError {
    /// port could not be opened or configured
    InitFailed,
    Timeout,
    /// receive buffer overflowed and bytes were lost
    Overrun,
    Unknown,
}

pub trait Transport {
    /// Opens and configures the serial line. `device` is a port name on hosted platforms and is
    /// free to be ignored on targets with a fixed UART.
    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), TransportError>;

    /// Reads whatever is available, up to `buf.len()` bytes. Returning `Ok(0)` means nothing
    /// arrived yet; implementations should not block for long.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Writes up to `buf.len()` bytes and returns how many were accepted
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Monotonic millisecond clock. Wrapping is fine, the driver only ever looks at differences.
    fn millis(&mut self) -> u32;

    fn delay(&mut self, ms: u32);

    /// Drops anything sitting in the receive buffer
    fn flush_rx(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn init(&mut self, baud_rate: u32, device: &str) -> Result<(), TransportError> {
        (**self).init(baud_rate, device)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        (**self).write(buf)
    }

    fn millis(&mut self) -> u32 {
        (**self).millis()
    }

    fn delay(&mut self, ms: u32) {
        (**self).delay(ms)
    }

    fn flush_rx(&mut self) {
        (**self).flush_rx()
    }
}
