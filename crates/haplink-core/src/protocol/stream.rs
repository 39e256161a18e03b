//! Channel abstraction the link runs over.
//!
//! The reader thread and the writer side each hold their own handle to the
//! underlying port (via [`CommunicationChannel::try_clone`]), so reads never
//! contend with the write lock.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A bidirectional byte channel to the device.
///
/// Implemented by [`SerialChannel`] for real hardware and by
/// [`DeviceSimulator`](crate::demo::DeviceSimulator) for development and
/// testing without a device attached.
pub trait CommunicationChannel: Read + Write + Send {
    /// Set the per-call timeout for read operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard any bytes already received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Obtain a second handle to the same underlying channel
    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>>;

    /// Number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing [`CommunicationChannel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already-opened serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>> {
        let port_clone = self
            .port
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(SerialChannel::new(port_clone)))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
