//! Serial back-end contract — the external collaborator.
//!
//! Concrete implementations live outside the core (a real UART, a USB-CDC
//! bridge, a capture replay file); the core only depends on this trait. Real
//! serial I/O with a hardware timeout is inherently blocking (see
//! [`crate::transport`] for how the async engine bridges to it via
//! `block_in_place`).

/// Raw byte I/O with a per-operation timeout, implemented by whatever owns
/// the physical or virtual serial link.
///
/// Every method reports success via its return value rather than an error
/// type: the core only needs to know whether the operation completed, not
/// why it didn't — classification of failures happens one layer up in
/// [`crate::transport`].
pub trait SerialBackend: Send {
    /// Discard any bytes currently buffered for reading.
    fn clear_input(&mut self) -> bool;

    /// Write `bytes`, blocking until written or until the backend's
    /// configured timeout elapses.
    fn transmit(&mut self, bytes: &[u8]) -> bool;

    /// Write `bytes`, then read exactly `expected_len` bytes within the
    /// backend's configured timeout. A short read returns the partial data
    /// collected so far alongside `false`.
    fn transceive(&mut self, bytes: &[u8], expected_len: usize) -> (Vec<u8>, bool);

    /// Read-only variant of [`transceive`](Self::transceive) used by
    /// `TransmissionMode::ReceiveOnly`.
    fn receive(&mut self, expected_len: usize) -> (Vec<u8>, bool);
}

#[cfg(feature = "serialport-backend")]
pub mod serialport_backend {
    //! Real hardware implementation of [`SerialBackend`] over the
    //! `serialport` crate, feature-gated so the core stays backend-agnostic.

    use super::SerialBackend;
    use std::io::{Read, Write};
    use std::time::Duration;

    /// Wraps a `Box<dyn serialport::SerialPort>` configured with a
    /// per-operation timeout.
    pub struct SerialPortBackend {
        port: Box<dyn serialport::SerialPort>,
    }

    impl SerialPortBackend {
        /// Open `path` at `baud` with the given per-operation `timeout`.
        pub fn open(
            path: &str,
            baud: u32,
            timeout: Duration,
        ) -> Result<Self, serialport::Error> {
            let port = serialport::new(path, baud).timeout(timeout).open()?;
            Ok(Self { port })
        }
    }

    impl SerialBackend for SerialPortBackend {
        fn clear_input(&mut self) -> bool {
            self.port.clear(serialport::ClearBuffer::Input).is_ok()
        }

        fn transmit(&mut self, bytes: &[u8]) -> bool {
            self.port.write_all(bytes).is_ok()
        }

        fn transceive(&mut self, bytes: &[u8], expected_len: usize) -> (Vec<u8>, bool) {
            if !self.transmit(bytes) {
                return (Vec::new(), false);
            }
            self.receive(expected_len)
        }

        fn receive(&mut self, expected_len: usize) -> (Vec<u8>, bool) {
            let mut buf = vec![0u8; expected_len];
            let mut filled = 0;
            while filled < expected_len {
                match self.port.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                    Err(_) => break,
                }
            }
            buf.truncate(filled);
            let ok = filled == expected_len;
            (buf, ok)
        }
    }
}
