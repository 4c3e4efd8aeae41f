//! Host-side driver for the TURAG-style address-based fieldbus: a
//! half-duplex, serialized protocol over a shared serial link (typically
//! RS-485 at a configurable baud rate).
//!
//! The crate root re-exports the surface a caller needs: frame codec,
//! error taxonomy, bus configuration and arbiter, transport, per-slave
//! device, broadcast locator, binary UUID searcher, and the enumeration
//! driver that ties discovery together. Concrete serial back-ends are
//! external collaborators behind [`SerialBackend`]; only `serialport-backend`
//! ships one.

pub mod backend;
pub mod blocking;
pub mod bus;
pub mod crc;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod frame;
pub mod locator;
pub mod profile;
pub mod search;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::SerialBackend;
pub use blocking::BlockingBus;
pub use bus::{Bus, BusConfig};
pub use device::Device;
pub use enumerate::{enumerate_devices, EnumerationResult};
pub use error::{FeldbusError, Result, TransportReceptionError};
pub use frame::{decode as decode_frame, encode as encode_frame, BROADCAST_ADDRESS, UNICAST_RANGE};
pub use locator::Locator;
pub use profile::{DeviceCore, ProfileError};
pub use search::{BinarySearcher, SearchConfig};
pub use transport::{HostStatisticsSnapshot, Response, Transport, TransmissionMode};
