//! Synchronous façade over the async core.
//!
//! Each handle here owns (or borrows) a dedicated [`tokio::runtime::Runtime`]
//! and drives the same async methods to completion with `block_on`, so no
//! protocol logic is duplicated. The runtime is built with one worker thread
//! rather than the single-threaded flavor: the core's transport path uses
//! `tokio::task::block_in_place` around blocking backend I/O, which panics
//! on a current-thread runtime. A one-worker multi-thread runtime keeps
//! `block_in_place` valid while staying effectively single-threaded.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::bus::{Bus, BusConfig};
use crate::backend::SerialBackend;
use crate::device::info::{DeviceInfo, ExtendedInfo, PacketStatistics};
use crate::device::storage::StaticStorage;
use crate::device::Device;
use crate::error::FeldbusError;
use crate::locator::Locator;
use crate::transport::HostStatisticsSnapshot;

fn dedicated_runtime() -> std::io::Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
}

/// Owns the bus and a dedicated runtime; hands out blocking device/locator
/// handles that borrow both.
pub struct BlockingBus {
    bus: Arc<Bus>,
    rt: Runtime,
}

impl BlockingBus {
    pub fn new(config: BusConfig, backend: Box<dyn SerialBackend + Send>) -> std::io::Result<Self> {
        Ok(Self { bus: Bus::new(config, backend), rt: dedicated_runtime()? })
    }

    pub fn config(&self) -> &BusConfig {
        self.bus.config()
    }

    pub fn device(&self, address: u8) -> BlockingDevice<'_> {
        BlockingDevice { device: Device::new(address, Arc::clone(&self.bus)), rt: &self.rt }
    }

    pub fn locator(&self) -> BlockingLocator<'_> {
        BlockingLocator { locator: Locator::new(Arc::clone(&self.bus)), rt: &self.rt }
    }
}

/// Blocking view of a single slave.
pub struct BlockingDevice<'a> {
    device: Device,
    rt: &'a Runtime,
}

impl<'a> BlockingDevice<'a> {
    pub fn address(&self) -> u8 {
        self.device.address()
    }

    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.device.stats()
    }

    pub fn info(&self) -> Option<DeviceInfo> {
        self.device.info()
    }

    pub fn ping(&self) -> Result<(), FeldbusError> {
        self.rt.block_on(self.device.ping())
    }

    pub fn fetch_info(&self) -> Result<DeviceInfo, FeldbusError> {
        self.rt.block_on(self.device.fetch_info())
    }

    pub fn fetch_extended_info(&self) -> Result<ExtendedInfo, FeldbusError> {
        self.rt.block_on(self.device.fetch_extended_info())
    }

    pub fn uuid(&self) -> Result<u32, FeldbusError> {
        self.rt.block_on(self.device.uuid())
    }

    pub fn uptime(&self) -> Result<Duration, FeldbusError> {
        self.rt.block_on(self.device.uptime())
    }

    pub fn statistics(&self) -> Result<PacketStatistics, FeldbusError> {
        self.rt.block_on(self.device.statistics())
    }

    pub fn transceive_raw(&self, payload: &[u8], expected_len: usize) -> Result<Vec<u8>, FeldbusError> {
        self.rt.block_on(self.device.transceive_raw(payload, expected_len)).map(|r| r.data)
    }

    pub fn transmit_raw(&self, payload: &[u8]) -> Result<(), FeldbusError> {
        self.rt.block_on(self.device.transmit_raw(payload))
    }

    /// Open the static-storage region, as [`crate::device::storage::StaticStorage::open`]
    /// does for the async core.
    pub fn storage(&self, max_write_size: usize) -> Result<BlockingStorage<'_>, FeldbusError> {
        let storage = self.rt.block_on(StaticStorage::open(&self.device, max_write_size))?;
        Ok(BlockingStorage { storage, rt: self.rt })
    }
}

/// Blocking view of a device's static-storage region.
pub struct BlockingStorage<'a> {
    storage: StaticStorage<'a>,
    rt: &'a Runtime,
}

impl<'a> BlockingStorage<'a> {
    pub fn capacity(&self) -> u32 {
        self.storage.capacity()
    }

    pub fn page_size(&self) -> u16 {
        self.storage.page_size()
    }

    pub fn read(&self, offset: u32, len: u16) -> Result<Vec<u8>, FeldbusError> {
        self.rt.block_on(self.storage.read(offset, len))
    }

    pub fn write_page(&self, offset: u32, payload: &[u8]) -> Result<(), FeldbusError> {
        self.rt.block_on(self.storage.write_page(offset, payload))
    }

    pub fn write_string(&self, offset: u32, s: &str) -> Result<(), FeldbusError> {
        self.rt.block_on(self.storage.write_string(offset, s))
    }

    pub fn read_string(
        &self,
        offset: u32,
        chunk_size: usize,
        max_read_size: usize,
    ) -> Result<String, FeldbusError> {
        self.rt.block_on(self.storage.read_string(offset, chunk_size, max_read_size))
    }
}

/// Blocking view of the broadcast locator.
pub struct BlockingLocator<'a> {
    locator: Locator,
    rt: &'a Runtime,
}

impl<'a> BlockingLocator<'a> {
    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.locator.stats()
    }

    pub fn who_is_there(&self) -> Result<u32, FeldbusError> {
        self.rt.block_on(self.locator.who_is_there())
    }

    pub fn ping_uuid(&self, uuid: u32) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.ping_uuid(uuid))
    }

    pub fn get_bus_address(&self, uuid: u32) -> Result<u8, FeldbusError> {
        self.rt.block_on(self.locator.get_bus_address(uuid))
    }

    pub fn set_bus_address(&self, uuid: u32, address: u8) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.set_bus_address(uuid, address))
    }

    pub fn reset_bus_address(&self, uuid: u32) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.reset_bus_address(uuid))
    }

    pub fn enable_bus_neighbours(&self) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.enable_bus_neighbours())
    }

    pub fn disable_bus_neighbours(&self) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.disable_bus_neighbours())
    }

    pub fn reset_all_bus_addresses(&self) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.reset_all_bus_addresses())
    }

    pub fn sleep(&self) -> Result<(), FeldbusError> {
        self.rt.block_on(self.locator.sleep())
    }

    pub fn scan_bus_addresses(
        &self,
        first: u8,
        last: u8,
        stop_on_missing: bool,
    ) -> Result<Vec<u8>, FeldbusError> {
        self.rt.block_on(self.locator.scan_bus_addresses(first, last, stop_on_missing))
    }

    /// Assign bus addresses to every device on the bus, as
    /// [`crate::enumerate::enumerate_devices`] does for the async core.
    pub fn enumerate_devices(
        &self,
        search_config: crate::search::SearchConfig,
        use_seq: bool,
        use_bin: bool,
    ) -> Result<crate::enumerate::EnumerationResult, FeldbusError> {
        self.rt.block_on(crate::enumerate::enumerate_devices(
            &self.locator,
            search_config,
            use_seq,
            use_bin,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;

    #[test]
    fn ping_round_trip_blocks_the_calling_thread() {
        let backend = MockBackend::new().with_slave(5, |_req| Some(vec![]));
        let bus = BlockingBus::new(BusConfig::new("mock", 115_200, 50), Box::new(backend)).unwrap();
        let device = bus.device(5);
        device.ping().unwrap();
        assert_eq!(device.stats().successes, 1);
    }

    #[test]
    fn locator_who_is_there_round_trip() {
        let backend = crate::test_support::FakeFieldbus::with_uuids(&[0x11223344]);
        let bus = BlockingBus::new(BusConfig::new("mock", 115_200, 50), Box::new(backend)).unwrap();
        let locator = bus.locator();
        let uuid = locator.who_is_there().unwrap();
        assert_eq!(uuid, 0x11223344);
    }

    #[test]
    fn storage_write_then_read_string_round_trip() {
        let store = std::sync::Mutex::new(vec![0xFFu8; 256]);
        let backend = MockBackend::new().with_slave(5, move |req| match req[..2] {
            [0x00, 0x0B] => {
                let mut resp = 256u32.to_le_bytes().to_vec();
                resp.extend_from_slice(&16u16.to_le_bytes());
                Some(resp)
            }
            [0x00, 0x0C] => {
                let offset = u32::from_le_bytes(req[2..6].try_into().unwrap());
                let len = u16::from_le_bytes(req[6..8].try_into().unwrap()) as usize;
                let data = store.lock().unwrap();
                let mut resp = vec![0u8];
                resp.extend_from_slice(&data[offset as usize..offset as usize + len]);
                Some(resp)
            }
            [0x00, 0x0D] => {
                let offset = u32::from_le_bytes(req[2..6].try_into().unwrap()) as usize;
                let payload = &req[6..];
                let mut data = store.lock().unwrap();
                data[offset..offset + payload.len()].copy_from_slice(payload);
                Some(vec![0u8])
            }
            _ => None,
        });
        let bus = BlockingBus::new(BusConfig::new("mock", 115_200, 50), Box::new(backend)).unwrap();
        let device = bus.device(5);
        let storage = device.storage(58).unwrap();
        storage.write_string(0, "hello").unwrap();
        assert_eq!(storage.read_string(0, 63, 256).unwrap(), "hello");
    }
}
