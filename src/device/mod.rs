//! Device base — generic protocol.
//!
//! Per-slave object over a shared [`Transport`]: basic/extended info, packet
//! statistics, uptime, and the static-storage opcodes.

pub mod info;
pub mod storage;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bus::Bus;
use crate::error::FeldbusError;
use crate::transport::{HostStatisticsSnapshot, Response, Transport};
use info::{DeviceInfo, DeviceInfoVariant, ExtendedInfo, PacketStatistics};

mod opcode {
    pub const INFO: u8 = 0x00;
    pub const UPTIME: u8 = 0x01;
    pub const VERSION_LEGACY: u8 = 0x02;
    pub const NAME_LEGACY: u8 = 0x00;
    pub const STATISTICS: u8 = 0x07;
    pub const UUID_LEGACY: u8 = 0x09;
    pub const EXTENDED_INFO: u8 = 0x0A;
    pub const STORAGE_CAPACITY: u8 = 0x0B;
    pub const STORAGE_READ: u8 = 0x0C;
    pub const STORAGE_WRITE: u8 = 0x0D;
}

/// A sum type in place of "info may be null before init": operations
/// declare their required minimum state and fail with `DeviceNotInitialized`
/// otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    BasicKnown(DeviceInfo),
    ExtendedKnown(DeviceInfo, ExtendedInfo),
}

impl DeviceState {
    fn info(&self) -> Option<&DeviceInfo> {
        match self {
            DeviceState::Uninitialized => None,
            DeviceState::BasicKnown(info) => Some(info),
            DeviceState::ExtendedKnown(info, _) => Some(info),
        }
    }
}

/// A single slave on the bus, addressed by its currently-assigned unicast
/// address (`1..=127`).
pub struct Device {
    address: u8,
    transport: Transport,
    state: Mutex<DeviceState>,
}

impl Device {
    pub fn new(address: u8, bus: Arc<Bus>) -> Self {
        Self {
            address,
            transport: Transport::new(bus),
            state: Mutex::new(DeviceState::Uninitialized),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.transport.stats()
    }

    /// Cached info, if it has been fetched; does not touch the wire.
    pub fn info(&self) -> Option<DeviceInfo> {
        self.state.lock().unwrap().info().copied()
    }

    /// Shortest valid frame on the wire — a liveness check.
    pub async fn ping(&self) -> Result<(), FeldbusError> {
        self.transport.transceive(self.address, &[], 0).await?;
        Ok(())
    }

    /// Fetch the basic info packet once; subsequent calls return the cached
    /// value without touching the wire.
    pub async fn fetch_info(&self) -> Result<DeviceInfo, FeldbusError> {
        if let Some(info) = self.info() {
            return Ok(info);
        }
        let resp = self.transport.transceive(self.address, &[opcode::INFO], 11).await?;
        let info = DeviceInfo::parse(&resp.data)?;
        *self.state.lock().unwrap() = DeviceState::BasicKnown(info);
        Ok(info)
    }

    /// Fetch device name + version + buffer size once; subsequent calls
    /// return the cached value.
    pub async fn fetch_extended_info(&self) -> Result<ExtendedInfo, FeldbusError> {
        {
            let state = self.state.lock().unwrap();
            match &*state {
                DeviceState::ExtendedKnown(_, extended) => return Ok(extended.clone()),
                DeviceState::Uninitialized => return Err(FeldbusError::DeviceNotInitialized),
                DeviceState::BasicKnown(_) => {}
            }
        }
        let info = self.info().ok_or(FeldbusError::DeviceNotInitialized)?;
        let extended = match info.variant {
            DeviceInfoVariant::Legacy { buffer_size, name_length, version_length } => {
                let name_resp = self
                    .transport
                    .transceive(self.address, &[opcode::INFO, opcode::NAME_LEGACY], name_length as usize)
                    .await?;
                let version_resp = self
                    .transport
                    .transceive(self.address, &[opcode::INFO, opcode::VERSION_LEGACY], version_length as usize)
                    .await?;
                ExtendedInfo {
                    device_name: String::from_utf8(name_resp.data)
                        .map_err(|_| FeldbusError::Unspecified)?,
                    version: String::from_utf8(version_resp.data)
                        .map_err(|_| FeldbusError::Unspecified)?,
                    buffer_size,
                }
            }
            DeviceInfoVariant::Extended { extended_info_length, .. } => {
                let resp = self
                    .transport
                    .transceive(self.address, &[opcode::INFO, opcode::EXTENDED_INFO], extended_info_length as usize)
                    .await?;
                ExtendedInfo::parse(&resp.data)?
            }
        };
        *self.state.lock().unwrap() = DeviceState::ExtendedKnown(info, extended.clone());
        Ok(extended)
    }

    /// UUID as a single value regardless of packet layout: extended devices
    /// ship it inline, legacy devices need an auxiliary request whose
    /// failure is reported as `0` rather than erroring.
    pub async fn uuid(&self) -> Result<u32, FeldbusError> {
        let info = self.info().ok_or(FeldbusError::DeviceNotInitialized)?;
        match info.variant {
            DeviceInfoVariant::Extended { uuid, .. } => Ok(uuid),
            DeviceInfoVariant::Legacy { .. } => {
                match self
                    .transport
                    .transceive(self.address, &[opcode::INFO, opcode::UUID_LEGACY], 4)
                    .await
                {
                    Ok(resp) => Ok(u32::from_le_bytes(resp.data[..4].try_into().unwrap())),
                    Err(_) => Ok(0),
                }
            }
        }
    }

    /// Uptime as a `Duration`, computed from `ticks / uptime_frequency`.
    pub async fn uptime(&self) -> Result<Duration, FeldbusError> {
        let info = self.info().ok_or(FeldbusError::DeviceNotInitialized)?;
        if info.uptime_frequency == 0 {
            return Err(FeldbusError::DeviceUptimeNotSupported);
        }
        let resp = self.transport.transceive(self.address, &[opcode::INFO, opcode::UPTIME], 4).await?;
        let ticks = u32::from_le_bytes(resp.data[..4].try_into().unwrap());
        Ok(Duration::from_secs_f64(ticks as f64 / info.uptime_frequency as f64))
    }

    pub async fn statistics(&self) -> Result<PacketStatistics, FeldbusError> {
        let info = self.info().ok_or(FeldbusError::DeviceNotInitialized)?;
        if !info.statistics_available {
            return Err(FeldbusError::DeviceStatisticsNotSupported);
        }
        let resp = self.transport.transceive(self.address, &[opcode::INFO, opcode::STATISTICS], 16).await?;
        PacketStatistics::parse(&resp.data)
    }

    /// Raw transceive over this device's address, for extension profiles
    /// that lay their own opcodes on top of the base protocol without
    /// reaching into the transport directly.
    pub async fn transceive_raw(&self, payload: &[u8], expected_len: usize) -> Result<Response, FeldbusError> {
        self.transport.transceive(self.address, payload, expected_len).await
    }

    /// Fire-and-forget variant of [`Self::transceive_raw`].
    pub async fn transmit_raw(&self, payload: &[u8]) -> Result<(), FeldbusError> {
        self.transport.transmit(self.address, payload).await
    }

    /// Static-storage capacity and page size.
    pub(crate) async fn storage_capacity(&self) -> Result<(u32, u16), FeldbusError> {
        let resp = self.transport.transceive(self.address, &[opcode::INFO, opcode::STORAGE_CAPACITY], 6).await?;
        let capacity = u32::from_le_bytes(resp.data[..4].try_into().unwrap());
        let page_size = u16::from_le_bytes(resp.data[4..6].try_into().unwrap());
        Ok((capacity, page_size))
    }

    pub(crate) async fn storage_read(&self, offset: u32, len: u16) -> Result<Vec<u8>, FeldbusError> {
        let mut payload = vec![opcode::INFO, opcode::STORAGE_READ];
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&len.to_le_bytes());
        let resp = self.transport.transceive(self.address, &payload, 1 + len as usize).await?;
        match resp.data[0] {
            0 => Ok(resp.data[1..].to_vec()),
            1 => Err(FeldbusError::DeviceStaticStorageAddressSizeError),
            _ => Err(FeldbusError::DeviceStaticStorageWriteError),
        }
    }

    pub(crate) async fn storage_write(&self, offset: u32, payload: &[u8]) -> Result<(), FeldbusError> {
        let mut wire = vec![opcode::INFO, opcode::STORAGE_WRITE];
        wire.extend_from_slice(&offset.to_le_bytes());
        wire.extend_from_slice(payload);
        let resp = self.transport.transceive(self.address, &wire, 1).await?;
        match resp.data[0] {
            0 => Ok(()),
            1 => Err(FeldbusError::DeviceStaticStorageAddressSizeError),
            _ => Err(FeldbusError::DeviceStaticStorageWriteError),
        }
    }
}
