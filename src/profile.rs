//! Extension-profile seam. No concrete profile (motor/IO) lives here, but
//! [`DeviceCore`] and [`ProfileError`] give a leaf profile crate everything
//! it needs without reaching into the arbiter or frame codec directly.

use std::sync::Arc;

use crate::bus::Bus;
use crate::device::Device;
use crate::error::FeldbusError;
use crate::transport::HostStatisticsSnapshot;

/// The handle a profile holds instead of inheriting from [`Device`].
/// Composition over a deep inheritance chain.
pub struct DeviceCore {
    device: Device,
}

impl DeviceCore {
    pub fn new(address: u8, bus: Arc<Bus>) -> Self {
        Self { device: Device::new(address, bus) }
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }

    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.device.stats()
    }

    /// Base-protocol operations a profile needs before laying its own
    /// opcodes on top (info, uptime, storage, …).
    pub fn base(&self) -> &Device {
        &self.device
    }

    /// Send a profile-specific request and read back `expected_len` bytes,
    /// reusing the core's transport (retries, statistics, arbiter) instead
    /// of a profile opening its own connection.
    pub async fn transceive(
        &self,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>, FeldbusError> {
        Ok(self.device.transceive_raw(payload, expected_len).await?.data)
    }

    /// Fire-and-forget variant for profile opcodes with no reply.
    pub async fn transmit(&self, payload: &[u8]) -> Result<(), FeldbusError> {
        self.device.transmit_raw(payload).await
    }
}

/// Open-ended error type leaf profiles extend without touching the core's
/// own [`FeldbusError`] enum, so adding a profile-specific variant never
/// requires recompiling the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error(transparent)]
    Core(#[from] FeldbusError),

    /// Placeholder variant demonstrating the extension point; concrete
    /// profiles add their own alongside this one.
    #[error("profile-specific opcode not recognized by this device")]
    UnknownOpcode,
}
