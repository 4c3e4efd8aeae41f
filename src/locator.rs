//! Locator — broadcast protocol.
//!
//! Every operation here targets the broadcast address `0x00`. Responses are
//! read through [`Transport::broadcast_receive`] (one attempt, no retries —
//! retrying a broadcast risks a different slave answering the second
//! attempt) except the five "no response at all" operations, which use
//! [`Transport::transmit`] and keep the normal retry policy.

use std::sync::Arc;

use crate::bus::Bus;
use crate::error::FeldbusError;
use crate::frame::BROADCAST_ADDRESS;
use crate::transport::{HostStatisticsSnapshot, Transport};

/// Sub-opcodes under the `0x00` device-info command family.
mod sub_op {
    pub const ADDRESS_OPS: u8 = 0x00;
    pub const ENABLE_NEIGHBOURS: u8 = 0x01;
    pub const DISABLE_NEIGHBOURS: u8 = 0x02;
    pub const RESET_ALL_ADDRESSES: u8 = 0x03;
    pub const REQUEST_BUS_ASSERTION: u8 = 0x04;
    pub const REQUEST_BUS_ASSERTION_UNADDRESSED: u8 = 0x05;
    pub const SLEEP: u8 = 0x06;
}

/// Marker appended after a UUID in an address-op tail.
mod address_op {
    pub const GET: u8 = 0x00;
    pub const SET: u8 = 0x00;
    pub const RESET: u8 = 0x01;
}

/// Serialize `prefix` masked to its low `mask_len` bits, little-endian,
/// using the minimum number of bytes (`ceil(mask_len / 8)`).
pub fn encode_searchaddr(prefix: u32, mask_len: u8) -> Vec<u8> {
    let mask_len = mask_len.min(32);
    let nbytes = mask_len.div_ceil(8) as usize;
    let masked = if mask_len == 32 {
        prefix
    } else {
        prefix & ((1u32 << mask_len) - 1)
    };
    masked.to_le_bytes()[..nbytes].to_vec()
}

/// Broadcast-only operations over a shared bus.
pub struct Locator {
    transport: Transport,
}

impl Locator {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self {
            transport: Transport::new(bus),
        }
    }

    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.transport.stats()
    }

    /// "Who-is-there": addresses the unique unaddressed device; it replies
    /// with its UUID. Fails (ambiguously) if zero or more than one device is
    /// unaddressed and listening.
    pub async fn who_is_there(&self) -> Result<u32, FeldbusError> {
        let payload = [sub_op::ADDRESS_OPS, sub_op::ADDRESS_OPS];
        let resp = self.transport.broadcast_receive(&payload, 4).await?;
        Ok(u32::from_le_bytes(resp.data[..4].try_into().unwrap()))
    }

    pub async fn ping_uuid(&self, uuid: u32) -> Result<(), FeldbusError> {
        let payload = build_uuid_tail(uuid, &[]);
        self.transport.broadcast_receive(&payload, 0).await?;
        Ok(())
    }

    pub async fn get_bus_address(&self, uuid: u32) -> Result<u8, FeldbusError> {
        let payload = build_uuid_tail(uuid, &[address_op::GET]);
        let resp = self.transport.broadcast_receive(&payload, 1).await?;
        Ok(resp.data[0])
    }

    pub async fn set_bus_address(&self, uuid: u32, address: u8) -> Result<(), FeldbusError> {
        let payload = build_uuid_tail(uuid, &[address_op::SET, address]);
        let resp = self.transport.broadcast_receive(&payload, 1).await?;
        if resp.data[0] == 1 {
            Ok(())
        } else {
            Err(FeldbusError::DeviceRejectedBusAddress)
        }
    }

    pub async fn reset_bus_address(&self, uuid: u32) -> Result<(), FeldbusError> {
        let payload = build_uuid_tail(uuid, &[address_op::RESET]);
        self.transport.broadcast_receive(&payload, 0).await?;
        Ok(())
    }

    pub async fn enable_bus_neighbours(&self) -> Result<(), FeldbusError> {
        self.transport
            .transmit(BROADCAST_ADDRESS, &[sub_op::ADDRESS_OPS, sub_op::ENABLE_NEIGHBOURS])
            .await
    }

    pub async fn disable_bus_neighbours(&self) -> Result<(), FeldbusError> {
        self.transport
            .transmit(BROADCAST_ADDRESS, &[sub_op::ADDRESS_OPS, sub_op::DISABLE_NEIGHBOURS])
            .await
    }

    pub async fn reset_all_bus_addresses(&self) -> Result<(), FeldbusError> {
        self.transport
            .transmit(
                BROADCAST_ADDRESS,
                &[sub_op::ADDRESS_OPS, sub_op::RESET_ALL_ADDRESSES],
            )
            .await
    }

    pub async fn sleep(&self) -> Result<(), FeldbusError> {
        self.transport
            .transmit(BROADCAST_ADDRESS, &[sub_op::ADDRESS_OPS, sub_op::SLEEP])
            .await
    }

    /// Bus-assertion probe used by the binary UUID searcher.
    /// `NoAnswer` is reported as `Err(NoAssertionDetected)`; any other
    /// transport error is a positive signal too (handled one layer up, in
    /// [`crate::search`]).
    pub async fn request_bus_assertion(
        &self,
        prefix: u32,
        mask_len: u8,
        only_unaddressed: bool,
    ) -> Result<(), FeldbusError> {
        let op = if only_unaddressed {
            sub_op::REQUEST_BUS_ASSERTION_UNADDRESSED
        } else {
            sub_op::REQUEST_BUS_ASSERTION
        };
        let mask_len = mask_len.min(32);
        let mut payload = vec![sub_op::ADDRESS_OPS, op, mask_len];
        payload.extend(encode_searchaddr(prefix, mask_len));
        self.transport.broadcast_receive(&payload, 0).await?;
        Ok(())
    }

    /// Sequentially ping addresses in `[first, last]`, returning responders.
    /// If `stop_on_missing` is set, stops at the first non-responder so the
    /// returned list is a gap-free prefix of the physical bus order.
    pub async fn scan_bus_addresses(
        &self,
        first: u8,
        last: u8,
        stop_on_missing: bool,
    ) -> Result<Vec<u8>, FeldbusError> {
        if first == 0 || last == 0 || first > last || last > 127 {
            return Err(FeldbusError::InvalidArgument(
                "ScanBusAddresses range must lie within [1, 127]",
            ));
        }
        let mut responders = Vec::new();
        for addr in first..=last {
            match self.transport.transceive(addr, &[], 0).await {
                Ok(_) => responders.push(addr),
                Err(_) if stop_on_missing => break,
                Err(_) => {}
            }
        }
        Ok(responders)
    }
}

fn build_uuid_tail(uuid: u32, extra: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + 4 + extra.len());
    payload.push(sub_op::ADDRESS_OPS);
    payload.push(sub_op::ADDRESS_OPS);
    payload.extend_from_slice(&uuid.to_le_bytes());
    payload.extend_from_slice(extra);
    payload
}
