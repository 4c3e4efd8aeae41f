//! Frame codec.
//!
//! Wire layout: `[address:1] [payload:N] [crc8:1]`. No resync marker — the
//! CRC-8 over address+payload via [`crate::crc`] is the only integrity
//! check.

use crate::crc;
use crate::error::FeldbusError;

/// Broadcast address. Every Locator operation targets this address.
pub const BROADCAST_ADDRESS: u8 = 0x00;

/// Inclusive range of valid unicast addresses.
pub const UNICAST_RANGE: core::ops::RangeInclusive<u8> = 1..=127;

/// Encode `address` and `payload` into a complete frame, appending the CRC-8.
pub fn encode(address: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(address);
    frame.extend_from_slice(payload);
    let crc = crc::crc8(&frame);
    frame.push(crc);
    frame
}

/// Decode a received frame, verifying its checksum.
///
/// Returns the address and a slice of the payload (the address and CRC
/// bytes are stripped).
pub fn decode(frame: &[u8]) -> Result<(u8, &[u8]), FeldbusError> {
    if frame.len() < 2 {
        return Err(FeldbusError::TransportReceptionMissingDataError);
    }
    let (body, crc_byte) = frame.split_at(frame.len() - 1);
    if !crc::verify(body, crc_byte[0]) {
        return Err(FeldbusError::TransportChecksumError);
    }
    Ok((body[0], &body[1..]))
}
