//! `DeviceInfo`/`ExtendedInfo`/`PacketStatistics` wire parsing.

use crate::error::FeldbusError;

/// The 11-byte basic info packet every slave answers opcode `0x00` with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub protocol_id: u8,
    pub type_id: u8,
    /// Low 3 bits of the flags byte.
    pub crc_kind: u8,
    /// Bit 7 of the flags byte.
    pub statistics_available: bool,
    /// Ticks per second of the uptime counter; `0` means unsupported.
    pub uptime_frequency: u16,
    pub variant: DeviceInfoVariant,
}

/// The tail 6 bytes of [`DeviceInfo`], shaped by the flags byte's bit 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceInfoVariant {
    /// Bit 3 clear: name/version are fetched as separate legacy reads.
    Legacy {
        buffer_size: u16,
        name_length: u8,
        version_length: u8,
    },
    /// Bit 3 set: name/version/buffer_size come back in one extended read,
    /// and the UUID ships inline instead of needing an auxiliary request.
    Extended {
        extended_info_length: u16,
        uuid: u32,
    },
}

impl DeviceInfo {
    /// Parse the 11-byte basic info packet.
    pub fn parse(bytes: &[u8]) -> Result<Self, FeldbusError> {
        if bytes.len() != 11 {
            return Err(FeldbusError::TransportReceptionMissingDataError);
        }
        let flags = bytes[2];
        let crc_kind = flags & 0b0000_0111;
        let packet_format_flag = flags & 0b0000_1000 != 0;
        let statistics_available = flags & 0b1000_0000 != 0;
        let uptime_frequency = u16::from_le_bytes([bytes[3], bytes[4]]);

        let variant = if packet_format_flag {
            DeviceInfoVariant::Extended {
                extended_info_length: u16::from_le_bytes([bytes[5], bytes[6]]),
                uuid: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
            }
        } else {
            DeviceInfoVariant::Legacy {
                buffer_size: u16::from_le_bytes([bytes[5], bytes[6]]),
                // bytes[7..9] reserved
                name_length: bytes[9],
                version_length: bytes[10],
            }
        };

        Ok(Self {
            protocol_id: bytes[0],
            type_id: bytes[1],
            crc_kind,
            statistics_available,
            uptime_frequency,
            variant,
        })
    }
}

/// Device name/version and the slave's largest acceptable frame, populated
/// at most once on demand and cached thereafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedInfo {
    pub device_name: String,
    pub version: String,
    pub buffer_size: u16,
}

impl ExtendedInfo {
    /// Parse the extended-layout info block: one read of
    /// `extended_info_length` bytes containing `reserved:u8, name_len:u8,
    /// version_len:u8, buffer_size:u16, name[], version[]`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FeldbusError> {
        if bytes.len() < 5 {
            return Err(FeldbusError::TransportReceptionMissingDataError);
        }
        let name_len = bytes[1] as usize;
        let version_len = bytes[2] as usize;
        let buffer_size = u16::from_le_bytes([bytes[3], bytes[4]]);
        let tail = &bytes[5..];
        if tail.len() < name_len + version_len {
            return Err(FeldbusError::TransportReceptionMissingDataError);
        }
        let device_name = String::from_utf8(tail[..name_len].to_vec())
            .map_err(|_| FeldbusError::Unspecified)?;
        let version = String::from_utf8(tail[name_len..name_len + version_len].to_vec())
            .map_err(|_| FeldbusError::Unspecified)?;
        Ok(Self { device_name, version, buffer_size })
    }
}

/// Slave-side packet counters, as reported by the device itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketStatistics {
    pub correct: u32,
    pub buffer_overflow: u32,
    pub lost: u32,
    pub checksum_error: u32,
}

impl PacketStatistics {
    pub fn parse(bytes: &[u8]) -> Result<Self, FeldbusError> {
        if bytes.len() != 16 {
            return Err(FeldbusError::TransportReceptionMissingDataError);
        }
        let word = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Ok(Self {
            correct: word(0),
            buffer_overflow: word(1),
            lost: word(2),
            checksum_error: word(3),
        })
    }
}
