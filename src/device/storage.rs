//! Static storage paging and the string convenience built on top of it.

use super::Device;
use crate::error::FeldbusError;

/// A page-addressable region on one [`Device`]. Opened once per device
/// instance; `capacity`/`page_size` are queried eagerly at construction.
pub struct StaticStorage<'a> {
    device: &'a Device,
    capacity: u32,
    page_size: u16,
    max_write_size: usize,
}

impl<'a> StaticStorage<'a> {
    /// Open storage on `device`. `max_write_size` is the largest payload
    /// one wire write can carry (typically `buffer_size - 6`, from the
    /// device's [`super::info::ExtendedInfo`] or legacy `DeviceInfo`).
    ///
    /// `max_write_size < page_size` is surfaced eagerly here as
    /// `DeviceStaticStorageAddressSizeError` rather than mid-write: a page
    /// can never fit in one frame, so no write through this handle could
    /// ever succeed.
    pub async fn open(device: &'a Device, max_write_size: usize) -> Result<Self, FeldbusError> {
        let (capacity, page_size) = device.storage_capacity().await?;
        if max_write_size < page_size as usize {
            return Err(FeldbusError::DeviceStaticStorageAddressSizeError);
        }
        Ok(Self { device, capacity, page_size, max_write_size })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Raw read; no alignment requirement (only writes are constrained).
    pub async fn read(&self, offset: u32, len: u16) -> Result<Vec<u8>, FeldbusError> {
        self.device.storage_read(offset, len).await
    }

    /// Write one page-aligned chunk. `payload` may be shorter than a page —
    /// the device erases the remainder — but never longer than
    /// `max_write_size`.
    pub async fn write_page(&self, offset: u32, payload: &[u8]) -> Result<(), FeldbusError> {
        if offset % self.page_size as u32 != 0 {
            return Err(FeldbusError::DeviceStaticStorageAddressSizeError);
        }
        if payload.len() > self.max_write_size {
            return Err(FeldbusError::DeviceStaticStorageAddressSizeError);
        }
        self.device.storage_write(offset, payload).await
    }

    /// NUL-terminate `s`, truncate to `capacity - 1`, and write it as whole
    /// page_size chunks starting at `offset`.
    pub async fn write_string(&self, offset: u32, s: &str) -> Result<(), FeldbusError> {
        let max_len = (self.capacity as usize).saturating_sub(1);
        let mut bytes = s.as_bytes().to_vec();
        bytes.truncate(max_len);
        bytes.push(0);

        let page = self.page_size as usize;
        let padded_len = bytes.len().div_ceil(page) * page;
        bytes.resize(padded_len, 0);

        let mut pos = 0usize;
        while pos < bytes.len() {
            let end = (pos + page).min(bytes.len());
            self.write_page(offset + pos as u32, &bytes[pos..end]).await?;
            pos = end;
        }
        Ok(())
    }

    /// Read chunks of up to `chunk_size` bytes (caller typically passes
    /// `min(256, buffer_size - 1)`) until a NUL terminator is found or
    /// `max_read_size` bytes have been read, then decode as UTF-8.
    pub async fn read_string(
        &self,
        offset: u32,
        chunk_size: usize,
        max_read_size: usize,
    ) -> Result<String, FeldbusError> {
        let mut buf = Vec::new();
        let mut pos = offset;

        while buf.len() < max_read_size {
            let want = chunk_size.min(max_read_size - buf.len());
            let chunk = self.read(pos, want as u16).await?;
            if let Some(nul_idx) = chunk.iter().position(|&b| b == 0) {
                buf.extend_from_slice(&chunk[..nul_idx]);
                return String::from_utf8(buf).map_err(|_| FeldbusError::Unspecified);
            }
            if chunk.is_empty() {
                break;
            }
            let got = chunk.len();
            buf.extend_from_slice(&chunk);
            pos += got as u32;
            if got < want {
                break;
            }
        }
        String::from_utf8(buf).map_err(|_| FeldbusError::Unspecified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, BusConfig};
    use crate::test_support::MockBackend;
    use std::sync::Mutex;

    fn device_with(backend: MockBackend) -> Device {
        let bus = Bus::new(BusConfig::new("mock", 115_200, 50), Box::new(backend));
        Device::new(5, bus)
    }

    #[tokio::test]
    async fn open_rejects_max_write_size_smaller_than_page() {
        let backend = MockBackend::new().with_slave(5, |req| {
            assert_eq!(req, &[0x00, 0x0B]);
            let mut resp = 256u32.to_le_bytes().to_vec();
            resp.extend_from_slice(&16u16.to_le_bytes());
            Some(resp)
        });
        let device = device_with(backend);
        let err = StaticStorage::open(&device, 8).await.unwrap_err();
        assert_eq!(err, FeldbusError::DeviceStaticStorageAddressSizeError);
    }

    #[tokio::test]
    async fn static_storage_string_round_trip() {
        // capacity=256, page_size=16, buffer_size=64.
        let store = Mutex::new(vec![0xFFu8; 256]);
        let backend = MockBackend::new().with_slave(5, move |req| {
            match req[..2] {
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
            }
        });
        let device = device_with(backend);
        let storage = StaticStorage::open(&device, 58).await.unwrap();

        storage.write_string(0, "hello").await.unwrap();
        let got = storage.read_string(0, 63, 256).await.unwrap();
        assert_eq!(got, "hello");
    }

    #[tokio::test]
    async fn write_page_rejects_unaligned_offset() {
        let backend = MockBackend::new().with_slave(5, |req| {
            let mut resp = 256u32.to_le_bytes().to_vec();
            resp.extend_from_slice(&16u16.to_le_bytes());
            let _ = req;
            Some(resp)
        });
        let device = device_with(backend);
        let storage = StaticStorage::open(&device, 58).await.unwrap();
        let err = storage.write_page(3, b"x").await.unwrap_err();
        assert_eq!(err, FeldbusError::DeviceStaticStorageAddressSizeError);
    }
}
