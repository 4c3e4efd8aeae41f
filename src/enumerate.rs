//! Enumeration driver — assigns contiguous bus addresses starting at 1,
//! combining the locator and binary searcher with automatic fallback from
//! sequential to binary discovery.

use log::info;

use crate::error::FeldbusError;
use crate::locator::Locator;
use crate::search::{BinarySearcher, SearchConfig};

/// Outcome of [`enumerate_devices`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumerationResult {
    /// UUIDs in the order addresses were assigned (1, 2, 3, …).
    pub uuids: Vec<u32>,
    /// `true` when the order mirrors physical bus topology (sequential
    /// discovery only); `false` once any binary-search fallback contributed
    /// addresses, since that path has no notion of neighbor order.
    pub order_known: bool,
}

/// Assign bus addresses to every device on the bus.
///
/// - `use_seq`: try sequential (neighbor-chaining) discovery first.
/// - `use_bin`: fall back to (or exclusively use) binary UUID search.
///
/// At least one of `use_seq`/`use_bin` must be set.
pub async fn enumerate_devices(
    locator: &Locator,
    search_config: SearchConfig,
    use_seq: bool,
    use_bin: bool,
) -> Result<EnumerationResult, FeldbusError> {
    if !use_seq && !use_bin {
        return Err(FeldbusError::InvalidArgument(
            "at least one of use_seq/use_bin must be set",
        ));
    }

    locator.reset_all_bus_addresses().await?;
    let mut result = EnumerationResult { uuids: Vec::new(), order_known: true };

    if !use_seq {
        let mut searcher = BinarySearcher::new(locator, search_config);
        let uuids = searcher.find_all_devices().await?;
        for (i, &uuid) in uuids.iter().enumerate() {
            locator.set_bus_address(uuid, (i + 1) as u8).await?;
        }
        result.uuids = uuids;
        result.order_known = false;
        return Ok(result);
    }

    locator.disable_bus_neighbours().await?;
    let mut next_address: u8 = 1;

    loop {
        match locator.who_is_there().await {
            Ok(uuid) => {
                locator.set_bus_address(uuid, next_address).await?;
                info!("enumerate: assigned address {next_address} to uuid {uuid:#010x}");
                result.uuids.push(uuid);
                next_address += 1;
                locator.enable_bus_neighbours().await?;
            }
            Err(_) if use_bin => {
                let mut unaddressed_config = search_config;
                unaddressed_config.only_unaddressed = true;
                let mut searcher = BinarySearcher::new(locator, unaddressed_config);
                let uuids = searcher.find_all_devices().await?;
                if uuids.is_empty() {
                    return Ok(result);
                }
                info!(
                    "enumerate: sequential discovery stalled, binary search recovered {} device(s)",
                    uuids.len()
                );
                result.order_known = false;
                for uuid in uuids {
                    locator.set_bus_address(uuid, next_address).await?;
                    result.uuids.push(uuid);
                    next_address += 1;
                }
                // Loop back: more neighbor-capable devices may follow.
            }
            Err(_) => {
                return Ok(result);
            }
        }
    }
}
