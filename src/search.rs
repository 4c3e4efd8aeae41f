//! Binary UUID searcher — depth-first traversal over the 32-bit UUID prefix
//! tree, driven by the locator's bus-assertion broadcast.
//!
//! Broadcast collision semantics: the only place "error equals success" is
//! the assertion request, and that mapping is kept inside this module to
//! prevent accidental propagation. [`Locator::request_bus_assertion`] just
//! forwards the transport's classification, and this module alone decides
//! that any error other than `NoAssertionDetected` counts as a match.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::error::FeldbusError;
use crate::locator::Locator;

/// Configuration for one binary-search pass.
#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    /// Minimum time between two consecutive assertion broadcasts, to give
    /// slow devices time to respond. Default 5 ms.
    pub delay_time: Duration,
    /// When set, use sub-opcode `0x05` (only unaddressed devices assert)
    /// instead of `0x04`.
    pub only_unaddressed: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            delay_time: Duration::from_millis(5),
            only_unaddressed: false,
        }
    }
}

/// One pending node of the search: a prefix matched up to `level` bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SearchAddress {
    prefix: u32,
    level: u8,
}

/// Depth-first traversal state over the UUID prefix tree.
pub struct BinarySearcher<'a> {
    locator: &'a Locator,
    config: SearchConfig,
    queue: VecDeque<SearchAddress>,
    last_assertion_at: Option<Instant>,
}

impl<'a> BinarySearcher<'a> {
    pub fn new(locator: &'a Locator, config: SearchConfig) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(SearchAddress { prefix: 0, level: 0 });
        Self {
            locator,
            config,
            queue,
            last_assertion_at: None,
        }
    }

    /// Probe `(prefix, level)` on the bus, throttled by `delay_time`, and
    /// classify the result as a match/no-match.
    async fn probe(&mut self, prefix: u32, level: u8) -> Result<bool, FeldbusError> {
        if let Some(last) = self.last_assertion_at {
            let target = last + self.config.delay_time;
            let now = Instant::now();
            if now < target {
                tokio::time::sleep(target - now).await;
            }
        }
        self.last_assertion_at = Some(Instant::now());

        match self
            .locator
            .request_bus_assertion(prefix, level, self.config.only_unaddressed)
            .await
        {
            Ok(()) => Ok(true),
            Err(FeldbusError::NoAssertionDetected) => Ok(false),
            // Any other transport error is read as a positive match: the
            // collision pulse garbled the read rather than leaving it empty.
            Err(_other) => Ok(true),
        }
    }

    /// Advance the search until the next UUID is discovered or the queue is
    /// drained (`Ok(None)`).
    pub async fn find_next_device(&mut self) -> Result<Option<u32>, FeldbusError> {
        while let Some(SearchAddress { prefix, level }) = self.queue.pop_front() {
            let matched = self.probe(prefix, level).await?;
            debug!("search node prefix={prefix:#010x} level={level} matched={matched}");

            if level == 0 {
                if matched {
                    self.queue.push_front(SearchAddress { prefix: 0, level: 1 });
                }
                continue;
            }

            let left_branch = (prefix >> (level - 1)) & 1 == 0;
            if matched {
                if level < 32 {
                    self.queue.push_front(SearchAddress { prefix, level: level + 1 });
                }
                if left_branch {
                    self.queue.push_back(SearchAddress {
                        prefix: prefix | (1 << (level - 1)),
                        level,
                    });
                }
                if level == 32 {
                    return Ok(Some(prefix));
                }
            } else if left_branch {
                self.queue.push_front(SearchAddress {
                    prefix: prefix | (1 << (level - 1)),
                    level: level + 1,
                });
            }
            // Not matched, right branch: backtrack — nothing to enqueue.
        }
        Ok(None)
    }

    /// Drain the whole search, returning every discovered UUID.
    pub async fn find_all_devices(&mut self) -> Result<Vec<u32>, FeldbusError> {
        let mut found = Vec::new();
        while let Some(uuid) = self.find_next_device().await? {
            found.push(uuid);
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, BusConfig};
    use crate::test_support::FakeFieldbus;
    use std::collections::BTreeSet;

    fn bus_with_uuids(uuids: &[u32]) -> Arc<Bus> {
        let backend = FakeFieldbus::with_uuids(uuids);
        Bus::new(BusConfig::new("mock", 115_200, 50), Box::new(backend))
    }

    async fn find_all(uuids: &[u32]) -> BTreeSet<u32> {
        let bus = bus_with_uuids(uuids);
        let locator = Locator::new(bus);
        let mut searcher = BinarySearcher::new(&locator, SearchConfig::default());
        searcher.find_all_devices().await.unwrap().into_iter().collect()
    }

    #[tokio::test]
    async fn empty_bus_yields_no_devices() {
        assert_eq!(find_all(&[]).await, BTreeSet::new());
    }

    #[tokio::test]
    async fn single_device_is_found() {
        assert_eq!(find_all(&[0x11223344]).await, BTreeSet::from([0x11223344]));
    }

    #[tokio::test]
    async fn scenario_d_two_uuids_differing_in_high_bit() {
        let uuids = [0x00000001u32, 0x80000000u32];
        assert_eq!(find_all(&uuids).await, uuids.into_iter().collect());
    }

    #[tokio::test]
    async fn many_devices_all_recovered() {
        let uuids = [0x1, 0x2, 0x3, 0xFFFF_FFFFu32, 0x8000_0001, 0x7FFF_FFFF];
        assert_eq!(find_all(&uuids).await, uuids.into_iter().collect());
    }

    #[tokio::test]
    async fn adversarial_uuids_sharing_every_prefix_but_top_bit() {
        let uuids = [0x0000_0001u32, 0x8000_0001u32];
        assert_eq!(find_all(&uuids).await, uuids.into_iter().collect());
    }
}
