//! Bus arbiter & timing.
//!
//! A single FIFO-fair, async-aware lock per physical bus. The lock guards
//! both the shared [`SerialBackend`] and the inter-packet timing state, so
//! retries and the quiet-time gap stay atomic with respect to other callers.
//! A single owner feeds one physical serial endpoint, guarded by a generic
//! `tokio::sync::Mutex` over an arbitrary backend.

use std::sync::Arc;

use log::trace;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

use crate::backend::SerialBackend;

/// Configuration for one bus instance.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Opaque port identifier (path, device name, …) — meaningful only to
    /// whoever constructs the [`SerialBackend`] implementation.
    pub port: String,
    /// Baud rate; must be positive.
    pub baud: u32,
    /// Per-operation timeout, milliseconds. Passed through to the backend
    /// at construction time; the core never threads a timeout argument into
    /// [`SerialBackend`] calls.
    pub timeout_ms: u32,
    /// Time a slave needs after the last byte of a broadcast before it's
    /// ready for the next transaction. Default 1 ms.
    pub device_processing_time: Duration,
}

impl BusConfig {
    pub fn new(port: impl Into<String>, baud: u32, timeout_ms: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            timeout_ms,
            device_processing_time: Duration::from_millis(1),
        }
    }
}

/// Byte duration on the wire: 8N1 framing, start + stop bit = 10 bits/byte.
fn byte_duration(baud: u32) -> Duration {
    Duration::from_secs_f64(10.0 / baud as f64)
}

/// End-of-packet quiet time: >= 1.5 idle byte-times.
fn quiet_time(baud: u32) -> Duration {
    Duration::from_secs_f64(15.0 / baud as f64)
}

struct BusState {
    backend: Box<dyn SerialBackend + Send>,
    last_target: Option<u8>,
    next_allowed_at: Option<Instant>,
}

/// One physical (or virtual) bus: owns the backend and the arbiter's
/// timing/locking state.
pub struct Bus {
    config: BusConfig,
    state: Mutex<BusState>,
}

/// An acquired, exclusive slot on the bus for one attempt.
///
/// Holding this across an `.await` is fine — the lock is async-aware, so
/// other tasks keep making progress elsewhere.
pub struct BusGuard<'a> {
    guard: MutexGuard<'a, BusState>,
    baud: u32,
    device_processing_time: Duration,
}

impl Bus {
    pub fn new(config: BusConfig, backend: Box<dyn SerialBackend + Send>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BusState {
                backend,
                last_target: None,
                next_allowed_at: None,
            }),
            config,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Acquire exclusive access to the bus for a transaction targeting
    /// `target`. Sleeps out the remaining inter-packet gap first if the
    /// previous transaction addressed a *different* target, holding the
    /// lock across the sleep so the whole gap stays atomic with respect to
    /// other callers — otherwise a waiter could run a full transaction in
    /// the gap and overwrite `last_target`/`next_allowed_at` before the
    /// original caller resumes, silently shortening the enforced gap.
    pub async fn acquire(&self, target: u8) -> BusGuard<'_> {
        let guard = self.state.lock().await;
        if guard.last_target != Some(target) {
            if let Some(deadline) = guard.next_allowed_at {
                let now = Instant::now();
                if now < deadline {
                    let wait = deadline - now;
                    trace!("holding bus lock for inter-packet gap of {wait:?} before addr={target}");
                    tokio::time::sleep(wait).await;
                }
            }
        }
        BusGuard {
            guard,
            baud: self.config.baud,
            device_processing_time: self.config.device_processing_time,
        }
    }
}

impl<'a> BusGuard<'a> {
    pub fn backend(&mut self) -> &mut (dyn SerialBackend + Send) {
        &mut *self.guard.backend
    }

    /// Record that a transaction of `tx_len` bytes to `target` just
    /// completed, computing the required post-gap before the *next*
    /// different-target transaction may begin.
    pub fn finish(mut self, target: u8, tx_len: usize, is_broadcast: bool) {
        let mut gap = byte_duration(self.baud) * tx_len as u32 + quiet_time(self.baud);
        if is_broadcast {
            gap += self.device_processing_time;
        }
        self.guard.last_target = Some(target);
        self.guard.next_allowed_at = Some(Instant::now() + gap);
    }
}
