//! Transport engine.
//!
//! Builds frames, drives the arbiter, retries, classifies failures, and
//! tracks per-caller `HostStatistics`. Every `Device` and `Locator` owns one
//! `Transport` over a shared [`Bus`].

use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::bus::{Bus, BusGuard};
use crate::error::FeldbusError;
use crate::frame;

/// Maximum attempts per logical transceive/transmit call.
const MAX_ATTEMPTS: u32 = 3;

/// How a transport operation should interact with the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    /// Write the request, then read the response. The default.
    #[default]
    Normal,
    /// Write only; pretend the response arrived.
    TransmitOnly,
    /// Skip the write; read as usual. Used for offline capture replay.
    ReceiveOnly,
}

/// The bytes a slave sent back, with the address and CRC already stripped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
}

impl Deref for Response {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

/// Host-view packet counters, monotonically non-decreasing.
#[derive(Default)]
pub struct HostStatistics {
    checksum_errors: AtomicU32,
    no_answer: AtomicU32,
    missing_data: AtomicU32,
    transmit_errors: AtomicU32,
    successes: AtomicU32,
}

/// Plain-value view of [`HostStatistics`] (Design Note 3: a snapshot, not a
/// back-reference to the owning `Device`/`Locator`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostStatisticsSnapshot {
    pub checksum_errors: u32,
    pub no_answer: u32,
    pub missing_data: u32,
    pub transmit_errors: u32,
    pub successes: u32,
}

impl HostStatistics {
    pub fn snapshot(&self) -> HostStatisticsSnapshot {
        HostStatisticsSnapshot {
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            no_answer: self.no_answer.load(Ordering::Relaxed),
            missing_data: self.missing_data.load(Ordering::Relaxed),
            transmit_errors: self.transmit_errors.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, outcome: &FeldbusError) {
        let counter = match outcome {
            FeldbusError::TransportChecksumError => &self.checksum_errors,
            FeldbusError::TransportReceptionNoAnswerError => &self.no_answer,
            FeldbusError::TransportReceptionMissingDataError => &self.missing_data,
            FeldbusError::TransportTransmissionError => &self.transmit_errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn bump_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }
}

/// One caller's view of the shared bus: builds frames, retries, and keeps
/// its own [`HostStatistics`].
pub struct Transport {
    bus: Arc<Bus>,
    mode: std::sync::Mutex<TransmissionMode>,
    stats: HostStatistics,
}

/// Raw classification of one attempt's backend result, before it's turned
/// into a `Result`.
enum RawOutcome {
    Success(Vec<u8>),
    ChecksumBad,
    NoAnswer,
    Partial,
    TransmitFailed,
}

impl Transport {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self {
            bus,
            mode: std::sync::Mutex::new(TransmissionMode::default()),
            stats: HostStatistics::default(),
        }
    }

    pub fn stats(&self) -> HostStatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn set_mode(&self, mode: TransmissionMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn mode(&self) -> TransmissionMode {
        *self.mode.lock().unwrap()
    }

    /// One attempt's worth of wire I/O over an already-acquired guard. The
    /// caller holds the same guard across the whole attempt-triplet so
    /// retries stay atomic with respect to other callers on the bus.
    async fn attempt(
        &self,
        guard: &mut BusGuard<'_>,
        wire_frame: &[u8],
        expected_len: usize,
    ) -> RawOutcome {
        let mode = self.mode();
        let frame_owned = wire_frame.to_vec();

        tokio::task::block_in_place(|| {
            let backend = guard.backend();
            if !backend.clear_input() {
                return RawOutcome::TransmitFailed;
            }
            match mode {
                TransmissionMode::Normal => {
                    let (data, ok) = backend.transceive(&frame_owned, expected_len + 2);
                    classify(data, ok, expected_len + 2)
                }
                TransmissionMode::TransmitOnly => {
                    if backend.transmit(&frame_owned) {
                        RawOutcome::Success(vec![0u8; expected_len])
                    } else {
                        RawOutcome::TransmitFailed
                    }
                }
                TransmissionMode::ReceiveOnly => {
                    let (data, ok) = backend.receive(expected_len + 2);
                    classify(data, ok, expected_len + 2)
                }
            }
        })
    }

    /// Write `payload` to `address` and read back `expected_len` bytes of
    /// payload, retrying up to [`MAX_ATTEMPTS`] times.
    pub async fn transceive(
        &self,
        address: u8,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Response, FeldbusError> {
        let wire_frame = frame::encode(address, payload);
        let is_broadcast = address == frame::BROADCAST_ADDRESS;
        let mut last_err = FeldbusError::Unspecified;
        let mut result = None;

        // One guard held across every attempt in the triplet: retries and
        // the inter-packet quiet time stay atomic with respect to other
        // callers on this bus.
        let mut guard = self.bus.acquire(address).await;

        for attempt_no in 1..=MAX_ATTEMPTS {
            trace!("transceive addr={address} attempt={attempt_no} frame={wire_frame:?}");
            match self.attempt(&mut guard, &wire_frame, expected_len).await {
                RawOutcome::Success(raw) => {
                    if matches!(self.mode(), TransmissionMode::TransmitOnly) {
                        self.stats.bump_success();
                        result = Some(Ok(Response { data: raw }));
                        break;
                    }
                    match frame::decode(&raw) {
                        Ok((_resp_addr, resp_payload)) => {
                            self.stats.bump_success();
                            result = Some(Ok(Response { data: resp_payload.to_vec() }));
                            break;
                        }
                        Err(e) => {
                            last_err = e;
                            self.stats.bump(&e);
                        }
                    }
                }
                RawOutcome::ChecksumBad => {
                    last_err = FeldbusError::TransportChecksumError;
                    self.stats.bump(&last_err);
                }
                RawOutcome::NoAnswer => {
                    last_err = FeldbusError::TransportReceptionNoAnswerError;
                    self.stats.bump(&last_err);
                }
                RawOutcome::Partial => {
                    last_err = FeldbusError::TransportReceptionMissingDataError;
                    self.stats.bump(&last_err);
                }
                RawOutcome::TransmitFailed => {
                    last_err = FeldbusError::TransportTransmissionError;
                    self.stats.bump(&last_err);
                }
            }
            if attempt_no < MAX_ATTEMPTS {
                warn!("transceive addr={address} attempt={attempt_no} failed: {last_err}, retrying");
            }
        }
        guard.finish(address, wire_frame.len(), is_broadcast);

        match result {
            Some(r) => r,
            None => {
                debug!("transceive addr={address} exhausted {MAX_ATTEMPTS} attempts: {last_err}");
                Err(last_err)
            }
        }
    }

    /// Fire-and-forget write: no response expected, no retries beyond the
    /// normal policy (classification still applies to the write itself).
    pub async fn transmit(&self, address: u8, payload: &[u8]) -> Result<(), FeldbusError> {
        let wire_frame = frame::encode(address, payload);
        let is_broadcast = address == frame::BROADCAST_ADDRESS;
        let mut last_err = FeldbusError::Unspecified;
        let mut success = false;

        let mut guard = self.bus.acquire(address).await;

        for attempt_no in 1..=MAX_ATTEMPTS {
            let ok = tokio::task::block_in_place(|| {
                let backend = guard.backend();
                backend.clear_input();
                backend.transmit(&wire_frame)
            });

            if ok {
                self.stats.bump_success();
                success = true;
                break;
            }
            last_err = FeldbusError::TransportTransmissionError;
            self.stats.bump(&last_err);
            if attempt_no < MAX_ATTEMPTS {
                warn!("transmit addr={address} attempt={attempt_no} failed, retrying");
            }
        }
        guard.finish(address, wire_frame.len(), is_broadcast);

        if success {
            Ok(())
        } else {
            Err(last_err)
        }
    }

    /// Broadcast-receive used only by address assignment and bus-assertion
    /// search: address is always `0x00`, exactly one attempt, no retries.
    /// "No answer" maps to [`FeldbusError::NoAssertionDetected`] — a positive
    /// "zero slaves matched" signal, not a failure.
    pub async fn broadcast_receive(
        &self,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Response, FeldbusError> {
        let wire_frame = frame::encode(frame::BROADCAST_ADDRESS, payload);
        let mut guard = self.bus.acquire(frame::BROADCAST_ADDRESS).await;
        let raw = self.attempt(&mut guard, &wire_frame, expected_len).await;
        guard.finish(frame::BROADCAST_ADDRESS, wire_frame.len(), true);

        match raw {
            RawOutcome::Success(raw) => match frame::decode(&raw) {
                Ok((_addr, resp_payload)) => {
                    self.stats.bump_success();
                    Ok(Response { data: resp_payload.to_vec() })
                }
                Err(e) => {
                    self.stats.bump(&e);
                    Err(e)
                }
            },
            RawOutcome::ChecksumBad => {
                self.stats.bump(&FeldbusError::TransportChecksumError);
                Err(FeldbusError::TransportChecksumError)
            }
            RawOutcome::NoAnswer => {
                self.stats.bump(&FeldbusError::TransportReceptionNoAnswerError);
                Err(FeldbusError::NoAssertionDetected)
            }
            RawOutcome::Partial => {
                self.stats.bump(&FeldbusError::TransportReceptionMissingDataError);
                Err(FeldbusError::TransportReceptionMissingDataError)
            }
            RawOutcome::TransmitFailed => {
                self.stats.bump(&FeldbusError::TransportTransmissionError);
                Err(FeldbusError::TransportTransmissionError)
            }
        }
    }
}

fn classify(data: Vec<u8>, ok: bool, expected_total: usize) -> RawOutcome {
    if ok && data.len() == expected_total {
        RawOutcome::Success(data)
    } else if data.is_empty() {
        RawOutcome::NoAnswer
    } else {
        RawOutcome::Partial
    }
}
