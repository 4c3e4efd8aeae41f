//! Error taxonomy surfaced at the public boundary.

use thiserror::Error;

/// The single error enumeration the core surfaces to callers.
///
/// `Success` has no variant here — it is represented by `Ok(())`/`Ok(value)`.
/// `NoAssertionDetected` is a search *signal*, not a failure in the usual
/// sense, but it still travels through the `Result` channel at the transport
/// boundary (see [`crate::search`] for how the binary searcher interprets
/// it alongside the other transport variants).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeldbusError {
    /// Unknown failure; should not occur in steady-state operation.
    #[error("unspecified driver failure")]
    Unspecified,

    /// Caller-side misuse: bad argument, bad range, conflicting flags.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The device returned a "not implemented" status for an opcode.
    #[error("device does not support the requested operation")]
    NotSupported,

    /// Full response received, but the trailing CRC byte didn't match.
    #[error("checksum mismatch in received frame")]
    TransportChecksumError,

    /// Zero bytes came back before the per-operation timeout elapsed.
    #[error("no answer from device")]
    TransportReceptionNoAnswerError,

    /// Fewer bytes than expected came back before the timeout elapsed.
    #[error("incomplete response from device")]
    TransportReceptionMissingDataError,

    /// The backend reported the write itself failed.
    #[error("failed to transmit frame")]
    TransportTransmissionError,

    /// An operation was attempted on a `Device` before its info was fetched.
    #[error("device info has not been retrieved yet")]
    DeviceNotInitialized,

    /// `DeviceInfo` indicated the statistics opcode is unsupported.
    #[error("device does not support packet statistics")]
    DeviceStatisticsNotSupported,

    /// `uptime_frequency == 0` in `DeviceInfo`.
    #[error("device does not support the uptime counter")]
    DeviceUptimeNotSupported,

    /// `SetBusAddress` got `ack == 0` back.
    #[error("device rejected the requested bus address")]
    DeviceRejectedBusAddress,

    /// A static-storage offset/length violated page alignment or bounds.
    #[error("static storage address or size out of range")]
    DeviceStaticStorageAddressSizeError,

    /// A static-storage write failed on-device for reasons other than
    /// alignment (status byte not in `{0, 1}`).
    #[error("static storage write failed")]
    DeviceStaticStorageWriteError,

    /// A broadcast bus-assertion probe came back with no answer — read by
    /// [`crate::search`] as "zero slaves matched", not a failure.
    #[error("no device asserted the bus for this probe")]
    NoAssertionDetected,
}

/// Alias for [`FeldbusError::TransportReceptionNoAnswerError`], under the
/// shorter name some callers expect.
#[allow(non_upper_case_globals)]
pub const TransportReceptionError: FeldbusError = FeldbusError::TransportReceptionNoAnswerError;

pub type Result<T> = core::result::Result<T, FeldbusError>;
