//! Driver-level error type.
//!
//! Lower layers keep their own error enums (`BusError`, `FrameError`,
//! `BootError`, `SecureLinkError`); everything converges into [`FmacError`]
//! at the driver facade so callers match on one type.

use thiserror::Error;

use crate::boot::BootError;
use crate::payload::FirmwareImageError;
use crate::protocol::FrameError;
use crate::securelink::SecureLinkError;
use crate::transport::BusError;

#[derive(Debug, Error)]
pub enum FmacError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Boot(#[from] BootError),

    #[error(transparent)]
    Image(#[from] FirmwareImageError),

    #[error(transparent)]
    SecureLink(#[from] SecureLinkError),

    /// The command path accepts one request at a time.
    #[error("a command is already waiting for its confirmation")]
    CommandInFlight,

    #[error("no confirmation for request {id:#04X} within {timeout_ms} ms")]
    ConfirmationTimeout { id: u8, timeout_ms: u64 },

    #[error("firmware did not announce itself within {timeout_ms} ms")]
    StartupTimeout { timeout_ms: u64 },

    #[error("driver not started; no firmware is running")]
    NotStarted,

    /// All chip-side receive buffers are in use; retry after a send
    /// confirmation returns a credit.
    #[error("chip is out of receive buffers")]
    OutOfBuffers,

    #[error("chip rejected request {id:#04X}: invalid parameter")]
    InvalidParameter { id: u8 },

    #[error("chip does not implement request {id:#04X}")]
    UnsupportedMessage { id: u8 },

    #[error("request {id:#04X} failed with status {status:#010X}")]
    CommandFailed { id: u8, status: u32 },

    #[error("confirmation for request {id:#04X} too short: {length} bytes")]
    ShortConfirmation { id: u8, length: usize },

    /// OTP fuses hold a key already; only the RAM destination still works.
    #[error("secure link MAC key is already burned")]
    MacKeyAlreadyBurned,

    #[error("SSID of {length} bytes exceeds the 32-byte field")]
    SsidTooLong { length: usize },

    #[error("password of {length} bytes exceeds the 64-byte field")]
    PasswordTooLong { length: usize },

    #[error("{count} directed SSIDs requested, the firmware probes at most 2")]
    TooManyScanSsids { count: usize },

    #[error("{count} offload addresses given, the firmware holds at most 2")]
    TooManyAddresses { count: usize },

    /// A thread panicked while holding the driver state lock.
    #[error("driver state lock poisoned")]
    StatePoisoned,
}
