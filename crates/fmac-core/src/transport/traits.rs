//! Bus transport abstraction.
//!
//! The driver core never talks to SPI or SDIO directly. Everything it needs
//! from the host platform is expressed through [`BusTransport`]: word-sized
//! register access, length-prefixed block transfers, and a handful of
//! out-of-band controls (interrupt gating, reset and wake-up lines). Platform
//! ports implement this trait once; the rest of the crate is bus-agnostic.

use std::io;

use thiserror::Error;

use crate::protocol::Register;

/// Errors surfaced by a bus transport implementation.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to read register {register}: {message}")]
    ReadFailed { register: Register, message: String },

    #[error("failed to write register {register}: {message}")]
    WriteFailed { register: Register, message: String },

    #[error("block transfer failed: {0}")]
    TransferFailed(String),

    #[error("bus operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("device is not responding")]
    NotResponding,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Host-side bus access to the radio chip.
///
/// Implementations must be safe to share between the command path and the
/// receive pump, which run on different threads. All methods take `&self`;
/// serialization of individual bus transfers is the implementation's
/// responsibility.
pub trait BusTransport: Send + Sync {
    /// Reads a 16-bit register.
    fn read_u16(&self, register: Register) -> Result<u16, BusError>;

    /// Writes a 16-bit register.
    fn write_u16(&self, register: Register, value: u16) -> Result<(), BusError>;

    /// Reads a 32-bit register.
    fn read_u32(&self, register: Register) -> Result<u32, BusError>;

    /// Writes a 32-bit register.
    fn write_u32(&self, register: Register, value: u32) -> Result<(), BusError>;

    /// Reads `length` bytes from a block-capable register.
    ///
    /// Used for draining the inbound queue and for indirect memory reads.
    fn read_block(&self, register: Register, length: usize) -> Result<Vec<u8>, BusError>;

    /// Writes a block of bytes to a block-capable register.
    ///
    /// Used for outbound frames and for indirect memory writes.
    fn write_block(&self, register: Register, data: &[u8]) -> Result<(), BusError>;

    /// Unmasks the chip-to-host interrupt.
    fn enable_interrupt(&self) -> Result<(), BusError>;

    /// Masks the chip-to-host interrupt.
    fn disable_interrupt(&self) -> Result<(), BusError>;

    /// Switches the bus to its high-speed mode, when the platform has one.
    ///
    /// Transports without a speed switch keep the default no-op.
    fn set_high_speed(&self) -> Result<(), BusError> {
        Ok(())
    }

    /// Pulses the chip's hardware reset line.
    fn reset_chip(&self) -> Result<(), BusError>;

    /// Drives the wake-up pin high or low.
    fn set_wake_pin(&self, high: bool) -> Result<(), BusError>;

    /// Reads the control register.
    fn read_control(&self) -> Result<u16, BusError> {
        self.read_u16(Register::Control)
    }
}
