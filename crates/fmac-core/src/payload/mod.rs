//! Firmware payload handling.

pub mod firmware;

pub use firmware::{FirmwareImage, FirmwareImageError};
