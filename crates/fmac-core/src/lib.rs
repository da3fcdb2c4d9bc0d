//! Fmac-Core: host-side driver core for WF200-class Wi-Fi devices.
//!
//! This crate implements the full-MAC host interface protocol: the split
//! frame codec, firmware bootstrap, secure link transport and the typed
//! command set a host uses to run the radio.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Frame codec, register map, message identifiers
//! - **Transport**: Host bus abstraction (word and block access, mock chip)
//! - **Boot**: Power-on bootstrap, bootloader handshake, firmware download
//! - **Secure link**: Session key negotiation and frame encryption
//! - **Driver**: Request/confirmation correlator and indication dispatch
//! - **Commands**: Station, access-point and device-wide request builders
//! - **Events**: Observer pattern for UI decoupling
//! - **Config**: TOML session configuration
//!
//! # Example
//!
//! ```no_run
//! use fmac_core::{DriverConfig, Fmac, MockBus};
//!
//! let config = DriverConfig::load_from_file("fmac.toml").expect("config");
//! let image = config.load_firmware().expect("firmware image");
//! let pds = config.load_pds().expect("pds");
//!
//! let fmac = Fmac::new(MockBus::with_bootloader());
//! fmac.start(&image, &pds).expect("bring-up failed");
//! ```

pub mod boot;
pub mod commands;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod events;
pub mod hif;
pub mod payload;
pub mod protocol;
pub mod securelink;
pub mod transport;

#[cfg(test)]
mod testutil;

// Re-exports for convenience
pub use boot::{BootEngine, BootError, BootStage};
pub use commands::{
    AntennaConfig, ApParameters, ConnectParameters, GpioMode, GpioReadback, MacKeyDestination,
    MgmtFrameProtection, PowerMode, ScanMode, ScanParameters, SecurityMode,
};
pub use config::DriverConfig;
pub use context::{FatalFault, StartupInfo};
pub use driver::Fmac;
pub use error::FmacError;
pub use events::{NullObserver, TracingObserver, WifiEvent, WifiObserver};
pub use payload::{FirmwareImage, FirmwareImageError};
pub use protocol::FrameHeader;
pub use securelink::{MacKey, SecureLinkError, SecureLinkMode};
pub use transport::{BusError, BusTransport, GetMode, MockBus, startup_indication_frame};
