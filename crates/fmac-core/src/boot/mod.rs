//! Boot engine: everything between power-on and a running firmware.

pub mod engine;
pub mod stage;

pub use engine::{BootEngine, BootError};
pub use stage::BootStage;
