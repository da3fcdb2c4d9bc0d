//! Boot lifecycle stages.

use std::fmt;

/// Where the chip is in its bring-up sequence.
///
/// Stages only ever advance; a failed boot leaves the engine parked on the
/// stage it reached so errors carry context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootStage {
    /// Power-on state, nothing proven about the chip yet.
    #[default]
    Reset,
    /// Bus probe passed and the ready bit answered the wake-up bit.
    ChipAwake,
    /// ROM bootloader released from reset and answering SRAM probes.
    BootloaderRunning,
    /// Download handshake done, keyset verified, signature planted.
    InfoExchanged,
    /// Bootloader ready to consume ring blocks.
    DownloadPending,
    /// Every payload block streamed and the upload declared complete.
    UploadComplete,
    /// Bootloader accepted the image signature.
    AuthOk,
    /// Firmware jumped to and the queue interface live.
    Running,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::Reset => "Reset",
            BootStage::ChipAwake => "ChipAwake",
            BootStage::BootloaderRunning => "BootloaderRunning",
            BootStage::InfoExchanged => "InfoExchanged",
            BootStage::DownloadPending => "DownloadPending",
            BootStage::UploadComplete => "UploadComplete",
            BootStage::AuthOk => "AuthOk",
            BootStage::Running => "Running",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_is_reset() {
        assert_eq!(BootStage::default(), BootStage::Reset);
    }

    #[test]
    fn display_names_match_variants() {
        assert_eq!(BootStage::DownloadPending.to_string(), "DownloadPending");
        assert_eq!(BootStage::Running.to_string(), "Running");
    }
}
