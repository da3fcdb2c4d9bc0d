//! Chip bring-up: bus probe, wake-up, bootloader start, firmware download.
//!
//! The download protocol is a handshake over a few words in chip SRAM plus a
//! 32 KiB ring the payload is streamed through. The host advances `put`, the
//! bootloader advances `get`, and the host must keep `put - get` at least one
//! block below the ring size. The handshake words walk both sides through
//! info exchange, streaming and signature verification, ending with the jump
//! into the freshly loaded firmware.

use thiserror::Error;

use crate::events::{WifiEvent, WifiObserver};
use crate::hif;
use crate::payload::{FirmwareImage, FirmwareImageError};
use crate::protocol::Register;
use crate::protocol::constants::*;
use crate::protocol::registers::{
    CFG_ACCESS_MODE_BIT, CFG_CPU_CLK_DIS_BIT, CFG_CPU_RESET_BIT, CTRL_WUP_BIT,
    cfg_hardware_revision, cfg_hardware_type, cfg_in_direct_access_mode, ctrl_is_ready,
};
use crate::transport::{BusError, BusTransport};

use super::stage::BootStage;

/// Errors raised during bring-up.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("firmware image error: {0}")]
    Image(#[from] FirmwareImageError),

    #[error("bus probe wrote {wrote:#010X} but read back {read:#010X}")]
    ProbeMismatch { wrote: u32, read: u32 },

    #[error("chip never raised the ready bit after wake-up")]
    WakeupTimeout,

    #[error("chip is not in direct access mode after reset")]
    UnexpectedAccessMode,

    #[error("bootloader did not echo the SRAM probe, read {read:#010X}")]
    BootloaderNotDetected { read: u32 },

    #[error("bootloader never reported status {expected:#010X}")]
    HandshakeTimeout { expected: u32 },

    #[error("firmware is signed for keyset {image:#04X} but the chip carries {chip:#04X}")]
    InvalidKeyset { image: u8, chip: u8 },

    #[error("download ring never drained below the window limit")]
    DownloadTimeout,

    #[error("bootloader left the download state mid-stream, status {status:#010X}")]
    UnexpectedNcpStatus { status: u32 },

    #[error("bootloader rejected the firmware signature")]
    AuthenticationFailed,
}

fn poll_error(err: BusError, on_timeout: BootError) -> BootError {
    match err {
        BusError::Timeout { .. } => on_timeout,
        other => BootError::Bus(other),
    }
}

/// Drives a chip from power-on to a running firmware.
///
/// Borrowed by the driver for the duration of `start`; the engine itself
/// holds no bus state beyond the stage it has reached.
pub struct BootEngine<'a, B: BusTransport, O: WifiObserver> {
    bus: &'a B,
    observer: &'a O,
    stage: BootStage,
    wakeup_retries: u32,
    boot_retries: u32,
}

impl<'a, B: BusTransport, O: WifiObserver> BootEngine<'a, B, O> {
    pub fn new(bus: &'a B, observer: &'a O) -> Self {
        BootEngine {
            bus,
            observer,
            stage: BootStage::Reset,
            wakeup_retries: WAKEUP_POLL_RETRIES,
            boot_retries: BOOT_POLL_RETRIES,
        }
    }

    /// Overrides the poll budgets, for hosts with slow bus turnaround.
    pub fn with_poll_budget(mut self, wakeup_retries: u32, boot_retries: u32) -> Self {
        self.wakeup_retries = wakeup_retries;
        self.boot_retries = boot_retries;
        self
    }

    /// The stage the engine last reached.
    pub fn stage(&self) -> BootStage {
        self.stage
    }

    fn goto_stage(&mut self, to: BootStage) {
        tracing::info!(from = %self.stage, to = %to, "Boot stage transition");
        self.observer
            .on_event(&WifiEvent::BootStageChanged { from: self.stage, to });
        self.stage = to;
    }

    /// Full bring-up: wake, bootloader, download, message mode.
    pub fn run(&mut self, image: &FirmwareImage) -> Result<(), BootError> {
        self.wake_chip()?;
        self.start_bootloader()?;
        self.download_firmware(image)?;
        self.switch_to_message_mode()
    }

    /// Pulses reset, proves the bus wiring, wakes the chip and verifies its
    /// access mode.
    pub fn wake_chip(&mut self) -> Result<(), BootError> {
        let bus = self.bus;
        bus.reset_chip()?;
        for &wrote in SRAM_PROBE_VALUES.iter() {
            bus.write_u32(Register::TsetGenRW, wrote)?;
            let read = bus.read_u32(Register::TsetGenRW)?;
            if read != wrote {
                return Err(BootError::ProbeMismatch { wrote, read });
            }
        }

        bus.set_wake_pin(true)?;
        let ctrl = bus.read_control()?;
        bus.write_u16(Register::Control, ctrl | CTRL_WUP_BIT)?;
        hif::poll_until(self.wakeup_retries, WAKEUP_POLL_DELAY_MS, || {
            Ok(ctrl_is_ready(bus.read_control()?).then_some(()))
        })
        .map_err(|err| poll_error(err, BootError::WakeupTimeout))?;

        let config = bus.read_u32(Register::Config)?;
        if !cfg_in_direct_access_mode(config) {
            return Err(BootError::UnexpectedAccessMode);
        }
        tracing::debug!(
            revision = cfg_hardware_revision(config),
            hardware_type = cfg_hardware_type(config),
            "Chip identified"
        );

        bus.set_high_speed()?;
        self.goto_stage(BootStage::ChipAwake);
        Ok(())
    }

    /// Releases the internal CPU and checks the ROM answers SRAM probes.
    pub fn start_bootloader(&mut self) -> Result<(), BootError> {
        hif::config_clear_bits(self.bus, CFG_CPU_CLK_DIS_BIT)?;
        hif::config_clear_bits(self.bus, CFG_CPU_RESET_BIT)?;

        hif::sram_write_u32(self.bus, ADDR_DOWNLOAD_FIFO_BASE, BOOTLOADER_PROBE_WORD)?;
        let read = hif::sram_read_u32(self.bus, ADDR_DOWNLOAD_FIFO_BASE)?;
        if read != BOOTLOADER_PROBE_WORD {
            return Err(BootError::BootloaderNotDetected { read });
        }

        self.goto_stage(BootStage::BootloaderRunning);
        Ok(())
    }

    /// Streams the firmware payload through the download ring.
    ///
    /// The keyset check runs before a single payload byte moves; a mismatch
    /// is fatal and leaves the ring untouched.
    pub fn download_firmware(&mut self, image: &FirmwareImage) -> Result<(), BootError> {
        let bus = self.bus;
        let total = image.payload().len();

        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_IMAGE_SIZE, total as u32)?;
        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_PUT, 0)?;
        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_NOT_READY)?;
        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_READY)?;
        self.wait_ncp_status(NCP_STATE_INFO_READY)?;

        let pte = hif::sram_read_u32(bus, ADDR_PTE_INFO + PTE_INFO_KEYSET_OFFSET)?;
        let chip_keyset = (pte >> 8) as u8;
        let image_keyset = image.keyset_value()?;
        if chip_keyset != image_keyset {
            return Err(BootError::InvalidKeyset {
                image: image_keyset,
                chip: chip_keyset,
            });
        }
        tracing::debug!(keyset = image_keyset, "Keyset verified");

        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_INFO_READ)?;
        self.wait_ncp_status(NCP_STATE_READY)?;

        hif::sram_write(bus, ADDR_DWL_CTRL_AREA_SIGNATURE, image.signature())?;
        hif::sram_write(bus, ADDR_DWL_CTRL_AREA_FW_HASH, image.hash())?;
        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_FW_VERSION, FW_VERSION_VALUE)?;
        self.goto_stage(BootStage::InfoExchanged);

        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_UPLOAD_PENDING)?;
        self.wait_ncp_status(NCP_STATE_DOWNLOAD_PENDING)?;
        self.goto_stage(BootStage::DownloadPending);

        let mut put: u32 = 0;
        for block in image.blocks() {
            // The bootloader aborts the stream by leaving the download state.
            let status = hif::sram_read_u32(bus, ADDR_DWL_CTRL_AREA_NCP_STATUS)?;
            if status != NCP_STATE_DOWNLOAD_PENDING {
                return Err(BootError::UnexpectedNcpStatus { status });
            }

            hif::poll_until(self.boot_retries, BOOT_POLL_DELAY_MS, || {
                let get = hif::sram_read_u32(bus, ADDR_DWL_CTRL_AREA_GET)?;
                let fits = put.wrapping_sub(get) <= DOWNLOAD_FIFO_SIZE - DOWNLOAD_BLOCK_SIZE;
                Ok(fits.then_some(()))
            })
            .map_err(|err| poll_error(err, BootError::DownloadTimeout))?;

            hif::sram_write(bus, ADDR_DOWNLOAD_FIFO_BASE + (put % DOWNLOAD_FIFO_SIZE), block)?;
            put += block.len() as u32;
            hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_PUT, put)?;
            self.observer.on_event(&WifiEvent::DownloadProgress {
                bytes_sent: put as usize,
                total,
            });
        }

        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_UPLOAD_COMPLETE)?;
        self.goto_stage(BootStage::UploadComplete);

        let verdict = hif::poll_until(self.boot_retries, BOOT_POLL_DELAY_MS, || {
            let status = hif::sram_read_u32(bus, ADDR_DWL_CTRL_AREA_NCP_STATUS)?;
            Ok(matches!(status, NCP_STATE_AUTH_OK | NCP_STATE_AUTH_FAIL).then_some(status))
        })
        .map_err(|err| {
            poll_error(
                err,
                BootError::HandshakeTimeout {
                    expected: NCP_STATE_AUTH_OK,
                },
            )
        })?;
        if verdict == NCP_STATE_AUTH_FAIL {
            return Err(BootError::AuthenticationFailed);
        }
        self.goto_stage(BootStage::AuthOk);

        hif::sram_write_u32(bus, ADDR_DWL_CTRL_AREA_HOST_STATUS, HOST_STATE_OK_TO_JUMP)?;
        tracing::info!(bytes = total, blocks = image.num_blocks(), "Firmware downloaded");
        Ok(())
    }

    /// Leaves direct access mode and unmasks the queue interrupt.
    pub fn switch_to_message_mode(&mut self) -> Result<(), BootError> {
        hif::config_clear_bits(self.bus, CFG_ACCESS_MODE_BIT)?;
        self.bus.enable_interrupt()?;
        self.goto_stage(BootStage::Running);
        Ok(())
    }

    fn wait_ncp_status(&self, expected: u32) -> Result<(), BootError> {
        hif::poll_sram_for_value(
            self.bus,
            ADDR_DWL_CTRL_AREA_NCP_STATUS,
            expected,
            self.boot_retries,
            BOOT_POLL_DELAY_MS,
        )
        .map_err(|err| poll_error(err, BootError::HandshakeTimeout { expected }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::transport::{GetMode, MockBus};

    fn image(payload_len: usize) -> FirmwareImage {
        FirmwareImage::from_parts(
            *b"WFM_KS90",
            [0xA5; FW_SIGNATURE_SIZE],
            [0x5A; FW_HASH_SIZE],
            &vec![0x42; payload_len],
        )
        .unwrap()
    }

    #[test]
    fn full_boot_reaches_running() {
        let bus = MockBus::with_bootloader();
        let observer = RecordingObserver::new();
        let mut engine = BootEngine::new(&bus, &observer);

        engine.run(&image(2500)).unwrap();
        assert_eq!(engine.stage(), BootStage::Running);

        assert_eq!(
            bus.host_status_history(),
            vec![
                HOST_STATE_NOT_READY,
                HOST_STATE_READY,
                HOST_STATE_INFO_READ,
                HOST_STATE_UPLOAD_PENDING,
                HOST_STATE_UPLOAD_COMPLETE,
                HOST_STATE_OK_TO_JUMP,
            ]
        );
        assert_eq!(bus.reset_count(), 1);
        assert!(bus.irq_enabled());
        assert!(!crate::protocol::cfg_in_direct_access_mode(
            bus.read_u32(Register::Config).unwrap()
        ));

        let stages: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                WifiEvent::BootStageChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(*stages.last().unwrap(), BootStage::Running);
    }

    #[test]
    fn signature_hash_and_version_are_planted() {
        let bus = MockBus::with_bootloader();
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);
        engine.run(&image(100)).unwrap();

        assert_eq!(
            bus.sram_bytes(ADDR_DWL_CTRL_AREA_SIGNATURE, FW_SIGNATURE_SIZE),
            vec![0xA5; FW_SIGNATURE_SIZE]
        );
        assert_eq!(
            bus.sram_bytes(ADDR_DWL_CTRL_AREA_FW_HASH, FW_HASH_SIZE),
            vec![0x5A; FW_HASH_SIZE]
        );
        assert_eq!(bus.sram_word(ADDR_DWL_CTRL_AREA_FW_VERSION), FW_VERSION_VALUE);
        assert_eq!(bus.sram_word(ADDR_DWL_CTRL_AREA_IMAGE_SIZE), 100);
        // The plant happens after the info-read acknowledgement, not before.
        assert_eq!(bus.signature_planted_at_info_read(), Some(false));
    }

    #[test]
    fn aborted_bootloader_stops_the_stream() {
        let bus = MockBus::with_bootloader();
        bus.set_download_abort(2, NCP_STATE_AUTH_FAIL);
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.run(&image(8 * 1024)).unwrap_err();
        assert!(matches!(
            err,
            BootError::UnexpectedNcpStatus {
                status: NCP_STATE_AUTH_FAIL
            }
        ));
        // Blocks 3..8 never hit the ring and the upload is never declared done.
        assert_eq!(bus.fifo_writes().len(), 2);
        assert_ne!(
            *bus.host_status_history().last().unwrap(),
            HOST_STATE_UPLOAD_COMPLETE
        );
    }

    #[test]
    fn streams_one_block_per_ring_chunk() {
        let bus = MockBus::with_bootloader();
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);
        engine.run(&image(2500)).unwrap();

        let writes = bus.fifo_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0], (ADDR_DOWNLOAD_FIFO_BASE, 1024));
        assert_eq!(writes[1], (ADDR_DOWNLOAD_FIFO_BASE + 1024, 1024));
        assert_eq!(writes[2], (ADDR_DOWNLOAD_FIFO_BASE + 2048, 452));

        assert_eq!(bus.put_history(), vec![0, 1024, 2048, 2500]);
    }

    #[test]
    fn keyset_mismatch_streams_nothing() {
        let bus = MockBus::with_bootloader();
        bus.set_chip_keyset(0x01);
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.run(&image(2048)).unwrap_err();
        assert!(matches!(
            err,
            BootError::InvalidKeyset {
                image: 0x90,
                chip: 0x01
            }
        ));
        assert!(bus.fifo_writes().is_empty());
    }

    #[test]
    fn window_is_respected_against_a_slow_consumer() {
        let bus = MockBus::with_bootloader();
        bus.set_get_mode(GetMode::PerPoll(1024));
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        engine.run(&image(40 * 1024)).unwrap();
        assert_eq!(bus.fifo_writes().len(), 40);
        assert_eq!(bus.window_violations(), 0);
    }

    #[test]
    fn wedged_ring_times_out() {
        let bus = MockBus::with_bootloader();
        bus.set_get_mode(GetMode::PerPoll(0));
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.run(&image(40 * 1024)).unwrap_err();
        assert!(matches!(err, BootError::DownloadTimeout));
        // put may run up to get + (ring - block), so exactly 32 blocks land.
        assert_eq!(bus.fifo_writes().len(), 32);
        assert_eq!(bus.window_violations(), 0);
    }

    #[test]
    fn rejected_signature_fails_before_the_jump() {
        let bus = MockBus::with_bootloader();
        bus.set_auth_result(NCP_STATE_AUTH_FAIL);
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.run(&image(512)).unwrap_err();
        assert!(matches!(err, BootError::AuthenticationFailed));
        assert_eq!(
            *bus.host_status_history().last().unwrap(),
            HOST_STATE_UPLOAD_COMPLETE
        );
    }

    #[test]
    fn sleeping_chip_times_out_wakeup() {
        let bus = MockBus::with_bootloader();
        bus.set_wake_responds(false);
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.wake_chip().unwrap_err();
        assert!(matches!(err, BootError::WakeupTimeout));
        assert_eq!(engine.stage(), BootStage::Reset);
    }

    #[test]
    fn broken_wiring_fails_the_probe() {
        let bus = MockBus::with_bootloader();
        bus.set_scratch_stuck(Some(0));
        let observer = NullObserver;
        let mut engine = BootEngine::new(&bus, &observer);

        let err = engine.wake_chip().unwrap_err();
        assert!(matches!(err, BootError::ProbeMismatch { .. }));
    }
}
