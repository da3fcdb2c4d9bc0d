//! Helpers shared by the unit tests: a canned firmware image, a canned
//! startup indication and a scoped pump thread for command roundtrips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::driver::Fmac;
use crate::events::RecordingObserver;
use crate::payload::FirmwareImage;
use crate::transport::{MockBus, startup_indication_frame};

pub(crate) const TEST_MAC_STA: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
pub(crate) const TEST_MAC_SOFTAP: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x56];

/// Small, keyset-0x90 image matching `MockBus::with_bootloader`.
pub(crate) fn test_image() -> FirmwareImage {
    FirmwareImage::from_parts(*b"WFM_KS90", [0xAA; 64], [0xBB; 8], &[0x5A; 2500]).unwrap()
}

pub(crate) fn startup_frame(buffers: u16) -> Vec<u8> {
    startup_indication_frame(buffers, TEST_MAC_STA, TEST_MAC_SOFTAP, "WFM_WF200_C0_3.12.1")
}

/// Mock bus plus a driver that has already seen the startup indication.
pub(crate) fn started_fmac(buffers: u16) -> (MockBus, Fmac<MockBus, RecordingObserver>) {
    let bus = MockBus::new();
    let fmac = Fmac::with_observer(bus.clone(), RecordingObserver::new());
    bus.push_rx_frame(startup_frame(buffers), 0);
    fmac.process().unwrap();
    assert!(fmac.is_started().unwrap());
    (bus, fmac)
}

/// Runs `body` while a background thread keeps draining the mock queue, so
/// blocking command calls see their confirmations.
pub(crate) fn with_pump<T>(fmac: &Fmac<MockBus, RecordingObserver>, body: impl FnOnce() -> T) -> T {
    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                let _ = fmac.process();
                thread::sleep(Duration::from_millis(1));
            }
        });
        let result = body();
        stop.store(true, Ordering::Relaxed);
        result
    })
}
