//! Driver events and the observer seam.
//!
//! The driver reports everything noteworthy through [`WifiObserver`]:
//! lifecycle progress during boot, link state changes, scan output, received
//! frames and fatal firmware faults. Embedders plug in their own observer to
//! feed an event loop or UI; [`TracingObserver`] is the batteries-included
//! choice and [`NullObserver`] the silent one.

use crate::boot::BootStage;

/// Everything the driver can tell an embedder about.
#[derive(Debug, Clone, PartialEq)]
pub enum WifiEvent {
    /// The boot engine moved to a new stage.
    BootStageChanged { from: BootStage, to: BootStage },
    /// Firmware streaming progress, in payload bytes.
    DownloadProgress { bytes_sent: usize, total: usize },
    /// The firmware came up and announced itself.
    Startup {
        mac_sta: [u8; 6],
        mac_softap: [u8; 6],
        firmware_label: String,
    },
    /// The station interface associated.
    Connected { mac: [u8; 6] },
    /// A connection attempt ended with a non-success status.
    ConnectionFailed { status: u32 },
    /// The station interface lost or left its association.
    Disconnected { reason: u16 },
    ApStarted,
    ApStartFailed { status: u32 },
    ApStopped,
    ClientConnected { mac: [u8; 6] },
    ClientRejected { mac: [u8; 6], reason: u16 },
    ClientDisconnected { mac: [u8; 6], reason: u16 },
    /// The device joined (or started) an ad-hoc network.
    IbssJoined { mac: [u8; 6] },
    IbssLeft,
    /// One network found during an active scan.
    ScanResult {
        ssid: String,
        mac: [u8; 6],
        channel: u16,
        rssi_dbm: i16,
    },
    ScanComplete { status: u32 },
    /// A data frame arrived for `interface`; the payload starts at the
    /// Ethernet II header.
    FrameReceived { interface: u8, payload: Vec<u8> },
    /// Debug or vendor payload from the chip.
    Generic { length: usize },
    /// Firmware exception dump. The chip is dead until rebooted.
    Exception { data_length: usize },
    /// Firmware-reported fatal error. The chip is dead until rebooted.
    FirmwareError { kind: u32 },
    /// The encrypted session was renegotiated after a counter watermark.
    SessionKeyRenegotiated,
}

/// Receives driver events. Implementations must tolerate calls from both the
/// command path and the receive pump.
pub trait WifiObserver: Send + Sync {
    fn on_event(&self, event: &WifiEvent);
}

/// Observer that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl WifiObserver for NullObserver {
    fn on_event(&self, _event: &WifiEvent) {}
}

/// Observer that forwards events to `tracing` at sensible levels.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WifiObserver for TracingObserver {
    fn on_event(&self, event: &WifiEvent) {
        match event {
            WifiEvent::BootStageChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Boot stage");
            }
            WifiEvent::DownloadProgress { bytes_sent, total } => {
                tracing::debug!(bytes_sent, total, "Firmware download progress");
            }
            WifiEvent::Startup {
                mac_sta,
                firmware_label,
                ..
            } => {
                tracing::info!(
                    mac = %format_mac(mac_sta),
                    firmware = %firmware_label,
                    "Chip started"
                );
            }
            WifiEvent::Connected { mac } => {
                tracing::info!(ap = %format_mac(mac), "Connected");
            }
            WifiEvent::ConnectionFailed { status } => {
                tracing::warn!(status, "Connection failed");
            }
            WifiEvent::Disconnected { reason } => {
                tracing::info!(reason, "Disconnected");
            }
            WifiEvent::ApStarted => tracing::info!("SoftAP started"),
            WifiEvent::ApStartFailed { status } => {
                tracing::warn!(status, "SoftAP start failed");
            }
            WifiEvent::ApStopped => tracing::info!("SoftAP stopped"),
            WifiEvent::ClientConnected { mac } => {
                tracing::info!(client = %format_mac(mac), "Client connected");
            }
            WifiEvent::ClientRejected { mac, reason } => {
                tracing::warn!(client = %format_mac(mac), reason, "Client rejected");
            }
            WifiEvent::ClientDisconnected { mac, reason } => {
                tracing::info!(client = %format_mac(mac), reason, "Client disconnected");
            }
            WifiEvent::IbssJoined { mac } => {
                tracing::info!(bssid = %format_mac(mac), "IBSS joined");
            }
            WifiEvent::IbssLeft => tracing::info!("IBSS left"),
            WifiEvent::ScanResult {
                ssid,
                mac,
                channel,
                rssi_dbm,
            } => {
                tracing::info!(
                    ssid = %ssid,
                    bssid = %format_mac(mac),
                    channel,
                    rssi_dbm,
                    "Scan result"
                );
            }
            WifiEvent::ScanComplete { status } => {
                tracing::info!(status, "Scan complete");
            }
            WifiEvent::FrameReceived { interface, payload } => {
                tracing::trace!(interface, length = payload.len(), "Frame received");
            }
            WifiEvent::Generic { length } => {
                tracing::debug!(length, "Generic indication");
            }
            WifiEvent::Exception { data_length } => {
                tracing::error!(data_length, "Firmware exception");
            }
            WifiEvent::FirmwareError { kind } => {
                tracing::error!(kind, "Firmware error");
            }
            WifiEvent::SessionKeyRenegotiated => {
                tracing::info!("Session key renegotiated");
            }
        }
    }
}

/// Formats a MAC address as the usual colon-separated hex.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Test observer that records every event it sees.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<WifiEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WifiEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl WifiObserver for RecordingObserver {
    fn on_event(&self, event: &WifiEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mac_is_colon_separated_hex() {
        let mac = [0x00, 0x0A, 0x1B, 0xC2, 0xD3, 0xFF];
        assert_eq!(format_mac(&mac), "00:0a:1b:c2:d3:ff");
    }

    #[test]
    fn null_observer_accepts_events() {
        let observer = NullObserver;
        observer.on_event(&WifiEvent::ApStarted);
        observer.on_event(&WifiEvent::Disconnected { reason: 3 });
    }
}
