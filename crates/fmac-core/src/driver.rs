//! Driver facade: boot orchestration, the request/confirmation correlator,
//! the receive pump and the data path.
//!
//! One [`Fmac`] owns the bus and a mutex-guarded [`DriverContext`]. The
//! command path claims the single correlator slot, writes the request and
//! blocks on a condvar until the pump posts the matching confirmation.
//! The pump ([`Fmac::process`]) is driven from outside, by the platform's
//! interrupt bottom half or a polling loop, and never blocks itself.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tracing::{debug, error, info, warn};

use crate::boot::BootEngine;
use crate::commands::configuration_body;
use crate::context::{DriverContext, FatalFault, StartupInfo};
use crate::error::FmacError;
use crate::events::{NullObserver, WifiEvent, WifiObserver};
use crate::payload::FirmwareImage;
use crate::protocol::constants::*;
use crate::protocol::registers::ctrl_next_frame_len;
use crate::protocol::{
    FrameHeader, Register, decode_confirmation_status, decode_frame, encode_frame,
};
use crate::securelink::{MacKey, SecureLink, SecureLinkMode};
use crate::transport::BusTransport;

/// Full-MAC driver core, generic over the host bus and the event observer.
pub struct Fmac<B: BusTransport, O: WifiObserver = NullObserver> {
    bus: B,
    observer: O,
    state: Mutex<DriverContext>,
    confirmation: Condvar,
    command_timeout: Duration,
    startup_timeout: Duration,
    wakeup_poll_retries: u32,
    boot_poll_retries: u32,
}

impl<B: BusTransport> Fmac<B> {
    pub fn new(bus: B) -> Self {
        Self::with_observer(bus, NullObserver)
    }
}

impl<B: BusTransport, O: WifiObserver> Fmac<B, O> {
    pub fn with_observer(bus: B, observer: O) -> Self {
        Fmac {
            bus,
            observer,
            state: Mutex::new(DriverContext::new(SecureLink::new(
                SecureLinkMode::NotApplicable,
                None,
            ))),
            confirmation: Condvar::new(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            wakeup_poll_retries: WAKEUP_POLL_RETRIES,
            boot_poll_retries: BOOT_POLL_RETRIES,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    pub fn set_startup_timeout(&mut self, timeout: Duration) {
        self.startup_timeout = timeout;
    }

    /// Boot-time poll budgets, see [`BootEngine::with_poll_budget`].
    pub fn set_boot_polling(&mut self, wakeup_retries: u32, boot_retries: u32) {
        self.wakeup_poll_retries = wakeup_retries;
        self.boot_poll_retries = boot_retries;
    }

    /// Installs the secure link configuration. Must happen before `start`;
    /// an established session would be dropped.
    pub fn set_secure_link(
        &mut self,
        mode: SecureLinkMode,
        mac_key: Option<MacKey>,
    ) -> Result<(), FmacError> {
        let mut state = self.state_guard()?;
        state.secure_link = SecureLink::new(mode, mac_key);
        Ok(())
    }

    pub(crate) fn state_guard(&self) -> Result<MutexGuard<'_, DriverContext>, FmacError> {
        self.state.lock().map_err(|_| FmacError::StatePoisoned)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Brings the chip from reset to a running, configured firmware.
    ///
    /// Runs the full bootstrap sequence, pumps the bus until the firmware
    /// announces itself with a startup indication, then applies the PDS
    /// configuration chunk by chunk. Host interrupt plumbing does not need
    /// to run yet; this call drains the queue itself.
    pub fn start(&self, image: &FirmwareImage, pds: &[String]) -> Result<(), FmacError> {
        {
            let mut state = self.state_guard()?;
            state.startup = None;
            state.fatal_fault = None;
            state.waited_event_id = 0;
            state.posted_event_id = 0;
            state.used_buffers = 0;
            state.pending_ctrl = 0;
            state.secure_link.invalidate_session();
        }

        let mut engine = BootEngine::new(&self.bus, &self.observer)
            .with_poll_budget(self.wakeup_poll_retries, self.boot_poll_retries);
        engine.run(image)?;

        let timeout_ms = self.startup_timeout.as_millis() as u64;
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            let drained = self.process()?;
            if self.state_guard()?.is_started() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(FmacError::StartupTimeout { timeout_ms });
            }
            if !drained {
                thread::sleep(Duration::from_millis(1));
            }
        }

        for chunk in pds {
            let reply =
                self.pumped_command(CONFIGURATION_REQ_ID, GENERAL_INTERFACE, &configuration_body(chunk))?;
            let status = decode_confirmation_status(&reply)?;
            self.check_status(CONFIGURATION_REQ_ID, status)?;
        }
        if !pds.is_empty() {
            info!(chunks = pds.len(), "Device configuration applied");
        }
        Ok(())
    }

    /// Powers the chip down. Only a fresh `start` brings it back.
    pub fn shutdown(&self) -> Result<(), FmacError> {
        // The chip never confirms a shutdown request.
        self.send_request(SHUT_DOWN_REQ_ID, GENERAL_INTERFACE, &[])?;
        self.bus.disable_interrupt()?;
        self.bus.set_wake_pin(false)?;

        let mut state = self.state_guard()?;
        state.startup = None;
        state.waited_event_id = 0;
        state.posted_event_id = 0;
        state.secure_link.invalidate_session();
        info!("Chip shut down");
        Ok(())
    }

    pub fn is_started(&self) -> Result<bool, FmacError> {
        Ok(self.state_guard()?.is_started())
    }

    /// Parameters announced by the firmware, once started.
    pub fn startup_info(&self) -> Result<Option<StartupInfo>, FmacError> {
        Ok(self.state_guard()?.startup.clone())
    }

    /// MAC address the firmware assigned to `interface` at startup.
    pub fn mac_address(&self, interface: u8) -> Result<Option<[u8; 6]>, FmacError> {
        Ok(self.state_guard()?.startup.as_ref().map(|info| {
            if interface == SOFTAP_INTERFACE {
                info.mac_softap
            } else {
                info.mac_sta
            }
        }))
    }

    /// Running firmware version as "major.minor.build", once started.
    pub fn firmware_version(&self) -> Result<Option<String>, FmacError> {
        Ok(self
            .state_guard()?
            .startup
            .as_ref()
            .map(StartupInfo::firmware_version))
    }

    /// Secure link mode this driver was configured with.
    pub fn link_mode(&self) -> Result<SecureLinkMode, FmacError> {
        Ok(self.state_guard()?.secure_link.mode())
    }

    /// The fatal fault recorded from an exception or error indication, if
    /// any. Only a reboot clears it.
    pub fn fatal_fault(&self) -> Result<Option<FatalFault>, FmacError> {
        Ok(self.state_guard()?.fatal_fault.clone())
    }

    /// True when the encrypted session should be renegotiated, either after
    /// a nonce watermark or a chip-reported stale key.
    pub fn renegotiation_needed(&self) -> Result<bool, FmacError> {
        Ok(self.state_guard()?.secure_link.renegotiation_needed())
    }

    // ------------------------------------------------------------------
    // Command path
    // ------------------------------------------------------------------

    /// Sends a request and blocks until its confirmation arrives, returning
    /// the confirmation body.
    ///
    /// One request may be outstanding at a time; a second caller gets
    /// `CommandInFlight`. Fails `NotStarted` until the firmware has
    /// announced itself. The receive pump must run concurrently for the
    /// confirmation to be observed; this call itself never touches the
    /// receive side.
    pub fn send_command(&self, id: u8, info: u8, body: &[u8]) -> Result<Vec<u8>, FmacError> {
        self.post_request(id, info, body)?;
        self.wait_for_confirmation(id)
    }

    /// Claims the correlator slot and puts the request on the wire.
    fn post_request(&self, id: u8, info: u8, body: &[u8]) -> Result<(), FmacError> {
        let mut state = self.state_guard()?;
        if !state.is_started() {
            return Err(FmacError::NotStarted);
        }
        if state.waited_event_id != 0 {
            return Err(FmacError::CommandInFlight);
        }
        state.waited_event_id = id;
        state.posted_event_id = 0;
        state.event_payload.clear();

        if let Err(e) = self.write_request(&mut state, id, info, body) {
            state.waited_event_id = 0;
            return Err(e);
        }
        Ok(())
    }

    /// Command roundtrip that drains the bus itself instead of relying on
    /// a host pump. Used during bring-up, before interrupt plumbing runs.
    fn pumped_command(&self, id: u8, info: u8, body: &[u8]) -> Result<Vec<u8>, FmacError> {
        self.post_request(id, info, body)?;

        let timeout_ms = self.command_timeout.as_millis() as u64;
        let deadline = Instant::now() + self.command_timeout;
        loop {
            let drained = self.process()?;
            {
                let mut state = self.state_guard()?;
                if state.posted_event_id == id {
                    state.waited_event_id = 0;
                    state.posted_event_id = 0;
                    let frame = std::mem::take(&mut state.event_payload);
                    return Ok(strip_header(frame));
                }
            }
            if Instant::now() >= deadline {
                self.state_guard()?.waited_event_id = 0;
                warn!(id, timeout_ms, "Confirmation timed out");
                return Err(FmacError::ConfirmationTimeout { id, timeout_ms });
            }
            if !drained {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Fire-and-forget request: no correlator slot, no confirmation wait.
    pub fn send_request(&self, id: u8, info: u8, body: &[u8]) -> Result<(), FmacError> {
        let mut state = self.state_guard()?;
        self.write_request(&mut state, id, info, body)
    }

    fn write_request(
        &self,
        state: &mut DriverContext,
        id: u8,
        info: u8,
        body: &[u8],
    ) -> Result<(), FmacError> {
        let frame = if state.secure_link.requires_encryption(id) {
            state.secure_link.encrypt_frame(id, info, body)?
        } else {
            encode_frame(id, info, body, state.max_request_size())?
        };
        self.bus.write_block(Register::InOutQueue, &frame)?;
        Ok(())
    }

    fn wait_for_confirmation(&self, id: u8) -> Result<Vec<u8>, FmacError> {
        let timeout_ms = self.command_timeout.as_millis() as u64;
        let state = self.state_guard()?;
        let (mut state, _result) = self
            .confirmation
            .wait_timeout_while(state, self.command_timeout, |s| s.posted_event_id != id)
            .map_err(|_| FmacError::StatePoisoned)?;

        state.waited_event_id = 0;
        if state.posted_event_id != id {
            warn!(id, timeout_ms, "Confirmation timed out");
            return Err(FmacError::ConfirmationTimeout { id, timeout_ms });
        }
        state.posted_event_id = 0;
        let frame = std::mem::take(&mut state.event_payload);
        drop(state);
        Ok(strip_header(frame))
    }

    /// Maps a confirmation status word onto the driver error space.
    pub(crate) fn check_status(&self, id: u8, status: u32) -> Result<(), FmacError> {
        match status {
            STATUS_SUCCESS => Ok(()),
            STATUS_INVALID_PARAMETER => Err(FmacError::InvalidParameter { id }),
            STATUS_UNSUPPORTED_MSG_ID => Err(FmacError::UnsupportedMessage { id }),
            other => Err(FmacError::CommandFailed { id, status: other }),
        }
    }

    // ------------------------------------------------------------------
    // Data path
    // ------------------------------------------------------------------

    /// Queues one Ethernet II frame for transmission on `interface`
    /// ([`STA_INTERFACE`] or [`SOFTAP_INTERFACE`]) and returns its packet
    /// id.
    ///
    /// Consumes a chip buffer credit; the credit comes back with the
    /// asynchronous send confirmation, so `OutOfBuffers` means every credit
    /// is currently in flight.
    pub fn send_ethernet_frame(
        &self,
        interface: u8,
        frame: &[u8],
        priority: u8,
    ) -> Result<u16, FmacError> {
        let mut state = self.state_guard()?;
        if !state.is_started() {
            return Err(FmacError::NotStarted);
        }
        if !state.take_buffer() {
            return Err(FmacError::OutOfBuffers);
        }
        let packet_id = u16::from(state.next_data_frame_id());

        let mut body = Vec::with_capacity(8 + frame.len());
        body.push(FRAME_TYPE_DATA);
        body.push(priority);
        body.write_u16::<LittleEndian>(packet_id).unwrap();
        body.write_u32::<LittleEndian>(frame.len() as u32).unwrap();
        body.extend_from_slice(frame);

        if let Err(e) = self.write_request(&mut state, SEND_FRAME_REQ_ID, interface, &body) {
            state.release_buffer();
            return Err(e);
        }
        debug!(packet_id, length = frame.len(), "Data frame queued");
        Ok(packet_id)
    }

    // ------------------------------------------------------------------
    // Receive pump
    // ------------------------------------------------------------------

    /// Drains at most one pending frame from the chip.
    ///
    /// Returns `Ok(true)` when a frame was consumed; hosts keep calling
    /// until it reports `false`. Safe to call from a thread other than the
    /// command path's.
    pub fn process(&self) -> Result<bool, FmacError> {
        // A piggyback word from the previous receive saves the register
        // read.
        let mut ctrl = {
            let mut state = self.state_guard()?;
            std::mem::take(&mut state.pending_ctrl)
        };
        if ctrl_next_frame_len(ctrl) == 0 {
            ctrl = self.bus.read_control()?;
        }

        let frame_len = ctrl_next_frame_len(ctrl);
        if frame_len == 0 {
            return Ok(false);
        }

        let raw = self
            .bus
            .read_block(Register::InOutQueue, frame_len as usize + 2)?;
        self.handle_transfer(&raw)?;
        Ok(true)
    }

    fn handle_transfer(&self, raw: &[u8]) -> Result<(), FmacError> {
        let decoded = decode_frame(raw)?;
        let header = decoded.header;
        let piggyback = decoded.piggyback;

        if header.info & MSG_INFO_SECURE_LINK != 0 {
            let frame_area = &raw[..raw.len() - 2];
            let (clear, body) = {
                let mut state = self.state_guard()?;
                state.pending_ctrl = piggyback;
                state.secure_link.decrypt_frame(frame_area)?
            };
            return self.dispatch(clear, &body);
        }

        self.state_guard()?.pending_ctrl = piggyback;
        self.dispatch(header, decoded.body)
    }

    /// Routes one received frame. Confirmations feed the correlator; the
    /// indication match updates context state and collects observer events,
    /// which are emitted after the lock is released.
    fn dispatch(&self, header: FrameHeader, body: &[u8]) -> Result<(), FmacError> {
        let mut events: Vec<WifiEvent> = Vec::new();
        {
            let mut state = self.state_guard()?;
            if header.is_indication() {
                self.on_indication(&mut state, header, body, &mut events);
            } else {
                self.on_confirmation(&mut state, header, body);
            }
        }
        for event in &events {
            self.observer.on_event(event);
        }
        Ok(())
    }

    fn on_confirmation(&self, state: &mut DriverContext, header: FrameHeader, body: &[u8]) {
        if header.id == SEND_FRAME_REQ_ID {
            // Each send-frame confirmation returns one chip buffer credit.
            state.release_buffer();
        }

        if state.waited_event_id == header.id {
            let mut frame = Vec::with_capacity(FrameHeader::SIZE + body.len());
            frame.extend_from_slice(&header.to_bytes());
            frame.extend_from_slice(body);
            state.post_event(header, &frame);
            self.confirmation.notify_all();
        } else if header.id != SEND_FRAME_REQ_ID {
            debug!(id = header.id, "Unsolicited confirmation dropped");
        }
    }

    fn on_indication(
        &self,
        state: &mut DriverContext,
        header: FrameHeader,
        body: &[u8],
        events: &mut Vec<WifiEvent>,
    ) {
        match header.id {
            STARTUP_IND_ID => match StartupInfo::parse(body) {
                Ok(info) => {
                    info!(
                        firmware = %info.firmware_label,
                        version = %info.firmware_version(),
                        buffers = info.num_input_buffers,
                        "Firmware started"
                    );
                    events.push(WifiEvent::Startup {
                        mac_sta: info.mac_sta,
                        mac_softap: info.mac_softap,
                        firmware_label: info.firmware_label.clone(),
                    });
                    state.note_startup(info);
                }
                Err(e) => warn!(error = %e, "Malformed startup indication"),
            },
            CONNECT_IND_ID => {
                if body.len() >= 16 {
                    let status = LittleEndian::read_u32(&body[..4]);
                    if status == STATUS_SUCCESS {
                        events.push(WifiEvent::Connected {
                            mac: read_mac(body, 4),
                        });
                    } else {
                        events.push(WifiEvent::ConnectionFailed { status });
                    }
                }
            }
            DISCONNECT_IND_ID => {
                if body.len() >= 8 {
                    events.push(WifiEvent::Disconnected {
                        reason: LittleEndian::read_u16(&body[6..8]),
                    });
                }
            }
            START_AP_IND_ID => {
                if body.len() >= 4 {
                    let status = LittleEndian::read_u32(&body[..4]);
                    if status == STATUS_SUCCESS {
                        events.push(WifiEvent::ApStarted);
                    } else {
                        events.push(WifiEvent::ApStartFailed { status });
                    }
                }
            }
            STOP_AP_IND_ID => events.push(WifiEvent::ApStopped),
            RECEIVED_IND_ID => {
                // Body: frame type, padding count, frame length, padding
                // bytes, then the Ethernet frame itself.
                if body.len() >= 4 {
                    let padding = usize::from(body[1]);
                    let frame_length = usize::from(LittleEndian::read_u16(&body[2..4]));
                    let start = 4 + padding;
                    if body.len() >= start + frame_length {
                        events.push(WifiEvent::FrameReceived {
                            interface: header.info & MSG_INFO_INTERFACE_MASK,
                            payload: body[start..start + frame_length].to_vec(),
                        });
                    } else {
                        warn!(
                            declared = frame_length,
                            available = body.len(),
                            "Truncated data frame dropped"
                        );
                    }
                }
            }
            SCAN_RESULT_IND_ID => {
                if body.len() >= 52 {
                    let ssid_len = (LittleEndian::read_u32(&body[..4]) as usize).min(32);
                    let ssid = String::from_utf8_lossy(&body[4..4 + ssid_len]).into_owned();
                    let rcpi = LittleEndian::read_u16(&body[48..50]);
                    events.push(WifiEvent::ScanResult {
                        ssid,
                        mac: read_mac(body, 36),
                        channel: LittleEndian::read_u16(&body[42..44]),
                        // RCPI is (dBm + 110) * 2.
                        rssi_dbm: (rcpi / 2) as i16 - 110,
                    });
                }
            }
            SCAN_COMPLETE_IND_ID => {
                if body.len() >= 4 {
                    events.push(WifiEvent::ScanComplete {
                        status: LittleEndian::read_u32(&body[..4]),
                    });
                }
            }
            AP_CLIENT_CONNECTED_IND_ID => {
                if body.len() >= 6 {
                    events.push(WifiEvent::ClientConnected {
                        mac: read_mac(body, 0),
                    });
                }
            }
            AP_CLIENT_REJECTED_IND_ID => {
                if body.len() >= 8 {
                    events.push(WifiEvent::ClientRejected {
                        mac: read_mac(body, 0),
                        reason: LittleEndian::read_u16(&body[6..8]),
                    });
                }
            }
            AP_CLIENT_DISCONNECTED_IND_ID => {
                if body.len() >= 8 {
                    events.push(WifiEvent::ClientDisconnected {
                        mac: read_mac(body, 0),
                        reason: LittleEndian::read_u16(&body[6..8]),
                    });
                }
            }
            JOIN_IBSS_IND_ID => {
                if body.len() >= 10 {
                    let status = LittleEndian::read_u32(&body[..4]);
                    if status == STATUS_SUCCESS {
                        events.push(WifiEvent::IbssJoined {
                            mac: read_mac(body, 4),
                        });
                    } else {
                        events.push(WifiEvent::ConnectionFailed { status });
                    }
                }
            }
            LEAVE_IBSS_IND_ID => events.push(WifiEvent::IbssLeft),
            GENERIC_IND_ID => {
                debug!(length = body.len(), "Generic indication");
                events.push(WifiEvent::Generic { length: body.len() });
            }
            EXCEPTION_IND_ID => {
                error!(data_length = body.len(), "Firmware exception, reboot required");
                state.fatal_fault = Some(FatalFault::Exception {
                    data_length: body.len(),
                });
                events.push(WifiEvent::Exception {
                    data_length: body.len(),
                });
            }
            ERROR_IND_ID => {
                let kind = if body.len() >= 4 {
                    LittleEndian::read_u32(&body[..4])
                } else {
                    u32::MAX
                };
                if kind == ERROR_OUTDATED_SESSION_KEY || kind == ERROR_INVALID_SESSION_KEY {
                    warn!(kind, "Chip rejected the session key");
                    state.secure_link.require_renegotiation();
                } else {
                    error!(kind, "Firmware error, reboot required");
                    state.fatal_fault = Some(FatalFault::FirmwareError { kind });
                    events.push(WifiEvent::FirmwareError { kind });
                }
            }
            other => {
                debug!(id = other, length = body.len(), "Unhandled indication");
            }
        }
    }
}

fn read_mac(body: &[u8], offset: usize) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&body[offset..offset + 6]);
    mac
}

/// The correlator stores whole frames; command callers want the body.
fn strip_header(mut frame: Vec<u8>) -> Vec<u8> {
    if frame.len() >= FrameHeader::SIZE {
        frame.drain(..FrameHeader::SIZE);
    } else {
        frame.clear();
    }
    frame
}
