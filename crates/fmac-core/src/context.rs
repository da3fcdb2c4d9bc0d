//! Mutable driver state shared between the command path and the receive
//! pump. The driver wraps one [`DriverContext`] in a mutex; nothing here is
//! synchronized on its own.

use byteorder::{ByteOrder, LittleEndian};

use crate::protocol::constants::EVENT_BUFFER_SIZE;
use crate::protocol::frame::{FrameError, FrameHeader};
use crate::securelink::SecureLink;

/// Parameters announced by the firmware in its startup indication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupInfo {
    pub mac_sta: [u8; 6],
    pub mac_softap: [u8; 6],
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_build: u8,
    pub firmware_type: u8,
    pub firmware_label: String,
    /// Request buffers on the chip side; one stays reserved for commands.
    pub num_input_buffers: u16,
    /// Largest request frame the chip accepts.
    pub max_request_size: u16,
    pub capabilities: u32,
}

impl StartupInfo {
    /// Body size of the startup indication.
    pub const BODY_SIZE: usize = 192;

    pub fn parse(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < Self::BODY_SIZE {
            return Err(FrameError::BufferTooSmall {
                expected: Self::BODY_SIZE,
                actual: body.len(),
            });
        }

        let mut mac_sta = [0u8; 6];
        mac_sta.copy_from_slice(&body[34..40]);
        let mut mac_softap = [0u8; 6];
        mac_softap.copy_from_slice(&body[40..46]);

        let label_bytes = &body[64..192];
        let label_end = label_bytes.iter().position(|&b| b == 0).unwrap_or(128);
        let firmware_label = String::from_utf8_lossy(&label_bytes[..label_end]).into_owned();

        Ok(StartupInfo {
            mac_sta,
            mac_softap,
            firmware_major: body[54],
            firmware_minor: body[53],
            firmware_build: body[52],
            firmware_type: body[55],
            firmware_label,
            num_input_buffers: LittleEndian::read_u16(&body[28..30]),
            max_request_size: LittleEndian::read_u16(&body[30..32]),
            capabilities: LittleEndian::read_u32(&body[48..52]),
        })
    }

    /// "major.minor.build" for logs and version queries.
    pub fn firmware_version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.firmware_major, self.firmware_minor, self.firmware_build
        )
    }
}

/// A fatal condition reported by the chip. Only a reboot clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalFault {
    Exception { data_length: usize },
    FirmwareError { kind: u32 },
}

/// Everything the driver tracks about one chip session.
#[derive(Debug)]
pub struct DriverContext {
    pub startup: Option<StartupInfo>,
    /// Send credits: chip request buffers minus the one kept for commands.
    pub input_buffers: u32,
    pub used_buffers: u32,
    pub data_frame_id: u8,
    /// Id of the confirmation the command path is blocked on; zero when no
    /// request is in flight.
    pub waited_event_id: u8,
    /// Id of the confirmation the pump last delivered; zero until posted.
    pub posted_event_id: u8,
    /// Copy of the delivered confirmation frame (header plus body).
    pub event_payload: Vec<u8>,
    /// Piggyback word from the last receive; a non-zero length field lets
    /// the next receive skip the control register read.
    pub pending_ctrl: u16,
    pub secure_link: SecureLink,
    pub fatal_fault: Option<FatalFault>,
}

impl DriverContext {
    pub fn new(secure_link: SecureLink) -> Self {
        DriverContext {
            startup: None,
            input_buffers: 0,
            used_buffers: 0,
            data_frame_id: 0,
            waited_event_id: 0,
            posted_event_id: 0,
            event_payload: Vec::new(),
            pending_ctrl: 0,
            secure_link,
            fatal_fault: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.startup.is_some()
    }

    pub fn note_startup(&mut self, info: StartupInfo) {
        self.input_buffers = u32::from(info.num_input_buffers).saturating_sub(1);
        self.used_buffers = 0;
        self.startup = Some(info);
    }

    /// Largest request frame currently allowed.
    pub fn max_request_size(&self) -> usize {
        self.startup
            .as_ref()
            .map(|s| usize::from(s.max_request_size))
            .unwrap_or(EVENT_BUFFER_SIZE)
    }

    /// Claims one send credit; false when the chip is out of buffers.
    pub fn take_buffer(&mut self) -> bool {
        if self.used_buffers < self.input_buffers {
            self.used_buffers += 1;
            true
        } else {
            false
        }
    }

    /// Returns a credit on a send-frame confirmation.
    pub fn release_buffer(&mut self) {
        self.used_buffers = self.used_buffers.saturating_sub(1);
    }

    pub fn next_data_frame_id(&mut self) -> u8 {
        let id = self.data_frame_id;
        self.data_frame_id = self.data_frame_id.wrapping_add(1);
        id
    }

    /// Stores the confirmation the command path is waiting for. Oversized
    /// payloads are delivered by id only.
    pub fn post_event(&mut self, header: FrameHeader, frame: &[u8]) {
        if frame.len() < EVENT_BUFFER_SIZE {
            self.event_payload = frame.to_vec();
        } else {
            self.event_payload.clear();
        }
        self.posted_event_id = header.id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::securelink::{SecureLink, SecureLinkMode};
    use crate::transport::startup_indication_frame;

    fn context() -> DriverContext {
        DriverContext::new(SecureLink::new(SecureLinkMode::NotApplicable, None))
    }

    #[test]
    fn startup_parse_reads_negotiated_fields() {
        let frame = startup_indication_frame(
            8,
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x56],
            "WFM_WF200_C0_3.12.1",
        );
        let info = StartupInfo::parse(&frame[4..]).unwrap();
        assert_eq!(info.num_input_buffers, 8);
        assert_eq!(info.max_request_size, 1600);
        assert_eq!(info.mac_sta, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(info.mac_softap[5], 0x56);
        assert_eq!(info.firmware_label, "WFM_WF200_C0_3.12.1");
        assert_eq!(info.firmware_version(), "3.12.0");
    }

    #[test]
    fn startup_parse_rejects_short_bodies() {
        assert!(StartupInfo::parse(&[0u8; 100]).is_err());
    }

    #[test]
    fn credits_reserve_one_buffer_for_commands() {
        let mut ctx = context();
        let frame = startup_indication_frame(8, [0; 6], [0; 6], "fw");
        ctx.note_startup(StartupInfo::parse(&frame[4..]).unwrap());
        assert_eq!(ctx.input_buffers, 7);

        for _ in 0..7 {
            assert!(ctx.take_buffer());
        }
        assert!(!ctx.take_buffer());

        ctx.release_buffer();
        assert!(ctx.take_buffer());
    }

    #[test]
    fn data_frame_ids_wrap() {
        let mut ctx = context();
        ctx.data_frame_id = 0xFF;
        assert_eq!(ctx.next_data_frame_id(), 0xFF);
        assert_eq!(ctx.next_data_frame_id(), 0x00);
    }

    #[test]
    fn oversized_confirmations_are_posted_by_id_only() {
        let mut ctx = context();
        let big = vec![0u8; EVENT_BUFFER_SIZE + 16];
        ctx.post_event(FrameHeader::new(0, 0x43, 0), &big);
        assert_eq!(ctx.posted_event_id, 0x43);
        assert!(ctx.event_payload.is_empty());

        let small = vec![0u8; 32];
        ctx.post_event(FrameHeader::new(0, 0x44, 0), &small);
        assert_eq!(ctx.posted_event_id, 0x44);
        assert_eq!(ctx.event_payload.len(), 32);
    }
}
