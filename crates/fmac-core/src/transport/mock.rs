//! Mock bus transport for tests and bus-less demos.
//!
//! [`MockBus`] models just enough of the chip to exercise the driver: a
//! register file, a byte-addressed SRAM image, an inbound frame queue with
//! piggybacked control words, and an optional scripted bootloader that
//! answers the download handshake the way the real ROM does. Clones share
//! state, so a test can keep a handle for inspection while the driver owns
//! another.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use byteorder::{ByteOrder, LittleEndian};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha512;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::protocol::constants::*;
use crate::protocol::registers::{
    CFG_ACCESS_MODE_BIT, CFG_PREFETCH_BIT, CTRL_RDY_BIT, CTRL_WUP_BIT,
};
use crate::protocol::{FrameHeader, Register};

use super::traits::{BusError, BusTransport};

/// How the scripted chip advances the download `get` pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMode {
    /// `get` tracks `put` as soon as the host publishes it.
    Instant,
    /// Each host read of the `get` word frees this many bytes. `PerPoll(0)`
    /// models a wedged bootloader that never drains the ring.
    PerPoll(u32),
}

struct MockState {
    config: u32,
    control: u16,
    scratch: u32,
    scratch_stuck: Option<u32>,
    wake_responds: bool,
    sram_window: u32,
    sram: BTreeMap<u32, u8>,
    rx_frames: VecDeque<(Vec<u8>, u8)>,
    tx_frames: Vec<Vec<u8>>,
    replies: HashMap<u8, VecDeque<Vec<u8>>>,
    exchange_key: Option<[u8; 32]>,
    auto_confirm: bool,
    bootloader: bool,
    auth_result: u32,
    download_abort: Option<(usize, u32)>,
    info_read_saw_signature: Option<bool>,
    get_mode: GetMode,
    put_shadow: u32,
    get_shadow: u32,
    fifo_writes: Vec<(u32, usize)>,
    put_history: Vec<u32>,
    host_status_history: Vec<u32>,
    window_violations: u32,
    irq_enabled: bool,
    wake_pin: bool,
    resets: u32,
}

impl MockState {
    fn new() -> Self {
        MockState {
            // Hardware type 1, revision 2, direct access mode out of reset.
            config: (1 << 31) | (2 << 24) | CFG_ACCESS_MODE_BIT,
            control: 0,
            scratch: 0,
            scratch_stuck: None,
            wake_responds: true,
            sram_window: 0,
            sram: BTreeMap::new(),
            rx_frames: VecDeque::new(),
            tx_frames: Vec::new(),
            replies: HashMap::new(),
            exchange_key: None,
            auto_confirm: false,
            bootloader: false,
            auth_result: NCP_STATE_AUTH_OK,
            download_abort: None,
            info_read_saw_signature: None,
            get_mode: GetMode::Instant,
            put_shadow: 0,
            get_shadow: 0,
            fifo_writes: Vec::new(),
            put_history: Vec::new(),
            host_status_history: Vec::new(),
            window_violations: 0,
            irq_enabled: false,
            wake_pin: false,
            resets: 0,
        }
    }

    fn sram_store(&mut self, addr: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.sram.insert(addr.wrapping_add(i as u32), *byte);
        }
    }

    fn sram_load_u32(&self, addr: u32) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = *self.sram.get(&addr.wrapping_add(i as u32)).unwrap_or(&0);
        }
        LittleEndian::read_u32(&word)
    }

    fn sram_store_u32(&mut self, addr: u32, value: u32) {
        let mut word = [0u8; 4];
        LittleEndian::write_u32(&mut word, value);
        self.sram_store(addr, &word);
    }

    /// Reacts to host-side writes into the download control area.
    fn on_sram_write(&mut self, addr: u32, len: usize) {
        if !self.bootloader {
            return;
        }
        if addr == ADDR_DWL_CTRL_AREA_HOST_STATUS {
            let value = self.sram_load_u32(addr);
            self.host_status_history.push(value);
            if value == HOST_STATE_INFO_READ {
                self.info_read_saw_signature =
                    Some(self.sram.contains_key(&ADDR_DWL_CTRL_AREA_SIGNATURE));
            }
            let ncp = match value {
                HOST_STATE_READY => Some(NCP_STATE_INFO_READY),
                HOST_STATE_INFO_READ => Some(NCP_STATE_READY),
                HOST_STATE_UPLOAD_PENDING => Some(NCP_STATE_DOWNLOAD_PENDING),
                HOST_STATE_UPLOAD_COMPLETE => Some(self.auth_result),
                _ => None,
            };
            if let Some(word) = ncp {
                self.sram_store_u32(ADDR_DWL_CTRL_AREA_NCP_STATUS, word);
            }
        } else if addr == ADDR_DWL_CTRL_AREA_PUT {
            let value = self.sram_load_u32(addr);
            self.put_history.push(value);
            self.put_shadow = value;
            if self.get_mode == GetMode::Instant {
                self.get_shadow = value;
                self.sram_store_u32(ADDR_DWL_CTRL_AREA_GET, value);
            }
        } else if addr >= ADDR_DOWNLOAD_FIFO_BASE
            && addr < ADDR_DOWNLOAD_FIFO_BASE + DOWNLOAD_FIFO_SIZE
            && len > 4
        {
            self.fifo_writes.push((addr, len));
            let occupancy = self.put_shadow.wrapping_sub(self.get_shadow);
            if occupancy > DOWNLOAD_FIFO_SIZE - DOWNLOAD_BLOCK_SIZE {
                self.window_violations += 1;
            }
            if let Some((blocks, status)) = self.download_abort
                && self.fifo_writes.len() >= blocks
            {
                self.sram_store_u32(ADDR_DWL_CTRL_AREA_NCP_STATUS, status);
            }
        }
    }

    /// Drains the ring a little when the host polls the `get` word.
    fn on_get_poll(&mut self) {
        if !self.bootloader {
            return;
        }
        if let GetMode::PerPoll(step) = self.get_mode {
            self.get_shadow = (self.get_shadow.saturating_add(step)).min(self.put_shadow);
            self.sram_store_u32(ADDR_DWL_CTRL_AREA_GET, self.get_shadow);
        }
    }

    /// Control register value as the chip would report it: wake bits plus
    /// the length and type of the next queued frame.
    fn control_word(&self) -> u16 {
        let mut ctrl = self.control & (CTRL_WUP_BIT | CTRL_RDY_BIT);
        if let Some((frame, frame_type)) = self.rx_frames.front() {
            let words = (frame.len().div_ceil(2) as u16).min(0x0FFF);
            ctrl |= words;
            ctrl |= u16::from(frame_type & 0x3) << 14;
        }
        ctrl
    }

    fn script_reply(&mut self, request: &[u8]) {
        if request.len() < HEADER_SIZE {
            return;
        }
        let id = request[2];
        if let Some(queue) = self.replies.get_mut(&id) {
            if let Some(frame) = queue.pop_front() {
                self.rx_frames.push_back((frame, 0));
                return;
            }
        }
        if id == SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID
            && let Some(key) = self.exchange_key
        {
            self.rx_frames.push_back((exchange_reply(&key), 0));
            return;
        }
        if self.auto_confirm && id & MSG_TYPE_IND == 0 {
            let mut frame = Vec::with_capacity(HEADER_SIZE + 4);
            frame.extend_from_slice(&FrameHeader::new(8, id, 0).to_bytes());
            frame.extend_from_slice(&STATUS_SUCCESS.to_le_bytes());
            self.rx_frames.push_back((frame, 0));
        }
    }
}

/// Shared-state mock implementation of [`BusTransport`].
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl Clone for MockBus {
    fn clone(&self) -> Self {
        MockBus {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// Plain register file with no bootloader script.
    pub fn new() -> Self {
        MockBus {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Mock with the ROM bootloader script enabled and a chip keyset of
    /// `0x90` burned into the part info block.
    pub fn with_bootloader() -> Self {
        let bus = Self::new();
        {
            let mut state = bus.state.lock().unwrap();
            state.bootloader = true;
            state.sram_store_u32(ADDR_DWL_CTRL_AREA_NCP_STATUS, NCP_STATE_NOT_READY);
        }
        bus.set_chip_keyset(0x90);
        bus
    }

    /// Burns a different keyset byte into the part info block.
    pub fn set_chip_keyset(&self, keyset: u8) {
        let mut state = self.state.lock().unwrap();
        state.sram_store_u32(ADDR_PTE_INFO + PTE_INFO_KEYSET_OFFSET, u32::from(keyset) << 8);
    }

    /// Chooses the chip's answer to the final upload handshake.
    pub fn set_auth_result(&self, word: u32) {
        self.state.lock().unwrap().auth_result = word;
    }

    /// After `blocks` ring writes the chip walks away from the download
    /// state and parks the handshake word on `status`.
    pub fn set_download_abort(&self, blocks: usize, status: u32) {
        self.state.lock().unwrap().download_abort = Some((blocks, status));
    }

    /// Chooses how the download `get` pointer advances.
    pub fn set_get_mode(&self, mode: GetMode) {
        self.state.lock().unwrap().get_mode = mode;
    }

    /// When `false`, the ready bit never follows the wake-up bit.
    pub fn set_wake_responds(&self, responds: bool) {
        self.state.lock().unwrap().wake_responds = responds;
    }

    /// Forces every scratch register read to return `value`, regardless of
    /// what was written. Models broken bus wiring.
    pub fn set_scratch_stuck(&self, value: Option<u32>) {
        self.state.lock().unwrap().scratch_stuck = value;
    }

    /// Makes the chip answer public key exchange requests itself, signing
    /// its half with `key`. Without this the exchange needs `queue_reply`.
    pub fn set_secure_link_key(&self, key: [u8; 32]) {
        self.state.lock().unwrap().exchange_key = Some(key);
    }

    /// Answers the next request with `id` using a canned frame.
    pub fn queue_reply(&self, id: u8, frame: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.replies.entry(id).or_default().push_back(frame);
    }

    /// Confirms every otherwise-unanswered request with a success status.
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.state.lock().unwrap().auto_confirm = enabled;
    }

    /// Queues a chip-to-host frame for the next queue read.
    pub fn push_rx_frame(&self, frame: Vec<u8>, frame_type: u8) {
        let mut state = self.state.lock().unwrap();
        state.rx_frames.push_back((frame, frame_type));
    }

    /// Every frame the host pushed into the outbound queue, oldest first.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().tx_frames.clone()
    }

    /// `(address, length)` of every block landed in the download ring.
    pub fn fifo_writes(&self) -> Vec<(u32, usize)> {
        self.state.lock().unwrap().fifo_writes.clone()
    }

    /// Every value the host published to the `put` word, in order.
    pub fn put_history(&self) -> Vec<u32> {
        self.state.lock().unwrap().put_history.clone()
    }

    /// Every handshake word the host wrote, in order.
    pub fn host_status_history(&self) -> Vec<u32> {
        self.state.lock().unwrap().host_status_history.clone()
    }

    /// Times a ring block was written while the window was already full.
    pub fn window_violations(&self) -> u32 {
        self.state.lock().unwrap().window_violations
    }

    /// Whether any signature byte was already planted when the host signaled
    /// the info-read handshake word. `None` before that word is written.
    pub fn signature_planted_at_info_read(&self) -> Option<bool> {
        self.state.lock().unwrap().info_read_saw_signature
    }

    /// Raw SRAM word, for asserting on control-area contents.
    pub fn sram_word(&self, addr: u32) -> u32 {
        self.state.lock().unwrap().sram_load_u32(addr)
    }

    /// Raw SRAM bytes starting at `addr`.
    pub fn sram_bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        (0..len)
            .map(|i| *state.sram.get(&addr.wrapping_add(i as u32)).unwrap_or(&0))
            .collect()
    }

    pub fn irq_enabled(&self) -> bool {
        self.state.lock().unwrap().irq_enabled
    }

    pub fn wake_pin(&self) -> bool {
        self.state.lock().unwrap().wake_pin
    }

    pub fn reset_count(&self) -> u32 {
        self.state.lock().unwrap().resets
    }

    pub fn pending_rx_frames(&self) -> usize {
        self.state.lock().unwrap().rx_frames.len()
    }
}

impl BusTransport for MockBus {
    fn read_u16(&self, register: Register) -> Result<u16, BusError> {
        let state = self.state.lock().unwrap();
        match register {
            Register::Control => Ok(state.control_word()),
            _ => Err(BusError::ReadFailed {
                register,
                message: "not a 16-bit register".into(),
            }),
        }
    }

    fn write_u16(&self, register: Register, value: u16) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        match register {
            Register::Control => {
                state.control = value;
                if value & CTRL_WUP_BIT != 0 && state.wake_responds {
                    state.control |= CTRL_RDY_BIT;
                } else {
                    state.control &= !CTRL_RDY_BIT;
                }
                Ok(())
            }
            _ => Err(BusError::WriteFailed {
                register,
                message: "not a 16-bit register".into(),
            }),
        }
    }

    fn read_u32(&self, register: Register) -> Result<u32, BusError> {
        let mut state = self.state.lock().unwrap();
        match register {
            Register::Config => Ok(state.config),
            Register::TsetGenRW => Ok(state.scratch_stuck.unwrap_or(state.scratch)),
            Register::SramDport => {
                if state.sram_window == ADDR_DWL_CTRL_AREA_GET {
                    state.on_get_poll();
                }
                Ok(state.sram_load_u32(state.sram_window))
            }
            Register::SramBaseAddr => Ok(state.sram_window),
            Register::Control => Ok(u32::from(state.control_word())),
            _ => Err(BusError::ReadFailed {
                register,
                message: "no mock backing".into(),
            }),
        }
    }

    fn write_u32(&self, register: Register, value: u32) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        match register {
            Register::Config => {
                // Prefetches complete instantly.
                state.config = value & !CFG_PREFETCH_BIT;
                Ok(())
            }
            Register::TsetGenRW => {
                state.scratch = value;
                Ok(())
            }
            Register::SramBaseAddr => {
                state.sram_window = value;
                Ok(())
            }
            Register::SramDport => {
                let addr = state.sram_window;
                state.sram_store_u32(addr, value);
                state.on_sram_write(addr, 4);
                Ok(())
            }
            _ => Err(BusError::WriteFailed {
                register,
                message: "no mock backing".into(),
            }),
        }
    }

    fn read_block(&self, register: Register, length: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.state.lock().unwrap();
        match register {
            Register::InOutQueue => {
                let (frame, _) = state
                    .rx_frames
                    .pop_front()
                    .ok_or_else(|| BusError::TransferFailed("no frame queued".into()))?;
                if length < frame.len() + 2 {
                    return Err(BusError::TransferFailed(format!(
                        "read of {} bytes shorter than queued frame of {}",
                        length,
                        frame.len()
                    )));
                }
                let mut out = vec![0u8; length];
                out[..frame.len()].copy_from_slice(&frame);
                let piggyback = state.control_word();
                LittleEndian::write_u16(&mut out[length - 2..], piggyback);
                Ok(out)
            }
            Register::SramDport => {
                let addr = state.sram_window;
                Ok((0..length)
                    .map(|i| *state.sram.get(&addr.wrapping_add(i as u32)).unwrap_or(&0))
                    .collect())
            }
            _ => Err(BusError::ReadFailed {
                register,
                message: "not a block register".into(),
            }),
        }
    }

    fn write_block(&self, register: Register, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        match register {
            Register::InOutQueue => {
                state.tx_frames.push(data.to_vec());
                state.script_reply(data);
                Ok(())
            }
            Register::SramDport => {
                let addr = state.sram_window;
                state.sram_store(addr, data);
                state.on_sram_write(addr, data.len());
                Ok(())
            }
            _ => Err(BusError::WriteFailed {
                register,
                message: "not a block register".into(),
            }),
        }
    }

    fn enable_interrupt(&self) -> Result<(), BusError> {
        self.state.lock().unwrap().irq_enabled = true;
        Ok(())
    }

    fn disable_interrupt(&self) -> Result<(), BusError> {
        self.state.lock().unwrap().irq_enabled = false;
        Ok(())
    }

    fn reset_chip(&self) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        state.resets += 1;
        state.control = 0;
        state.config = (1 << 31) | (2 << 24) | CFG_ACCESS_MODE_BIT;
        Ok(())
    }

    fn set_wake_pin(&self, high: bool) -> Result<(), BusError> {
        self.state.lock().unwrap().wake_pin = high;
        Ok(())
    }
}

/// Builds the startup indication the firmware sends once it is running.
///
/// The body layout is fixed at 192 bytes; tests and the simulator reuse this
/// instead of hand-packing offsets.
pub fn startup_indication_frame(
    num_inp_ch_bufs: u16,
    mac_sta: [u8; 6],
    mac_softap: [u8; 6],
    firmware_label: &str,
) -> Vec<u8> {
    let mut body = vec![0u8; 192];
    LittleEndian::write_u32(&mut body[0..4], STATUS_SUCCESS);
    LittleEndian::write_u16(&mut body[4..6], 0x1001);
    body[6..11].copy_from_slice(b"WF200");
    LittleEndian::write_u16(&mut body[28..30], num_inp_ch_bufs);
    LittleEndian::write_u16(&mut body[30..32], 1600);
    body[32] = 8;
    body[33] = 2;
    body[34..40].copy_from_slice(&mac_sta);
    body[40..46].copy_from_slice(&mac_softap);
    body[46] = 3;
    body[47] = 3;
    body[52] = 0;
    body[53] = 12;
    body[54] = 3;
    body[55] = 1;
    LittleEndian::write_u32(&mut body[60..64], 0x3FFF);
    let label = firmware_label.as_bytes();
    let take = label.len().min(127);
    body[64..64 + take].copy_from_slice(&label[..take]);

    canned_frame(STARTUP_IND_ID, GENERAL_INTERFACE, &body)
}

/// Connect indication with canned beacon and PHY rate fields.
pub fn connect_indication_frame(status: u32, mac: [u8; 6], channel: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(16);
    body.extend_from_slice(&status.to_le_bytes());
    body.extend_from_slice(&mac);
    body.extend_from_slice(&channel.to_le_bytes());
    body.push(100);
    body.push(2);
    body.extend_from_slice(&0x0100u16.to_le_bytes());
    canned_frame(CONNECT_IND_ID, STA_INTERFACE, &body)
}

pub fn disconnect_indication_frame(mac: [u8; 6], reason: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(8);
    body.extend_from_slice(&mac);
    body.extend_from_slice(&reason.to_le_bytes());
    canned_frame(DISCONNECT_IND_ID, STA_INTERFACE, &body)
}

pub fn scan_result_indication_frame(ssid: &str, mac: [u8; 6], channel: u16, rcpi: u16) -> Vec<u8> {
    let mut body = vec![0u8; 52];
    let take = ssid.len().min(32);
    LittleEndian::write_u32(&mut body[0..4], take as u32);
    body[4..4 + take].copy_from_slice(&ssid.as_bytes()[..take]);
    body[36..42].copy_from_slice(&mac);
    LittleEndian::write_u16(&mut body[42..44], channel);
    LittleEndian::write_u16(&mut body[48..50], rcpi);
    canned_frame(SCAN_RESULT_IND_ID, STA_INTERFACE, &body)
}

pub fn scan_complete_indication_frame(status: u32) -> Vec<u8> {
    canned_frame(SCAN_COMPLETE_IND_ID, STA_INTERFACE, &status.to_le_bytes())
}

/// Received-frame indication carrying `payload` behind two alignment bytes.
pub fn received_indication_frame(interface: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(6 + payload.len());
    body.push(0);
    body.push(2);
    body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    body.extend_from_slice(&[0u8; 2]);
    body.extend_from_slice(payload);
    canned_frame(RECEIVED_IND_ID, interface, &body)
}

/// The chip's half of the public key exchange, signed with `key`.
fn exchange_reply(key: &[u8; 32]) -> Vec<u8> {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key).unwrap();
    mac.update(public.as_bytes());

    let mut body = Vec::with_capacity(100);
    body.extend_from_slice(&PUB_KEY_EXCHANGE_STATUS_SUCCESS.to_le_bytes());
    body.extend_from_slice(public.as_bytes());
    body.extend_from_slice(&mac.finalize().into_bytes());
    canned_frame(SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID, GENERAL_INTERFACE, &body)
}

fn canned_frame(id: u8, info: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    let length = (HEADER_SIZE + body.len()) as u16;
    frame.extend_from_slice(&FrameHeader::new(length, id, info).to_bytes());
    frame.extend_from_slice(body);
    frame
}
