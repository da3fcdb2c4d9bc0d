//! Encrypted link transport.
//!
//! Provisioned chips authenticate the host through a shared 256-bit MAC key
//! and negotiate a per-boot AES-128 session key over curve25519. Frames
//! whose id is marked in the encryption bitmap then travel encrypted under
//! AES-CCM with a 16-byte tag.
//!
//! An encrypted frame keeps the length, id and info bytes in the clear so
//! the receive path can size reads and route confirmations; the id and info
//! bytes are bound into the CCM tag as associated data instead of being
//! hidden. Between the clear header and the ciphertext sits a 4-byte counter
//! word whose top two bits name the nonce lane; each direction has its own
//! monotonic counter, kept in lockstep on both sides and never reused.

use aes::Aes128;
use byteorder::{ByteOrder, LittleEndian};
use ccm::Ccm;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U12, U16};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::protocol::constants::*;
use crate::protocol::frame::FrameHeader;

type Aes128Ccm = Ccm<Aes128, U16, U12>;
type HmacSha512 = Hmac<Sha512>;

/// Nonce lane selectors carried in the counter word's top two bits.
const LANE_HP: u8 = 0;
const LANE_RX: u8 = 1;
const LANE_TX: u8 = 2;

/// Provisioning state of the chip's secure link OTP section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecureLinkMode {
    /// Part without secure link support.
    #[default]
    NotApplicable,
    /// No MAC key burned; the link always runs clear.
    Untrusted,
    /// MAC key in RAM, encryption available but not demanded.
    TrustedEval,
    /// MAC key burned to OTP; the chip refuses clear sessions.
    TrustedEnforced,
}

impl SecureLinkMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0x1 => SecureLinkMode::Untrusted,
            0x2 => SecureLinkMode::TrustedEval,
            0x3 => SecureLinkMode::TrustedEnforced,
            _ => SecureLinkMode::NotApplicable,
        }
    }

    /// Whether this mode ever negotiates a session.
    pub fn uses_encryption(self) -> bool {
        matches!(self, SecureLinkMode::TrustedEval | SecureLinkMode::TrustedEnforced)
    }
}

impl std::fmt::Display for SecureLinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SecureLinkMode::NotApplicable => "NotApplicable",
            SecureLinkMode::Untrusted => "Untrusted",
            SecureLinkMode::TrustedEval => "TrustedEval",
            SecureLinkMode::TrustedEnforced => "TrustedEnforced",
        };
        write!(f, "{name}")
    }
}

/// Errors from session management and the encrypted transport.
#[derive(Debug, Error)]
pub enum SecureLinkError {
    #[error("secure link disabled in mode {mode}")]
    LinkDisabled { mode: SecureLinkMode },

    #[error("no MAC key available")]
    NoMacKey,

    #[error("no session key negotiated")]
    NoSessionKey,

    #[error("no key exchange in flight")]
    NoPendingExchange,

    #[error("chip public key failed MAC verification")]
    PublicKeyRejected,

    #[error("nonce counter exhausted, session must be renegotiated")]
    CounterOverflow,

    #[error("frame too short for the encrypted layout: {length} bytes")]
    MalformedFrame { length: usize },

    #[error("counter word names lane {lane}, expected the chip-to-host lane")]
    UnexpectedCounterLane { lane: u8 },

    #[error("frame is not marked encrypted")]
    NotEncrypted,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption or authentication failed")]
    DecryptFailed,
}

/// The 256-bit device MAC key, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; SECURELINK_MAC_KEY_LENGTH]);

impl MacKey {
    pub fn new(bytes: [u8; SECURELINK_MAC_KEY_LENGTH]) -> Self {
        MacKey(bytes)
    }

    /// Parses the 64-character hex spelling used in config files.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; SECURELINK_MAC_KEY_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(MacKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SECURELINK_MAC_KEY_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MacKey(..)")
    }
}

/// The negotiated 128-bit session key, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKey([u8; SECURELINK_SESSION_KEY_LENGTH]);

/// Per-lane nonce counters. The `hp` lane is reserved for out-of-band
/// traffic and stays at zero.
#[derive(Debug, Clone, Copy, Default)]
struct NonceCounters {
    hp: u32,
    rx: u32,
    tx: u32,
}

impl NonceCounters {
    /// Serializes the nonce for one lane, all other lanes zeroed.
    fn wire(&self, lane: u8) -> [u8; SECURELINK_NONCE_SIZE] {
        let mut nonce = [0u8; SECURELINK_NONCE_SIZE];
        let value = match lane {
            LANE_HP => self.hp,
            LANE_RX => self.rx,
            _ => self.tx,
        };
        let offset = usize::from(lane) * 4;
        LittleEndian::write_u32(&mut nonce[offset..offset + 4], value);
        nonce
    }
}

/// Marks `id` as requiring encryption.
pub fn bitmap_add(bitmap: &mut [u8; SECURELINK_ENCRYPTION_BITMAP_SIZE], id: u8) {
    bitmap[usize::from(id >> 3)] |= 1 << (id & 7);
}

/// Clears the encryption requirement for `id`.
pub fn bitmap_remove(bitmap: &mut [u8; SECURELINK_ENCRYPTION_BITMAP_SIZE], id: u8) {
    bitmap[usize::from(id >> 3)] &= !(1 << (id & 7));
}

pub fn bitmap_contains(bitmap: &[u8; SECURELINK_ENCRYPTION_BITMAP_SIZE], id: u8) -> bool {
    bitmap[usize::from(id >> 3)] & (1 << (id & 7)) != 0
}

/// Bitmap covering every id except the ones that must stay readable: the
/// key setup requests and the indications that can arrive before or after a
/// session exists.
pub fn default_bitmap() -> [u8; SECURELINK_ENCRYPTION_BITMAP_SIZE] {
    let mut bitmap = [0xFF; SECURELINK_ENCRYPTION_BITMAP_SIZE];
    for id in [
        SET_SECURELINK_MAC_KEY_REQ_ID,
        SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID,
        STARTUP_IND_ID,
        EXCEPTION_IND_ID,
        ERROR_IND_ID,
    ] {
        bitmap_remove(&mut bitmap, id);
    }
    bitmap
}

/// Host half of an in-flight public key exchange.
struct PendingExchange {
    secret: EphemeralSecret,
}

/// Secure link session state: keys, counters and the encryption bitmap.
pub struct SecureLink {
    mode: SecureLinkMode,
    mac_key: Option<MacKey>,
    session: Option<SessionKey>,
    pending: Option<PendingExchange>,
    nonce: NonceCounters,
    bitmap: [u8; SECURELINK_ENCRYPTION_BITMAP_SIZE],
    renegotiation_needed: bool,
}

impl SecureLink {
    pub fn new(mode: SecureLinkMode, mac_key: Option<MacKey>) -> Self {
        SecureLink {
            mode,
            mac_key,
            session: None,
            pending: None,
            nonce: NonceCounters::default(),
            bitmap: default_bitmap(),
            renegotiation_needed: false,
        }
    }

    pub fn mode(&self) -> SecureLinkMode {
        self.mode
    }

    pub fn session_active(&self) -> bool {
        self.session.is_some()
    }

    /// Set once a nonce counter crosses the watermark; cleared by the next
    /// completed exchange.
    pub fn renegotiation_needed(&self) -> bool {
        self.renegotiation_needed
    }

    /// Flags the session for renegotiation, e.g. after the chip reports a
    /// stale session key.
    pub fn require_renegotiation(&mut self) {
        self.renegotiation_needed = true;
    }

    pub fn bitmap(&self) -> &[u8; SECURELINK_ENCRYPTION_BITMAP_SIZE] {
        &self.bitmap
    }

    pub fn set_bitmap(&mut self, bitmap: [u8; SECURELINK_ENCRYPTION_BITMAP_SIZE]) {
        self.bitmap = bitmap;
    }

    /// True when `id` must travel encrypted on the current link.
    pub fn requires_encryption(&self, id: u8) -> bool {
        self.session.is_some() && bitmap_contains(&self.bitmap, id)
    }

    /// Drops the session key; the link reverts to clear frames.
    pub fn invalidate_session(&mut self) {
        self.session = None;
        self.nonce = NonceCounters::default();
    }

    /// Starts a key exchange: generates an ephemeral curve25519 keypair and
    /// returns the request body (public key plus its HMAC-SHA512 tag).
    pub fn begin_key_exchange(
        &mut self,
    ) -> Result<[u8; SECURELINK_PUB_KEY_SIZE + SECURELINK_PUB_KEY_MAC_SIZE], SecureLinkError> {
        if !self.mode.uses_encryption() {
            return Err(SecureLinkError::LinkDisabled { mode: self.mode });
        }
        let mac_key = self.mac_key.as_ref().ok_or(SecureLinkError::NoMacKey)?;

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let host_pub_key = *PublicKey::from(&secret).as_bytes();

        let mut mac = <HmacSha512 as Mac>::new_from_slice(mac_key.as_bytes())
            .map_err(|_| SecureLinkError::NoMacKey)?;
        mac.update(&host_pub_key);
        let tag = mac.finalize().into_bytes();

        let mut body = [0u8; SECURELINK_PUB_KEY_SIZE + SECURELINK_PUB_KEY_MAC_SIZE];
        body[..SECURELINK_PUB_KEY_SIZE].copy_from_slice(&host_pub_key);
        body[SECURELINK_PUB_KEY_SIZE..].copy_from_slice(&tag);

        self.pending = Some(PendingExchange { secret });
        Ok(body)
    }

    /// Finishes the exchange with the chip's half: authenticates its public
    /// key, derives the session key and resets the nonce counters.
    pub fn complete_key_exchange(
        &mut self,
        ncp_pub_key: &[u8; SECURELINK_PUB_KEY_SIZE],
        ncp_pub_key_mac: &[u8; SECURELINK_PUB_KEY_MAC_SIZE],
    ) -> Result<(), SecureLinkError> {
        let mac_key = self.mac_key.as_ref().ok_or(SecureLinkError::NoMacKey)?;
        let pending = self.pending.take().ok_or(SecureLinkError::NoPendingExchange)?;

        let mut mac = <HmacSha512 as Mac>::new_from_slice(mac_key.as_bytes())
            .map_err(|_| SecureLinkError::NoMacKey)?;
        mac.update(ncp_pub_key);
        if mac.verify_slice(ncp_pub_key_mac).is_err() {
            return Err(SecureLinkError::PublicKeyRejected);
        }

        let shared = pending.secret.diffie_hellman(&PublicKey::from(*ncp_pub_key));
        let digest = Sha256::digest(shared.as_bytes());

        let mut key = [0u8; SECURELINK_SESSION_KEY_LENGTH];
        key.copy_from_slice(&digest[..SECURELINK_SESSION_KEY_LENGTH]);
        self.session = Some(SessionKey(key));
        self.nonce = NonceCounters::default();
        self.renegotiation_needed = false;
        Ok(())
    }

    /// Encrypts a host-to-chip frame. Fails closed without a session key.
    pub fn encrypt_frame(
        &mut self,
        id: u8,
        info: u8,
        body: &[u8],
    ) -> Result<Vec<u8>, SecureLinkError> {
        if self.nonce.tx > SECURELINK_NONCE_COUNTER_MAX {
            return Err(SecureLinkError::CounterOverflow);
        }
        let counter = self.nonce.tx;
        let frame = self.seal(LANE_TX, counter, id, info, body)?;
        self.nonce.tx += 1;
        if self.nonce.tx >= SECURELINK_NONCE_WATERMARK {
            self.renegotiation_needed = true;
        }
        Ok(frame)
    }

    /// Decrypts a chip-to-host frame and returns the equivalent clear
    /// header and body.
    pub fn decrypt_frame(&mut self, raw: &[u8]) -> Result<(FrameHeader, Vec<u8>), SecureLinkError> {
        let session = self.session.as_ref().ok_or(SecureLinkError::NoSessionKey)?;
        if raw.len() < HEADER_SIZE + SECURELINK_OVERHEAD {
            return Err(SecureLinkError::MalformedFrame { length: raw.len() });
        }
        let header = FrameHeader::from_bytes(raw)
            .map_err(|_| SecureLinkError::MalformedFrame { length: raw.len() })?;
        if header.info & MSG_INFO_SECURE_LINK == 0 {
            return Err(SecureLinkError::NotEncrypted);
        }
        let declared = usize::from(header.length);
        if declared < HEADER_SIZE + SECURELINK_OVERHEAD || declared > raw.len() {
            return Err(SecureLinkError::MalformedFrame { length: raw.len() });
        }

        let counter_word = LittleEndian::read_u32(&raw[4..8]);
        let lane = (counter_word >> 30) as u8;
        if lane != LANE_RX {
            return Err(SecureLinkError::UnexpectedCounterLane { lane });
        }

        let cipher = Aes128Ccm::new_from_slice(&session.0)
            .map_err(|_| SecureLinkError::DecryptFailed)?;
        let nonce = self.nonce.wire(LANE_RX);
        let aad = [header.id, header.info];
        let body = cipher
            .decrypt(
                GenericArray::from_slice(&nonce),
                Payload {
                    msg: &raw[HEADER_SIZE + SECURELINK_HEADER_SIZE..declared],
                    aad: &aad,
                },
            )
            .map_err(|_| SecureLinkError::DecryptFailed)?;

        self.nonce.rx += 1;
        if self.nonce.rx >= SECURELINK_NONCE_WATERMARK {
            self.renegotiation_needed = true;
        }

        let clear_header = FrameHeader::new(
            (HEADER_SIZE + body.len()) as u16,
            header.id,
            header.info & !MSG_INFO_SECURE_LINK,
        );
        Ok((clear_header, body))
    }

    /// Builds one encrypted frame for the given lane and counter value.
    fn seal(
        &self,
        lane: u8,
        counter: u32,
        id: u8,
        info: u8,
        body: &[u8],
    ) -> Result<Vec<u8>, SecureLinkError> {
        let session = self.session.as_ref().ok_or(SecureLinkError::NoSessionKey)?;

        let mut padded = body.to_vec();
        if padded.len() % 2 != 0 {
            padded.push(0);
        }

        let info = info | MSG_INFO_SECURE_LINK;
        let total = HEADER_SIZE + SECURELINK_OVERHEAD + padded.len();
        let aad = [id, info];

        let cipher = Aes128Ccm::new_from_slice(&session.0)
            .map_err(|_| SecureLinkError::EncryptFailed)?;
        let mut nonce = NonceCounters::default();
        match lane {
            LANE_HP => nonce.hp = counter,
            LANE_RX => nonce.rx = counter,
            _ => nonce.tx = counter,
        }
        let nonce = nonce.wire(lane);
        let sealed = cipher
            .encrypt(
                GenericArray::from_slice(&nonce),
                Payload {
                    msg: &padded,
                    aad: &aad,
                },
            )
            .map_err(|_| SecureLinkError::EncryptFailed)?;

        let mut frame = Vec::with_capacity(total);
        frame.extend_from_slice(&FrameHeader::new(total as u16, id, info).to_bytes());
        frame.extend_from_slice(&(counter | (u32::from(lane) << 30)).to_le_bytes());
        frame.extend_from_slice(&sealed);
        debug_assert_eq!(frame.len(), total);
        Ok(frame)
    }
}

impl std::fmt::Debug for SecureLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureLink")
            .field("mode", &self.mode)
            .field("session_active", &self.session.is_some())
            .field("renegotiation_needed", &self.renegotiation_needed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mac_key() -> MacKey {
        MacKey::new([0x2B; SECURELINK_MAC_KEY_LENGTH])
    }

    /// Stand-in for the chip side of an exchange: consumes the host request
    /// body and produces the confirmation fields plus the derived key.
    fn chip_answer(
        mac_key: &MacKey,
        request_body: &[u8],
    ) -> (
        [u8; SECURELINK_PUB_KEY_SIZE],
        [u8; SECURELINK_PUB_KEY_MAC_SIZE],
        [u8; SECURELINK_SESSION_KEY_LENGTH],
    ) {
        let mut host_pub = [0u8; SECURELINK_PUB_KEY_SIZE];
        host_pub.copy_from_slice(&request_body[..SECURELINK_PUB_KEY_SIZE]);

        let chip_secret = EphemeralSecret::random_from_rng(OsRng);
        let chip_pub = *PublicKey::from(&chip_secret).as_bytes();

        let mut mac = <HmacSha512 as Mac>::new_from_slice(mac_key.as_bytes()).unwrap();
        mac.update(&chip_pub);
        let mut chip_pub_mac = [0u8; SECURELINK_PUB_KEY_MAC_SIZE];
        chip_pub_mac.copy_from_slice(&mac.finalize().into_bytes());

        let shared = chip_secret.diffie_hellman(&PublicKey::from(host_pub));
        let digest = Sha256::digest(shared.as_bytes());
        let mut session = [0u8; SECURELINK_SESSION_KEY_LENGTH];
        session.copy_from_slice(&digest[..SECURELINK_SESSION_KEY_LENGTH]);

        (chip_pub, chip_pub_mac, session)
    }

    fn negotiated_pair() -> (SecureLink, [u8; SECURELINK_SESSION_KEY_LENGTH]) {
        let mac_key = test_mac_key();
        let mut link = SecureLink::new(SecureLinkMode::TrustedEval, Some(mac_key.clone()));
        let request = link.begin_key_exchange().unwrap();
        let (chip_pub, chip_mac, chip_session) = chip_answer(&mac_key, &request);
        link.complete_key_exchange(&chip_pub, &chip_mac).unwrap();
        (link, chip_session)
    }

    /// Chip-side encrypt: rx lane, explicit counter.
    fn chip_encrypt(
        session: &[u8; SECURELINK_SESSION_KEY_LENGTH],
        counter: u32,
        id: u8,
        info: u8,
        body: &[u8],
    ) -> Vec<u8> {
        let mut link = SecureLink::new(SecureLinkMode::TrustedEval, None);
        link.session = Some(SessionKey(*session));
        link.seal(LANE_RX, counter, id, info, body).unwrap()
    }

    #[test]
    fn exchange_derives_the_same_key_on_both_sides() {
        let (mut link, chip_session) = negotiated_pair();
        assert!(link.session_active());

        let frame = chip_encrypt(&chip_session, 0, CONNECT_IND_ID, STA_INTERFACE, &[9, 8, 7, 6]);
        let (header, body) = link.decrypt_frame(&frame).unwrap();
        assert_eq!(header.id, CONNECT_IND_ID);
        assert_eq!(header.info & MSG_INFO_SECURE_LINK, 0);
        assert_eq!(body, vec![9, 8, 7, 6]);
    }

    #[test]
    fn tampered_chip_key_is_rejected() {
        let mac_key = test_mac_key();
        let mut link = SecureLink::new(SecureLinkMode::TrustedEval, Some(mac_key.clone()));
        let request = link.begin_key_exchange().unwrap();
        let (chip_pub, mut chip_mac, _) = chip_answer(&mac_key, &request);
        chip_mac[10] ^= 0xFF;

        let err = link.complete_key_exchange(&chip_pub, &chip_mac).unwrap_err();
        assert!(matches!(err, SecureLinkError::PublicKeyRejected));
        assert!(!link.session_active());
    }

    #[test]
    fn exchange_is_refused_while_the_link_runs_clear() {
        let mut link = SecureLink::new(SecureLinkMode::NotApplicable, Some(test_mac_key()));
        assert!(matches!(
            link.begin_key_exchange(),
            Err(SecureLinkError::LinkDisabled {
                mode: SecureLinkMode::NotApplicable
            })
        ));
    }

    #[test]
    fn encrypt_without_session_fails_closed() {
        let mut link = SecureLink::new(SecureLinkMode::TrustedEnforced, Some(test_mac_key()));
        let err = link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SecureLinkError::NoSessionKey));
    }

    #[test]
    fn encrypted_frame_layout_and_overhead() {
        let (mut link, _) = negotiated_pair();
        let frame = link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[1, 2, 3, 4]).unwrap();

        assert_eq!(frame.len(), HEADER_SIZE + SECURELINK_OVERHEAD + 4);
        let header = FrameHeader::from_bytes(&frame).unwrap();
        assert_eq!(usize::from(header.length), frame.len());
        assert_eq!(header.id, CONNECT_REQ_ID);
        assert_ne!(header.info & MSG_INFO_SECURE_LINK, 0);

        let counter_word = LittleEndian::read_u32(&frame[4..8]);
        assert_eq!(counter_word >> 30, u32::from(LANE_TX));
        assert_eq!(counter_word & SECURELINK_NONCE_COUNTER_MAX, 0);

        // Ciphertext differs from the plaintext body.
        assert_ne!(&frame[8..12], &[1, 2, 3, 4]);
    }

    #[test]
    fn tx_counter_advances_per_frame() {
        let (mut link, _) = negotiated_pair();
        link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[0; 4]).unwrap();
        let frame = link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[0; 4]).unwrap();
        let counter_word = LittleEndian::read_u32(&frame[4..8]);
        assert_eq!(counter_word & SECURELINK_NONCE_COUNTER_MAX, 1);
    }

    #[test]
    fn replayed_frame_fails_authentication() {
        let (mut link, chip_session) = negotiated_pair();
        let frame = chip_encrypt(&chip_session, 0, SCAN_RESULT_IND_ID, STA_INTERFACE, &[1, 1]);

        link.decrypt_frame(&frame).unwrap();
        // Local rx counter moved on, so the same bytes no longer verify.
        let err = link.decrypt_frame(&frame).unwrap_err();
        assert!(matches!(err, SecureLinkError::DecryptFailed));
    }

    #[test]
    fn tampered_clear_id_breaks_the_tag() {
        let (mut link, chip_session) = negotiated_pair();
        let mut frame = chip_encrypt(&chip_session, 0, SCAN_RESULT_IND_ID, STA_INTERFACE, &[5; 8]);
        frame[2] = CONNECT_IND_ID;

        let err = link.decrypt_frame(&frame).unwrap_err();
        assert!(matches!(err, SecureLinkError::DecryptFailed));
    }

    #[test]
    fn wrong_lane_is_rejected_before_decryption() {
        let (mut link, chip_session) = negotiated_pair();
        let mut other = SecureLink::new(SecureLinkMode::TrustedEval, None);
        other.session = Some(SessionKey(chip_session));
        let frame = other.seal(LANE_TX, 0, SCAN_RESULT_IND_ID, STA_INTERFACE, &[5; 8]).unwrap();

        let err = link.decrypt_frame(&frame).unwrap_err();
        assert!(matches!(err, SecureLinkError::UnexpectedCounterLane { lane: 2 }));
    }

    #[test]
    fn watermark_raises_renegotiation_flag() {
        let (mut link, _) = negotiated_pair();
        link.nonce.tx = SECURELINK_NONCE_WATERMARK - 1;
        link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[0; 2]).unwrap();
        assert!(link.renegotiation_needed());
    }

    #[test]
    fn exhausted_counter_refuses_to_encrypt() {
        let (mut link, _) = negotiated_pair();
        link.nonce.tx = SECURELINK_NONCE_COUNTER_MAX + 1;
        let err = link.encrypt_frame(CONNECT_REQ_ID, STA_INTERFACE, &[0; 2]).unwrap_err();
        assert!(matches!(err, SecureLinkError::CounterOverflow));
    }

    #[test]
    fn default_bitmap_leaves_setup_messages_clear() {
        let bitmap = default_bitmap();
        assert!(!bitmap_contains(&bitmap, SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID));
        assert!(!bitmap_contains(&bitmap, SET_SECURELINK_MAC_KEY_REQ_ID));
        assert!(!bitmap_contains(&bitmap, STARTUP_IND_ID));
        assert!(bitmap_contains(&bitmap, CONNECT_REQ_ID));
        assert!(bitmap_contains(&bitmap, SEND_FRAME_REQ_ID));
    }

    #[test]
    fn bitmap_add_remove_roundtrip() {
        let mut bitmap = [0u8; SECURELINK_ENCRYPTION_BITMAP_SIZE];
        bitmap_add(&mut bitmap, SCAN_RESULT_IND_ID);
        assert!(bitmap_contains(&bitmap, SCAN_RESULT_IND_ID));
        bitmap_remove(&mut bitmap, SCAN_RESULT_IND_ID);
        assert!(!bitmap_contains(&bitmap, SCAN_RESULT_IND_ID));
    }

    #[test]
    fn invalidate_session_drops_the_key() {
        let (mut link, _) = negotiated_pair();
        link.invalidate_session();
        assert!(!link.session_active());
        assert!(!link.requires_encryption(CONNECT_REQ_ID));
    }
}
