//! Protocol constants for the full-MAC Wi-Fi NCP.
//!
//! Every value here is bit-exact against what the chip firmware emits or
//! expects; none of them are negotiable at run time.

// ============================================================================
// Message Header
// ============================================================================

/// Wire header size (length u16 + id u8 + info u8).
pub const HEADER_SIZE: usize = 4;

/// Mask extracting the message id from a 16-bit id/info pair.
pub const MSG_ID_MASK: u16 = 0x00FF;

/// Top bit of the id byte: set on chip-to-host indications.
pub const MSG_TYPE_IND: u8 = 0x80;

/// Interface selector bits inside the info byte.
pub const MSG_INFO_INTERFACE_MASK: u8 = 0x06;

/// Encrypted-frame bit inside the info byte.
pub const MSG_INFO_SECURE_LINK: u8 = 0x40;

/// Default confirmation payload buffer (largest confirmation we retain).
pub const EVENT_BUFFER_SIZE: usize = 512;

// ============================================================================
// Interfaces
// ============================================================================

/// Station interface (interface 0).
pub const STA_INTERFACE: u8 = 0x00;
/// SoftAP interface (interface 1).
pub const SOFTAP_INTERFACE: u8 = 0x02;
/// General (non-MAC) interface.
pub const GENERAL_INTERFACE: u8 = 0x04;

// ============================================================================
// General API request ids (Host -> Chip)
// ============================================================================

/// PDS configuration fragment.
pub const CONFIGURATION_REQ_ID: u8 = 0x09;
/// GPIO control.
pub const CONTROL_GPIO_REQ_ID: u8 = 0x26;
/// Burn or stage the Secure Link MAC key.
pub const SET_SECURELINK_MAC_KEY_REQ_ID: u8 = 0x27;
/// Secure Link public key exchange.
pub const SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID: u8 = 0x28;
/// Secure Link encryption bitmap / session control.
pub const SECURELINK_CONFIGURE_REQ_ID: u8 = 0x29;
/// Burn the minimum accepted firmware revision into OTP.
pub const PREVENT_ROLLBACK_REQ_ID: u8 = 0x2A;
/// Power the chip down.
pub const SHUT_DOWN_REQ_ID: u8 = 0x32;

// ============================================================================
// General API indication ids (Chip -> Host)
// ============================================================================

/// Firmware exception dump. Fatal; the chip must be rebooted.
pub const EXCEPTION_IND_ID: u8 = 0xE0;
/// First message after boot, carries negotiated parameters.
pub const STARTUP_IND_ID: u8 = 0xE1;
/// Generic status / debug payload.
pub const GENERIC_IND_ID: u8 = 0xE3;
/// Firmware-reported error. Fatal; the chip must be rebooted.
pub const ERROR_IND_ID: u8 = 0xE4;

// ============================================================================
// Full-MAC (WFM) request ids
// ============================================================================

pub const SET_MAC_ADDRESS_REQ_ID: u8 = 0x42;
pub const CONNECT_REQ_ID: u8 = 0x43;
pub const DISCONNECT_REQ_ID: u8 = 0x44;
pub const START_AP_REQ_ID: u8 = 0x45;
pub const UPDATE_AP_REQ_ID: u8 = 0x46;
pub const STOP_AP_REQ_ID: u8 = 0x47;
pub const SEND_FRAME_REQ_ID: u8 = 0x4A;
pub const START_SCAN_REQ_ID: u8 = 0x4B;
pub const STOP_SCAN_REQ_ID: u8 = 0x4C;
pub const GET_SIGNAL_STRENGTH_REQ_ID: u8 = 0x4E;
pub const DISCONNECT_AP_CLIENT_REQ_ID: u8 = 0x4F;
pub const JOIN_IBSS_REQ_ID: u8 = 0x50;
pub const LEAVE_IBSS_REQ_ID: u8 = 0x51;
pub const SET_PM_MODE_REQ_ID: u8 = 0x52;
pub const ADD_MULTICAST_ADDR_REQ_ID: u8 = 0x53;
pub const REMOVE_MULTICAST_ADDR_REQ_ID: u8 = 0x54;
pub const SET_MAX_AP_CLIENT_COUNT_REQ_ID: u8 = 0x55;
pub const SET_MAX_AP_CLIENT_INACTIVITY_REQ_ID: u8 = 0x56;
pub const SET_ROAM_PARAMETERS_REQ_ID: u8 = 0x57;
pub const SET_TX_RATE_PARAMETERS_REQ_ID: u8 = 0x58;
pub const SET_ARP_IP_ADDRESS_REQ_ID: u8 = 0x59;
pub const SET_NS_IP_ADDRESS_REQ_ID: u8 = 0x5A;
pub const SET_BROADCAST_FILTER_REQ_ID: u8 = 0x5B;
pub const SET_SCAN_PARAMETERS_REQ_ID: u8 = 0x5C;

// ============================================================================
// Full-MAC (WFM) body field sizes
// ============================================================================

/// SSID field width inside an SSID definition (length word + bytes).
pub const SSID_SIZE: usize = 32;
/// Passphrase field width in connect, join-IBSS and start-AP bodies.
pub const PASSWORD_SIZE: usize = 64;
/// Directed-probe SSIDs a scan request can carry.
pub const MAX_SCAN_SSIDS: usize = 2;
/// IPv4 slots in the ARP offloading table.
pub const ARP_IP_ADDR_COUNT: usize = 2;
/// IPv6 slots in the neighbor-solicitation offloading table.
pub const NS_IP_ADDR_COUNT: usize = 2;

// ============================================================================
// Full-MAC (WFM) indication ids
// ============================================================================

pub const CONNECT_IND_ID: u8 = 0xC3;
pub const DISCONNECT_IND_ID: u8 = 0xC4;
pub const START_AP_IND_ID: u8 = 0xC5;
pub const STOP_AP_IND_ID: u8 = 0xC7;
pub const RECEIVED_IND_ID: u8 = 0xCA;
pub const SCAN_RESULT_IND_ID: u8 = 0xCB;
pub const SCAN_COMPLETE_IND_ID: u8 = 0xCC;
pub const AP_CLIENT_CONNECTED_IND_ID: u8 = 0xCD;
pub const AP_CLIENT_REJECTED_IND_ID: u8 = 0xCE;
pub const AP_CLIENT_DISCONNECTED_IND_ID: u8 = 0xCF;
pub const JOIN_IBSS_IND_ID: u8 = 0xD0;
pub const LEAVE_IBSS_IND_ID: u8 = 0xD1;

// ============================================================================
// Confirmation status words
// ============================================================================

pub const STATUS_SUCCESS: u32 = 0x0;
pub const STATUS_FAILURE: u32 = 0x1;
pub const STATUS_INVALID_PARAMETER: u32 = 0x2;
/// GPIO command executed with a warning (e.g. reading an output pin).
pub const STATUS_GPIO_WARNING: u32 = 0x3;
pub const STATUS_UNSUPPORTED_MSG_ID: u32 = 0x4;

// Secure Link MAC key burn outcomes.
pub const MAC_KEY_STATUS_SUCCESS: u32 = 0x5A;
pub const MAC_KEY_STATUS_ALREADY_BURNED: u32 = 0x6B;
pub const MAC_KEY_STATUS_RAM_MODE_NOT_ALLOWED: u32 = 0x7C;
pub const MAC_KEY_STATUS_UNKNOWN_MODE: u32 = 0x8D;

// Secure Link public key exchange outcomes.
pub const PUB_KEY_EXCHANGE_STATUS_SUCCESS: u32 = 0x9E;
pub const PUB_KEY_EXCHANGE_STATUS_FAILED: u32 = 0xAF;

// Rollback prevention outcomes.
pub const PREVENT_ROLLBACK_STATUS_SUCCESS: u32 = 0x1234;
pub const PREVENT_ROLLBACK_STATUS_WRONG_MAGIC: u32 = 0x1256;

/// Magic word the chip requires before burning the rollback fuse.
pub const PREVENT_ROLLBACK_MAGIC_WORD: u32 = 0x5C89_12F3;

// ============================================================================
// Error indication types
// ============================================================================

pub const ERROR_FIRMWARE_ROLLBACK: u32 = 0;
pub const ERROR_FIRMWARE_DEBUG_ENABLED: u32 = 1;
pub const ERROR_OUTDATED_SESSION_KEY: u32 = 2;
pub const ERROR_INVALID_SESSION_KEY: u32 = 3;
pub const ERROR_OOR_VOLTAGE: u32 = 4;
pub const ERROR_PDS_VERSION: u32 = 5;

// ============================================================================
// Secure Link
// ============================================================================

/// Device-unique authentication key, 256 bits.
pub const SECURELINK_MAC_KEY_LENGTH: usize = 32;
/// AES session key, 128 bits.
pub const SECURELINK_SESSION_KEY_LENGTH: usize = 16;
/// One bit per message id, 256 ids.
pub const SECURELINK_ENCRYPTION_BITMAP_SIZE: usize = 32;
/// Clear-text prefix on an encrypted frame (length word + counter word).
pub const SECURELINK_HEADER_SIZE: usize = 4;
pub const SECURELINK_CCM_TAG_SIZE: usize = 16;
pub const SECURELINK_NONCE_SIZE: usize = 12;
pub const SECURELINK_OVERHEAD: usize = SECURELINK_HEADER_SIZE + SECURELINK_CCM_TAG_SIZE;
/// Hard ceiling for any nonce counter; the session must die before this.
pub const SECURELINK_NONCE_COUNTER_MAX: u32 = 0x3FFF_FFFF;
/// Renegotiate once a counter crosses this line.
pub const SECURELINK_NONCE_WATERMARK: u32 = 536_870_912;

/// Curve25519 public key size.
pub const SECURELINK_PUB_KEY_SIZE: usize = 32;
/// HMAC-SHA512 tag over a public key.
pub const SECURELINK_PUB_KEY_MAC_SIZE: usize = 64;

/// MAC key destination selectors.
pub const MAC_KEY_DEST_OTP: u8 = 0x78;
pub const MAC_KEY_DEST_RAM: u8 = 0x87;

/// `skey_invld` field: invalidate the current session key.
pub const SESSION_KEY_INVALIDATE: u8 = 0x87;
/// `skey_invld` field: leave the session key alone.
pub const SESSION_KEY_NOP: u8 = 0x00;

// ============================================================================
// Data path
// ============================================================================

/// Frame type tag carried in a send-frame request body.
pub const FRAME_TYPE_DATA: u8 = 0x8;

// 802.11 access categories for the send-frame priority field.
pub const PRIORITY_BE: u8 = 0;
pub const PRIORITY_BK: u8 = 1;
pub const PRIORITY_VI: u8 = 2;
pub const PRIORITY_VO: u8 = 3;

// ============================================================================
// Boot handshake words (host side, written to the download control area)
// ============================================================================

pub const HOST_STATE_NOT_READY: u32 = 0x1234_5678;
pub const HOST_STATE_READY: u32 = 0x8765_4321;
pub const HOST_STATE_INFO_READ: u32 = 0xA753_BD99;
pub const HOST_STATE_UPLOAD_PENDING: u32 = 0xABCD_DCBA;
pub const HOST_STATE_UPLOAD_COMPLETE: u32 = 0xD4C6_4A99;
pub const HOST_STATE_OK_TO_JUMP: u32 = 0x174F_C882;

// ============================================================================
// Boot handshake words (chip side, read from the download control area)
// ============================================================================

pub const NCP_STATE_NOT_READY: u32 = 0x1234_5678;
pub const NCP_STATE_INFO_READY: u32 = 0xBD53_EF99;
pub const NCP_STATE_READY: u32 = 0x8765_4321;
pub const NCP_STATE_DOWNLOAD_PENDING: u32 = 0xABCD_DCBA;
pub const NCP_STATE_DOWNLOAD_COMPLETE: u32 = 0xCAFE_FECA;
pub const NCP_STATE_AUTH_OK: u32 = 0xD4C6_4A99;
pub const NCP_STATE_AUTH_FAIL: u32 = 0x174F_C882;
pub const NCP_STATE_PUB_KEY_READY: u32 = 0x7AB4_1D19;

// ============================================================================
// Firmware download area (chip SRAM addresses)
// ============================================================================

/// Circular download buffer base.
pub const ADDR_DOWNLOAD_FIFO_BASE: u32 = 0x0900_4000;
/// Circular download buffer size, 32 KiB.
pub const DOWNLOAD_FIFO_SIZE: u32 = 0x8000;
/// Transfer unit for firmware streaming.
pub const DOWNLOAD_BLOCK_SIZE: u32 = 1024;

/// Download control area base.
pub const ADDR_DWL_CTRL_AREA: u32 = 0x0900_C000;
pub const ADDR_DWL_CTRL_AREA_IMAGE_SIZE: u32 = ADDR_DWL_CTRL_AREA;
pub const ADDR_DWL_CTRL_AREA_PUT: u32 = ADDR_DWL_CTRL_AREA + 4;
pub const ADDR_DWL_CTRL_AREA_GET: u32 = ADDR_DWL_CTRL_AREA + 8;
pub const ADDR_DWL_CTRL_AREA_HOST_STATUS: u32 = ADDR_DWL_CTRL_AREA + 12;
pub const ADDR_DWL_CTRL_AREA_NCP_STATUS: u32 = ADDR_DWL_CTRL_AREA + 16;
pub const ADDR_DWL_CTRL_AREA_SIGNATURE: u32 = ADDR_DWL_CTRL_AREA + 20;
pub const ADDR_DWL_CTRL_AREA_FW_HASH: u32 = ADDR_DWL_CTRL_AREA + 84;
pub const ADDR_DWL_CTRL_AREA_FW_VERSION: u32 = ADDR_DWL_CTRL_AREA + 92;

/// Chip part/keyset info block.
pub const ADDR_PTE_INFO: u32 = 0x0900_C0C0;
/// Offset of the keyset byte inside the PTE info block.
pub const PTE_INFO_KEYSET_OFFSET: u32 = 12;

/// Value written to the version word after signature and hash.
pub const FW_VERSION_VALUE: u32 = 0x0000_0001;

/// Word the bootloader expects at the FIFO base before the first block.
pub const BOOTLOADER_PROBE_WORD: u32 = 0x23AB_C88E;

// ============================================================================
// Firmware image security block (leads the image file)
// ============================================================================

pub const FW_KEYSET_SIZE: usize = 8;
pub const FW_SIGNATURE_SIZE: usize = 64;
pub const FW_HASH_SIZE: usize = 8;
/// Keyset + signature + hash; the streamed payload excludes these bytes.
pub const FW_SECURITY_BLOCK_SIZE: usize = FW_KEYSET_SIZE + FW_SIGNATURE_SIZE + FW_HASH_SIZE;

// ============================================================================
// Bus wake-up probe
// ============================================================================

/// Values written through the scratch register and read back to prove the
/// SPI/SDIO wiring before anything else touches the chip.
pub const SRAM_PROBE_VALUES: [u32; 5] = [
    0x0720_8775,
    0x082E_C020,
    0x093C_3C3C,
    0x0B32_2C44,
    0x0CA0_6497,
];

// ============================================================================
// Polling budgets
// ============================================================================

/// Wake-up: retries x delay while waiting for the ready bit.
pub const WAKEUP_POLL_RETRIES: u32 = 200;
pub const WAKEUP_POLL_DELAY_MS: u64 = 1;

/// Boot handshake and window waits.
pub const BOOT_POLL_RETRIES: u32 = 100;
pub const BOOT_POLL_DELAY_MS: u64 = 1;

/// SRAM prefetch completion.
pub const PREFETCH_POLL_RETRIES: u32 = 20;
pub const PREFETCH_POLL_DELAY_MS: u64 = 1;

/// Default command confirmation budget.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3_000;
/// Default startup indication budget after the firmware jump.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5_000;
