//! Device-wide commands: PDS configuration, GPIO control, the secure link
//! key lifecycle and rollback protection.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tracing::info;

use crate::driver::Fmac;
use crate::error::FmacError;
use crate::events::{WifiEvent, WifiObserver};
use crate::protocol::constants::*;
use crate::protocol::registers::{cfg_hardware_revision, cfg_hardware_type};
use crate::protocol::{Register, decode_confirmation_status};
use crate::securelink::MacKey;
use crate::transport::BusTransport;

/// Drive mode for one of the chip's general-purpose pins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GpioMode {
    OutputLow = 0,
    OutputHigh = 1,
    OpenDrainLow = 2,
    OpenDrainHigh = 3,
    Tristate = 4,
    Toggle = 5,
    Read = 6,
}

/// What a GPIO command read back from the pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpioReadback {
    pub value: u32,
    /// The firmware saw a level it did not drive, likely a conflict on
    /// the line.
    pub drive_conflict: bool,
}

/// Where a secure link MAC key gets written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacKeyDestination {
    /// One-time programmable fuses; irreversible.
    Otp,
    /// Volatile, for evaluation; lost at reset.
    Ram,
}

impl MacKeyDestination {
    fn wire_value(self) -> u8 {
        match self {
            MacKeyDestination::Otp => MAC_KEY_DEST_OTP,
            MacKeyDestination::Ram => MAC_KEY_DEST_RAM,
        }
    }
}

/// RF output selection, applied through a generated PDS fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AntennaConfig {
    Antenna1 = 0,
    Antenna2 = 1,
    Tx1Rx2 = 2,
    Tx2Rx1 = 3,
    /// The chip arbitrates between both antennas itself.
    Diversity = 4,
}

/// Configuration request body: length word plus the PDS text.
pub(crate) fn configuration_body(pds: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + pds.len());
    body.write_u16::<LittleEndian>(pds.len() as u16).unwrap();
    body.extend_from_slice(pds.as_bytes());
    body
}

impl<B: BusTransport, O: WifiObserver> Fmac<B, O> {
    /// Sends one compressed PDS chunk to the firmware.
    pub fn send_configuration(&self, pds: &str) -> Result<(), FmacError> {
        self.simple_command(CONFIGURATION_REQ_ID, GENERAL_INTERFACE, &configuration_body(pds))
    }

    /// Selects the RF output, through a PDS fragment.
    pub fn set_antenna_config(&self, config: AntennaConfig) -> Result<(), FmacError> {
        let diversity = u8::from(config == AntennaConfig::Diversity);
        let pds = format!("{{j:{{a:{:X},b:{:X}}}}}", config as u8, diversity);
        self.send_configuration(&pds)
    }

    /// Drives or reads one general-purpose pin.
    pub fn control_gpio(&self, gpio_label: u8, mode: GpioMode) -> Result<GpioReadback, FmacError> {
        let body = [gpio_label, mode as u8];
        let reply = self.send_command(CONTROL_GPIO_REQ_ID, GENERAL_INTERFACE, &body)?;
        let status = decode_confirmation_status(&reply)?;
        // The warning status is still a success; the value disagreed with
        // what the firmware drives.
        if status != STATUS_SUCCESS && status != STATUS_GPIO_WARNING {
            self.check_status(CONTROL_GPIO_REQ_ID, status)?;
        }
        let value = reply
            .get(4..8)
            .map(LittleEndian::read_u32)
            .ok_or(FmacError::ShortConfirmation {
                id: CONTROL_GPIO_REQ_ID,
                length: reply.len(),
            })?;
        Ok(GpioReadback {
            value,
            drive_conflict: status == STATUS_GPIO_WARNING,
        })
    }

    /// Provisions the secure link MAC key, either burning OTP for good or
    /// loading RAM for an evaluation part.
    pub fn set_secure_link_mac_key(
        &self,
        destination: MacKeyDestination,
        key: &MacKey,
    ) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(1 + SECURELINK_MAC_KEY_LENGTH);
        body.push(destination.wire_value());
        body.extend_from_slice(key.as_bytes());
        let reply = self.send_command(SET_SECURELINK_MAC_KEY_REQ_ID, GENERAL_INTERFACE, &body)?;
        match decode_confirmation_status(&reply)? {
            MAC_KEY_STATUS_SUCCESS => {
                info!("Secure link MAC key installed");
                Ok(())
            }
            MAC_KEY_STATUS_ALREADY_BURNED => Err(FmacError::MacKeyAlreadyBurned),
            other => Err(FmacError::CommandFailed {
                id: SET_SECURELINK_MAC_KEY_REQ_ID,
                status: other,
            }),
        }
    }

    /// Runs the curve25519 key exchange with the chip and installs the
    /// derived session key on the host side.
    pub fn secure_link_exchange_keys(&self) -> Result<(), FmacError> {
        let request = {
            let mut state = self.state_guard()?;
            state.secure_link.begin_key_exchange()?
        };
        let reply =
            self.send_command(SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID, GENERAL_INTERFACE, &request)?;
        let status = decode_confirmation_status(&reply)?;
        if status != PUB_KEY_EXCHANGE_STATUS_SUCCESS {
            return Err(FmacError::CommandFailed {
                id: SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID,
                status,
            });
        }
        if reply.len() < 4 + SECURELINK_PUB_KEY_SIZE + SECURELINK_PUB_KEY_MAC_SIZE {
            return Err(FmacError::ShortConfirmation {
                id: SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID,
                length: reply.len(),
            });
        }

        let mut ncp_pub_key = [0u8; SECURELINK_PUB_KEY_SIZE];
        ncp_pub_key.copy_from_slice(&reply[4..4 + SECURELINK_PUB_KEY_SIZE]);
        let mut ncp_pub_key_mac = [0u8; SECURELINK_PUB_KEY_MAC_SIZE];
        ncp_pub_key_mac.copy_from_slice(
            &reply[4 + SECURELINK_PUB_KEY_SIZE
                ..4 + SECURELINK_PUB_KEY_SIZE + SECURELINK_PUB_KEY_MAC_SIZE],
        );

        let mut state = self.state_guard()?;
        state
            .secure_link
            .complete_key_exchange(&ncp_pub_key, &ncp_pub_key_mac)?;
        drop(state);
        info!("Secure link session key established");
        Ok(())
    }

    /// Installs the encryption bitmap on both sides; with `invalidate` the
    /// chip also drops its current session key.
    pub fn secure_link_configure(
        &self,
        bitmap: &[u8; SECURELINK_ENCRYPTION_BITMAP_SIZE],
        invalidate: bool,
    ) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(SECURELINK_ENCRYPTION_BITMAP_SIZE + 1);
        body.extend_from_slice(bitmap);
        body.push(if invalidate {
            SESSION_KEY_INVALIDATE
        } else {
            SESSION_KEY_NOP
        });
        self.simple_command(SECURELINK_CONFIGURE_REQ_ID, GENERAL_INTERFACE, &body)?;

        let mut state = self.state_guard()?;
        state.secure_link.set_bitmap(*bitmap);
        if invalidate {
            state.secure_link.invalidate_session();
        }
        Ok(())
    }

    /// Re-runs the key exchange, after a nonce watermark or a chip-side
    /// session key rejection.
    pub fn renegotiate_session_key(&self) -> Result<(), FmacError> {
        self.secure_link_exchange_keys()?;
        self.observer().on_event(&WifiEvent::SessionKeyRenegotiated);
        Ok(())
    }

    /// Burns the anti-rollback fuse for the running firmware revision.
    /// Magic-word protected; the chip refuses any other word.
    pub fn prevent_rollback(&self, magic: u32) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4);
        body.write_u32::<LittleEndian>(magic).unwrap();
        let reply = self.send_command(PREVENT_ROLLBACK_REQ_ID, GENERAL_INTERFACE, &body)?;
        match decode_confirmation_status(&reply)? {
            PREVENT_ROLLBACK_STATUS_SUCCESS => Ok(()),
            other => Err(FmacError::CommandFailed {
                id: PREVENT_ROLLBACK_REQ_ID,
                status: other,
            }),
        }
    }

    /// Hardware revision, from the config register.
    pub fn hardware_revision(&self) -> Result<u8, FmacError> {
        let config = self.bus().read_u32(Register::Config)?;
        Ok(cfg_hardware_revision(config))
    }

    /// Hardware type, from the config register.
    pub fn hardware_type(&self) -> Result<u8, FmacError> {
        let config = self.bus().read_u32(Register::Config)?;
        Ok(cfg_hardware_type(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::events::RecordingObserver;
    use crate::protocol::FrameHeader;
    use crate::securelink::SecureLinkMode;
    use crate::testutil::{started_fmac, startup_frame, with_pump};
    use crate::transport::MockBus;

    #[test]
    fn configuration_chunk_is_length_prefixed() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        with_pump(&fmac, || fmac.send_configuration("{e:{a:0}}")).unwrap();

        let frame = &bus.written_frames()[0];
        assert_eq!(frame[2], CONFIGURATION_REQ_ID);
        assert_eq!(frame[3], GENERAL_INTERFACE);
        assert_eq!(LittleEndian::read_u16(&frame[4..6]), 9);
        assert_eq!(&frame[6..15], b"{e:{a:0}}");
    }

    #[test]
    fn antenna_selection_becomes_a_pds_fragment() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        with_pump(&fmac, || fmac.set_antenna_config(AntennaConfig::Diversity)).unwrap();

        let frame = &bus.written_frames()[0];
        let length = usize::from(LittleEndian::read_u16(&frame[4..6]));
        assert_eq!(&frame[6..6 + length], b"{j:{a:4,b:1}}");
    }

    #[test]
    fn gpio_warning_reads_back_with_the_conflict_flag() {
        let (bus, fmac) = started_fmac(8);

        let mut cnf = FrameHeader::new(12, CONTROL_GPIO_REQ_ID, 0).to_bytes();
        cnf.extend_from_slice(&STATUS_GPIO_WARNING.to_le_bytes());
        cnf.extend_from_slice(&1u32.to_le_bytes());
        bus.queue_reply(CONTROL_GPIO_REQ_ID, cnf);

        let readback = with_pump(&fmac, || fmac.control_gpio(4, GpioMode::Read)).unwrap();
        assert_eq!(
            readback,
            GpioReadback {
                value: 1,
                drive_conflict: true
            }
        );

        // Request body: label then mode.
        let frame = &bus.written_frames()[0];
        assert_eq!(&frame[4..6], &[4, GpioMode::Read as u8]);
    }

    #[test]
    fn burned_mac_key_maps_to_its_own_error() {
        let (bus, fmac) = started_fmac(8);

        let mut cnf = FrameHeader::new(8, SET_SECURELINK_MAC_KEY_REQ_ID, 0).to_bytes();
        cnf.extend_from_slice(&MAC_KEY_STATUS_ALREADY_BURNED.to_le_bytes());
        bus.queue_reply(SET_SECURELINK_MAC_KEY_REQ_ID, cnf);

        let key = MacKey::new([0x11; 32]);
        let result = with_pump(&fmac, || {
            fmac.set_secure_link_mac_key(MacKeyDestination::Otp, &key)
        });
        assert!(matches!(result, Err(FmacError::MacKeyAlreadyBurned)));

        // OTP selector followed by the key bytes.
        let frame = &bus.written_frames()[0];
        assert_eq!(frame[4], MAC_KEY_DEST_OTP);
        assert_eq!(&frame[5..37], &[0x11; 32]);
    }

    #[test]
    fn key_exchange_installs_a_session_key() {
        let bus = MockBus::new();
        let mut fmac = Fmac::with_observer(bus.clone(), RecordingObserver::new());
        fmac.set_secure_link(SecureLinkMode::TrustedEval, Some(MacKey::new([7u8; 32])))
            .unwrap();
        bus.push_rx_frame(startup_frame(8), 0);
        fmac.process().unwrap();

        // The mock plays the chip half, signing with the same MAC key.
        bus.set_secure_link_key([7u8; 32]);

        with_pump(&fmac, || fmac.secure_link_exchange_keys()).unwrap();
        assert!(fmac.state_guard().unwrap().secure_link.session_active());

        // Request carried the host public key and its 64-byte tag.
        let frame = &bus.written_frames()[0];
        assert_eq!(frame[2], SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID);
        assert_eq!(frame.len(), 4 + 96);
    }

    #[test]
    fn rejected_exchange_status_fails_the_call() {
        let bus = MockBus::new();
        let mut fmac = Fmac::with_observer(bus.clone(), RecordingObserver::new());
        fmac.set_secure_link(SecureLinkMode::TrustedEval, Some(MacKey::new([7u8; 32])))
            .unwrap();
        bus.push_rx_frame(startup_frame(8), 0);
        fmac.process().unwrap();

        let mut cnf = FrameHeader::new(8, SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID, 0).to_bytes();
        cnf.extend_from_slice(&PUB_KEY_EXCHANGE_STATUS_FAILED.to_le_bytes());
        bus.queue_reply(SECURELINK_EXCHANGE_PUB_KEYS_REQ_ID, cnf);

        let result = with_pump(&fmac, || fmac.secure_link_exchange_keys());
        assert!(matches!(
            result,
            Err(FmacError::CommandFailed { status: PUB_KEY_EXCHANGE_STATUS_FAILED, .. })
        ));
        assert!(!fmac.state_guard().unwrap().secure_link.session_active());
    }

    #[test]
    fn configure_updates_the_local_bitmap() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        let mut bitmap = [0u8; SECURELINK_ENCRYPTION_BITMAP_SIZE];
        bitmap[8] = 0x0C;
        with_pump(&fmac, || fmac.secure_link_configure(&bitmap, true)).unwrap();

        let frame = &bus.written_frames()[0];
        assert_eq!(frame[2], SECURELINK_CONFIGURE_REQ_ID);
        assert_eq!(&frame[4..36], &bitmap);
        assert_eq!(frame[36], SESSION_KEY_INVALIDATE);
        assert_eq!(fmac.state_guard().unwrap().secure_link.bitmap(), &bitmap);
    }

    #[test]
    fn wrong_rollback_magic_surfaces_the_chip_status() {
        let (bus, fmac) = started_fmac(8);

        let mut cnf = FrameHeader::new(8, PREVENT_ROLLBACK_REQ_ID, 0).to_bytes();
        cnf.extend_from_slice(&PREVENT_ROLLBACK_STATUS_WRONG_MAGIC.to_le_bytes());
        bus.queue_reply(PREVENT_ROLLBACK_REQ_ID, cnf);

        let result = with_pump(&fmac, || fmac.prevent_rollback(0xDEAD_BEEF));
        match result {
            Err(FmacError::CommandFailed { id, status }) => {
                assert_eq!(id, PREVENT_ROLLBACK_REQ_ID);
                assert_eq!(status, PREVENT_ROLLBACK_STATUS_WRONG_MAGIC);
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn hardware_revision_comes_from_the_config_register() {
        let (_bus, fmac) = started_fmac(8);
        // The mock register file reports revision 2, type 1.
        assert_eq!(fmac.hardware_revision().unwrap(), 2);
        assert_eq!(fmac.hardware_type().unwrap(), 1);
    }
}
