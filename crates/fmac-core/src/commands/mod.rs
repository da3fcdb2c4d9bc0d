//! Typed command facade over the raw request path.
//!
//! Each function builds a little-endian request body, runs it through the
//! correlator via [`Fmac::send_command`] and maps the confirmation status
//! onto [`FmacError`]. Split by concern: station-mode, access-point and
//! device-wide commands.

mod general;
mod softap;
mod station;

pub use general::{AntennaConfig, GpioMode, GpioReadback, MacKeyDestination};
pub use softap::ApParameters;
pub use station::{
    ConnectParameters, MgmtFrameProtection, PowerMode, ScanMode, ScanParameters, SecurityMode,
};

pub(crate) use general::configuration_body;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::driver::Fmac;
use crate::error::FmacError;
use crate::events::WifiObserver;
use crate::protocol::constants::{PASSWORD_SIZE, SSID_SIZE};
use crate::protocol::decode_confirmation_status;
use crate::transport::BusTransport;

impl<B: BusTransport, O: WifiObserver> Fmac<B, O> {
    /// Roundtrip for requests whose confirmation is a bare status word.
    fn simple_command(&self, id: u8, info: u8, body: &[u8]) -> Result<(), FmacError> {
        let reply = self.send_command(id, info, body)?;
        let status = decode_confirmation_status(&reply)?;
        self.check_status(id, status)
    }
}

/// Appends an SSID definition: length word plus the zero-padded 32-byte
/// name field.
fn write_ssid(body: &mut Vec<u8>, ssid: &str) -> Result<(), FmacError> {
    if ssid.len() > SSID_SIZE {
        return Err(FmacError::SsidTooLong { length: ssid.len() });
    }
    body.write_u32::<LittleEndian>(ssid.len() as u32).unwrap();
    let mut fixed = [0u8; SSID_SIZE];
    fixed[..ssid.len()].copy_from_slice(ssid.as_bytes());
    body.extend_from_slice(&fixed);
    Ok(())
}

/// Appends a passphrase: length word plus the zero-padded 64-byte field.
fn write_password(body: &mut Vec<u8>, password: &str) -> Result<(), FmacError> {
    if password.len() > PASSWORD_SIZE {
        return Err(FmacError::PasswordTooLong {
            length: password.len(),
        });
    }
    body.write_u16::<LittleEndian>(password.len() as u16).unwrap();
    let mut fixed = [0u8; PASSWORD_SIZE];
    fixed[..password.len()].copy_from_slice(password.as_bytes());
    body.extend_from_slice(&fixed);
    Ok(())
}
