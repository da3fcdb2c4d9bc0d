//! Access-point commands: bring a soft AP up or down and manage its
//! clients.

use byteorder::{LittleEndian, WriteBytesExt};

use super::station::{MgmtFrameProtection, SecurityMode};
use super::{write_password, write_ssid};
use crate::driver::Fmac;
use crate::error::FmacError;
use crate::events::WifiObserver;
use crate::protocol::constants::*;
use crate::transport::BusTransport;

/// Everything needed to bring up an access point.
#[derive(Clone, Debug)]
pub struct ApParameters {
    pub ssid: String,
    pub password: String,
    pub security: SecurityMode,
    pub mgmt_frame_protection: MgmtFrameProtection,
    pub channel: u16,
    /// Keep the SSID out of beacons; clients must probe for it.
    pub hidden: bool,
    /// Drop traffic between associated clients.
    pub client_isolation: bool,
    /// Vendor IEs appended to beacons.
    pub beacon_ie_data: Vec<u8>,
    /// Vendor IEs appended to probe responses.
    pub probe_resp_ie_data: Vec<u8>,
}

impl ApParameters {
    pub fn wpa2(ssid: &str, password: &str, channel: u16) -> Self {
        ApParameters {
            ssid: ssid.to_owned(),
            password: password.to_owned(),
            security: SecurityMode::Wpa2Psk,
            mgmt_frame_protection: MgmtFrameProtection::Optional,
            channel,
            hidden: false,
            client_isolation: false,
            beacon_ie_data: Vec::new(),
            probe_resp_ie_data: Vec::new(),
        }
    }

    pub fn open(ssid: &str, channel: u16) -> Self {
        ApParameters {
            ssid: ssid.to_owned(),
            password: String::new(),
            security: SecurityMode::Open,
            mgmt_frame_protection: MgmtFrameProtection::Disabled,
            channel,
            hidden: false,
            client_isolation: false,
            beacon_ie_data: Vec::new(),
            probe_resp_ie_data: Vec::new(),
        }
    }
}

impl<B: BusTransport, O: WifiObserver> Fmac<B, O> {
    /// Brings up the access point described by `params`. The outcome
    /// arrives as a start-AP indication.
    pub fn start_ap(&self, params: &ApParameters) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(
            112 + params.beacon_ie_data.len() + params.probe_resp_ie_data.len(),
        );
        write_ssid(&mut body, &params.ssid)?;
        body.push(u8::from(params.hidden));
        body.push(u8::from(params.client_isolation));
        body.push(params.security as u8);
        body.push(params.mgmt_frame_protection as u8);
        body.write_u16::<LittleEndian>(params.channel).unwrap();
        write_password(&mut body, &params.password)?;
        body.write_u16::<LittleEndian>(params.beacon_ie_data.len() as u16)
            .unwrap();
        body.write_u16::<LittleEndian>(params.probe_resp_ie_data.len() as u16)
            .unwrap();
        body.extend_from_slice(&params.beacon_ie_data);
        body.extend_from_slice(&params.probe_resp_ie_data);
        self.simple_command(START_AP_REQ_ID, SOFTAP_INTERFACE, &body)
    }

    /// Replaces the vendor IEs carried in beacons and probe responses
    /// while the AP keeps running.
    pub fn update_ap(
        &self,
        beacon_ie_data: &[u8],
        probe_resp_ie_data: &[u8],
    ) -> Result<(), FmacError> {
        let mut body =
            Vec::with_capacity(4 + beacon_ie_data.len() + probe_resp_ie_data.len());
        body.write_u16::<LittleEndian>(beacon_ie_data.len() as u16)
            .unwrap();
        body.write_u16::<LittleEndian>(probe_resp_ie_data.len() as u16)
            .unwrap();
        body.extend_from_slice(beacon_ie_data);
        body.extend_from_slice(probe_resp_ie_data);
        self.simple_command(UPDATE_AP_REQ_ID, SOFTAP_INTERFACE, &body)
    }

    /// Takes the access point down. The outcome arrives as a stop-AP
    /// indication.
    pub fn stop_ap(&self) -> Result<(), FmacError> {
        self.simple_command(STOP_AP_REQ_ID, SOFTAP_INTERFACE, &[])
    }

    /// Deauthenticates one associated client.
    pub fn disconnect_ap_client(&self, mac: &[u8; 6]) -> Result<(), FmacError> {
        self.simple_command(DISCONNECT_AP_CLIENT_REQ_ID, SOFTAP_INTERFACE, mac)
    }

    /// Caps concurrent associations; zero restores the firmware default.
    pub fn set_max_ap_client_count(&self, count: u32) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4);
        body.write_u32::<LittleEndian>(count).unwrap();
        self.simple_command(SET_MAX_AP_CLIENT_COUNT_REQ_ID, SOFTAP_INTERFACE, &body)
    }

    /// Kicks clients idle for longer than `timeout_s` seconds; zero
    /// restores the firmware default.
    pub fn set_max_ap_client_inactivity(&self, timeout_s: u32) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4);
        body.write_u32::<LittleEndian>(timeout_s).unwrap();
        self.simple_command(SET_MAX_AP_CLIENT_INACTIVITY_REQ_ID, SOFTAP_INTERFACE, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    use crate::testutil::{started_fmac, with_pump};

    #[test]
    fn start_ap_body_layout_is_exact() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        let params = ApParameters::wpa2("cellar", "hunter22", 11);
        with_pump(&fmac, || fmac.start_ap(&params)).unwrap();

        let written = bus.written_frames();
        let frame = &written[0];
        assert_eq!(frame[2], START_AP_REQ_ID);
        assert_eq!(frame[3], SOFTAP_INTERFACE);

        let body = &frame[4..];
        assert_eq!(LittleEndian::read_u32(&body[..4]), 6);
        assert_eq!(&body[4..10], b"cellar");
        assert_eq!(body[36], 0);
        assert_eq!(body[37], 0);
        assert_eq!(body[38], SecurityMode::Wpa2Psk as u8);
        assert_eq!(body[39], MgmtFrameProtection::Optional as u8);
        assert_eq!(LittleEndian::read_u16(&body[40..42]), 11);
        assert_eq!(LittleEndian::read_u16(&body[42..44]), 8);
        assert_eq!(&body[44..52], b"hunter22");
        assert_eq!(LittleEndian::read_u16(&body[108..110]), 0);
        assert_eq!(LittleEndian::read_u16(&body[110..112]), 0);
        assert_eq!(body.len(), 112);
    }

    #[test]
    fn update_ap_carries_both_ie_blocks() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        let beacon = [0xDD, 0x03, 0x00, 0x17, 0x35];
        let probe = [0xDD, 0x02, 0xAA, 0xBB];
        with_pump(&fmac, || fmac.update_ap(&beacon, &probe)).unwrap();

        let body = &bus.written_frames()[0][4..];
        assert_eq!(LittleEndian::read_u16(&body[..2]), 5);
        assert_eq!(LittleEndian::read_u16(&body[2..4]), 4);
        assert_eq!(&body[4..9], &beacon);
        assert_eq!(&body[9..13], &probe);
    }

    #[test]
    fn client_management_uses_the_right_ids() {
        let (bus, fmac) = started_fmac(8);
        bus.set_auto_confirm(true);

        with_pump(&fmac, || {
            fmac.disconnect_ap_client(&[0xD6, 1, 2, 3, 4, 5])?;
            fmac.set_max_ap_client_count(4)?;
            fmac.set_max_ap_client_inactivity(120)?;
            fmac.stop_ap()
        })
        .unwrap();

        let written = bus.written_frames();
        assert_eq!(written[0][2], DISCONNECT_AP_CLIENT_REQ_ID);
        assert_eq!(&written[0][4..10], &[0xD6, 1, 2, 3, 4, 5]);
        assert_eq!(written[1][2], SET_MAX_AP_CLIENT_COUNT_REQ_ID);
        assert_eq!(LittleEndian::read_u32(&written[1][4..8]), 4);
        assert_eq!(written[2][2], SET_MAX_AP_CLIENT_INACTIVITY_REQ_ID);
        assert_eq!(LittleEndian::read_u32(&written[2][4..8]), 120);
        assert_eq!(written[3][2], STOP_AP_REQ_ID);
        assert_eq!(written[3].len(), 4);
    }
}
