//! Station-mode commands: association, scanning, power management and the
//! offloading/filtering knobs.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{write_password, write_ssid};
use crate::driver::Fmac;
use crate::error::FmacError;
use crate::events::WifiObserver;
use crate::protocol::constants::*;
use crate::protocol::decode_confirmation_status;
use crate::transport::BusTransport;

/// Connects to any access point broadcasting the SSID.
const BROADCAST_BSSID: [u8; 6] = [0xFF; 6];

/// Link security modes understood by the connect and AP commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityMode {
    Open = 0,
    Wep = 1,
    /// WPA2-Personal, falling back to WPA-Personal.
    Wpa2Wpa1Psk = 2,
    /// WPA2-Personal only.
    Wpa2Psk = 4,
}

/// Protected Management Frames policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MgmtFrameProtection {
    Disabled = 0,
    /// Used when the peer supports it.
    Optional = 1,
    /// Refuse peers without it.
    Mandatory = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerMode {
    /// Radio always on.
    Active = 0,
    /// Doze, waking for every beacon.
    Beacon = 1,
    /// Doze, waking for DTIM beacons only.
    Dtim = 2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanMode {
    Passive = 0,
    #[default]
    Active = 1,
}

/// Everything needed to join an infrastructure network.
#[derive(Clone, Debug)]
pub struct ConnectParameters {
    pub ssid: String,
    pub password: String,
    pub security: SecurityMode,
    pub mgmt_frame_protection: MgmtFrameProtection,
    /// 0 lets the firmware pick any channel the SSID is found on.
    pub channel: u16,
    /// Target BSSID; `None` matches any AP broadcasting the SSID.
    pub bssid: Option<[u8; 6]>,
    /// Pin the association to the AP joined first.
    pub prevent_roaming: bool,
    /// Vendor IEs appended to the association request.
    pub ie_data: Vec<u8>,
}

impl ConnectParameters {
    pub fn wpa2(ssid: &str, password: &str) -> Self {
        ConnectParameters {
            ssid: ssid.to_owned(),
            password: password.to_owned(),
            security: SecurityMode::Wpa2Psk,
            mgmt_frame_protection: MgmtFrameProtection::Optional,
            channel: 0,
            bssid: None,
            prevent_roaming: false,
            ie_data: Vec::new(),
        }
    }

    pub fn open(ssid: &str) -> Self {
        ConnectParameters {
            ssid: ssid.to_owned(),
            password: String::new(),
            security: SecurityMode::Open,
            mgmt_frame_protection: MgmtFrameProtection::Disabled,
            channel: 0,
            bssid: None,
            prevent_roaming: false,
            ie_data: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ScanParameters {
    pub mode: ScanMode,
    /// Channels to visit; empty scans the whole regulatory set.
    pub channels: Vec<u8>,
    /// Directed probe SSIDs, at most two. Empty probes broadcast.
    pub ssids: Vec<String>,
    /// Vendor IEs appended to the probe requests.
    pub ie_data: Vec<u8>,
}

impl<B: BusTransport, O: WifiObserver> Fmac<B, O> {
    /// Overrides the MAC address of `interface`. Takes effect on the next
    /// connect or AP start.
    pub fn set_mac_address(&self, interface: u8, mac: &[u8; 6]) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(mac);
        body.extend_from_slice(&[0u8; 2]);
        self.simple_command(SET_MAC_ADDRESS_REQ_ID, interface, &body)
    }

    /// Starts an association with the network described by `params`.
    ///
    /// The confirmation only acknowledges the attempt; the outcome arrives
    /// later as a connect indication.
    pub fn connect(&self, params: &ConnectParameters) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(116 + params.ie_data.len());
        write_ssid(&mut body, &params.ssid)?;
        body.extend_from_slice(&params.bssid.unwrap_or(BROADCAST_BSSID));
        body.write_u16::<LittleEndian>(params.channel).unwrap();
        body.push(params.security as u8);
        body.push(u8::from(params.prevent_roaming));
        body.write_u16::<LittleEndian>(params.mgmt_frame_protection as u16)
            .unwrap();
        write_password(&mut body, &params.password)?;
        body.write_u16::<LittleEndian>(params.ie_data.len() as u16)
            .unwrap();
        body.extend_from_slice(&params.ie_data);
        self.simple_command(CONNECT_REQ_ID, STA_INTERFACE, &body)
    }

    /// Leaves the current network. Completion arrives as a disconnect
    /// indication.
    pub fn disconnect(&self) -> Result<(), FmacError> {
        self.simple_command(DISCONNECT_REQ_ID, STA_INTERFACE, &[])
    }

    /// Kicks off a scan; results stream in as scan-result indications,
    /// terminated by a scan-complete indication.
    pub fn start_scan(&self, params: &ScanParameters) -> Result<(), FmacError> {
        if params.ssids.len() > MAX_SCAN_SSIDS {
            return Err(FmacError::TooManyScanSsids {
                count: params.ssids.len(),
            });
        }
        let mut body = Vec::with_capacity(
            8 + params.channels.len() + params.ssids.len() * (4 + SSID_SIZE) + params.ie_data.len(),
        );
        body.write_u16::<LittleEndian>(params.mode as u16).unwrap();
        body.write_u16::<LittleEndian>(params.channels.len() as u16)
            .unwrap();
        body.write_u16::<LittleEndian>(params.ssids.len() as u16)
            .unwrap();
        body.write_u16::<LittleEndian>(params.ie_data.len() as u16)
            .unwrap();
        body.extend_from_slice(&params.channels);
        for ssid in &params.ssids {
            write_ssid(&mut body, ssid)?;
        }
        body.extend_from_slice(&params.ie_data);

        let reply = self.send_command(START_SCAN_REQ_ID, STA_INTERFACE, &body)?;
        let status = decode_confirmation_status(&reply)?;
        // Status 0x3 is success with a warning: the scan runs, but part of
        // the request was trimmed, e.g. channels barred by the regulatory
        // domain.
        match status {
            STATUS_SUCCESS | STATUS_GPIO_WARNING => Ok(()),
            other => self.check_status(START_SCAN_REQ_ID, other),
        }
    }

    /// Aborts an ongoing scan; the scan-complete indication still arrives.
    pub fn stop_scan(&self) -> Result<(), FmacError> {
        self.simple_command(STOP_SCAN_REQ_ID, STA_INTERFACE, &[])
    }

    /// Instantaneous RCPI of the current link. dBm = rcpi / 2 - 110.
    pub fn get_signal_strength(&self) -> Result<u32, FmacError> {
        let reply = self.send_command(GET_SIGNAL_STRENGTH_REQ_ID, STA_INTERFACE, &[])?;
        let status = decode_confirmation_status(&reply)?;
        self.check_status(GET_SIGNAL_STRENGTH_REQ_ID, status)?;
        reply
            .get(4..8)
            .map(LittleEndian::read_u32)
            .ok_or(FmacError::ShortConfirmation {
                id: GET_SIGNAL_STRENGTH_REQ_ID,
                length: reply.len(),
            })
    }

    /// Selects the station power management mode. `listen_interval` is the
    /// longest doze, in beacon periods, before waking for buffered traffic.
    pub fn set_power_mode(&self, mode: PowerMode, listen_interval: u16) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4);
        body.write_u16::<LittleEndian>(mode as u16).unwrap();
        body.write_u16::<LittleEndian>(listen_interval).unwrap();
        self.simple_command(SET_PM_MODE_REQ_ID, STA_INTERFACE, &body)
    }

    /// Joins, or starts, an IBSS cell. The outcome arrives as a join
    /// indication carrying the cell BSSID.
    pub fn join_ibss(
        &self,
        ssid: &str,
        channel: u16,
        security: SecurityMode,
        password: &str,
    ) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(108);
        write_ssid(&mut body, ssid)?;
        body.write_u32::<LittleEndian>(u32::from(channel)).unwrap();
        body.write_u16::<LittleEndian>(security as u16).unwrap();
        write_password(&mut body, password)?;
        self.simple_command(JOIN_IBSS_REQ_ID, STA_INTERFACE, &body)
    }

    /// Leaves the IBSS cell. Completion arrives as a leave indication.
    pub fn leave_ibss(&self) -> Result<(), FmacError> {
        self.simple_command(LEAVE_IBSS_REQ_ID, STA_INTERFACE, &[])
    }

    /// Admits a multicast group address through the receive filter.
    pub fn add_multicast_address(&self, mac: &[u8; 6]) -> Result<(), FmacError> {
        self.simple_command(ADD_MULTICAST_ADDR_REQ_ID, STA_INTERFACE, mac)
    }

    pub fn remove_multicast_address(&self, mac: &[u8; 6]) -> Result<(), FmacError> {
        self.simple_command(REMOVE_MULTICAST_ADDR_REQ_ID, STA_INTERFACE, mac)
    }

    /// Installs up to two IPv4 addresses the firmware answers ARP requests
    /// for while the host sleeps. No addresses clears the table.
    pub fn set_arp_ip_address(&self, addresses: &[u32]) -> Result<(), FmacError> {
        if addresses.len() > ARP_IP_ADDR_COUNT {
            return Err(FmacError::TooManyAddresses {
                count: addresses.len(),
            });
        }
        let mut body = Vec::with_capacity(4 * ARP_IP_ADDR_COUNT);
        for slot in 0..ARP_IP_ADDR_COUNT {
            body.write_u32::<LittleEndian>(addresses.get(slot).copied().unwrap_or(0))
                .unwrap();
        }
        self.simple_command(SET_ARP_IP_ADDRESS_REQ_ID, STA_INTERFACE, &body)
    }

    /// Installs up to two IPv6 addresses answered for in neighbor
    /// solicitation offloading. No addresses clears the table.
    pub fn set_ns_ip_address(&self, addresses: &[[u8; 16]]) -> Result<(), FmacError> {
        if addresses.len() > NS_IP_ADDR_COUNT {
            return Err(FmacError::TooManyAddresses {
                count: addresses.len(),
            });
        }
        let mut body = vec![0u8; 16 * NS_IP_ADDR_COUNT];
        for (slot, address) in addresses.iter().enumerate() {
            body[16 * slot..16 * (slot + 1)].copy_from_slice(address);
        }
        self.simple_command(SET_NS_IP_ADDRESS_REQ_ID, STA_INTERFACE, &body)
    }

    /// With the filter on, broadcast frames other than ARP and DHCP are
    /// dropped on the chip.
    pub fn set_broadcast_filter(&self, enabled: bool) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4);
        body.write_u32::<LittleEndian>(u32::from(enabled)).unwrap();
        self.simple_command(SET_BROADCAST_FILTER_REQ_ID, STA_INTERFACE, &body)
    }

    /// Per-channel dwell times (TUs) and the probe count for active scans.
    pub fn set_scan_parameters(
        &self,
        active_channel_time: u16,
        passive_channel_time: u16,
        num_of_probe_requests: u16,
    ) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(8);
        body.write_u16::<LittleEndian>(active_channel_time).unwrap();
        body.write_u16::<LittleEndian>(passive_channel_time)
            .unwrap();
        body.write_u16::<LittleEndian>(num_of_probe_requests)
            .unwrap();
        body.write_u16::<LittleEndian>(0).unwrap();
        self.simple_command(SET_SCAN_PARAMETERS_REQ_ID, STA_INTERFACE, &body)
    }

    /// Tunes when the firmware roams to a better access point. `channels`
    /// is the list probed while looking for one.
    pub fn set_roam_parameters(
        &self,
        rcpi_threshold: u8,
        rcpi_hysteresis: u8,
        beacon_lost_count: u8,
        channels: &[u8],
    ) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(4 + channels.len());
        body.push(rcpi_threshold);
        body.push(rcpi_hysteresis);
        body.push(beacon_lost_count);
        body.push(channels.len() as u8);
        body.extend_from_slice(channels);
        self.simple_command(SET_ROAM_PARAMETERS_REQ_ID, STA_INTERFACE, &body)
    }

    /// Restricts the rates used for data transmission. Each set bit allows
    /// one rate; an all-zero mask restores the firmware default.
    pub fn set_tx_rate_parameters(&self, rate_set_bitmask: u32) -> Result<(), FmacError> {
        let mut body = Vec::with_capacity(8);
        body.write_u32::<LittleEndian>(0).unwrap();
        body.write_u32::<LittleEndian>(rate_set_bitmask).unwrap();
        self.simple_command(SET_TX_RATE_PARAMETERS_REQ_ID, STA_INTERFACE, &body)
    }
}
