//! Device and connection configuration
//!
//! This module contains the values the link persists and validates:
//! - Device identity (DevEUI, AppEUI, AppKey)
//! - Negotiated session state (keys, address, frame counters)
//! - Connection parameters (region, sub-band, duty cycle, confirmed retries)

/// Device identity and session state
pub mod device;

/// Connection parameters and the configuration write/read forms
pub mod link;

pub use device::{DeviceIdentity, FrameCounters, SessionKeys, SessionState};
pub use link::{ConfigReport, ConfigRequest, ConnectionConfig, ValidationError};

/// EUI-64 (8 bytes)
pub type EUI64 = [u8; 8];
/// AES-128 key (16 bytes)
pub type AESKey = [u8; 16];
/// Device Address (4 bytes)
pub type DevAddr = [u8; 4];

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceClass {
    /// Class A: Uplink followed by two receive windows
    A,
    /// Class B: Scheduled receive slots (beaconing)
    B,
    /// Class C: Continuously listening except when transmitting
    C,
}

impl DeviceClass {
    /// Class selected by a control-port payload byte (0, 1, 2)
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 => Some(DeviceClass::A),
            1 => Some(DeviceClass::B),
            2 => Some(DeviceClass::C),
            _ => None,
        }
    }
}
