//! Persisted layout of the link's identity, configuration and session
//!
//! Identity and configuration are written together when the operator
//! reconfigures the device. Session material is written after a successful
//! OTAA join and removed whenever it must be renegotiated. Frame counters
//! are rewritten after every uplink and downlink.

use super::{CredentialStore, StoreError};
use crate::config::link::{DEFAULT_CONFIRM_RETRIES, DEFAULT_TX_DUTY_SEC};
use crate::config::{ConnectionConfig, DeviceIdentity, FrameCounters, SessionKeys, SessionState};
use crate::region::Region;

/// Key names within the namespace
pub mod keys {
    /// Device EUI (8 bytes)
    pub const DEV_EUI: &str = "devEUI";
    /// Application EUI (8 bytes)
    pub const APP_EUI: &str = "appEUI";
    /// Application key (16 bytes)
    pub const APP_KEY: &str = "appKey";
    /// Region id (u8)
    pub const REGION: &str = "region";
    /// Sub-band (u8)
    pub const SUBBAND: &str = "subband";
    /// Requested transmit interval in seconds (u32)
    pub const TX_DUTY: &str = "txduty";
    /// Confirmed retry count (u32)
    pub const TX_RETRIES: &str = "txretries";
    /// Network session key (16 bytes)
    pub const NWK_SKEY: &str = "nwkSKey";
    /// Application session key (16 bytes)
    pub const APP_SKEY: &str = "appSKey";
    /// Device address (4 bytes)
    pub const DEV_ADDR: &str = "devAddr";
    /// Uplink frame counter (u32)
    pub const UP_CNT: &str = "upCnt";
    /// Downlink frame counter (u32)
    pub const DOWN_CNT: &str = "downCnt";
}

/// Everything recovered from the store at boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    /// Identity, present only when all three identifiers were stored
    pub identity: Option<DeviceIdentity>,
    /// Connection parameters, repaired where invalid
    pub config: ConnectionConfig,
    /// Restored session, or an empty one that must be negotiated
    pub session: SessionState,
}

/// Read identity, configuration and session material
pub fn load<K: CredentialStore + ?Sized>(store: &K) -> Stored {
    let mut dev_eui = [0u8; 8];
    let mut app_eui = [0u8; 8];
    let mut app_key = [0u8; 16];
    let have_dev_eui = store.get_bytes(keys::DEV_EUI, &mut dev_eui);
    let have_app_eui = store.get_bytes(keys::APP_EUI, &mut app_eui);
    let have_app_key = store.get_bytes(keys::APP_KEY, &mut app_key);
    let identity = (have_dev_eui && have_app_eui && have_app_key)
        .then(|| DeviceIdentity::new(dev_eui, app_eui, app_key));

    let config = ConnectionConfig::normalized(
        store.get_u8(keys::REGION).unwrap_or(Region::default().id()),
        store.get_u8(keys::SUBBAND).unwrap_or(1),
        store.get_u32(keys::TX_DUTY).unwrap_or(DEFAULT_TX_DUTY_SEC),
        store.get_u32(keys::TX_RETRIES).unwrap_or(DEFAULT_CONFIRM_RETRIES),
    );

    Stored {
        identity,
        config,
        session: load_session(store),
    }
}

fn load_session<K: CredentialStore + ?Sized>(store: &K) -> SessionState {
    let mut material = SessionKeys {
        dev_addr: [0; 4],
        nwk_skey: [0; 16],
        app_skey: [0; 16],
    };
    let complete = store.get_bytes(keys::NWK_SKEY, &mut material.nwk_skey)
        && store.get_bytes(keys::APP_SKEY, &mut material.app_skey)
        && store.get_bytes(keys::DEV_ADDR, &mut material.dev_addr);
    if !complete {
        return SessionState::new();
    }
    let counters = FrameCounters {
        up: store.get_u32(keys::UP_CNT).unwrap_or(0),
        down: store.get_u32(keys::DOWN_CNT).unwrap_or(0),
    };
    SessionState::restored(material, counters)
}

/// Write identity, region and sub-band
pub fn save_identity<K: CredentialStore + ?Sized>(
    store: &mut K,
    identity: &DeviceIdentity,
    config: &ConnectionConfig,
) -> Result<(), StoreError> {
    store.put_u8(keys::REGION, config.region.id())?;
    store.put_u8(keys::SUBBAND, config.subband)?;
    store.put_bytes(keys::DEV_EUI, &identity.dev_eui)?;
    store.put_bytes(keys::APP_EUI, &identity.app_eui)?;
    store.put_bytes(keys::APP_KEY, &identity.app_key)
}

/// Write the requested transmit interval
pub fn save_duty_cycle<K: CredentialStore + ?Sized>(store: &mut K, secs: u32) -> Result<(), StoreError> {
    store.put_u32(keys::TX_DUTY, secs)
}

/// Write the confirmed retry count
pub fn save_confirm_retries<K: CredentialStore + ?Sized>(
    store: &mut K,
    retries: u32,
) -> Result<(), StoreError> {
    store.put_u32(keys::TX_RETRIES, retries)
}

/// Write negotiated session keys and counters
pub fn save_session<K: CredentialStore + ?Sized>(
    store: &mut K,
    material: &SessionKeys,
    counters: FrameCounters,
) -> Result<(), StoreError> {
    store.put_bytes(keys::NWK_SKEY, &material.nwk_skey)?;
    store.put_bytes(keys::APP_SKEY, &material.app_skey)?;
    store.put_bytes(keys::DEV_ADDR, &material.dev_addr)?;
    save_frame_counters(store, counters)
}

/// Remove session keys and counters so the next boot negotiates again
pub fn destroy_session<K: CredentialStore + ?Sized>(store: &mut K) -> Result<(), StoreError> {
    // Keys first: a session without keys is never restored, whatever happens
    // to the counters.
    store.remove(keys::NWK_SKEY)?;
    store.remove(keys::APP_SKEY)?;
    store.remove(keys::DEV_ADDR)?;
    store.remove(keys::UP_CNT)?;
    store.remove(keys::DOWN_CNT)
}

/// Write the frame counters
pub fn save_frame_counters<K: CredentialStore + ?Sized>(
    store: &mut K,
    counters: FrameCounters,
) -> Result<(), StoreError> {
    store.put_u32(keys::UP_CNT, counters.up)?;
    store.put_u32(keys::DOWN_CNT, counters.down)
}
