use super::{AESKey, DevAddr, EUI64};

/// Device identity used for OTAA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device EUI (unique device identifier)
    pub dev_eui: EUI64,
    /// Application EUI (JoinEUI)
    pub app_eui: EUI64,
    /// Application key (root key for OTAA)
    pub app_key: AESKey,
}

impl DeviceIdentity {
    /// Create a new identity
    pub fn new(dev_eui: EUI64, app_eui: EUI64, app_key: AESKey) -> Self {
        Self {
            dev_eui,
            app_eui,
            app_key,
        }
    }

    /// Default DevEUI derived from a 64-bit hardware unique id,
    /// least significant byte first
    pub fn default_eui(unique_id: u64) -> EUI64 {
        unique_id.to_le_bytes()
    }
}

/// Keys and address negotiated by a join (or restored from storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeys {
    /// Device address assigned by the network
    pub dev_addr: DevAddr,
    /// Network session key
    pub nwk_skey: AESKey,
    /// Application session key
    pub app_skey: AESKey,
}

/// Uplink/downlink frame counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounters {
    /// Uplink frame counter
    pub up: u32,
    /// Downlink frame counter
    pub down: u32,
}

impl FrameCounters {
    /// Counters to prime the service with after a restore. The uplink
    /// counter moves one past the persisted value so that an uplink sent
    /// after the last successful save is never replayed.
    pub fn resumed(self) -> Self {
        Self {
            up: self.up.wrapping_add(1),
            down: self.down,
        }
    }
}

/// Session state for the current connection
///
/// Keys are either absent (the next join must negotiate them over the air)
/// or present (restored from storage, or negotiated and persisted).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    keys: Option<SessionKeys>,
    counters: FrameCounters,
}

impl SessionState {
    /// Empty session, OTAA negotiation required
    pub fn new() -> Self {
        Self::default()
    }

    /// Session restored from storage, joinable without negotiation
    pub fn restored(keys: SessionKeys, counters: FrameCounters) -> Self {
        Self {
            keys: Some(keys),
            counters,
        }
    }

    /// Whether the next join must negotiate keys over the air
    pub fn needs_join(&self) -> bool {
        self.keys.is_none()
    }

    /// Whether the keys can be reused on the next boot without a join
    pub fn is_fast_restorable(&self) -> bool {
        self.keys.is_some()
    }

    /// Session keys, if any
    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Last known frame counters
    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Update the last known frame counters
    pub fn set_counters(&mut self, counters: FrameCounters) {
        self.counters = counters;
    }

    /// Drop keys and counters, forcing negotiation on the next join
    pub fn invalidate(&mut self) {
        self.keys = None;
        self.counters = FrameCounters::default();
    }
}
