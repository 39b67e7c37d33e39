//! The underlying LoRaWAN service
//!
//! The MAC and radio stack is opaque to the link: it is driven through
//! [`LoRaWanService`] and reports back through [`ServiceEvent`]s that the
//! integration forwards to [`Link::on_service_event`](crate::link::Link::on_service_event).

pub mod traits;

pub use traits::{InitParams, JoinRejected, JoinStatus, LoRaWanService, ServiceEvent};

/// Port carrying application data in both directions
pub const APP_PORT: u8 = 2;

/// Downlink port reserved for device-class switch requests
pub const CLASS_SWITCH_PORT: u8 = 3;
