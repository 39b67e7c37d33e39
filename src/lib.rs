//! LoRaWAN connection lifecycle management in Rust
//!
//! This crate keeps a LoRaWAN connection alive on a constrained device. It
//! sits on top of an existing MAC/radio stack and takes care of everything
//! around it: negotiating or restoring session credentials, retrying joins,
//! recovering from a stuck transmitter, persisting keys and frame counters,
//! and telling interested parts of the application what happened.
//!
//! # Features
//! - Lifecycle state machine driven by a periodic `tick`
//! - OTAA join with session persistence for fast restore on the next boot
//! - Immediate or backoff join retry policies
//! - Subscription registry for join, downlink, duty-cycle, confirmation and
//!   activity events
//! - Validated configuration writes for region, sub-band, identifiers, duty
//!   cycle and confirmed retries
//! - Pluggable persistent store and time source
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//!
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use lorawan_link::{
//!     config::ConfigRequest,
//!     events::EventRegistry,
//!     link::{JoinRetry, Link},
//!     store::MemoryStore,
//!     time::StdClock,
//! };
//!
//! let events = Arc::new(EventRegistry::<CriticalSectionRawMutex>::new());
//! events.on_receive(|payload| println!("downlink: {:02x?}", payload));
//!
//! // `stack` implements `LoRaWanService` for the radio at hand
//! let mut link = Link::new(stack, MemoryStore::new(), StdClock::new(), events, JoinRetry::Immediate);
//! link.begin()?;
//! link.apply_config_request(&ConfigRequest {
//!     region: Some(8),
//!     subband: Some(2),
//!     dev_eui: Some("0011223344556677"),
//!     app_key: Some("00112233445566778899aabbccddeeff"),
//!     ..Default::default()
//! })?;
//!
//! loop {
//!     link.tick();
//!     if link.is_joined() {
//!         link.send(b"Hello, LoRaWAN!", false);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

/// Transmit/receive activity bookkeeping
pub mod activity;

/// Device and connection configuration
pub mod config;

/// Event subscriptions
pub mod events;

/// Connection lifecycle state machine
pub mod link;

/// Regional channel plan catalogue
pub mod region;

/// Underlying LoRaWAN service interface
pub mod service;

/// Persistent credential storage
pub mod store;

/// Time source
pub mod time;

pub use events::{EventKind, EventRegistry, Handler, SubscriptionId};
pub use link::{ConfigError, JoinRetry, Link, LinkState, SharedLink};
pub use region::Region;
pub use service::{LoRaWanService, ServiceEvent};
pub use store::{CredentialStore, MemoryStore, StoreError};
pub use time::{Clock, Timestamp};
