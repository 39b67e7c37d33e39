//! Connection lifecycle
//!
//! [`Link`] owns the configuration, the session and the activity record of
//! one LoRaWAN connection and drives the underlying [`LoRaWanService`]
//! from a periodic [`Link::tick`]. Completions reported by the service come
//! back through [`Link::on_service_event`].
//!
//! ```text
//! Uninitialized --configure--> NeedsInit --tick--> Joining --joined--> Joined
//!                                  ^                  |
//!                                  |               failed
//!                     reconfigure, reset,             v
//!                     stuck transmitter          JoinFailed
//! ```

mod bridge;
mod policy;
mod shared;

pub use policy::{JoinRetry, MIN_BACKOFF};
pub use shared::{LinkBusy, SharedLink};

use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::String;

use crate::activity::{ActivityReport, ActivityTracker, LinkEvent};
use crate::config::link::{to_hex, MIN_TX_DUTY_SEC};
use crate::config::{
    ConfigReport, ConfigRequest, ConnectionConfig, DeviceIdentity, SessionState, ValidationError,
    EUI64,
};
use crate::events::EventRegistry;
use crate::region::{Region, RegionInfo};
use crate::service::{InitParams, JoinRejected, JoinStatus, LoRaWanService, APP_PORT};
use crate::store::credentials;
use crate::store::{CredentialStore, StoreError};
use crate::time::{Clock, Timestamp};

/// Failed transmissions spanning this long, with no success in between,
/// force a re-initialization
pub const STUCK_TX_WINDOW: Duration = Duration::from_secs(90);

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// No identity has been configured
    Uninitialized,
    /// The service must be (re)initialized on the next tick
    NeedsInit,
    /// Join requested, waiting for the outcome
    Joining,
    /// Joined to the network
    Joined,
    /// Initialization or join failed, waiting to retry
    JoinFailed,
}

/// Rejected configuration write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A value was malformed or out of range
    Validation(ValidationError),
    /// Persisting the new values failed
    Storage(StoreError),
}

impl From<ValidationError> for ConfigError {
    fn from(error: ValidationError) -> Self {
        ConfigError::Validation(error)
    }
}

impl From<StoreError> for ConfigError {
    fn from(error: StoreError) -> Self {
        ConfigError::Storage(error)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Validation(e) => write!(f, "invalid configuration: {}", e),
            ConfigError::Storage(e) => write!(f, "configuration not saved: {}", e),
        }
    }
}

/// LoRaWAN connection lifecycle
pub struct Link<S, K, C, M>
where
    S: LoRaWanService,
    K: CredentialStore,
    C: Clock,
    M: RawMutex,
{
    /// Underlying MAC/radio stack
    service: S,
    /// Persistent namespace
    store: K,
    /// Time source
    clock: C,
    /// Subscribers
    events: Arc<EventRegistry<M>>,
    /// Join completion and retry strategy
    retry: JoinRetry,
    /// DevEUI derived from the hardware id
    hardware_eui: EUI64,
    /// Configured identity, `None` until first configured
    identity: Option<DeviceIdentity>,
    /// Connection parameters
    config: ConnectionConfig,
    /// Session keys and counters
    session: SessionState,
    state: LinkState,
    /// `begin` succeeded
    hw_ready: bool,
    /// Duty-cycle change to announce on the next tick
    duty_cycle_pending: bool,
    activity: ActivityTracker,
    /// When the last init or join failure happened
    failed_at: Option<Timestamp>,
    /// The last failure was in `init`, not `join`
    init_failed: bool,
    /// Stored session keys outlived a discard and must still be removed
    session_discard_pending: bool,
}

impl<S, K, C, M> Link<S, K, C, M>
where
    S: LoRaWanService,
    K: CredentialStore,
    C: Clock,
    M: RawMutex,
{
    /// Create a link, restoring identity, configuration and session from `store`
    pub fn new(
        service: S,
        store: K,
        clock: C,
        events: Arc<EventRegistry<M>>,
        retry: JoinRetry,
    ) -> Self {
        let stored = credentials::load(&store);
        let hardware_eui = DeviceIdentity::default_eui(service.unique_id());
        let state = if stored.identity.is_some() {
            LinkState::NeedsInit
        } else {
            LinkState::Uninitialized
        };
        if stored.session.is_fast_restorable() {
            debug!("stored session found");
        }

        Self {
            service,
            store,
            clock,
            events,
            retry,
            hardware_eui,
            identity: stored.identity,
            config: stored.config,
            session: stored.session,
            state,
            hw_ready: false,
            duty_cycle_pending: false,
            activity: ActivityTracker::new(),
            failed_at: None,
            init_failed: false,
            session_discard_pending: false,
        }
    }

    /// Bring up the radio hardware. Until this succeeds, `tick` only
    /// announces duty-cycle changes and `send` is refused.
    pub fn begin(&mut self) -> Result<(), S::Error> {
        self.service.init_hardware()?;
        self.hw_ready = true;
        info!("radio hardware ready");
        Ok(())
    }

    /// Advance the lifecycle. Call on a regular cadence.
    pub fn tick(&mut self) {
        if self.identity.is_none() {
            return;
        }

        if self.duty_cycle_pending {
            self.duty_cycle_pending = false;
            self.events.dispatch_duty_cycle(self.config.tx_duty_sec);
        }

        if !self.hw_ready {
            return;
        }

        match self.state {
            LinkState::NeedsInit => self.start_session(),
            LinkState::Joining if self.retry.polls_join() => self.poll_join(),
            LinkState::JoinFailed => self.retry_after_failure(),
            _ => {}
        }
    }

    fn start_session(&mut self) {
        let Some(identity) = self.identity else {
            return;
        };

        if self.session_discard_pending {
            if let Err(e) = self.discard_session() {
                warn!("stale session still stored: {}", e);
            }
        }

        self.activity.reset();
        self.service.set_identity(&identity);
        let restore_session = match self.session.keys() {
            Some(keys) => {
                self.service.set_session(keys, self.session.counters());
                true
            }
            None => false,
        };

        let params = InitParams {
            region: self.config.region,
            subband: self.config.subband,
            confirm_retries: self.config.confirm_retries,
            restore_session,
        };
        info!(
            "initializing {} sub-band {}",
            self.config.region.name(),
            self.config.subband
        );

        match self.service.init(&params) {
            Ok(()) => {
                self.init_failed = false;
                self.request_join();
            }
            Err(_) => {
                error!("service initialization failed");
                self.state = LinkState::JoinFailed;
                self.init_failed = true;
                self.failed_at = Some(self.clock.now());
                self.publish(LinkEvent::JoinStartFailed);
            }
        }
    }

    fn request_join(&mut self) {
        match self.service.join() {
            Ok(()) => {
                info!("join requested");
                self.state = LinkState::Joining;
                self.failed_at = None;
                self.publish(LinkEvent::JoinStarted);
            }
            Err(_) => {
                warn!("join request rejected by the service");
                self.state = LinkState::JoinFailed;
                self.failed_at = Some(self.clock.now());
                self.publish(LinkEvent::JoinFailed);
            }
        }
    }

    fn poll_join(&mut self) {
        match self.service.poll_join() {
            Ok(()) => self.handle_joined(),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(JoinRejected)) => self.handle_join_failed(),
        }
    }

    fn retry_after_failure(&mut self) {
        let now = self.clock.now();
        let Some(failed_at) = self.failed_at else {
            self.failed_at = Some(now);
            return;
        };
        if now.saturating_since(failed_at) < self.retry.retry_delay() {
            return;
        }

        if self.init_failed {
            self.state = LinkState::NeedsInit;
            self.start_session();
        } else {
            self.request_join();
        }
    }

    /// Transmit `payload` on the application port
    ///
    /// Refused unless the hardware is up, an identity is configured, no
    /// re-initialization is pending and the network is joined. Returns
    /// whether the service accepted the uplink.
    pub fn send(&mut self, payload: &[u8], confirmed: bool) -> bool {
        if !self.hw_ready
            || self.identity.is_none()
            || self.state == LinkState::NeedsInit
            || !self.is_joined()
        {
            debug!("send refused, link not ready");
            return false;
        }

        let now = self.clock.now();
        let accepted = match self.service.send(APP_PORT, payload, confirmed) {
            Ok(()) => {
                self.activity.record_tx_success(now);
                if confirmed {
                    self.activity.begin_confirmation(now);
                }
                true
            }
            Err(_) => {
                let failing_for = self.activity.record_tx_failure(now);
                if failing_for >= STUCK_TX_WINDOW {
                    warn!(
                        "uplinks failing for {} s, re-initializing",
                        failing_for.as_secs()
                    );
                    self.activity.clear_failure_streak();
                    if let Err(e) = self.discard_session() {
                        error!("stale session not removed: {}", e);
                        self.session.invalidate();
                        self.session_discard_pending = true;
                    }
                    self.state = LinkState::NeedsInit;
                } else if !payload.is_empty() && self.service.send(APP_PORT, &[], false).is_err() {
                    debug!("empty follow-up uplink failed");
                }
                false
            }
        };

        self.publish(LinkEvent::Transmitted);
        self.persist_counters();
        accepted
    }

    /// Whether the hardware is up and the service reports a joined network
    pub fn is_joined(&self) -> bool {
        self.hw_ready && self.service.join_status() == JoinStatus::Joined
    }

    /// Whether a confirmed uplink is awaiting its result
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.activity.is_awaiting_confirmation()
    }

    /// Lifecycle state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Requested application transmit interval in seconds
    pub fn requested_duty_cycle(&self) -> u32 {
        self.config.tx_duty_sec
    }

    /// Change the requested transmit interval
    ///
    /// Subscribers hear about the change on the next `tick`, not from
    /// inside this call.
    pub fn set_requested_duty_cycle(&mut self, secs: u32) -> Result<(), ConfigError> {
        if secs < MIN_TX_DUTY_SEC {
            return Err(ValidationError::DutyCycleTooShort(secs).into());
        }
        if secs == self.config.tx_duty_sec {
            return Ok(());
        }
        credentials::save_duty_cycle(&mut self.store, secs)?;
        self.config.tx_duty_sec = secs;
        self.duty_cycle_pending = true;
        Ok(())
    }

    /// Retries for a confirmed uplink
    pub fn confirm_retries(&self) -> u32 {
        self.config.confirm_retries
    }

    /// Configured identity
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Connection parameters
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Session keys and counters
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// DevEUI derived from the hardware id
    pub fn hardware_eui(&self) -> EUI64 {
        self.hardware_eui
    }

    /// Store and apply a new identity and configuration
    ///
    /// A change of identity, region or sub-band discards the session and
    /// re-initializes on the next tick. A new retry count also re-initializes,
    /// restoring the current session. Resubmitting the current values changes
    /// nothing.
    ///
    /// When persisting fails, the link keeps running on its previous
    /// configuration. The stored session is removed before the new identity
    /// is written, so a failure part way through can cost the next boot a
    /// join but never restores a session under settings it was not
    /// negotiated for.
    pub fn configure(
        &mut self,
        identity: DeviceIdentity,
        config: ConnectionConfig,
    ) -> Result<(), ConfigError> {
        config.validate()?;

        let material = self.identity != Some(identity) || self.config.differs_in_plan(&config);
        let duty_changed = self.config.tx_duty_sec != config.tx_duty_sec;
        let retries_changed = self.config.confirm_retries != config.confirm_retries;
        if !material && !duty_changed && !retries_changed {
            debug!("configuration unchanged");
            return Ok(());
        }

        if material {
            credentials::destroy_session(&mut self.store)?;
            self.session_discard_pending = false;
            credentials::save_identity(&mut self.store, &identity, &config)?;
        }
        if duty_changed {
            credentials::save_duty_cycle(&mut self.store, config.tx_duty_sec)?;
        }
        if retries_changed {
            credentials::save_confirm_retries(&mut self.store, config.confirm_retries)?;
        }

        self.identity = Some(identity);
        self.config = config;
        if duty_changed {
            self.duty_cycle_pending = true;
        }
        if material {
            info!("configuration changed, session discarded");
            self.session.invalidate();
            self.state = LinkState::NeedsInit;
        } else if retries_changed {
            info!("retry count changed, re-initializing");
            self.state = LinkState::NeedsInit;
        }
        Ok(())
    }

    /// Validate a configuration write against the current values and apply it
    pub fn apply_config_request(&mut self, request: &ConfigRequest<'_>) -> Result<(), ConfigError> {
        let (identity, config) = request.validate(&self.config)?;
        self.configure(identity, config)
    }

    /// Discard the session and re-initialize on the next tick
    ///
    /// Stays [`LinkState::Uninitialized`] when no identity is configured.
    pub fn reset_connection(&mut self) -> Result<(), StoreError> {
        self.discard_session()?;
        self.session.invalidate();
        if self.identity.is_some() {
            info!("connection reset");
            self.state = LinkState::NeedsInit;
        }
        Ok(())
    }

    fn discard_session(&mut self) -> Result<(), StoreError> {
        if self.session.is_fast_restorable() || self.session_discard_pending {
            credentials::destroy_session(&mut self.store)?;
            self.session_discard_pending = false;
            self.session.invalidate();
        }
        Ok(())
    }

    fn persist_counters(&mut self) {
        if !self.session.is_fast_restorable() {
            return;
        }
        let counters = self.service.frame_counters();
        self.session.set_counters(counters);
        if let Err(e) = credentials::save_frame_counters(&mut self.store, counters) {
            warn!("frame counters not saved: {}", e);
        }
    }

    fn join_status(&self) -> JoinStatus {
        if self.hw_ready {
            self.service.join_status()
        } else {
            JoinStatus::Reset
        }
    }

    fn publish(&self, event: LinkEvent) {
        let report = self
            .activity
            .snapshot(event, self.join_status(), self.clock.now());
        self.events.dispatch_activity(&report);
    }

    /// Configuration read
    ///
    /// Without a configured identity, the DevEUI is the hardware default
    /// and the other identifiers are empty.
    pub fn config_report(&self) -> ConfigReport {
        let default_dev_eui = to_hex(&self.hardware_eui);
        let (dev_eui, app_eui, app_key) = match &self.identity {
            Some(identity) => (
                to_hex(&identity.dev_eui),
                to_hex(&identity.app_eui),
                to_hex(&identity.app_key),
            ),
            None => (default_dev_eui.clone(), String::new(), String::new()),
        };
        ConfigReport {
            region: self.config.region.id(),
            default_dev_eui,
            dev_eui,
            app_eui,
            app_key,
            subband: self.config.subband,
            join: self.join_status(),
            tx_duty_sec: self.config.tx_duty_sec,
            tx_retries: self.config.confirm_retries,
            tx_waiting_confirm: self.activity.is_awaiting_confirmation(),
        }
    }

    /// Every supported region with its sub-band range
    pub fn regions(&self) -> impl Iterator<Item = RegionInfo> {
        Region::ALL.into_iter().map(Region::info)
    }

    /// Current activity snapshot
    pub fn activity_report(&self) -> ActivityReport {
        self.activity
            .snapshot(LinkEvent::Status, self.join_status(), self.clock.now())
    }

    /// Subscribers
    pub fn events(&self) -> &Arc<EventRegistry<M>> {
        &self.events
    }

    /// Underlying service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Underlying service, mutably
    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Persistent store
    pub fn store(&self) -> &K {
        &self.store
    }

    /// Persistent store, mutably
    pub fn store_mut(&mut self) -> &mut K {
        &mut self.store
    }
}
