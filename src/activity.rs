//! Transmit/receive activity bookkeeping
//!
//! Pure record keeping for the link: last transmit success and failure,
//! last downlink, the start of the current run of failed transmissions and
//! the confirmed-uplink counters. Nothing here makes decisions; the link
//! reads the numbers and acts on them.

use core::time::Duration;

use serde::Serialize;

use crate::service::JoinStatus;
use crate::time::Timestamp;

/// What prompted an activity report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum LinkEvent {
    /// A join was requested
    JoinStarted,
    /// The service could not be initialized, so no join was requested
    JoinStartFailed,
    /// A join attempt failed
    JoinFailed,
    /// The network was joined
    Joined,
    /// An uplink was attempted
    Transmitted,
    /// An application downlink arrived
    Received,
    /// A confirmed uplink was acknowledged or given up on
    ConfirmResult,
    /// Requested on demand rather than caused by an event
    Status,
}

/// Snapshot of link activity, suitable for a push feed
///
/// Times are milliseconds on the link's clock; `None` means the event has
/// not happened since the last initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityReport {
    /// Event that triggered this report
    pub event: LinkEvent,
    /// Join state reported by the service
    pub join: JoinStatus,
    /// Last successful transmission
    pub tx_ok: Option<u64>,
    /// Last failed transmission
    pub tx_fail: Option<u64>,
    /// Last application downlink
    pub rx: Option<u64>,
    /// Acknowledged confirmed uplinks
    pub confirm_ok: u32,
    /// Unacknowledged confirmed uplinks
    pub confirm_fail: u32,
    /// Whether a confirmed uplink is awaiting its result
    pub awaiting_confirm: bool,
    /// Start of the pending confirmed uplink
    pub confirm_started: Option<u64>,
    /// When the report was assembled
    pub ts: u64,
}

/// Activity record for one link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityTracker {
    last_tx_ok: Option<Timestamp>,
    last_tx_fail: Option<Timestamp>,
    last_rx: Option<Timestamp>,
    failing_since: Option<Timestamp>,
    confirm_ok: u32,
    confirm_fail: u32,
    confirm_started: Option<Timestamp>,
}

impl ActivityTracker {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, as after a re-initialization
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record a successful transmission, ending any failure run
    pub fn record_tx_success(&mut self, now: Timestamp) {
        self.last_tx_ok = Some(now);
        self.failing_since = None;
    }

    /// Record a failed transmission and return how long transmissions have
    /// been failing without a success in between
    pub fn record_tx_failure(&mut self, now: Timestamp) -> Duration {
        self.last_tx_fail = Some(now);
        let since = *self.failing_since.get_or_insert(now);
        now.saturating_since(since)
    }

    /// Forget the current failure run without recording a success
    pub fn clear_failure_streak(&mut self) {
        self.failing_since = None;
    }

    /// Record an application downlink
    pub fn record_rx(&mut self, now: Timestamp) {
        self.last_rx = Some(now);
    }

    /// A confirmed uplink left; its result is now awaited
    pub fn begin_confirmation(&mut self, now: Timestamp) {
        self.confirm_started = Some(now);
    }

    /// Settle the pending confirmed uplink
    ///
    /// Returns `false`, counting nothing, when no confirmation was pending.
    pub fn finish_confirmation(&mut self, acknowledged: bool) -> bool {
        if self.confirm_started.take().is_none() {
            return false;
        }
        if acknowledged {
            self.confirm_ok = self.confirm_ok.saturating_add(1);
        } else {
            self.confirm_fail = self.confirm_fail.saturating_add(1);
        }
        true
    }

    /// Whether a confirmed uplink is awaiting its result
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.confirm_started.is_some()
    }

    /// Acknowledged confirmed uplinks since the last reset
    pub fn confirmed_ok(&self) -> u32 {
        self.confirm_ok
    }

    /// Unacknowledged confirmed uplinks since the last reset
    pub fn confirmed_failed(&self) -> u32 {
        self.confirm_fail
    }

    /// Last successful transmission
    pub fn last_tx_ok(&self) -> Option<Timestamp> {
        self.last_tx_ok
    }

    /// Last failed transmission
    pub fn last_tx_fail(&self) -> Option<Timestamp> {
        self.last_tx_fail
    }

    /// Last application downlink
    pub fn last_rx(&self) -> Option<Timestamp> {
        self.last_rx
    }

    /// Assemble a report
    pub fn snapshot(&self, event: LinkEvent, join: JoinStatus, now: Timestamp) -> ActivityReport {
        ActivityReport {
            event,
            join,
            tx_ok: self.last_tx_ok.map(Timestamp::as_millis),
            tx_fail: self.last_tx_fail.map(Timestamp::as_millis),
            rx: self.last_rx.map(Timestamp::as_millis),
            confirm_ok: self.confirm_ok,
            confirm_fail: self.confirm_fail,
            awaiting_confirm: self.is_awaiting_confirmation(),
            confirm_started: self.confirm_started.map(Timestamp::as_millis),
            ts: now.as_millis(),
        }
    }
}
