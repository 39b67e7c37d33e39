//! Reactions to notifications from the underlying service

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{JoinRetry, Link, LinkState};
use crate::activity::LinkEvent;
use crate::config::{DeviceClass, SessionState};
use crate::service::{LoRaWanService, ServiceEvent, APP_PORT, CLASS_SWITCH_PORT};
use crate::store::credentials;
use crate::store::CredentialStore;
use crate::time::Clock;

impl<S, K, C, M> Link<S, K, C, M>
where
    S: LoRaWanService,
    K: CredentialStore,
    C: Clock,
    M: RawMutex,
{
    /// Feed a notification from the service into the link
    ///
    /// Integrations with an asynchronous service forward every callback
    /// here. With [`JoinRetry::Backoff`] the join outcome is polled by
    /// `tick` instead, and join notifications need not be forwarded.
    pub fn on_service_event(&mut self, event: ServiceEvent<'_>) {
        match event {
            ServiceEvent::Joined => self.handle_joined(),
            ServiceEvent::JoinFailed => self.handle_join_failed(),
            ServiceEvent::Received { port, payload } => self.handle_received(port, payload),
            ServiceEvent::ConfirmResult(acknowledged) => self.handle_confirm_result(acknowledged),
            ServiceEvent::ClassChanged(class) => self.handle_class_changed(class),
        }
    }

    pub(super) fn handle_joined(&mut self) {
        if !matches!(self.state, LinkState::Joining | LinkState::JoinFailed) {
            debug!("join notification ignored in state {}", self.state);
            return;
        }
        info!("network joined");
        self.state = LinkState::Joined;
        self.failed_at = None;

        if self.service.request_class(DeviceClass::A).is_err() {
            warn!("class A request rejected");
        }

        if self.session.needs_join() {
            match self.service.session_keys() {
                Some(keys) => {
                    let counters = self.service.frame_counters();
                    match credentials::save_session(&mut self.store, &keys, counters) {
                        Ok(()) => {
                            debug!("session saved for the next boot");
                            self.session = SessionState::restored(keys, counters);
                            self.session_discard_pending = false;
                        }
                        Err(e) => warn!("session not saved, next boot joins again: {}", e),
                    }
                }
                None => warn!("service reported no session after join"),
            }
        } else {
            // The last persisted uplink counter may already have been used
            let resumed = self.session.counters().resumed();
            self.service.set_frame_counters(resumed);
            self.session.set_counters(resumed);
        }

        self.publish(LinkEvent::Joined);
        self.events.dispatch_joined();
    }

    pub(super) fn handle_join_failed(&mut self) {
        if self.state != LinkState::Joining {
            debug!("join failure ignored in state {}", self.state);
            return;
        }
        warn!("join failed");
        self.publish(LinkEvent::JoinFailed);

        match self.retry {
            JoinRetry::Immediate => self.request_join(),
            JoinRetry::Backoff(_) => {
                self.state = LinkState::JoinFailed;
                self.failed_at = Some(self.clock.now());
            }
        }
    }

    fn handle_received(&mut self, port: u8, payload: &[u8]) {
        match port {
            CLASS_SWITCH_PORT => match payload {
                [selector] => match DeviceClass::from_selector(*selector) {
                    Some(class) => {
                        info!("class {} requested by the network", class);
                        if self.service.request_class(class).is_err() {
                            warn!("class switch rejected by the service");
                        }
                    }
                    None => warn!("unknown class selector {}", selector),
                },
                _ => warn!("class switch payload of {} bytes ignored", payload.len()),
            },
            APP_PORT => {
                self.activity.record_rx(self.clock.now());
                self.persist_counters();
                self.events.dispatch_received(payload);
                self.publish(LinkEvent::Received);
            }
            other => debug!("downlink on port {} dropped", other),
        }
    }

    fn handle_confirm_result(&mut self, acknowledged: bool) {
        if !self.activity.finish_confirmation(acknowledged) {
            warn!("confirmation result with no confirmed uplink pending");
            return;
        }
        self.publish(LinkEvent::ConfirmResult);
        self.events.dispatch_confirm(acknowledged);
    }

    fn handle_class_changed(&mut self, class: DeviceClass) {
        info!("device class now {}", class);
        // An empty uplink lets the network server see the new class
        if self.service.send(APP_PORT, &[], false).is_err() {
            warn!("class change uplink failed");
        }
    }
}
