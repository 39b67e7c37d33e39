use std::time::Duration;

use lorawan_link::{
    activity::LinkEvent,
    config::{ConfigRequest, ConnectionConfig, DeviceIdentity, ValidationError},
    link::{ConfigError, JoinRetry, LinkState, STUCK_TX_WINDOW},
    region::Region,
    service::{JoinStatus, ServiceEvent, APP_PORT},
    store::{credentials::keys, CredentialStore, StoreError},
};

use mock::{
    identity, joined_link, joining_link, link_with_store, new_link, reboot_store, session_keys,
    FlakyStore, Recorder,
};

#[test]
fn test_unconfigured_tick_is_noop() {
    let (mut link, _clock, events) = new_link(JoinRetry::Immediate);
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }

    link.begin().unwrap();
    link.tick();
    link.tick();

    assert_eq!(link.state(), LinkState::Uninitialized);
    assert!(!link.is_joined());
    assert!(link.service().inits.is_empty());
    assert_eq!(link.service().joins, 0);
    assert_eq!(activity.len(), 0);
    assert!(!link.send(b"data", false));
}

#[test]
fn test_configure_then_tick_requests_join() {
    let (mut link, _clock, events) = new_link(JoinRetry::Immediate);
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }
    link.begin().unwrap();

    link.configure(identity(), ConnectionConfig::default()).unwrap();
    assert_eq!(link.state(), LinkState::NeedsInit);

    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(link.service().joins, 1);
    assert_eq!(link.service().identity, Some(identity()));
    let init = link.service().inits[0];
    assert_eq!(init.region, Region::Au915);
    assert_eq!(init.subband, 1);
    assert_eq!(init.confirm_retries, 1);
    assert!(!init.restore_session);
    assert_eq!(activity.take(), vec![LinkEvent::JoinStarted]);
}

#[test]
fn test_tick_waits_for_hardware() {
    let (mut link, _clock, _events) = new_link(JoinRetry::Immediate);
    link.configure(identity(), ConnectionConfig::default()).unwrap();
    link.tick();
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.service().inits.is_empty());

    link.service_mut().fail_hardware = true;
    assert!(link.begin().is_err());
    link.tick();
    assert!(link.service().inits.is_empty());

    link.service_mut().fail_hardware = false;
    link.begin().unwrap();
    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
}

#[test]
fn test_send_refused_until_joined() {
    let (mut link, _clock, _events) = joining_link(JoinRetry::Immediate);
    assert!(!link.send(b"early", false));
    assert!(link.service().uplinks.is_empty());

    link.service_mut().status = JoinStatus::Joined;
    link.on_service_event(ServiceEvent::Joined);
    assert!(link.send(b"hello", false));
    let uplink = link.service().last_uplink().unwrap();
    assert_eq!(uplink.port, APP_PORT);
    assert_eq!(uplink.payload, b"hello");
}

#[test]
fn test_idempotent_configure_keeps_session() {
    let (mut link, _clock, _events) = joined_link();
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
    let writes = link.store().writes;

    link.configure(identity(), ConnectionConfig::default()).unwrap();
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
    assert!(link.store().inner.contains(keys::NWK_SKEY));
    assert_eq!(link.store().writes, writes);

    // The same values through the configuration write path
    let request = ConfigRequest {
        dev_eui: Some("0101010101010101"),
        app_eui: Some("0202020202020202"),
        app_key: Some("03030303030303030303030303030303"),
        ..Default::default()
    };
    link.apply_config_request(&request).unwrap();
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
}

#[test]
fn test_material_change_discards_session() {
    let (mut link, _clock, _events) = joined_link();

    let other = DeviceIdentity::new([0x09; 8], [0x02; 8], [0x03; 16]);
    link.configure(other, ConnectionConfig::default()).unwrap();
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().needs_join());
    assert!(!link.store().inner.contains(keys::NWK_SKEY));
    assert!(!link.send(b"x", false));

    let (mut link, _clock, _events) = joined_link();
    let config = ConnectionConfig {
        subband: 2,
        ..ConnectionConfig::default()
    };
    link.configure(identity(), config).unwrap();
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().needs_join());
}

#[test]
fn test_duty_cycle_only_change_keeps_session() {
    let (mut link, _clock, events) = joined_link();
    let duty = Recorder::new();
    {
        let duty = duty.clone();
        events.on_duty_cycle(move |secs| duty.push(secs));
    }

    let config = ConnectionConfig {
        tx_duty_sec: 120,
        ..ConnectionConfig::default()
    };
    link.configure(identity(), config).unwrap();
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
    assert_eq!(duty.len(), 0);

    link.tick();
    assert_eq!(duty.take(), vec![120]);
}

#[test]
fn test_invalid_configure_keeps_previous() {
    let (mut link, _clock, _events) = joined_link();
    let config = ConnectionConfig {
        region: Region::Eu868,
        subband: 5,
        ..ConnectionConfig::default()
    };
    let err = link.configure(identity(), config).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Validation(ValidationError::SubbandOutOfRange { subband: 5, max: 2 })
    );
    assert_eq!(link.config(), &ConnectionConfig::default());
    assert_eq!(link.state(), LinkState::Joined);
}

#[test]
fn test_storage_failure_is_all_or_nothing() {
    let (mut link, _clock, events) = joined_link();
    let duty = Recorder::new();
    {
        let duty = duty.clone();
        events.on_duty_cycle(move |secs| duty.push(secs));
    }
    link.store_mut().fail_writes = true;

    let other = DeviceIdentity::new([0x09; 8], [0x02; 8], [0x03; 16]);
    let config = ConnectionConfig {
        tx_duty_sec: 300,
        ..ConnectionConfig::default()
    };
    let err = link.configure(other, config).unwrap_err();
    assert_eq!(err, ConfigError::Storage(StoreError::WriteFailed));
    assert_eq!(link.identity(), Some(&identity()));
    assert_eq!(link.requested_duty_cycle(), ConnectionConfig::default().tx_duty_sec);
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());

    link.tick();
    assert_eq!(duty.len(), 0);
}

#[test]
fn test_failed_session_removal_keeps_stored_identity() {
    let (mut link, _clock, _events) = joined_link();
    link.store_mut().fail_removes = true;

    let other = DeviceIdentity::new([0x09; 8], [0x09; 8], [0x09; 16]);
    let config = ConnectionConfig {
        region: Region::Us915,
        subband: 2,
        ..ConnectionConfig::default()
    };
    let err = link.configure(other, config).unwrap_err();
    assert_eq!(err, ConfigError::Storage(StoreError::RemoveFailed));
    assert_eq!(link.state(), LinkState::Joined);

    // The stored session still belongs to the stored identity
    let (rebooted, _clock, _events) = link_with_store(reboot_store(&link), JoinRetry::Immediate);
    assert_eq!(rebooted.identity(), Some(&identity()));
    assert_eq!(rebooted.config().region, Region::Au915);
    assert_eq!(rebooted.config().subband, 1);
    assert!(rebooted.session().is_fast_restorable());
}

#[test]
fn test_interrupted_identity_write_drops_stored_session() {
    let (mut link, _clock, _events) = joined_link();
    // Region and sub-band are written, the DevEUI write fails
    let writes = link.store().writes;
    link.store_mut().fail_after = Some(writes + 2);

    let other = DeviceIdentity::new([0x09; 8], [0x09; 8], [0x09; 16]);
    let config = ConnectionConfig {
        region: Region::Us915,
        subband: 2,
        ..ConnectionConfig::default()
    };
    let err = link.configure(other, config).unwrap_err();
    assert_eq!(err, ConfigError::Storage(StoreError::WriteFailed));
    assert_eq!(link.identity(), Some(&identity()));
    assert_eq!(link.state(), LinkState::Joined);
    assert!(!link.store().inner.contains(keys::NWK_SKEY));

    let (rebooted, _clock, _events) = link_with_store(reboot_store(&link), JoinRetry::Immediate);
    assert_eq!(rebooted.config().region, Region::Us915);
    assert_eq!(rebooted.identity(), Some(&identity()));
    assert!(!rebooted.session().is_fast_restorable());
}

#[test]
fn test_retry_count_change_reinitializes_with_session() {
    let (mut link, _clock, _events) = joined_link();
    let config = ConnectionConfig {
        confirm_retries: 3,
        ..ConnectionConfig::default()
    };
    link.configure(identity(), config).unwrap();
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().is_fast_restorable());
    assert!(link.store().inner.contains(keys::NWK_SKEY));
    assert_eq!(link.store().inner.get_u32(keys::TX_RETRIES), Some(3));

    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
    let init = link.service().inits[1];
    assert_eq!(init.confirm_retries, 3);
    assert!(init.restore_session);
    assert_eq!(
        link.service().restored.map(|(keys, _)| keys),
        Some(session_keys())
    );
}

#[test]
fn test_duty_cycle_setter() {
    let (mut link, _clock, events) = joined_link();
    let duty = Recorder::new();
    {
        let duty = duty.clone();
        events.on_duty_cycle(move |secs| duty.push(secs));
    }

    assert_eq!(
        link.set_requested_duty_cycle(9),
        Err(ConfigError::Validation(ValidationError::DutyCycleTooShort(9)))
    );
    assert_eq!(link.requested_duty_cycle(), 10);

    link.set_requested_duty_cycle(10).unwrap();
    link.tick();
    assert_eq!(duty.len(), 0);

    link.set_requested_duty_cycle(30).unwrap();
    assert_eq!(link.requested_duty_cycle(), 30);
    assert_eq!(duty.len(), 0);
    link.tick();
    link.tick();
    assert_eq!(duty.take(), vec![30]);
    assert_eq!(link.store().inner.get_u32(keys::TX_DUTY), Some(30));

    link.store_mut().fail_writes = true;
    assert_eq!(
        link.set_requested_duty_cycle(60),
        Err(ConfigError::Storage(StoreError::WriteFailed))
    );
    assert_eq!(link.requested_duty_cycle(), 30);
}

#[test]
fn test_confirmed_send_waits_for_result() {
    let (mut link, _clock, events) = joined_link();
    let confirms = Recorder::new();
    {
        let confirms = confirms.clone();
        events.on_confirm(move |ok| confirms.push(ok));
    }

    assert!(link.send(b"ack me", true));
    assert!(link.is_awaiting_confirmation());
    assert!(link.config_report().tx_waiting_confirm);

    link.on_service_event(ServiceEvent::ConfirmResult(true));
    assert!(!link.is_awaiting_confirmation());
    assert_eq!(confirms.take(), vec![true]);
    let report = link.activity_report();
    assert_eq!(report.confirm_ok, 1);
    assert_eq!(report.confirm_fail, 0);

    // A second result without a pending uplink is dropped
    link.on_service_event(ServiceEvent::ConfirmResult(false));
    assert_eq!(confirms.len(), 0);
    assert_eq!(link.activity_report().confirm_fail, 0);
}

#[test]
fn test_unconfirmed_send_does_not_wait() {
    let (mut link, _clock, _events) = joined_link();
    assert!(link.send(b"fire", false));
    assert!(!link.is_awaiting_confirmation());
}

#[test]
fn test_failed_send_follows_with_empty_uplink() {
    let (mut link, _clock, _events) = joined_link();
    link.service_mut().fail_send = true;

    assert!(!link.send(b"payload", false));
    let uplinks = &link.service().uplinks;
    assert_eq!(uplinks.len(), 2);
    assert_eq!(uplinks[0].payload, b"payload");
    assert!(uplinks[1].payload.is_empty());
    assert!(!uplinks[1].confirmed);
}

#[test]
fn test_failed_empty_send_is_not_repeated() {
    let (mut link, _clock, _events) = joined_link();
    link.service_mut().fail_send = true;

    assert!(!link.send(&[], false));
    assert_eq!(link.service().uplinks.len(), 1);
}

#[test]
fn test_stuck_transmitter_forces_reinit() {
    let (mut link, clock, events) = joined_link();
    assert!(link.store().inner.contains(keys::NWK_SKEY));
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }
    link.service_mut().fail_send = true;

    for _ in 0..9 {
        assert!(!link.send(b"data", false));
        assert_eq!(link.state(), LinkState::Joined);
        clock.advance(Duration::from_secs(10));
    }
    // Tenth failure, 90 s after the first
    assert!(!link.send(b"data", false));
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().needs_join());
    assert!(!link.store().inner.contains(keys::NWK_SKEY));
    assert_eq!(activity.take(), vec![LinkEvent::Transmitted; 10]);

    // Send is refused until the link has re-initialized
    assert!(!link.send(b"data", false));

    link.service_mut().fail_send = false;
    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(link.service().inits.len(), 2);
    assert!(!link.service().inits[1].restore_session);
}

#[test]
fn test_stuck_transmitter_removes_stored_session_before_reinit() {
    let (mut link, clock, _events) = joined_link();
    link.store_mut().fail_removes = true;
    link.service_mut().fail_send = true;

    assert!(!link.send(b"data", false));
    clock.advance(STUCK_TX_WINDOW);
    assert!(!link.send(b"data", false));
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().needs_join());
    assert!(link.store().inner.contains(keys::NWK_SKEY));

    // Removal still failing: init goes ahead without the session and the
    // keys stay owed
    link.service_mut().fail_init = true;
    link.tick();
    assert_eq!(link.state(), LinkState::JoinFailed);
    assert!(!link.service().inits[1].restore_session);
    assert!(link.store().inner.contains(keys::NWK_SKEY));

    link.store_mut().fail_removes = false;
    link.service_mut().fail_init = false;
    clock.advance(Duration::from_secs(10));
    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(link.service().inits.len(), 3);
    assert!(!link.store().inner.contains(keys::NWK_SKEY));
    assert!(link.store().inner.contains(keys::DEV_EUI));

    let (rebooted, _clock, _events) = link_with_store(reboot_store(&link), JoinRetry::Immediate);
    assert!(!rebooted.session().is_fast_restorable());
}

#[test]
fn test_success_restarts_failure_window() {
    let (mut link, clock, _events) = joined_link();

    link.service_mut().fail_send = true;
    assert!(!link.send(b"a", false));
    clock.advance(Duration::from_secs(60));
    link.service_mut().fail_send = false;
    assert!(link.send(b"b", false));

    link.service_mut().fail_send = true;
    clock.advance(Duration::from_secs(60));
    assert!(!link.send(b"c", false));
    clock.advance(STUCK_TX_WINDOW - Duration::from_secs(1));
    assert!(!link.send(b"d", false));
    assert_eq!(link.state(), LinkState::Joined);
}

#[test]
fn test_reset_connection() {
    let (mut link, _clock, _events) = joined_link();
    link.reset_connection().unwrap();
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().needs_join());
    assert!(!link.store().inner.contains(keys::APP_SKEY));
    assert!(link.store().inner.contains(keys::DEV_EUI));
}

#[test]
fn test_reset_connection_storage_failure() {
    let (mut link, _clock, _events) = joined_link();
    link.store_mut().fail_removes = true;
    assert_eq!(link.reset_connection(), Err(StoreError::RemoveFailed));
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
}

#[test]
fn test_reset_without_identity_stays_uninitialized() {
    let (mut link, _clock, _events) = new_link(JoinRetry::Immediate);
    link.reset_connection().unwrap();
    assert_eq!(link.state(), LinkState::Uninitialized);
}

#[test]
fn test_restart_restores_session() {
    let (link, _clock, _events) = joined_link();
    let store = link.store();
    let mut copy = FlakyStore::new();
    copy.inner = store.inner.clone();

    let (mut link, _clock, _events) = link_with_store(copy, JoinRetry::Immediate);
    assert_eq!(link.state(), LinkState::NeedsInit);
    assert!(link.session().is_fast_restorable());

    link.begin().unwrap();
    link.tick();
    assert!(link.service().inits[0].restore_session);
    assert!(link.service().restored.is_some());
}

#[test]
fn test_init_failure_retries_after_delay() {
    let (mut link, clock, events) = new_link(JoinRetry::Immediate);
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }
    link.begin().unwrap();
    link.configure(identity(), ConnectionConfig::default()).unwrap();
    link.service_mut().fail_init = true;

    link.tick();
    assert_eq!(link.state(), LinkState::JoinFailed);
    assert_eq!(activity.take(), vec![LinkEvent::JoinStartFailed]);
    assert_eq!(link.service().joins, 0);

    clock.advance(Duration::from_secs(5));
    link.tick();
    assert_eq!(link.service().inits.len(), 1);

    link.service_mut().fail_init = false;
    clock.advance(Duration::from_secs(5));
    link.tick();
    assert_eq!(link.service().inits.len(), 2);
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(activity.take(), vec![LinkEvent::JoinStarted]);
}

#[test]
fn test_join_request_rejected_retries_after_delay() {
    let (mut link, clock, _events) = new_link(JoinRetry::Immediate);
    link.begin().unwrap();
    link.configure(identity(), ConnectionConfig::default()).unwrap();
    link.service_mut().fail_join = true;

    link.tick();
    assert_eq!(link.state(), LinkState::JoinFailed);
    assert_eq!(link.service().joins, 1);

    link.service_mut().fail_join = false;
    clock.advance(Duration::from_secs(10));
    link.tick();
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(link.service().joins, 2);
    // Init succeeded the first time; only the join is repeated
    assert_eq!(link.service().inits.len(), 1);
}

#[test]
fn test_config_report() {
    let (mut link, _clock, _events) = new_link(JoinRetry::Immediate);
    let report = link.config_report();
    assert_eq!(report.region, Region::Au915.id());
    assert_eq!(report.default_dev_eui.as_str(), "0807060504030201");
    assert_eq!(report.dev_eui, report.default_dev_eui);
    assert!(report.app_key.is_empty());
    assert_eq!(report.join, JoinStatus::Reset);

    link.configure(identity(), ConnectionConfig::default()).unwrap();
    let report = link.config_report();
    assert_eq!(report.dev_eui.as_str(), "0101010101010101");
    assert_eq!(report.app_key.as_str(), "03030303030303030303030303030303");
    assert_eq!(report.tx_duty_sec, 10);
    assert_eq!(report.tx_retries, 1);
    assert!(!report.tx_waiting_confirm);

    assert_eq!(link.regions().count(), 13);
}
