use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use lorawan_link::{
    activity::LinkEvent,
    config::{DeviceClass, FrameCounters},
    link::{JoinRetry, LinkBusy, LinkState, SharedLink},
    service::{JoinStatus, ServiceEvent, APP_PORT, CLASS_SWITCH_PORT},
    store::{credentials::keys, CredentialStore},
};

use mock::{
    joined_link, joining_link, link_with_store, session_keys, FlakyStore, MockClock, MockService,
    Recorder,
};

type SharedTestLink = SharedLink<CriticalSectionRawMutex, MockService, FlakyStore, MockClock>;

#[test]
fn test_join_persists_negotiated_session() {
    let (mut link, _clock, events) = joining_link(JoinRetry::Immediate);
    let joins = Recorder::new();
    let activity = Recorder::new();
    {
        let joins = joins.clone();
        events.on_join(move || joins.push(()));
    }
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push((report.event, report.join)));
    }
    link.service_mut().counters = FrameCounters { up: 0, down: 1 };
    link.service_mut().status = JoinStatus::Joined;

    link.on_service_event(ServiceEvent::Joined);

    assert_eq!(link.state(), LinkState::Joined);
    assert_eq!(joins.len(), 1);
    assert_eq!(activity.take(), vec![(LinkEvent::Joined, JoinStatus::Joined)]);
    assert_eq!(link.service().classes, vec![DeviceClass::A]);
    assert!(link.session().is_fast_restorable());
    assert_eq!(link.session().keys(), Some(&session_keys()));

    let store = &link.store().inner;
    let mut nwk_skey = [0u8; 16];
    assert!(store.get_bytes(keys::NWK_SKEY, &mut nwk_skey));
    assert_eq!(nwk_skey, session_keys().nwk_skey);
    assert_eq!(store.get_u32(keys::DOWN_CNT), Some(1));
    assert!(link.service().primed.is_empty());
}

#[test]
fn test_join_with_unsaved_session_must_negotiate_again() {
    let (mut link, _clock, _events) = joining_link(JoinRetry::Immediate);
    link.store_mut().fail_writes = true;
    link.service_mut().status = JoinStatus::Joined;

    link.on_service_event(ServiceEvent::Joined);

    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().needs_join());
    assert!(link.send(b"still usable", false));
}

#[test]
fn test_restored_join_resumes_counters() {
    let mut store = FlakyStore::new();
    {
        let (link, _clock, _events) = joined_link();
        store.inner = link.store().inner.clone();
    }
    store.inner.put_u32(keys::UP_CNT, 41).unwrap();
    store.inner.put_u32(keys::DOWN_CNT, 7).unwrap();

    let (mut link, _clock, events) = link_with_store(store, JoinRetry::Immediate);
    let joins = Recorder::new();
    {
        let joins = joins.clone();
        events.on_join(move || joins.push(()));
    }
    link.begin().unwrap();
    link.tick();
    assert_eq!(
        link.service().restored,
        Some((session_keys(), FrameCounters { up: 41, down: 7 }))
    );

    link.service_mut().status = JoinStatus::Joined;
    link.on_service_event(ServiceEvent::Joined);

    assert_eq!(link.service().primed, vec![FrameCounters { up: 42, down: 7 }]);
    assert_eq!(link.service().counters, FrameCounters { up: 42, down: 7 });
    assert_eq!(joins.len(), 1);

    assert!(link.send(b"next", false));
    assert_eq!(link.store().inner.get_u32(keys::UP_CNT), Some(43));
}

#[test]
fn test_join_notification_outside_joining_is_ignored() {
    let (mut link, _clock, events) = joined_link();
    let joins = Recorder::new();
    {
        let joins = joins.clone();
        events.on_join(move || joins.push(()));
    }
    link.on_service_event(ServiceEvent::Joined);
    assert_eq!(joins.len(), 0);
}

#[test]
fn test_join_failed_retries_immediately() {
    let (mut link, _clock, events) = joining_link(JoinRetry::Immediate);
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }
    link.service_mut().status = JoinStatus::Failed;

    link.on_service_event(ServiceEvent::JoinFailed);

    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(link.service().joins, 2);
    assert_eq!(
        activity.take(),
        vec![LinkEvent::JoinFailed, LinkEvent::JoinStarted]
    );
}

#[test]
fn test_backoff_polls_and_waits() {
    let (mut link, clock, events) = joining_link(JoinRetry::backoff(Duration::from_secs(10)));
    let activity = Recorder::new();
    {
        let activity = activity.clone();
        events.on_activity(move |report| activity.push(report.event));
    }

    link.tick();
    assert_eq!(link.state(), LinkState::Joining);

    link.service_mut().status = JoinStatus::Failed;
    link.tick();
    assert_eq!(link.state(), LinkState::JoinFailed);
    assert_eq!(activity.take(), vec![LinkEvent::JoinFailed]);
    assert_eq!(link.service().joins, 1);

    clock.advance(Duration::from_secs(9));
    link.tick();
    assert_eq!(link.service().joins, 1);

    clock.advance(Duration::from_secs(1));
    link.tick();
    assert_eq!(link.service().joins, 2);
    assert_eq!(link.state(), LinkState::Joining);
    assert_eq!(activity.take(), vec![LinkEvent::JoinStarted]);

    link.service_mut().status = JoinStatus::Joined;
    link.tick();
    assert_eq!(link.state(), LinkState::Joined);
    assert!(link.session().is_fast_restorable());
}

#[test]
fn test_application_downlink_dispatched() {
    let (mut link, clock, events) = joined_link();
    let payloads = Recorder::new();
    {
        let payloads = payloads.clone();
        events.on_receive(move |payload| payloads.push(payload.to_vec()));
    }
    clock.advance(Duration::from_secs(3));
    link.service_mut().counters.down = 5;

    link.on_service_event(ServiceEvent::Received {
        port: APP_PORT,
        payload: &[0xca, 0xfe],
    });

    assert_eq!(payloads.take(), vec![vec![0xca, 0xfe]]);
    let report = link.activity_report();
    assert_eq!(report.rx, Some(3000));
    assert_eq!(report.event, LinkEvent::Status);
    assert_eq!(link.store().inner.get_u32(keys::DOWN_CNT), Some(5));
}

#[test]
fn test_class_switch_port_not_forwarded() {
    let (mut link, _clock, events) = joined_link();
    let payloads = Recorder::new();
    {
        let payloads = payloads.clone();
        events.on_receive(move |payload| payloads.push(payload.to_vec()));
    }

    link.on_service_event(ServiceEvent::Received {
        port: CLASS_SWITCH_PORT,
        payload: &[2],
    });
    link.on_service_event(ServiceEvent::Received {
        port: CLASS_SWITCH_PORT,
        payload: &[7],
    });
    link.on_service_event(ServiceEvent::Received {
        port: CLASS_SWITCH_PORT,
        payload: &[1, 1],
    });
    link.on_service_event(ServiceEvent::Received {
        port: 99,
        payload: &[1],
    });

    assert_eq!(payloads.len(), 0);
    assert_eq!(link.service().classes, vec![DeviceClass::A, DeviceClass::C]);
    assert_eq!(link.activity_report().rx, None);
}

#[test]
fn test_class_change_sends_empty_uplink() {
    let (mut link, _clock, _events) = joined_link();
    link.on_service_event(ServiceEvent::ClassChanged(DeviceClass::C));

    let uplink = link.service().last_uplink().unwrap();
    assert_eq!(uplink.port, APP_PORT);
    assert!(uplink.payload.is_empty());
    assert!(!uplink.confirmed);
}

#[test]
fn test_activity_report_json() {
    let (mut link, clock, _events) = joined_link();
    clock.advance(Duration::from_secs(2));
    assert!(link.send(b"x", true));

    let json = serde_json::to_value(link.activity_report()).unwrap();
    assert_eq!(json["event"], "status");
    assert_eq!(json["join"], "SET");
    assert_eq!(json["tx_ok"], 2000);
    assert!(json["tx_fail"].is_null());
    assert_eq!(json["awaiting_confirm"], true);
    assert_eq!(json["confirm_started"], 2000);
    assert_eq!(json["ts"], 2000);
}

#[test]
fn test_config_report_json() {
    let (link, _clock, _events) = joined_link();
    let json = serde_json::to_value(link.config_report()).unwrap();
    assert_eq!(json["region"], 1);
    assert_eq!(json["deviceEUI"], "0101010101010101");
    assert_eq!(json["deviceEUI_default"], "0807060504030201");
    assert_eq!(json["appEUI"], "0202020202020202");
    assert_eq!(json["join"], "SET");
    assert_eq!(json["tx_waiting_confirm"], false);

    let regions = serde_json::to_value(link.regions().collect::<Vec<_>>()).unwrap();
    assert_eq!(regions[8]["id"], 8);
    assert_eq!(regions[8]["max_sb"], 9);
}

#[test]
fn test_shared_link_reentry_from_subscriber_is_busy() {
    let (link, _clock, events) = joined_link();
    let shared: Arc<SharedTestLink> = Arc::new(SharedLink::new(link));
    let nested = Recorder::new();
    {
        let nested = nested.clone();
        let shared = Arc::downgrade(&shared);
        events.on_receive(move |_| {
            if let Some(shared) = shared.upgrade() {
                nested.push(shared.lock(|link| link.tick()));
            }
        });
    }

    let outer = shared.lock(|link| {
        link.on_service_event(ServiceEvent::Received {
            port: APP_PORT,
            payload: &[0x01],
        })
    });

    assert_eq!(outer, Ok(()));
    assert_eq!(nested.take(), vec![Err(LinkBusy)]);
    // The link is usable again once the outer call returns
    assert_eq!(shared.lock(|link| link.state()), Ok(LinkState::Joined));
}

#[test]
fn test_shared_link_driven_from_two_threads() {
    let (link, _clock, _events) = joined_link();
    let shared: Arc<SharedTestLink> = Arc::new(SharedLink::new(link));

    let sender = {
        let shared = shared.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                assert_eq!(shared.lock(|link| link.send(b"data", false)), Ok(true));
            }
        })
    };
    let ticker = {
        let shared = shared.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                assert_eq!(shared.lock(|link| link.tick()), Ok(()));
            }
        })
    };
    sender.join().unwrap();
    ticker.join().unwrap();

    let shared = match Arc::try_unwrap(shared) {
        Ok(shared) => shared,
        Err(_) => panic!("link still shared"),
    };
    let link = shared.into_inner();
    assert_eq!(link.state(), LinkState::Joined);
    assert_eq!(link.service().uplinks.len(), 50);
    assert_eq!(link.store().inner.get_u32(keys::UP_CNT), Some(50));
}
