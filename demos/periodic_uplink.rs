//! Host simulation of a sensor node sending periodic uplinks
//!
//! The network is simulated: joins complete on the tick after they are
//! requested, every third uplink fails, and the network asks for a class C
//! switch once joined. Run with `cargo run --example periodic_uplink --features std`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use lorawan_link::{
    config::{ConfigRequest, DeviceClass, DeviceIdentity, FrameCounters, SessionKeys},
    events::EventRegistry,
    link::{JoinRetry, Link, SharedLink},
    service::{InitParams, JoinStatus, LoRaWanService, ServiceEvent, CLASS_SWITCH_PORT},
    store::MemoryStore,
    time::StdClock,
};

// Sensor data structure
#[derive(Default)]
struct SensorData {
    temperature: i16,
    humidity: u8,
    pressure: u16,
}

impl SensorData {
    fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..2].copy_from_slice(&self.temperature.to_be_bytes());
        bytes[2] = self.humidity;
        bytes[3..5].copy_from_slice(&self.pressure.to_be_bytes());
        bytes
    }
}

#[derive(Debug)]
struct SimError;

/// Stand-in for a MAC/radio stack
struct SimulatedStack {
    status: JoinStatus,
    counters: FrameCounters,
    uplinks: u32,
}

impl SimulatedStack {
    fn new() -> Self {
        Self {
            status: JoinStatus::Reset,
            counters: FrameCounters::default(),
            uplinks: 0,
        }
    }

    /// Notification the stack would raise from its own context
    fn pending_event(&mut self) -> Option<ServiceEvent<'static>> {
        if self.status == JoinStatus::Ongoing {
            self.status = JoinStatus::Joined;
            return Some(ServiceEvent::Joined);
        }
        None
    }
}

impl LoRaWanService for SimulatedStack {
    type Error = SimError;

    fn unique_id(&self) -> u64 {
        0x00de_adbe_ef00_0001
    }

    fn init_hardware(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_identity(&mut self, _identity: &DeviceIdentity) {}

    fn set_session(&mut self, _keys: &SessionKeys, counters: FrameCounters) {
        self.counters = counters;
    }

    fn init(&mut self, params: &InitParams) -> Result<(), Self::Error> {
        println!(
            "stack: init {} sub-band {}",
            params.region.name(),
            params.subband
        );
        self.status = JoinStatus::Reset;
        Ok(())
    }

    fn join(&mut self) -> Result<(), Self::Error> {
        self.status = JoinStatus::Ongoing;
        Ok(())
    }

    fn join_status(&self) -> JoinStatus {
        self.status
    }

    fn send(&mut self, port: u8, payload: &[u8], confirmed: bool) -> Result<(), Self::Error> {
        self.uplinks += 1;
        if self.uplinks % 3 == 0 {
            return Err(SimError);
        }
        self.counters.up += 1;
        println!(
            "stack: uplink #{} port {} {} bytes{}",
            self.counters.up,
            port,
            payload.len(),
            if confirmed { " (confirmed)" } else { "" }
        );
        Ok(())
    }

    fn request_class(&mut self, class: DeviceClass) -> Result<(), Self::Error> {
        println!("stack: class {:?} requested", class);
        Ok(())
    }

    fn session_keys(&self) -> Option<SessionKeys> {
        Some(SessionKeys {
            dev_addr: [0x26, 0x0b, 0x00, 0x01],
            nwk_skey: [0x5a; 16],
            app_skey: [0xa5; 16],
        })
    }

    fn frame_counters(&self) -> FrameCounters {
        self.counters
    }

    fn set_frame_counters(&mut self, counters: FrameCounters) {
        self.counters = counters;
    }
}

fn main() {
    let events = Arc::new(EventRegistry::<CriticalSectionRawMutex>::new());
    events.on_join(|| println!("app: joined"));
    events.on_receive(|payload| println!("app: downlink {:02x?}", payload));
    events.on_duty_cycle(|secs| println!("app: transmit every {} s", secs));
    events.on_confirm(|ok| println!("app: confirmed uplink {}", if ok { "acked" } else { "lost" }));
    events.on_activity(|report| println!("feed: {:?}", report.event));

    let link = Link::new(
        SimulatedStack::new(),
        MemoryStore::new(),
        StdClock::new(),
        events,
        JoinRetry::Immediate,
    );
    let link = SharedLink::new(link);

    let setup = link.lock(|link| {
        link.begin().map_err(|_| "radio did not start")?;
        link.apply_config_request(&ConfigRequest {
            region: Some(8),
            subband: Some(2),
            dev_eui: Some("70b3d57ed0000001"),
            app_key: Some("2b7e151628aed2a6abf7158809cf4f3c"),
            tx_duty_sec: Some(10),
            ..Default::default()
        })
        .map_err(|_| "configuration rejected")
    });
    match setup {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("{}", e);
            return;
        }
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    }

    let mut sensor = SensorData::default();
    for round in 0..12u16 {
        let _ = link.lock(|link| {
            link.tick();

            if let Some(event) = link.service_mut().pending_event() {
                link.on_service_event(event);
                link.on_service_event(ServiceEvent::Received {
                    port: CLASS_SWITCH_PORT,
                    payload: &[2],
                });
            }

            if link.is_joined() {
                sensor.temperature = 25;
                sensor.humidity = 60;
                sensor.pressure = 1013 + round;
                let confirmed = round % 4 == 0;
                if link.send(&sensor.to_bytes(), confirmed) && confirmed {
                    link.on_service_event(ServiceEvent::ConfirmResult(true));
                }
            }

            if round == 6 {
                let _ = link.set_requested_duty_cycle(30);
            }
        });
        thread::sleep(Duration::from_millis(200));
    }

    if let Ok(report) = link.lock(|link| link.config_report()) {
        println!("final config: {:?}", report);
    }
}
