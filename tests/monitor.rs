//! End-to-end tests of the heart rate monitor over a scripted radio.

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use tokio::time::Duration;
use uuid::Uuid;

use ble_heartrate::device::constants::{HEART_RATE_MEASUREMENT_CHARACTERISTIC, HEART_RATE_SERVICE};
use ble_heartrate::device::fake::{FakeRadio, RadioCall};
use ble_heartrate::device::types::{
    CharacteristicInfo, CharacteristicProperties, DeviceHandle, DisconnectReason, RadioEvent, ScanEvent,
    ServiceInfo, SessionState,
};
use ble_heartrate::error::SessionError;
use ble_heartrate::monitor::HeartRateMonitor;

const CONFIG_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);

fn esp32(identifier: &str) -> DeviceHandle {
    DeviceHandle::new(identifier, Some("ESP32".to_string()))
}

fn heart_rate_service() -> Vec<ServiceInfo> {
    vec![ServiceInfo {
        uuid: HEART_RATE_SERVICE,
        characteristics: vec![
            CharacteristicInfo {
                uuid: HEART_RATE_MEASUREMENT_CHARACTERISTIC,
                properties: CharacteristicProperties { notify: true, ..Default::default() },
            },
            CharacteristicInfo {
                uuid: CONFIG_CHARACTERISTIC,
                properties: CharacteristicProperties { write: true, read: true, ..Default::default() },
            },
        ],
    }]
}

fn bpm(value: u8) -> RadioEvent {
    RadioEvent::CharacteristicChanged {
        uuid: HEART_RATE_MEASUREMENT_CHARACTERISTIC,
        value: vec![0x00, value],
    }
}

fn start() -> (HeartRateMonitor<FakeRadio>, FakeRadio, UnboundedSender<RadioEvent>) {
    let radio = FakeRadio::new();
    let (events, radio_events) = unbounded();
    let (monitor, _) = HeartRateMonitor::new(radio.clone(), radio_events, Duration::from_secs(10));
    (monitor, radio, events)
}

async fn scan_two_devices(monitor: &HeartRateMonitor<FakeRadio>, events: &UnboundedSender<RadioEvent>) {
    let mut scan = monitor.start_scan();
    events.unbounded_send(RadioEvent::DeviceDiscovered(esp32("AA"))).unwrap();
    events.unbounded_send(RadioEvent::DeviceDiscovered(esp32("AA"))).unwrap();
    events.unbounded_send(RadioEvent::DeviceDiscovered(esp32("BB"))).unwrap();

    assert_eq!(scan.next().await, Some(ScanEvent::Found(esp32("AA"))));
    assert_eq!(scan.next().await, Some(ScanEvent::Found(esp32("BB"))));
    monitor.stop_scan();
    assert_eq!(scan.next().await, Some(ScanEvent::Complete));
    assert_eq!(scan.next().await, None);
}

#[tokio::test]
async fn scan_connect_stream_and_configure() {
    let (monitor, radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    let readings = monitor.readings();
    monitor.connect(1).await.unwrap();
    assert_eq!(monitor.state().await, Ok(SessionState::Connecting));

    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::ServicesFound(heart_rate_service())).unwrap();
    events.unbounded_send(RadioEvent::NotifyEnabled).unwrap();
    for value in [72, 75, 74] {
        events.unbounded_send(bpm(value)).unwrap();
    }

    let bpms: Vec<u16> = readings.take(3).map(|reading| reading.bpm).collect().await;
    assert_eq!(bpms, vec![72, 75, 74]);

    monitor.send_config("abc").await.unwrap();
    assert_eq!(radio.writes(), vec![b"abc".to_vec()]);
    assert_eq!(monitor.state().await, Ok(SessionState::Streaming));

    assert_eq!(radio.calls()[..3], [
        RadioCall::ScanStart,
        RadioCall::ScanStop,
        RadioCall::Connect("BB".to_string()),
    ]);
}

#[tokio::test]
async fn send_config_while_idle() {
    let (monitor, radio, _events) = start();

    assert_eq!(monitor.send_config("abc").await, Err(SessionError::NotConnected));
    assert!(radio.writes().is_empty());
}

#[tokio::test]
async fn connect_to_unknown_index() {
    let (monitor, radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    assert_eq!(monitor.connect(2).await, Err(SessionError::NoSuchDevice(2)));
    assert_eq!(radio.count(&RadioCall::Connect("AA".to_string())), 0);
}

#[tokio::test]
async fn second_connect_is_rejected_while_streaming() {
    let (monitor, _radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    let mut states = monitor.states();
    monitor.connect(0).await.unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::ServicesFound(heart_rate_service())).unwrap();
    events.unbounded_send(RadioEvent::NotifyEnabled).unwrap();

    while states.next().await != Some(SessionState::Streaming) {}

    assert_eq!(monitor.connect(1).await, Err(SessionError::InvalidState(SessionState::Streaming)));
}

#[tokio::test]
async fn reconnect_after_link_loss() {
    let (monitor, radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    let mut states = monitor.states();
    monitor.connect(0).await.unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::Disconnected).unwrap();

    let expected = [
        SessionState::Connecting,
        SessionState::Discovering,
        SessionState::Disconnecting,
        SessionState::Disconnected(DisconnectReason::LinkLost),
    ];
    for state in expected {
        assert_eq!(states.next().await, Some(state));
    }

    monitor.connect(0).await.unwrap();
    events.unbounded_send(RadioEvent::Disconnected).unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();

    assert_eq!(states.next().await, Some(SessionState::Connecting));
    assert_eq!(states.next().await, Some(SessionState::Discovering));
    assert_eq!(radio.count(&RadioCall::Connect("AA".to_string())), 2);
    assert_eq!(radio.count(&RadioCall::Disconnect), 1);
}

#[tokio::test]
async fn late_release_of_a_failed_session_does_not_reach_the_next_one() {
    let (monitor, radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    let mut states = monitor.states();
    monitor.connect(0).await.unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::ServicesFound(vec![])).unwrap();

    while states.next().await != Some(SessionState::Disconnected(DisconnectReason::ServiceNotFound)) {}
    assert_eq!(radio.count(&RadioCall::Disconnect), 1);

    monitor.connect(0).await.unwrap();
    events.unbounded_send(RadioEvent::Disconnected).unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::ServicesFound(heart_rate_service())).unwrap();
    events.unbounded_send(RadioEvent::NotifyEnabled).unwrap();

    let expected = [
        SessionState::Connecting,
        SessionState::Discovering,
        SessionState::Subscribing,
        SessionState::Streaming,
    ];
    for state in expected {
        assert_eq!(states.next().await, Some(state));
    }
    assert_eq!(monitor.state().await, Ok(SessionState::Streaming));
}

#[tokio::test]
async fn user_disconnect() {
    let (monitor, radio, events) = start();
    scan_two_devices(&monitor, &events).await;

    let mut states = monitor.states();
    monitor.connect(0).await.unwrap();
    monitor.disconnect().await.unwrap();
    monitor.disconnect().await.unwrap();
    events.unbounded_send(RadioEvent::Connected).unwrap();
    events.unbounded_send(RadioEvent::Disconnected).unwrap();

    assert_eq!(states.next().await, Some(SessionState::Connecting));
    assert_eq!(states.next().await, Some(SessionState::Disconnecting));
    assert_eq!(states.next().await, Some(SessionState::Disconnected(DisconnectReason::UserRequested)));
    assert_eq!(radio.count(&RadioCall::Disconnect), 1);
    assert_eq!(radio.count(&RadioCall::DiscoverServices), 0);
}

#[tokio::test]
async fn shutdown_stops_the_driver() {
    let radio = FakeRadio::new();
    let (_events, radio_events) = unbounded();
    let (monitor, driver) = HeartRateMonitor::new(radio.clone(), radio_events, Duration::from_secs(10));

    monitor.shutdown();
    driver.await.unwrap();
    assert_eq!(monitor.state().await, Err(SessionError::MonitorStopped));
}
