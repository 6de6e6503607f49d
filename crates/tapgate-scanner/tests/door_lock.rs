//! Door endpoint: lock triggers and door contact reports.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{Installation, config};
use tapgate_hardware::Tone;
use tapgate_hardware::mock::{MockDoorSensor, MockLock, RecordingBuzzer};
use tapgate_network::LocalTransport;
use tapgate_protocol::{DoorState, DoorStatus, LockOpen};
use tapgate_scanner::{AuthorityScript, DoorLock};

type Door = DoorLock<MockLock, MockDoorSensor, RecordingBuzzer, LocalTransport>;

struct Rig {
    installation: Installation,
    door: Door,
    lock: MockLock,
    sensor: MockDoorSensor,
    buzzer: RecordingBuzzer,
}

async fn rig() -> Rig {
    let installation = Installation::start(config(), AuthorityScript::new()).await;
    let lock = MockLock::new();
    let sensor = MockDoorSensor::new();
    let buzzer = RecordingBuzzer::new();
    let (client, _pump) = installation.endpoint_client("door").await;
    let door = DoorLock::attach(
        &installation.config,
        lock.clone(),
        sensor.clone(),
        buzzer.clone(),
        client,
    )
    .await
    .unwrap()
    .with_sensor_interval(Duration::from_millis(50));
    Rig {
        installation,
        door,
        lock,
        sensor,
        buzzer,
    }
}

/// Run the door endpoint while `script` drives the outside world.
async fn run_with<F: std::future::Future<Output = ()>>(rig: &mut Rig, script: F) {
    let cancel = rig.installation.cancel.clone();
    let driver = async {
        script.await;
        cancel.cancel();
    };
    tokio::join!(rig.door.run(rig.installation.cancel.clone()), driver);
}

#[tokio::test(start_paused = true)]
async fn trigger_for_this_door_releases_then_engages() {
    let mut rig = rig().await;
    let broker = rig.installation.broker.clone();
    let topic = rig.installation.config.topics().lock_open();

    run_with(&mut rig, async move {
        let payload = LockOpen::new(common::SCANNER_IP).to_payload().unwrap();
        broker.inject(&topic, payload);
        tokio::time::sleep(Duration::from_secs(6)).await;
    })
    .await;

    // Released, engaged after the tone, engaged again on shutdown.
    assert_eq!(rig.lock.transitions(), vec![true, false, false]);
    assert_eq!(rig.buzzer.played(), vec![Tone::DoorOpen]);
}

#[tokio::test(start_paused = true)]
async fn bare_address_trigger_is_accepted() {
    let mut rig = rig().await;
    let broker = rig.installation.broker.clone();
    let topic = rig.installation.config.topics().lock_open();

    run_with(&mut rig, async move {
        broker.inject(&topic, Bytes::from(common::SCANNER_IP));
        tokio::time::sleep(Duration::from_secs(6)).await;
    })
    .await;

    assert_eq!(rig.lock.transitions().first(), Some(&true));
}

#[tokio::test(start_paused = true)]
async fn trigger_for_other_door_is_ignored() {
    let mut rig = rig().await;
    let broker = rig.installation.broker.clone();
    let topic = rig.installation.config.topics().lock_open();

    run_with(&mut rig, async move {
        broker.inject(&topic, LockOpen::new("10.0.0.99").to_payload().unwrap());
        broker.inject(&topic, Bytes::from_static(b""));
        tokio::time::sleep(Duration::from_secs(1)).await;
    })
    .await;

    assert_eq!(rig.lock.transitions(), vec![false]);
    assert!(rig.buzzer.played().is_empty());
}

#[tokio::test(start_paused = true)]
async fn jammed_lock_skips_the_open_cycle() {
    let mut rig = rig().await;
    rig.lock.set_jammed(true);
    let broker = rig.installation.broker.clone();
    let topic = rig.installation.config.topics().lock_open();

    run_with(&mut rig, async move {
        broker.inject(&topic, LockOpen::new(common::SCANNER_IP).to_payload().unwrap());
        tokio::time::sleep(Duration::from_secs(1)).await;
    })
    .await;

    assert!(rig.lock.transitions().is_empty());
    assert!(rig.buzzer.played().is_empty());
}

#[tokio::test(start_paused = true)]
async fn contact_changes_are_reported() {
    let mut rig = rig().await;
    let sensor = rig.sensor.clone();

    run_with(&mut rig, async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        sensor.set_open(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        sensor.set_open(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
    })
    .await;

    let reports: Vec<DoorStatus> = rig
        .installation
        .published_on(&rig.installation.config.topics().lock_status())
        .iter()
        .map(|message| DoorStatus::parse(&message.payload).unwrap())
        .collect();
    assert_eq!(
        reports,
        vec![
            DoorStatus::new(common::SCANNER_IP, DoorState::Open),
            DoorStatus::new(common::SCANNER_IP, DoorState::Closed),
        ]
    );
}
