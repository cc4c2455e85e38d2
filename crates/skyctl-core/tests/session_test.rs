#![allow(clippy::unwrap_used)]
// Session and dispatcher behaviour against the in-process simulator.

use std::time::Duration;

use pretty_assertions::assert_eq;
use skyctl_core::simulator::{CCD_DEVICE, MOUNT_DEVICE};
use skyctl_core::{
    Command, ConnectionState, CoreError, DeviceConnection, NewPropertyValue, PropertyId,
    PropertyKey, PropertyState, Session, SessionConfig, Simulator, SimulatorConfig, WriteType,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> SessionConfig {
    SessionConfig {
        timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

async fn setup(sim: SimulatorConfig) -> (Session, Simulator) {
    let session = Session::new(config());
    let simulator = Simulator::attach(&session, sim).await.unwrap();
    session
        .wait_for_device(CCD_DEVICE, Duration::from_secs(1))
        .await
        .unwrap();
    (session, simulator)
}

fn ccd(property: &str) -> PropertyId {
    PropertyId::new(CCD_DEVICE, property)
}

// ── Enumeration ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn connect_enumerates_devices() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    session
        .wait_for_device(MOUNT_DEVICE, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(session.list_devices(), vec![CCD_DEVICE, MOUNT_DEVICE]);
    assert!(session.is_connected());
    let ccd_device = session.store().device(CCD_DEVICE).unwrap();
    assert_eq!(ccd_device.connection, DeviceConnection::Disconnected);
    assert_eq!(ccd_device.short_name(), "CCD Imager Simulator");

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn property_rows_are_flattened() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    session
        .wait_for_property(&ccd("CCD_BIN"), Duration::from_secs(1))
        .await
        .unwrap();

    let rows: Vec<_> = session
        .property_list()
        .into_iter()
        .filter(|r| r.device == CCD_DEVICE && r.property == "CCD_BIN")
        .collect();
    insta::assert_json_snapshot!(rows, @r#"
    [
      {
        "device": "CCD Imager Simulator @ localhost",
        "property": "CCD_BIN",
        "type": "NUMBER",
        "element": "HORIZONTAL",
        "state": "Ok",
        "key": "/CCD Imager Simulator @ localhost/CCD_BIN/HORIZONTAL",
        "value": "1"
      },
      {
        "device": "CCD Imager Simulator @ localhost",
        "property": "CCD_BIN",
        "type": "NUMBER",
        "element": "VERTICAL",
        "state": "Ok",
        "key": "/CCD Imager Simulator @ localhost/CCD_BIN/VERTICAL",
        "value": "1"
      }
    ]
    "#);

    sim.shutdown().await;
}

// ── Device connection ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn connect_device_waits_for_ok() {
    let (session, sim) = setup(SimulatorConfig::default()).await;

    session.connect_device(CCD_DEVICE).await.unwrap();
    let device = session.store().device(CCD_DEVICE).unwrap();
    assert_eq!(device.connection, DeviceConnection::Connected);

    // Second call is a no-op.
    session.connect_device(CCD_DEVICE).await.unwrap();

    session.disconnect_device(CCD_DEVICE).await.unwrap();
    let device = session.store().device(CCD_DEVICE).unwrap();
    assert_eq!(device.connection, DeviceConnection::Disconnected);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_device_is_not_found() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    let result = session
        .wait_for_device("Focuser Simulator @ localhost", Duration::from_millis(500))
        .await;
    assert!(
        matches!(result, Err(CoreError::DeviceNotFound { .. })),
        "expected DeviceNotFound, got: {result:?}"
    );
    sim.shutdown().await;
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn write_to_disconnected_device_is_rejected() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    session
        .wait_for_property(&ccd("CCD_BIN"), Duration::from_secs(1))
        .await
        .unwrap();

    let result = session
        .execute(Command::number(ccd("CCD_BIN"), &[("HORIZONTAL", 2.0)]))
        .await;
    assert!(
        matches!(&result, Err(CoreError::Rejected { message, .. }) if message.contains("not connected")),
        "expected Rejected, got: {result:?}"
    );

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_command_times_out() {
    let (session, sim) = setup(SimulatorConfig {
        ignored: vec!["CCD_BIN".into()],
        ..SimulatorConfig::default()
    })
    .await;
    session.connect_device(CCD_DEVICE).await.unwrap();

    let result = session
        .execute(
            Command::number(ccd("CCD_BIN"), &[("HORIZONTAL", 2.0)])
                .with_timeout(Duration::from_secs(1)),
        )
        .await;
    match result {
        Err(CoreError::Timeout { key, timeout_ms }) => {
            assert_eq!(key, format!("/{CCD_DEVICE}/CCD_BIN"));
            assert_eq!(timeout_ms, 1000);
        }
        other => panic!("expected Timeout, got: {other:?}"),
    }
    // The optimistic BUSY mark is left as the last known state.
    assert_eq!(session.snapshot(&ccd("CCD_BIN")).unwrap().state, PropertyState::Busy);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn command_on_undefined_property_fails_fast() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    let result = session
        .execute(Command::switch_on(ccd("CCD_COOLER"), &["ON"]))
        .await;
    assert!(matches!(result, Err(CoreError::PropertyNotFound { .. })));
    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn grouped_writes_apply() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    session.connect_device(CCD_DEVICE).await.unwrap();

    let key = |el: &str| PropertyKey::new(CCD_DEVICE, "CCD_BIN", el);
    let sent = session
        .send_new_properties(&[
            NewPropertyValue::new(key("HORIZONTAL"), WriteType::Number, "2"),
            NewPropertyValue::new(key("VERTICAL"), WriteType::Number, "3"),
            NewPropertyValue::new(
                PropertyKey::new(CCD_DEVICE, "CCD_FRAME_TYPE", "DARK"),
                WriteType::Switch,
                "ON",
            ),
        ])
        .await
        .unwrap();
    assert_eq!(sent, 2);

    let vertical = key("VERTICAL");
    let value = session
        .wait_until("binning", Duration::from_secs(1), |store| {
            store
                .element_value(&vertical)
                .filter(|v| v == "3")
                .map(Ok)
        })
        .await
        .unwrap();
    assert_eq!(value, "3");
    assert_eq!(session.store().element_value(&key("HORIZONTAL")).as_deref(), Some("2"));

    let frame_type = session.snapshot(&ccd("CCD_FRAME_TYPE")).unwrap();
    assert_eq!(frame_type.switches_on().collect::<Vec<_>>(), vec!["DARK"]);

    sim.shutdown().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disconnect_clears_state() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    let mut state = session.connection_state();
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);

    session.disconnect().await;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    assert!(session.list_devices().is_empty());
    assert!(matches!(
        session.execute(Command::switch_on(ccd("CONNECTION"), &["CONNECTED"])).await,
        Err(CoreError::Disconnected)
    ));

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn simulator_shutdown_fails_the_session() {
    let (session, sim) = setup(SimulatorConfig::default()).await;
    let mut state = session.connection_state();
    sim.shutdown().await;

    tokio::time::timeout(Duration::from_secs(1), async {
        while *state.borrow_and_update() != ConnectionState::Failed {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    assert!(!session.is_connected());
}
