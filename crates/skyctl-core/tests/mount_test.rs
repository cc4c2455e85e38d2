#![allow(clippy::unwrap_used)]
// Mount commands and the pointing-model workflow against the simulator.

use std::time::Duration;

use skyctl_core::astro;
use skyctl_core::mount::Direction;
use skyctl_core::pointing::read_model;
use skyctl_core::simulator::MOUNT_DEVICE;
use skyctl_core::{
    AlignmentMethod, CoreError, ModelConfig, MountCommand, MountController, MountOutcome,
    MountSettings, PierSide, PointingModel, PropertyId, Session, SessionConfig, Simulator, SimulatorConfig,
    SyncGrid,
};

const LATITUDE: f64 = 49.261_872_611;

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(sim: SimulatorConfig, settings: MountSettings) -> (MountController, Simulator) {
    let session = Session::new(SessionConfig {
        timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    });
    let simulator = Simulator::attach(&session, sim).await.unwrap();
    session.connect_device(MOUNT_DEVICE).await.unwrap();
    (MountController::new(session, MOUNT_DEVICE, settings), simulator)
}

fn settings() -> MountSettings {
    MountSettings {
        latitude: LATITUDE,
        ..MountSettings::default()
    }
}

fn assert_parked_position(mount: &MountController) {
    let status = mount.status().unwrap();
    assert!(status.parked);
    assert!(status.dec.abs() < 0.1, "dec {}", status.dec);
    assert!(
        (astro::hour_angle(status.lst, status.ra).abs() - 12.0).abs() < 0.1,
        "lst {} ra {}",
        status.lst,
        status.ra
    );
}

fn injected_model() -> PointingModel {
    let mut model = PointingModel::new(ModelConfig::new(0b11_1111).unwrap(), LATITUDE);
    model.west = vec![2.0, -1.5, 0.8, 0.5, 1.2, -0.7];
    model.east = vec![-1.0, 2.5, 0.3, -0.6, 0.9, 1.1];
    model
}

// ── Park ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn park_is_idempotent() {
    let (mount, sim) = setup(SimulatorConfig::default(), settings()).await;
    assert_parked_position(&mount);

    mount.goto(3.0, 40.0, None).await.unwrap();
    assert!(!mount.is_parked());

    mount.park().await.unwrap();
    assert_parked_position(&mount);
    mount.park().await.unwrap();
    assert_parked_position(&mount);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn park_default_stores_current_position() {
    let (mount, sim) = setup(SimulatorConfig::default(), settings()).await;

    mount.goto(22.0, 20.0, None).await.unwrap();
    mount.park_default().await.unwrap();
    mount.goto(4.0, -5.0, None).await.unwrap();
    mount.park().await.unwrap();

    let status = mount.status().unwrap();
    assert!((status.ra - 22.0).abs() < 1e-6);
    assert!((status.dec - 20.0).abs() < 1e-6);

    sim.shutdown().await;
}

// ── Motion & GOTO ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn goto_unparks_and_reports_pier_side() {
    let (mount, sim) = setup(
        SimulatorConfig {
            lst: 6.0,
            ..SimulatorConfig::default()
        },
        settings(),
    )
    .await;

    let status = mount.goto(4.0, 10.0, None).await.unwrap();
    assert!(!status.parked);
    assert!((status.ra - 4.0).abs() < 1e-9);
    assert!((status.dec - 10.0).abs() < 1e-9);
    assert!((status.hour_angle() - 2.0).abs() < 1e-9);
    assert_eq!(status.pier_side, PierSide::East);

    let status = mount.goto(9.0, 10.0, None).await.unwrap();
    assert_eq!(status.pier_side, PierSide::West);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn goto_rejects_out_of_range_targets() {
    let (mount, sim) = setup(SimulatorConfig::default(), settings()).await;
    assert!(matches!(
        mount.goto(24.5, 0.0, None).await,
        Err(CoreError::ValidationFailed { .. })
    ));
    assert!(matches!(
        mount.goto(1.0, -91.0, None).await,
        Err(CoreError::ValidationFailed { .. })
    ));
    // Nothing was written: still parked.
    assert!(mount.is_parked());
    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_motion_moves_the_mount() {
    let (mount, sim) = setup(SimulatorConfig::default(), settings()).await;
    mount.goto(2.0, 10.0, None).await.unwrap();

    mount.start_motion(Direction::North).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    mount.stop_motion(Direction::North).await.unwrap();

    let status = mount.status().unwrap();
    assert!(status.dec > 10.5, "dec {}", status.dec);
    assert!((status.ra - 2.0).abs() < 1e-9);

    // Commands by numeric code.
    let code = MountCommand::MoveEastStart.code();
    mount
        .execute(MountCommand::from_repr(code).unwrap(), None, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let outcome = mount
        .execute(MountCommand::MoveEastStop, None, None)
        .await
        .unwrap();
    let MountOutcome::Status(after) = outcome else {
        panic!("expected status, got {outcome:?}");
    };
    assert!(after.ra > 2.0);

    sim.shutdown().await;
}

// ── SYNC ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn sync_moves_reported_position() {
    let (mount, sim) = setup(SimulatorConfig::default(), settings()).await;
    mount.goto(3.0, 40.0, None).await.unwrap();

    let point = mount.sync(3.1, 40.2).await.unwrap();
    assert!((point.telescope_ra - 3.0).abs() < 1e-9);
    assert!((point.celestial_ra - 3.1).abs() < 1e-9);
    assert_eq!(mount.last_sync().await, Some(point));

    let status = mount.status().unwrap();
    assert!((status.ra - 3.1).abs() < 1e-9);
    assert!((status.dec - 40.2).abs() < 1e-9);
    // SYNC does not add to the model's sync points.
    assert!(mount.sync_points().await.is_empty());

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_sync_reports_the_sync_error_and_restores_tracking() {
    let session = Session::new(SessionConfig {
        timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    });
    let sim = Simulator::attach(
        &session,
        SimulatorConfig {
            ignored: vec!["MOUNT_EQUATORIAL_COORDINATES".into()],
            ..SimulatorConfig::default()
        },
    )
    .await
    .unwrap();
    session.connect_device(MOUNT_DEVICE).await.unwrap();
    let mount = MountController::new(session.clone(), MOUNT_DEVICE, settings());

    match mount.sync(3.1, 40.2).await {
        Err(CoreError::Timeout { key, .. }) => {
            assert!(key.contains("MOUNT_EQUATORIAL_COORDINATES"), "{key}");
        }
        other => panic!("expected a sync timeout, got {other:?}"),
    }
    assert_eq!(mount.last_sync().await, None);

    let mode = session
        .snapshot(&PropertyId::new(MOUNT_DEVICE, "MOUNT_ON_COORDINATES_SET"))
        .unwrap();
    assert_eq!(mode.switch("TRACK"), Some(true));
    assert_eq!(mode.switch("SYNC"), Some(false));

    sim.shutdown().await;
}

// ── Pointing model ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn grid_fit_recovers_injected_model() {
    let dir = tempfile::tempdir().unwrap();
    let model_file = dir.path().join("mount.xtpm");
    let injected = injected_model();
    let sim_config = SimulatorConfig {
        latitude: LATITUDE,
        pointing_error: Some(injected.clone()),
        ..SimulatorConfig::default()
    };
    let (mount, sim) = setup(
        sim_config,
        MountSettings {
            latitude: LATITUDE,
            model_file: Some(model_file.clone()),
            model_config: injected.config,
            ..MountSettings::default()
        },
    )
    .await;

    let mut reported = 0;
    let total = mount
        .run_sync_grid(&SyncGrid::default(), |done, _| reported = done)
        .await
        .unwrap();
    assert_eq!(total, 180);
    assert_eq!(reported, 180);

    let log = mount.sync_points().await;
    assert_eq!(log.len(), 180);
    assert!(log.side(PierSide::West).count() > 0);
    assert!(log.side(PierSide::East).count() > 0);

    let fitted = mount.fit_pointing_model().await.unwrap();
    for (got, want) in fitted.west.iter().zip(&injected.west) {
        assert!((got - want).abs() < 1e-2, "west {got} vs {want}");
    }
    for (got, want) in fitted.east.iter().zip(&injected.east) {
        assert!((got - want).abs() < 1e-2, "east {got} vs {want}");
    }

    let stored = read_model(&model_file).unwrap();
    assert_eq!(stored.config, injected.config);
    assert!((stored.latitude - LATITUDE).abs() < 1e-4);
    let stored_coefficients = stored.west.iter().chain(&stored.east);
    let injected_coefficients = injected.west.iter().chain(&injected.east);
    for (got, want) in stored_coefficients.zip(injected_coefficients) {
        assert!((got - want).abs() < 1e-2);
    }

    // Sync points survive a save/load cycle.
    let log_file = dir.path().join("sync.json");
    mount.save_sync_points(&log_file).await.unwrap();
    mount.clear_sync_points().await;
    assert_eq!(mount.load_sync_points(&log_file).await.unwrap(), 180);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn analytical_model_corrects_goto() {
    let dir = tempfile::tempdir().unwrap();
    let model_file = dir.path().join("mount.xtpm");
    let injected = injected_model();
    skyctl_core::pointing::write_model(&model_file, &injected).unwrap();

    let (mount, sim) = setup(
        SimulatorConfig {
            latitude: LATITUDE,
            pointing_error: Some(injected),
            ..SimulatorConfig::default()
        },
        MountSettings {
            latitude: LATITUDE,
            model_file: Some(model_file),
            alignment: AlignmentMethod::AnalyticalModel,
            ..MountSettings::default()
        },
    )
    .await;

    let status = mount.goto(5.0, 30.0, None).await.unwrap();
    assert!((status.ra - 5.0).abs() < 1e-3, "ra {}", status.ra);
    assert!((status.dec - 30.0).abs() < 1e-2, "dec {}", status.dec);

    // Without correction the injected error is visible.
    let point = mount.test_sync(5.0, 30.0, Some(PierSide::West)).await.unwrap();
    assert!((point.telescope_dec - 30.0).abs() > 1e-2);
    assert_eq!(point.pier_side, PierSide::West);

    sim.shutdown().await;
}
