#![allow(clippy::unwrap_used)]
// CCD acquisition runs against the in-process simulator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use skyctl_core::ccd::lookup;
use skyctl_core::simulator::CCD_DEVICE;
use skyctl_core::{
    AcquisitionPhase, Binning, CcdController, CcdSettings, CoreError, ExposureRequest,
    FileImageSink, FrameType, ImageFrame, ImageSink, MemoryImageSink, Session, SessionConfig,
    Simulator, SimulatorConfig, UploadMode,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(sink: Arc<dyn ImageSink>) -> (CcdController, Simulator) {
    let session = Session::new(SessionConfig {
        timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    });
    let simulator = Simulator::attach(&session, SimulatorConfig::default())
        .await
        .unwrap();
    session.connect_device(CCD_DEVICE).await.unwrap();
    let ccd = CcdController::new(session, CCD_DEVICE, CcdSettings::default(), sink);
    (ccd, simulator)
}

/// Accepts a fixed number of frames, then fails.
struct FailingSink {
    accept: usize,
    stored: AtomicUsize,
}

impl ImageSink for FailingSink {
    fn store(&self, _frame: ImageFrame) -> Result<String, CoreError> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst);
        if n < self.accept {
            Ok(format!("frame-{}", n + 1))
        } else {
            Err(CoreError::Io(std::io::Error::other("disk full")))
        }
    }
}

// ── Client uploads ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn client_frames_carry_headers() {
    let sink = Arc::new(MemoryImageSink::new());
    let (ccd, sim) = setup(sink.clone()).await;

    let request = ExposureRequest {
        exposure_time: 1.0,
        binning: Binning { x: 2, y: 2 },
        count: 3,
        object: Some("M42".into()),
        ..ExposureRequest::default()
    };
    let report = ccd.acquire(&request).await.unwrap();

    assert_eq!(report.client_frames, vec!["memory:1", "memory:2", "memory:3"]);
    assert!(report.server_frames.is_empty());
    assert_eq!(ccd.progress().phase, AcquisitionPhase::Complete);

    let frames = sink.frames();
    assert_eq!(frames.len(), 3);
    let first = &frames[0];
    assert_eq!(first.name, "LIGHT_B2x2_E1.000_001");
    assert_eq!(first.format.as_deref(), Some(".fits"));
    assert!(String::from_utf8_lossy(&first.data).starts_with("SIMPLE"));
    assert_eq!(lookup(&first.header, "INSTRUME"), Some("'CCD Imager Simulator'"));
    assert_eq!(lookup(&first.header, "NAXIS1"), Some("800"));
    assert_eq!(lookup(&first.header, "NAXIS2"), Some("600"));
    assert_eq!(lookup(&first.header, "EXPTIME"), Some("1.00"));
    assert_eq!(lookup(&first.header, "XBINNING"), Some("2"));
    assert_eq!(lookup(&first.header, "YBINNING"), Some("2"));
    assert_eq!(lookup(&first.header, "IMAGETYP"), Some("'Light   '"));
    assert_eq!(lookup(&first.header, "OBJECT"), Some("'M42     '"));
    assert!(lookup(&first.header, "DATE-OBS").is_some());
    assert_eq!(frames[2].name, "LIGHT_B2x2_E1.000_003");

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn every_frame_type_is_labelled() {
    let sink = Arc::new(MemoryImageSink::new());
    let (ccd, sim) = setup(sink.clone()).await;

    for (frame_type, label) in [
        (FrameType::Bias, "'Bias    '"),
        (FrameType::Dark, "'Dark    '"),
        (FrameType::Flat, "'Flat    '"),
    ] {
        ccd.acquire(&ExposureRequest {
            exposure_time: 0.5,
            frame_type,
            ..ExposureRequest::default()
        })
        .await
        .unwrap();
        let frames = sink.frames();
        let last = frames.last().unwrap();
        assert_eq!(lookup(&last.header, "IMAGETYP"), Some(label));
        assert_eq!(lookup(&last.header, "EXPTIME"), Some("0.50"));
    }

    sim.shutdown().await;
}

// ── Server uploads ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn server_frames_follow_the_template() {
    let dir = tempfile::tempdir().unwrap();
    let (ccd, sim) = setup(Arc::new(MemoryImageSink::new())).await;

    let request = ExposureRequest {
        exposure_time: 2.0,
        frame_type: FrameType::Bias,
        count: 2,
        upload_mode: UploadMode::Server,
        server_upload_dir: dir.path().display().to_string(),
        filename_template: Some("MyObject_%f_B%b_E%e_%n".into()),
        ..ExposureRequest::default()
    };
    let report = ccd.acquire(&request).await.unwrap();

    assert_eq!(
        report.server_frames,
        vec!["MyObject_BIAS_B1x1_E2.000_001", "MyObject_BIAS_B1x1_E2.000_002"]
    );
    assert!(report.client_frames.is_empty());
    for name in &report.server_frames {
        assert!(dir.path().join(format!("{name}.fits")).exists(), "{name} missing");
    }

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn default_template_names_server_files() {
    let dir = tempfile::tempdir().unwrap();
    let (ccd, sim) = setup(Arc::new(MemoryImageSink::new())).await;

    let report = ccd
        .acquire(&ExposureRequest {
            upload_mode: UploadMode::Server,
            server_upload_dir: dir.path().display().to_string(),
            ..ExposureRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(report.server_frames, vec!["LIGHT_B1x1_E1.000_001"]);
    assert!(dir.path().join("LIGHT_B1x1_E1.000_001.fits").exists());

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn both_destinations_record_each_frame() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileImageSink::new(client_dir.path()));
    let (ccd, sim) = setup(sink).await;

    let report = ccd
        .acquire(&ExposureRequest {
            count: 2,
            delay: 0.5,
            upload_mode: UploadMode::ServerAndClient,
            server_upload_dir: server_dir.path().display().to_string(),
            ..ExposureRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(report.client_frames.len(), 2);
    assert_eq!(report.server_frames.len(), 2);
    assert!(client_dir.path().join("LIGHT_B1x1_E1.000_002.fits").exists());
    assert!(client_dir.path().join("LIGHT_B1x1_E1.000_002.json").exists());
    assert!(server_dir.path().join("LIGHT_B1x1_E1.000_002.fits").exists());

    sim.shutdown().await;
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failure_keeps_recorded_frames() {
    let sink = Arc::new(FailingSink {
        accept: 1,
        stored: AtomicUsize::new(0),
    });
    let (ccd, sim) = setup(sink).await;

    let result = ccd
        .acquire(&ExposureRequest {
            count: 3,
            ..ExposureRequest::default()
        })
        .await;
    assert!(matches!(result, Err(CoreError::Io(_))), "got: {result:?}");
    assert_eq!(ccd.report().await.client_frames, vec!["frame-1"]);
    assert_eq!(ccd.progress().phase, AcquisitionPhase::Idle);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_are_rejected_before_any_write() {
    let (ccd, sim) = setup(Arc::new(MemoryImageSink::new())).await;
    let mut progress = ccd.subscribe_progress();

    for request in [
        ExposureRequest {
            count: 0,
            ..ExposureRequest::default()
        },
        ExposureRequest {
            filename_template: Some("%q".into()),
            ..ExposureRequest::default()
        },
        ExposureRequest {
            exposure_time: 1e20,
            ..ExposureRequest::default()
        },
        ExposureRequest {
            delay: 1e20,
            ..ExposureRequest::default()
        },
    ] {
        assert!(matches!(
            ccd.acquire(&request).await,
            Err(CoreError::ValidationFailed { .. })
        ));
    }
    assert!(!progress.has_changed().unwrap());

    sim.shutdown().await;
}
