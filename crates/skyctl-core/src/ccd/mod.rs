// ── CCD acquisition ──
//
// Sequences exposure runs: configure the camera, expose, and route each
// frame to this client (through an `ImageSink`) and/or to the server's
// disk, one frame at a time.

mod header;
mod request;
mod sink;
mod template;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skyctl_api::PropertyState;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::CoreError;
use crate::model::PropertyId;
use crate::session::Session;

pub use header::{HeaderField, build_header, lookup};
pub use request::{Binning, ExposureRequest, FrameType, UploadMode};
pub use sink::{FileImageSink, ImageFrame, ImageSink, MemoryImageSink};
pub use template::{DEFAULT_TEMPLATE, FilenameTemplate, FrameContext};

// ── Property names ──────────────────────────────────────────────────

const CCD_INFO: &str = "CCD_INFO";
const CCD_BIN: &str = "CCD_BIN";
const CCD_FRAME_TYPE: &str = "CCD_FRAME_TYPE";
const CCD_UPLOAD_MODE: &str = "CCD_UPLOAD_MODE";
const CCD_LOCAL_MODE: &str = "CCD_LOCAL_MODE";
const CCD_EXPOSURE: &str = "CCD_EXPOSURE";
const CCD_IMAGE: &str = "CCD_IMAGE";

// ── Settings, phases, reports ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcdSettings {
    /// Added to the exposure time when waiting for an exposure to finish.
    pub timeout: Duration,
}

impl Default for CcdSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AcquisitionPhase {
    #[default]
    Idle,
    Configuring,
    Exposing,
    Downloading,
    Complete,
}

/// Observable progress of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionProgress {
    pub phase: AcquisitionPhase,
    /// 1-based frame being worked on; 0 before the first frame.
    pub frame: u32,
    pub count: u32,
}

/// Frames produced by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionReport {
    /// Ids returned by the image sink.
    pub client_frames: Vec<String>,
    /// Base names of the files the server wrote.
    pub server_frames: Vec<String>,
}

// ── CcdController ───────────────────────────────────────────────────

pub struct CcdController {
    session: Session,
    device: String,
    settings: CcdSettings,
    sink: Arc<dyn ImageSink>,
    progress: watch::Sender<AcquisitionProgress>,
    report: Mutex<AcquisitionReport>,
}

impl CcdController {
    pub fn new(
        session: Session,
        device: impl Into<String>,
        settings: CcdSettings,
        sink: Arc<dyn ImageSink>,
    ) -> Self {
        let (progress, _) = watch::channel(AcquisitionProgress::default());
        Self {
            session,
            device: device.into(),
            settings,
            sink,
            progress,
            report: Mutex::new(AcquisitionReport::default()),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<AcquisitionProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> AcquisitionProgress {
        *self.progress.borrow()
    }

    /// Frames recorded by the current or last run, including a failed one.
    pub async fn report(&self) -> AcquisitionReport {
        self.report.lock().await.clone()
    }

    fn id(&self, property: &str) -> PropertyId {
        PropertyId::new(&self.device, property)
    }

    fn set_phase(&self, phase: AcquisitionPhase, frame: u32, count: u32) {
        debug!(device = %self.device, %phase, frame, count, "acquisition phase");
        self.progress.send_replace(AcquisitionProgress { phase, frame, count });
    }

    /// Run every exposure of `request`.
    ///
    /// Nothing is written before the request and its template validate. A
    /// failing frame aborts the run; frames recorded before it stay in
    /// [`report`](Self::report).
    pub async fn acquire(&self, request: &ExposureRequest) -> Result<AcquisitionReport, CoreError> {
        request.validate()?;
        let template = match &request.filename_template {
            Some(t) => FilenameTemplate::new(t.clone())?,
            None => FilenameTemplate::default(),
        };
        *self.report.lock().await = AcquisitionReport::default();

        if request.upload_mode.to_client() {
            self.session.enable_blob(&self.device).await?;
        }

        info!(
            device = %self.device,
            count = request.count,
            exposure = request.exposure_time,
            frame_type = %request.frame_type,
            upload = %request.upload_mode,
            "starting acquisition"
        );

        for index in 1..=request.count {
            let name = template.render(&FrameContext {
                frame_type: request.frame_type,
                binning: request.binning,
                exposure_time: request.exposure_time,
                index,
            })?;
            if let Err(e) = self.acquire_frame(request, index, &name).await {
                warn!(device = %self.device, frame = index, error = %e, "acquisition aborted");
                self.set_phase(AcquisitionPhase::Idle, index, request.count);
                return Err(e);
            }
        }

        self.set_phase(AcquisitionPhase::Complete, request.count, request.count);
        let report = self.report().await;
        info!(
            device = %self.device,
            client = report.client_frames.len(),
            server = report.server_frames.len(),
            "acquisition complete"
        );
        Ok(report)
    }

    async fn acquire_frame(&self, request: &ExposureRequest, index: u32, name: &str) -> Result<(), CoreError> {
        let count = request.count;

        self.set_phase(AcquisitionPhase::Configuring, index, count);
        self.configure(request, name).await?;

        if request.delay > 0.0 {
            tokio::time::sleep(seconds("exposure delay", request.delay)?).await;
        }

        self.set_phase(AcquisitionPhase::Exposing, index, count);
        let image_revision = self.session.snapshot(&self.id(CCD_IMAGE)).map_or(0, |p| p.revision);
        let started = chrono::Utc::now();
        let timeout =
            seconds("exposure time", request.exposure_time)?.saturating_add(self.settings.timeout);
        self.session
            .execute(
                Command::number(self.id(CCD_EXPOSURE), &[("EXPOSURE", request.exposure_time)])
                    .after_busy()
                    .with_timeout(timeout),
            )
            .await?;

        self.set_phase(AcquisitionPhase::Downloading, index, count);
        if request.upload_mode.to_client() {
            let id = self
                .download(request, index, name, image_revision, started)
                .await?;
            self.report.lock().await.client_frames.push(id);
        }
        if request.upload_mode.to_server() {
            debug!(dir = %request.server_upload_dir, name, "frame saved by server");
            self.report.lock().await.server_frames.push(name.to_owned());
        }
        Ok(())
    }

    async fn configure(&self, request: &ExposureRequest, name: &str) -> Result<(), CoreError> {
        self.session
            .execute(Command::number(
                self.id(CCD_BIN),
                &[
                    ("HORIZONTAL", f64::from(request.binning.x)),
                    ("VERTICAL", f64::from(request.binning.y)),
                ],
            ))
            .await?;
        self.session
            .execute(Command::switch_on(
                self.id(CCD_FRAME_TYPE),
                &[&request.frame_type.to_string()],
            ))
            .await?;
        self.session
            .execute(Command::switch_on(
                self.id(CCD_UPLOAD_MODE),
                &[request.upload_mode.element()],
            ))
            .await?;
        if request.upload_mode.to_server() {
            self.session
                .execute(Command::text(
                    self.id(CCD_LOCAL_MODE),
                    &[("DIR", request.server_upload_dir.as_str()), ("PREFIX", name)],
                ))
                .await?;
        }
        Ok(())
    }

    /// Wait for a new image newer than `after_revision`, fetch it and hand
    /// it to the sink.
    async fn download(
        &self,
        request: &ExposureRequest,
        index: u32,
        name: &str,
        after_revision: u64,
        started: chrono::DateTime<chrono::Utc>,
    ) -> Result<String, CoreError> {
        let image_id = self.id(CCD_IMAGE);
        let what = image_id.to_string();
        let (value, format) = self
            .session
            .wait_until(&what, self.settings.timeout, |store| {
                let prop = store.property(&image_id)?;
                if prop.revision <= after_revision {
                    return None;
                }
                match prop.state {
                    PropertyState::Alert => Some(Err(CoreError::Rejected {
                        key: what.clone(),
                        message: prop.message.clone().unwrap_or_else(|| "image transfer failed".into()),
                    })),
                    PropertyState::Ok => {
                        let (value, format) = prop.blob("IMAGE")?;
                        Some(Ok((value.to_owned(), format.map(str::to_owned))))
                    }
                    PropertyState::Idle | PropertyState::Busy => None,
                }
            })
            .await?;

        let data = self.session.fetch_blob(&value).await?;
        let info = self.session.snapshot(&self.id(CCD_INFO));
        let header = build_header(&self.device, info.as_deref(), request, Some(started));
        debug!(frame = index, bytes = data.len(), "image received");
        self.sink.store(ImageFrame {
            index,
            name: name.to_owned(),
            format,
            header,
            data,
        })
    }
}

fn seconds(what: &str, value: f64) -> Result<Duration, CoreError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CoreError::validation(format!("{what} of {value} s is out of range")))
}
