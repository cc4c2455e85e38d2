// ── Image sinks ──
//
// Where client-side frames end up. The controller hands over the raw
// payload exactly as the server delivered it, plus the header keywords.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::header::HeaderField;
use crate::error::CoreError;

/// A frame received by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFrame {
    /// 1-based index within the run.
    pub index: u32,
    /// Rendered filename template, without extension.
    pub name: String,
    /// Payload format announced by the server, e.g. `.fits`.
    pub format: Option<String>,
    pub header: Vec<HeaderField>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Receives client-side frames and returns an id for each.
pub trait ImageSink: Send + Sync {
    fn store(&self, frame: ImageFrame) -> Result<String, CoreError>;
}

// ── MemoryImageSink ─────────────────────────────────────────────────

/// Keeps frames in memory.
#[derive(Debug, Default)]
pub struct MemoryImageSink {
    frames: Mutex<Vec<ImageFrame>>,
}

impl MemoryImageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<ImageFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ImageSink for MemoryImageSink {
    fn store(&self, frame: ImageFrame) -> Result<String, CoreError> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let id = format!("memory:{}", frames.len() + 1);
        frames.push(frame);
        Ok(id)
    }
}

// ── FileImageSink ───────────────────────────────────────────────────

/// Writes each payload to `<dir>/<name><format>` with the header keywords
/// next to it as `<name>.json`.
#[derive(Debug, Clone)]
pub struct FileImageSink {
    dir: PathBuf,
}

impl FileImageSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for FileImageSink {
    fn store(&self, frame: ImageFrame) -> Result<String, CoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let ext = frame
            .format
            .as_deref()
            .map(|f| f.trim_start_matches('.'))
            .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("fits");
        let path = self.dir.join(format!("{}.{ext}", frame.name));
        std::fs::write(&path, &frame.data)?;

        let header = serde_json::to_string_pretty(&frame)
            .map_err(|e| CoreError::Internal(format!("header serialization failed: {e}")))?;
        std::fs::write(self.dir.join(format!("{}.json", frame.name)), header)?;

        debug!(path = %path.display(), bytes = frame.data.len(), "frame written");
        Ok(path.display().to_string())
    }
}
