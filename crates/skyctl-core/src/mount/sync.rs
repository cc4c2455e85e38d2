// ── Sync points ──

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::command::PierSide;
use crate::error::CoreError;

/// One measured pointing error: where the telescope was asked to point
/// (celestial) versus where it reported arriving (telescope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub created: DateTime<Utc>,
    /// Local sidereal time, hours.
    pub lst: f64,
    pub celestial_ra: f64,
    pub celestial_dec: f64,
    pub telescope_ra: f64,
    pub telescope_dec: f64,
    pub pier_side: PierSide,
}

/// Ordered collection of sync points, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPointLog {
    pub points: Vec<SyncPoint>,
}

impl SyncPointLog {
    pub fn push(&mut self, point: SyncPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points recorded on one pier side, in order.
    pub fn side(&self, pier: PierSide) -> impl Iterator<Item = &SyncPoint> {
        self.points.iter().filter(move |p| p.pier_side == pier)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Internal(format!("sync point serialization failed: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            CoreError::validation(format!("invalid sync point log {}: {e}", path.display()))
        })
    }
}
