// ── Mount controller ──
//
// Park/unpark, manual motion, GOTO, SYNC and the test-sync loop that
// collects sync points for the pointing model. All writes go through
// the session's command processor.

mod command;
mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skyctl_api::PropertyState;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::astro;
use crate::command::Command;
use crate::error::CoreError;
use crate::model::{Property, PropertyId};
use crate::pointing::{self, ModelConfig, PointingModel, SyncGrid};
use crate::session::Session;

pub use command::{AlignmentMethod, Direction, MountCommand, PierSide, SlewRate};
pub use sync::{SyncPoint, SyncPointLog};

// ── Property names ──────────────────────────────────────────────────

const PARK: &str = "MOUNT_PARK";
const PARK_SET: &str = "MOUNT_PARK_SET";
const SLEW_RATE: &str = "MOUNT_SLEW_RATE";
const ON_COORDINATES_SET: &str = "MOUNT_ON_COORDINATES_SET";
const EQUATORIAL: &str = "MOUNT_EQUATORIAL_COORDINATES";
const LST_TIME: &str = "MOUNT_LST_TIME";
const SIDE_OF_PIER: &str = "MOUNT_SIDE_OF_PIER";

// ── Settings & status ───────────────────────────────────────────────

/// Site and alignment settings for one mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSettings {
    /// Geographic latitude, degrees north.
    pub latitude: f64,
    /// Geographic longitude, degrees east.
    pub longitude: f64,
    pub model_file: Option<PathBuf>,
    pub model_config: ModelConfig,
    pub alignment: AlignmentMethod,
    pub slew_rate: SlewRate,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            model_file: None,
            model_config: ModelConfig::default(),
            alignment: AlignmentMethod::None,
            slew_rate: SlewRate::default(),
        }
    }
}

/// Current mount position as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountStatus {
    /// Local sidereal time, hours.
    pub lst: f64,
    pub ra: f64,
    pub dec: f64,
    pub parked: bool,
    pub pier_side: PierSide,
}

impl MountStatus {
    /// Hour angle in `(-12, 12]` hours.
    pub fn hour_angle(&self) -> f64 {
        astro::hour_angle(self.lst, self.ra)
    }
}

/// What a [`MountController::execute`] call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MountOutcome {
    Status(MountStatus),
    Synced(SyncPoint),
    Model(PointingModel),
}

// ── MountController ─────────────────────────────────────────────────

pub struct MountController {
    session: Session,
    device: String,
    settings: MountSettings,
    sync_points: Mutex<SyncPointLog>,
    last_sync: Mutex<Option<SyncPoint>>,
    model: Mutex<Option<Arc<PointingModel>>>,
}

impl MountController {
    pub fn new(session: Session, device: impl Into<String>, settings: MountSettings) -> Self {
        Self {
            session,
            device: device.into(),
            settings,
            sync_points: Mutex::new(SyncPointLog::default()),
            last_sync: Mutex::new(None),
            model: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn settings(&self) -> &MountSettings {
        &self.settings
    }

    fn id(&self, property: &str) -> PropertyId {
        PropertyId::new(&self.device, property)
    }

    fn require(&self, property: &str) -> Result<Arc<Property>, CoreError> {
        let id = self.id(property);
        self.session
            .snapshot(&id)
            .ok_or_else(|| CoreError::PropertyNotFound { key: id.to_string() })
    }

    // ── Dispatch by command code ────────────────────────────────────

    /// Run one mount command. `target` is `(ra hours, dec degrees)` and is
    /// required by GOTO, SYNC and TEST_SYNC.
    pub async fn execute(
        &self,
        command: MountCommand,
        target: Option<(f64, f64)>,
        pier_side: Option<PierSide>,
    ) -> Result<MountOutcome, CoreError> {
        debug!(device = %self.device, %command, code = command.code(), "mount command");
        let target = match (command.needs_target(), target) {
            (true, None) => {
                return Err(CoreError::validation(format!("{command} needs target coordinates")));
            }
            (_, target) => target,
        };

        if let Some((direction, start)) = command.motion() {
            if start {
                self.start_motion(direction).await?;
            } else {
                self.stop_motion(direction).await?;
            }
            return self.status().map(MountOutcome::Status);
        }

        match (command, target) {
            (MountCommand::Unpark, _) => self.unpark().await?,
            (MountCommand::Park, _) => self.park().await?,
            (MountCommand::ParkDefault, _) => self.park_default().await?,
            (MountCommand::GoTo, Some((ra, dec))) => {
                return self.goto(ra, dec, pier_side).await.map(MountOutcome::Status);
            }
            (MountCommand::Sync, Some((ra, dec))) => {
                return self.sync(ra, dec).await.map(MountOutcome::Synced);
            }
            (MountCommand::TestSync, Some((ra, dec))) => {
                return self.test_sync(ra, dec, pier_side).await.map(MountOutcome::Synced);
            }
            (MountCommand::FitPointingModel, _) => {
                return self.fit_pointing_model().await.map(MountOutcome::Model);
            }
            (other, _) => {
                return Err(CoreError::Internal(format!("unhandled mount command {other}")));
            }
        }
        self.status().map(MountOutcome::Status)
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Local sidereal time: the mount's own clock when it publishes one,
    /// otherwise computed from the configured longitude.
    pub fn lst(&self) -> f64 {
        self.session
            .snapshot(&self.id(LST_TIME))
            .and_then(|p| p.number("TIME"))
            .unwrap_or_else(|| astro::lst_now(self.settings.longitude))
    }

    pub fn is_parked(&self) -> bool {
        self.session
            .snapshot(&self.id(PARK))
            .and_then(|p| p.switch("PARKED"))
            .unwrap_or(false)
    }

    pub fn status(&self) -> Result<MountStatus, CoreError> {
        let coords = self.require(EQUATORIAL)?;
        let number = |name: &str| {
            coords.number(name).ok_or_else(|| CoreError::ElementNotFound {
                key: coords.key(name).to_string(),
            })
        };
        let ra = number("RA")?;
        let dec = number("DEC")?;
        let lst = self.lst();
        let pier_side = self
            .session
            .snapshot(&self.id(SIDE_OF_PIER))
            .and_then(|p| {
                p.switches_on().next().and_then(|s| s.parse::<PierSide>().ok())
            })
            .unwrap_or_else(|| astro::pier_side_for(lst, ra));
        Ok(MountStatus {
            lst,
            ra,
            dec,
            parked: self.is_parked(),
            pier_side,
        })
    }

    // ── Park ────────────────────────────────────────────────────────

    /// Park the mount. Parking an already parked mount is a no-op on the
    /// server side.
    pub async fn park(&self) -> Result<(), CoreError> {
        self.session
            .execute(Command::switch_on(self.id(PARK), &["PARKED"]))
            .await?;
        info!(device = %self.device, "mount parked");
        Ok(())
    }

    pub async fn unpark(&self) -> Result<(), CoreError> {
        self.session
            .execute(Command::switch_on(self.id(PARK), &["UNPARKED"]))
            .await?;
        info!(device = %self.device, "mount unparked");
        Ok(())
    }

    /// Store the current position as the park position.
    pub async fn park_default(&self) -> Result<(), CoreError> {
        self.session
            .execute(Command::switch_on(self.id(PARK_SET), &["CURRENT"]))
            .await?;
        info!(device = %self.device, "park position set to current position");
        Ok(())
    }

    async fn ensure_unparked(&self) -> Result<(), CoreError> {
        if self.is_parked() {
            debug!(device = %self.device, "unparking before motion");
            self.unpark().await?;
        }
        Ok(())
    }

    // ── Manual motion ───────────────────────────────────────────────

    pub async fn set_slew_rate(&self, rate: SlewRate) -> Result<(), CoreError> {
        self.session
            .execute(Command::switch_on(self.id(SLEW_RATE), &[&rate.to_string()]))
            .await?;
        Ok(())
    }

    /// Start moving in `direction` at the configured slew rate. Returns
    /// once the server reports the motion switch ON.
    pub async fn start_motion(&self, direction: Direction) -> Result<(), CoreError> {
        self.ensure_unparked().await?;
        if self.session.snapshot(&self.id(SLEW_RATE)).is_some() {
            self.set_slew_rate(self.settings.slew_rate).await?;
        }
        let (property, element) = direction.property();
        self.session
            .execute(
                Command::switch_on(self.id(property), &[element])
                    .accept_states(&[PropertyState::Ok, PropertyState::Busy]),
            )
            .await?;
        debug!(device = %self.device, %direction, "motion started");
        Ok(())
    }

    pub async fn stop_motion(&self, direction: Direction) -> Result<(), CoreError> {
        let (property, element) = direction.property();
        self.session
            .execute(Command::switches(self.id(property), &[(element, false)]))
            .await?;
        debug!(device = %self.device, %direction, "motion stopped");
        Ok(())
    }

    // ── GOTO ────────────────────────────────────────────────────────

    /// Slew to `(ra, dec)`, corrected by the analytical model when that
    /// alignment is selected.
    pub async fn goto(
        &self,
        ra: f64,
        dec: f64,
        pier_side: Option<PierSide>,
    ) -> Result<MountStatus, CoreError> {
        validate_target(ra, dec)?;
        self.ensure_unparked().await?;
        let (ra_cmd, dec_cmd) = match self.settings.alignment {
            AlignmentMethod::AnalyticalModel => {
                let lst = self.lst();
                let pier = pier_side.unwrap_or_else(|| astro::pier_side_for(lst, ra));
                let model = self.model().await?;
                let apparent = model.apparent(lst, ra, dec, pier);
                debug!(ra, dec, apparent_ra = apparent.0, apparent_dec = apparent.1, %pier, "applying pointing model");
                apparent
            }
            AlignmentMethod::None | AlignmentMethod::ServerModel => (ra, dec),
        };
        self.slew(ra_cmd, dec_cmd).await?;
        info!(device = %self.device, ra, dec, "goto complete");
        self.status()
    }

    /// Uncorrected slew.
    async fn slew(&self, ra: f64, dec: f64) -> Result<(), CoreError> {
        self.set_coordinate_mode("TRACK").await?;
        self.session
            .execute(Command::number(self.id(EQUATORIAL), &[("RA", ra), ("DEC", dec)]).after_busy())
            .await?;
        Ok(())
    }

    async fn set_coordinate_mode(&self, mode: &str) -> Result<(), CoreError> {
        self.session
            .execute(Command::switch_on(self.id(ON_COORDINATES_SET), &[mode]))
            .await?;
        Ok(())
    }

    // ── SYNC ────────────────────────────────────────────────────────

    /// Tell the server the telescope is pointing at `(ra, dec)`. The
    /// position reported before the sync is kept as the last sync record.
    pub async fn sync(&self, ra: f64, dec: f64) -> Result<SyncPoint, CoreError> {
        validate_target(ra, dec)?;
        self.ensure_unparked().await?;
        let before = self.status()?;
        let point = SyncPoint {
            created: chrono::Utc::now(),
            lst: before.lst,
            celestial_ra: ra,
            celestial_dec: dec,
            telescope_ra: before.ra,
            telescope_dec: before.dec,
            pier_side: before.pier_side,
        };

        self.set_coordinate_mode("SYNC").await?;
        let result = self
            .session
            .execute(Command::number(self.id(EQUATORIAL), &[("RA", ra), ("DEC", dec)]))
            .await;
        // Restore tracking mode even when the sync itself failed; the sync
        // error takes precedence.
        let restored = self.set_coordinate_mode("TRACK").await;
        if let (Err(_), Err(restore)) = (&result, &restored) {
            warn!(device = %self.device, error = %restore, "tracking mode not restored after failed sync");
        }
        result?;
        restored?;

        info!(device = %self.device, ra, dec, "mount synced");
        *self.last_sync.lock().await = Some(point.clone());
        Ok(point)
    }

    /// Slew to `(ra, dec)` without model correction, read back the
    /// position the mount reports and record the pair as a sync point.
    pub async fn test_sync(
        &self,
        ra: f64,
        dec: f64,
        pier_side: Option<PierSide>,
    ) -> Result<SyncPoint, CoreError> {
        validate_target(ra, dec)?;
        self.ensure_unparked().await?;
        self.slew(ra, dec).await?;
        let achieved = self.status()?;
        let point = SyncPoint {
            created: chrono::Utc::now(),
            lst: achieved.lst,
            celestial_ra: ra,
            celestial_dec: dec,
            telescope_ra: achieved.ra,
            telescope_dec: achieved.dec,
            pier_side: pier_side.unwrap_or_else(|| astro::pier_side_for(achieved.lst, ra)),
        };
        debug!(
            ra,
            dec,
            telescope_ra = point.telescope_ra,
            telescope_dec = point.telescope_dec,
            pier = %point.pier_side,
            "sync point recorded"
        );
        self.sync_points.lock().await.push(point.clone());
        *self.last_sync.lock().await = Some(point.clone());
        Ok(point)
    }

    /// Test-sync every position of `grid` in order. `progress` is called
    /// with `(done, total)` after each point.
    pub async fn run_sync_grid(
        &self,
        grid: &SyncGrid,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<usize, CoreError> {
        let points = grid.points()?;
        let total = points.len();
        info!(device = %self.device, total, "starting sync grid");
        for (i, (ra, dec)) in points.into_iter().enumerate() {
            self.test_sync(ra, dec, None).await?;
            progress(i + 1, total);
        }
        Ok(total)
    }

    // ── Sync point log ──────────────────────────────────────────────

    pub async fn sync_points(&self) -> SyncPointLog {
        self.sync_points.lock().await.clone()
    }

    pub async fn last_sync(&self) -> Option<SyncPoint> {
        self.last_sync.lock().await.clone()
    }

    pub async fn clear_sync_points(&self) {
        self.sync_points.lock().await.points.clear();
    }

    pub async fn save_sync_points(&self, path: &Path) -> Result<(), CoreError> {
        self.sync_points.lock().await.save(path)
    }

    /// Append the points stored at `path`. Returns how many were loaded.
    pub async fn load_sync_points(&self, path: &Path) -> Result<usize, CoreError> {
        let loaded = SyncPointLog::load(path)?;
        let count = loaded.len();
        self.sync_points.lock().await.points.extend(loaded.points);
        Ok(count)
    }

    // ── Pointing model ──────────────────────────────────────────────

    /// Fit the model to the recorded sync points and write it to the
    /// configured model file.
    pub async fn fit_pointing_model(&self) -> Result<PointingModel, CoreError> {
        let points = self.sync_points.lock().await.points.clone();
        if points.is_empty() {
            return Err(CoreError::InsufficientSyncPoints {
                pier: "any".into(),
                needed: self.settings.model_config.term_count().div_ceil(2),
                available: 0,
            });
        }
        let model = pointing::fit(&points, self.settings.latitude, self.settings.model_config)?;
        match &self.settings.model_file {
            Some(path) => pointing::write_model(path, &model)?,
            None => warn!("no model file configured; fitted model is not persisted"),
        }
        *self.model.lock().await = Some(Arc::new(model.clone()));
        info!(device = %self.device, points = points.len(), "pointing model fitted");
        Ok(model)
    }

    /// Active model: the last fitted one, else the configured file.
    pub async fn model(&self) -> Result<Arc<PointingModel>, CoreError> {
        let mut guard = self.model.lock().await;
        if let Some(model) = guard.as_ref() {
            return Ok(Arc::clone(model));
        }
        let path = self.settings.model_file.as_deref().ok_or_else(|| {
            CoreError::validation("analytical model alignment needs a model file or a fitted model")
        })?;
        let model = Arc::new(pointing::read_model(path)?);
        *guard = Some(Arc::clone(&model));
        Ok(model)
    }
}

fn validate_target(ra: f64, dec: f64) -> Result<(), CoreError> {
    if !(0.0..24.0).contains(&ra) {
        return Err(CoreError::validation(format!("RA must lie in [0, 24) hours, got {ra}")));
    }
    if !(-90.0..=90.0).contains(&dec) {
        return Err(CoreError::validation(format!("Dec must lie in [-90, 90] degrees, got {dec}")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn controller() -> MountController {
        MountController::new(
            Session::new(SessionConfig::default()),
            "Mount Simulator @ localhost",
            MountSettings::default(),
        )
    }

    #[test]
    fn target_validation() {
        assert!(validate_target(0.0, -90.0).is_ok());
        assert!(validate_target(23.99, 90.0).is_ok());
        assert!(validate_target(24.0, 0.0).is_err());
        assert!(validate_target(1.0, 91.0).is_err());
    }

    #[tokio::test]
    async fn commands_needing_targets_are_rejected_without_one() {
        let mount = controller();
        let err = mount.execute(MountCommand::GoTo, None, None).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn status_without_coordinates_is_not_found() {
        let mount = controller();
        assert!(matches!(mount.status(), Err(CoreError::PropertyNotFound { .. })));
        assert!(!mount.is_parked());
    }

    #[tokio::test]
    async fn model_requires_a_source() {
        let mount = controller();
        assert!(matches!(
            mount.model().await,
            Err(CoreError::ValidationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn fit_without_points_fails() {
        let mount = controller();
        assert!(matches!(
            mount.fit_pointing_model().await,
            Err(CoreError::InsufficientSyncPoints { .. })
        ));
    }
}
