//! Mount command handlers.

use std::time::Duration;

use skyctl_core::{
    Direction, ModelConfig, MountController, MountSettings, MountStatus, PierSide, PointingModel,
    Session, SlewRate, SyncGrid, SyncPoint,
};
use tabled::Tabled;
use tracing::{info, warn};

use crate::cli::{
    FitModelArgs, GlobalOpts, GridArgs, MountArgs, MountCommand, MoveDirection, Pier, Rate,
    TargetArgs,
};
use crate::config::{Resolved, profile_to_mount_settings};
use crate::error::CliError;
use crate::output::{self, sexagesimal};

use super::{Context, util};

const COORDINATES_MARKER: &str = "MOUNT_EQUATORIAL_COORDINATES";

// ── Detail views ────────────────────────────────────────────────────

fn status_detail(s: &MountStatus) -> String {
    [
        format!("LST:       {}", sexagesimal(s.lst)),
        format!("RA:        {}", sexagesimal(s.ra)),
        format!("Dec:       {}", sexagesimal(s.dec)),
        format!("HA:        {}", sexagesimal(s.hour_angle())),
        format!("Pier side: {}", s.pier_side),
        format!("Parked:    {}", if s.parked { "yes" } else { "no" }),
    ]
    .join("\n")
}

fn sync_detail(p: &SyncPoint) -> String {
    [
        format!("LST:           {}", sexagesimal(p.lst)),
        format!(
            "Celestial:     {} {}",
            sexagesimal(p.celestial_ra),
            sexagesimal(p.celestial_dec)
        ),
        format!(
            "Telescope:     {} {}",
            sexagesimal(p.telescope_ra),
            sexagesimal(p.telescope_dec)
        ),
        format!(
            "Error:         {:+.2}' RA  {:+.2}' Dec",
            (p.telescope_ra - p.celestial_ra) * 15.0 * 60.0,
            (p.telescope_dec - p.celestial_dec) * 60.0
        ),
        format!("Pier side:     {}", p.pier_side),
    ]
    .join("\n")
}

#[derive(Tabled)]
struct TermRow {
    #[tabled(rename = "Term")]
    term: String,
    #[tabled(rename = "West (')")]
    west: String,
    #[tabled(rename = "East (')")]
    east: String,
}

fn model_detail(m: &PointingModel) -> String {
    let rows: Vec<TermRow> = m
        .config
        .terms()
        .into_iter()
        .enumerate()
        .map(|(i, term)| TermRow {
            term: term.to_string(),
            west: m.west.get(i).map_or_else(|| "-".into(), |c| format!("{c:+.4}")),
            east: m.east.get(i).map_or_else(|| "-".into(), |c| format!("{c:+.4}")),
        })
        .collect();
    format!(
        "Config:   {}\nLatitude: {:.6}\n{}",
        m.config.bits(),
        m.latitude,
        tabled::Table::new(rows).with(tabled::settings::Style::rounded())
    )
}

fn position_id(ra: f64, dec: f64) -> String {
    format!("{ra:.6} {dec:.6}")
}

// ── Flag conversions ────────────────────────────────────────────────

fn pier_side(pier: Pier) -> PierSide {
    match pier {
        Pier::West => PierSide::West,
        Pier::East => PierSide::East,
    }
}

fn direction(d: MoveDirection) -> Direction {
    match d {
        MoveDirection::North => Direction::North,
        MoveDirection::South => Direction::South,
        MoveDirection::West => Direction::West,
        MoveDirection::East => Direction::East,
    }
}

fn slew_rate(rate: Rate) -> SlewRate {
    match rate {
        Rate::Guide => SlewRate::Guide,
        Rate::Centering => SlewRate::Centering,
        Rate::Find => SlewRate::Find,
        Rate::Max => SlewRate::Max,
    }
}

fn target(args: &TargetArgs) -> Result<(f64, f64), CliError> {
    Ok((
        util::parse_angle("ra", &args.ra)?,
        util::parse_angle("dec", &args.dec)?,
    ))
}

fn grid(args: &GridArgs) -> SyncGrid {
    SyncGrid {
        ra_lower: args.ra_lower,
        ra_upper: args.ra_upper,
        ra_step_deg: args.ra_step,
        dec_lower: args.dec_lower,
        dec_upper: args.dec_upper,
        dec_step_deg: args.dec_step,
    }
}

// ── Handlers ────────────────────────────────────────────────────────

fn print_status(status: &MountStatus, global: &GlobalOpts) {
    let out = output::render_single(&global.output, status, status_detail, |s| {
        position_id(s.ra, s.dec)
    });
    output::print_output(&out, global.quiet);
}

fn print_sync(point: &SyncPoint, global: &GlobalOpts) {
    let out = output::render_single(&global.output, point, sync_detail, |p| {
        position_id(p.telescope_ra, p.telescope_dec)
    });
    output::print_output(&out, global.quiet);
}

fn print_model(model: &PointingModel, global: &GlobalOpts) {
    let out = output::render_single(&global.output, model, model_detail, |m| {
        m.config.bits().to_string()
    });
    output::print_output(&out, global.quiet);
}

pub async fn handle(ctx: &Context, args: MountArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = &ctx.resolved.profile;
    let mut settings = profile_to_mount_settings(profile)?;
    if let MountCommand::Move(ref m) = args.command {
        if let Some(rate) = m.rate {
            settings.slew_rate = slew_rate(rate);
        }
    }

    let device = util::resolve_device(
        &ctx.session,
        args.device.as_deref(),
        profile.mount_device.as_deref(),
        COORDINATES_MARKER,
        "mount",
    )
    .await?;
    let mount = MountController::new(ctx.session.clone(), device, settings);

    match args.command {
        MountCommand::Status => {
            print_status(&mount.status()?, global);
            Ok(())
        }

        MountCommand::Park => {
            mount.park().await?;
            print_status(&mount.status()?, global);
            Ok(())
        }

        MountCommand::Unpark => {
            mount.unpark().await?;
            print_status(&mount.status()?, global);
            Ok(())
        }

        MountCommand::ParkDefault => {
            mount.park_default().await?;
            print_status(&mount.status()?, global);
            Ok(())
        }

        MountCommand::Goto(t) => {
            let (ra, dec) = target(&t)?;
            let status = mount.goto(ra, dec, t.pier.map(pier_side)).await?;
            print_status(&status, global);
            Ok(())
        }

        MountCommand::Sync(s) => {
            let ra = util::parse_angle("ra", &s.ra)?;
            let dec = util::parse_angle("dec", &s.dec)?;
            let point = mount.sync(ra, dec).await?;
            print_sync(&point, global);
            Ok(())
        }

        MountCommand::TestSync(t) => {
            let (ra, dec) = target(&t.target)?;
            if t.log.exists() {
                let loaded = mount.load_sync_points(&t.log).await?;
                info!(loaded, log = %t.log.display(), "appending to sync log");
            }
            let point = mount.test_sync(ra, dec, t.target.pier.map(pier_side)).await?;
            mount.save_sync_points(&t.log).await?;
            print_sync(&point, global);
            Ok(())
        }

        MountCommand::Move(m) => {
            if !m.seconds.is_finite() || m.seconds <= 0.0 {
                return Err(CliError::validation("seconds", "must be a positive duration"));
            }
            let dir = direction(m.direction);
            mount.start_motion(dir).await?;
            tokio::time::sleep(Duration::from_secs_f64(m.seconds)).await;
            mount.stop_motion(dir).await?;
            print_status(&mount.status()?, global);
            Ok(())
        }

        MountCommand::Grid(g) => {
            let grid = grid(&g);
            let total = grid.points()?.len();
            let bar = util::progress_bar(u64::try_from(total).unwrap_or(u64::MAX), global.quiet)?;
            bar.set_message("test-sync");
            let done = mount
                .run_sync_grid(&grid, |done, _| {
                    bar.set_position(u64::try_from(done).unwrap_or(u64::MAX));
                })
                .await;
            bar.finish_and_clear();

            // Keep whatever was collected, even when a point failed.
            if let Some(ref log) = g.log {
                mount.save_sync_points(log).await?;
            }
            let done = done?;
            if !global.quiet {
                eprintln!("✓ Collected {done} sync points");
            }

            if g.fit {
                let model = mount.fit_pointing_model().await?;
                print_model(&model, global);
            }
            Ok(())
        }

        MountCommand::FitModel(f) => fit_with(&mount, &f, global).await,
    }
}

async fn fit_with(
    mount: &MountController,
    args: &FitModelArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let loaded = mount.load_sync_points(&args.log).await?;
    info!(loaded, log = %args.log.display(), "sync points loaded");
    if mount.settings().model_file.is_none() {
        warn!("no model file given; the fitted model is only printed");
    }
    let model = mount.fit_pointing_model().await?;
    print_model(&model, global);
    Ok(())
}

/// `mount fit-model` runs offline: it only reads the sync log and writes
/// the model file, so no server connection is opened.
pub async fn fit_model(
    resolved: &Resolved,
    device: Option<&str>,
    args: &FitModelArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut settings: MountSettings = profile_to_mount_settings(&resolved.profile)?;
    if let Some(ref file) = args.model_file {
        settings.model_file = Some(file.clone());
    }
    if let Some(bits) = args.model_config {
        settings.model_config = ModelConfig::new(bits)?;
    }
    let device = device
        .or(resolved.profile.mount_device.as_deref())
        .unwrap_or("mount");
    let mount = MountController::new(Session::new(resolved.session_config()?), device, settings);
    fit_with(&mount, args, global).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_detail_uses_sexagesimal() {
        let status = MountStatus {
            lst: 6.0,
            ra: 4.5,
            dec: -10.25,
            parked: false,
            pier_side: PierSide::East,
        };
        let text = status_detail(&status);
        assert!(text.contains("RA:        04:30:00.0"));
        assert!(text.contains("Dec:       -10:15:00.0"));
        assert!(text.contains("HA:        01:30:00.0"));
        assert!(text.contains("Pier side: east"));
    }

    #[test]
    fn model_detail_lists_enabled_terms() {
        let config = ModelConfig::new(0b11).unwrap();
        let mut model = PointingModel::new(config, 49.0);
        model.west = vec![1.5, -0.25];
        let text = model_detail(&model);
        assert!(text.contains("IH"));
        assert!(text.contains("+1.5000"));
        assert!(text.contains("-0.2500"));
        assert!(!text.contains("CH"));
    }
}
