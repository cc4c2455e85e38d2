//! Shared helpers for command handlers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use skyctl_core::{DeviceConnection, Session};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::error::CliError;

const QUIET_PERIOD: Duration = Duration::from_millis(200);
const SETTLE_TICK: Duration = Duration::from_millis(25);

/// Wait until the store has stopped changing for a moment, or `limit`
/// has passed. Servers announce their properties in one burst after
/// `getProperties`.
pub async fn settle(session: &Session, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut version = session.store().version();
    let mut quiet_since = Instant::now();
    while Instant::now() < deadline {
        sleep(SETTLE_TICK).await;
        let now = session.store().version();
        if now != version {
            version = now;
            quiet_since = Instant::now();
        } else if version > 0 && quiet_since.elapsed() >= QUIET_PERIOD {
            return;
        }
    }
}

/// Pick the device to drive: the explicit flag, else the profile's
/// configured one, else the only device that defines `marker`. The
/// device is connected if it isn't already.
pub async fn resolve_device(
    session: &Session,
    explicit: Option<&str>,
    configured: Option<&str>,
    marker: &str,
    kind: &str,
) -> Result<String, CliError> {
    let name = match explicit.or(configured) {
        Some(name) => name.to_owned(),
        None => detect_device(session, marker, kind)?,
    };

    let device = session
        .devices()
        .iter()
        .find(|d| d.name == name)
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            resource_type: kind.into(),
            identifier: name.clone(),
            list_command: "devices".into(),
        })?;
    if device.connection != DeviceConnection::Connected {
        info!(device = %name, "connecting device");
        session.connect_device(&name).await?;
        // Drivers define their working properties after CONNECTED.
        settle(session, Duration::from_secs(2)).await;
    }
    Ok(name)
}

fn detect_device(session: &Session, marker: &str, kind: &str) -> Result<String, CliError> {
    let store = session.store();
    let mut candidates: Vec<String> = session
        .list_devices()
        .into_iter()
        .filter(|d| store.device_properties(d).iter().any(|p| p.name == marker))
        .collect();
    debug!(kind, ?candidates, "device auto-detection");
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(CliError::NotFound {
            resource_type: kind.into(),
            identifier: format!("(any device with {marker})"),
            list_command: "devices".into(),
        }),
        _ => Err(CliError::validation(
            "device",
            format!(
                "several {kind}s found ({}); pass --device",
                candidates.join(", ")
            ),
        )),
    }
}

/// Progress bar on stderr; hidden in quiet mode.
pub fn progress_bar(len: u64, quiet: bool) -> Result<ProgressBar, CliError> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ETA: {eta}")
            .map_err(|e| CliError::Internal(format!("progress template: {e}")))?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    Ok(bar)
}

/// Parse an angle given as decimal (`5.5`) or sexagesimal
/// (`5:30:00`, `-10 15 30`).
pub fn parse_angle(field: &str, input: &str) -> Result<f64, CliError> {
    let invalid = || CliError::validation(field, format!("'{input}' is not an angle"));
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Ok(v);
    }

    let negative = trimmed.starts_with('-');
    let parts: Vec<&str> = trimmed
        .trim_start_matches(['-', '+'])
        .split([':', ' '])
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }
    let mut value = 0.0;
    let mut scale = 1.0;
    for part in parts {
        let n: f64 = part.parse().map_err(|_| invalid())?;
        if n < 0.0 || (scale < 1.0 && n >= 60.0) {
            return Err(invalid());
        }
        value += n * scale;
        scale /= 60.0;
    }
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn angles_in_decimal_and_sexagesimal() {
        assert!(close(parse_angle("ra", "5.5").unwrap(), 5.5));
        assert!(close(parse_angle("ra", "05:30:00").unwrap(), 5.5));
        assert!(close(parse_angle("dec", "-10:15:36").unwrap(), -10.26));
        assert!(close(parse_angle("dec", "+45 30").unwrap(), 45.5));
        assert!(close(parse_angle("dec", "-0:30").unwrap(), -0.5));
    }

    #[test]
    fn malformed_angles_are_rejected() {
        for bad in ["", "abc", "10:75", "1:2:3:4", "5:-3"] {
            let err = parse_angle("ra", bad).unwrap_err();
            assert!(matches!(err, CliError::Validation { .. }), "{bad}");
        }
    }
}
