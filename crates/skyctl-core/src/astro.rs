// ── Astronomical helpers ──
//
// Hour-angle arithmetic and sidereal time. Right ascension, hour angle
// and LST are in hours; declination, latitude and longitude in degrees.

use chrono::{DateTime, Utc};

use crate::mount::PierSide;

/// Julian date of the J2000.0 epoch.
const J2000: f64 = 2_451_545.0;
/// Julian date of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Map an hour value into `(-12, 12]`.
pub fn range_shift(hours: f64) -> f64 {
    let h = hours.rem_euclid(24.0);
    if h > 12.0 { h - 24.0 } else { h }
}

/// Map an hour value into `[0, 24)`.
pub fn normalize_hours(hours: f64) -> f64 {
    let h = hours.rem_euclid(24.0);
    // rem_euclid can round up to exactly 24 for tiny negative inputs.
    if h >= 24.0 { 0.0 } else { h }
}

/// Hour angle of `ra` at `lst`, in `(-12, 12]`.
pub fn hour_angle(lst: f64, ra: f64) -> f64 {
    range_shift(lst - ra)
}

/// Pier side a German equatorial mount uses for `ra` at `lst`:
/// west when the target is east of the meridian or on it.
pub fn pier_side_for(lst: f64, ra: f64) -> PierSide {
    if hour_angle(lst, ra) <= 0.0 {
        PierSide::West
    } else {
        PierSide::East
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn julian_date(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 86_400_000.0 + UNIX_EPOCH_JD
}

/// Local mean sidereal time in hours for a Julian date and east longitude.
pub fn local_sidereal_time(jd: f64, longitude: f64) -> f64 {
    let d = jd - J2000;
    let t = d / 36_525.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    (gmst + longitude).rem_euclid(360.0) / 15.0
}

/// LST now at `longitude`.
pub fn lst_now(longitude: f64) -> f64 {
    local_sidereal_time(julian_date(Utc::now()), longitude)
}
