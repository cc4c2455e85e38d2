// ── Sync grid ──

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Rectangular grid of sky positions for building a pointing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncGrid {
    /// RA bounds in hours, inclusive.
    pub ra_lower: f64,
    pub ra_upper: f64,
    /// RA spacing in degrees.
    pub ra_step_deg: f64,
    /// Dec bounds in degrees, inclusive.
    pub dec_lower: f64,
    pub dec_upper: f64,
    pub dec_step_deg: f64,
}

impl Default for SyncGrid {
    fn default() -> Self {
        Self {
            ra_lower: 0.2,
            ra_upper: 23.7,
            ra_step_deg: 10.0,
            dec_lower: -10.0,
            dec_upper: 80.0,
            dec_step_deg: 20.0,
        }
    }
}

impl SyncGrid {
    /// RA step in hours, rounded to 12 decimals.
    pub fn ra_step_hours(&self) -> f64 {
        (self.ra_step_deg / 15.0 * 1e12).round() / 1e12
    }

    /// Grid positions `(ra, dec)`, RA-major. Both axes are walked by
    /// repeated addition and include the upper bound when reached.
    pub fn points(&self) -> Result<Vec<(f64, f64)>, CoreError> {
        if self.ra_step_deg <= 0.0 || self.dec_step_deg <= 0.0 {
            return Err(CoreError::validation("grid steps must be positive"));
        }
        if self.ra_lower > self.ra_upper || self.dec_lower > self.dec_upper {
            return Err(CoreError::validation("grid lower bounds must not exceed upper bounds"));
        }
        if !(0.0..24.0).contains(&self.ra_lower) || self.ra_upper >= 24.0 {
            return Err(CoreError::validation("grid RA bounds must lie in [0, 24)"));
        }
        if self.dec_lower < -90.0 || self.dec_upper > 90.0 {
            return Err(CoreError::validation("grid Dec bounds must lie in [-90, 90]"));
        }

        let ra_step = self.ra_step_hours();
        let mut points = Vec::new();
        let mut ra = self.ra_lower;
        while ra <= self.ra_upper {
            let mut dec = self.dec_lower;
            while dec <= self.dec_upper {
                points.push((ra, dec));
                dec += self.dec_step_deg;
            }
            ra += ra_step;
        }
        Ok(points)
    }
}
