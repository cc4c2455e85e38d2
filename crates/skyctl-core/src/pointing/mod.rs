// ── Pointing model ──
//
// Per-pier-side analytical model: coefficients, correction, fitting,
// the `.xtpm` file format, and sync grid generation.

mod file;
mod fit;
mod grid;
mod terms;

use serde::{Deserialize, Serialize};

use crate::astro;
use crate::error::CoreError;
use crate::mount::PierSide;

pub use file::{read_model, write_model};
pub use fit::fit;
pub use grid::SyncGrid;
pub use terms::{DEFAULT_MODEL_CONFIG, ModelConfig, Term};

/// Fitted coefficients (arcminutes) for both pier sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointingModel {
    pub config: ModelConfig,
    /// Geographic latitude in degrees.
    pub latitude: f64,
    pub west: Vec<f64>,
    pub east: Vec<f64>,
}

impl PointingModel {
    /// All-zero model.
    pub fn new(config: ModelConfig, latitude: f64) -> Self {
        let n = config.term_count();
        Self {
            config,
            latitude,
            west: vec![0.0; n],
            east: vec![0.0; n],
        }
    }

    /// Check that both vectors carry one coefficient per enabled term.
    pub fn validate(&self) -> Result<(), CoreError> {
        let n = self.config.term_count();
        if self.west.len() != n || self.east.len() != n {
            return Err(CoreError::validation(format!(
                "model configuration {} needs {n} coefficients per side, got {} west and {} east",
                self.config.bits(),
                self.west.len(),
                self.east.len()
            )));
        }
        Ok(())
    }

    /// Coefficients for a pier side. An unknown side uses the west set.
    pub fn coefficients(&self, pier: PierSide) -> &[f64] {
        match pier {
            PierSide::East => &self.east,
            PierSide::West | PierSide::None => &self.west,
        }
    }

    /// Modelled pointing error at hour angle `ha` (hours) and `dec`
    /// (degrees): `(ΔRA hours, ΔDec degrees)`.
    pub fn correction(&self, ha: f64, dec: f64, pier: PierSide) -> (f64, f64) {
        let h = (astro::range_shift(ha) * 15.0).to_radians();
        let d = dec.to_radians();
        let lat = self.latitude.to_radians();
        let (dra, ddec) = self
            .config
            .terms()
            .into_iter()
            .zip(self.coefficients(pier))
            .fold((0.0, 0.0), |(ra, de), (term, c)| {
                let (br, bd) = term.basis(h, d, lat);
                (ra + c * br, de + c * bd)
            });
        (dra / 60.0 / 15.0, ddec / 60.0)
    }

    /// Coordinates to command so the telescope lands on `(ra, dec)`.
    pub fn apparent(&self, lst: f64, ra: f64, dec: f64, pier: PierSide) -> (f64, f64) {
        let (dra, ddec) = self.correction(lst - ra, dec, pier);
        (
            astro::normalize_hours(ra - dra),
            (dec - ddec).clamp(-90.0, 90.0),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn index_terms_shift_directly() {
        let mut model = PointingModel::new(ModelConfig::new(0b11).unwrap(), 49.26);
        model.west = vec![15.0, 30.0];
        let (dra, ddec) = model.correction(1.0, 20.0, PierSide::West);
        // 15 arcmin of RA is one minute of time.
        assert!((dra - 1.0 / 60.0).abs() < 1e-12);
        assert!((ddec - 0.5).abs() < 1e-12);
        // East side is untouched.
        assert_eq!(model.correction(1.0, 20.0, PierSide::East), (0.0, 0.0));

        let (ra, dec) = model.apparent(2.0, 0.0, 10.0, PierSide::West);
        assert!((ra - (24.0 - 1.0 / 60.0)).abs() < 1e-9);
        assert!((dec - 9.5).abs() < 1e-12);
    }

    #[test]
    fn validate_checks_lengths() {
        let mut model = PointingModel::new(ModelConfig::default(), 0.0);
        assert!(model.validate().is_ok());
        model.east.pop();
        assert!(model.validate().is_err());
    }
}
