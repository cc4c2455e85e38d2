// ── Analytical pointing-model terms ──
//
// Each term contributes a basis function pair (RA error, Dec error)
// scaled by its coefficient in arcminutes. Bit `n` of the model
// configuration enables term `n`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoEnumIterator};

use crate::error::CoreError;

/// Model configuration used when none is given: every term but FO.
pub const DEFAULT_MODEL_CONFIG: u32 = 1919;

/// Pointing-model term, in configuration-bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Term {
    /// Index error in hour angle.
    IH = 0,
    /// Index error in declination.
    ID = 1,
    /// Collimation error.
    CH = 2,
    /// Non-perpendicularity of the axes.
    NP = 3,
    /// Polar axis misalignment east-west.
    MA = 4,
    /// Polar axis misalignment north-south.
    ME = 5,
    /// Tube flexure.
    TF = 6,
    /// Fork flexure.
    FO = 7,
    /// Declination axis flexure.
    DAF = 8,
    /// Linear hour-angle scale error.
    LH = 9,
    /// Linear declination scale error.
    LD = 10,
}

impl Term {
    pub const COUNT: usize = 11;

    #[allow(clippy::as_conversions)]
    pub fn bit(self) -> u32 {
        1 << u32::from(self as u8)
    }

    /// Basis pair `(ΔRA, ΔDec)` at hour angle `h`, declination `dec`
    /// and latitude `lat`, all in radians.
    pub fn basis(self, h: f64, dec: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::IH => (1.0, 0.0),
            Self::ID => (0.0, 1.0),
            Self::CH => (1.0 / dec.cos(), 0.0),
            Self::NP => (dec.tan(), 0.0),
            Self::MA => (-h.cos() * dec.tan(), h.sin()),
            Self::ME => (h.sin() * dec.tan(), h.cos()),
            Self::TF => (
                lat.cos() * h.sin() / dec.cos(),
                lat.cos() * h.cos() * dec.sin() - lat.sin() * dec.cos(),
            ),
            Self::FO => (0.0, h.cos()),
            Self::DAF => (-(lat.cos() * h.cos() + lat.sin() * dec.tan()), 0.0),
            Self::LH => (h, 0.0),
            Self::LD => (0.0, dec),
        }
    }
}

/// Bitmask of enabled terms (`ModelConf` in model files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfig(u32);

impl ModelConfig {
    pub fn new(bits: u32) -> Result<Self, CoreError> {
        let all = (1u32 << Term::COUNT) - 1;
        if bits == 0 || bits & !all != 0 {
            return Err(CoreError::validation(format!(
                "model configuration {bits} must enable at least one of the {} terms and no others",
                Term::COUNT
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Enabled terms, in bit order.
    pub fn terms(self) -> Vec<Term> {
        Term::iter().filter(|t| self.0 & t.bit() != 0).collect()
    }

    /// Number of enabled terms (and of coefficients per pier side).
    pub fn term_count(self) -> usize {
        self.terms().len()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self(DEFAULT_MODEL_CONFIG)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_ten_terms_without_fork_flexure() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.term_count(), 10);
        assert!(!cfg.terms().contains(&Term::FO));
        assert_eq!(cfg.terms().first(), Some(&Term::IH));
        assert_eq!(cfg.terms().last(), Some(&Term::LD));
    }

    #[test]
    fn config_rejects_empty_and_unknown_bits() {
        assert!(ModelConfig::new(0).is_err());
        assert!(ModelConfig::new(1 << 11).is_err());
        assert_eq!(ModelConfig::new(2047).unwrap().term_count(), 11);
    }

    #[test]
    fn term_bits_match_repr() {
        assert_eq!(Term::from_repr(8), Some(Term::DAF));
        assert_eq!(Term::LD.bit(), 1024);
        assert_eq!(Term::DAF.to_string(), "DAF");
    }

    #[test]
    fn basis_on_meridian_at_equator() {
        let lat = 49.26_f64.to_radians();
        let (ra, dec) = Term::ME.basis(0.0, 0.0, lat);
        assert!(ra.abs() < 1e-12);
        assert!((dec - 1.0).abs() < 1e-12);
        let (ra, _) = Term::CH.basis(0.0, 0.0, lat);
        assert!((ra - 1.0).abs() < 1e-12);
    }
}
