// ── Least-squares model fit ──
//
// Each sync point contributes two equations (RA and Dec residual, in
// arcminutes) against the enabled basis terms. Pier sides are solved
// independently with an SVD pseudo-inverse.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use super::PointingModel;
use super::terms::ModelConfig;
use crate::astro;
use crate::error::CoreError;
use crate::mount::{PierSide, SyncPoint};

/// Points closer to the pole than this are skipped (secδ diverges).
const MAX_ABS_DEC: f64 = 89.0;
const SVD_EPS: f64 = 1e-12;

/// Fit a pointing model from sync points.
///
/// A pier side without any usable point keeps zero coefficients; a side
/// with too few points to determine every enabled term is an error.
pub fn fit(points: &[SyncPoint], latitude: f64, config: ModelConfig) -> Result<PointingModel, CoreError> {
    let mut model = PointingModel::new(config, latitude);
    model.west = fit_side(points, PierSide::West, latitude, config)?;
    model.east = fit_side(points, PierSide::East, latitude, config)?;
    Ok(model)
}

fn fit_side(points: &[SyncPoint], pier: PierSide, latitude: f64, config: ModelConfig) -> Result<Vec<f64>, CoreError> {
    let terms = config.terms();
    let k = terms.len();
    let usable: Vec<&SyncPoint> = points
        .iter()
        .filter(|p| p.pier_side == pier && p.celestial_dec.abs() <= MAX_ABS_DEC)
        .collect();

    if usable.is_empty() {
        warn!(%pier, "no sync points, coefficients left at zero");
        return Ok(vec![0.0; k]);
    }
    if usable.len() * 2 < k {
        return Err(CoreError::InsufficientSyncPoints {
            pier: pier.to_string(),
            needed: k.div_ceil(2),
            available: usable.len(),
        });
    }

    let lat = latitude.to_radians();
    let rows = usable.len() * 2;
    let mut a = DMatrix::<f64>::zeros(rows, k);
    let mut b = DVector::<f64>::zeros(rows);

    for (i, p) in usable.iter().enumerate() {
        let h = (astro::hour_angle(p.lst, p.celestial_ra) * 15.0).to_radians();
        let dec = p.celestial_dec.to_radians();
        for (j, term) in terms.iter().enumerate() {
            let (ra_basis, dec_basis) = term.basis(h, dec, lat);
            a[(2 * i, j)] = ra_basis;
            a[(2 * i + 1, j)] = dec_basis;
        }
        b[2 * i] = astro::range_shift(p.telescope_ra - p.celestial_ra) * 15.0 * 60.0;
        b[2 * i + 1] = (p.telescope_dec - p.celestial_dec) * 60.0;
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, SVD_EPS)
        .map_err(|e| CoreError::Internal(format!("SVD solve failed for {pier} side: {e}")))?;

    debug!(%pier, points = usable.len(), "pointing model side fitted");
    Ok(x.iter().copied().collect())
}
