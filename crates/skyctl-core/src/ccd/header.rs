// ── Image header keywords ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::ExposureRequest;
use crate::model::{Property, short_name};

/// One header card: keyword and its already formatted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    pub keyword: String,
    pub value: String,
}

fn field(keyword: &str, value: impl Into<String>) -> HeaderField {
    HeaderField {
        keyword: keyword.to_owned(),
        value: value.into(),
    }
}

/// FITS string values are quoted and padded to at least 8 characters.
fn fits_string(s: &str) -> String {
    format!("'{s:<8}'")
}

/// Header keywords for one client-side frame.
///
/// `ccd_info` supplies the sensor size (`CCD_INFO.WIDTH`/`HEIGHT`);
/// the axis lengths are omitted when the device does not publish it.
pub fn build_header(
    device: &str,
    ccd_info: Option<&Property>,
    request: &ExposureRequest,
    date_obs: Option<DateTime<Utc>>,
) -> Vec<HeaderField> {
    let mut fields = vec![field("INSTRUME", format!("'{}'", short_name(device)))];

    if let Some(info) = ccd_info {
        let axes = [
            ("NAXIS1", "WIDTH", request.binning.x),
            ("NAXIS2", "HEIGHT", request.binning.y),
        ];
        for (keyword, element, bin) in axes {
            if let Some(size) = info.number(element) {
                #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
                let binned = (size / f64::from(bin)).floor() as i64;
                fields.push(field(keyword, binned.to_string()));
            }
        }
    }

    fields.push(field("EXPTIME", format!("{:.2}", request.exposure_time)));
    fields.push(field("XBINNING", request.binning.x.to_string()));
    fields.push(field("YBINNING", request.binning.y.to_string()));
    fields.push(field("IMAGETYP", fits_string(request.frame_type.label())));

    if let Some(object) = request.object.as_deref().filter(|o| !o.is_empty()) {
        fields.push(field("OBJECT", fits_string(object)));
    }
    if let Some(t) = date_obs {
        fields.push(field(
            "DATE-OBS",
            format!("'{}'", t.format("%Y-%m-%dT%H:%M:%S%.3f")),
        ));
    }
    fields
}

/// Value of `keyword`, if present.
pub fn lookup<'a>(header: &'a [HeaderField], keyword: &str) -> Option<&'a str> {
    header
        .iter()
        .find(|f| f.keyword == keyword)
        .map(|f| f.value.as_str())
}
