// ── Exposure requests ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

const MAX_BINNING: u32 = 64;

/// Longest exposure or pre-exposure delay accepted, in seconds (one day).
pub const MAX_EXPOSURE_SECONDS: f64 = 86_400.0;

/// Frame type, written to `CCD_FRAME_TYPE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameType {
    #[default]
    Light,
    Bias,
    Dark,
    Flat,
}

impl FrameType {
    /// Title-case name used in image headers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Bias => "Bias",
            Self::Dark => "Dark",
            Self::Flat => "Flat",
        }
    }
}

/// Where finished frames go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadMode {
    /// The image is delivered to this client.
    #[default]
    Client,
    /// The server writes the image to its own disk.
    Server,
    ServerAndClient,
}

impl UploadMode {
    /// `CCD_UPLOAD_MODE` element for this mode.
    pub fn element(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Server => "LOCAL",
            Self::ServerAndClient => "BOTH",
        }
    }

    pub fn to_client(self) -> bool {
        matches!(self, Self::Client | Self::ServerAndClient)
    }

    pub fn to_server(self) -> bool {
        matches!(self, Self::Server | Self::ServerAndClient)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binning {
    pub x: u32,
    pub y: u32,
}

impl Default for Binning {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

impl std::fmt::Display for Binning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

impl std::str::FromStr for Binning {
    type Err = CoreError;

    /// Accepts `2` or `2x1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| CoreError::validation(format!("invalid binning '{s}'")))
        };
        let binning = match s.split_once(['x', 'X']) {
            Some((x, y)) => Self { x: parse(x)?, y: parse(y)? },
            None => {
                let v = parse(s)?;
                Self { x: v, y: v }
            }
        };
        binning.validate()?;
        Ok(binning)
    }
}

impl Binning {
    pub fn validate(self) -> Result<(), CoreError> {
        for (axis, v) in [("x", self.x), ("y", self.y)] {
            if !(1..=MAX_BINNING).contains(&v) {
                return Err(CoreError::validation(format!(
                    "binning {axis} must lie in 1..={MAX_BINNING}, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// One acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureRequest {
    /// Seconds.
    pub exposure_time: f64,
    pub binning: Binning,
    pub frame_type: FrameType,
    pub count: u32,
    /// Seconds to wait before each exposure.
    pub delay: f64,
    pub upload_mode: UploadMode,
    /// Directory on the server for server-side uploads.
    pub server_upload_dir: String,
    pub filename_template: Option<String>,
    pub object: Option<String>,
}

impl Default for ExposureRequest {
    fn default() -> Self {
        Self {
            exposure_time: 1.0,
            binning: Binning::default(),
            frame_type: FrameType::Light,
            count: 1,
            delay: 0.0,
            upload_mode: UploadMode::Client,
            server_upload_dir: String::new(),
            filename_template: None,
            object: None,
        }
    }
}

impl ExposureRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=MAX_EXPOSURE_SECONDS).contains(&self.exposure_time) {
            return Err(CoreError::validation(format!(
                "exposure time must be between 0 and {MAX_EXPOSURE_SECONDS} seconds, got {}",
                self.exposure_time
            )));
        }
        if !(0.0..=MAX_EXPOSURE_SECONDS).contains(&self.delay) {
            return Err(CoreError::validation(format!(
                "exposure delay must be between 0 and {MAX_EXPOSURE_SECONDS} seconds, got {}",
                self.delay
            )));
        }
        if self.count == 0 {
            return Err(CoreError::validation("exposure count must be at least 1"));
        }
        self.binning.validate()?;
        if self.upload_mode.to_server() && self.server_upload_dir.trim().is_empty() {
            return Err(CoreError::validation(
                "server uploads need a server upload directory",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn binning_parses() {
        assert_eq!("2".parse::<Binning>().unwrap(), Binning { x: 2, y: 2 });
        assert_eq!("3x1".parse::<Binning>().unwrap(), Binning { x: 3, y: 1 });
        assert!("0".parse::<Binning>().is_err());
        assert!("65x1".parse::<Binning>().is_err());
        assert!("axb".parse::<Binning>().is_err());
        assert_eq!(Binning { x: 2, y: 1 }.to_string(), "2x1");
    }

    #[test]
    fn request_validation() {
        assert!(ExposureRequest::default().validate().is_ok());
        let longest = ExposureRequest {
            exposure_time: MAX_EXPOSURE_SECONDS,
            delay: MAX_EXPOSURE_SECONDS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());

        let bad = [
            ExposureRequest { exposure_time: -1.0, ..Default::default() },
            ExposureRequest { exposure_time: f64::NAN, ..Default::default() },
            ExposureRequest { exposure_time: 1e20, ..Default::default() },
            ExposureRequest { exposure_time: MAX_EXPOSURE_SECONDS + 1.0, ..Default::default() },
            ExposureRequest { delay: -0.5, ..Default::default() },
            ExposureRequest { delay: f64::INFINITY, ..Default::default() },
            ExposureRequest { delay: 1e20, ..Default::default() },
            ExposureRequest { count: 0, ..Default::default() },
            ExposureRequest { binning: Binning { x: 1, y: 0 }, ..Default::default() },
            ExposureRequest { upload_mode: UploadMode::Server, ..Default::default() },
        ];
        for req in bad {
            assert!(
                matches!(req.validate(), Err(CoreError::ValidationFailed { .. })),
                "{req:?}"
            );
        }
    }

    #[test]
    fn upload_mode_routing() {
        assert_eq!(UploadMode::Server.element(), "LOCAL");
        assert!(UploadMode::ServerAndClient.to_client());
        assert!(UploadMode::ServerAndClient.to_server());
        assert!(!UploadMode::Client.to_server());
        assert_eq!(
            "server_and_client".parse::<UploadMode>().unwrap(),
            UploadMode::ServerAndClient
        );
        assert_eq!(FrameType::Dark.to_string(), "DARK");
        assert_eq!(FrameType::Dark.label(), "Dark");
    }
}
