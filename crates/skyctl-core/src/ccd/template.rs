// ── Filename templates ──
//
// %f  frame type, upper case
// %b  binning as <x>x<y>
// %e  exposure time, 3 decimals
// %n  1-based frame index, 3 digits
// %%  literal percent

use super::request::{Binning, FrameType};
use crate::error::CoreError;

pub const DEFAULT_TEMPLATE: &str = "%f_B%b_E%e_%n";

/// Values substituted into a template for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub frame_type: FrameType,
    pub binning: Binning,
    pub exposure_time: f64,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate(String);

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_owned())
    }
}

impl FilenameTemplate {
    /// Parse and check a template. Unknown placeholders are rejected.
    pub fn new(template: impl Into<String>) -> Result<Self, CoreError> {
        let template = Self(template.into());
        if template.0.is_empty() {
            return Err(CoreError::validation("filename template is empty"));
        }
        template.render(&FrameContext {
            frame_type: FrameType::Light,
            binning: Binning::default(),
            exposure_time: 0.0,
            index: 1,
        })?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, ctx: &FrameContext) -> Result<String, CoreError> {
        let mut out = String::with_capacity(self.0.len() + 16);
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('f') => out.push_str(&ctx.frame_type.to_string()),
                Some('b') => out.push_str(&ctx.binning.to_string()),
                Some('e') => out.push_str(&format!("{:.3}", ctx.exposure_time)),
                Some('n') => out.push_str(&format!("{:03}", ctx.index)),
                Some('%') => out.push('%'),
                Some(other) => {
                    return Err(CoreError::validation(format!(
                        "unknown placeholder '%{other}' in filename template '{}'",
                        self.0
                    )));
                }
                None => {
                    return Err(CoreError::validation(format!(
                        "filename template '{}' ends with a lone '%'",
                        self.0
                    )));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx(frame_type: FrameType, exposure_time: f64, index: u32) -> FrameContext {
        FrameContext {
            frame_type,
            binning: Binning::default(),
            exposure_time,
            index,
        }
    }

    #[test]
    fn default_name() {
        let name = FilenameTemplate::default()
            .render(&ctx(FrameType::Light, 1.0, 1))
            .unwrap();
        assert_eq!(name, "LIGHT_B1x1_E1.000_001");
    }

    #[test]
    fn custom_prefix() {
        let template = FilenameTemplate::new("MyObject_%f_B%b_E%e_%n").unwrap();
        assert_eq!(
            template.render(&ctx(FrameType::Bias, 2.0, 1)).unwrap(),
            "MyObject_BIAS_B1x1_E2.000_001"
        );
        assert_eq!(
            template.render(&ctx(FrameType::Bias, 2.0, 2)).unwrap(),
            "MyObject_BIAS_B1x1_E2.000_002"
        );
    }

    #[test]
    fn literal_percent_and_wide_index() {
        let template = FilenameTemplate::new("100%%_%n").unwrap();
        assert_eq!(template.render(&ctx(FrameType::Flat, 0.5, 1234)).unwrap(), "100%_1234");
    }

    #[test]
    fn rejects_bad_templates() {
        assert!(FilenameTemplate::new("").is_err());
        assert!(FilenameTemplate::new("frame_%x").is_err());
        assert!(FilenameTemplate::new("frame_%").is_err());
    }
}
