// ── `.xtpm` model files ──
//
// <xtpm version="1.0">
//   <ModelConf>1919</ModelConf>
//   <GeoLat>49.261872611</GeoLat>
//   <ModelParamWest>c0 c1 ...</ModelParamWest>
//   <ModelParamEast>c0 c1 ...</ModelParamEast>
// </xtpm>

use std::fmt::Display;
use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::info;

use super::PointingModel;
use super::terms::ModelConfig;
use crate::error::CoreError;

const ROOT: &str = "xtpm";
const FORMAT_VERSION: &str = "1.0";

fn model_error(path: &Path, reason: impl Display) -> CoreError {
    CoreError::ModelFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn xml_err(e: impl Display) -> CoreError {
    CoreError::Internal(format!("XML write failed: {e}"))
}

/// Serialize a model to XML.
pub fn to_xml(model: &PointingModel) -> Result<String, CoreError> {
    model.validate()?;
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new(ROOT).with_attributes([("version", FORMAT_VERSION)]),
        ))
        .map_err(xml_err)?;

    let fields = [
        ("ModelConf", model.config.bits().to_string()),
        ("GeoLat", model.latitude.to_string()),
        ("ModelParamWest", join(&model.west)),
        ("ModelParamEast", join(&model.east)),
    ];
    for (name, text) in &fields {
        writer
            .write_event(Event::Start(BytesStart::new(*name)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(*name)))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(ROOT)))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| CoreError::Internal(format!("XML is not UTF-8: {e}")))
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a model from XML. `path` only labels errors.
pub fn from_xml(xml: &str, path: &Path) -> Result<PointingModel, CoreError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_root = false;
    let mut current: Option<String> = None;
    let mut config: Option<u32> = None;
    let mut latitude: Option<f64> = None;
    let mut west: Option<Vec<f64>> = None;
    let mut east: Option<Vec<f64>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == ROOT {
                    saw_root = true;
                }
                current = Some(name);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| model_error(path, e))?;
                let text = text.trim();
                match current.as_deref() {
                    Some("ModelConf") => {
                        config = Some(text.parse().map_err(|e| model_error(path, format!("ModelConf: {e}")))?);
                    }
                    Some("GeoLat") => {
                        latitude = Some(text.parse().map_err(|e| model_error(path, format!("GeoLat: {e}")))?);
                    }
                    Some("ModelParamWest") => west = Some(parse_floats(text, "ModelParamWest", path)?),
                    Some("ModelParamEast") => east = Some(parse_floats(text, "ModelParamEast", path)?),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(model_error(path, e)),
        }
    }

    if !saw_root {
        return Err(model_error(path, format!("missing <{ROOT}> root element")));
    }
    let missing = |field: &str| model_error(path, format!("missing <{field}>"));
    let config = ModelConfig::new(config.ok_or_else(|| missing("ModelConf"))?)?;
    let model = PointingModel {
        config,
        latitude: latitude.ok_or_else(|| missing("GeoLat"))?,
        // An empty element produces no Text event.
        west: west.unwrap_or_default(),
        east: east.unwrap_or_default(),
    };
    model.validate().map_err(|e| model_error(path, e))?;
    Ok(model)
}

fn parse_floats(text: &str, field: &str, path: &Path) -> Result<Vec<f64>, CoreError> {
    text.split_whitespace()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| model_error(path, format!("{field}: '{s}': {e}")))
        })
        .collect()
}

/// Write a model file.
pub fn write_model(path: &Path, model: &PointingModel) -> Result<(), CoreError> {
    let xml = to_xml(model)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| model_error(path, e))?;
    }
    std::fs::write(path, xml).map_err(|e| model_error(path, e))?;
    info!(path = %path.display(), "pointing model written");
    Ok(())
}

/// Read a model file.
pub fn read_model(path: &Path) -> Result<PointingModel, CoreError> {
    let xml = std::fs::read_to_string(path).map_err(|e| model_error(path, e))?;
    from_xml(&xml, path)
}
