//! Uploaded file ingestion
//!
//! Format detection by file extension, scoped transient storage, and the
//! XES, BPMN and PNML readers.

mod bpmn;
mod pnml;
mod upload;
mod xes;

pub use upload::ScopedUpload;

use crate::process::{EventLog, ModelFormat, ParsedModel};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Xes,
    XesGz,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type '{file_name}', expected {expected}")]
    UnsupportedExtension {
        file_name: String,
        expected: &'static str,
    },
    #[error("Uploaded file '{file_name}' is empty")]
    EmptyUpload { file_name: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid XML in '{file_name}' at byte {position}: {message}")]
    Xml {
        file_name: String,
        position: u64,
        message: String,
    },
    #[error("Malformed {format} file '{file_name}': {message}")]
    Malformed {
        format: &'static str,
        file_name: String,
        message: String,
    },
}

impl IngestError {
    /// Errors the user can fix by choosing another file; detected before any
    /// external call
    #[cfg(test)]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedExtension { .. } | IngestError::EmptyUpload { .. }
        )
    }
}

/// The multi-part extension of a file name, lowercased, with its dot
pub(crate) fn extension_suffix(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    [".xes.gz", ".xes", ".bpmn", ".pnml"]
        .into_iter()
        .find(|ext| lower.ends_with(ext))
        .unwrap_or("")
}

pub fn log_format(file_name: &str) -> Result<LogFormat, IngestError> {
    match extension_suffix(file_name) {
        ".xes.gz" => Ok(LogFormat::XesGz),
        ".xes" => Ok(LogFormat::Xes),
        _ => Err(IngestError::UnsupportedExtension {
            file_name: file_name.to_string(),
            expected: ".xes or .xes.gz",
        }),
    }
}

pub fn model_format(file_name: &str) -> Result<ModelFormat, IngestError> {
    match extension_suffix(file_name) {
        ".bpmn" => Ok(ModelFormat::Bpmn),
        ".pnml" => Ok(ModelFormat::Pnml),
        _ => Err(IngestError::UnsupportedExtension {
            file_name: file_name.to_string(),
            expected: ".bpmn or .pnml",
        }),
    }
}

fn ensure_not_empty(file_name: &str, bytes: &[u8]) -> Result<(), IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::EmptyUpload {
            file_name: file_name.to_string(),
        });
    }
    Ok(())
}

/// Check name and size of an event log upload without reading it
pub fn validate_log_upload(file_name: &str, bytes: &[u8]) -> Result<LogFormat, IngestError> {
    let format = log_format(file_name)?;
    ensure_not_empty(file_name, bytes)?;
    Ok(format)
}

/// Check name and size of a model upload without reading it
pub fn validate_model_upload(file_name: &str, bytes: &[u8]) -> Result<ModelFormat, IngestError> {
    let format = model_format(file_name)?;
    ensure_not_empty(file_name, bytes)?;
    Ok(format)
}

/// Consume a staged upload and parse it as an event log
pub fn read_event_log(upload: ScopedUpload) -> Result<EventLog, IngestError> {
    let format = log_format(upload.file_name())?;
    let (file_name, bytes) = upload.read_once()?;
    ensure_not_empty(&file_name, &bytes)?;
    let log = match format {
        LogFormat::Xes => xes::parse_xes(&file_name, bytes.as_slice())?,
        LogFormat::XesGz => xes::parse_xes(
            &file_name,
            std::io::BufReader::new(flate2::read::GzDecoder::new(bytes.as_slice())),
        )?,
    };
    tracing::info!(
        file_name = %file_name,
        traces = log.len(),
        activities = log.activities().len(),
        "Event log parsed"
    );
    Ok(log)
}

/// Consume a staged upload and parse it as a BPMN or PNML model
pub fn read_model(upload: ScopedUpload) -> Result<ParsedModel, IngestError> {
    let format = model_format(upload.file_name())?;
    let (file_name, bytes) = upload.read_once()?;
    ensure_not_empty(&file_name, &bytes)?;
    let model = match format {
        ModelFormat::Bpmn => ParsedModel::Bpmn(bpmn::parse_bpmn(&file_name, &bytes)?),
        ModelFormat::Pnml => ParsedModel::PetriNet(pnml::parse_pnml(&file_name, &bytes)?),
    };
    tracing::info!(file_name = %file_name, format = ?format, "Model parsed");
    Ok(model)
}

/// Parse bytes as BPMN without staging them
#[cfg(test)]
pub fn parse_bpmn_bytes(
    file_name: &str,
    bytes: &[u8],
) -> Result<crate::process::BpmnGraph, IngestError> {
    bpmn::parse_bpmn(file_name, bytes)
}

/// Parse bytes as PNML without staging them
#[cfg(test)]
pub fn parse_pnml_bytes(
    file_name: &str,
    bytes: &[u8],
) -> Result<crate::process::PetriNetWithMarkings, IngestError> {
    pnml::parse_pnml(file_name, bytes)
}

/// Shared helpers for the quick-xml based readers
mod xml {
    use super::IngestError;
    use quick_xml::events::BytesStart;
    use std::borrow::Cow;
    use std::collections::HashMap;

    /// UTF-8 bytes of a document, transcoding UTF-16 documents that start
    /// with a byte order mark
    pub fn decode(bytes: &[u8]) -> Cow<'_, [u8]> {
        let from_units = |be: bool| {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|c| {
                    if be {
                        u16::from_be_bytes([c[0], c[1]])
                    } else {
                        u16::from_le_bytes([c[0], c[1]])
                    }
                })
                .collect();
            Cow::Owned(String::from_utf16_lossy(&units).into_bytes())
        };
        match bytes {
            [0xFF, 0xFE, ..] => from_units(false),
            [0xFE, 0xFF, ..] => from_units(true),
            [0xEF, 0xBB, 0xBF, rest @ ..] => Cow::Borrowed(rest),
            _ => Cow::Borrowed(bytes),
        }
    }

    pub fn local_name(name: &[u8]) -> String {
        let local = name.rsplit(|b| *b == b':').next().unwrap_or(name);
        String::from_utf8_lossy(local).into_owned()
    }

    /// Attributes by local name, values unescaped
    pub fn attributes(
        element: &BytesStart<'_>,
        file_name: &str,
        position: u64,
    ) -> Result<HashMap<String, String>, IngestError> {
        let mut attrs = HashMap::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| error(file_name, position, &e))?;
            let key = local_name(attr.key.as_ref());
            let value = attr
                .unescape_value()
                .map_err(|e| error(file_name, position, &e))?;
            attrs.insert(key, value.into_owned());
        }
        Ok(attrs)
    }

    pub fn error(file_name: &str, position: u64, e: &dyn std::fmt::Display) -> IngestError {
        IngestError::Xml {
            file_name: file_name.to_string(),
            position,
            message: e.to_string(),
        }
    }
}
