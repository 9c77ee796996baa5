//! Upload validation

use serde::Serialize;

use super::models::Criticality;
use super::AnalysisError;

/// Accepted upload extensions
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Xml,
    Bin,
    Dat,
    Txt,
}

impl FileKind {
    pub const SUPPORTED: [&'static str; 5] = ["csv", "xml", "bin", "dat", "txt"];

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xml" => Some(Self::Xml),
            "bin" => Some(Self::Bin),
            "dat" => Some(Self::Dat),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

/// Check a file name against the extension allow-list
///
/// Only the extension is inspected; content is not checked against it.
pub fn validate_file_name(name: &str) -> Result<FileKind, AnalysisError> {
    if name.trim().is_empty() {
        return Err(AnalysisError::MissingFile);
    }

    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    FileKind::from_extension(ext)
        .ok_or_else(|| AnalysisError::UnsupportedFileType(name.to_string()))
}

pub fn is_supported(name: &str) -> bool {
    validate_file_name(name).is_ok()
}

/// Validated upload, consumed by the classifier
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    file_name: String,
    file_kind: FileKind,
    content: String,
    asset_id: String,
    criticality: Criticality,
}

impl AnalysisRequest {
    pub fn new(
        file_name: &str,
        bytes: &[u8],
        asset_id: &str,
        criticality: Criticality,
    ) -> Result<Self, AnalysisError> {
        let file_kind = validate_file_name(file_name)?;

        let asset_id = asset_id.trim();
        if asset_id.is_empty() {
            return Err(AnalysisError::MissingSelection("asset".to_string()));
        }

        // Text regardless of declared extension
        let content = String::from_utf8_lossy(bytes).into_owned();
        if content.trim().is_empty() {
            return Err(AnalysisError::MissingFile);
        }

        Ok(Self {
            file_name: file_name.to_string(),
            file_kind,
            content,
            asset_id: asset_id.to_string(),
            criticality,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }

    pub fn meta(&self) -> RequestMeta {
        RequestMeta {
            file_name: self.file_name.clone(),
            file_kind: self.file_kind,
            content_bytes: self.content.len(),
            asset_id: self.asset_id.clone(),
            criticality: self.criticality,
        }
    }
}

/// Request metadata kept for the lifetime of a session
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestMeta {
    pub file_name: String,
    pub file_kind: FileKind,
    pub content_bytes: usize,
    pub asset_id: String,
    pub criticality: Criticality,
}
