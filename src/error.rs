use std::path::PathBuf;
use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Date error: {0}")]
    Date(String),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Export failed ({status}): {stderr}")]
    ExportFailed { status: String, stderr: String },

    #[error("Export reported success but did not create {0}")]
    MissingOutput(PathBuf),

    #[error("Export runtime not found at {0}")]
    RuntimeMissing(PathBuf),

    #[error("Workbook {path} is missing the '{sheet}' sheet")]
    MissingSheet { path: PathBuf, sheet: String },

    #[error("Excel read error: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("Workbook package error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Workbook XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed workbook: {0}")]
    Workbook(String),
}

impl From<quick_xml::events::attributes::AttrError> for ReportError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ReportError::Xml(quick_xml::Error::InvalidAttr(err))
    }
}

impl ReportError {
    /// True for the errors raised by the export step.
    pub fn is_export_failure(&self) -> bool {
        matches!(
            self,
            ReportError::Spawn { .. }
                | ReportError::ExportFailed { .. }
                | ReportError::MissingOutput(_)
                | ReportError::RuntimeMissing(_)
        )
    }
}
