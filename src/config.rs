//! Pipeline configuration
//!
//! Loaded from an optional YAML file, then overridden field by field from CLI
//! flags and environment variables. Everything is validated once up front.

use crate::error::{ReportError, ReportResult};
use crate::types::TimeOfDay;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_OFFICE_PROGRAM: &str = "libreoffice";

/// Identity passed to the export tool. Never printed in plaintext.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub api_key_id: String,
    pub api_key: String,
    pub org_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_id", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("org_id", &self.org_id)
            .finish()
    }
}

impl Credentials {
    /// Values that must never reach a log line.
    pub fn secrets(&self) -> Vec<String> {
        vec![self.api_key_id.clone(), self.api_key.clone()]
    }
}

/// Dated workbook file naming: `<prefix>_MMDDYY.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingScheme {
    pub prefix: String,
    pub extension: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            prefix: "3895th".to_string(),
            extension: "xlsx".to_string(),
        }
    }
}

impl NamingScheme {
    pub fn file_name(&self, token: &str) -> String {
        format!("{}_{}.{}", self.prefix, token, self.extension)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    pub export_script: PathBuf,
    pub credentials: Credentials,
    pub timezone: String,
    pub export_start: TimeOfDay,
    pub export_end: TimeOfDay,
    pub office_program: String,
    pub naming: NamingScheme,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::new(),
            export_script: PathBuf::new(),
            credentials: Credentials::default(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            export_start: TimeOfDay::DEFAULT_START,
            export_end: TimeOfDay::DEFAULT_END,
            office_program: DEFAULT_OFFICE_PROGRAM.to_string(),
            naming: NamingScheme::default(),
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub work_dir: Option<PathBuf>,
    pub export_script: Option<PathBuf>,
    pub api_key_id: Option<String>,
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub timezone: Option<String>,
    pub export_start: Option<TimeOfDay>,
    pub export_end: Option<TimeOfDay>,
    pub office_program: Option<String>,
}

impl PipelineConfig {
    pub fn from_yaml_str(content: &str) -> ReportResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> ReportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load the optional file, apply overrides, validate.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> ReportResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        config.make_paths_absolute()?;
        Ok(config)
    }

    /// Resolve `work_dir` and `export_script` against the current directory,
    /// since the export tool runs from its own directory.
    pub fn make_paths_absolute(&mut self) -> ReportResult<()> {
        self.work_dir = std::path::absolute(&self.work_dir)?;
        self.export_script = std::path::absolute(&self.export_script)?;
        Ok(())
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.work_dir {
            self.work_dir = v;
        }
        if let Some(v) = overrides.export_script {
            self.export_script = v;
        }
        if let Some(v) = overrides.api_key_id {
            self.credentials.api_key_id = v;
        }
        if let Some(v) = overrides.api_key {
            self.credentials.api_key = v;
        }
        if let Some(v) = overrides.org_id {
            self.credentials.org_id = v;
        }
        if let Some(v) = overrides.timezone {
            self.timezone = v;
        }
        if let Some(v) = overrides.export_start {
            self.export_start = v;
        }
        if let Some(v) = overrides.export_end {
            self.export_end = v;
        }
        if let Some(v) = overrides.office_program {
            self.office_program = v;
        }
    }

    pub fn validate(&self) -> ReportResult<()> {
        let mut missing = Vec::new();
        if self.work_dir.as_os_str().is_empty() {
            missing.push("work_dir");
        }
        if self.export_script.as_os_str().is_empty() {
            missing.push("export_script");
        }
        if self.credentials.api_key_id.is_empty() {
            missing.push("credentials.api_key_id");
        }
        if self.credentials.api_key.is_empty() {
            missing.push("credentials.api_key");
        }
        if self.credentials.org_id.is_empty() {
            missing.push("credentials.org_id");
        }
        if !missing.is_empty() {
            return Err(ReportError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        self.tz()?;

        if self.export_end <= self.export_start {
            return Err(ReportError::Config(format!(
                "export_end ({}) must be later than export_start ({})",
                self.export_end, self.export_start
            )));
        }
        if self.naming.prefix.is_empty() || self.naming.extension.is_empty() {
            return Err(ReportError::Config(
                "naming prefix and extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tz(&self) -> ReportResult<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            ReportError::Config(format!("unknown time zone '{}': {}", self.timezone, e))
        })
    }

    /// Directory holding the export tool; also its working directory.
    pub fn export_tool_dir(&self) -> PathBuf {
        self.export_script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_YAML: &str = r#"
work_dir: /var/lib/report
export_script: /opt/vde/vde.py
credentials:
  api_key_id: key-id-123
  api_key: secret-456
  org_id: org-789
timezone: America/Chicago
export_start: "6:30"
export_end: "18:00"
"#;

    #[test]
    fn test_parse_full_yaml() {
        let config = PipelineConfig::from_yaml_str(FULL_YAML).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/var/lib/report"));
        assert_eq!(config.credentials.org_id, "org-789");
        assert_eq!(config.export_start.to_string(), "6:30");
        assert_eq!(config.office_program, DEFAULT_OFFICE_PROGRAM);
        assert_eq!(config.naming, NamingScheme::default());
        config.validate().unwrap();
        assert_eq!(config.tz().unwrap(), chrono_tz::America::Chicago);
        assert_eq!(config.export_tool_dir(), PathBuf::from("/opt/vde"));
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.export_start.to_string(), "7:00");
        assert_eq!(config.export_end.to_string(), "19:00");
    }

    #[test]
    fn test_missing_required_fields() {
        let err = PipelineConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("work_dir"));
        assert!(msg.contains("credentials.api_key"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = PipelineConfig::from_yaml_str(FULL_YAML).unwrap();
        config.apply(ConfigOverrides {
            api_key: Some("from-env".to_string()),
            timezone: Some("UTC".to_string()),
            ..Default::default()
        });
        assert_eq!(config.credentials.api_key, "from-env");
        assert_eq!(config.credentials.api_key_id, "key-id-123");
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_load_makes_relative_paths_absolute() {
        let config = PipelineConfig::load(
            None,
            ConfigOverrides {
                work_dir: Some(PathBuf::from("work")),
                export_script: Some(PathBuf::from("tool/vde.py")),
                api_key_id: Some("key-id".to_string()),
                api_key: Some("secret".to_string()),
                org_id: Some("org".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.work_dir, cwd.join("work"));
        assert_eq!(config.export_script, cwd.join("tool/vde.py"));
        assert!(config.export_tool_dir().is_absolute());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let mut config = PipelineConfig::from_yaml_str(FULL_YAML).unwrap();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.validate(), Err(ReportError::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_window() {
        let mut config = PipelineConfig::from_yaml_str(FULL_YAML).unwrap();
        config.export_end = "6:00".parse().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_time_string_fails_to_parse() {
        let yaml = FULL_YAML.replace("\"6:30\"", "\"noon\"");
        assert!(PipelineConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = PipelineConfig::from_yaml_str(FULL_YAML).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-456"));
        assert!(!debug.contains("key-id-123"));
        assert!(debug.contains("org-789"));
    }

    #[test]
    fn test_naming_scheme_file_name() {
        assert_eq!(NamingScheme::default().file_name("070224"), "3895th_070224.xlsx");
    }
}
