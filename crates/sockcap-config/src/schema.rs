use std::path::PathBuf;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{CaptureConfig, CaptureMode, LogFormat, LogLevel, LoggingConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct CaptureConfigDocument {
    #[serde(default)]
    pub mode: CaptureModeDocument,
    #[serde(default)]
    pub dump_ssl_read: bool,
    #[serde(default)]
    pub dump_ssl_write: bool,
    #[serde(default)]
    pub dump_as_pcap: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default)]
    pub logging: LoggingConfigDocument,
}

impl From<&CaptureConfig> for CaptureConfigDocument {
    fn from(value: &CaptureConfig) -> Self {
        Self {
            mode: CaptureModeDocument::from(value.mode),
            dump_ssl_read: value.dump_ssl_read,
            dump_ssl_write: value.dump_ssl_write,
            dump_as_pcap: value.dump_as_pcap,
            output_dir: value.output_dir.clone(),
            file_prefix: value.file_prefix.clone(),
            mtu: value.mtu,
            logging: LoggingConfigDocument::from(&value.logging),
        }
    }
}

impl From<CaptureConfigDocument> for CaptureConfig {
    fn from(value: CaptureConfigDocument) -> Self {
        Self {
            mode: value.mode.into(),
            dump_ssl_read: value.dump_ssl_read,
            dump_ssl_write: value.dump_ssl_write,
            dump_as_pcap: value.dump_as_pcap,
            output_dir: value.output_dir,
            file_prefix: value.file_prefix,
            mtu: value.mtu,
            logging: value.logging.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CaptureModeDocument {
    #[default]
    Auto,
    None,
    Raw,
    Pcap,
}

impl From<CaptureMode> for CaptureModeDocument {
    fn from(value: CaptureMode) -> Self {
        match value {
            CaptureMode::Auto => Self::Auto,
            CaptureMode::None => Self::None,
            CaptureMode::Raw => Self::Raw,
            CaptureMode::Pcap => Self::Pcap,
        }
    }
}

impl From<CaptureModeDocument> for CaptureMode {
    fn from(value: CaptureModeDocument) -> Self {
        match value {
            CaptureModeDocument::Auto => Self::Auto,
            CaptureModeDocument::None => Self::None,
            CaptureModeDocument::Raw => Self::Raw,
            CaptureModeDocument::Pcap => Self::Pcap,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoggingConfigDocument {
    #[serde(default)]
    pub level: LogLevelDocument,
    #[serde(default)]
    pub format: LogFormatDocument,
}

impl From<&LoggingConfig> for LoggingConfigDocument {
    fn from(value: &LoggingConfig) -> Self {
        Self {
            level: LogLevelDocument::from(value.level),
            format: LogFormatDocument::from(value.format),
        }
    }
}

impl From<LoggingConfigDocument> for LoggingConfig {
    fn from(value: LoggingConfigDocument) -> Self {
        Self {
            level: value.level.into(),
            format: value.format.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LogLevelDocument {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LogLevelDocument {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::Trace,
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warn => Self::Warn,
            LogLevel::Error => Self::Error,
        }
    }
}

impl From<LogLevelDocument> for LogLevel {
    fn from(value: LogLevelDocument) -> Self {
        match value {
            LogLevelDocument::Trace => Self::Trace,
            LogLevelDocument::Debug => Self::Debug,
            LogLevelDocument::Info => Self::Info,
            LogLevelDocument::Warn => Self::Warn,
            LogLevelDocument::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LogFormatDocument {
    Json,
    Pretty,
    #[default]
    Compact,
}

impl From<LogFormat> for LogFormatDocument {
    fn from(value: LogFormat) -> Self {
        match value {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

impl From<LogFormatDocument> for LogFormat {
    fn from(value: LogFormatDocument) -> Self {
        match value {
            LogFormatDocument::Json => Self::Json,
            LogFormatDocument::Pretty => Self::Pretty,
            LogFormatDocument::Compact => Self::Compact,
        }
    }
}

pub fn json_schema() -> JsonValue {
    serde_json::to_value(schema_for!(CaptureConfigDocument)).unwrap_or(JsonValue::Null)
}

fn default_output_dir() -> PathBuf {
    CaptureConfig::default().output_dir
}

fn default_file_prefix() -> String {
    CaptureConfig::default().file_prefix
}

fn default_mtu() -> usize {
    CaptureConfig::default().mtu
}

#[cfg(test)]
mod tests {
    use super::json_schema;

    #[test]
    fn schema_lists_every_top_level_field() {
        let schema = json_schema();
        let properties = schema
            .get("properties")
            .and_then(|value| value.as_object())
            .expect("schema should expose properties");
        for field in [
            "mode",
            "dump_ssl_read",
            "dump_ssl_write",
            "dump_as_pcap",
            "output_dir",
            "file_prefix",
            "mtu",
            "logging",
        ] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }
}
