use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use sockcap_packet::{PacketError, SegmentPolicy};
use thiserror::Error;

mod schema;

pub use schema::json_schema;

pub const DEFAULT_FILE_PREFIX: &str = "sockcap";
const PCAP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %Hh%Mm%Ss";

/// Top-level typed capture configuration contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    pub dump_ssl_read: bool,
    pub dump_ssl_write: bool,
    pub dump_as_pcap: bool,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub mtu: usize,
    pub logging: LoggingConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Auto,
            dump_ssl_read: false,
            dump_ssl_write: false,
            dump_as_pcap: false,
            output_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.to_owned(),
            mtu: SegmentPolicy::DEFAULT_MTU,
            logging: LoggingConfig::default(),
        }
    }
}

impl CaptureConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let document: schema::CaptureConfigDocument =
            serde_yaml::from_str(text).map_err(ConfigError::ParseConfig)?;
        let config = Self::from(document);
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        let document = schema::CaptureConfigDocument::from(self);
        serde_yaml::to_string(&document).map_err(ConfigError::SerializeConfig)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        SegmentPolicy::new(self.mtu)?;
        validate_file_prefix(&self.file_prefix)?;
        Ok(())
    }

    /// Decides, once, which capture variant this configuration selects.
    ///
    /// `auto` follows the toggles: PCAP when `dump_as_pcap` is set, raw when
    /// either SSL dump toggle is set, otherwise none. An explicit mode that
    /// contradicts the toggles is rejected.
    pub fn resolve(&self) -> Result<ResolvedCapture, ConfigError> {
        self.validate()?;

        let any_ssl = self.dump_ssl_read || self.dump_ssl_write;
        let capture_type = match self.mode {
            CaptureMode::Auto if self.dump_as_pcap => CaptureType::Pcap,
            CaptureMode::Auto if any_ssl => CaptureType::Raw,
            CaptureMode::Auto => CaptureType::None,
            CaptureMode::None if self.dump_as_pcap => {
                return Err(mismatch(self.mode, "dump_as_pcap is set"));
            }
            CaptureMode::None => CaptureType::None,
            CaptureMode::Raw if self.dump_as_pcap => {
                return Err(mismatch(self.mode, "dump_as_pcap is set"));
            }
            CaptureMode::Raw if !any_ssl => {
                return Err(mismatch(
                    self.mode,
                    "neither dump_ssl_read nor dump_ssl_write is set",
                ));
            }
            CaptureMode::Raw => CaptureType::Raw,
            CaptureMode::Pcap if !self.dump_as_pcap => {
                return Err(mismatch(self.mode, "dump_as_pcap is not set"));
            }
            CaptureMode::Pcap => CaptureType::Pcap,
        };

        Ok(ResolvedCapture {
            capture_type,
            dump_ssl_read: self.dump_ssl_read,
            dump_ssl_write: self.dump_ssl_write,
            policy: SegmentPolicy::new(self.mtu)?,
            output_dir: self.output_dir.clone(),
            file_prefix: self.file_prefix.clone(),
        })
    }
}

/// Requested capture mode as written in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    #[default]
    Auto,
    None,
    Raw,
    Pcap,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::None => "none",
            Self::Raw => "raw",
            Self::Pcap => "pcap",
        })
    }
}

/// The capture variant a logger implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureType {
    None,
    Raw,
    Pcap,
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Raw => "raw",
            Self::Pcap => "pcap",
        })
    }
}

/// Outcome of [`CaptureConfig::resolve`]: everything a logger factory needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapture {
    pub capture_type: CaptureType,
    pub dump_ssl_read: bool,
    pub dump_ssl_write: bool,
    pub policy: SegmentPolicy,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl ResolvedCapture {
    #[must_use]
    pub fn raw_read_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_read.bin", self.file_prefix))
    }

    #[must_use]
    pub fn raw_write_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_write.bin", self.file_prefix))
    }

    #[must_use]
    pub fn pcap_path_now(&self) -> PathBuf {
        self.pcap_path_at(&Local::now())
    }

    #[must_use]
    pub fn pcap_path_at<Tz>(&self, time: &DateTime<Tz>) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.output_dir
            .join(pcap_file_name(&self.file_prefix, time))
    }
}

/// `<prefix> <YYYY-MM-DD HHhMMmSSs>.pcap`
#[must_use]
pub fn pcap_file_name<Tz>(prefix: &str, time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{prefix} {}.pcap", time.format(PCAP_TIMESTAMP_FORMAT))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string accepted by an env-filter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

fn validate_file_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.trim().is_empty() {
        return Err(ConfigError::EmptyFilePrefix);
    }
    if prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
        return Err(ConfigError::InvalidFilePrefix {
            prefix: prefix.to_owned(),
        });
    }
    Ok(())
}

fn mismatch(mode: CaptureMode, reason: &'static str) -> ConfigError {
    ConfigError::ConfigurationMismatch { mode, reason }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{}`: {source}", path.display())]
    ReadConfig { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    ParseConfig(serde_yaml::Error),

    #[error("failed to serialize config: {0}")]
    SerializeConfig(serde_yaml::Error),

    #[error(transparent)]
    InvalidMtu(#[from] PacketError),

    #[error("file_prefix must not be empty")]
    EmptyFilePrefix,

    #[error("file_prefix `{prefix}` must be a plain file name")]
    InvalidFilePrefix { prefix: String },

    #[error("capture mode `{mode}` conflicts with toggles: {reason}")]
    ConfigurationMismatch {
        mode: CaptureMode,
        reason: &'static str,
    },
}
