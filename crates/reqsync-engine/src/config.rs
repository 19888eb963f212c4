//! Engine configuration and time source
//!
//! Configuration is optional. A scenario may carry
//! `requirements/reqsync.toml`; missing keys take their defaults.
//!
//! ```toml
//! update_statuses = true
//! sticky_complete = false
//! canonicalize = false
//! write_snapshot = true
//! append_log = true
//! max_file_size = 10485760
//! ```

use crate::error::ConfigError;
use chrono::{DateTime, SecondsFormat, Utc};
use reqsync_io::Reader;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Default cap on manifest and evidence file size (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Config file name looked up under `requirements/`
pub const CONFIG_FILE: &str = "reqsync.toml";

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Write declared statuses back from live evidence
    pub update_statuses: bool,
    /// Never demote a `complete` requirement to `in_progress`
    pub sticky_complete: bool,
    /// Rewrite every module in canonical form, even when unchanged
    pub canonicalize: bool,
    /// Persist `coverage/requirements-sync/latest.json`
    pub write_snapshot: bool,
    /// Append a record to `coverage/requirements-sync.log`
    pub append_log: bool,
    /// Files larger than this are refused
    pub max_file_size: u64,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With status write-back toggled
    #[inline]
    #[must_use]
    pub fn with_update_statuses(mut self, enabled: bool) -> Self {
        self.update_statuses = enabled;
        self
    }

    /// With sticky `complete`
    #[inline]
    #[must_use]
    pub fn with_sticky_complete(mut self, enabled: bool) -> Self {
        self.sticky_complete = enabled;
        self
    }

    /// With canonical rewrite of every module
    #[inline]
    #[must_use]
    pub fn with_canonicalize(mut self, enabled: bool) -> Self {
        self.canonicalize = enabled;
        self
    }

    /// With snapshot persistence toggled
    #[inline]
    #[must_use]
    pub fn with_snapshot(mut self, enabled: bool) -> Self {
        self.write_snapshot = enabled;
        self
    }

    /// With sync log toggled
    #[inline]
    #[must_use]
    pub fn with_log(mut self, enabled: bool) -> Self {
        self.append_log = enabled;
        self
    }

    /// With file size cap
    #[inline]
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Malformed TOML, unknown keys, or a zero size cap.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_file_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    /// Load from a file through the reader; `Ok(None)` when it does not exist
    ///
    /// # Errors
    /// Unreadable or invalid file.
    pub async fn load<R: Reader + ?Sized>(
        reader: &R,
        path: &Path,
    ) -> Result<Option<Self>, ConfigError> {
        let bytes = match reader.read_file(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let text = String::from_utf8(bytes).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(Some(config))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_statuses: true,
            sticky_complete: false,
            canonicalize: false,
            write_snapshot: true,
            append_log: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Source of "now" for timestamps written by the engine
pub trait Clock: Debug + Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as RFC 3339 with second precision
    fn timestamp(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqsync_io::MemoryFs;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!(config.update_statuses);
        assert!(!config.sticky_complete);
        assert!(!config.canonicalize);
        assert!(config.write_snapshot);
        assert!(config.append_log);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("sticky_complete = true\n").unwrap();
        assert!(config.sticky_complete);
        assert!(config.update_statuses);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_cap() {
        assert!(matches!(
            EngineConfig::from_toml_str("frobnicate = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_file_size = 0"),
            Err(ConfigError::Invalid { field: "max_file_size", .. })
        ));
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let fs = MemoryFs::new();
        let loaded = EngineConfig::load(&fs, Path::new("/s/requirements/reqsync.toml"))
            .await
            .unwrap();
        assert!(loaded.is_none());

        fs.insert_file("/s/requirements/reqsync.toml", "canonicalize = true\n");
        let loaded = EngineConfig::load(&fs, Path::new("/s/requirements/reqsync.toml"))
            .await
            .unwrap();
        assert_eq!(loaded, Some(EngineConfig::new().with_canonicalize(true)));
    }

    #[test]
    fn fixed_clock_renders_second_precision_utc() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap());
        assert_eq!(clock.timestamp(), "2026-10-19T08:30:00Z");
    }
}
