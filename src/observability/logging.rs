//! Structured logging configuration.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Default filter when nothing else is configured.
const DEFAULT_FILTER: &str = "warn";

/// Filter used for `--verbose`.
const VERBOSE_FILTER: &str = "ifc_chat=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Optional log file; stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Clone for LoggingConfig {
    fn clone(&self) -> Self {
        Self {
            format: self.format,
            filter: EnvFilter::new(self.filter.to_string()),
            file: self.file.clone(),
        }
    }
}

impl LoggingConfig {
    /// Builds the logging config from file settings with environment overrides.
    ///
    /// Precedence for each field: `IFC_CHAT_LOG*` environment variables, then the
    /// config file, then defaults. `verbose` raises the default filter only.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let env_level = std::env::var("IFC_CHAT_LOG").ok();
        let env_format = std::env::var("IFC_CHAT_LOG_FORMAT").ok();
        let env_file = std::env::var("IFC_CHAT_LOG_FILE").ok();
        Self::resolve(
            settings,
            verbose,
            env_level.as_deref(),
            env_format.as_deref(),
            env_file.as_deref(),
        )
    }

    fn resolve(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        env_level: Option<&str>,
        env_format: Option<&str>,
        env_file: Option<&str>,
    ) -> Self {
        let default_level = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        let level = env_level
            .filter(|v| !v.trim().is_empty())
            .or_else(|| settings.and_then(|s| s.level.as_deref()))
            .unwrap_or(default_level);
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(default_level));

        let format = env_format
            .and_then(LogFormat::parse)
            .or_else(|| {
                settings
                    .and_then(|s| s.format.as_deref())
                    .and_then(LogFormat::parse)
            })
            .unwrap_or_default();

        let file = env_file
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        Self {
            format,
            filter,
            file,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::resolve(None, false, None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", Some(LogFormat::Json))]
    #[test_case("JSON", Some(LogFormat::Json))]
    #[test_case("pretty", Some(LogFormat::Pretty))]
    #[test_case("text", Some(LogFormat::Pretty))]
    #[test_case("xml", None)]
    fn test_log_format_parse(input: &str, expected: Option<LogFormat>) {
        assert_eq!(LogFormat::parse(input), expected);
    }

    #[test]
    fn test_env_overrides_settings() {
        let settings = LoggingSettings {
            level: Some("info".to_string()),
            format: Some("pretty".to_string()),
            file: Some(PathBuf::from("/tmp/from-file.log")),
        };
        let config = LoggingConfig::resolve(
            Some(&settings),
            false,
            Some("debug"),
            Some("json"),
            Some("/tmp/from-env.log"),
        );
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.to_string(), "debug");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/from-env.log")));
    }

    #[test]
    fn test_settings_used_without_env() {
        let settings = LoggingSettings {
            level: Some("info".to_string()),
            format: Some("json".to_string()),
            file: None,
        };
        let config = LoggingConfig::resolve(Some(&settings), true, None, None, None);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.to_string(), "info");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_verbose_default() {
        let config = LoggingConfig::resolve(None, true, None, None, None);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.filter.to_string().contains("ifc_chat=debug"));
    }
}
