//! Configuration management.
//!
//! Configuration comes from a TOML file (explicit path, `IFC_CHAT_CONFIG_PATH`, or the
//! platform config directory) with environment overrides applied on top.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::{Error, Result};

/// Default class the flattener extracts.
pub const DEFAULT_TARGET_CLASS: &str = "IfcBuildingElement";

/// Default entity scope for stored handles.
pub const DEFAULT_ENTITY: &str = "default";

/// Instructions given to every newly created assistant.
pub const DEFAULT_INSTRUCTIONS: &str = "You are an AI assistant that will allow users to talk to their data-rich models. \
In the responses where you're running code, do not provide any additional response besides the code and the output of the code. \
I will provide you with json files that contain data that were either made from Speckle or from IfcOpenShell and you need to be able to read this data and perform analysis on it.";

/// First message of every new thread, sent with the model data attached.
pub const DEFAULT_SEED_MESSAGE: &str = "Here's some data in json format. It contains some data about a building, either structural, architectural or MEP-related.";

/// `${VAR}` references in config values.
static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap_or_else(|_| unreachable!()));

/// Main configuration for ifc-chat.
#[derive(Debug, Clone)]
pub struct IfcChatConfig {
    /// Directory for persistent state (handle store, session lock).
    pub data_dir: PathBuf,
    /// Directory for scratch output (model data JSON, reply images).
    pub scratch_dir: PathBuf,
    /// Entity scope the handle pair is stored under.
    pub entity: String,
    /// IFC class the flattener extracts.
    pub target_class: String,
    /// Assistant service configuration.
    pub assistant: AssistantConfig,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Assistant service configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// API key.
    pub api_key: Option<SecretString>,
    /// API base URL.
    pub base_url: String,
    /// Model identifier for new assistants.
    pub model: String,
    /// Fixed system instructions for new assistants.
    pub instructions: String,
    /// Text of the message that seeds each new thread.
    pub seed_message: String,
    /// Request timeout in milliseconds (0 disables it).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Delete the previous assistant and thread when a new model is uploaded.
    pub retire_previous_session: bool,
}

impl AssistantConfig {
    /// Default API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-2024-05-13";

    /// Default request timeout (runs with code execution can take minutes).
    pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            seed_message: DEFAULT_SEED_MESSAGE.to_string(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: Self::DEFAULT_CONNECT_TIMEOUT_MS,
            retire_previous_session: false,
        }
    }
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `ifc_chat=debug`.
    pub level: Option<String>,
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Scratch directory.
    pub scratch_dir: Option<String>,
    /// Entity scope.
    pub entity: Option<String>,
    /// Target IFC class.
    pub target_class: Option<String>,
    /// Assistant section.
    pub assistant: Option<ConfigFileAssistant>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Assistant section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAssistant {
    /// API key, may reference an environment variable as `${NAME}`.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// System instructions.
    pub instructions: Option<String>,
    /// Seed message.
    pub seed_message: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Retire the previous session on upload.
    pub retire_previous_session: Option<bool>,
}

impl Default for IfcChatConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ifc-chat"),
            scratch_dir: PathBuf::from(".ifc-chat").join("temp"),
            entity: DEFAULT_ENTITY.to_string(),
            target_class: DEFAULT_TARGET_CLASS.to_string(),
            assistant: AssistantConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl IfcChatConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses configuration from TOML content without applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML for [`ConfigFile`].
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`~/Library/Application Support/ifc-chat/` on
    /// macOS) and then `~/.config/ifc-chat/`. Falls back to defaults when neither
    /// holds a readable `config.toml`. Environment overrides are always applied.
    #[must_use]
    pub fn load_default() -> Self {
        let mut config = Self::default_locations()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::from_toml_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    );
                    None
                },
            })
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    /// Candidate config file paths, in lookup order.
    #[must_use]
    pub fn default_locations() -> Vec<PathBuf> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Vec::new();
        };
        vec![
            base_dirs.config_dir().join("ifc-chat").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("ifc-chat")
                .join("config.toml"),
        ]
    }

    /// Converts a `ConfigFile` to `IfcChatConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.scratch_dir = PathBuf::from(&data_dir).join("temp");
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(scratch_dir) = file.scratch_dir {
            config.scratch_dir = PathBuf::from(scratch_dir);
        }
        if let Some(entity) = file.entity.filter(|e| !e.trim().is_empty()) {
            config.entity = entity;
        }
        if let Some(class) = file.target_class.filter(|c| !c.trim().is_empty()) {
            config.target_class = class;
        }
        if let Some(assistant) = file.assistant {
            let target = &mut config.assistant;
            target.api_key = assistant
                .api_key
                .map(|key| expand_env_vars(&key))
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from);
            if let Some(base_url) = assistant.base_url {
                target.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(model) = assistant.model {
                target.model = model;
            }
            if let Some(instructions) = assistant.instructions {
                target.instructions = instructions;
            }
            if let Some(seed_message) = assistant.seed_message {
                target.seed_message = seed_message;
            }
            if let Some(timeout_ms) = assistant.timeout_ms {
                target.timeout_ms = timeout_ms;
            }
            if let Some(connect_timeout_ms) = assistant.connect_timeout_ms {
                target.connect_timeout_ms = connect_timeout_ms;
            }
            if let Some(retire) = assistant.retire_previous_session {
                target.retire_previous_session = retire;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Applies environment variable overrides.
    ///
    /// `OPENAI_API_KEY` only fills a key the file left unset; `IFC_CHAT_DATA_DIR`,
    /// `OPENAI_BASE_URL` and `IFC_CHAT_MODEL` always win.
    pub fn apply_env_overrides(&mut self) {
        if self.assistant.api_key.is_none() {
            self.assistant.api_key = env_value("OPENAI_API_KEY").map(SecretString::from);
        }
        if let Some(data_dir) = env_value("IFC_CHAT_DATA_DIR") {
            self.scratch_dir = PathBuf::from(&data_dir).join("temp");
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(base_url) = env_value("OPENAI_BASE_URL") {
            self.assistant.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_value("IFC_CHAT_MODEL") {
            self.assistant.model = model;
        }
    }

    /// Sets the data directory (scratch directory moves along).
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self.scratch_dir = self.data_dir.join("temp");
        self
    }

    /// Sets the entity scope.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Path of the flattened model data file.
    #[must_use]
    pub fn model_data_path(&self) -> PathBuf {
        self.scratch_dir.join("model_data.json")
    }

    /// Path of the handle store.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Path of the session lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("session.lock")
    }

    /// Renders the effective configuration as TOML-like text, API key redacted.
    #[must_use]
    pub fn describe(&self) -> String {
        let key = match &self.assistant.api_key {
            Some(key) if !key.expose_secret().is_empty() => "<set>",
            _ => "<unset>",
        };
        format!(
            "data_dir = \"{}\"\n\
             scratch_dir = \"{}\"\n\
             entity = \"{}\"\n\
             target_class = \"{}\"\n\
             \n\
             [assistant]\n\
             api_key = \"{key}\"\n\
             base_url = \"{}\"\n\
             model = \"{}\"\n\
             timeout_ms = {}\n\
             connect_timeout_ms = {}\n\
             retire_previous_session = {}\n",
            self.data_dir.display(),
            self.scratch_dir.display(),
            self.entity,
            self.target_class,
            self.assistant.base_url,
            self.assistant.model,
            self.assistant.timeout_ms,
            self.assistant.connect_timeout_ms,
            self.assistant.retire_previous_session,
        )
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Expands `${VAR}` references; unset variables expand to the empty string.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(value, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
