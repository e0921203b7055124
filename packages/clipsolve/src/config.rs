//! Settings loaded from, in increasing precedence:
//! 1. Built-in defaults
//! 2. `clipsolve.toml` in the working directory, or the file given with `--config`
//! 3. Environment variables prefixed with `CLIPSOLVE_` (nested keys use `__`,
//!    e.g. `CLIPSOLVE_SERVER__PORT`)
//! 4. Command-line flags, applied by the binary
//!
//! The API key may also come from `OPENAI_API_KEY` when no other source sets it.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{LlmOptions, DEFAULT_API_BASE};
use crate::model::{ModelSelection, PromptMode};
use crate::validation::{validate_port, ValidationError};

pub const DEFAULT_CONFIG_NAME: &str = "clipsolve";
pub const DEFAULT_PORT: i64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrSettings {
    /// Path or name of the tesseract executable
    pub tesseract: String,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: ModelSelection,
    pub prompt_mode: PromptMode,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub polling_interval_ms: u64,
    pub debounce_ms: u64,
    pub log_level: String,
    pub server: ServerSettings,
    pub ocr: OcrSettings,
}

impl Settings {
    /// Loads settings; `path` replaces the optional `clipsolve.toml` lookup and must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("api_base", DEFAULT_API_BASE)?
            .set_default("model", ModelSelection::default().as_str())?
            .set_default("prompt_mode", "interview")?
            .set_default("max_tokens", 1000_i64)?
            .set_default("temperature", 0.6_f64)?
            .set_default("request_timeout_secs", 120_i64)?
            .set_default("polling_interval_ms", 1000_i64)?
            .set_default("debounce_ms", 750_i64)?
            .set_default("log_level", "info")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", DEFAULT_PORT)?
            .set_default("ocr.tesseract", "tesseract")?
            .set_default("ocr.language", "eng")?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("CLIPSOLVE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if settings.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            settings.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port(self.server.port)?;
        if self.polling_interval_ms == 0 {
            return Err(ConfigError::NonPositive("polling_interval_ms"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::NonPositive("request_timeout_secs"));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::NonPositive("max_tokens"));
        }
        Ok(())
    }

    pub fn llm_options(&self) -> LlmOptions {
        LlmOptions {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let file = write_config("");
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.model, ModelSelection::Gpt4oMini);
        assert_eq!(settings.prompt_mode, PromptMode::Interview);
        assert_eq!(settings.server.port, DEFAULT_PORT);
        assert_eq!(settings.polling_interval(), Duration::from_millis(1000));
        assert_eq!(settings.debounce(), Duration::from_millis(750));
        assert_eq!(settings.ocr.language, "eng");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
model = "gpt-4o"
prompt_mode = "default"
api_key = "from-file"
debounce_ms = 100

[server]
host = "127.0.0.1"
port = 8765
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.model, ModelSelection::Gpt4o);
        assert_eq!(settings.prompt_mode, PromptMode::Default);
        assert_eq!(settings.api_key.as_deref(), Some("from-file"));
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8765);
        assert_eq!(settings.llm_options().api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let file = write_config("[server]\nport = 70000\n");
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ValidationError::InvalidPort(70000))));
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let file = write_config("model = \"gpt-99\"\n");
        assert!(matches!(Settings::load(Some(file.path())), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_polling_interval_is_rejected() {
        let file = write_config("polling_interval_ms = 0\n");
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(ConfigError::NonPositive("polling_interval_ms"))
        ));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = Settings::load(Some(Path::new("/nonexistent/clipsolve.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
