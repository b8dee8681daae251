use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backends for the interviewer.
#[derive(Clone, Debug, PartialEq)]
pub enum Provider {
    OpenAI,
    /// Canned questions and grades, no network access.
    Scripted,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<SecretString>,
    pub chat_model: String,
    pub transcription_model: String,
    pub oracle_timeout: Duration,
    pub store_dir: Option<PathBuf>,
    pub prompts_dir: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:8000".
    /// *   `INTERVIEW_PROVIDER`: "openai" or "scripted". Defaults to "openai".
    /// *   `OPENAI_API_KEY`: Your secret key for the OpenAI API. Required if provider is "openai".
    /// *   `CHAT_MODEL`: (Optional) The model that asks and grades questions. Defaults to "gpt-4o".
    /// *   `TRANSCRIPTION_MODEL`: (Optional) The speech-to-text model. Defaults to "whisper-1".
    /// *   `ORACLE_TIMEOUT_SECS`: (Optional) Upper bound for every model call. Defaults to 30.
    /// *   `STORE_DIR`: (Optional) Directory for session documents. Sessions are kept in memory when unset.
    /// *   `PROMPTS_DIR`: (Optional) Directory of `.md` prompt overrides.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = var("INTERVIEW_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "scripted" => Provider::Scripted,
            other => {
                return Err(ConfigError::InvalidValue(
                    "INTERVIEW_PROVIDER".to_string(),
                    format!("'{other}' is not one of 'openai', 'scripted'"),
                ));
            }
        };

        let openai_api_key = var("OPENAI_API_KEY").map(SecretString::from);
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let transcription_model =
            var("TRANSCRIPTION_MODEL").unwrap_or_else(|| "whisper-1".to_string());

        let oracle_timeout = match var("ORACLE_TIMEOUT_SECS") {
            None => Duration::from_secs(30),
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "ORACLE_TIMEOUT_SECS".to_string(),
                        format!("'{secs}' is not a positive number of seconds"),
                    )
                })?,
        };

        let store_dir = var("STORE_DIR").map(PathBuf::from);
        let prompts_dir = var("PROMPTS_DIR").map(PathBuf::from);

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // Validate that the required API key is present for the selected provider.
        if provider == Provider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            chat_model,
            transcription_model,
            oracle_timeout,
            store_dir,
            prompts_dir,
            log_level,
        })
    }
}
