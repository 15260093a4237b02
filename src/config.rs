//! Environment-driven settings for the article pipeline.
//!
//! Values come from the process environment after an optional `.env` file has
//! been loaded. Only the API key of the selected provider is required.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::pipeline::{clamp_search_depth, DEFAULT_SEARCH_DEPTH};

pub const PROVIDER_VAR: &str = "TRENDPRESS_PROVIDER";
pub const MODEL_VAR: &str = "TRENDPRESS_MODEL";
pub const RESEARCH_MODEL_VAR: &str = "TRENDPRESS_RESEARCH_MODEL";
pub const WRITER_MODEL_VAR: &str = "TRENDPRESS_WRITER_MODEL";
pub const BASE_URL_VAR: &str = "TRENDPRESS_BASE_URL";
pub const TIMEOUT_VAR: &str = "TRENDPRESS_REQUEST_TIMEOUT_MS";
pub const TEMPERATURE_VAR: &str = "TRENDPRESS_TEMPERATURE";
pub const MAX_TOKENS_VAR: &str = "TRENDPRESS_MAX_TOKENS";
pub const NEWS_SEARCH_VAR: &str = "TRENDPRESS_NEWS_SEARCH";
pub const SEARCH_DEPTH_VAR: &str = "TRENDPRESS_SEARCH_DEPTH";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),
    #[error("unknown provider {0:?}, expected \"groq\" or \"openai\"")]
    UnknownProvider(String),
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to load env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Groq,
    OpenAI,
}

impl ProviderKind {
    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::OpenAI => "gpt-4o-mini",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "openai" => Ok(ProviderKind::OpenAI),
            _ => Err(ConfigError::UnknownProvider(value.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub research_model: Option<String>,
    pub writer_model: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub news_search: bool,
    pub search_depth: usize,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("research_model", &self.research_model)
            .field("writer_model", &self.writer_model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("news_search", &self.news_search)
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider = match get(PROVIDER_VAR) {
            Some(value) => value.parse()?,
            None => ProviderKind::default(),
        };

        let key_var = provider.api_key_var();
        let api_key = get(key_var).ok_or(ConfigError::MissingApiKey(key_var))?;

        let request_timeout = match get(TIMEOUT_VAR) {
            Some(value) => {
                let millis: u64 = parse_value(TIMEOUT_VAR, &value)?;
                if millis == 0 {
                    return Err(ConfigError::InvalidValue {
                        var: TIMEOUT_VAR,
                        value,
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_millis(millis)
            }
            None => DEFAULT_TIMEOUT,
        };

        let temperature = match get(TEMPERATURE_VAR) {
            Some(value) => {
                let temperature: f32 = parse_value(TEMPERATURE_VAR, &value)?;
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(ConfigError::InvalidValue {
                        var: TEMPERATURE_VAR,
                        value,
                        reason: "must be between 0 and 2".to_string(),
                    });
                }
                temperature
            }
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = match get(MAX_TOKENS_VAR) {
            Some(value) => parse_value(MAX_TOKENS_VAR, &value)?,
            None => DEFAULT_MAX_TOKENS,
        };

        let news_search = match get(NEWS_SEARCH_VAR) {
            Some(value) => parse_flag(NEWS_SEARCH_VAR, &value)?,
            None => false,
        };

        let search_depth = match get(SEARCH_DEPTH_VAR) {
            Some(value) => clamp_search_depth(parse_value(SEARCH_DEPTH_VAR, &value)?),
            None => DEFAULT_SEARCH_DEPTH,
        };

        Ok(Self {
            provider,
            api_key,
            model: get(MODEL_VAR).unwrap_or_else(|| provider.default_model().to_string()),
            research_model: get(RESEARCH_MODEL_VAR),
            writer_model: get(WRITER_MODEL_VAR),
            base_url: get(BASE_URL_VAR),
            request_timeout,
            temperature,
            max_tokens,
            news_search,
            search_depth,
        })
    }

    pub fn research_model(&self) -> &str {
        self.research_model.as_deref().unwrap_or(&self.model)
    }

    pub fn writer_model(&self) -> &str {
        self.writer_model.as_deref().unwrap_or(&self.model)
    }
}

/// Loads `path`, or `./.env` when no path is given. A missing default file is not an error.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(error) if error.not_found() => Ok(None),
            Err(error) => Err(error.into()),
        },
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|error: T::Err| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: error.to_string(),
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_groq_with_only_a_key() {
        let settings = settings(&[("GROQ_API_KEY", "gsk-123")]).unwrap();
        assert_eq!(settings.provider, ProviderKind::Groq);
        assert_eq!(settings.model, "llama-3.3-70b-versatile");
        assert_eq!(settings.research_model(), "llama-3.3-70b-versatile");
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 1024);
        assert!(!settings.news_search);
        assert_eq!(settings.search_depth, 5);
    }

    #[test]
    fn missing_key_names_the_variable() {
        let error = settings(&[("TRENDPRESS_PROVIDER", "openai"), ("GROQ_API_KEY", "gsk")])
            .unwrap_err();
        assert!(matches!(error, ConfigError::MissingApiKey("OPENAI_API_KEY")));
        assert_eq!(
            error.to_string(),
            "missing API key: set the OPENAI_API_KEY environment variable"
        );
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let error = settings(&[("GROQ_API_KEY", "   ")]).unwrap_err();
        assert!(matches!(error, ConfigError::MissingApiKey("GROQ_API_KEY")));
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("TRENDPRESS_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-1"),
            ("TRENDPRESS_MODEL", "gpt-4o"),
            ("TRENDPRESS_WRITER_MODEL", "gpt-4.1"),
            ("TRENDPRESS_BASE_URL", "http://localhost:8080/v1"),
            ("TRENDPRESS_REQUEST_TIMEOUT_MS", "1500"),
            ("TRENDPRESS_NEWS_SEARCH", "yes"),
            ("TRENDPRESS_SEARCH_DEPTH", "40"),
        ])
        .unwrap();

        assert_eq!(settings.provider, ProviderKind::OpenAI);
        assert_eq!(settings.research_model(), "gpt-4o");
        assert_eq!(settings.writer_model(), "gpt-4.1");
        assert_eq!(settings.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(settings.request_timeout, Duration::from_millis(1500));
        assert!(settings.news_search);
        assert_eq!(settings.search_depth, 10);
    }

    #[test]
    fn rejects_malformed_values() {
        let error = settings(&[("GROQ_API_KEY", "k"), ("TRENDPRESS_MAX_TOKENS", "lots")])
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { var: "TRENDPRESS_MAX_TOKENS", .. }));

        let error = settings(&[("GROQ_API_KEY", "k"), ("TRENDPRESS_TEMPERATURE", "3.5")])
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { var: "TRENDPRESS_TEMPERATURE", .. }));

        let error = settings(&[("TRENDPRESS_PROVIDER", "anthropic")]).unwrap_err();
        assert!(matches!(error, ConfigError::UnknownProvider(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let error = settings(&[("GROQ_API_KEY", "k"), ("TRENDPRESS_REQUEST_TIMEOUT_MS", "0")])
            .unwrap_err();
        match error {
            ConfigError::InvalidValue { var, value, reason } => {
                assert_eq!(var, "TRENDPRESS_REQUEST_TIMEOUT_MS");
                assert_eq!(value, "0");
                assert_eq!(reason, "must be greater than zero");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn debug_output_hides_the_key() {
        let settings = settings(&[("GROQ_API_KEY", "gsk-secret")]).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("gsk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
