use crate::provider::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Environment variable the API key is read from
    pub api_key_env: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout: Duration::from_secs(120),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
        }
    }
}

impl GeminiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with the key taken from `GEMINI_API_KEY`.
    pub fn from_env() -> ModelResult<Self> {
        Self::default().with_key_from_env(DEFAULT_API_KEY_ENV)
    }

    /// Read the API key from `var`; a missing or blank value is an error.
    pub fn with_key_from_env(mut self, var: &str) -> ModelResult<Self> {
        let key = std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ModelError::MissingCredential {
                var: var.to_string(),
            })?;
        self.api_key_env = var.to_string();
        self.api_key = Some(key);
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        match &self.api_key {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(format!("API key is required (set {})", self.api_key_env)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GeminiConfig::default();
        assert_eq!(config.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(config.api_key_env, "GEMINI_API_KEY");
        assert!(config.api_key.is_none());
        // No key yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = GeminiConfig::new()
            .with_base_url("http://localhost:8080")
            .with_model("gemini-test")
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(10));

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GeminiConfig::default().with_api_key("k");

        config.base_url = "".to_string();
        assert!(config.validate().is_err());

        config.base_url = "invalid-url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "http://localhost".to_string();
        config.model = " ".to_string();
        assert!(config.validate().is_err());

        config.model = "m".to_string();
        config.timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());

        config.timeout = Duration::from_secs(1);
        config.api_key = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_from_env() {
        let var = "MODEL_CONFIG_TEST_KEY_PRESENT";
        std::env::set_var(var, "abc123");
        let config = GeminiConfig::default().with_key_from_env(var).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.api_key_env, var);
        std::env::remove_var(var);
    }

    #[test]
    fn test_key_from_env_missing() {
        let var = "MODEL_CONFIG_TEST_KEY_ABSENT";
        std::env::remove_var(var);
        let err = GeminiConfig::default().with_key_from_env(var).unwrap_err();
        assert!(matches!(err, ModelError::MissingCredential { var: v } if v == var));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = GeminiConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        let deserialized: GeminiConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.model, deserialized.model);
        assert!(deserialized.api_key.is_none());
    }
}
