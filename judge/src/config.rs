use crate::retry::RetryPolicy;
use crate::types::MAX_QUESTIONS;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CACHE_FILE_NAME: &str = "llm-judge-questions.md";
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 10_000;

/// Decoding parameters for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl AgentSettings {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }

    fn validate(&self, name: &str) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("{} temperature must be between 0.0 and 2.0", name));
        }
        if self.max_output_tokens == 0 {
            return Err(format!("{} max_output_tokens must be greater than 0", name));
        }
        Ok(())
    }
}

/// Configuration for the question/answer pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Question generation decoding (low temperature, some variety)
    pub generation: AgentSettings,
    /// Answer evaluation decoding (lower temperature for stable scores)
    pub evaluation: AgentSettings,
    pub retry: RetryPolicy,
    /// Upper bound on the serialized document summary sent to the model
    pub max_summary_chars: usize,
    pub max_questions: usize,
    pub cache_file_name: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            generation: AgentSettings::new(0.3, 4096),
            evaluation: AgentSettings::new(0.1, 8192),
            retry: RetryPolicy::default(),
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
            max_questions: MAX_QUESTIONS,
            cache_file_name: DEFAULT_CACHE_FILE_NAME.to_string(),
        }
    }
}

impl JudgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML configuration file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_generation(mut self, settings: AgentSettings) -> Self {
        self.generation = settings;
        self
    }

    pub fn with_evaluation(mut self, settings: AgentSettings) -> Self {
        self.evaluation = settings;
        self
    }

    pub fn with_cache_file_name(mut self, name: impl Into<String>) -> Self {
        self.cache_file_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.generation.validate("generation")?;
        self.evaluation.validate("evaluation")?;
        self.retry.validate()?;

        if self.max_summary_chars == 0 {
            return Err("max_summary_chars must be greater than 0".to_string());
        }

        if self.max_questions == 0 || self.max_questions > MAX_QUESTIONS {
            return Err(format!(
                "max_questions must be between 1 and {}",
                MAX_QUESTIONS
            ));
        }

        let name = self.cache_file_name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err("cache_file_name must be a plain file name".to_string());
        }

        Ok(())
    }
}
