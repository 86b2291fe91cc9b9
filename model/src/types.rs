use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    Model,
}

/// Binary payload sent inline with a request, already base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn inline_image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Part::InlineData(InlineData::from_bytes(mime_type, bytes))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::InlineData(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: ContentRole::User,
            parts,
        }
    }
}

/// Decoding parameters for a single generation call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Constrain the response to machine-parseable JSON
    pub structured_output: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
            structured_output: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            contents: Vec::new(),
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.contents.push(content);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation_config.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.generation_config.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_structured_output(mut self) -> Self {
        self.generation_config.structured_output = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateContent {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    pub usage: Option<Usage>,
}

/// Why a response carried no usable text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingText {
    NoCandidates,
    NoParts,
    NoText,
}

impl fmt::Display for MissingText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingText::NoCandidates => write!(f, "response contained no candidates"),
            MissingText::NoParts => write!(f, "first candidate has no content parts"),
            MissingText::NoText => write!(f, "first content part has no text"),
        }
    }
}

/// Outcome of decoding the text of a [`GenerateResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseText {
    Text(String),
    Missing(MissingText),
}

impl ResponseText {
    pub fn into_result(self) -> Result<String, MissingText> {
        match self {
            ResponseText::Text(text) => Ok(text),
            ResponseText::Missing(reason) => Err(reason),
        }
    }
}

impl GenerateResponse {
    /// Decode the first candidate's first part as text.
    pub fn first_text(&self) -> ResponseText {
        let Some(candidate) = self.candidates.first() else {
            return ResponseText::Missing(MissingText::NoCandidates);
        };

        let Some(part) = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.first())
        else {
            return ResponseText::Missing(MissingText::NoParts);
        };

        match part.as_text() {
            Some(text) if !text.is_empty() => ResponseText::Text(text.to_string()),
            _ => ResponseText::Missing(MissingText::NoText),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub input_token_limit: Option<u32>,
    pub output_token_limit: Option<u32>,
}
