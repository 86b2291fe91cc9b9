pub mod config;
pub mod gemini;
pub mod provider;
pub mod types;

pub use config::{GeminiConfig, DEFAULT_API_KEY_ENV};
pub use gemini::GeminiProvider;
pub use provider::{ModelError, ModelProvider, ModelResult};
pub use types::{
    Candidate, CandidateContent, Content, ContentRole, FinishReason, GenerateRequest,
    GenerateResponse, GenerationConfig, InlineData, MissingText, ModelInfo, Part, ResponseText,
    Usage,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::gemini::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
