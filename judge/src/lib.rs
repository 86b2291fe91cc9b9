pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod structured;
pub mod types;

pub use cache::{CachedQuestions, QuestionCache};
pub use config::{AgentSettings, JudgeConfig, DEFAULT_CACHE_FILE_NAME, DEFAULT_MAX_SUMMARY_CHARS};
pub use error::{CacheError, JudgeError, JudgeResult, ValidationError};
pub use evaluator::{AnswerEvaluationAgent, AnswerEvaluator};
pub use generator::{QuestionGenerationAgent, QuestionGenerator};
pub use orchestrator::{
    has_cached_questions, weighted_score, EvaluationInput, JudgeOrchestrator, ScoreSummary,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{
    Answer, EvaluationResult, GenerationGuidance, Question, QuestionCacheMetadata,
    QuestionCategory, MAX_QUESTIONS,
};
