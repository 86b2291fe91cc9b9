use crate::config::{AgentSettings, JudgeConfig};
use crate::error::{JudgeError, JudgeResult, ValidationError};
use crate::prompts::QuestionGenerationPrompt;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::structured::{
    collect_valid, extract_array, parse_json, response_text, sniff_mime, summarize_document,
};
use crate::types::{GenerationGuidance, Question, QuestionCategory};
use async_trait::async_trait;
use model::{Content, GenerateRequest, GeminiProvider, ModelProvider, Part};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the question set for a page from its before state
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        image: &[u8],
        document_summary: &Value,
        task_prompt: &str,
        guidance: &GenerationGuidance,
    ) -> JudgeResult<Vec<Question>>;
}

/// Question item as the model writes it
#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    #[serde(alias = "question")]
    text: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
}

fn validate_question(
    index: usize,
    item: Value,
    seen: &mut HashSet<String>,
) -> Result<Question, ValidationError> {
    let raw: RawQuestion =
        serde_json::from_value(item).map_err(|e| ValidationError::new(index, e.to_string()))?;

    let id = raw.id.trim();
    if id.is_empty() {
        return Err(ValidationError::new(index, "empty id"));
    }
    if raw.text.trim().is_empty() {
        return Err(ValidationError::new(index, "empty question text"));
    }

    let category = raw
        .category
        .as_deref()
        .map(|name| name.trim().to_ascii_lowercase());
    let category = match category.as_deref() {
        None | Some("") | Some("general") => None,
        Some(name) => Some(
            name.parse::<QuestionCategory>()
                .map_err(|e| ValidationError::new(index, e))?,
        ),
    };

    let weight = raw.weight.unwrap_or(1.0);
    if !(0.0..=1.0).contains(&weight) {
        return Err(ValidationError::new(
            index,
            format!("weight {} outside [0, 1]", weight),
        ));
    }

    if !seen.insert(id.to_string()) {
        return Err(ValidationError::new(index, format!("duplicate id '{}'", id)));
    }

    Ok(Question {
        id: id.to_string(),
        text: raw.text,
        category,
        weight,
    })
}

/// Vision-model agent that writes evaluation questions
pub struct QuestionGenerationAgent {
    provider: Arc<dyn ModelProvider>,
    model: String,
    settings: AgentSettings,
    retry: RetryPolicy,
    max_summary_chars: usize,
    max_questions: usize,
}

impl QuestionGenerationAgent {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, config: &JudgeConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            settings: config.generation.clone(),
            retry: config.retry.clone(),
            max_summary_chars: config.max_summary_chars,
            max_questions: config.max_questions,
        }
    }

    /// Build the agent on a Gemini provider configured from the environment.
    pub fn from_env(config: &JudgeConfig) -> JudgeResult<Self> {
        let provider = GeminiProvider::from_env()?;
        let model = provider.model().to_string();
        Ok(Self::new(Arc::new(provider), model, config))
    }

    fn build_request(
        &self,
        image: &[u8],
        document_summary: &Value,
        task_prompt: &str,
        guidance: &GenerationGuidance,
    ) -> GenerateRequest {
        let summary = summarize_document(document_summary, self.max_summary_chars);
        let text =
            QuestionGenerationPrompt::build(task_prompt, &summary, guidance, self.max_questions);

        GenerateRequest::new(&self.model, QuestionGenerationPrompt::SYSTEM)
            .with_content(Content::user(vec![
                Part::inline_image(sniff_mime(image), image),
                Part::text(text),
            ]))
            .with_temperature(self.settings.temperature)
            .with_max_output_tokens(self.settings.max_output_tokens)
            .with_structured_output()
    }

    async fn attempt(&self, request: GenerateRequest) -> JudgeResult<Vec<Question>> {
        let response = self.provider.generate(request).await?;
        let text = response_text(&response)?;
        let items = extract_array(parse_json(&text)?, "questions")?;

        let mut seen = HashSet::new();
        let mut questions = collect_valid(items, "question", |index, item| {
            validate_question(index, item, &mut seen)
        });

        if questions.is_empty() {
            return Err(JudgeError::EmptyResult(
                "response contained no valid questions".to_string(),
            ));
        }

        if questions.len() > self.max_questions {
            warn!(
                "Model returned {} questions, keeping the first {}",
                questions.len(),
                self.max_questions
            );
            questions.truncate(self.max_questions);
        }

        Ok(questions)
    }
}

#[async_trait]
impl QuestionGenerator for QuestionGenerationAgent {
    async fn generate(
        &self,
        image: &[u8],
        document_summary: &Value,
        task_prompt: &str,
        guidance: &GenerationGuidance,
    ) -> JudgeResult<Vec<Question>> {
        let request = self.build_request(image, document_summary, task_prompt, guidance);

        let questions = retry_with_backoff(&self.retry, "Question generation", |attempt| {
            let request = request.clone();
            async move {
                debug!(
                    "Generating questions with {} (attempt {})",
                    self.model, attempt
                );
                self.attempt(request).await
            }
        })
        .await?;

        info!("Generated {} evaluation questions", questions.len());
        Ok(questions)
    }
}
