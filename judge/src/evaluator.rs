use crate::config::{AgentSettings, JudgeConfig};
use crate::error::{JudgeError, JudgeResult, ValidationError};
use crate::prompts::AnswerEvaluationPrompt;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::structured::{
    collect_valid, extract_array, parse_json, response_text, sniff_mime, summarize_document,
};
use crate::types::{Answer, Question};
use async_trait::async_trait;
use model::{Content, GenerateRequest, GeminiProvider, ModelProvider, Part};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Scores the after state of a page against a question set
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        image: &[u8],
        document_summary: &Value,
        task_prompt: &str,
        questions: &[Question],
    ) -> JudgeResult<Vec<Answer>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnswer {
    #[serde(alias = "question_id")]
    question_id: String,
    score: f64,
    reasoning: String,
    #[serde(default)]
    confidence: Option<f64>,
}

fn validate_answer(index: usize, item: Value) -> Result<Answer, ValidationError> {
    let raw: RawAnswer =
        serde_json::from_value(item).map_err(|e| ValidationError::new(index, e.to_string()))?;

    let question_id = raw.question_id.trim();
    if question_id.is_empty() {
        return Err(ValidationError::new(index, "empty questionId"));
    }
    if !(0.0..=100.0).contains(&raw.score) {
        return Err(ValidationError::new(
            index,
            format!("score {} outside [0, 100]", raw.score),
        ));
    }
    if let Some(confidence) = raw.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::new(
                index,
                format!("confidence {} outside [0, 1]", confidence),
            ));
        }
    }

    Ok(Answer {
        question_id: question_id.to_string(),
        score: raw.score,
        reasoning: raw.reasoning,
        confidence: raw.confidence,
    })
}

/// Vision-model agent that answers every question in one exchange
pub struct AnswerEvaluationAgent {
    provider: Arc<dyn ModelProvider>,
    model: String,
    settings: AgentSettings,
    retry: RetryPolicy,
    max_summary_chars: usize,
}

impl AnswerEvaluationAgent {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, config: &JudgeConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            settings: config.evaluation.clone(),
            retry: config.retry.clone(),
            max_summary_chars: config.max_summary_chars,
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
        questions: &[Question],
    ) -> GenerateRequest {
        let summary = summarize_document(document_summary, self.max_summary_chars);
        let text = AnswerEvaluationPrompt::build(task_prompt, &summary, questions);

        GenerateRequest::new(&self.model, AnswerEvaluationPrompt::SYSTEM)
            .with_content(Content::user(vec![
                Part::inline_image(sniff_mime(image), image),
                Part::text(text),
            ]))
            .with_temperature(self.settings.temperature)
            .with_max_output_tokens(self.settings.max_output_tokens)
            .with_structured_output()
    }

    async fn attempt(&self, request: GenerateRequest) -> JudgeResult<Vec<Answer>> {
        let response = self.provider.generate(request).await?;
        let text = response_text(&response)?;
        let items = extract_array(parse_json(&text)?, "answers")?;

        let answers = collect_valid(items, "answer", validate_answer);
        if answers.is_empty() {
            return Err(JudgeError::EmptyResult(
                "response contained no valid answers".to_string(),
            ));
        }
        Ok(answers)
    }
}

#[async_trait]
impl AnswerEvaluator for AnswerEvaluationAgent {
    async fn evaluate(
        &self,
        image: &[u8],
        document_summary: &Value,
        task_prompt: &str,
        questions: &[Question],
    ) -> JudgeResult<Vec<Answer>> {
        let request = self.build_request(image, document_summary, task_prompt, questions);

        let answers = retry_with_backoff(&self.retry, "Answer evaluation", |attempt| {
            let request = request.clone();
            async move {
                debug!(
                    "Evaluating {} questions with {} (attempt {})",
                    questions.len(),
                    self.model,
                    attempt
                );
                self.attempt(request).await
            }
        })
        .await?;

        info!("Received {} answers", answers.len());
        Ok(answers)
    }
}
