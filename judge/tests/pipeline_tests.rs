//! End-to-end tests of the evaluation pipeline with a scripted model and renderer.

use async_trait::async_trait;
use judge::prompts::QuestionGenerationPrompt;
use judge::{
    has_cached_questions, AnswerEvaluationAgent, EvaluationInput, GenerationGuidance, JudgeConfig,
    JudgeError, JudgeOrchestrator, QuestionCache, QuestionGenerationAgent, RetryPolicy,
};
use model::{
    Candidate, CandidateContent, FinishReason, GenerateRequest, GenerateResponse, ModelInfo,
    ModelProvider, ModelResult, Part,
};
use serde_json::json;
use serial_test::serial;
use snapshot::{PageRenderer, SnapshotError, SnapshotResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Answers generation and evaluation requests with fixed bodies
struct ScriptedModel {
    questions_body: String,
    answers_body: String,
    generation_calls: AtomicUsize,
    evaluation_calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(questions: serde_json::Value, answers: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            questions_body: questions.to_string(),
            answers_body: answers.to_string(),
            generation_calls: AtomicUsize::new(0),
            evaluation_calls: AtomicUsize::new(0),
        })
    }

    fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    fn evaluation_calls(&self) -> usize {
        self.evaluation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn generate(&self, request: GenerateRequest) -> ModelResult<GenerateResponse> {
        let body = if request.system_instruction == QuestionGenerationPrompt::SYSTEM {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            self.questions_body.clone()
        } else {
            self.evaluation_calls.fetch_add(1, Ordering::SeqCst);
            self.answers_body.clone()
        };

        Ok(GenerateResponse {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![Part::text(format!("```json\n{}\n```", body))],
                }),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
        })
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        Ok(vec![])
    }

    async fn health_check(&self) -> ModelResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct FakeRenderer {
    renders: Mutex<Vec<(PathBuf, String)>>,
    fail: bool,
}

impl FakeRenderer {
    fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, artifact: &Path, page_id: &str) -> SnapshotResult<Vec<u8>> {
        self.renders
            .lock()
            .unwrap()
            .push((artifact.to_path_buf(), page_id.to_string()));
        if self.fail {
            return Err(SnapshotError::RenderFailed {
                artifact: artifact.to_path_buf(),
                page_id: page_id.to_string(),
                message: "renderer offline".to_string(),
            });
        }
        Ok(PNG.to_vec())
    }
}

fn orchestrator(
    model: &Arc<ScriptedModel>,
    renderer: &Arc<FakeRenderer>,
) -> JudgeOrchestrator<Arc<FakeRenderer>> {
    let config = JudgeConfig::default().with_retry(RetryPolicy::new(3, 0));
    let generator = Arc::new(QuestionGenerationAgent::new(
        model.clone(),
        "test-model",
        &config,
    ));
    let evaluator = Arc::new(AnswerEvaluationAgent::new(model.clone(), "test-model", &config));
    JudgeOrchestrator::new(generator, evaluator, renderer.clone())
}

fn input(root: &Path) -> EvaluationInput {
    EvaluationInput {
        case_id: "case-7".to_string(),
        page_id: "slide-2".to_string(),
        task_prompt: "Make the \"Q3\" title bold".to_string(),
        before_artifact: root.join("before.pptx"),
        after_artifact: root.join("after.pptx"),
        before_summary: json!({"title": {"text": "Q3", "bold": false}}),
        after_summary: json!({"title": {"text": "Q3", "bold": true}}),
        test_context_dir: root.join("context"),
        force_regenerate: false,
        guidance: GenerationGuidance::default(),
    }
}

fn two_questions() -> serde_json::Value {
    json!({"questions": [
        {"id": "q1", "question": "Is the title bold?", "category": "formatting", "weight": 1.0},
        {"id": "q2", "question": "Is the title text unchanged?", "category": "content", "weight": 0.5}
    ]})
}

fn scenario_answers() -> serde_json::Value {
    json!({"answers": [
        {"questionId": "q1", "score": 100, "reasoning": "bold", "confidence": 0.9},
        {"questionId": "q2", "score": 0, "reasoning": "text changed", "confidence": 0.8}
    ]})
}

#[tokio::test]
async fn test_weighted_scenario_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(two_questions(), scenario_answers());
    let renderer = Arc::new(FakeRenderer::default());
    let input = input(dir.path());

    assert!(!has_cached_questions(&input.test_context_dir).await);

    let result = orchestrator(&model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    assert!((result.overall_score - 66.67).abs() < 0.01);
    assert_eq!(result.questions.len(), 2);
    assert_eq!(result.answers.len(), 2);
    assert_eq!(result.question_scores["q1"], 100.0);
    assert_eq!(result.question_scores["q2"], 0.0);
    assert_eq!(result.case_id, "case-7");
    assert_eq!(result.page_id, "slide-2");
    assert!(result.evaluated_at.ends_with('Z'));

    assert_eq!(model.generation_calls(), 1);
    assert_eq!(model.evaluation_calls(), 1);
    assert_eq!(renderer.render_count(), 2);

    // questions are persisted as soon as they are generated
    assert!(has_cached_questions(&input.test_context_dir).await);
    let cached = QuestionCache::default()
        .load(&input.test_context_dir)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.questions, result.questions);
    assert_eq!(cached.metadata.task_prompt, input.task_prompt);
    assert_eq!(cached.metadata.question_count, 2);
}

#[tokio::test]
async fn test_unknown_question_answers_are_kept_but_not_scored() {
    let dir = tempfile::tempdir().unwrap();
    let answers = json!({"answers": [
        {"questionId": "q1", "score": 100, "reasoning": "bold"},
        {"questionId": "q2", "score": 0, "reasoning": "text changed"},
        {"questionId": "q99", "score": 0, "reasoning": "not asked"}
    ]});
    let model = ScriptedModel::new(two_questions(), answers);
    let renderer = Arc::new(FakeRenderer::default());

    let result = orchestrator(&model, &renderer)
        .run_evaluation(&input(dir.path()))
        .await
        .unwrap();

    assert!((result.overall_score - 66.67).abs() < 0.01);
    assert_eq!(result.answers.len(), 3);
    assert_eq!(result.question_scores["q99"], 0.0);
}

#[tokio::test]
async fn test_cached_questions_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    let input = input(dir.path());
    let renderer = Arc::new(FakeRenderer::default());

    let first_model = ScriptedModel::new(two_questions(), scenario_answers());
    let first = orchestrator(&first_model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    let second_model = ScriptedModel::new(
        json!({"questions": [{"id": "other", "question": "Different?"}]}),
        scenario_answers(),
    );
    let second_renderer = Arc::new(FakeRenderer::default());
    let second = orchestrator(&second_model, &second_renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    assert_eq!(second_model.generation_calls(), 0);
    assert_eq!(second.questions, first.questions);
    assert_eq!(second.overall_score, first.overall_score);
    // only the after snapshot is needed when questions come from the cache
    assert_eq!(second_renderer.render_count(), 1);
}

#[tokio::test]
async fn test_custom_cache_file_name_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = input(dir.path());
    let model = ScriptedModel::new(two_questions(), scenario_answers());
    let renderer = Arc::new(FakeRenderer::default());
    let mut orchestrator = orchestrator(&model, &renderer)
        .with_question_cache(QuestionCache::new("custom-questions.md"));

    assert!(!orchestrator.has_cached_questions(&input.test_context_dir).await);
    orchestrator.run_evaluation(&input).await.unwrap();

    assert!(orchestrator.has_cached_questions(&input.test_context_dir).await);
    assert!(input.test_context_dir.join("custom-questions.md").is_file());
    // the default file name is not written
    assert!(!has_cached_questions(&input.test_context_dir).await);
}

#[tokio::test]
async fn test_repeated_runs_share_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let input = input(dir.path());
    let model = ScriptedModel::new(two_questions(), scenario_answers());
    let renderer = Arc::new(FakeRenderer::default());
    let mut orchestrator = orchestrator(&model, &renderer);

    let first = orchestrator.run_evaluation(&input).await.unwrap();
    let second = orchestrator.run_evaluation(&input).await.unwrap();

    assert_eq!(first.questions, second.questions);
    assert_eq!(model.generation_calls(), 1);
    assert_eq!(model.evaluation_calls(), 2);
    assert_eq!(renderer.render_count(), 2);
    assert_eq!(orchestrator.snapshots().stats().size, 2);
}

#[tokio::test]
async fn test_force_regenerate_overwrites_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = input(dir.path());
    let renderer = Arc::new(FakeRenderer::default());

    let model = ScriptedModel::new(two_questions(), scenario_answers());
    orchestrator(&model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    let regenerated = ScriptedModel::new(
        json!({"questions": [{"id": "q1", "question": "Is the title bold now?", "weight": 1}]}),
        scenario_answers(),
    );
    input.force_regenerate = true;
    let result = orchestrator(&regenerated, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    assert_eq!(regenerated.generation_calls(), 1);
    assert_eq!(result.questions.len(), 1);
    assert_eq!(result.overall_score, 100.0);

    let cached = QuestionCache::default()
        .load(&input.test_context_dir)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.questions.len(), 1);
    assert_eq!(cached.questions[0].text, "Is the title bold now?");
}

#[tokio::test]
async fn test_malformed_cache_falls_back_to_generation() {
    let dir = tempfile::tempdir().unwrap();
    let input = input(dir.path());
    tokio::fs::create_dir_all(&input.test_context_dir)
        .await
        .unwrap();
    tokio::fs::write(
        input.test_context_dir.join("llm-judge-questions.md"),
        "---\npageId: slide-2\n",
    )
    .await
    .unwrap();
    assert!(has_cached_questions(&input.test_context_dir).await);

    let model = ScriptedModel::new(two_questions(), scenario_answers());
    let renderer = Arc::new(FakeRenderer::default());
    let result = orchestrator(&model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    assert_eq!(model.generation_calls(), 1);
    assert_eq!(result.questions.len(), 2);
    let cached = QuestionCache::default()
        .load(&input.test_context_dir)
        .await
        .unwrap();
    assert!(cached.is_some());
}

#[tokio::test]
async fn test_twelve_questions_are_truncated_to_ten() {
    let dir = tempfile::tempdir().unwrap();
    let items: Vec<_> = (1..=12)
        .map(|i| json!({"id": format!("q{i}"), "question": format!("Check {i}?"), "weight": 1}))
        .collect();
    let model = ScriptedModel::new(
        json!({ "questions": items }),
        json!({"answers": [{"questionId": "q1", "score": 50, "reasoning": "half"}]}),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let input = input(dir.path());

    let result = orchestrator(&model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap();

    assert_eq!(result.questions.len(), 10);
    assert_eq!(result.questions[9].id, "q10");
    // partial answer coverage is tolerated
    assert_eq!(result.answers.len(), 1);
    assert_eq!(result.overall_score, 50.0);

    let cached = QuestionCache::default()
        .load(&input.test_context_dir)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.metadata.question_count, 10);
}

#[tokio::test]
async fn test_no_valid_questions_fails_after_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(
        json!({"questions": [{"id": "q1", "question": "Too heavy?", "weight": 2.0}]}),
        scenario_answers(),
    );
    let renderer = Arc::new(FakeRenderer::default());
    let input = input(dir.path());

    let err = orchestrator(&model, &renderer)
        .run_evaluation(&input)
        .await
        .unwrap_err();

    assert!(matches!(err, JudgeError::RetriesExhausted { attempts: 3, .. }));
    assert!(err.to_string().contains("3 attempts"));
    assert_eq!(model.generation_calls(), 3);
    assert_eq!(model.evaluation_calls(), 0);
    assert!(!has_cached_questions(&input.test_context_dir).await);
}

#[tokio::test]
async fn test_evaluation_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(two_questions(), json!({"verdict": "looks fine"}));
    let renderer = Arc::new(FakeRenderer::default());

    let err = orchestrator(&model, &renderer)
        .run_evaluation(&input(dir.path()))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("Answer evaluation failed after 3 attempts"));
    assert!(message.contains("'answers'"));
    assert_eq!(model.evaluation_calls(), 3);
}

#[tokio::test]
async fn test_render_failure_is_an_evaluation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(two_questions(), scenario_answers());
    let renderer = Arc::new(FakeRenderer {
        fail: true,
        ..Default::default()
    });

    let err = orchestrator(&model, &renderer)
        .run_evaluation(&input(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, JudgeError::Snapshot(_)));
    assert_eq!(model.generation_calls(), 0);
}

#[test]
#[serial]
fn test_missing_credential_is_a_configuration_error() {
    let previous = std::env::var("GEMINI_API_KEY").ok();
    let config = JudgeConfig::default();

    std::env::remove_var("GEMINI_API_KEY");
    let err = QuestionGenerationAgent::from_env(&config).err().unwrap();
    assert!(matches!(err, JudgeError::Configuration(_)));
    assert!(err.to_string().contains("GEMINI_API_KEY"));

    std::env::set_var("GEMINI_API_KEY", "  ");
    let err = AnswerEvaluationAgent::from_env(&config).err().unwrap();
    assert!(matches!(err, JudgeError::Configuration(_)));

    std::env::set_var("GEMINI_API_KEY", "test-key");
    assert!(QuestionGenerationAgent::from_env(&config).is_ok());

    match previous {
        Some(value) => std::env::set_var("GEMINI_API_KEY", value),
        None => std::env::remove_var("GEMINI_API_KEY"),
    }
}
