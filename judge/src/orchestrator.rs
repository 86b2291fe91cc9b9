use crate::cache::QuestionCache;
use crate::error::JudgeResult;
use crate::evaluator::AnswerEvaluator;
use crate::generator::QuestionGenerator;
use crate::types::{
    Answer, EvaluationResult, GenerationGuidance, Question, QuestionCacheMetadata,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snapshot::{PageRenderer, SnapshotCache};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything needed to judge one page edit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    pub case_id: String,
    pub page_id: String,
    pub task_prompt: String,
    pub before_artifact: PathBuf,
    pub after_artifact: PathBuf,
    pub before_summary: Value,
    pub after_summary: Value,
    /// Directory holding the question cache for this case
    pub test_context_dir: PathBuf,
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub guidance: GenerationGuidance,
}

/// Weighted aggregation of one answer set
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub overall_score: f64,
    /// Score per answered question id, including ids not in the question set
    pub question_scores: BTreeMap<String, f64>,
    pub matched: usize,
    /// Answer ids that match no question, in answer order
    pub unmatched: Vec<String>,
}

/// Weighted completion percentage of `answers` against `questions`.
///
/// Answers whose id matches no question are recorded in
/// `question_scores` but do not contribute to the overall score. With no
/// matched weight the overall score is 0.
pub fn weighted_score(questions: &[Question], answers: &[Answer]) -> ScoreSummary {
    let weights: HashMap<&str, f64> = questions
        .iter()
        .map(|q| (q.id.as_str(), q.weight))
        .collect();

    let mut question_scores = BTreeMap::new();
    let mut unmatched = Vec::new();
    let mut matched = 0;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for answer in answers {
        question_scores.insert(answer.question_id.clone(), answer.score);
        match weights.get(answer.question_id.as_str()) {
            Some(weight) => {
                weighted_sum += answer.score * weight;
                total_weight += weight;
                matched += 1;
            }
            None => unmatched.push(answer.question_id.clone()),
        }
    }

    let overall_score = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    };

    ScoreSummary {
        overall_score,
        question_scores,
        matched,
        unmatched,
    }
}

/// Whether `dir` holds a question cache under the default file name.
///
/// Use [`JudgeOrchestrator::has_cached_questions`] when the cache file name
/// was configured.
pub async fn has_cached_questions(dir: &Path) -> bool {
    QuestionCache::default().has(dir).await
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drives one evaluation: resolve questions, snapshot, evaluate, score
pub struct JudgeOrchestrator<R> {
    generator: Arc<dyn QuestionGenerator>,
    evaluator: Arc<dyn AnswerEvaluator>,
    snapshots: SnapshotCache<R>,
    cache: QuestionCache,
}

impl<R: PageRenderer> JudgeOrchestrator<R> {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        evaluator: Arc<dyn AnswerEvaluator>,
        renderer: R,
    ) -> Self {
        Self {
            generator,
            evaluator,
            snapshots: SnapshotCache::new(renderer),
            cache: QuestionCache::default(),
        }
    }

    pub fn with_question_cache(mut self, cache: QuestionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn snapshots(&self) -> &SnapshotCache<R> {
        &self.snapshots
    }

    pub fn question_cache(&self) -> &QuestionCache {
        &self.cache
    }

    /// Whether `dir` holds a question cache under this orchestrator's file name.
    pub async fn has_cached_questions(&self, dir: &Path) -> bool {
        self.cache.has(dir).await
    }

    pub async fn run_evaluation(&mut self, input: &EvaluationInput) -> JudgeResult<EvaluationResult> {
        info!(
            "Evaluating case {} page {}",
            input.case_id, input.page_id
        );

        let questions = self.resolve_questions(input).await?;

        let after = self
            .snapshots
            .get(&input.after_artifact, &input.page_id)
            .await?;
        let answers = self
            .evaluator
            .evaluate(&after, &input.after_summary, &input.task_prompt, &questions)
            .await?;

        if answers.len() < questions.len() {
            warn!(
                "Only {} of {} questions were answered for {} / {}",
                answers.len(),
                questions.len(),
                input.case_id,
                input.page_id
            );
        }

        let summary = weighted_score(&questions, &answers);
        if !summary.unmatched.is_empty() {
            warn!(
                "Answers for unknown questions ignored in score: {}",
                summary.unmatched.join(", ")
            );
        }

        let result = EvaluationResult {
            page_id: input.page_id.clone(),
            case_id: input.case_id.clone(),
            questions,
            answers,
            question_scores: summary.question_scores,
            overall_score: summary.overall_score,
            evaluated_at: timestamp(),
        };
        info!("{}", result);
        Ok(result)
    }

    async fn resolve_questions(&mut self, input: &EvaluationInput) -> JudgeResult<Vec<Question>> {
        let dir = &input.test_context_dir;

        if input.force_regenerate {
            info!("Regenerating questions for {}", dir.display());
        } else {
            match self.cache.load(dir).await {
                Ok(Some(cached)) => {
                    if cached.metadata.task_prompt != input.task_prompt {
                        warn!(
                            "Cached questions in {} were generated for a different task prompt",
                            dir.display()
                        );
                    }
                    info!(
                        "Using {} cached questions from {}",
                        cached.questions.len(),
                        dir.display()
                    );
                    return Ok(cached.questions);
                }
                Ok(None) => debug!("No cached questions in {}", dir.display()),
                Err(e) => warn!("Ignoring question cache in {}: {}", dir.display(), e),
            }
        }

        let before = self
            .snapshots
            .get(&input.before_artifact, &input.page_id)
            .await?;
        let questions = self
            .generator
            .generate(
                &before,
                &input.before_summary,
                &input.task_prompt,
                &input.guidance,
            )
            .await?;

        let metadata = QuestionCacheMetadata {
            page_id: input.page_id.clone(),
            case_id: input.case_id.clone(),
            task_prompt: input.task_prompt.clone(),
            generated_at: timestamp(),
            question_count: questions.len(),
        };
        self.cache.save(dir, &metadata, &questions).await?;

        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, weight: f64) -> Question {
        Question::new(id, format!("Question {}", id)).with_weight(weight)
    }

    #[test]
    fn test_weighted_score_scenario() {
        let questions = vec![question("q1", 1.0), question("q2", 0.5)];
        let answers = vec![
            Answer::new("q1", 100.0, "done"),
            Answer::new("q2", 0.0, "not done"),
        ];
        let summary = weighted_score(&questions, &answers);

        assert!((summary.overall_score - 66.67).abs() < 0.01);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.question_scores["q1"], 100.0);
        assert_eq!(summary.question_scores["q2"], 0.0);
    }

    #[test]
    fn test_unmatched_answers_are_excluded() {
        let questions = vec![question("q1", 1.0)];
        let answers = vec![
            Answer::new("q1", 80.0, "mostly"),
            Answer::new("q99", 0.0, "unknown"),
        ];
        let summary = weighted_score(&questions, &answers);

        assert_eq!(summary.overall_score, 80.0);
        assert_eq!(summary.unmatched, vec!["q99".to_string()]);
        assert_eq!(summary.question_scores["q99"], 0.0);
    }

    #[test]
    fn test_zero_weight_gives_zero() {
        let questions = vec![question("q1", 0.0)];
        let answers = vec![Answer::new("q1", 100.0, "done")];
        assert_eq!(weighted_score(&questions, &answers).overall_score, 0.0);
        assert_eq!(weighted_score(&questions, &[]).overall_score, 0.0);
    }

    #[test]
    fn test_overall_score_stays_in_range() {
        let weights = [0.0, 0.25, 1.0 / 3.0, 0.5, 1.0];
        let scores = [0.0, 12.5, 66.6, 100.0];

        for &w1 in &weights {
            for &w2 in &weights {
                for &s1 in &scores {
                    for &s2 in &scores {
                        let questions = vec![question("q1", w1), question("q2", w2)];
                        let answers = vec![Answer::new("q1", s1, ""), Answer::new("q2", s2, "")];
                        let overall = weighted_score(&questions, &answers).overall_score;

                        assert!(
                            (0.0..=100.0).contains(&overall),
                            "weights ({w1}, {w2}) scores ({s1}, {s2}) gave {overall}"
                        );
                        let low = s1.min(s2);
                        let high = s1.max(s2);
                        if w1 + w2 > 0.0 {
                            assert!(overall >= low - 1e-9 && overall <= high + 1e-9);
                        } else {
                            assert_eq!(overall, 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let stamp = timestamp();
        assert!(stamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[tokio::test]
    async fn test_has_cached_questions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_cached_questions(dir.path()).await);
        tokio::fs::write(dir.path().join("llm-judge-questions.md"), "---\n")
            .await
            .unwrap();
        assert!(has_cached_questions(dir.path()).await);
    }
}
