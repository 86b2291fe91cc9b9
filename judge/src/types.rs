use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const MAX_QUESTIONS: usize = 10;

/// Aspect of the page a question checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Structure,
    Content,
    Formatting,
    Layout,
    Compliance,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Structure => "structure",
            QuestionCategory::Content => "content",
            QuestionCategory::Formatting => "formatting",
            QuestionCategory::Layout => "layout",
            QuestionCategory::Compliance => "compliance",
        }
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structure" => Ok(QuestionCategory::Structure),
            "content" => Ok(QuestionCategory::Content),
            "formatting" => Ok(QuestionCategory::Formatting),
            "layout" => Ok(QuestionCategory::Layout),
            "compliance" => Ok(QuestionCategory::Compliance),
            other => Err(format!("unknown question category '{}'", other)),
        }
    }
}

/// A single evaluation criterion generated from the before state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique within one generated set
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<QuestionCategory>,
    /// Relative importance in [0, 1]
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category: None,
            weight: default_weight(),
        }
    }

    pub fn with_category(mut self, category: QuestionCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A scored response to one question, produced from the after state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Usually names a known question, but the model is not forced to
    pub question_id: String,
    /// Completion score in [0, 100]
    pub score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Answer {
    pub fn new(question_id: impl Into<String>, score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            score,
            reasoning: reasoning.into(),
            confidence: None,
        }
    }
}

/// Optional context steering question generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationGuidance {
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub expected_changes: Vec<String>,
}

impl GenerationGuidance {
    pub fn is_empty(&self) -> bool {
        self.criteria.is_none() && self.focus_areas.is_empty() && self.expected_changes.is_empty()
    }
}

/// Complete output of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub page_id: String,
    pub case_id: String,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub question_scores: BTreeMap<String, f64>,
    /// Weighted completion percentage in [0, 100]
    pub overall_score: f64,
    pub evaluated_at: String,
}

impl EvaluationResult {
    pub fn passed(&self, threshold: f64) -> bool {
        self.overall_score >= threshold
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}: {:.2}% ({} questions, {} answers)",
            self.case_id,
            self.page_id,
            self.overall_score,
            self.questions.len(),
            self.answers.len()
        )
    }
}

/// Header of a persisted question set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCacheMetadata {
    pub page_id: String,
    pub case_id: String,
    pub task_prompt: String,
    pub generated_at: String,
    /// Always the length of the persisted question list
    pub question_count: usize,
}
