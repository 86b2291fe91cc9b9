//! Prompt templates for the two judge agents
//!
//! Each agent sends a fixed system instruction plus one user turn made of
//! the page snapshot and the text built here. Both ask for a single JSON
//! object so the response can be decoded without heuristics.

use crate::types::{GenerationGuidance, Question};

/// Question generation prompt - derives checkable criteria from the before state
///
/// # Output Format
/// `{"questions": [{"id", "question", "category", "weight"}]}`
///
/// # Example
/// ```
/// use judge::prompts::QuestionGenerationPrompt;
/// use judge::GenerationGuidance;
///
/// let prompt = QuestionGenerationPrompt::build(
///     "Make the title bold",
///     "{\"title\": \"Q3 results\"}",
///     &GenerationGuidance::default(),
///     10,
/// );
/// assert!(prompt.contains("Make the title bold"));
/// assert!(prompt.contains("at most 10"));
/// ```
pub struct QuestionGenerationPrompt;

impl QuestionGenerationPrompt {
    pub const SYSTEM: &'static str = "You are an expert reviewer of presentation edits. \
        You are shown a page in its state BEFORE an automated edit, together with a \
        summary of its structured content and the task the edit is meant to perform. \
        Write concrete yes/no style evaluation questions that a reviewer could answer \
        by looking only at the page AFTER the edit. Each question must check one \
        observable property. Categories: structure, content, formatting, layout, \
        compliance. Weights are between 0 and 1; give the most important checks the \
        highest weight. Respond with JSON only.";

    /// Build the user text for question generation
    ///
    /// # Arguments
    /// * `task_prompt` - The edit the page should receive
    /// * `summary` - Serialized (already truncated) document summary
    /// * `guidance` - Optional criteria, focus areas and expected changes
    /// * `max_questions` - Upper bound requested from the model
    pub fn build(
        task_prompt: &str,
        summary: &str,
        guidance: &GenerationGuidance,
        max_questions: usize,
    ) -> String {
        let mut prompt = format!(
            "TASK: {}\n\n\
             DOCUMENT STATE (before edit):\n{}\n",
            task_prompt, summary
        );

        if let Some(criteria) = &guidance.criteria {
            prompt.push_str(&format!("\nEVALUATION CRITERIA: {}\n", criteria));
        }
        if !guidance.focus_areas.is_empty() {
            prompt.push_str(&format!(
                "\nFOCUS AREAS:\n{}\n",
                Self::bullet_list(&guidance.focus_areas)
            ));
        }
        if !guidance.expected_changes.is_empty() {
            prompt.push_str(&format!(
                "\nEXPECTED CHANGES:\n{}\n",
                Self::bullet_list(&guidance.expected_changes)
            ));
        }

        prompt.push_str(&format!(
            "\nGenerate between 1 and at most {} questions.\n\
             Respond with: {{\"questions\": [{{\"id\": \"q1\", \"question\": \"...\", \
             \"category\": \"formatting\", \"weight\": 1.0}}]}}",
            max_questions
        ));
        prompt
    }

    fn bullet_list(items: &[String]) -> String {
        items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Answer evaluation prompt - scores the after state against each question
///
/// # Output Format
/// `{"answers": [{"questionId", "score", "reasoning", "confidence"}]}`
pub struct AnswerEvaluationPrompt;

impl AnswerEvaluationPrompt {
    pub const SYSTEM: &'static str = "You are a strict evaluator of presentation edits. \
        You are shown a page AFTER an automated edit, a summary of its structured \
        content, the task the edit was meant to perform and a list of evaluation \
        questions. Answer every question by inspecting the page. Score each one from \
        0 (not done at all) to 100 (fully done), explain the score briefly and state \
        your confidence between 0 and 1. Respond with JSON only.";

    pub fn build(task_prompt: &str, summary: &str, questions: &[Question]) -> String {
        let listed = questions
            .iter()
            .map(|q| match q.category {
                Some(category) => format!("- [{}] ({}) {}", q.id, category, q.text),
                None => format!("- [{}] {}", q.id, q.text),
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "TASK: {}\n\n\
             DOCUMENT STATE (after edit):\n{}\n\n\
             QUESTIONS:\n{}\n\n\
             Answer all {} questions using their ids.\n\
             Respond with: {{\"answers\": [{{\"questionId\": \"q1\", \"score\": 100, \
             \"reasoning\": \"...\", \"confidence\": 0.9}}]}}",
            task_prompt,
            summary,
            listed,
            questions.len()
        )
    }
}
