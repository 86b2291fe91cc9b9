//! Persistent question sets, one markdown file per test-context directory.
//!
//! File layout:
//!
//! ```text
//! ---
//! pageId: slide-2
//! caseId: case-7
//! taskPrompt: "Make the \"Q3\" title bold"
//! generatedAt: 2026-01-01T00:00:00.000Z
//! questionCount: 1
//! ---
//!
//! # Evaluation Questions
//!
//! ## q1
//! - Category: formatting
//! - Weight: 0.5
//! - Question: Is the title bold?
//! ```
//!
//! Values are single-line: backslash, newline and carriage return are
//! escaped as `\\`, `\n` and `\r`, and the quoted task prompt also escapes
//! `"`. A question without a category is written as `general`.
//!
//! Concurrent writers are not coordinated; the last write wins.

use crate::config::DEFAULT_CACHE_FILE_NAME;
use crate::error::CacheError;
use crate::types::{Question, QuestionCacheMetadata, QuestionCategory, MAX_QUESTIONS};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FENCE: &str = "---";
const TITLE: &str = "# Evaluation Questions";
const GENERAL: &str = "general";

/// A question set read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuestions {
    pub metadata: QuestionCacheMetadata,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct QuestionCache {
    file_name: String,
}

impl Default for QuestionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_FILE_NAME)
    }
}

impl QuestionCache {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    /// Write the question set, replacing any existing file.
    ///
    /// `question_count` in the written header is always `questions.len()`.
    pub async fn save(
        &self,
        dir: &Path,
        metadata: &QuestionCacheMetadata,
        questions: &[Question],
    ) -> Result<PathBuf, CacheError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = self.path(dir);
        tokio::fs::write(&path, render(metadata, questions)).await?;
        info!("Saved {} questions to {}", questions.len(), path.display());
        Ok(path)
    }

    /// Read the question set.
    ///
    /// Returns `Ok(None)` when there is no readable file and
    /// [`CacheError::Malformed`] when the file exists but does not parse.
    pub async fn load(&self, dir: &Path) -> Result<Option<CachedQuestions>, CacheError> {
        let path = self.path(dir);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No question cache at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                warn!("Unable to read question cache {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        parse(&text).map(Some)
    }

    pub async fn has(&self, dir: &Path) -> bool {
        tokio::fs::metadata(self.path(dir))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Remove the cache file; true when a file was actually deleted.
    pub async fn delete(&self, dir: &Path) -> bool {
        let path = self.path(dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted question cache {}", path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Unable to delete question cache {}: {}", path.display(), e);
                false
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn escape_quoted(value: &str) -> String {
    format!("\"{}\"", escape(value).replace('"', "\\\""))
}

fn unescape(value: &str, line: usize) -> Result<String, CacheError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some(other) => {
                return Err(CacheError::malformed(
                    line,
                    format!("invalid escape sequence '\\{}'", other),
                ))
            }
            None => return Err(CacheError::malformed(line, "dangling escape at end of value")),
        }
    }
    Ok(out)
}

fn unquote(value: &str, line: usize) -> Result<String, CacheError> {
    let inner = value
        .strip_prefix('"')
        .ok_or_else(|| CacheError::malformed(line, "taskPrompt must be a quoted string"))?;

    // Find the closing quote, skipping escaped characters.
    let mut end = None;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }

    match end {
        Some(i) if i + 1 == inner.len() => unescape(&inner[..i], line),
        Some(_) => Err(CacheError::malformed(
            line,
            "unexpected text after closing quote in taskPrompt",
        )),
        None => Err(CacheError::malformed(line, "unterminated quoted taskPrompt")),
    }
}

/// Render a question set in the cache file format.
pub fn render(metadata: &QuestionCacheMetadata, questions: &[Question]) -> String {
    let mut out = String::new();
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&format!("pageId: {}\n", escape(&metadata.page_id)));
    out.push_str(&format!("caseId: {}\n", escape(&metadata.case_id)));
    out.push_str(&format!(
        "taskPrompt: {}\n",
        escape_quoted(&metadata.task_prompt)
    ));
    out.push_str(&format!("generatedAt: {}\n", escape(&metadata.generated_at)));
    out.push_str(&format!("questionCount: {}\n", questions.len()));
    out.push_str(FENCE);
    out.push_str("\n\n");
    out.push_str(TITLE);
    out.push('\n');

    for question in questions {
        let category = question
            .category
            .map(|c| c.as_str())
            .unwrap_or(GENERAL);
        out.push_str(&format!("\n## {}\n", escape(&question.id)));
        out.push_str(&format!("- Category: {}\n", category));
        out.push_str(&format!("- Weight: {}\n", question.weight));
        out.push_str(&format!("- Question: {}\n", escape(&question.text)));
    }
    out
}

#[derive(Default)]
struct Header {
    page_id: Option<String>,
    case_id: Option<String>,
    task_prompt: Option<String>,
    generated_at: Option<String>,
    question_count: Option<usize>,
}

/// Question block being assembled while parsing
struct Block {
    line: usize,
    id: String,
    category: Option<Option<QuestionCategory>>,
    weight: Option<f64>,
    text: Option<String>,
}

impl Block {
    fn finish(self) -> Result<Question, CacheError> {
        let missing = |field: &str| {
            CacheError::malformed(
                self.line,
                format!("question '{}' is missing its {} field", self.id, field),
            )
        };
        let category = self.category.ok_or_else(|| missing("Category"))?;
        let weight = self.weight.ok_or_else(|| missing("Weight"))?;
        let text = self.text.ok_or_else(|| missing("Question"))?;

        Ok(Question {
            id: self.id,
            text,
            category,
            weight,
        })
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, line: usize, name: &str) -> Result<(), CacheError> {
    if slot.is_some() {
        return Err(CacheError::malformed(line, format!("duplicate {}", name)));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_header_line(header: &mut Header, raw: &str, line: usize) -> Result<(), CacheError> {
    let (key, value) = raw
        .split_once(": ")
        .or_else(|| raw.strip_suffix(':').map(|key| (key, "")))
        .ok_or_else(|| CacheError::malformed(line, "header line is not 'key: value'"))?;

    match key {
        "pageId" => set_once(&mut header.page_id, unescape(value, line)?, line, "pageId"),
        "caseId" => set_once(&mut header.case_id, unescape(value, line)?, line, "caseId"),
        "taskPrompt" => set_once(
            &mut header.task_prompt,
            unquote(value, line)?,
            line,
            "taskPrompt",
        ),
        "generatedAt" => set_once(
            &mut header.generated_at,
            unescape(value, line)?,
            line,
            "generatedAt",
        ),
        "questionCount" => {
            let count = value.trim().parse::<usize>().map_err(|_| {
                CacheError::malformed(line, format!("questionCount '{}' is not a number", value))
            })?;
            set_once(&mut header.question_count, count, line, "questionCount")
        }
        other => Err(CacheError::malformed(
            line,
            format!("unknown header key '{}'", other),
        )),
    }
}

fn parse_field(block: &mut Block, raw: &str, line: usize) -> Result<(), CacheError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CacheError::malformed(line, "field line is not '- Name: value'"))?;
    let value = value.strip_prefix(' ').unwrap_or(value);

    match name {
        "Category" => {
            let category = match value {
                GENERAL => None,
                other => Some(
                    other
                        .parse::<QuestionCategory>()
                        .map_err(|e| CacheError::malformed(line, e))?,
                ),
            };
            set_once(&mut block.category, category, line, "Category")
        }
        "Weight" => {
            let weight = value.trim().parse::<f64>().map_err(|_| {
                CacheError::malformed(line, format!("weight '{}' is not a number", value))
            })?;
            if !(0.0..=1.0).contains(&weight) {
                return Err(CacheError::malformed(
                    line,
                    format!("weight {} outside [0, 1]", weight),
                ));
            }
            set_once(&mut block.weight, weight, line, "Weight")
        }
        "Question" => set_once(&mut block.text, unescape(value, line)?, line, "Question"),
        other => Err(CacheError::malformed(
            line,
            format!("unknown field '{}'", other),
        )),
    }
}

/// Parse the cache file format back into metadata and questions.
pub fn parse(text: &str) -> Result<CachedQuestions, CacheError> {
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

    match lines.next() {
        Some((_, FENCE)) => {}
        _ => return Err(CacheError::malformed(1, "missing opening ---")),
    }

    let mut header = Header::default();
    let mut closing_line = None;
    for (number, line) in lines.by_ref() {
        if line == FENCE {
            closing_line = Some(number);
            break;
        }
        parse_header_line(&mut header, line, number)?;
    }
    let closing_line = closing_line.ok_or_else(|| {
        CacheError::malformed(text.lines().count().max(1), "missing closing ---")
    })?;

    let missing = |key: &str| CacheError::malformed(closing_line, format!("missing header key '{}'", key));
    let page_id = header.page_id.ok_or_else(|| missing("pageId"))?;
    let case_id = header.case_id.ok_or_else(|| missing("caseId"))?;
    let task_prompt = header.task_prompt.ok_or_else(|| missing("taskPrompt"))?;
    let generated_at = header.generated_at.ok_or_else(|| missing("generatedAt"))?;
    let question_count = header
        .question_count
        .ok_or_else(|| missing("questionCount"))?;

    let mut questions = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut current: Option<Block> = None;
    let mut last_line = closing_line;

    for (number, line) in lines {
        last_line = number;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(id) = line.strip_prefix("## ") {
            if let Some(block) = current.take() {
                questions.push(block.finish()?);
            }
            let id = unescape(id, number)?;
            if id.is_empty() {
                return Err(CacheError::malformed(number, "empty question id"));
            }
            if !seen_ids.insert(id.clone()) {
                return Err(CacheError::malformed(
                    number,
                    format!("duplicate question id '{}'", id),
                ));
            }
            current = Some(Block {
                line: number,
                id,
                category: None,
                weight: None,
                text: None,
            });
        } else if let Some(field) = line.strip_prefix("- ") {
            let block = current
                .as_mut()
                .ok_or_else(|| CacheError::malformed(number, "field line outside a question block"))?;
            parse_field(block, field, number)?;
        } else if line == TITLE && current.is_none() && questions.is_empty() {
            continue;
        } else {
            return Err(CacheError::malformed(
                number,
                format!("unexpected line '{}'", line),
            ));
        }
    }

    if let Some(block) = current.take() {
        questions.push(block.finish()?);
    }

    if questions.len() > MAX_QUESTIONS {
        return Err(CacheError::malformed(
            last_line,
            format!(
                "{} questions exceed the limit of {}",
                questions.len(),
                MAX_QUESTIONS
            ),
        ));
    }
    if questions.is_empty() {
        return Err(CacheError::malformed(last_line, "cache contains no questions"));
    }
    if questions.len() != question_count {
        return Err(CacheError::malformed(
            last_line,
            format!(
                "questionCount is {} but {} questions were found",
                question_count,
                questions.len()
            ),
        ));
    }

    Ok(CachedQuestions {
        metadata: QuestionCacheMetadata {
            page_id,
            case_id,
            task_prompt,
            generated_at,
            question_count,
        },
        questions,
    })
}
