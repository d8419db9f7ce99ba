//! Batch evaluation: run fixed questions through the engine and write a CSV
//! report for manual review.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::RagEngine;
use crate::error::{RagError, Result};

/// Characters of the answer kept in the report.
pub const ANSWER_PREVIEW_CHARS: usize = 150;

/// Status written for answers that still need a human verdict.
pub const MANUAL_REVIEW_STATUS: &str = "N/A (manual)";

/// One question per lecture of the course.
pub fn default_questions() -> Vec<String> {
    [
        "What is the difference between Classic NLP and AI-based NLP?",
        "Explain the process of Tokenization.",
        "Why do RNNs suffer from the vanishing gradient problem?",
        "What is a Support Vector in SVM?",
        "Define BERT and its main architectural feature.",
        "What are the limitations of Generative AI in NLP?",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

/// One row of the evaluation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    /// The question asked.
    #[serde(rename = "Question")]
    pub question: String,
    /// The beginning of the answer, or the error for a failed query.
    #[serde(rename = "Answer_Preview")]
    pub answer_preview: String,
    /// Comma-separated source file names.
    #[serde(rename = "Sources_Retrieved")]
    pub sources: String,
    /// [`MANUAL_REVIEW_STATUS`], or `error (<stage>)` for a failed query.
    #[serde(rename = "Success_Status")]
    pub status: String,
}

/// Truncate an answer to [`ANSWER_PREVIEW_CHARS`] characters plus `...`.
pub fn answer_preview(answer: &str) -> String {
    let mut preview: String = answer.chars().take(ANSWER_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Ask every question and collect one record per question.
///
/// The engine is loaded first; a load failure aborts the run. A failing
/// question is recorded with its error and the run continues.
///
/// # Errors
///
/// Returns the engine's load error.
pub async fn evaluate(engine: &RagEngine, questions: &[String]) -> Result<Vec<EvaluationRecord>> {
    engine.load().await?;

    let mut records = Vec::with_capacity(questions.len());
    for question in questions {
        info!(question = %question, "evaluating");
        let record = match engine.predict(question).await {
            Ok(result) => EvaluationRecord {
                question: question.clone(),
                answer_preview: answer_preview(&result.answer),
                sources: result.sources.join(", "),
                status: MANUAL_REVIEW_STATUS.to_string(),
            },
            Err(e) => {
                warn!(question = %question, error = %e, "question failed");
                EvaluationRecord {
                    question: question.clone(),
                    answer_preview: e.to_string(),
                    sources: String::new(),
                    status: format!("error ({})", e.stage()),
                }
            }
        };
        records.push(record);
    }
    Ok(records)
}

/// Write `records` as CSV to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`RagError::Io`] if the file cannot be written.
pub fn write_report(path: &Path, records: &[EvaluationRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| RagError::io(path, e))?;
    for record in records {
        writer.serialize(record).map_err(|e| RagError::io(path, e))?;
    }
    writer.flush().map_err(|e| RagError::io(path, e))?;

    info!(path = %path.display(), rows = records.len(), "evaluation report written");
    Ok(())
}
