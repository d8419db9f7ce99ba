use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lecture_rag::{
    ArtifactStore, BuildReport, QueryResult, RagError, default_questions, evaluate,
    pull_documents, push_index, write_report,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;

use crate::settings::Settings;

pub async fn pull_docs(settings: &Settings) -> Result<()> {
    let store = settings.store()?;
    let count = pull_documents(
        store.as_ref(),
        &settings.rag.storage.documents_prefix,
        &settings.paths.raw_dir,
    )
    .await?;
    println!("Downloaded {count} document(s) to {}", settings.paths.raw_dir.display());
    Ok(())
}

pub async fn build(
    settings: &Settings,
    raw_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<BuildReport> {
    let raw_dir = raw_dir.unwrap_or_else(|| settings.paths.raw_dir.clone());
    let output_dir = output_dir.unwrap_or_else(|| settings.paths.index_dir.clone());

    let report = settings.index_builder()?.build_vector_store(&raw_dir, &output_dir).await?;
    println!(
        "Indexed {} chunk(s) from {} document(s), {} page(s) into {}",
        report.chunks,
        report.documents,
        report.pages,
        report.output_dir.display()
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.file, skipped.reason);
    }
    Ok(report)
}

pub async fn push(settings: &Settings, index_dir: Option<PathBuf>) -> Result<()> {
    let index_dir = index_dir.unwrap_or_else(|| settings.paths.index_dir.clone());
    let store = settings.store()?;
    let prefix = &settings.rag.storage.index_prefix;
    let count = push_index(store.as_ref(), prefix, &index_dir).await?;
    println!("Uploaded {count} file(s) to {}/{prefix}", store.name());
    Ok(())
}

pub async fn pipeline(settings: &Settings) -> Result<()> {
    info!("pipeline: pulling documents");
    pull_docs(settings).await?;
    info!("pipeline: building index");
    let report = build(settings, None, None).await?;
    info!("pipeline: publishing index");
    push(settings, Some(report.output_dir)).await
}

pub async fn ask(settings: &Settings, question: &str, local: bool) -> Result<()> {
    let engine = settings.engine(local)?;
    let result = engine.predict(question).await?;
    print_answer(&result);
    Ok(())
}

/// Interactive loop. Load errors end the session; per-question errors are
/// printed and the session continues.
pub async fn chat(settings: &Settings, local: bool) -> Result<()> {
    let engine = settings.engine(local)?;
    engine.load().await?;

    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    println!("Ask a question about the course (Ctrl-D or `exit` to quit).");

    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if matches!(question, "exit" | "quit") {
                    break;
                }
                let _ = editor.add_history_entry(question);
                match engine.predict(question).await {
                    Ok(result) => print_answer(&result),
                    Err(e) => print_inline_error(&e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        }
    }
    Ok(())
}

pub async fn eval(
    settings: &Settings,
    output: Option<PathBuf>,
    questions: Option<PathBuf>,
    local: bool,
) -> Result<()> {
    let questions = match questions {
        Some(path) => read_questions(&path)?,
        None => default_questions(),
    };
    let output = output.unwrap_or_else(|| settings.paths.report.clone());

    let engine = settings.engine(local)?;
    let records = evaluate(&engine, &questions).await?;
    write_report(&output, &records)?;

    for record in &records {
        println!("{}\n  {}\n  sources: {}", record.question, record.answer_preview, record.sources);
    }
    println!("Report written to {}", output.display());
    Ok(())
}

pub async fn storage(settings: &Settings) -> Result<()> {
    let store = settings.store()?;
    println!("Store: {}", store.name());
    if let Some(region) = &settings.rag.storage.region {
        println!("Region: {region}");
    }

    for prefix in [&settings.rag.storage.index_prefix, &settings.rag.storage.documents_prefix] {
        let keys = store.list(prefix).await?;
        if keys.is_empty() {
            println!("{prefix}/: empty");
        } else {
            println!("{prefix}/: {} object(s)", keys.len());
            for key in keys {
                println!("  {key}");
            }
        }
    }
    Ok(())
}

fn read_questions(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read questions from {}", path.display()))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn print_answer(result: &QueryResult) {
    println!("\n{}\n", result.answer.trim());
    if !result.sources.is_empty() {
        println!("Sources:");
        for source in &result.sources {
            println!("  - {source}");
        }
    }
    println!();
}

fn print_inline_error(err: &RagError) {
    eprintln!("error ({}): {err}", err.stage());
    if err.is_transient() {
        eprintln!("  the question can be retried");
    }
    if let Some(hint) = err.hint() {
        eprintln!("  hint: {hint}");
    }
}
