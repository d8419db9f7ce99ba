mod cli;
mod commands;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use lecture_rag::RagError;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(&cli.global)?;

    match cli.command {
        Command::PullDocs => commands::pull_docs(&settings).await,
        Command::Build { raw_dir, output_dir } => {
            commands::build(&settings, raw_dir, output_dir).await.map(|_| ())
        }
        Command::Push { index_dir } => commands::push(&settings, index_dir).await,
        Command::Pipeline => commands::pipeline(&settings).await,
        Command::Ask { question, source } => commands::ask(&settings, &question, source.local).await,
        Command::Chat { source } => commands::chat(&settings, source.local).await,
        Command::Eval { output, questions, source } => {
            commands::eval(&settings, output, questions, source.local).await
        }
        Command::Storage => commands::storage(&settings).await,
    }
}

/// `RUST_LOG` wins; otherwise warnings, raised by each `-v`.
fn init_logging(verbose: u8, format: LogFormat) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Print one diagnostic naming the failing stage, plus a next step when known.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<RagError>() {
        Some(rag) => {
            eprintln!("error ({} failed): {rag}", rag.stage());
            if let Some(hint) = rag.hint() {
                eprintln!("hint: {hint}");
            }
        }
        None => eprintln!("error: {err:#}"),
    }
}
