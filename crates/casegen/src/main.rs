//! `casegen`: generate test cases from a requirement document, or score
//! AI-generated cases against a golden set.
//!
//! # Usage
//!
//! ```bash
//! casegen generate --input requirements.md --output-dir out
//! casegen evaluate --ai out/testcases/test_cases-20260101120000.json --golden golden.json
//! casegen check --config casegen.toml
//!
//! # Endpoint overrides
//! CASEGEN_BASE_URL=http://localhost:8000/v1 CASEGEN_MODEL=qwen casegen generate --input req.md
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use case_quality::normalize_case_document;
use casegen::artifacts::{persist_collection, persist_score_report};
use casegen::{
    CasegenConfig, ChatCompletionInvoker, DocumentExtractor, Evaluator, EvaluatorSettings,
    FsArtifactSink, Pipeline, PipelineSettings, PlainTextExtractor, RunContext,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the generation pipeline over one requirement document
    Generate {
        /// Requirement document (.txt, .md, .markdown)
        #[arg(long)]
        input: PathBuf,
        /// Output root (overrides config and CASEGEN_OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare AI-generated cases against a golden set
    Evaluate {
        /// AI-generated case file (any recognized layout)
        #[arg(long)]
        ai: PathBuf,
        /// Golden reference case file
        #[arg(long)]
        golden: PathBuf,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Probe the configured model endpoint
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>, output_dir: Option<PathBuf>) -> Result<CasegenConfig> {
    let mut config = CasegenConfig::load(path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    Ok(config)
}

fn build_invoker(config: &CasegenConfig) -> Result<Arc<ChatCompletionInvoker>> {
    let invoker =
        ChatCompletionInvoker::new(config).context("Failed to build model client")?;
    Ok(Arc::new(invoker))
}

async fn generate(input: &Path, config: CasegenConfig) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read input document {}", input.display()))?;
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let text = PlainTextExtractor.extract(&bytes, filename)?;

    let ctx = RunContext::new(filename, &config.endpoint.model);
    let pipeline = Pipeline::new(build_invoker(&config)?, PipelineSettings::from(&config));
    let report = pipeline.run(&ctx, &text).await?;

    let sink = FsArtifactSink::new(&config.output_dir);
    let paths = persist_collection(&sink, &ctx, &report.collection)?;

    if !report.collection.failed_cases.is_empty() {
        warn!(
            failed = report.collection.failed_cases.len(),
            "some requirement points produced no case"
        );
    }
    info!(
        run_id = %report.run_id,
        title = %report.title,
        cases = report.collection.len(),
        summary = %report.dedup_summary,
        elapsed_ms = report.elapsed_ms,
        "generation finished"
    );
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

async fn evaluate(ai: &Path, golden: &Path, config: CasegenConfig) -> Result<()> {
    let read_cases = |path: &Path| -> Result<_> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read case file {}", path.display()))?;
        normalize_case_document(&raw)
            .with_context(|| format!("Failed to load case file {}", path.display()))
    };
    let ai_cases = read_cases(ai)?;
    let golden_cases = read_cases(golden)?;

    let ctx = RunContext::new("evaluation", &config.endpoint.model);
    let evaluator = Evaluator::new(
        build_invoker(&config)?,
        EvaluatorSettings::from(&config.evaluation),
    );
    let Some(score) = evaluator.evaluate(&ctx, &ai_cases, &golden_cases).await else {
        bail!("Evaluation failed: the model could not be reached");
    };

    let sink = FsArtifactSink::new(&config.output_dir);
    for path in persist_score_report(&sink, &ctx, &score)? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn check(config: CasegenConfig) -> Result<()> {
    let reachable =
        casegen::invoker::check_endpoint(&config.endpoint.base_url, &config.endpoint.api_key)
            .await;
    if !reachable {
        bail!("Model endpoint {} is not reachable", config.endpoint.base_url);
    }
    println!("{} reachable ({})", config.endpoint.base_url, config.endpoint.model);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Generate {
            input,
            output_dir,
            config,
        } => generate(&input, load_config(config.as_deref(), output_dir)?).await,
        Command::Evaluate {
            ai,
            golden,
            output_dir,
            config,
        } => evaluate(&ai, &golden, load_config(config.as_deref(), output_dir)?).await,
        Command::Check { config } => check(load_config(config.as_deref(), None)?).await,
    }
}
