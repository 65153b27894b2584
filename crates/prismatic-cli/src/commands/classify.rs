//! Classify image files through the two-stage pipeline

use super::ModelArgs;
use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use prismatic_core::{ClassificationPipeline, ClassificationResult, ErrorKind, PipelineError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One summary line per image
    Text,
    /// JSON array of per-image records
    Json,
}

#[derive(Args)]
pub struct ClassifyCommand {
    /// Image files to classify
    #[arg(value_name = "FILES", required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    kind: ErrorKind,
    retryable: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct FileOutcome {
    file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

impl FileOutcome {
    fn new(file: PathBuf, outcome: Result<ClassificationResult, PipelineError>) -> Self {
        match outcome {
            Ok(result) => Self {
                file,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                file,
                result: None,
                error: Some(ErrorReport {
                    kind: e.kind(),
                    retryable: e.is_retryable(),
                    message: e.to_string(),
                }),
            },
        }
    }

    fn to_line(&self) -> String {
        match (&self.result, &self.error) {
            (Some(result), _) => format!("{}: {}", self.file.display(), result.summary()),
            (None, Some(error)) => format!("{}: error: {}", self.file.display(), error.message),
            (None, None) => format!("{}: no result", self.file.display()),
        }
    }
}

impl ClassifyCommand {
    pub async fn execute(self) -> Result<()> {
        let start = Instant::now();
        let config = self.model.load_config()?;

        // Router load is blocking and may take seconds
        let pipeline =
            tokio::task::spawn_blocking(move || ClassificationPipeline::from_config(&config))
                .await
                .context("Pipeline initialization task failed")?
                .context("Failed to initialize classification pipeline")?;
        let pipeline = Arc::new(pipeline);

        let mut tasks = JoinSet::new();
        for (index, path) in self.inputs.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&pipeline);
            tasks.spawn(async move {
                let outcome = match tokio::fs::read(&path).await {
                    Ok(bytes) => pipeline.classify_async(bytes).await,
                    Err(e) => Err(PipelineError::Decode(format!(
                        "Failed to read {}: {}",
                        path.display(),
                        e
                    ))),
                };
                (index, FileOutcome::new(path, outcome))
            });
        }

        let mut outcomes: Vec<Option<FileOutcome>> = (0..self.inputs.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.context("Classification task panicked")?;
            outcomes[index] = Some(outcome);
        }
        let outcomes: Vec<FileOutcome> = outcomes.into_iter().flatten().collect();

        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcomes).context("Failed to serialize results")?
                );
            }
            OutputFormat::Text => {
                for outcome in &outcomes {
                    println!("{}", outcome.to_line());
                }
            }
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(
            "Classified {} image(s) in {:.2}s ({} failed)",
            outcomes.len(),
            start.elapsed().as_secs_f64(),
            failed
        );

        if failed > 0 {
            anyhow::bail!("{} of {} image(s) failed", failed, outcomes.len());
        }
        Ok(())
    }
}
