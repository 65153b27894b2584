pub mod classify;
pub mod domains;
pub mod verify;

use anyhow::{Context as _, Result};
use clap::Args;
use prismatic_core::PipelineConfig;
use std::path::PathBuf;

/// Where to find the pipeline configuration and models
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model directory (overrides the config file and PRISMATIC_MODEL_DIR)
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Run inference on CPU only
    #[arg(long)]
    cpu: bool,
}

impl ModelArgs {
    /// Config file, then environment, then command-line flags
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let config = match &self.config {
            Some(path) => PipelineConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let mut config = config.with_env_overrides();
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if self.cpu {
            config.runtime.execution = prismatic_core::ExecutionTarget::Cpu;
        }
        Ok(config)
    }
}
