//! Pipeline configuration and model artifact layout

use crate::error::ConfigError;
use crate::onnx_utils::RuntimeOptions;
use prismatic_common::DatasetDomain;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder replaced by the domain's canonical name in expert file names
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// Pipeline configuration, usually loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the router, the experts and the manifest
    pub model_dir: PathBuf,
    /// Router artifact file name
    pub router_artifact: String,
    /// Expert artifact file name pattern, must contain `{domain}`
    pub expert_artifact_pattern: String,
    /// Manifest file name (optional file)
    pub manifest_file: String,
    /// ONNX Runtime tuning
    pub runtime: RuntimeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            router_artifact: "stage1_router.onnx".to_string(),
            expert_artifact_pattern: "stage2_{domain}_final.onnx".to_string(),
            manifest_file: "manifest.yaml".to_string(),
            runtime: RuntimeOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml(yaml_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(yaml_path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.layout()?;
        Ok(config)
    }

    /// Apply `PRISMATIC_MODEL_DIR` and `PRISMATIC_THREADS` from the environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PRISMATIC_MODEL_DIR").filter(|d| !d.is_empty()) {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(threads) = lookup("PRISMATIC_THREADS").and_then(|s| s.parse::<usize>().ok()) {
            self.runtime.intra_threads = Some(threads);
        }
        self
    }

    /// Validated artifact layout
    pub fn layout(&self) -> Result<ArtifactLayout, ConfigError> {
        ArtifactLayout::new(
            &self.model_dir,
            &self.router_artifact,
            &self.expert_artifact_pattern,
        )
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.model_dir.join(&self.manifest_file)
    }
}

/// Deterministic artifact paths inside the model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    model_dir: PathBuf,
    router_artifact: String,
    expert_pattern: String,
}

impl ArtifactLayout {
    pub fn new(
        model_dir: impl Into<PathBuf>,
        router_artifact: impl Into<String>,
        expert_pattern: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let router_artifact = router_artifact.into();
        let expert_pattern = expert_pattern.into();

        if router_artifact.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "router_artifact must not be empty".to_string(),
            ));
        }
        if !expert_pattern.contains(DOMAIN_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "expert_artifact_pattern '{}' must contain {}",
                expert_pattern, DOMAIN_PLACEHOLDER
            )));
        }
        if expert_pattern.replace(DOMAIN_PLACEHOLDER, "x") == router_artifact {
            return Err(ConfigError::Invalid(
                "expert_artifact_pattern collides with router_artifact".to_string(),
            ));
        }

        Ok(Self {
            model_dir: model_dir.into(),
            router_artifact,
            expert_pattern,
        })
    }

    /// Layout with the default file names under `model_dir`
    #[must_use]
    pub fn with_defaults(model_dir: impl Into<PathBuf>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            model_dir: model_dir.into(),
            router_artifact: defaults.router_artifact,
            expert_pattern: defaults.expert_artifact_pattern,
        }
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    #[must_use]
    pub fn router_path(&self) -> PathBuf {
        self.model_dir.join(&self.router_artifact)
    }

    #[must_use]
    pub fn expert_path(&self, domain: DatasetDomain) -> PathBuf {
        self.model_dir
            .join(self.expert_pattern.replace(DOMAIN_PLACEHOLDER, domain.as_str()))
    }
}
