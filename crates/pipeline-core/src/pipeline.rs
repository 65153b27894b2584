//! Request orchestration: preprocess, route, classify
//!
//! Each call walks `Received -> Preprocessed -> Routed -> Classified -> Completed`.
//! The first failing stage moves the request to `Failed` and the error is
//! returned unchanged. Nothing is retried and nothing is kept between calls
//! except the models held by the [`ModelCache`].

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::expert::ExpertClassifier;
use crate::manifest::ModelManifest;
use crate::model::{ModelLoader, OnnxLoader};
use crate::model_cache::ModelCache;
use crate::preprocess::{PreprocessSpec, Preprocessor};
use crate::router::DomainRouter;
use prismatic_common::{ClassificationResult, ErrorKind, PipelineError, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Request lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Preprocessed,
    Routed,
    Classified,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Preprocessed => "preprocessed",
            Stage::Routed => "routed",
            Stage::Classified => "classified",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Two-stage classification pipeline
#[derive(Debug)]
pub struct ClassificationPipeline {
    preprocessor: Preprocessor,
    cache: Arc<ModelCache>,
    router: DomainRouter,
    expert: ExpertClassifier,
    manifest: ModelManifest,
}

impl ClassificationPipeline {
    /// Build an ONNX Runtime backed pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> std::result::Result<Self, ConfigError> {
        let loader = Arc::new(OnnxLoader::new(config.runtime.clone()));
        Self::with_loader(config, loader)
    }

    /// Build a pipeline whose models come from `loader`
    ///
    /// Validates the manifest (when present) before the router is loaded.
    pub fn with_loader(
        config: &PipelineConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> std::result::Result<Self, ConfigError> {
        let layout = config.layout()?;
        let preprocessor = Preprocessor::new();

        let manifest = match ModelManifest::load_optional(&config.manifest_path())? {
            Some(manifest) => {
                manifest.validate(preprocessor.spec())?;
                manifest
            }
            None => ModelManifest::default(),
        };

        info!(
            "Initializing classification pipeline from {}",
            layout.model_dir().display()
        );
        let cache = Arc::new(ModelCache::new(layout, loader));
        Ok(Self::from_parts(preprocessor, cache, manifest))
    }

    /// Pipeline over an existing cache with the training preprocessing and no labels
    #[must_use]
    pub fn from_cache(cache: Arc<ModelCache>) -> Self {
        Self::from_parts(
            Preprocessor::with_spec(PreprocessSpec::TRAINING),
            cache,
            ModelManifest::default(),
        )
    }

    fn from_parts(
        preprocessor: Preprocessor,
        cache: Arc<ModelCache>,
        manifest: ModelManifest,
    ) -> Self {
        Self {
            preprocessor,
            router: DomainRouter::new(Arc::clone(&cache)),
            expert: ExpertClassifier::new(Arc::clone(&cache)),
            cache,
            manifest,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    #[must_use]
    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Classify one encoded image
    ///
    /// # Errors
    /// The first stage failure: [`PipelineError::Decode`] for bad input,
    /// [`PipelineError::RouterUnavailable`], [`PipelineError::ModelNotFound`]
    /// for an undeployed domain, or [`PipelineError::InferenceRuntime`]
    pub fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult> {
        let start = Instant::now();
        let mut stage = Stage::Received;

        match self.run(image_bytes, &mut stage) {
            Ok(result) => {
                debug!(
                    "Classification completed in {:.1}ms: {}",
                    start.elapsed().as_secs_f64() * 1000.0,
                    result.summary()
                );
                Ok(result)
            }
            Err(e) => {
                debug!("Stage {} -> {}", stage, Stage::Failed);
                match e.kind() {
                    ErrorKind::Internal => {
                        error!("Classification failed after stage {}: {}", stage, e)
                    }
                    _ => warn!("Classification failed after stage {}: {}", stage, e),
                }
                Err(e)
            }
        }
    }

    fn run(&self, image_bytes: &[u8], stage: &mut Stage) -> Result<ClassificationResult> {
        let tensor = self.preprocessor.preprocess(image_bytes)?;
        advance(stage, Stage::Preprocessed);

        let decision = self.router.route(&tensor)?;
        advance(stage, Stage::Routed);

        let prediction = self.expert.classify(&tensor, decision.domain)?;
        advance(stage, Stage::Classified);

        let mut result = ClassificationResult::from_stages(decision, prediction);
        result.predicted_label = self
            .manifest
            .label(result.routed_dataset, result.predicted_class_index)
            .map(str::to_string);
        advance(stage, Stage::Completed);

        Ok(result)
    }

    /// Classify an image file
    pub fn classify_file(&self, path: impl AsRef<Path>) -> Result<ClassificationResult> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::Decode(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.classify(&bytes)
    }

    /// Classify on the blocking thread pool so async callers are not stalled
    pub async fn classify_async(
        self: &Arc<Self>,
        image_bytes: Vec<u8>,
    ) -> Result<ClassificationResult> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.classify(&image_bytes))
            .await
            .map_err(|e| {
                PipelineError::InferenceRuntime(format!("Classification task failed: {}", e))
            })?
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Stage {} -> {}", stage, next);
    *stage = next;
}
