//! Prismatic core - two-stage medical image classification
//!
//! A router model assigns an image to one of twelve imaging domains, then the
//! expert model for that domain produces the final class.

pub mod config;
pub mod error;
pub mod expert;
pub mod manifest;
pub mod model;
pub mod model_cache;
pub mod onnx_utils;
pub mod pipeline;
pub mod preprocess;
pub mod router;
pub mod scores;

pub use config::{ArtifactLayout, PipelineConfig};
pub use error::ConfigError;
pub use expert::ExpertClassifier;
pub use manifest::ModelManifest;
pub use model::{InferenceModel, ModelHandle, ModelLoader, OnnxLoader};
pub use model_cache::{ArtifactStatus, CacheStats, ModelCache};
pub use onnx_utils::{ExecutionTarget, OnnxError, RuntimeOptions};
pub use pipeline::{ClassificationPipeline, Stage};
pub use preprocess::{ImageTensor, PreprocessSpec, Preprocessor};
pub use router::DomainRouter;

pub use prismatic_common::{
    ClassificationResult, DatasetDomain, ErrorKind, ExpertPrediction, PipelineError,
    RouterDecision,
};
