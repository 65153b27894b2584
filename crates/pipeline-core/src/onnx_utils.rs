//! ONNX Runtime session creation
//!
//! Sessions are built with full graph optimizations and a configurable
//! intra-op thread count. With [`ExecutionTarget::Auto`] the execution
//! providers are tried in order of performance:
//! 1. **CoreML** (macOS): Apple Neural Engine + GPU
//! 2. **CUDA** (NVIDIA GPUs)
//! 3. **CPU** (always available)
//!
//! If CoreML fails to compile the model, the session is rebuilt with CUDA/CPU only.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    /// CoreML, then CUDA, then CPU
    #[default]
    Auto,
    Cpu,
}

/// Session tuning shared by every model the pipeline loads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Intra-op threads per session (default: physical core count)
    pub intra_threads: Option<usize>,
    pub execution: ExecutionTarget,
}

impl RuntimeOptions {
    #[must_use]
    pub fn threads(&self) -> usize {
        self.intra_threads
            .filter(|n| *n > 0)
            .unwrap_or_else(num_cpus::get_physical)
    }
}

fn base_builder(num_threads: usize) -> Result<SessionBuilder, OnnxError> {
    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))
}

/// Create an optimized ONNX Runtime session for `model_path`
///
/// # Errors
/// [`OnnxError::ModelNotFound`] if the file is absent, otherwise a builder or load error
pub fn create_session(model_path: &Path, options: &RuntimeOptions) -> Result<Session, OnnxError> {
    if !model_path.is_file() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = options.threads();
    let start = Instant::now();

    let session = match options.execution {
        ExecutionTarget::Cpu => base_builder(num_threads)?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| OnnxError::ModelLoadError {
                path: model_path.display().to_string(),
                error: e.to_string(),
            })?,
        ExecutionTarget::Auto => {
            let attempt = base_builder(num_threads)?
                .with_execution_providers([
                    CoreMLExecutionProvider::default().with_subgraphs(true).build(),
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
                .commit_from_file(model_path);

            match attempt {
                Ok(session) => session,
                Err(e) => {
                    let error_msg = e.to_string();
                    if !(error_msg.contains("CoreML") || error_msg.contains("MLModel")) {
                        return Err(OnnxError::ModelLoadError {
                            path: model_path.display().to_string(),
                            error: error_msg,
                        });
                    }

                    warn!(
                        "CoreML failed for {}: {}; retrying with CUDA/CPU only",
                        model_path.display(),
                        error_msg
                    );
                    base_builder(num_threads)?
                        .with_execution_providers([
                            CUDAExecutionProvider::default().build(),
                            CPUExecutionProvider::default().build(),
                        ])
                        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
                        .commit_from_file(model_path)
                        .map_err(|e| OnnxError::ModelLoadError {
                            path: model_path.display().to_string(),
                            error: format!("CoreML failed, CPU/CUDA also failed: {}", e),
                        })?
                }
            }
        }
    };

    debug!(
        "Session created for {} in {:.3}s ({} threads, {:?})",
        model_path.display(),
        start.elapsed().as_secs_f64(),
        num_threads,
        options.execution
    );
    Ok(session)
}
