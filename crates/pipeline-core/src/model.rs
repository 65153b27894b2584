//! Loaded inference artifacts and the loader seam

use crate::onnx_utils::{create_session, OnnxError, RuntimeOptions};
use crate::preprocess::ImageTensor;
use ort::session::Session;
use ort::value::TensorRef;
use prismatic_common::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// A model that maps one image tensor to a score vector
pub trait InferenceModel: Send {
    fn predict(&mut self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Creates [`InferenceModel`]s from artifact files
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> std::result::Result<Box<dyn InferenceModel>, OnnxError>;
}

/// ONNX Runtime backed model
pub struct OnnxModel {
    session: Session,
}

impl OnnxModel {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl InferenceModel for OnnxModel {
    fn predict(&mut self, input: &ImageTensor) -> Result<Vec<f32>> {
        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| PipelineError::InferenceRuntime(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PipelineError::InferenceRuntime(e.to_string()))?;

        let (shape, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::InferenceRuntime(e.to_string()))?;

        if shape.len() != 2 || shape[0] != 1 {
            return Err(PipelineError::InferenceRuntime(format!(
                "Invalid model output shape: expected [1, classes], got {:?}",
                shape.to_vec()
            )));
        }

        Ok(scores.to_vec())
    }
}

/// Loads ONNX artifacts with shared runtime options
#[derive(Debug, Clone, Default)]
pub struct OnnxLoader {
    options: RuntimeOptions,
}

impl OnnxLoader {
    #[must_use]
    pub fn new(options: RuntimeOptions) -> Self {
        Self { options }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> std::result::Result<Box<dyn InferenceModel>, OnnxError> {
        let session = create_session(path, &self.options)?;
        Ok(Box::new(OnnxModel::new(session)))
    }
}

/// Shared handle to a loaded model.
///
/// Inference on one handle is serialized by its mutex; different handles run
/// in parallel.
pub struct ModelHandle {
    label: String,
    path: PathBuf,
    load_time: Duration,
    model: Mutex<Box<dyn InferenceModel>>,
}

impl ModelHandle {
    pub fn new(
        label: impl Into<String>,
        path: impl Into<PathBuf>,
        load_time: Duration,
        model: Box<dyn InferenceModel>,
    ) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            load_time,
            model: Mutex::new(model),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    /// Run inference, waiting for any in-flight call on this handle
    pub fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let mut model = self.model.lock().map_err(|e| {
            PipelineError::InferenceRuntime(format!(
                "Failed to lock {} model: {}",
                self.label, e
            ))
        })?;
        model.predict(input)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("label", &self.label)
            .field("path", &self.path)
            .field("load_time", &self.load_time)
            .finish_non_exhaustive()
    }
}
