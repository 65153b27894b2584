//! Second stage: domain-specific classification

use crate::model_cache::ModelCache;
use crate::preprocess::ImageTensor;
use crate::scores::{argmax, to_distribution};
use prismatic_common::{DatasetDomain, ExpertPrediction, PipelineError, Result};
use std::sync::Arc;
use tracing::debug;

/// Runs the expert model of a routed domain
#[derive(Debug, Clone)]
pub struct ExpertClassifier {
    cache: Arc<ModelCache>,
}

impl ExpertClassifier {
    #[must_use]
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self { cache }
    }

    /// Classify `tensor` with the expert for `domain`, loading it if needed
    ///
    /// # Errors
    /// [`PipelineError::ModelNotFound`] if the domain has no deployed expert,
    /// [`PipelineError::InferenceRuntime`] if loading or inference fails
    pub fn classify(
        &self,
        tensor: &ImageTensor,
        domain: DatasetDomain,
    ) -> Result<ExpertPrediction> {
        let expert = self.cache.get_expert(domain)?;
        let scores = expert.predict(tensor)?;
        let prediction = predict_from_scores(scores)?;
        debug!(
            "Expert {} predicted class {} ({:.3} confidence)",
            domain, prediction.class_index, prediction.confidence
        );
        Ok(prediction)
    }
}

/// Pick the top raw score (lowest index on ties) and normalize the rest
pub fn predict_from_scores(scores: Vec<f32>) -> Result<ExpertPrediction> {
    let probabilities = to_distribution(scores.clone())?;
    let (class_index, _) = argmax(&scores).ok_or_else(|| {
        PipelineError::InferenceRuntime("expert produced no usable scores".to_string())
    })?;
    let confidence = probabilities[class_index];
    Ok(ExpertPrediction {
        class_index,
        confidence,
        probabilities,
    })
}
