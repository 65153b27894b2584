//! First stage: choose the imaging domain

use crate::model_cache::ModelCache;
use crate::preprocess::ImageTensor;
use crate::scores::{argmax, is_distribution, to_distribution};
use prismatic_common::{DatasetDomain, PipelineError, Result, RouterDecision, DOMAIN_COUNT};
use std::sync::Arc;
use tracing::debug;

/// Runs the router model and maps its output onto [`DatasetDomain`]
#[derive(Debug, Clone)]
pub struct DomainRouter {
    cache: Arc<ModelCache>,
}

impl DomainRouter {
    #[must_use]
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self { cache }
    }

    /// Pick the domain for `tensor`
    ///
    /// # Errors
    /// [`PipelineError::RouterUnavailable`] without a router,
    /// [`PipelineError::InferenceRuntime`] if inference fails or the output is malformed
    pub fn route(&self, tensor: &ImageTensor) -> Result<RouterDecision> {
        let router = self.cache.get_router()?;
        let scores = router.predict(tensor)?;
        let decision = decide(scores)?;
        debug!(
            "Routed to {} ({:.3} confidence)",
            decision.domain, decision.confidence
        );
        Ok(decision)
    }
}

/// Turn a router score vector into a decision.
///
/// The vector must hold one score per domain in [`DatasetDomain::ALL`] order.
/// The domain is the argmax of the raw scores (ties go to the lowest index).
/// Confidence is the raw score when the router already emits probabilities,
/// otherwise the normalized probability at that index.
pub fn decide(scores: Vec<f32>) -> Result<RouterDecision> {
    if scores.len() != DOMAIN_COUNT {
        return Err(PipelineError::InferenceRuntime(format!(
            "router produced {} scores, expected {}",
            scores.len(),
            DOMAIN_COUNT
        )));
    }

    let probabilities = to_distribution(scores.clone())?;
    let (index, raw) = argmax(&scores).ok_or_else(|| {
        PipelineError::InferenceRuntime("router produced no usable scores".to_string())
    })?;
    let confidence = if is_distribution(&scores) {
        raw
    } else {
        probabilities[index]
    };
    let domain = DatasetDomain::from_index(index).ok_or_else(|| {
        PipelineError::InferenceRuntime(format!("router index {} has no domain", index))
    })?;

    Ok(RouterDecision { domain, confidence })
}
