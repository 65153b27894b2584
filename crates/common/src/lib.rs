/// Common types for the two-stage medical image classifier
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Number of imaging domains the router model distinguishes
pub const DOMAIN_COUNT: usize = 12;

/// Clinical imaging domain selected by the router model.
///
/// Discriminants are the router model's output positions. The order is part of
/// the trained model's contract: reordering variants silently misroutes every
/// image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DatasetDomain {
    BloodMnist = 0,
    BreastMnist = 1,
    ChestMnist = 2,
    DermaMnist = 3,
    OctMnist = 4,
    OrganAMnist = 5,
    OrganCMnist = 6,
    OrganSMnist = 7,
    PathMnist = 8,
    PneumoniaMnist = 9,
    RetinaMnist = 10,
    TissueMnist = 11,
}

// ALL[i] must carry discriminant i
const _: () = {
    let mut i = 0;
    while i < DatasetDomain::ALL.len() {
        assert!(DatasetDomain::ALL[i] as usize == i);
        i += 1;
    }
};

impl DatasetDomain {
    /// All domains in router output order
    pub const ALL: [DatasetDomain; DOMAIN_COUNT] = [
        DatasetDomain::BloodMnist,
        DatasetDomain::BreastMnist,
        DatasetDomain::ChestMnist,
        DatasetDomain::DermaMnist,
        DatasetDomain::OctMnist,
        DatasetDomain::OrganAMnist,
        DatasetDomain::OrganCMnist,
        DatasetDomain::OrganSMnist,
        DatasetDomain::PathMnist,
        DatasetDomain::PneumoniaMnist,
        DatasetDomain::RetinaMnist,
        DatasetDomain::TissueMnist,
    ];

    /// Position of this domain in the router's output vector
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Map a router output position back to its domain
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Canonical name, also used to derive artifact file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DatasetDomain::BloodMnist => "bloodmnist",
            DatasetDomain::BreastMnist => "breastmnist",
            DatasetDomain::ChestMnist => "chestmnist",
            DatasetDomain::DermaMnist => "dermamnist",
            DatasetDomain::OctMnist => "octmnist",
            DatasetDomain::OrganAMnist => "organamnist",
            DatasetDomain::OrganCMnist => "organcmnist",
            DatasetDomain::OrganSMnist => "organsmnist",
            DatasetDomain::PathMnist => "pathmnist",
            DatasetDomain::PneumoniaMnist => "pneumoniamnist",
            DatasetDomain::RetinaMnist => "retinamnist",
            DatasetDomain::TissueMnist => "tissuemnist",
        }
    }

    /// Human-readable description of the imaging modality
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            DatasetDomain::BloodMnist => "blood cell microscopy",
            DatasetDomain::BreastMnist => "breast ultrasound",
            DatasetDomain::ChestMnist => "chest X-ray",
            DatasetDomain::DermaMnist => "dermatoscope skin lesion images",
            DatasetDomain::OctMnist => "retinal OCT",
            DatasetDomain::OrganAMnist => "abdominal CT, axial",
            DatasetDomain::OrganCMnist => "abdominal CT, coronal",
            DatasetDomain::OrganSMnist => "abdominal CT, sagittal",
            DatasetDomain::PathMnist => "colon pathology",
            DatasetDomain::PneumoniaMnist => "pediatric chest X-ray",
            DatasetDomain::RetinaMnist => "retinal fundus photography",
            DatasetDomain::TissueMnist => "kidney cortex microscopy",
        }
    }
}

impl fmt::Display for DatasetDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetDomain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == name)
            .ok_or_else(|| UnknownDomain(s.to_string()))
    }
}

impl TryFrom<String> for DatasetDomain {
    type Error = UnknownDomain;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        name.parse()
    }
}

/// Returned when a string names no known domain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown dataset domain: {0}")]
pub struct UnknownDomain(pub String);

/// Router output for a single request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub domain: DatasetDomain,
    pub confidence: f32,
}

/// Expert model output for a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertPrediction {
    pub class_index: usize,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

/// Final two-stage classification outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub routed_dataset: DatasetDomain,
    pub router_confidence: f32,
    pub predicted_class_index: usize,
    pub predicted_class_confidence: f32,
    /// One probability per expert class, summing to 1
    #[serde(alias = "all_class_probs")]
    pub all_class_probabilities: Vec<f32>,
    /// Class name, when the model manifest provides labels for this domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_label: Option<String>,
}

impl ClassificationResult {
    /// Assemble a result from the two stage outputs
    #[must_use]
    pub fn from_stages(decision: RouterDecision, prediction: ExpertPrediction) -> Self {
        Self {
            routed_dataset: decision.domain,
            router_confidence: decision.confidence,
            predicted_class_index: prediction.class_index,
            predicted_class_confidence: prediction.confidence,
            all_class_probabilities: prediction.probabilities,
            predicted_label: None,
        }
    }

    /// Diagnosis summary handed to conversational consumers.
    ///
    /// The format is stable:
    /// `<domain> (<description>): class <index>[ "<label>"] (<pct>% confidence); routed with <pct>% confidence`
    #[must_use]
    pub fn summary(&self) -> String {
        let label = self
            .predicted_label
            .as_deref()
            .map(|l| format!(" \"{l}\""))
            .unwrap_or_default();
        format!(
            "{} ({}): class {}{} ({:.1}% confidence); routed with {:.1}% confidence",
            self.routed_dataset,
            self.routed_dataset.description(),
            self.predicted_class_index,
            label,
            self.predicted_class_confidence * 100.0,
            self.router_confidence * 100.0,
        )
    }
}

/// Boundary classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller must fix the input
    BadInput,
    /// The routed domain has no expert deployed
    NotFound,
    /// The router is not deployed
    Unavailable,
    /// The model runtime failed
    Internal,
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Router model unavailable: {0}")]
    RouterUnavailable(String),

    #[error("No expert model for dataset '{domain}' at {}", path.display())]
    ModelNotFound {
        domain: DatasetDomain,
        path: PathBuf,
    },

    #[error("Inference runtime error: {0}")]
    InferenceRuntime(String),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Decode(_) => ErrorKind::BadInput,
            PipelineError::ModelNotFound { .. } => ErrorKind::NotFound,
            PipelineError::RouterUnavailable(_) => ErrorKind::Unavailable,
            PipelineError::InferenceRuntime(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may succeed later without changing the input.
    ///
    /// Missing artifacts can be deployed and runtime faults may be transient.
    /// Nothing in this crate retries; this is advice for the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Decode(_))
    }

    /// Domain named by the error, if any
    #[must_use]
    pub fn domain(&self) -> Option<DatasetDomain> {
        match self {
            PipelineError::ModelNotFound { domain, .. } => Some(*domain),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
