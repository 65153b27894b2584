//! Optional `manifest.yaml` shipped next to the model artifacts
//!
//! The manifest pins what the trained models assume about their inputs and
//! outputs so drift is caught at startup instead of as silent accuracy loss:
//!
//! ```yaml
//! domains: [bloodmnist, breastmnist, chestmnist, dermamnist, octmnist,
//!           organamnist, organcmnist, organsmnist, pathmnist,
//!           pneumoniamnist, retinamnist, tissuemnist]
//! preprocessing_fingerprint: "<PreprocessSpec::TRAINING.fingerprint()>"
//! class_labels:
//!   pneumoniamnist: [normal, pneumonia]
//! ```

use crate::error::ConfigError;
use crate::preprocess::PreprocessSpec;
use prismatic_common::DatasetDomain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelManifest {
    /// Router output order used at training time
    pub domains: Option<Vec<String>>,
    /// Fingerprint of the training-time preprocessing
    pub preprocessing_fingerprint: Option<String>,
    /// Class names per domain, in expert output order
    pub class_labels: BTreeMap<DatasetDomain, Vec<String>>,
}

impl ModelManifest {
    /// Load the manifest if present; a missing file yields `None`
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.is_file() {
            warn!(
                "No model manifest at {}; domain order and preprocessing are not cross-checked",
                path.display()
            );
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let manifest: ModelManifest = serde_yaml::from_str(&contents)?;
        debug!("Loaded model manifest from {}", path.display());
        Ok(Some(manifest))
    }

    /// Check the manifest against the pinned domain order and preprocessing
    pub fn validate(&self, spec: &PreprocessSpec) -> Result<(), ConfigError> {
        if let Some(found) = &self.domains {
            let expected: Vec<String> = DatasetDomain::ALL
                .iter()
                .map(|d| d.as_str().to_string())
                .collect();
            let normalized: Vec<String> = found
                .iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .collect();
            if normalized != expected {
                return Err(ConfigError::DomainOrder {
                    expected,
                    found: found.clone(),
                });
            }
        }

        if let Some(found) = &self.preprocessing_fingerprint {
            let expected = spec.fingerprint();
            if !found.eq_ignore_ascii_case(&expected) {
                return Err(ConfigError::PreprocessingDrift {
                    expected,
                    found: found.clone(),
                });
            }
        }

        Ok(())
    }

    /// Label of `class_index` for `domain`, if the manifest lists one
    #[must_use]
    pub fn label(&self, domain: DatasetDomain, class_index: usize) -> Option<&str> {
        self.class_labels
            .get(&domain)
            .and_then(|labels| labels.get(class_index))
            .map(String::as_str)
    }
}
