//! Startup and configuration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Manifest domain order {found:?} does not match router order {expected:?}")]
    DomainOrder {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Preprocessing fingerprint mismatch: manifest pins {found}, pipeline uses {expected}")]
    PreprocessingDrift { expected: String, found: String },

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
