//! Scripted models for pipeline tests
//!
//! `FakeLoader` stands in for ONNX Runtime: it counts loads per artifact and
//! hands out models whose scores are set by the test.
#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use prismatic_core::{
    ArtifactLayout, DatasetDomain, ImageTensor, InferenceModel, ModelLoader, OnnxError,
    PipelineError,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub const ROUTER_FILE: &str = "stage1_router.onnx";

/// Router output with index 4 (octmnist) on top
pub fn router_scores_index_4() -> Vec<f32> {
    vec![
        0.02, 0.01, 0.01, 0.01, 0.91, 0.01, 0.01, 0.0, 0.01, 0.0, 0.0, 0.01,
    ]
}

/// Router output that selects `domain` with the given confidence
pub fn router_scores_for(domain: DatasetDomain, confidence: f32) -> Vec<f32> {
    let rest = (1.0 - confidence) / 11.0;
    let mut scores = vec![rest; 12];
    scores[domain.index()] = confidence;
    scores
}

#[derive(Default)]
struct Shared {
    router_scores: Vec<f32>,
    expert_scores: Vec<f32>,
    /// Successful loads per artifact file name
    loads: HashMap<String, usize>,
    /// Artifact file names in inference order
    predictions: Vec<String>,
    fail_inference: bool,
}

/// Counting loader backed by scripted scores
#[derive(Clone)]
pub struct FakeLoader {
    shared: Arc<Mutex<Shared>>,
    load_delay: Duration,
}

impl FakeLoader {
    pub fn new(router_scores: Vec<f32>, expert_scores: Vec<f32>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                router_scores,
                expert_scores,
                ..Shared::default()
            })),
            load_delay: Duration::ZERO,
        }
    }

    /// Make every load sleep, widening the window for concurrent loads
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn set_router_scores(&self, scores: Vec<f32>) {
        self.shared.lock().unwrap().router_scores = scores;
    }

    pub fn set_expert_scores(&self, scores: Vec<f32>) {
        self.shared.lock().unwrap().expert_scores = scores;
    }

    pub fn fail_inference(&self) {
        self.shared.lock().unwrap().fail_inference = true;
    }

    pub fn load_count(&self, file_name: &str) -> usize {
        self.shared
            .lock()
            .unwrap()
            .loads
            .get(file_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.shared.lock().unwrap().loads.values().sum()
    }

    /// Artifact names that served predictions, router excluded
    pub fn expert_predictions(&self) -> Vec<String> {
        self.shared
            .lock()
            .unwrap()
            .predictions
            .iter()
            .filter(|name| name.as_str() != ROUTER_FILE)
            .cloned()
            .collect()
    }
}

struct FakeModel {
    file_name: String,
    is_router: bool,
    shared: Arc<Mutex<Shared>>,
}

impl InferenceModel for FakeModel {
    fn predict(&mut self, input: &ImageTensor) -> Result<Vec<f32>, PipelineError> {
        assert_eq!(input.shape(), &[1, 64, 64, 3]);
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_inference {
            return Err(PipelineError::InferenceRuntime(format!(
                "{} crashed",
                self.file_name
            )));
        }
        shared.predictions.push(self.file_name.clone());
        Ok(if self.is_router {
            shared.router_scores.clone()
        } else {
            shared.expert_scores.clone()
        })
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>, OnnxError> {
        if !self.load_delay.is_zero() {
            thread::sleep(self.load_delay);
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if std::fs::read(path).map(|b| b == b"corrupt").unwrap_or(false) {
            return Err(OnnxError::ModelLoadError {
                path: path.display().to_string(),
                error: "protobuf parsing failed".to_string(),
            });
        }

        *self
            .shared
            .lock()
            .unwrap()
            .loads
            .entry(file_name.clone())
            .or_insert(0) += 1;

        Ok(Box::new(FakeModel {
            is_router: file_name == ROUTER_FILE,
            file_name,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Model directory with the router and experts for `domains`
pub struct ModelDir {
    pub dir: TempDir,
}

impl ModelDir {
    pub fn new(with_router: bool, domains: &[DatasetDomain]) -> Self {
        let model_dir = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        if with_router {
            std::fs::write(model_dir.dir.path().join(ROUTER_FILE), b"router").unwrap();
        }
        for &domain in domains {
            model_dir.deploy(domain);
        }
        model_dir
    }

    /// Router plus every expert
    pub fn complete() -> Self {
        Self::new(true, &DatasetDomain::ALL)
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::with_defaults(self.dir.path())
    }

    pub fn deploy(&self, domain: DatasetDomain) {
        std::fs::write(self.layout().expert_path(domain), b"expert").unwrap();
    }

    pub fn remove(&self, domain: DatasetDomain) {
        std::fs::remove_file(self.layout().expert_path(domain)).unwrap();
    }

    pub fn corrupt(&self, domain: DatasetDomain) {
        std::fs::write(self.layout().expert_path(domain), b"corrupt").unwrap();
    }
}

pub fn expert_file(domain: DatasetDomain) -> String {
    format!("stage2_{}_final.onnx", domain)
}

/// Small PNG-encoded test image
pub fn sample_png() -> Vec<u8> {
    let img = ImageBuffer::from_fn(96, 80, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}
