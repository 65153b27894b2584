//! Process-wide cache of loaded router and expert models
//!
//! The router is loaded eagerly when the cache is built. Experts are loaded on
//! first use, once per domain: each domain owns a pre-allocated
//! [`OnceCell`], so concurrent first requests for the same domain block on a
//! single initializer and all observe the same handle. Failed loads leave the
//! cell empty, so an artifact deployed later is picked up by the next call.
//! Nothing is evicted; handles live until the process exits.

use crate::config::ArtifactLayout;
use crate::model::{ModelHandle, ModelLoader};
use crate::onnx_utils::OnnxError;
use once_cell::sync::OnceCell;
use prismatic_common::{DatasetDomain, PipelineError, Result, DOMAIN_COUNT};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

enum RouterSlot {
    Ready(Arc<ModelHandle>),
    Unavailable(String),
}

/// Owner of every loaded model
pub struct ModelCache {
    layout: ArtifactLayout,
    loader: Arc<dyn ModelLoader>,
    router: RouterSlot,
    /// Indexed by `DatasetDomain::index()`
    experts: [OnceCell<Arc<ModelHandle>>; DOMAIN_COUNT],
    loads: AtomicUsize,
}

/// Snapshot of cache state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub router_available: bool,
    pub loaded_experts: Vec<DatasetDomain>,
    /// Successful artifact loads, router included
    pub loads: usize,
}

/// Deployment state of one expert artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub domain: DatasetDomain,
    pub path: PathBuf,
    pub present: bool,
    pub loaded: bool,
}

fn load_handle(
    loader: &dyn ModelLoader,
    loads: &AtomicUsize,
    label: &str,
    path: &Path,
) -> std::result::Result<Arc<ModelHandle>, OnnxError> {
    if !path.is_file() {
        return Err(OnnxError::ModelNotFound(path.display().to_string()));
    }

    info!("Loading {} model from {}", label, path.display());
    let start = Instant::now();
    let model = loader.load(path)?;
    let load_time = start.elapsed();
    loads.fetch_add(1, Ordering::SeqCst);

    info!(
        "{} model loaded in {:.3}s and cached for reuse",
        label,
        load_time.as_secs_f64()
    );
    Ok(Arc::new(ModelHandle::new(label, path, load_time, model)))
}

impl ModelCache {
    /// Build the cache and attempt to load the router.
    ///
    /// A missing or broken router does not fail construction; it is recorded
    /// and every later [`get_router`](Self::get_router) call fails.
    pub fn new(layout: ArtifactLayout, loader: Arc<dyn ModelLoader>) -> Self {
        let loads = AtomicUsize::new(0);
        let router_path = layout.router_path();

        let router = match load_handle(loader.as_ref(), &loads, "router", &router_path) {
            Ok(handle) => RouterSlot::Ready(handle),
            Err(OnnxError::ModelNotFound(path)) => {
                warn!(
                    "Router model not found at {}; classification is unavailable until it is deployed",
                    path
                );
                RouterSlot::Unavailable(format!("router artifact not found at {}", path))
            }
            Err(e) => {
                warn!("Router model failed to load: {}; classification is unavailable", e);
                RouterSlot::Unavailable(e.to_string())
            }
        };

        Self {
            layout,
            loader,
            router,
            experts: std::array::from_fn(|_| OnceCell::new()),
            loads,
        }
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// The router model
    ///
    /// # Errors
    /// [`PipelineError::RouterUnavailable`] if it failed to load at startup
    pub fn get_router(&self) -> Result<Arc<ModelHandle>> {
        match &self.router {
            RouterSlot::Ready(handle) => Ok(Arc::clone(handle)),
            RouterSlot::Unavailable(reason) => {
                Err(PipelineError::RouterUnavailable(reason.clone()))
            }
        }
    }

    /// The expert for `domain`, loading it on first use
    ///
    /// # Errors
    /// [`PipelineError::ModelNotFound`] if no artifact is deployed for `domain`,
    /// [`PipelineError::InferenceRuntime`] if the artifact exists but cannot be loaded
    pub fn get_expert(&self, domain: DatasetDomain) -> Result<Arc<ModelHandle>> {
        let handle = self.experts[domain.index()].get_or_try_init(|| {
            let path = self.layout.expert_path(domain);
            load_handle(self.loader.as_ref(), &self.loads, domain.as_str(), &path).map_err(
                |e| match e {
                    OnnxError::ModelNotFound(_) => {
                        warn!(
                            "Expert model for '{}' not found at {}",
                            domain,
                            path.display()
                        );
                        PipelineError::ModelNotFound {
                            domain,
                            path: path.clone(),
                        }
                    }
                    other => {
                        error!("Expert model for '{}' failed to load: {}", domain, other);
                        PipelineError::InferenceRuntime(format!(
                            "Failed to load expert model for '{}': {}",
                            domain, other
                        ))
                    }
                },
            )
        })?;
        Ok(Arc::clone(handle))
    }

    /// Load the expert for `domain` ahead of the first request
    pub fn preload(&self, domain: DatasetDomain) -> Result<()> {
        self.get_expert(domain).map(|_| ())
    }

    #[must_use]
    pub fn is_loaded(&self, domain: DatasetDomain) -> bool {
        self.experts[domain.index()].get().is_some()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            router_available: matches!(self.router, RouterSlot::Ready(_)),
            loaded_experts: DatasetDomain::ALL
                .iter()
                .copied()
                .filter(|d| self.is_loaded(*d))
                .collect(),
            loads: self.loads.load(Ordering::SeqCst),
        }
    }

    /// Which expert artifacts are deployed and which are loaded
    #[must_use]
    pub fn artifact_status(&self) -> Vec<ArtifactStatus> {
        DatasetDomain::ALL
            .iter()
            .map(|&domain| {
                let path = self.layout.expert_path(domain);
                ArtifactStatus {
                    domain,
                    present: path.is_file(),
                    loaded: self.is_loaded(domain),
                    path,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("layout", &self.layout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
