//! Model cache lifecycle: eager router, lazy single-flight experts
mod common;

use common::{expert_file, router_scores_index_4, FakeLoader, ModelDir, ROUTER_FILE};
use prismatic_core::{DatasetDomain, ModelCache, PipelineError};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn cache_for(models: &ModelDir, loader: &FakeLoader) -> ModelCache {
    ModelCache::new(models.layout(), Arc::new(loader.clone()))
}

#[test]
fn test_router_is_loaded_eagerly() {
    let models = ModelDir::complete();
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0]);
    let cache = cache_for(&models, &loader);

    assert_eq!(loader.load_count(ROUTER_FILE), 1);
    assert!(cache.stats().router_available);
    assert!(cache.stats().loaded_experts.is_empty());

    let first = cache.get_router().unwrap();
    let second = cache.get_router().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.load_count(ROUTER_FILE), 1);
}

#[test]
fn test_missing_router_is_recorded_not_fatal() {
    let models = ModelDir::new(false, &[DatasetDomain::ChestMnist]);
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0]);
    let cache = cache_for(&models, &loader);

    assert!(!cache.stats().router_available);
    let err = cache.get_router().unwrap_err();
    assert!(matches!(err, PipelineError::RouterUnavailable(_)));

    // Experts are still served
    assert!(cache.get_expert(DatasetDomain::ChestMnist).is_ok());
}

#[test]
fn test_expert_is_loaded_once_and_reused() {
    let models = ModelDir::complete();
    let loader = FakeLoader::new(router_scores_index_4(), vec![0.3, 0.7]);
    let cache = cache_for(&models, &loader);

    assert!(!cache.is_loaded(DatasetDomain::PathMnist));
    let first = cache.get_expert(DatasetDomain::PathMnist).unwrap();
    let second = cache.get_expert(DatasetDomain::PathMnist).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.load_count(&expert_file(DatasetDomain::PathMnist)), 1);
    assert_eq!(first.label(), "pathmnist");
    assert!(cache.is_loaded(DatasetDomain::PathMnist));
    assert_eq!(cache.stats().loaded_experts, vec![DatasetDomain::PathMnist]);
    // router + one expert
    assert_eq!(cache.stats().loads, 2);
}

#[test]
fn test_concurrent_first_requests_load_once() {
    const THREADS: usize = 8;

    let models = ModelDir::complete();
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0])
        .with_load_delay(Duration::from_millis(50));
    let cache = Arc::new(cache_for(&models, &loader));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_expert(DatasetDomain::TissueMnist).unwrap()
            })
        })
        .collect();

    let experts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(loader.load_count(&expert_file(DatasetDomain::TissueMnist)), 1);
    for expert in &experts[1..] {
        assert!(Arc::ptr_eq(&experts[0], expert));
    }
}

#[test]
fn test_different_domains_load_independently() {
    let models = ModelDir::complete();
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0])
        .with_load_delay(Duration::from_millis(10));
    let cache = Arc::new(cache_for(&models, &loader));

    let handles: Vec<_> = DatasetDomain::ALL
        .iter()
        .copied()
        .map(|domain| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_expert(domain).map(|h| h.label().to_string()))
        })
        .collect();

    for (domain, handle) in DatasetDomain::ALL.iter().zip(handles) {
        assert_eq!(handle.join().unwrap().unwrap(), domain.as_str());
        assert_eq!(loader.load_count(&expert_file(*domain)), 1);
    }
    assert_eq!(cache.stats().loaded_experts.len(), 12);
}

#[test]
fn test_missing_expert_is_not_cached_as_failure() {
    let models = ModelDir::new(true, &[]);
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0]);
    let cache = cache_for(&models, &loader);

    let err = cache.get_expert(DatasetDomain::RetinaMnist).unwrap_err();
    match &err {
        PipelineError::ModelNotFound { domain, path } => {
            assert_eq!(*domain, DatasetDomain::RetinaMnist);
            assert!(path.ends_with("stage2_retinamnist_final.onnx"));
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("retinamnist"));
    assert!(!cache.is_loaded(DatasetDomain::RetinaMnist));

    // Deploying the artifact later is picked up by the next call
    models.deploy(DatasetDomain::RetinaMnist);
    assert!(cache.get_expert(DatasetDomain::RetinaMnist).is_ok());
    assert_eq!(loader.load_count(&expert_file(DatasetDomain::RetinaMnist)), 1);
}

#[test]
fn test_unloadable_expert_is_runtime_error() {
    let models = ModelDir::complete();
    models.corrupt(DatasetDomain::BreastMnist);
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0]);
    let cache = cache_for(&models, &loader);

    let err = cache.get_expert(DatasetDomain::BreastMnist).unwrap_err();
    assert!(matches!(err, PipelineError::InferenceRuntime(_)));
    assert!(cache.get_expert(DatasetDomain::BloodMnist).is_ok());
}

#[test]
fn test_artifact_status_reports_degraded_domains() {
    let models = ModelDir::complete();
    models.remove(DatasetDomain::OrganSMnist);
    let loader = FakeLoader::new(router_scores_index_4(), vec![1.0]);
    let cache = cache_for(&models, &loader);
    cache.preload(DatasetDomain::DermaMnist).unwrap();

    let status = cache.artifact_status();
    assert_eq!(status.len(), 12);
    for entry in &status {
        assert_eq!(entry.present, entry.domain != DatasetDomain::OrganSMnist);
        assert_eq!(entry.loaded, entry.domain == DatasetDomain::DermaMnist);
    }
}
