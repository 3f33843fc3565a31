use async_trait::async_trait;
use fanout_annotator::models::{ArtifactSpec, Fetcher, ModelStore, StoreError};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const GOOD: &[u8] = b"model weights v1";
const CORRUPT: &[u8] = b"truncated";

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Serves `responses[n]` on the n-th call, repeating the last one
struct MockFetcher {
    responses: Vec<&'static [u8]>,
    calls: Arc<AtomicUsize>,
}

impl MockFetcher {
    fn new(responses: Vec<&'static [u8]>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                responses,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.responses[call.min(self.responses.len() - 1)];
        tokio::fs::write(dest, body)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(body.len() as u64)
    }
}

struct Offline;

#[async_trait]
impl Fetcher for Offline {
    async fn fetch(&self, url: &str, _dest: &Path) -> Result<u64, StoreError> {
        Err(StoreError::Network(format!("{}: connection refused", url)))
    }
}

fn artifact(name: &str) -> ArtifactSpec {
    ArtifactSpec {
        name: name.to_string(),
        url: format!("https://models.example.com/{}.onnx", name),
        sha256: digest(GOOD),
        file_name: None,
    }
}

#[tokio::test]
async fn test_missing_artifact_is_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![GOOD]);
    let store = ModelStore::new(dir.path().join("store"), vec![artifact("wd")], fetcher);

    let path = store.ensure("wd").await.unwrap();
    assert_eq!(path, dir.path().join("store/wd.onnx"));
    assert_eq!(std::fs::read(&path).unwrap(), GOOD);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_cached_artifact_is_not_fetched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wd.onnx"), GOOD).unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![GOOD]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    store.ensure("wd").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_corrupt_cached_artifact_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wd.onnx"), CORRUPT).unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![GOOD]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    let path = store.ensure("wd").await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), GOOD);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_cache_gets_a_single_refetch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wd.onnx"), CORRUPT).unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![CORRUPT, GOOD]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    assert!(matches!(
        store.ensure("wd").await,
        Err(StoreError::ChecksumMismatch { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("wd.onnx").exists());
}

#[tokio::test]
async fn test_bad_download_is_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![CORRUPT, GOOD]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    let path = store.ensure("wd").await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), GOOD);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_persistent_mismatch_fails_after_two_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![CORRUPT]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    let err = store.ensure("wd").await.unwrap_err();
    match err {
        StoreError::ChecksumMismatch {
            name,
            expected,
            actual,
        } => {
            assert_eq!(name, "wd");
            assert_eq!(expected, digest(GOOD));
            assert_eq!(actual, digest(CORRUPT));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Nothing unverified is left behind
    assert!(!dir.path().join("wd.onnx").exists());
}

#[tokio::test]
async fn test_unknown_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, _) = MockFetcher::new(vec![GOOD]);
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], fetcher);

    assert!(matches!(
        store.ensure("clip").await,
        Err(StoreError::UnknownArtifact(name)) if name == "clip"
    ));
}

#[tokio::test]
async fn test_network_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path(), vec![artifact("wd")], Offline);

    assert!(matches!(
        store.ensure("wd").await,
        Err(StoreError::Network(_))
    ));
}

#[tokio::test]
async fn test_ensure_all_resolves_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, calls) = MockFetcher::new(vec![GOOD]);
    let mut tags = artifact("tags");
    tags.file_name = Some("selected_tags.csv".to_string());
    let store = ModelStore::new(dir.path(), vec![artifact("wd"), tags], fetcher);

    let resolved = store.ensure_all().await.unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved["wd"], dir.path().join("wd.onnx"));
    assert_eq!(resolved["tags"], dir.path().join("selected_tags.csv"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Second pass is served from the store
    store.ensure_all().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
