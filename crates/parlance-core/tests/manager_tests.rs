//! Integration tests for the model manager: catalog-driven downloads,
//! atomicity, coalescing, cancellation, and removal guards.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parlance_core::model::{CatalogClient, ManagerEvent, ModelManager};
use parlance_core::{DownloadState, ParlanceError};

const VOICE: &str = "en_US-test-low";
const ONNX_PATH: &str = "en/en_US/test/low/en_US-test-low.onnx";
const CONFIG_PATH: &str = "en/en_US/test/low/en_US-test-low.onnx.json";

const WEIGHTS: &[u8] = b"not-a-real-onnx-but-bytes-enough-for-a-test";
const CONFIG: &[u8] =
    br#"{ "audio": { "sample_rate": 22050 }, "espeak": { "voice": "en-us" }, "num_speakers": 1 }"#;

fn voices_json() -> String {
    format!(
        r#"{{
            "{VOICE}": {{
                "key": "{VOICE}",
                "language": {{ "code": "en_US" }},
                "quality": "low",
                "files": {{
                    "{ONNX_PATH}": {{ "size_bytes": {} }},
                    "{CONFIG_PATH}": {{ "size_bytes": {} }}
                }}
            }}
        }}"#,
        WEIGHTS.len(),
        CONFIG.len()
    )
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resolve/main/voices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(voices_json()))
        .mount(server)
        .await;
}

async fn mount_files(server: &MockServer, weights_delay: Option<Duration>) {
    let mut weights = ResponseTemplate::new(200).set_body_bytes(WEIGHTS.to_vec());
    if let Some(delay) = weights_delay {
        weights = weights.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{ONNX_PATH}")))
        .respond_with(weights)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{CONFIG_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONFIG.to_vec()))
        .mount(server)
        .await;
}

fn store_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_download_then_resolve() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_files(&server, None).await;

    let temp = TempDir::new().unwrap();
    let (manager, mut events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();

    assert_eq!(manager.refresh_catalog().await.unwrap(), 1);
    manager.download(VOICE).await.unwrap();

    let files = manager.resolve(VOICE).await.unwrap();
    assert!(files.onnx.is_file());
    assert!(files.config.is_file());
    assert!(std::fs::metadata(&files.onnx).unwrap().len() > 0);
    assert!(std::fs::metadata(&files.config).unwrap().len() > 0);

    let listed = manager.list_available().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, DownloadState::Ready);
    assert_eq!(listed[0].sample_rate, Some(22050));
    assert_eq!(listed[0].quality.as_deref(), Some("low"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, ManagerEvent::DownloadStarted { name } if name == VOICE)));
    assert!(seen.iter().any(|e| matches!(e, ManagerEvent::DownloadProgress { .. })));
    assert!(seen.iter().any(|e| matches!(e, ManagerEvent::DownloadCompleted { name } if name == VOICE)));
}

#[tokio::test]
async fn test_failed_download_leaves_store_clean() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    // Config downloads fine, weights fail: nothing may become visible.
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{CONFIG_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONFIG.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{ONNX_PATH}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();

    let err = manager.download(VOICE).await.unwrap_err();
    assert_eq!(err.category(), "network");

    // No model files and no staging leftovers in the store directory.
    let entries = store_entries(temp.path());
    assert!(
        entries.iter().all(|name| name == "store.json"),
        "unexpected store entries: {entries:?}"
    );

    let listed = manager.list_available().await;
    assert_eq!(listed[0].state, DownloadState::Failed);
    assert!(listed[0].error.is_some());
    assert!(manager.resolve(VOICE).await.is_err());
}

#[tokio::test]
async fn test_retry_after_failure_succeeds() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{ONNX_PATH}")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_files(&server, None).await;

    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();

    assert!(manager.download(VOICE).await.is_err());
    manager.download(VOICE).await.unwrap();
    assert_eq!(
        manager.list_available().await[0].state,
        DownloadState::Ready
    );
}

#[tokio::test]
async fn test_concurrent_downloads_perform_one_transfer() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{ONNX_PATH}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(WEIGHTS.to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/resolve/main/{CONFIG_PATH}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(CONFIG.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download(VOICE).await })
    };
    let second = {
        let manager = manager.clone();
        tokio::spawn(async move {
            // Give the first call time to take the in-flight slot.
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.download(VOICE).await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    manager.resolve(VOICE).await.unwrap();
    // Mock expectations (exactly one request per file) are verified on drop.
}

#[tokio::test]
async fn test_remove_during_download_is_in_use() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_files(&server, Some(Duration::from_millis(500))).await;

    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();

    let download = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download(VOICE).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = manager.remove(VOICE).await.unwrap_err();
    assert!(matches!(err, ParlanceError::ModelInUse { .. }));

    download.await.unwrap().unwrap();
    manager.remove(VOICE).await.unwrap();
    assert!(manager.resolve(VOICE).await.is_err());
}

#[tokio::test]
async fn test_cancel_discards_staging_and_resets_state() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_files(&server, Some(Duration::from_secs(5))).await;

    let temp = TempDir::new().unwrap();
    let (manager, mut events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();

    let download = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.download(VOICE).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.cancel_download(VOICE));
    download.await.unwrap().unwrap();

    let entries = store_entries(temp.path());
    assert!(
        entries.iter().all(|name| name == "store.json"),
        "staging not discarded: {entries:?}"
    );
    assert_eq!(
        manager.list_available().await[0].state,
        DownloadState::NotDownloaded
    );

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, ManagerEvent::DownloadCancelled { name } if name == VOICE)));
}

#[tokio::test]
async fn test_manual_import_is_listed_after_refresh() {
    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url("http://unused")).unwrap();

    let source = TempDir::new().unwrap();
    std::fs::write(source.path().join("hand-placed.onnx"), WEIGHTS).unwrap();
    std::fs::write(source.path().join("hand-placed.onnx.json"), CONFIG).unwrap();

    let copied = manager
        .import_files(&[
            source.path().join("hand-placed.onnx"),
            source.path().join("hand-placed.onnx.json"),
        ])
        .await
        .unwrap();
    assert_eq!(copied, 2);

    manager.refresh().await.unwrap();
    let listed = manager.list_available().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "hand-placed");
    assert_eq!(listed[0].state, DownloadState::Ready);
}

#[tokio::test]
async fn test_unusable_local_file_surfaces_as_failed() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("orphan.onnx"), WEIGHTS).unwrap();

    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url("http://unused")).unwrap();

    let listed = manager.list_available().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, DownloadState::Failed);
    assert!(listed[0]
        .error
        .as_deref()
        .unwrap()
        .contains("missing config"));
    assert!(matches!(
        manager.resolve("orphan").await,
        Err(ParlanceError::ModelNotReady { .. })
    ));
}

#[tokio::test]
async fn test_lease_survives_download_and_blocks_remove() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_files(&server, None).await;

    let temp = TempDir::new().unwrap();
    let (manager, _events) =
        ModelManager::new(temp.path(), CatalogClient::with_base_url(server.uri())).unwrap();
    manager.refresh_catalog().await.unwrap();
    manager.download(VOICE).await.unwrap();

    let (_files, lease) = manager.checkout(VOICE).await.unwrap();
    assert!(matches!(
        manager.remove(VOICE).await,
        Err(ParlanceError::ModelInUse { .. })
    ));

    drop(lease);
    manager.remove(VOICE).await.unwrap();
}
