//! Content Integration Tests
//!
//! Deployment, querying and deletion through managed repository content,
//! observed through the storage spy and the audit listener.

use artifact_repo_core::{
    ContentItem, ItemSelector, ManagedRepositoryConfig, RepositoryError,
};
use artifact_repo_integration_tests::{artifact_selector, version_selector, TestEnvironment};
use artifact_repo_service::{DeleteStatusCode, ItemDeleteStatus};

const JAR: &str = "com/example/foo/1.0/foo-1.0.jar";
const POM: &str = "com/example/foo/1.0/foo-1.0.pom";

#[tokio::test]
async fn test_has_content_then_delete_all_items() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR, POM]).await;

    let version = version_selector("com.example", "foo", "1.0");
    assert!(content.has_content(&version).await.unwrap());

    let mut statuses = Vec::new();
    let summary = content
        .delete_all_items(&version, |s: ItemDeleteStatus| statuses.push(s))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert!(summary.deleted >= 1);
    assert!(statuses.iter().all(|s| s.status == DeleteStatusCode::Ok));

    assert!(!content.has_content(&version).await.unwrap());
    assert!(!content.asset(JAR).unwrap().exists().await.unwrap());
    assert!(env.audit.paths().iter().any(|p| p == "com/example/foo/1.0"));
}

#[tokio::test]
async fn test_has_content_propagates_storage_failure() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR]).await;
    let version = version_selector("com.example", "foo", "1.0");

    let spy = env.spy("internal");
    spy.inject_failure_for("list", "com/example/foo/1.0");
    let err = content.has_content(&version).await.unwrap_err();
    assert!(err.is_access_failure());

    spy.clear_failures();
    spy.inject_failure_for("stat", "com/example/foo");
    assert!(content.has_content(&version).await.unwrap_err().is_access_failure());

    // A missing version is not a failure
    spy.clear_failures();
    let absent = version_selector("com.example", "foo", "9.9");
    assert!(!content.has_content(&absent).await.unwrap());
}

#[tokio::test]
async fn test_delete_all_items_twice_reports_not_found() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR, POM]).await;
    let version = version_selector("com.example", "foo", "1.0");

    content.delete_all_items(&version, |_| {}).await.unwrap();

    let mut statuses = Vec::new();
    let summary = content
        .delete_all_items(&version, |s: ItemDeleteStatus| statuses.push(s.status))
        .await
        .unwrap();
    assert_eq!(summary.failed, 0);
    assert!(summary.not_found > 0);
    assert!(statuses.iter().all(|s| *s == DeleteStatusCode::ItemNotFound));
}

#[tokio::test]
async fn test_delete_failure_is_reported_per_item() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR, "com/example/foo/1.1/foo-1.1.jar"]).await;

    let spy = env.spy("internal");
    spy.inject_failure_for("delete", "com/example/foo/1.1/foo-1.1.jar");

    let project = ItemSelector::builder()
        .namespace("com.example")
        .project_id("foo")
        .version("*")
        .artifact_id("foo")
        .artifact_version("*")
        .extension("jar")
        .build();
    let mut failed = Vec::new();
    let summary = content
        .delete_all_items(&project, |s: ItemDeleteStatus| {
            if s.status == DeleteStatusCode::DeletionFailed {
                failed.push(s.item.path().to_string());
            }
        })
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(failed, vec!["com/example/foo/1.1/foo-1.1.jar".to_string()]);
    assert!(!content.asset(JAR).unwrap().exists().await.unwrap());
}

#[tokio::test]
async fn test_get_version_without_namespace_touches_no_storage() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    let spy = env.spy("internal");
    spy.clear_operations();

    let selector = ItemSelector::builder()
        .project_id("foo")
        .version("1.0")
        .build();
    let err = content.get_version(&selector).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArgument(_)));

    let err = content.has_content(&ItemSelector::empty()).await.unwrap_err();
    assert!(err.is_invalid_argument());
    let err = content
        .delete_all_items(&ItemSelector::empty(), |_| {})
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    assert!(spy.operations().is_empty(), "{:?}", spy.operations());
}

#[tokio::test]
async fn test_release_redeployment_blocked() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    let jar = artifact_selector("com.example", "foo", "1.0", "1.0", "jar");

    let artifact = content.add_artifact_bytes(&jar, b"v1").await.unwrap();
    assert_eq!(artifact.base.asset.path(), JAR);
    assert!(content
        .asset(&format!("{}.sha256", JAR))
        .unwrap()
        .exists()
        .await
        .unwrap());

    let err = content.add_artifact_bytes(&jar, b"v2").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));
    assert_eq!(content.asset(JAR).unwrap().read_bytes().await.unwrap(), b"v1");
}

#[tokio::test]
async fn test_redeployment_allowed_when_unblocked() {
    let env = TestEnvironment::new().await;
    let mut config = ManagedRepositoryConfig::new("scratch", "mem:scratch");
    config.block_redeployments = false;
    let content = env.managed_with(config).await;
    let jar = artifact_selector("com.example", "foo", "1.0", "1.0", "jar");

    content.add_artifact_bytes(&jar, b"v1").await.unwrap();
    content.add_artifact_bytes(&jar, b"v2").await.unwrap();
    assert_eq!(content.asset(JAR).unwrap().read_bytes().await.unwrap(), b"v2");
}

#[tokio::test]
async fn test_release_scheme_gating() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    let snapshot = artifact_selector("com.example", "foo", "1.1-SNAPSHOT", "1.1-SNAPSHOT", "jar");
    let err = content.add_artifact_bytes(&snapshot, b"snap").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let mut config = ManagedRepositoryConfig::new("snapshots", "mem:snapshots");
    config.releases = false;
    config.snapshots = true;
    let snapshots = env.managed_with(config).await;
    snapshots.add_artifact_bytes(&snapshot, b"snap").await.unwrap();
    snapshots.add_artifact_bytes(&snapshot, b"snap2").await.unwrap();

    let release = artifact_selector("com.example", "foo", "1.0", "1.0", "jar");
    let err = snapshots.add_artifact_bytes(&release, b"rel").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));
}

#[tokio::test]
async fn test_delete_item_twice() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR]).await;

    let item: ContentItem = content
        .get_artifact(&artifact_selector("com.example", "foo", "1.0", "1.0", "jar"))
        .unwrap()
        .into();
    content.delete_item(&item).await.unwrap();
    let err = content.delete_item(&item).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ItemNotFound(_)));
}

#[tokio::test]
async fn test_to_item_round_trip() {
    let env = TestEnvironment::new().await;
    let content = env.managed("internal").await;
    env.seed(&content, &[JAR]).await;

    let item = content.to_item(JAR).await.unwrap();
    assert!(matches!(item, ContentItem::Artifact(_)));
    let selector = content.to_item_selector(JAR).unwrap();
    assert_eq!(content.get_artifact(&selector).unwrap().base.asset.path(), JAR);
}
