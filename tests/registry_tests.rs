//! Registry Integration Tests
//!
//! Registration, rollback, removal cascades and reload against a
//! configuration store that can be made to fail.

use artifact_repo_core::{
    LifecycleState, ManagedRepositoryConfig, RegistryConfiguration, RemoteRepositoryConfig,
    RepositoryError, RepositoryEventType, RepositoryGroupConfig,
};
use artifact_repo_integration_tests::{artifact_selector, TestEnvironment};
use artifact_repo_service::DefaultRepositoryChecker;

#[tokio::test]
async fn test_failed_save_leaves_registry_unchanged() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    env.store.fail_saves(true);

    let err = registry
        .put_managed(ManagedRepositoryConfig::new("internal", "mem:internal"))
        .await
        .unwrap_err();
    assert!(err.is_access_failure());
    assert!(registry.get_managed_repository("internal").is_none());
    assert!(registry.configuration().managed_repositories.is_empty());
    assert_eq!(env.store.save_count(), 0);
}

#[tokio::test]
async fn test_failed_update_keeps_previous_instance() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    let content = env.managed("internal").await;
    let original = registry.get_managed_repository("internal").unwrap();

    env.store.fail_saves(true);
    let mut update = ManagedRepositoryConfig::new("internal", "mem:elsewhere");
    update.name = "Renamed".to_string();
    assert!(registry.put_managed(update).await.is_err());

    let current = registry.get_managed_repository("internal").unwrap();
    assert!(std::sync::Arc::ptr_eq(&original, &current));
    assert_eq!(current.state(), LifecycleState::Activated);
    assert_eq!(env.store.snapshot().managed_repositories[0].location, "mem:internal");

    env.store.fail_saves(false);
    let jar = artifact_selector("com.example", "foo", "1.0", "1.0", "jar");
    content.add_artifact_bytes(&jar, b"still writable").await.unwrap();
}

#[tokio::test]
async fn test_update_replaces_instance_and_publishes() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    env.managed("internal").await;
    let old = registry.get_managed_repository("internal").unwrap();
    let mut events = registry.subscribe();

    let mut update = ManagedRepositoryConfig::new("internal", "mem:internal");
    update.snapshots = true;
    let new = registry.put_managed(update).await.unwrap();

    assert_eq!(old.state(), LifecycleState::Removed);
    assert_eq!(new.state(), LifecycleState::Activated);
    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(event.event_type);
    }
    assert!(types.contains(&RepositoryEventType::Updated));
}

#[tokio::test]
async fn test_ids_are_unique_across_kinds() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    env.managed("shared").await;

    let err = registry
        .put_remote(RemoteRepositoryConfig::new("shared", "mem:remote-shared"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));
    assert!(registry.get_remote_repository("shared").is_none());
}

#[tokio::test]
async fn test_remove_member_updates_groups() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    env.managed("releases").await;
    env.managed("snapshots").await;
    registry
        .put_group(RepositoryGroupConfig::new(
            "public",
            vec!["releases".to_string(), "snapshots".to_string()],
        ))
        .await
        .unwrap();

    let removed = registry.remove("releases").await.unwrap();
    assert_eq!(removed.state(), LifecycleState::Removed);

    let group = registry.get_repository_group("public").unwrap();
    let members: Vec<String> = group
        .group_settings()
        .unwrap()
        .members
        .iter()
        .map(|m| m.to_string())
        .collect();
    assert_eq!(members, vec!["snapshots".to_string()]);

    let persisted = env.store.snapshot();
    assert!(persisted.find_managed("releases").is_none());
    assert_eq!(persisted.repository_groups[0].members, vec!["snapshots".to_string()]);
    assert!(matches!(
        registry.remove("releases").await.unwrap_err(),
        RepositoryError::RepositoryNotFound(_)
    ));
}

#[tokio::test]
async fn test_reload_detaches_old_content() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    let before = env.managed("internal").await;

    registry.reload().await.unwrap();

    let jar = artifact_selector("com.example", "foo", "1.0", "1.0", "jar");
    let err = before.add_artifact_bytes(&jar, b"late").await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidState(_)));

    let after = registry.managed_content("internal").await.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&before, &after));
    after.add_artifact_bytes(&jar, b"fresh").await.unwrap();
}

#[tokio::test]
async fn test_initialize_from_persisted_configuration() {
    let mut configuration = RegistryConfiguration::default();
    configuration
        .managed_repositories
        .push(ManagedRepositoryConfig::new("internal", "mem:internal"));
    // Unknown layout: skipped, the rest still comes up
    let mut broken = ManagedRepositoryConfig::new("broken", "mem:broken");
    broken.layout = "p2".to_string();
    configuration.managed_repositories.push(broken);

    let env = TestEnvironment::with_configuration(configuration).await;
    let registry = &env.services.registry;
    assert!(registry.get_managed_repository("internal").unwrap().is_active());
    assert!(registry.get_managed_repository("broken").is_none());
}

#[tokio::test]
async fn test_checker_rejects_invalid_configuration() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;

    let mut config = ManagedRepositoryConfig::new("internal", "mem:internal");
    config.releases = false;
    config.snapshots = false;
    let err = registry
        .put_managed_with_check(config, &DefaultRepositoryChecker)
        .await
        .unwrap_err();
    assert!(!err.validation_errors().is_empty());
    assert!(registry.get_managed_repository("internal").is_none());
}

#[tokio::test]
async fn test_closed_registry_rejects_changes() {
    let env = TestEnvironment::new().await;
    let registry = &env.services.registry;
    let content = env.managed("internal").await;

    registry.close().await;
    assert!(registry.is_closed());
    let err = registry
        .put_managed(ManagedRepositoryConfig::new("other", "mem:other"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidState(_)));
    assert!(!content.is_attached());
}
