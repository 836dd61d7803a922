//! Storage layer for the artifact repository engine
//!
//! This crate provides the persistence side of the engine:
//! - `RepositoryStorage` backends on the local filesystem and in memory
//! - Location based backend lookup (`file:` and `mem:` URLs)
//! - Persistence of the registry configuration as TOML
//!
//! # Example
//!
//! ```rust,no_run
//! use artifact_repo_storage::{DefaultStorageProvider, StorageProvider};
//! use artifact_repo_storage::artifact_repo_core::StorageAsset;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = DefaultStorageProvider::new();
//! let storage = provider.open(&Url::parse("file:///srv/repositories/internal")?).await?;
//!
//! let pom = StorageAsset::new(storage, "com/example/foo/1.0/foo-1.0.pom")?;
//! if pom.exists().await? {
//!     let _content = pom.read_bytes().await?;
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core domain types for convenience
pub use artifact_repo_core;

pub mod config_store;
pub mod filesystem;
pub mod memory;
pub mod provider;

pub use config_store::{ConfigurationStore, FileConfigurationStore, InMemoryConfigurationStore};
pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use provider::{DefaultStorageProvider, StorageProvider};

/// Storage layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default file name of the persisted registry configuration
pub const DEFAULT_REGISTRY_FILE: &str = "registry.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
