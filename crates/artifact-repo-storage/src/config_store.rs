//! Persisted registry configuration
//!
//! The registry treats the stored [`RegistryConfiguration`] as the source of
//! truth and writes it back on every structural change.

use artifact_repo_core::{RegistryConfiguration, RepositoryError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tracing::{debug, info};

/// Load/save seam for the registry configuration
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn load(&self) -> Result<RegistryConfiguration>;

    async fn save(&self, configuration: &RegistryConfiguration) -> Result<()>;
}

/// TOML file store; saves replace the file atomically
#[derive(Debug, Clone)]
pub struct FileConfigurationStore {
    path: PathBuf,
}

impl FileConfigurationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl ConfigurationStore for FileConfigurationStore {
    async fn load(&self) -> Result<RegistryConfiguration> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.display(), "No registry configuration yet, starting empty");
                return Ok(RegistryConfiguration::default());
            }
            Err(e) => return Err(RepositoryError::access(self.display(), e)),
        };
        toml::from_str(&content).map_err(|e| {
            RepositoryError::Configuration(format!(
                "Invalid registry configuration {}: {}",
                self.display(),
                e
            ))
        })
    }

    async fn save(&self, configuration: &RegistryConfiguration) -> Result<()> {
        let content = toml::to_string_pretty(configuration)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RepositoryError::access(self.display(), e))?;
        }
        let temp = self.temp_path();
        fs::write(&temp, content)
            .await
            .map_err(|e| RepositoryError::access(temp.display().to_string(), e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| RepositoryError::access(self.display(), e))?;
        debug!(path = %self.display(), "Saved registry configuration");
        Ok(())
    }
}

/// Store kept in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryConfigurationStore {
    configuration: Mutex<RegistryConfiguration>,
    saves: AtomicUsize,
}

impl InMemoryConfigurationStore {
    pub fn new(configuration: RegistryConfiguration) -> Self {
        Self {
            configuration: Mutex::new(configuration),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current stored configuration
    pub fn snapshot(&self) -> RegistryConfiguration {
        self.configuration.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryConfigurationStore {
    async fn load(&self) -> Result<RegistryConfiguration> {
        Ok(self.snapshot())
    }

    async fn save(&self, configuration: &RegistryConfiguration) -> Result<()> {
        *self.configuration.lock() = configuration.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
