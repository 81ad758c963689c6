use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str;
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::Config;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "ble-heartrate.json";

// <executable>.json next to the executable
fn portable_config_path() -> Option<PathBuf> {
    let mut path = current_exe()
        .map_err(|err| warn!("failed to get current exe path: {:?}", err))
        .ok()?;
    path.set_extension("json").then_some(path)
}

fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "ble-heartrate", "ble-heartrate").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// A portable config file next to the executable wins when it exists,
/// otherwise the per user config directory is used.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    portable_config_path()
        .filter(|path| path.is_file())
        .or_else(user_config_path)
        .ok_or(ConfigError::NoConfigPath)
}

/// Exclusive lock on the config file, held for as long as the process talks to the radio.
pub struct InstanceLock {
    lock: RwLock<std::fs::File>,
}

impl InstanceLock {
    pub fn acquire(&mut self) -> Result<RwLockWriteGuard<'_, std::fs::File>, ConfigError> {
        self.lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

/// The JSON config file, opened once and kept open.
pub struct ConfigStore {
    path: PathBuf,
    file: std::fs::File,
}

impl ConfigStore {
    pub fn open_default() -> Result<Self, ConfigError> {
        ConfigStore::open(&config_path()?)
    }

    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        Ok(ConfigStore { path: path.to_path_buf(), file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instance_lock(&self) -> Result<InstanceLock, ConfigError> {
        Ok(InstanceLock { lock: RwLock::new(self.file.try_clone()?) })
    }

    // a second handle on the open file; the lock stays on the original
    fn handle(&self) -> Result<File, ConfigError> {
        Ok(File::from_std(self.file.try_clone()?))
    }

    /// An empty file holds the defaults.
    pub async fn load(&self) -> Result<Config, ConfigError> {
        let mut file = self.handle()?;
        let mut content = Vec::new();
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            info!("Config file is empty, using defaults");
            return Ok(Config::default());
        }

        Ok(serde_json::from_str(str::from_utf8(&content)?)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(config)?;
        info!("Saving config to {}", self.path.to_string_lossy());

        let mut file = self.handle()?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ble-heartrate-test-{}-{}.json", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let path = temp_config_path("empty");
        let store = ConfigStore::open(&path).unwrap();

        assert_eq!(store.load().await.unwrap(), Config::default());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_then_read() {
        let path = temp_config_path("save");
        let store = ConfigStore::open(&path).unwrap();

        let config = Config { scan_duration_secs: 3, write_with_response: false, ..Config::default() };
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await.unwrap(), config);

        // a shorter document must not leave bytes of the previous one behind
        let shorter = Config::default();
        store.save(&shorter).await.unwrap();
        assert_eq!(store.load().await.unwrap(), shorter);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let path = temp_config_path("invalid");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::open(&path).unwrap();

        assert!(matches!(store.load().await, Err(ConfigError::JsonError { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn second_instance_can_not_lock() {
        let path = temp_config_path("lock");
        let first = ConfigStore::open(&path).unwrap();
        let second = ConfigStore::open(&path).unwrap();

        let mut first_lock = first.instance_lock().unwrap();
        let guard = first_lock.acquire().unwrap();
        let mut second_lock = second.instance_lock().unwrap();
        assert!(matches!(second_lock.acquire(), Err(ConfigError::CanNotLock { .. })));

        drop(guard);
        assert!(second_lock.acquire().is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
