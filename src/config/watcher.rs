//! Hot reload of the patchbay config file
//!
//! Only snap rules and the flash interval are applied to a running console.
//! Reloads that touch the backend, poller, output prefixes or grid are still
//! delivered; the receiver decides (see [`AppConfig::restart_required`]).

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppConfig;

/// Editors write in several steps; re-read once they are done
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Delivers each config that parses and validates after a file change
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    ///
    /// The parent directory is watched rather than the file, so saves that
    /// replace the file (write to temp, rename over) keep being seen.
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let path = PathBuf::from(&config_path);
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("Config path has no file name: {}", config_path))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel(10);
        // notify calls back on its own thread
        let runtime = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Config watch error: {}", e);
                    return;
                }
            };
            if !touches_config(&event, &file_name) {
                return;
            }
            debug!(kind = ?event.kind, "Config file event");

            let config_path = config_path_for(&event, &file_name);
            let tx = tx.clone();
            runtime.spawn(async move {
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                match AppConfig::load(&config_path).await {
                    Ok(config) => {
                        if tx.send(config).await.is_err() {
                            debug!("Config receiver gone, reload dropped");
                        }
                    }
                    Err(e) => warn!("Config reload rejected, keeping current settings: {:#}", e),
                }
            });
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!(path = %path.display(), "Watching config for live snap/flash changes");

        Ok((Self { _watcher: watcher, rx }, Arc::new(initial)))
    }

    /// Wait for the next valid config; `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

/// Writes, creations and renames that land on the config file
fn touches_config(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn config_path_for(event: &Event, file_name: &OsString) -> String {
    event
        .paths
        .iter()
        .find(|p| p.file_name() == Some(file_name.as_os_str()))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| Path::new(file_name).to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn next(watcher: &mut ConfigWatcher) -> Option<AppConfig> {
        tokio::time::timeout(Duration::from_secs(3), watcher.next_config())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_reload_on_write() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("patchbay.yaml");
        fs::write(&path, "layout: { snap_tolerance: 1.0 }\nmixer: { flash_interval_ms: 250 }\n")?;

        let (mut watcher, config) = ConfigWatcher::new(path.to_string_lossy().to_string()).await?;
        assert_eq!(config.layout.snap_tolerance, 1.0);
        assert_eq!(config.mixer.flash_interval_ms, 250);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "layout: { snap_tolerance: 4.0 }\nmixer: { flash_interval_ms: 125 }\n")?;

        let reloaded = next(&mut watcher).await.expect("reload after write");
        assert_eq!(reloaded.layout.snap_tolerance, 4.0);
        assert_eq!(reloaded.mixer.flash_interval_ms, 125);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_after_rename_over() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("patchbay.yaml");
        fs::write(&path, "layout: { min_overlap: 1.0 }\n")?;

        let (mut watcher, _) = ConfigWatcher::new(path.to_string_lossy().to_string()).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let staged = dir.path().join(".patchbay.yaml.tmp");
        fs::write(&staged, "layout: { min_overlap: 6.0 }\n")?;
        fs::rename(&staged, &path)?;

        let reloaded = next(&mut watcher).await.expect("reload after rename");
        assert_eq!(reloaded.layout.min_overlap, 6.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sibling_files_are_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("patchbay.yaml");
        fs::write(&path, "{}\n")?;

        let (mut watcher, _) = ConfigWatcher::new(path.to_string_lossy().to_string()).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(dir.path().join("notes.txt"), "not a config")?;

        let quiet = tokio::time::timeout(Duration::from_millis(500), watcher.next_config()).await;
        assert!(quiet.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(ConfigWatcher::new(path.to_string_lossy().to_string())
            .await
            .is_err());
    }
}
