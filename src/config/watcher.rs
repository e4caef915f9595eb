//! Hot reload of the configuration file.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ReconcilerConfig;

/// Watches one config file and publishes every valid, changed version of it.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ReconcilerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver of validated updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ReconcilerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (Self { path: path.to_path_buf(), update_tx }, update_rx)
    }

    /// Start watching. The returned handle must be kept alive for events to flow.
    ///
    /// The parent directory is watched so editors that replace the file on save
    /// are still seen. Invalid files are logged and skipped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let last = Mutex::new(load_config(&path).ok());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_file {
                    return;
                }

                match load_config(&path) {
                    Ok(new_config) => {
                        let Ok(mut last) = last.lock() else {
                            return;
                        };
                        if last.as_ref() == Some(&new_config) {
                            tracing::debug!(path = ?path, "Config file touched without changes");
                            return;
                        }
                        tracing::info!(path = ?path, "Config file changed, publishing reload");
                        *last = Some(new_config.clone());
                        let _ = tx.send(new_config);
                    }
                    Err(e) => {
                        tracing::error!(path = ?path, error = %e, "Invalid config file, keeping current configuration");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let watch_root = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(watch_root, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publishes_valid_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconciler.toml");
        std::fs::write(&path, "[reconcile]\nmax_concurrent_probes = 4\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(&path, "[reconcile]\nmax_concurrent_probes = 0\n").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(&path, "[reconcile]\nmax_concurrent_probes = 8\n").unwrap();

        // A write can surface as several events, some seeing a truncated file.
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(update) = updates.recv().await {
                assert_ne!(update.reconcile.max_concurrent_probes, 0);
                if update.reconcile.max_concurrent_probes == 8 {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(found, Ok(true));
    }
}
