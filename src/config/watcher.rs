//! Config file watcher feeding the server's route reload.
//!
//! Editors and deploy tools often produce a burst of events per save, so
//! events are coalesced until the file has been quiet for the debounce
//! period. A config is only sent when it loads, validates, and differs from
//! the one currently running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Decides whether the file on disk is a new config worth applying.
#[derive(Debug)]
pub struct ReloadCheck {
    path: PathBuf,
    current: Option<GatewayConfig>,
}

impl ReloadCheck {
    pub fn new(path: &Path, current: Option<GatewayConfig>) -> Self {
        Self {
            path: path.to_path_buf(),
            current,
        }
    }

    /// Load the file; return the config if it is valid and changed.
    pub fn check(&mut self) -> Option<GatewayConfig> {
        match load_config(&self.path) {
            Ok(config) if self.current.as_ref() == Some(&config) => {
                tracing::debug!(path = ?self.path, "Config file unchanged, skipping reload");
                None
            }
            Ok(config) => {
                self.current = Some(config.clone());
                Some(config)
            }
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config, keeping current routes");
                None
            }
        }
    }
}

/// Watches the config file and sends changed, validated configs.
pub struct ConfigWatcher {
    check: ReloadCheck,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// `current` is the config already running; an identical file is not resent.
    pub fn new(
        path: &Path,
        current: Option<GatewayConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                check: ReloadCheck::new(path, current),
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime; dropping the
    /// returned watcher stops the reload task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                let _ = event_tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = ?e, "Watch error"),
        })?;
        watcher.watch(&self.check.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.check.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");
        tokio::spawn(self.reload_on_change(event_rx));
        Ok(watcher)
    }

    async fn reload_on_change(mut self, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            let mut closed = false;
            loop {
                match tokio::time::timeout(self.debounce, events.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            tracing::info!(path = ?self.check.path, "Config file change detected");
            if let Some(config) = self.check.check() {
                if self.update_tx.send(config).is_err() {
                    break;
                }
            }
            if closed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const V1: &str = r#"
        [[routes]]
        name = "web"
        path = "/"
        backends = ["http://127.0.0.1:3000"]
    "#;

    const V2: &str = r#"
        [[routes]]
        name = "web"
        path = "/"
        backends = ["http://127.0.0.1:3001"]
    "#;

    const INVALID: &str = r#"
        [[routes]]
        name = "web"
        path = "/"
        backends = []
    "#;

    #[test]
    fn check_sends_only_valid_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        fs::write(&path, V1).unwrap();
        let running = load_config(&path).unwrap();
        let mut check = ReloadCheck::new(&path, Some(running));

        assert!(check.check().is_none(), "unchanged file");

        fs::write(&path, INVALID).unwrap();
        assert!(check.check().is_none(), "invalid file");

        fs::write(&path, V2).unwrap();
        let config = check.check().unwrap();
        assert_eq!(config.routes[0].backends, vec!["http://127.0.0.1:3001"]);
        assert!(check.check().is_none(), "already applied");
    }

    #[tokio::test]
    async fn file_rewrite_delivers_validated_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        fs::write(&path, V1).unwrap();
        let running = load_config(&path).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path, Some(running));
        let _watcher = watcher
            .with_debounce(Duration::from_millis(50))
            .run()
            .unwrap();

        fs::write(&path, INVALID).unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(600), updates.recv()).await;
        assert!(nothing.is_err(), "invalid config must not be sent");

        fs::write(&path, V2).unwrap();
        let config = tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("no config update within 5s")
            .unwrap();
        assert_eq!(config.routes[0].backends, vec!["http://127.0.0.1:3001"]);
    }
}
