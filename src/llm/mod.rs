//! Lifecycle wrappers that own one plugin each and hide its restarts from callers.

pub mod chat;
pub mod embedding;

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, trace};

use crate::error::PluginError;
use crate::plugin::{PluginId, RunningStateReceiver, RunningStateSender};

pub use chat::{ChatPluginConfig, LocalChatLLM, LocalLLMSetting};
pub use embedding::{EmbeddingPluginConfig, LocalEmbedding};

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits while the plugin is still starting. Returns at once when it is not loading.
async fn wait_until_ready(
    running_state: &RunningStateSender,
    ready_timeout: Duration,
    label: &str,
) -> Result<(), PluginError> {
    if !running_state.borrow().is_loading() {
        return Ok(());
    }
    info!("[{}] wait for plugin to be ready", label);
    let mut rx: RunningStateReceiver = running_state.subscribe();
    let result = tokio::time::timeout(ready_timeout, rx.wait_for(|state| !state.is_loading()))
        .await
        .map(|changed| changed.map(|_| ()));
    match result {
        Ok(Ok(_)) => {
            trace!("[{}] is ready", label);
            Ok(())
        }
        Ok(Err(_)) => Err(PluginError::PluginNotConnected),
        Err(_) => Err(PluginError::Timeout(format!(
            "{} was not ready after {:?}",
            label, ready_timeout
        ))),
    }
}

fn current_plugin_id(running_state: &RunningStateSender) -> Result<PluginId, PluginError> {
    let state = running_state.borrow();
    match state.plugin_id() {
        Some(plugin_id) if !state.is_stopped() => Ok(plugin_id),
        _ => Err(PluginError::PluginNotConnected),
    }
}

fn check_file(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("{} does not exist: <{}>", what, path.display()));
    }
    if !path.is_file() {
        return Err(anyhow!("{} is not a file: <{}>", what, path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;
    use crate::plugin::{running_state_channel, RunningState};

    #[tokio::test]
    async fn wait_returns_when_not_loading() {
        let (tx, _rx) = running_state_channel();
        wait_until_ready(&tx, Duration::from_millis(10), "Test")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_while_connecting() {
        let (tx, _rx) = running_state_channel();
        tx.send_replace(RunningState::Connecting);
        let err = wait_until_ready(&tx, Duration::from_millis(20), "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Timeout(_)));
    }

    #[tokio::test]
    async fn wait_sees_running() {
        let (tx, _rx) = running_state_channel();
        let id = PluginId::from(1);
        tx.send_replace(RunningState::Connected { plugin_id: id });
        let publisher = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.send_replace(RunningState::Running { plugin_id: id });
        });
        wait_until_ready(&tx, Duration::from_secs(5), "Test")
            .await
            .unwrap();
        assert_eq!(current_plugin_id(&tx).unwrap(), id);
    }

    #[test]
    fn stopped_plugin_is_not_connected() {
        let (tx, _rx) = running_state_channel();
        assert!(matches!(
            current_plugin_id(&tx),
            Err(PluginError::PluginNotConnected)
        ));
        tx.send_replace(RunningState::UnexpectedStop {
            plugin_id: PluginId::from(1),
        });
        assert!(matches!(
            current_plugin_id(&tx),
            Err(PluginError::PluginNotConnected)
        ));
    }

    #[test]
    fn check_file_rejects_dirs_and_missing() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("model.gguf");
        file.touch().unwrap();
        assert!(check_file(file.path(), "model").is_ok());
        assert!(check_file(dir.path(), "model").is_err());
        assert!(check_file(&dir.path().join("nope"), "model").is_err());
    }
}
