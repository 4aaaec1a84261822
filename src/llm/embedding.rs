use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, trace};
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;

use super::{check_file, current_plugin_id, wait_until_ready, DEFAULT_READY_TIMEOUT};
use crate::ai::EmbeddingPluginOperation;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::plugin::{
    running_state_channel, Plugin, PluginInfo, RunningStateReceiver, RunningStateSender,
};

const LABEL: &str = "Embedding Plugin";
pub const EMBEDDING_PLUGIN_NAME: &str = "embedding";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EmbeddingPluginConfig {
    pub bin_path: PathBuf,
    pub model_path: PathBuf,
    pub persist_directory: Option<PathBuf>,
    pub args: Vec<String>,
}

impl EmbeddingPluginConfig {
    pub fn new<T: Into<PathBuf>>(
        bin_path: T,
        model_path: T,
        persist_directory: Option<PathBuf>,
    ) -> Result<Self> {
        let bin_path = bin_path.into();
        check_file(&bin_path, "Embedding binary")?;
        let model_path = model_path.into();
        check_file(&model_path, "Embedding model")?;
        if let Some(dir) = &persist_directory {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(Self {
            bin_path,
            model_path,
            persist_directory,
            args: vec![],
        })
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn init_params(&self) -> JsonValue {
        let mut params = json!({ "absolute_model_path": self.model_path });
        if let Some(persist_directory) = &self.persist_directory {
            params["persist_directory"] = json!(persist_directory);
        }
        params
    }
}

pub struct LocalEmbedding {
    plugin_manager: Arc<PluginManager>,
    plugin_config: RwLock<Option<EmbeddingPluginConfig>>,
    running_state: RunningStateSender,
    _running_state_rx: RunningStateReceiver,
    ready_timeout: Duration,
}

impl LocalEmbedding {
    pub fn new(plugin_manager: Arc<PluginManager>) -> Self {
        let (running_state, rx) = running_state_channel();
        Self {
            plugin_manager,
            plugin_config: Default::default(),
            running_state,
            _running_state_rx: rx,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn subscribe_running_state(&self) -> RunningStateReceiver {
        self.running_state.subscribe()
    }

    pub async fn init_embedding_plugin(
        &self,
        config: EmbeddingPluginConfig,
    ) -> Result<(), PluginError> {
        let is_ready = self.running_state.borrow().is_ready();
        if is_ready && self.plugin_config.read().await.as_ref() == Some(&config) {
            trace!("[{}] already initialized with the same config", LABEL);
            return Ok(());
        }

        self.destroy_embedding_plugin().await;

        let info = PluginInfo::new(EMBEDDING_PLUGIN_NAME, config.bin_path.clone())
            .with_args(config.args.clone());
        let plugin_id = self
            .plugin_manager
            .create_plugin(info, self.running_state.clone())
            .await?;
        let plugin = self
            .plugin_manager
            .init_plugin(plugin_id, config.init_params())
            .await?;
        info!("[{}] {} setup success", LABEL, plugin);
        self.plugin_config.write().await.replace(config);
        Ok(())
    }

    pub async fn destroy_embedding_plugin(&self) {
        let plugin_id = self.running_state.borrow().plugin_id();
        if let Some(plugin_id) = plugin_id {
            if let Err(err) = self.plugin_manager.remove_plugin(plugin_id).await {
                error!("[{}] remove plugin <{}> failed: {}", LABEL, plugin_id, err);
            }
        }
        self.plugin_config.write().await.take();
    }

    async fn get_embedding_plugin(&self) -> Result<Weak<Plugin>, PluginError> {
        wait_until_ready(&self.running_state, self.ready_timeout, LABEL).await?;
        let plugin_id = current_plugin_id(&self.running_state)?;
        self.plugin_manager.get_plugin(plugin_id)
    }

    async fn operation(&self) -> Result<EmbeddingPluginOperation, PluginError> {
        Ok(EmbeddingPluginOperation::new(
            self.get_embedding_plugin().await?,
        ))
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<Vec<f64>>, PluginError> {
        trace!("[{}] generate embedding for <{}>", LABEL, text);
        self.operation().await?.embed_documents(text).await
    }

    pub async fn index(
        &self,
        text: &str,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<(), PluginError> {
        self.operation().await?.index_document(text, metadata).await
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        filter: HashMap<String, JsonValue>,
    ) -> Result<Vec<String>, PluginError> {
        self.operation().await?.similarity_search(query, filter).await
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;

    #[test]
    fn config_creates_persist_directory() {
        let dir = TempDir::new().unwrap();
        dir.child("embedding").touch().unwrap();
        dir.child("embed.gguf").touch().unwrap();
        let persist = dir.path().join("store");
        let config = EmbeddingPluginConfig::new(
            dir.child("embedding").path(),
            dir.child("embed.gguf").path(),
            Some(persist.clone()),
        )
        .unwrap();
        assert!(persist.is_dir());
        let params = config.init_params();
        assert_eq!(params["persist_directory"], json!(persist));
        assert_eq!(
            params["absolute_model_path"],
            json!(dir.child("embed.gguf").path())
        );
    }

    #[test]
    fn config_rejects_missing_model() {
        let dir = TempDir::new().unwrap();
        dir.child("embedding").touch().unwrap();
        assert!(EmbeddingPluginConfig::new(
            dir.child("embedding").path(),
            dir.child("missing.gguf").path(),
            None
        )
        .is_err());
    }

    #[tokio::test]
    async fn no_plugin_is_not_connected() {
        let embedding = LocalEmbedding::new(Arc::new(PluginManager::new()));
        assert!(matches!(
            embedding.generate_embedding("hello").await,
            Err(PluginError::PluginNotConnected)
        ));
    }
}
