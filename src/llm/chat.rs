use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, trace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;

use super::{check_file, current_plugin_id, wait_until_ready, DEFAULT_READY_TIMEOUT};
use crate::ai::chat::ChatStream;
use crate::ai::{
    AIPluginOperation, CompleteTextType, LocalAITranslateRowData, LocalAITranslateRowResponse,
};
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::plugin::{
    running_state_channel, Plugin, PluginInfo, RunningStateReceiver, RunningStateSender,
};

const LABEL: &str = "Chat Plugin";
pub const CHAT_PLUGIN_NAME: &str = "chat_plugin";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalLLMSetting {
    pub chat_bin_path: String,
    pub chat_model_path: String,
    pub embedding_model_path: String,
    pub enabled: bool,
}

impl LocalLLMSetting {
    pub fn validate(&self) -> Result<()> {
        self.chat_config()?;
        Ok(())
    }

    pub fn chat_config(&self) -> Result<ChatPluginConfig> {
        ChatPluginConfig::new(&self.chat_bin_path, &self.chat_model_path)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ChatPluginConfig {
    pub chat_bin_path: PathBuf,
    pub chat_model_path: PathBuf,
    pub related_model_path: Option<PathBuf>,
    pub embedding_model_path: Option<PathBuf>,
    pub persist_directory: Option<PathBuf>,
    pub device: String,
    pub verbose: bool,
    pub args: Vec<String>,
}

impl ChatPluginConfig {
    pub fn new<T: Into<PathBuf>>(chat_bin_path: T, chat_model_path: T) -> Result<Self> {
        let chat_bin_path = chat_bin_path.into();
        check_file(&chat_bin_path, "Chat binary")?;
        let chat_model_path = chat_model_path.into();
        check_file(&chat_model_path, "Chat model")?;

        Ok(Self {
            chat_bin_path,
            chat_model_path,
            related_model_path: None,
            embedding_model_path: None,
            persist_directory: None,
            device: "cpu".to_string(),
            verbose: false,
            args: vec![],
        })
    }

    pub fn with_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_related_model_path<T: Into<PathBuf>>(mut self, related_model_path: T) -> Self {
        self.related_model_path = Some(related_model_path.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Turns on retrieval: the model must exist, the directory is created when missing.
    pub fn set_rag_enabled(
        &mut self,
        embedding_model_path: &Path,
        persist_directory: &Path,
    ) -> Result<()> {
        check_file(embedding_model_path, "Embedding model")?;
        if !persist_directory.exists() {
            std::fs::create_dir_all(persist_directory)?;
        }
        self.embedding_model_path = Some(embedding_model_path.to_path_buf());
        self.persist_directory = Some(persist_directory.to_path_buf());
        Ok(())
    }

    pub fn rag_enabled(&self) -> bool {
        self.embedding_model_path.is_some() && self.persist_directory.is_some()
    }

    fn init_params(&self) -> JsonValue {
        let mut params = json!({
            "absolute_chat_model_path": self.chat_model_path,
            "device": self.device,
            "verbose": self.verbose,
        });
        if let Some(related_model_path) = &self.related_model_path {
            params["absolute_related_model_path"] = json!(related_model_path);
        }
        if let (Some(embedding_model_path), Some(persist_directory)) =
            (&self.embedding_model_path, &self.persist_directory)
        {
            params["vectorstore_config"] = json!({
                "absolute_model_path": embedding_model_path,
                "persist_directory": persist_directory,
            });
        }
        params
    }
}

/// Owns the chat plugin: starts it, restarts it on a new config and waits for it to load.
pub struct LocalChatLLM {
    plugin_manager: Arc<PluginManager>,
    plugin_config: RwLock<Option<ChatPluginConfig>>,
    running_state: RunningStateSender,
    // Keeps the channel open while nobody else is subscribed.
    _running_state_rx: RunningStateReceiver,
    ready_timeout: Duration,
}

impl LocalChatLLM {
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

    pub async fn init_chat_plugin(&self, config: ChatPluginConfig) -> Result<(), PluginError> {
        let is_ready = self.running_state.borrow().is_ready();
        if is_ready {
            if let Some(existing_config) = self.plugin_config.read().await.as_ref() {
                if existing_config == &config {
                    trace!("[{}] already initialized with the same config", LABEL);
                    return Ok(());
                }
                trace!(
                    "[{}] existing config: <{:?}>, new config: <{:?}>",
                    LABEL,
                    existing_config,
                    config
                );
            }
        }

        self.destroy_chat_plugin().await;

        trace!("[{}] create chat plugin: <{:?}>", LABEL, config);
        let plugin_info = PluginInfo::new(CHAT_PLUGIN_NAME, config.chat_bin_path.clone())
            .with_args(config.args.clone());
        let plugin_id = self
            .plugin_manager
            .create_plugin(plugin_info, self.running_state.clone())
            .await?;

        let params = config.init_params();
        info!(
            "[{}] setup chat plugin <{}> with params <{}>",
            LABEL, plugin_id, params
        );
        let plugin = self.plugin_manager.init_plugin(plugin_id, params).await?;
        info!("[{}] {} setup success", LABEL, plugin);
        self.plugin_config.write().await.replace(config);
        Ok(())
    }

    /// Stops the current plugin, if any. Failures are logged, not returned.
    pub async fn destroy_chat_plugin(&self) {
        let plugin_id = self.running_state.borrow().plugin_id();
        if let Some(plugin_id) = plugin_id {
            if let Err(err) = self.plugin_manager.remove_plugin(plugin_id).await {
                error!("[{}] remove plugin <{}> failed: {}", LABEL, plugin_id, err);
            }
        }
        self.plugin_config.write().await.take();
    }

    async fn get_chat_plugin(&self) -> Result<Weak<Plugin>, PluginError> {
        wait_until_ready(&self.running_state, self.ready_timeout, LABEL).await?;
        let plugin_id = current_plugin_id(&self.running_state)?;
        self.plugin_manager.get_plugin(plugin_id)
    }

    async fn operation(&self) -> Result<AIPluginOperation, PluginError> {
        Ok(AIPluginOperation::new(self.get_chat_plugin().await?))
    }

    async fn rag_enabled(&self) -> bool {
        self.plugin_config
            .read()
            .await
            .as_ref()
            .map(|config| config.rag_enabled())
            .unwrap_or(false)
    }

    pub async fn create_chat(&self, chat_id: &str) -> Result<(), PluginError> {
        trace!("[{}] create chat: <{}>", LABEL, chat_id);
        let rag_enabled = self.rag_enabled().await;
        self.operation().await?.create_chat(chat_id, rag_enabled).await
    }

    pub async fn close_chat(&self, chat_id: &str) -> Result<(), PluginError> {
        trace!("[{}] close chat: <{}>", LABEL, chat_id);
        self.operation().await?.close_chat(chat_id).await
    }

    pub async fn ask_question(&self, chat_id: &str, message: &str) -> Result<String, PluginError> {
        trace!("[{}] ask question: <{}>", LABEL, message);
        let rag_enabled = self.rag_enabled().await;
        self.operation()
            .await?
            .send_message(chat_id, message, rag_enabled)
            .await
    }

    pub async fn stream_question(
        &self,
        chat_id: &str,
        message: &str,
        metadata: JsonValue,
    ) -> Result<ChatStream, PluginError> {
        trace!("[{}] stream question: <{}>", LABEL, message);
        self.operation()
            .await?
            .stream_message(chat_id, message, metadata)
    }

    pub async fn get_related_question(&self, chat_id: &str) -> Result<Vec<String>, PluginError> {
        self.operation().await?.get_related_questions(chat_id).await
    }

    pub async fn index_file(&self, chat_id: &str, file_path: &Path) -> Result<(), PluginError> {
        if !file_path.exists() {
            return Err(PluginError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", file_path.display()),
            )));
        }
        let file_path = file_path.to_str().ok_or_else(|| {
            PluginError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file path is not valid unicode",
            ))
        })?;
        trace!("[{}] indexing file: <{}>", LABEL, file_path);
        self.operation().await?.index_file(chat_id, file_path).await
    }

    pub async fn complete_text<T: Into<CompleteTextType>>(
        &self,
        text: &str,
        complete_type: T,
    ) -> Result<ChatStream, PluginError> {
        self.operation().await?.complete_text(text, complete_type)
    }

    pub async fn summary_row(&self, row: HashMap<String, String>) -> Result<String, PluginError> {
        self.operation().await?.summary_row(row).await
    }

    pub async fn translate_row(
        &self,
        data: LocalAITranslateRowData,
    ) -> Result<LocalAITranslateRowResponse, PluginError> {
        self.operation().await?.translate_row(data).await
    }
}
