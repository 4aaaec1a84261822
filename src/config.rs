use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;
use validator::Validate;

use crate::commands::split_args;
use crate::llm::{ChatPluginConfig, EmbeddingPluginConfig};

pub const CONFIG_FILE_NAME: &str = "aiplug.toml";
pub const DEFAULT_DOWNLOAD_FILE_NAME: &str = "AppFlowyLLM.zip";

pub const CHAT_BIN_PATH: &str = "CHAT_BIN_PATH";
pub const EMBEDDING_BIN_PATH: &str = "EMBEDDING_BIN_PATH";
pub const LOCAL_AI_MODEL_DIR: &str = "LOCAL_AI_MODEL_DIR";
pub const LOCAL_AI_CHAT_MODEL_NAME: &str = "LOCAL_AI_CHAT_MODEL_NAME";
pub const LOCAL_AI_RELATED_QUESTION_NAME: &str = "LOCAL_AI_RELATED_QUESTION_NAME";
pub const LOCAL_AI_EMBEDDING_MODEL_NAME: &str = "LOCAL_AI_EMBEDDING_MODEL_NAME";

#[derive(Deserialize, Clone, Default, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[validate(length(min = 1))]
    pub model_dir: Option<String>,

    #[validate(nested)]
    pub chat: Option<ChatSection>,

    #[validate(nested)]
    pub embedding: Option<EmbeddingSection>,

    #[validate(nested)]
    pub download: Option<DownloadSection>,
}

#[derive(Deserialize, Clone, Default, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChatSection {
    #[validate(length(min = 1, message = "bin_path must not be empty"))]
    pub bin_path: Option<String>,
    #[validate(length(min = 1, message = "model_path must not be empty"))]
    pub model_path: Option<String>,
    #[validate(length(min = 1))]
    pub related_model_path: Option<String>,
    #[validate(length(min = 1))]
    pub embedding_model_path: Option<String>,
    #[validate(length(min = 1))]
    pub persist_directory: Option<String>,
    #[validate(custom(function = "crate::validate::known_device"))]
    pub device: Option<String>,
    pub verbose: Option<bool>,
    #[validate(custom(function = "crate::validate::shell_words"))]
    pub args: Option<String>,
}

#[derive(Deserialize, Clone, Default, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingSection {
    #[validate(length(min = 1, message = "bin_path must not be empty"))]
    pub bin_path: Option<String>,
    #[validate(length(min = 1, message = "model_path must not be empty"))]
    pub model_path: Option<String>,
    #[validate(length(min = 1))]
    pub persist_directory: Option<String>,
    #[validate(custom(function = "crate::validate::shell_words"))]
    pub args: Option<String>,
}

#[derive(Deserialize, Clone, Default, Debug, Validate)]
#[serde(deny_unknown_fields)]
pub struct DownloadSection {
    #[validate(url)]
    pub url: Option<String>,
    #[validate(length(min = 1))]
    pub dir: Option<String>,
    #[validate(custom(function = "crate::validate::bare_file_name"))]
    pub file_name: Option<String>,
}

/// Walks up from `start` looking for the config file.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut config_dir = start.to_path_buf();
    loop {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            debug!("Found config file at <{}>", config_path.display());
            return Some(config_path);
        }
        if !config_dir.pop() {
            return None;
        }
    }
}

/// Expands `~` and `$VAR`, then anchors relative paths at `base`.
pub fn resolve_path(value: &str, base: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(value)
        .with_context(|| format!("Could not expand path <{}>", value))?;
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(base.join(path))
    }
}

fn override_with<F>(slot: &mut Option<String>, key: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
        debug!("Overriding config with <{}>=<{}>", key, value);
        *slot = Some(value);
    }
}

impl Config {
    pub fn load_and_validate(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Error reading config file <{}>", config_path.display()))?;
        let config: Config = toml::from_str(config_str.as_str())
            .with_context(|| format!("Error parsing config file <{}>", config_path.display()))?;
        debug!("Loaded config: {:?}", config);
        config.validate()?;
        Ok(config)
    }

    /// Applies the variables the test setup writes to `.env`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&mut self.model_dir, LOCAL_AI_MODEL_DIR, &lookup);

        let chat = self.chat.get_or_insert_with(Default::default);
        override_with(&mut chat.bin_path, CHAT_BIN_PATH, &lookup);
        override_with(&mut chat.model_path, LOCAL_AI_CHAT_MODEL_NAME, &lookup);
        override_with(
            &mut chat.related_model_path,
            LOCAL_AI_RELATED_QUESTION_NAME,
            &lookup,
        );

        let embedding = self.embedding.get_or_insert_with(Default::default);
        override_with(&mut embedding.bin_path, EMBEDDING_BIN_PATH, &lookup);
        override_with(
            &mut embedding.model_path,
            LOCAL_AI_EMBEDDING_MODEL_NAME,
            &lookup,
        );
    }

    fn model_dir(&self, base_dir: &Path) -> Result<PathBuf> {
        match &self.model_dir {
            Some(dir) => resolve_path(dir, base_dir),
            None => Ok(base_dir.to_path_buf()),
        }
    }

    fn model_path(&self, value: &str, base_dir: &Path) -> Result<PathBuf> {
        resolve_path(value, &self.model_dir(base_dir)?)
    }

    pub fn chat_plugin_config(&self, base_dir: &Path) -> Result<ChatPluginConfig> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow!("No [chat] section configured"))?;
        let bin_path = chat
            .bin_path
            .as_deref()
            .ok_or_else(|| anyhow!("chat.bin_path is not set (or {})", CHAT_BIN_PATH))?;
        let model_path = chat.model_path.as_deref().ok_or_else(|| {
            anyhow!(
                "chat.model_path is not set (or {})",
                LOCAL_AI_CHAT_MODEL_NAME
            )
        })?;

        let mut config = ChatPluginConfig::new(
            resolve_path(bin_path, base_dir)?,
            self.model_path(model_path, base_dir)?,
        )?
        .with_device(chat.device.as_deref().unwrap_or("cpu"))
        .with_verbose(chat.verbose.unwrap_or(false));

        if let Some(related) = &chat.related_model_path {
            config = config.with_related_model_path(self.model_path(related, base_dir)?);
        }
        if let (Some(embedding_model), Some(persist)) =
            (&chat.embedding_model_path, &chat.persist_directory)
        {
            config.set_rag_enabled(
                &self.model_path(embedding_model, base_dir)?,
                &resolve_path(persist, base_dir)?,
            )?;
        }
        if let Some(args) = &chat.args {
            config = config.with_args(split_args(args)?);
        }
        Ok(config)
    }

    /// `None` when no embedding binary is configured.
    pub fn embedding_plugin_config(&self, base_dir: &Path) -> Result<Option<EmbeddingPluginConfig>> {
        let Some(embedding) = &self.embedding else {
            return Ok(None);
        };
        let Some(bin_path) = embedding.bin_path.as_deref() else {
            return Ok(None);
        };
        let model_path = embedding.model_path.as_deref().ok_or_else(|| {
            anyhow!(
                "embedding.model_path is not set (or {})",
                LOCAL_AI_EMBEDDING_MODEL_NAME
            )
        })?;
        let persist_directory = embedding
            .persist_directory
            .as_deref()
            .map(|dir| resolve_path(dir, base_dir))
            .transpose()?;
        let mut config = EmbeddingPluginConfig::new(
            resolve_path(bin_path, base_dir)?,
            self.model_path(model_path, base_dir)?,
            persist_directory,
        )?;
        if let Some(args) = &embedding.args {
            config = config.with_args(split_args(args)?);
        }
        Ok(Some(config))
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download.as_ref().and_then(|d| d.url.as_deref())
    }

    pub fn download_dir(&self, base_dir: &Path) -> Result<PathBuf> {
        match self.download.as_ref().and_then(|d| d.dir.as_deref()) {
            Some(dir) => resolve_path(dir, base_dir),
            None => self.model_dir(base_dir),
        }
    }

    pub fn download_file_name(&self) -> &str {
        self.download
            .as_ref()
            .and_then(|d| d.file_name.as_deref())
            .unwrap_or(DEFAULT_DOWNLOAD_FILE_NAME)
    }
}
