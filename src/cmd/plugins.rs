use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;

use aiplug::llm::{LocalChatLLM, LocalEmbedding};
use aiplug::PluginError;

use crate::cleanup::CleanupManager;
use crate::context::Context;

/// Makes ctrl-c stop every plugin this invocation started.
fn register_shutdown(context: &Context, cleanup_manager: &Arc<Mutex<CleanupManager>>) {
    let manager = context.plugin_manager.clone();
    if let Ok(mut cleanups) = cleanup_manager.lock() {
        cleanups.push_cleanup("stop plugins".to_string(), move || manager.shutdown_all());
    }
}

pub async fn start_chat(
    context: &Context,
    cleanup_manager: &Arc<Mutex<CleanupManager>>,
) -> Result<LocalChatLLM> {
    let config = context.config.chat_plugin_config(&context.base_dir)?;
    debug!("Starting chat plugin <{}>", config.chat_bin_path.display());
    register_shutdown(context, cleanup_manager);
    let llm = LocalChatLLM::new(context.plugin_manager.clone());
    llm.init_chat_plugin(config).await?;
    Ok(llm)
}

pub async fn start_embedding(
    context: &Context,
    cleanup_manager: &Arc<Mutex<CleanupManager>>,
) -> Result<LocalEmbedding> {
    let config = context
        .config
        .embedding_plugin_config(&context.base_dir)?
        .ok_or_else(|| anyhow!("No embedding plugin configured, set embedding.bin_path"))?;
    debug!("Starting embedding plugin <{}>", config.bin_path.display());
    register_shutdown(context, cleanup_manager);
    let embedding = LocalEmbedding::new(context.plugin_manager.clone());
    embedding.init_embedding_plugin(config).await?;
    Ok(embedding)
}

/// Writes chunks to stdout as they arrive. Returns the whole text.
pub async fn print_stream(mut stream: UnboundedReceiver<Result<String, PluginError>>) -> Result<String> {
    use std::io::Write;

    let mut text = String::new();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.recv().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
        text.push_str(&chunk);
    }
    writeln!(stdout)?;
    Ok(text)
}

pub fn new_chat_id(chat_id: &Option<String>) -> String {
    match chat_id {
        Some(chat_id) => chat_id.clone(),
        None => {
            let chat_id = uuid::Uuid::new_v4().to_string();
            info!("Using chat <{}>", chat_id);
            chat_id
        }
    }
}
