use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;

use aiplug::llm::LocalChatLLM;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::{new_chat_id, start_chat};
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct IndexCommand {
    /// The file to index
    pub file: PathBuf,

    #[arg(long)]
    pub chat_id: Option<String>,
}

impl Execute for IndexCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let file = if self.file.is_absolute() {
            self.file.clone()
        } else {
            std::env::current_dir()?.join(&self.file)
        };
        let llm = start_chat(&context, &cleanup_manager).await?;
        let chat_id = new_chat_id(&self.chat_id);
        let result = index_into(&llm, &chat_id, &file).await;
        llm.destroy_chat_plugin().await;
        result?;
        println!("Indexed {} into chat {}", file.display(), chat_id);
        Ok(())
    }
}

async fn index_into(llm: &LocalChatLLM, chat_id: &str, file: &Path) -> Result<()> {
    llm.create_chat(chat_id).await?;
    let indexed = llm.index_file(chat_id, file).await;
    let closed = llm.close_chat(chat_id).await;
    indexed?;
    closed?;
    Ok(())
}
