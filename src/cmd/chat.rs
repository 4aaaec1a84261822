use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use serde_json::json;

use aiplug::llm::LocalChatLLM;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::{new_chat_id, print_stream, start_chat};
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct ChatCommand {
    /// The question to ask
    pub message: String,

    /// Reuse an existing chat instead of starting a new one
    #[arg(long)]
    pub chat_id: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,
}

impl ChatCommand {
    async fn ask(&self, llm: &LocalChatLLM, chat_id: &str) -> Result<()> {
        if self.stream {
            let stream = llm.stream_question(chat_id, &self.message, json!({})).await?;
            print_stream(stream).await?;
        } else {
            println!("{}", llm.ask_question(chat_id, &self.message).await?);
        }
        Ok(())
    }

    async fn run(&self, llm: &LocalChatLLM) -> Result<()> {
        let chat_id = new_chat_id(&self.chat_id);
        llm.create_chat(&chat_id).await?;
        let asked = self.ask(llm, &chat_id).await;
        let closed = llm.close_chat(&chat_id).await;
        asked?;
        closed?;
        Ok(())
    }
}

impl Execute for ChatCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let llm = start_chat(&context, &cleanup_manager).await?;
        let result = self.run(&llm).await;
        llm.destroy_chat_plugin().await;
        result
    }
}
