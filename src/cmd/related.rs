use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use log::info;

use aiplug::llm::LocalChatLLM;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::{new_chat_id, start_chat};
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct RelatedCommand {
    /// The question to ask before asking for related questions
    pub message: String,

    #[arg(long)]
    pub chat_id: Option<String>,
}

impl RelatedCommand {
    async fn related(&self, llm: &LocalChatLLM, chat_id: &str) -> Result<Vec<String>> {
        let answer = llm.ask_question(chat_id, &self.message).await?;
        info!("{}", answer);
        Ok(llm.get_related_question(chat_id).await?)
    }

    async fn run(&self, llm: &LocalChatLLM) -> Result<Vec<String>> {
        let chat_id = new_chat_id(&self.chat_id);
        llm.create_chat(&chat_id).await?;
        let questions = self.related(llm, &chat_id).await;
        let closed = llm.close_chat(&chat_id).await;
        let questions = questions?;
        closed?;
        Ok(questions)
    }
}

impl Execute for RelatedCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let llm = start_chat(&context, &cleanup_manager).await?;
        let questions = self.run(&llm).await;
        llm.destroy_chat_plugin().await;
        for question in questions? {
            println!("{}", question);
        }
        Ok(())
    }
}
