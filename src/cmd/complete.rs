use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;

use aiplug::ai::CompleteTextType;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::{print_stream, start_chat};
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct CompleteCommand {
    /// The text to work on
    pub text: String,

    /// 1 improve writing, 2 fix spelling and grammar, 3 make shorter, 4 make longer, 5 ask AI
    #[arg(long = "type", default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub complete_type: u8,
}

impl Execute for CompleteCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let llm = start_chat(&context, &cleanup_manager).await?;
        let complete_type = CompleteTextType::from(self.complete_type);
        let result = match llm.complete_text(&self.text, complete_type).await {
            Ok(stream) => print_stream(stream).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        llm.destroy_chat_plugin().await;
        result
    }
}
