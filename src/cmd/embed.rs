use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::start_embedding;
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct EmbedCommand {
    /// The text to embed
    pub text: String,
}

impl Execute for EmbedCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let embedding = start_embedding(&context, &cleanup_manager).await?;
        let vectors = embedding.generate_embedding(&self.text).await;
        embedding.destroy_embedding_plugin().await;
        println!("{}", serde_json::to_string(&vectors?)?);
        Ok(())
    }
}
