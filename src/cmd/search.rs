use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::Value as JsonValue;

use aiplug::llm::LocalEmbedding;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::start_embedding;
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct SearchCommand {
    /// What to look for
    pub query: String,

    /// Only match documents whose metadata has this value, as KEY=VALUE
    #[arg(long, value_parser = parse_key_value)]
    pub filter: Vec<(String, String)>,

    /// Index this text before searching, tagged with the filters
    #[arg(long)]
    pub document: Vec<String>,
}

fn parse_key_value(value: &str) -> Result<(String, String)> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got <{}>", value))?;
    if key.is_empty() {
        return Err(anyhow!("Filter key cannot be empty"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl SearchCommand {
    fn filter(&self) -> HashMap<String, JsonValue> {
        self.filter
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::from(v.as_str())))
            .collect()
    }

    async fn run(&self, embedding: &LocalEmbedding) -> Result<Vec<String>> {
        for document in &self.document {
            embedding.index(document, self.filter()).await?;
        }
        Ok(embedding.similarity_search(&self.query, self.filter()).await?)
    }
}

impl Execute for SearchCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let embedding = start_embedding(&context, &cleanup_manager).await?;
        let found = self.run(&embedding).await;
        embedding.destroy_embedding_plugin().await;
        for document in found? {
            println!("{}", document);
        }
        Ok(())
    }
}
