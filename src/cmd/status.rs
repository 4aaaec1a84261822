use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use log::{debug, info};

use aiplug::llm::{LocalChatLLM, LocalEmbedding};
use aiplug::RunningState;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::cmd::plugins::{start_chat, start_embedding};
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct StatusCommand {}

fn describe(state: &RunningState) -> &'static str {
    match state {
        RunningState::Running { .. } => "Running",
        RunningState::Connecting | RunningState::Connected { .. } => "Loading",
        RunningState::Stopped { .. } | RunningState::Uninitialized => "Not running",
        RunningState::UnexpectedStop { .. } => "Stopped unexpectedly",
    }
}

impl StatusCommand {
    async fn chat_status(
        &self,
        context: &Context,
        cleanup_manager: &Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let configured = context.config.chat.as_ref().and_then(|c| c.bin_path.as_ref());
        if configured.is_none() {
            println!("[chat_plugin] Not configured");
            return Ok(());
        }
        let llm: LocalChatLLM = match start_chat(context, cleanup_manager).await {
            Ok(llm) => llm,
            Err(e) => {
                println!("[chat_plugin] Failed to start: {}", e);
                return Err(e);
            }
        };
        let state = llm.subscribe_running_state().borrow().clone();
        println!("[chat_plugin] {}", describe(&state));
        llm.destroy_chat_plugin().await;
        debug!("Chat plugin stopped");
        Ok(())
    }

    async fn embedding_status(
        &self,
        context: &Context,
        cleanup_manager: &Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let configured = context
            .config
            .embedding
            .as_ref()
            .and_then(|e| e.bin_path.as_ref());
        if configured.is_none() {
            println!("[embedding] Not configured");
            return Ok(());
        }
        let embedding: LocalEmbedding = match start_embedding(context, cleanup_manager).await {
            Ok(embedding) => embedding,
            Err(e) => {
                println!("[embedding] Failed to start: {}", e);
                return Err(e);
            }
        };
        let state = embedding.subscribe_running_state().borrow().clone();
        println!("[embedding] {}", describe(&state));
        embedding.destroy_embedding_plugin().await;
        Ok(())
    }
}

impl Execute for StatusCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        match &context.config_path {
            Some(path) => info!("Using config <{}>", path.display()),
            None => info!("No config file, using environment only"),
        }
        let chat = self.chat_status(&context, &cleanup_manager).await;
        let embedding = self.embedding_status(&context, &cleanup_manager).await;
        chat?;
        embedding?;
        Ok(())
    }
}
