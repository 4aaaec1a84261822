use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};

mod chat;
mod complete;
mod download;
mod embed;
mod env;
mod execute;
mod index;
mod plugins;
mod related;
mod search;
mod status;

use crate::cleanup::CleanupManager;
use crate::context::Context;
use chat::ChatCommand;
use complete::CompleteCommand;
use download::DownloadCommand;
use embed::EmbedCommand;
use env::EnvCommand;
pub(crate) use execute::Execute;
use index::IndexCommand;
use related::RelatedCommand;
use search::SearchCommand;
use status::StatusCommand;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(arg_required_else_help(true))]
pub struct Args {
    /// Print more verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Turn on debug output
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run as if started in this directory
    #[arg(short = 'C', long)]
    pub directory: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the chat plugin a question
    Chat(ChatCommand),

    /// Rewrite a piece of text with the chat plugin
    Complete(CompleteCommand),

    /// Ask a question and list the follow-up questions the plugin suggests
    Related(RelatedCommand),

    /// Index a file into a chat's vector store
    Index(IndexCommand),

    /// Print the embedding of a text
    Embed(EmbedCommand),

    /// Search indexed documents with the embedding plugin
    Search(SearchCommand),

    /// Start each configured plugin and report whether it comes up
    Status(StatusCommand),

    /// Download the plugin bundle
    Download(DownloadCommand),

    /// Read or rewrite the .env file
    #[command(subcommand)]
    Env(EnvCommand),
}

impl Execute for Commands {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        match self {
            Commands::Chat(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Complete(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Related(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Index(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Embed(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Search(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Status(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Download(cmd) => cmd.execute(context, cleanup_manager).await,
            Commands::Env(cmd) => cmd.execute(context, cleanup_manager).await,
        }
    }
}
