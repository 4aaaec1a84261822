use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use aiplug::env_file::EnvFile;

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Set one or more KEY=VALUE pairs
    Set(SetCommand),

    /// Print the value of a key
    Get(GetCommand),
}

#[derive(Parser, Debug)]
pub struct SetCommand {
    #[arg(required = true)]
    pub assignments: Vec<String>,

    /// The file to edit, defaults to .env next to the config file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct GetCommand {
    pub key: String,

    #[arg(long)]
    pub file: Option<PathBuf>,
}

fn env_file_path(context: &Context, file: &Option<PathBuf>) -> PathBuf {
    match file {
        Some(file) if file.is_absolute() => file.clone(),
        Some(file) => context.base_dir.join(file),
        None => context.env_file_path(),
    }
}

impl Execute for EnvCommand {
    async fn execute(
        &self,
        context: Context,
        _cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        match self {
            EnvCommand::Set(cmd) => {
                let mut env = EnvFile::load(env_file_path(&context, &cmd.file))?;
                for assignment in &cmd.assignments {
                    let (key, value) = assignment
                        .split_once('=')
                        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got <{}>", assignment))?;
                    env.set(key, value)?;
                }
                env.save()?;
                info!("Updated <{}>", env.path().display());
                Ok(())
            }
            EnvCommand::Get(cmd) => {
                let env = EnvFile::load(env_file_path(&context, &cmd.file))?;
                let value = env.get(&cmd.key).ok_or_else(|| {
                    anyhow!("<{}> is not set in <{}>", cmd.key, env.path().display())
                })?;
                println!("{}", value);
                Ok(())
            }
        }
    }
}
