//! Host side of the local AI plugins: starts the chat and embedding binaries
//! as child processes and talks to them over line-delimited JSON-RPC.

pub mod ai;
pub mod commands;
pub mod config;
pub mod download;
pub mod env_file;
pub mod error;
pub mod llm;
pub mod manager;
pub mod plugin;
pub mod rpc;
pub mod util;
pub mod validate;

#[cfg(all(test, unix))]
mod testing;

pub use error::{PluginError, ReadError, RemoteError};
pub use manager::PluginManager;
pub use plugin::{Plugin, PluginId, PluginInfo, RunningState};
