use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{debug, info};

use aiplug::config::resolve_path;
use aiplug::download::{download_plugin, ProgressCallback};

use crate::cleanup::CleanupManager;
use crate::cmd::execute::Execute;
use crate::context::Context;

#[derive(Parser, Debug)]
pub struct DownloadCommand {
    /// Where to download from, instead of download.url
    #[arg(long)]
    pub url: Option<String>,

    /// Directory to download into, instead of download.dir
    #[arg(long)]
    pub dir: Option<String>,

    /// Name of the downloaded file, instead of download.file_name
    #[arg(long)]
    pub file_name: Option<String>,
}

/// Logs every whole percent once.
fn progress_logger() -> ProgressCallback {
    let last_percent = AtomicU64::new(u64::MAX);
    Arc::new(move |downloaded, total| {
        let percent = if total == 0 { 100 } else { downloaded * 100 / total };
        if last_percent.swap(percent, Ordering::Relaxed) != percent {
            debug!("Downloaded {}% ({}/{} bytes)", percent, downloaded, total);
        }
    })
}

impl Execute for DownloadCommand {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()> {
        let config = &context.config;
        let url = self
            .url
            .as_deref()
            .or(config.download_url())
            .ok_or_else(|| anyhow!("No download url, pass --url or set download.url"))?;
        let dir = match &self.dir {
            Some(dir) => resolve_path(dir, &context.base_dir)?,
            None => config.download_dir(&context.base_dir)?,
        };
        let file_name = self
            .file_name
            .as_deref()
            .unwrap_or(config.download_file_name());
        if let Err(e) = aiplug::validate::bare_file_name(file_name) {
            return Err(anyhow!("Invalid file name <{}>: {}", file_name, e));
        }

        let partial: PathBuf = dir.join(format!("{}.part", file_name));
        if let Ok(mut cleanups) = cleanup_manager.lock() {
            cleanups.push_cleanup("remove partial download".to_string(), move || {
                let _ = std::fs::remove_file(&partial);
            });
        }

        let path = download_plugin(url, &dir, file_name, None, Some(progress_logger())).await?;
        info!("Downloaded <{}>", url);
        println!("{}", path.display());
        Ok(())
    }
}
