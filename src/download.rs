use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use log::{debug, info};
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Downloads `url` into `dir/file_name`, going through `file_name.part` so an
/// interrupted download never leaves a file under the final name.
pub async fn download_plugin(
    url: &str,
    dir: &Path,
    file_name: &str,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressCallback>,
) -> Result<PathBuf> {
    info!("Downloading <{}> to <{}>", url, dir.display());
    let response = Client::new().get(url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow!("Failed to download <{}>: {}", url, response.status()));
    }
    let total_size = response
        .content_length()
        .ok_or_else(|| anyhow!("Failed to get content length of <{}>", url))?;

    fs::create_dir_all(dir).await?;
    let partial_path = dir.join(format!("{}.part", file_name));
    let final_path = dir.join(file_name);

    let result = write_body(response, &partial_path, total_size, cancel, progress).await;
    if let Err(err) = result {
        debug!("Removing partial download <{}>", partial_path.display());
        let _ = fs::remove_file(&partial_path).await;
        return Err(err);
    }

    fs::rename(&partial_path, &final_path).await?;
    info!("Downloaded <{}>", final_path.display());
    Ok(final_path)
}

async fn write_body(
    response: reqwest::Response,
    partial_path: &Path,
    total_size: u64,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let mut part_file = File::create(partial_path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::SeqCst))
        {
            return Err(anyhow!("Download canceled"));
        }
        let bytes = chunk?;
        part_file.write_all(&bytes).await?;
        downloaded += bytes.len() as u64;
        if let Some(progress) = &progress {
            progress(downloaded, total_size);
        }
    }

    part_file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use parking_lot::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn serve(body: Vec<u8>, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bundle.zip"))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn downloads_and_reports_progress() {
        let body = vec![7u8; 4096];
        let server = serve(body.clone(), 200).await;
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let progress: ProgressCallback = Arc::new(move |done, total| {
            recorder.lock().push((done, total));
        });

        let url = format!("{}/bundle.zip", server.uri());
        let target = download_plugin(&url, dir.path(), "bundle.zip", None, Some(progress))
            .await
            .unwrap();

        assert_eq!(target, dir.path().join("bundle.zip"));
        assert_eq!(std::fs::read(&target).unwrap(), body);
        assert!(!dir.path().join("bundle.zip.part").exists());
        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&(4096, 4096)));
    }

    #[tokio::test]
    async fn failed_status_is_an_error() {
        let server = serve(Vec::new(), 404).await;
        let dir = TempDir::new().unwrap();
        let url = format!("{}/bundle.zip", server.uri());
        let err = download_plugin(&url, dir.path(), "bundle.zip", None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(!dir.path().join("bundle.zip").exists());
    }

    #[tokio::test]
    async fn cancel_removes_partial_file() {
        let server = serve(vec![1u8; 1024], 200).await;
        let dir = TempDir::new().unwrap();
        let url = format!("{}/bundle.zip", server.uri());
        let cancel = Arc::new(AtomicBool::new(true));
        let err = download_plugin(&url, dir.path(), "bundle.zip", Some(cancel), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Download canceled");
        assert!(!dir.path().join("bundle.zip.part").exists());
        assert!(!dir.path().join("bundle.zip").exists());
    }
}
