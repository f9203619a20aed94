pub mod elevenlabs;
pub mod fal;
pub mod imgur;
pub mod luma;
pub mod qwen;

pub use elevenlabs::ElevenLabsClient;
pub use fal::LtxEngine;
pub use imgur::ImgurUploader;
pub use luma::LumaEngine;
pub use qwen::QwenClient;

use crate::error::{Result, VideoError};
use reqwest::{Client, Response};
use std::path::Path;
use tracing::info;

/// 非 2xx 响应转换为 `VideoError::Api`，附带响应体
pub(crate) async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await?;
    Err(VideoError::Api(format!(
        "{} error (HTTP {}): {}",
        what, status, error_text
    )))
}

/// 下载远程文件到本地路径
pub(crate) async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<()> {
    info!("Downloading {} -> {}", url, dest.display());

    let response = client.get(url).send().await?;
    let response = ensure_success(response, "Download").await?;
    let data = response.bytes().await?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, data).await?;
    Ok(())
}
