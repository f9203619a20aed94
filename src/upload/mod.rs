use crate::config::RetryPolicy;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// 图片上传服务：上传本地图片并返回可公开访问的 URL
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, image: &Path) -> Result<String>;
}

/// 上传成功的结果及所用的尝试次数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinctUpload {
    pub url: String,
    pub attempts: u32,
}

/// 上传图片，直到得到一个与 `previous` 不同的 URL。
///
/// 上传服务偶尔会静默返回上一次（缓存的）URL 而不是报错，因此这里按值比较，
/// 重复时以固定间隔重试，次数用尽后返回 `UploadStalenessError`。
pub async fn upload_distinct(
    uploader: &dyn AssetUploader,
    image: &Path,
    previous: Option<&str>,
    policy: RetryPolicy,
) -> Result<DistinctUpload> {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let url = uploader.upload(image).await?;
        if previous != Some(url.as_str()) {
            info!("Uploaded {} -> {}", image.display(), url);
            return Ok(DistinctUpload { url, attempts: attempt });
        }

        warn!(
            "Got duplicate URL for {}, retrying... (attempt {}/{})",
            image.display(),
            attempt,
            max_attempts
        );
        if attempt < max_attempts {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    Err(VideoError::UploadStaleness {
        frame: image.display().to_string(),
        attempts: max_attempts,
    })
}
