use super::{is_non_empty_file, MediaToolkit};
use crate::error::{Result, VideoError};
use std::path::{Path, PathBuf};
use tracing::info;

/// 抽取视频最后一帧。源文件无法打开或没有可解码的帧时返回 `DecodeError`，不重试
pub async fn extract_last_frame(
    toolkit: &dyn MediaToolkit,
    video: &Path,
    frame: &Path,
) -> Result<PathBuf> {
    let decode_error = |reason: String| VideoError::Decode {
        video: video.display().to_string(),
        reason,
    };

    if !is_non_empty_file(video).await {
        return Err(decode_error("source video is missing or empty".to_string()));
    }

    toolkit
        .extract_last_frame(video, frame)
        .await
        .map_err(|e| decode_error(e.to_string()))?;

    if !is_non_empty_file(frame).await {
        return Err(decode_error("no frame could be decoded".to_string()));
    }

    info!("Extracted last frame to: {}", frame.display());
    Ok(frame.to_path_buf())
}
