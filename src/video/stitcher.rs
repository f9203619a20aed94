use super::{is_non_empty_file, MediaToolkit};
use crate::error::{Result, VideoError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 把一个场景的片段视频按顺序拼接成一个场景视频
pub struct SceneStitcher {
    toolkit: Arc<dyn MediaToolkit>,
}

impl SceneStitcher {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    /// 只有一个片段时直接复制，不重新编码。任一输入缺失或为空返回 `StitchError`
    pub async fn stitch(&self, scene: u32, segments: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if segments.is_empty() {
            return Err(VideoError::Stitch(format!(
                "scene {} has no segment videos",
                scene
            )));
        }

        for segment in segments {
            if !is_non_empty_file(segment).await {
                return Err(VideoError::Stitch(format!(
                    "scene {} segment {} is missing or unreadable",
                    scene,
                    segment.display()
                )));
            }
        }

        if let [single] = segments {
            tokio::fs::copy(single, output).await.map_err(|e| {
                VideoError::Stitch(format!("failed to copy {}: {}", single.display(), e))
            })?;
        } else {
            self.toolkit
                .concat(segments, output)
                .await
                .map_err(|e| VideoError::Stitch(format!("scene {}: {}", scene, e)))?;
        }

        info!(
            "Stitched scene {} from {} segment(s): {}",
            scene,
            segments.len(),
            output.display()
        );
        Ok(output.to_path_buf())
    }
}
