pub mod assembler;
pub mod ffmpeg;
pub mod frame;
pub mod renderer;
pub mod stitcher;
#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{FinalAssembler, SceneVideo};
pub use ffmpeg::Ffmpeg;
pub use frame::extract_last_frame;
pub use renderer::{RenderedVideo, SceneRenderer};
pub use stitcher::SceneStitcher;

use crate::config::MixLevels;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 本地音视频处理能力（解码、拼接、混音），默认实现基于 ffmpeg 命令行
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// 把视频最后一帧解码成静态图片
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<()>;

    /// 按顺序拼接若干视频
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// 用 `audio` 作为视频的音轨，两者中较长的一方被截到较短的一方
    async fn attach_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// 给视频配一条静音音轨，使所有场景的流布局一致
    async fn with_silent_audio(&self, video: &Path, output: &Path) -> Result<()>;

    /// 在已有音轨上叠加旁白：原声按 `levels.original` 衰减，旁白按 `levels.narration`
    async fn mix_narration(
        &self,
        video: &Path,
        narration: &Path,
        levels: MixLevels,
        output: &Path,
    ) -> Result<()>;

    /// 把音频截断到 `seconds`
    async fn trim_audio(&self, audio: &Path, seconds: f64, output: &Path) -> Result<()>;

    /// 变速使音频时长等于 `seconds`
    async fn retime_audio(&self, audio: &Path, seconds: f64, output: &Path) -> Result<()>;

    async fn probe_duration(&self, media: &Path) -> Result<f64>;
}

/// 文件存在且非空
pub(crate) async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
