//! 单元测试用的媒体工具替身：按字节拼接文件，不依赖 ffmpeg

use super::MediaToolkit;
use crate::config::MixLevels;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeToolkit {
    /// 为 true 时抽帧“成功”但不产出图片
    pub frameless: bool,
    /// 挂载音效时对这些视频失败
    pub failing_attach: Vec<PathBuf>,
    /// 对这些视频的任何处理都失败
    pub failing_videos: Vec<PathBuf>,
    pub failing_mix: bool,
    pub(crate) concat_calls: Mutex<Vec<Vec<PathBuf>>>,
    pub(crate) attach_calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeToolkit {
    pub fn concat_calls(&self) -> Vec<Vec<PathBuf>> {
        self.concat_calls.lock().unwrap().clone()
    }

    pub fn attach_calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.attach_calls.lock().unwrap().clone()
    }

    fn check(&self, video: &Path) -> Result<()> {
        if self.failing_videos.iter().any(|p| p == video) {
            return Err(VideoError::Ffmpeg(format!("cannot open {}", video.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<()> {
        self.check(video)?;
        if !self.frameless {
            tokio::fs::write(frame, format!("last frame of {}", video.display())).await?;
        }
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.concat_calls.lock().unwrap().push(inputs.to_vec());
        let mut bytes = Vec::new();
        for input in inputs {
            bytes.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn attach_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.check(video)?;
        self.attach_calls
            .lock()
            .unwrap()
            .push((video.to_path_buf(), audio.to_path_buf()));
        if self.failing_attach.iter().any(|p| p == video) {
            return Err(VideoError::Ffmpeg("bad audio stream".to_string()));
        }
        tokio::fs::copy(video, output).await?;
        Ok(())
    }

    async fn with_silent_audio(&self, video: &Path, output: &Path) -> Result<()> {
        self.check(video)?;
        tokio::fs::copy(video, output).await?;
        Ok(())
    }

    async fn mix_narration(
        &self,
        video: &Path,
        narration: &Path,
        _levels: MixLevels,
        output: &Path,
    ) -> Result<()> {
        if self.failing_mix {
            return Err(VideoError::Ffmpeg("amix failed".to_string()));
        }
        let mut bytes = tokio::fs::read(video).await?;
        bytes.extend(tokio::fs::read(narration).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn trim_audio(&self, audio: &Path, _seconds: f64, output: &Path) -> Result<()> {
        tokio::fs::copy(audio, output).await?;
        Ok(())
    }

    async fn retime_audio(&self, audio: &Path, _seconds: f64, output: &Path) -> Result<()> {
        tokio::fs::copy(audio, output).await?;
        Ok(())
    }

    async fn probe_duration(&self, media: &Path) -> Result<f64> {
        Ok(tokio::fs::metadata(media).await?.len() as f64)
    }
}
