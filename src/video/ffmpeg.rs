use super::MediaToolkit;
use crate::config::MixLevels;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// atempo 单级只接受 [0.5, 2.0]，超出范围时串联多级
pub fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut stages = Vec::new();

    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    stages.push(remaining);

    stages
        .iter()
        .map(|s| format!("atempo={:.6}", s))
        .collect::<Vec<_>>()
        .join(",")
}

/// 生成 concat demuxer 的清单内容
pub fn concat_manifest(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

pub fn narration_filter(levels: MixLevels) -> String {
    format!(
        "[0:a]volume={:.2}[orig];[1:a]volume={:.2}[narr];[orig][narr]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]",
        levels.original, levels.narration
    )
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    /// 在 PATH 中查找 ffmpeg 与 ffprobe
    pub fn locate() -> Result<Self> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| VideoError::Env("ffmpeg not found on PATH".to_string()))?;
        let ffprobe = which::which("ffprobe")
            .map_err(|_| VideoError::Env("ffprobe not found on PATH".to_string()))?;
        Ok(Self { ffmpeg, ffprobe })
    }

    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run(&self, args: Vec<OsString>, what: &str) -> Result<()> {
        debug!("ffmpeg {:?}", args);

        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(&args)
            .output()
            .await
            .map_err(|e| VideoError::Ffmpeg(format!("Failed to run FFmpeg: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Ffmpeg(format!("FFmpeg {} failed: {}", what, error)));
        }

        Ok(())
    }
}

fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}

#[async_trait]
impl MediaToolkit for Ffmpeg {
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<()> {
        self.run(
            args([
                OsString::from("-y"),
                "-sseof".into(),
                "-3".into(),
                "-i".into(),
                video.into(),
                "-update".into(),
                "1".into(),
                "-q:v".into(),
                "2".into(),
                frame.into(),
            ]),
            "last frame extraction",
        )
        .await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        info!("Concatenating {} videos -> {}", inputs.len(), output.display());

        // concat demuxer 按清单所在目录解析相对路径，这里统一写绝对路径
        let mut absolute = Vec::with_capacity(inputs.len());
        for input in inputs {
            absolute.push(tokio::fs::canonicalize(input).await?);
        }

        let manifest = output.with_extension("concat.txt");
        tokio::fs::write(&manifest, concat_manifest(&absolute)).await?;

        let result = self
            .run(
                args([
                    OsString::from("-y"),
                    "-f".into(),
                    "concat".into(),
                    "-safe".into(),
                    "0".into(),
                    "-i".into(),
                    manifest.clone().into(),
                    "-c".into(),
                    "copy".into(),
                    output.into(),
                ]),
                "concat",
            )
            .await;

        tokio::fs::remove_file(&manifest).await.ok();
        result
    }

    async fn attach_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.run(
            args([
                OsString::from("-y"),
                "-i".into(),
                video.into(),
                "-i".into(),
                audio.into(),
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "1:a:0".into(),
                "-c:v".into(),
                "libx264".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-c:a".into(),
                "aac".into(),
                "-ar".into(),
                "44100".into(),
                "-ac".into(),
                "2".into(),
                "-shortest".into(),
                output.into(),
            ]),
            "sound effect attach",
        )
        .await
    }

    async fn with_silent_audio(&self, video: &Path, output: &Path) -> Result<()> {
        self.run(
            args([
                OsString::from("-y"),
                "-i".into(),
                video.into(),
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                "anullsrc=channel_layout=stereo:sample_rate=44100".into(),
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "1:a:0".into(),
                "-c:v".into(),
                "libx264".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-c:a".into(),
                "aac".into(),
                "-ar".into(),
                "44100".into(),
                "-ac".into(),
                "2".into(),
                "-shortest".into(),
                output.into(),
            ]),
            "silent track",
        )
        .await
    }

    async fn mix_narration(
        &self,
        video: &Path,
        narration: &Path,
        levels: MixLevels,
        output: &Path,
    ) -> Result<()> {
        self.run(
            args([
                OsString::from("-y"),
                "-i".into(),
                video.into(),
                "-i".into(),
                narration.into(),
                "-filter_complex".into(),
                narration_filter(levels).into(),
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "[aout]".into(),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                "aac".into(),
                output.into(),
            ]),
            "narration mix",
        )
        .await
    }

    async fn trim_audio(&self, audio: &Path, seconds: f64, output: &Path) -> Result<()> {
        self.run(
            args([
                OsString::from("-y"),
                "-i".into(),
                audio.into(),
                "-t".into(),
                format!("{:.3}", seconds).into(),
                "-c:a".into(),
                "libmp3lame".into(),
                output.into(),
            ]),
            "audio trim",
        )
        .await
    }

    async fn retime_audio(&self, audio: &Path, seconds: f64, output: &Path) -> Result<()> {
        let original = self.probe_duration(audio).await?;
        if seconds <= 0.0 || original <= 0.0 {
            return Err(VideoError::Ffmpeg(format!(
                "cannot retime {:.3}s audio to {:.3}s",
                original, seconds
            )));
        }

        let factor = original / seconds;
        info!(
            "Retiming {} from {:.2}s to {:.2}s (x{:.3})",
            audio.display(),
            original,
            seconds,
            factor
        );

        self.run(
            args([
                OsString::from("-y"),
                "-i".into(),
                audio.into(),
                "-filter:a".into(),
                atempo_chain(factor).into(),
                "-ar".into(),
                "44100".into(),
                "-t".into(),
                format!("{:.3}", seconds).into(),
                output.into(),
            ]),
            "audio retime",
        )
        .await
    }

    async fn probe_duration(&self, media: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(media)
            .output()
            .await
            .map_err(|e| VideoError::Ffmpeg(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Ffmpeg(format!("ffprobe failed: {}", error)));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<f64>().map_err(|_| {
            VideoError::Ffmpeg(format!("Unexpected ffprobe output: {}", text.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_within_range_is_single_stage() {
        assert_eq!(atempo_chain(1.25), "atempo=1.250000");
    }

    #[test]
    fn atempo_outside_range_is_chained() {
        let fast = atempo_chain(5.0);
        assert_eq!(fast, "atempo=2.000000,atempo=2.000000,atempo=1.250000");

        let slow = atempo_chain(0.2);
        assert!(slow.starts_with("atempo=0.500000,atempo=0.500000,"));
        assert!(slow.ends_with("atempo=0.800000"));
    }

    #[test]
    fn manifest_lists_inputs_in_order() {
        let manifest = concat_manifest(&[
            PathBuf::from("/run/scene_1/segment_1.mp4"),
            PathBuf::from("/run/scene_1/segment_2.mp4"),
        ]);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines[0], "file '/run/scene_1/segment_1.mp4'");
        assert_eq!(lines[1], "file '/run/scene_1/segment_2.mp4'");
    }

    #[test]
    fn narration_filter_attenuates_original() {
        let filter = narration_filter(MixLevels::default());
        assert!(filter.contains("[0:a]volume=0.70"));
        assert!(filter.contains("[1:a]volume=1.00"));
        assert!(filter.contains("amix=inputs=2:duration=first"));
    }
}
