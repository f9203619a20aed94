use super::AudioSynthesizer;
use crate::error::{Result, VideoError};
use crate::run::PipelineRun;
use crate::scene::{total_duration, Scene};
use crate::video::MediaToolkit;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// 旁白文案撰写服务（通常由大模型提供）
#[async_trait]
pub trait NarrationWriter: Send + Sync {
    async fn write_narration(&self, scenes: &[Scene], total_duration_secs: u32) -> Result<String>;
}

/// 撰写旁白、合成语音，再变速到所有场景的总时长。
///
/// 任何一步失败都以 `SynthesisError` 返回，由调用方决定放弃旁白。
pub async fn generate_narration(
    writer: &dyn NarrationWriter,
    synthesizer: &dyn AudioSynthesizer,
    toolkit: &dyn MediaToolkit,
    run: &PipelineRun,
    scenes: &[Scene],
) -> Result<PathBuf> {
    let synthesis = |stage: &str, e: VideoError| VideoError::Synthesis(format!("{}: {}", stage, e));
    let total = total_duration(scenes);
    info!("Generating narration for {}s of video...", total);

    let text = writer
        .write_narration(scenes, total)
        .await
        .map_err(|e| synthesis("narration text", e))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(VideoError::Synthesis("narration text is empty".to_string()));
    }
    tokio::fs::write(run.narration_text_path(), text).await?;

    let raw = synthesizer
        .synthesize_speech(text, &run.narration_raw_path())
        .await
        .map_err(|e| synthesis("speech", e))?;

    let adjusted = run.narration_audio_path();
    toolkit
        .retime_audio(&raw, f64::from(total), &adjusted)
        .await
        .map_err(|e| synthesis("retime", e))?;

    info!("Narration saved to: {}", adjusted.display());
    Ok(adjusted)
}
