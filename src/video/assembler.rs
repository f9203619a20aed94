use super::{is_non_empty_file, MediaToolkit};
use crate::config::MixLevels;
use crate::error::{Result, VideoError};
use crate::run::PipelineRun;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 拼接好的单个场景视频
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneVideo {
    pub scene: u32,
    pub path: PathBuf,
}

/// 合成最终视频：按顺序拼接场景、挂载各场景音效、叠加旁白
pub struct FinalAssembler {
    toolkit: Arc<dyn MediaToolkit>,
    levels: MixLevels,
}

impl FinalAssembler {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, levels: MixLevels) -> Self {
        Self { toolkit, levels }
    }

    /// 合成最终视频。
    ///
    /// `sound_effects` 与 `scenes` 按位置对应，缺失或为 `None` 的场景配静音轨。
    /// 挂载音效时较长的一方会被截到较短一方的时长（有损，属于既定策略）。
    /// 单个场景处理失败时丢弃该场景继续合成，全部失败返回 `NoRenderableContentError`。
    pub async fn assemble(
        &self,
        run: &PipelineRun,
        scenes: &[SceneVideo],
        sound_effects: &[Option<PathBuf>],
        narration: Option<&Path>,
    ) -> Result<PathBuf> {
        info!("Assembling final video from {} scene(s)...", scenes.len());

        let assembly_dir = run.assembly_dir();
        tokio::fs::create_dir_all(&assembly_dir).await?;

        let mut prepared = Vec::with_capacity(scenes.len());
        for (idx, scene) in scenes.iter().enumerate() {
            let sound = sound_effects.get(idx).and_then(Option::as_deref);
            let output = assembly_dir.join(format!("scene_{}_with_audio.mp4", scene.scene));

            match self.prepare_scene(run, scene, sound, &output).await {
                Ok(()) => prepared.push(output),
                Err(e) => run.record_failure(
                    "assembly",
                    Some(scene.scene),
                    format!("scene dropped from final video: {}", e),
                ),
            }
        }

        if prepared.is_empty() {
            return Err(VideoError::NoRenderableContent);
        }

        let concatenated = assembly_dir.join("concatenated.mp4");
        if let [single] = prepared.as_slice() {
            tokio::fs::copy(single, &concatenated).await?;
        } else {
            self.toolkit.concat(&prepared, &concatenated).await?;
        }

        let final_path = run.final_video_path();
        match narration {
            Some(narration) if is_non_empty_file(narration).await => {
                if let Err(e) = self
                    .toolkit
                    .mix_narration(&concatenated, narration, self.levels, &final_path)
                    .await
                {
                    run.record_failure("narration", None, format!("failed to mix narration: {}", e));
                    tokio::fs::copy(&concatenated, &final_path).await?;
                }
            }
            Some(narration) => {
                run.record_failure(
                    "narration",
                    None,
                    format!("narration audio {} is missing", narration.display()),
                );
                tokio::fs::copy(&concatenated, &final_path).await?;
            }
            None => {
                tokio::fs::copy(&concatenated, &final_path).await?;
            }
        }

        info!("Final video: {}", final_path.display());
        Ok(final_path)
    }

    async fn prepare_scene(
        &self,
        run: &PipelineRun,
        scene: &SceneVideo,
        sound: Option<&Path>,
        output: &Path,
    ) -> Result<()> {
        if !is_non_empty_file(&scene.path).await {
            return Err(VideoError::Stitch(format!(
                "scene video {} is missing",
                scene.path.display()
            )));
        }

        if let Some(sound) = sound.filter(|p| p.exists()) {
            match self.toolkit.attach_audio(&scene.path, sound, output).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Failed to attach sound effect {} to scene {}: {}",
                        sound.display(),
                        scene.scene,
                        e
                    );
                    run.record_failure("sound_effect", Some(scene.scene), e.to_string());
                }
            }
        }

        self.toolkit.with_silent_audio(&scene.path, output).await
    }
}
