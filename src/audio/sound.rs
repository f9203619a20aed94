use super::AudioSynthesizer;
use crate::run::PipelineRun;
use crate::scene::Scene;
use crate::video::MediaToolkit;
use std::path::PathBuf;
use tracing::info;

/// 为每个场景生成音效并截到场景时长。单个场景失败记为 `None`，不影响其他场景
pub async fn generate_sound_effects(
    synthesizer: &dyn AudioSynthesizer,
    toolkit: &dyn MediaToolkit,
    run: &PipelineRun,
    scenes: &[Scene],
) -> Vec<Option<PathBuf>> {
    let mut files = Vec::with_capacity(scenes.len());

    for scene in scenes {
        info!("Generating sound effect for scene {}", scene.scene_number);

        let result = async {
            let dir = run.ensure_scene_dir(scene.scene_number).await?;
            let raw = dir.join("sound_effect_raw.mp3");
            synthesizer
                .synthesize_sound_effect(&scene.sound_effects_prompt, scene.scene_duration, &raw)
                .await?;

            let trimmed = run.sound_effect_path(scene.scene_number);
            toolkit
                .trim_audio(&raw, f64::from(scene.scene_duration), &trimmed)
                .await?;
            Ok::<_, crate::error::VideoError>(trimmed)
        }
        .await;

        match result {
            Ok(path) => {
                info!("Sound effect saved to: {}", path.display());
                files.push(Some(path));
            }
            Err(e) => {
                run.record_failure("sound_effect", Some(scene.scene_number), e.to_string());
                files.push(None);
            }
        }
    }

    files
}
