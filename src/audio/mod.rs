pub mod narration;
pub mod sound;

pub use narration::{generate_narration, NarrationWriter};
pub use sound::generate_sound_effects;

use crate::error::Result;
use crate::run::PipelineRun;
use crate::scene::Scene;
use crate::video::MediaToolkit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 语音与音效合成服务
#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    /// 文本转语音，写入 `dest` 并返回其路径
    async fn synthesize_speech(&self, text: &str, dest: &Path) -> Result<PathBuf>;

    /// 根据提示词生成指定时长的音效，写入 `dest` 并返回其路径
    async fn synthesize_sound_effect(
        &self,
        text: &str,
        duration_secs: u32,
        dest: &Path,
    ) -> Result<PathBuf>;
}

/// 与视频渲染链并行生成的音轨
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTracks {
    /// 与场景按位置对应，失败的场景为 `None`
    pub sound_effects: Vec<Option<PathBuf>>,
    pub narration: Option<PathBuf>,
}

/// 音频任务需要的全部协作者，按值移入后台任务
#[derive(Clone)]
pub struct AudioJob {
    pub synthesizer: Arc<dyn AudioSynthesizer>,
    pub writer: Arc<dyn NarrationWriter>,
    pub toolkit: Arc<dyn MediaToolkit>,
    pub run: PipelineRun,
    pub scenes: Vec<Scene>,
    pub skip_sound_effects: bool,
    pub skip_narration: bool,
}

impl AudioJob {
    /// 生成音效与旁白。音效失败按场景降级，旁白失败只关闭旁白功能
    pub async fn synthesize(self) -> AudioTracks {
        let sound_effects = if self.skip_sound_effects {
            vec![None; self.scenes.len()]
        } else {
            generate_sound_effects(
                self.synthesizer.as_ref(),
                self.toolkit.as_ref(),
                &self.run,
                &self.scenes,
            )
            .await
        };

        let narration = if self.skip_narration {
            None
        } else {
            match generate_narration(
                self.writer.as_ref(),
                self.synthesizer.as_ref(),
                self.toolkit.as_ref(),
                &self.run,
                &self.scenes,
            )
            .await
            {
                Ok(path) => Some(path),
                Err(e) => {
                    self.run
                        .record_failure("narration", None, format!("continuing without narration: {}", e));
                    None
                }
            }
        };

        info!(
            "Audio ready: {}/{} sound effects, narration: {}",
            sound_effects.iter().filter(|s| s.is_some()).count(),
            sound_effects.len(),
            narration.is_some()
        );

        AudioTracks {
            sound_effects,
            narration,
        }
    }
}
