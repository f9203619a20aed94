use super::is_non_empty_file;
use crate::continuity::ContinuityToken;
use crate::engine::{JobId, RenderEngine, RenderRequest, RenderStatus};
use crate::error::{Result, VideoError};
use crate::run::PipelineRun;
use crate::scene::Scene;
use crate::segment::Segment;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 渲染完成并已落盘的片段视频
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub scene: u32,
    pub segment: usize,
}

/// 每个片段驱动一次外部渲染调用：提交、轮询直到终态、下载、校验
pub struct SceneRenderer {
    engine: Arc<dyn RenderEngine>,
    poll_interval: Duration,
}

impl SceneRenderer {
    pub fn new(engine: Arc<dyn RenderEngine>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    pub fn engine(&self) -> &dyn RenderEngine {
        self.engine.as_ref()
    }

    /// 渲染一个片段。`start_frame` 按值传入，渲染调用结束即被消费。
    ///
    /// 服务端失败（显式失败状态或缺少输出）返回 `RenderError`，这里不做重试。
    pub async fn render_segment(
        &self,
        run: &PipelineRun,
        scene: &Scene,
        segment: Segment,
        start_frame: Option<ContinuityToken>,
    ) -> Result<RenderedVideo> {
        let render_error = |reason: String| VideoError::Render {
            scene: scene.scene_number,
            segment: segment.index,
            reason,
        };

        info!(
            "Rendering scene {} segment {} ({}s, start frame: {})",
            scene.scene_number,
            segment.index,
            segment.duration_secs,
            start_frame.as_ref().map(ContinuityToken::url).unwrap_or("none")
        );

        let request = RenderRequest {
            prompt: scene.video_prompt(),
            duration_secs: segment.duration_secs,
            start_frame,
        };

        let job = self
            .engine
            .submit(&request)
            .await
            .map_err(|e| render_error(e.to_string()))?;
        let video_url = self.wait_for_completion(&job).await.map_err(render_error)?;

        run.ensure_scene_dir(scene.scene_number).await?;
        let dest = run.segment_video_path(scene.scene_number, segment.index);
        self.engine
            .download(&video_url, &dest)
            .await
            .map_err(|e| render_error(e.to_string()))?;

        if !is_non_empty_file(&dest).await {
            return Err(render_error(format!(
                "downloaded video {} is missing or empty",
                dest.display()
            )));
        }

        info!("Segment saved to: {}", dest.display());
        Ok(RenderedVideo {
            path: dest,
            scene: scene.scene_number,
            segment: segment.index,
        })
    }

    /// 以固定间隔轮询直到终态，不设总超时。网络或解析错误按仍在处理中对待
    async fn wait_for_completion(&self, job: &JobId) -> std::result::Result<String, String> {
        let mut polls = 0u32;
        loop {
            match self.engine.poll(job).await {
                Ok(RenderStatus::Completed { video_url }) => return Ok(video_url),
                Ok(RenderStatus::Failed { reason }) => return Err(reason),
                Ok(RenderStatus::Pending) => {
                    polls += 1;
                    info!("Dreaming... job {} (poll {})", job.id, polls);
                }
                Err(e) if e.is_transient() => {
                    polls += 1;
                    warn!("Polling job {} failed, will retry (poll {}): {}", job.id, polls, e);
                }
                Err(e) => return Err(e.to_string()),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
