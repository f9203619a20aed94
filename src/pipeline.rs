//! 端到端流水线：分镜规划 → 逐场景逐片段渲染并传递关键帧 → 拼接场景
//! →（并行）合成音效与旁白 → 合成最终视频。

use crate::audio::{AudioJob, AudioSynthesizer, AudioTracks, NarrationWriter};
use crate::config::{Config, MixLevels, RetryPolicy, DEFAULT_MAX_ENVIRONMENTS, DEFAULT_MAX_SCENES};
use crate::continuity::{ContinuityTracker, TokenScope, TransferStats};
use crate::engine::{RenderEngine, StillImageService};
use crate::error::{Result, VideoError};
use crate::planner::{PlanRequest, ScenePlanner};
use crate::run::{CancelFlag, PipelineRun, RunFailure};
use crate::scene::{validate_plan, Scene};
use crate::upload::AssetUploader;
use crate::video::{extract_last_frame, FinalAssembler, MediaToolkit, SceneRenderer, SceneStitcher, SceneVideo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 第一个场景第一个片段的起始帧来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialFrame {
    ImagePath(PathBuf),
    ImagePrompt(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// 只生成分镜元数据，不渲染视频
    pub metadata_only: bool,
    pub max_scenes: usize,
    pub max_environments: usize,
    pub custom_env_prompt: Option<String>,
    pub custom_environments: Option<Vec<String>>,
    pub skip_narration: bool,
    pub skip_sound_effects: bool,
    pub initial_image_path: Option<PathBuf>,
    pub initial_image_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            metadata_only: false,
            max_scenes: DEFAULT_MAX_SCENES,
            max_environments: DEFAULT_MAX_ENVIRONMENTS,
            custom_env_prompt: None,
            custom_environments: None,
            skip_narration: false,
            skip_sound_effects: false,
            initial_image_path: None,
            initial_image_prompt: None,
        }
    }
}

impl GenerationOptions {
    pub fn initial_frame(&self) -> Result<Option<InitialFrame>> {
        match (&self.initial_image_path, &self.initial_image_prompt) {
            (Some(_), Some(_)) => Err(VideoError::Planning(
                "Cannot provide both initial_image_path and initial_image_prompt".to_string(),
            )),
            (Some(path), None) => Ok(Some(InitialFrame::ImagePath(path.clone()))),
            (None, Some(prompt)) => Ok(Some(InitialFrame::ImagePrompt(prompt.clone()))),
            (None, None) => Ok(None),
        }
    }
}

/// 流水线依赖的外部协作者
#[derive(Clone)]
pub struct Services {
    pub planner: Arc<dyn ScenePlanner>,
    pub narration_writer: Arc<dyn NarrationWriter>,
    pub engine: Arc<dyn RenderEngine>,
    pub uploader: Arc<dyn AssetUploader>,
    pub audio: Arc<dyn AudioSynthesizer>,
    pub stills: Option<Arc<dyn StillImageService>>,
    pub toolkit: Arc<dyn MediaToolkit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub output_root: PathBuf,
    pub poll_interval: Duration,
    pub upload_retry: RetryPolicy,
    pub narration_mix: MixLevels,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            output_root: config.output_root.clone(),
            poll_interval: config.poll_interval,
            upload_retry: config.upload_retry,
            narration_mix: config.narration_mix,
        }
    }
}

/// 渲染链的产物：按场景顺序排列的场景视频及令牌传递统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChain {
    pub scene_videos: Vec<SceneVideo>,
    pub continuity: TransferStats,
}

/// 一次成功运行的结果。`final_video` 只在真正合成了视频时才有值
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub scenes: Vec<Scene>,
    pub metadata_json: String,
    pub final_video: Option<PathBuf>,
    pub continuity: TransferStats,
    pub degraded: Vec<RunFailure>,
}

pub struct Pipeline {
    services: Services,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(services: Services, settings: PipelineSettings) -> Self {
        Self { services, settings }
    }

    pub async fn generate(
        &self,
        script: &str,
        options: &GenerationOptions,
        cancel: CancelFlag,
    ) -> Result<GenerationOutcome> {
        let initial = options.initial_frame()?;
        if matches!(initial, Some(InitialFrame::ImagePrompt(_))) && self.services.stills.is_none() {
            return Err(VideoError::Env(
                "An image generation service is required for initial_image_prompt".to_string(),
            ));
        }

        let run = PipelineRun::create(&self.settings.output_root, self.services.engine.kind(), cancel).await?;

        info!("Step 1/4: Planning scenes...");
        let scenes = self.plan(&run, script, options).await?;
        let metadata_json = serde_json::to_string_pretty(&scenes)?;
        tokio::fs::write(run.metadata_path(), &metadata_json).await?;
        info!("Planned {} scenes", scenes.len());

        if options.metadata_only {
            return Ok(GenerationOutcome {
                run_id: run.id().to_string(),
                run_dir: run.root().to_path_buf(),
                scenes,
                metadata_json,
                final_video: None,
                continuity: TransferStats::default(),
                degraded: run.failures(),
            });
        }

        let initial_url = self.prepare_initial_frame(&run, initial).await?;

        info!("Step 2/4: Synthesizing audio in the background...");
        let audio = if options.skip_narration && options.skip_sound_effects {
            None
        } else {
            let job = AudioJob {
                synthesizer: self.services.audio.clone(),
                writer: self.services.narration_writer.clone(),
                toolkit: self.services.toolkit.clone(),
                run: run.clone(),
                scenes: scenes.clone(),
                skip_sound_effects: options.skip_sound_effects,
                skip_narration: options.skip_narration,
            };
            Some(tokio::spawn(job.synthesize()))
        };

        info!("Step 3/4: Rendering scenes...");
        let chain = match self.render_chain(&run, &scenes, initial_url).await {
            Ok(chain) => chain,
            Err(e) => {
                if let Some(handle) = audio {
                    handle.abort();
                }
                return Err(e);
            }
        };

        let tracks = match audio {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                run.record_failure("audio", None, format!("audio task failed: {}", e));
                AudioTracks::default()
            }),
            None => AudioTracks::default(),
        };

        info!("Step 4/4: Assembling final video...");
        let assembler = FinalAssembler::new(self.services.toolkit.clone(), self.settings.narration_mix);
        let final_video = assembler
            .assemble(
                &run,
                &chain.scene_videos,
                &tracks.sound_effects,
                tracks.narration.as_deref(),
            )
            .await?;

        Ok(GenerationOutcome {
            run_id: run.id().to_string(),
            run_dir: run.root().to_path_buf(),
            scenes,
            metadata_json,
            final_video: Some(final_video),
            continuity: chain.continuity,
            degraded: run.failures(),
        })
    }

    async fn plan(&self, run: &PipelineRun, script: &str, options: &GenerationOptions) -> Result<Vec<Scene>> {
        let request = PlanRequest {
            script: script.to_string(),
            max_scenes: options.max_scenes,
            max_environments: options.max_environments,
            duration_menu: run.engine().allowed_durations().to_vec(),
            custom_env_prompt: options.custom_env_prompt.clone(),
            custom_environments: options.custom_environments.clone(),
        };

        let scenes = self.services.planner.plan_scenes(&request).await?;
        validate_plan(&scenes, run.engine().allowed_durations())?;
        Ok(scenes)
    }

    async fn prepare_initial_frame(
        &self,
        run: &PipelineRun,
        initial: Option<InitialFrame>,
    ) -> Result<Option<String>> {
        match initial {
            None => Ok(None),
            Some(InitialFrame::ImagePath(path)) => {
                if !path.is_file() {
                    run.record_failure(
                        "initial_frame",
                        None,
                        format!("initial image {} not found, starting from text", path.display()),
                    );
                    return Ok(None);
                }

                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
                let dest = run.root().join(format!("initial_frame.{}", ext));
                tokio::fs::copy(&path, &dest).await?;
                let url = self.services.uploader.upload(&dest).await?;
                info!("Initial frame uploaded: {}", url);
                Ok(Some(url))
            }
            Some(InitialFrame::ImagePrompt(prompt)) => {
                let Some(stills) = &self.services.stills else {
                    return Ok(None);
                };
                match stills
                    .generate_still(&prompt, &run.root().join("initial_frame.jpg"))
                    .await
                {
                    Ok(url) => Ok(Some(url)),
                    Err(e) => {
                        run.record_failure(
                            "initial_frame",
                            None,
                            format!("failed to generate initial image: {}", e),
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// 按顺序渲染所有场景。场景之间严格串行，每个片段完成后抽取最后一帧上传，
    /// 作为下一个片段或下一个场景的起始帧。任何渲染、解码、上传、拼接错误都会终止整条链。
    pub async fn render_chain(
        &self,
        run: &PipelineRun,
        scenes: &[Scene],
        initial_frame_url: Option<String>,
    ) -> Result<RenderedChain> {
        let renderer = SceneRenderer::new(self.services.engine.clone(), self.settings.poll_interval);
        let stitcher = SceneStitcher::new(self.services.toolkit.clone());
        let mut tracker = ContinuityTracker::new(self.services.uploader.clone(), self.settings.upload_retry);
        if let Some(url) = initial_frame_url {
            tracker.seed_initial(url);
        }

        let mut scene_videos = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let number = scene.scene_number;
            let segments = renderer.engine().plan(scene.scene_duration)?;
            info!(
                "Generating {} segment(s) for scene {} ({}s)",
                segments.len(),
                number,
                scene.scene_duration
            );

            let mut segment_paths = Vec::with_capacity(segments.len());
            for segment in &segments {
                let start_frame = tracker.take_start_frame(segment.index == 1);
                let video = renderer.render_segment(run, scene, *segment, start_frame).await?;

                let frame = extract_last_frame(
                    self.services.toolkit.as_ref(),
                    &video.path,
                    &run.segment_frame_path(number, segment.index),
                )
                .await?;

                let scope = if segment.index == segments.len() {
                    TokenScope::CrossScene
                } else {
                    TokenScope::WithinScene
                };
                tracker.publish(&frame, scope).await?;
                segment_paths.push(video.path);
            }

            let path = stitcher
                .stitch(number, &segment_paths, &run.scene_video_path(number))
                .await?;
            scene_videos.push(SceneVideo { scene: number, path });

            if run.is_cancelled() {
                warn!("Cancellation requested, stopping after scene {}", number);
                return Err(VideoError::Cancelled {
                    completed_scenes: scene_videos.len(),
                });
            }
        }

        tracker.finish();
        Ok(RenderedChain {
            scene_videos,
            continuity: tracker.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineKind, JobId, RenderRequest, RenderStatus};
    use crate::upload::testing::ScriptedUploader;
    use crate::video::testing::FakeToolkit;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// 记录每次提交的起始帧，立即完成
    #[derive(Default)]
    struct RecordingEngine {
        submissions: Mutex<Vec<(u32, Option<String>)>>,
        cancel_on_submit: Option<CancelFlag>,
    }

    impl RecordingEngine {
        fn submissions(&self) -> Vec<(u32, Option<String>)> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenderEngine for RecordingEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Luma
        }

        async fn submit(&self, request: &RenderRequest) -> Result<JobId> {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push((
                request.duration_secs,
                request.start_frame_url().map(str::to_string),
            ));
            if let Some(cancel) = &self.cancel_on_submit {
                cancel.cancel();
            }
            Ok(JobId::new(format!("job-{}", submissions.len())))
        }

        async fn poll(&self, job: &JobId) -> Result<RenderStatus> {
            Ok(RenderStatus::Completed {
                video_url: format!("https://cdn.test/{}.mp4", job.id),
            })
        }

        async fn download(&self, video_url: &str, dest: &Path) -> Result<()> {
            tokio::fs::write(dest, video_url).await?;
            Ok(())
        }
    }

    struct FixedPlanner(Vec<Scene>);

    #[async_trait]
    impl ScenePlanner for FixedPlanner {
        async fn plan_scenes(&self, _request: &PlanRequest) -> Result<Vec<Scene>> {
            Ok(self.0.clone())
        }
    }

    struct EchoAudio;

    #[async_trait]
    impl AudioSynthesizer for EchoAudio {
        async fn synthesize_speech(&self, text: &str, dest: &Path) -> Result<PathBuf> {
            tokio::fs::write(dest, text).await?;
            Ok(dest.to_path_buf())
        }

        async fn synthesize_sound_effect(&self, text: &str, _duration: u32, dest: &Path) -> Result<PathBuf> {
            tokio::fs::write(dest, text).await?;
            Ok(dest.to_path_buf())
        }
    }

    #[async_trait]
    impl NarrationWriter for EchoAudio {
        async fn write_narration(&self, scenes: &[Scene], total: u32) -> Result<String> {
            Ok(format!("{} scenes, {} seconds", scenes.len(), total))
        }
    }

    struct FixedStill(&'static str);

    #[async_trait]
    impl StillImageService for FixedStill {
        async fn generate_still(&self, _prompt: &str, dest: &Path) -> Result<String> {
            tokio::fs::write(dest, b"jpg").await?;
            Ok(self.0.to_string())
        }
    }

    fn two_scenes() -> Vec<Scene> {
        let mut first = Scene::new(1, "Harbor at dawn", 5);
        first.sound_effects_prompt = "gulls and waves".into();
        let mut second = Scene::new(2, "Storm rolls in", 14);
        second.sound_effects_prompt = "thunder".into();
        vec![first, second]
    }

    struct Harness {
        engine: Arc<RecordingEngine>,
        toolkit: Arc<FakeToolkit>,
        uploader: Arc<ScriptedUploader>,
        pipeline: Pipeline,
        _tmp: tempfile::TempDir,
    }

    fn harness(scenes: Vec<Scene>, engine: RecordingEngine, urls: &[&str]) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine);
        let toolkit = Arc::new(FakeToolkit::default());
        let uploader = Arc::new(ScriptedUploader::new(urls));
        let services = Services {
            planner: Arc::new(FixedPlanner(scenes)),
            narration_writer: Arc::new(EchoAudio),
            engine: engine.clone(),
            uploader: uploader.clone(),
            audio: Arc::new(EchoAudio),
            stills: None,
            toolkit: toolkit.clone(),
        };
        let settings = PipelineSettings {
            output_root: tmp.path().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            upload_retry: RetryPolicy::default(),
            narration_mix: MixLevels::default(),
        };
        Harness {
            engine,
            toolkit,
            uploader,
            pipeline: Pipeline::new(services, settings),
            _tmp: tmp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn frames_chain_across_segments_and_scenes() {
        let h = harness(
            two_scenes(),
            RecordingEngine::default(),
            &["https://img.test/1.jpg", "https://img.test/2.jpg", "https://img.test/3.jpg"],
        );

        let outcome = h
            .pipeline
            .generate("a storm hits the harbor", &GenerationOptions::default(), CancelFlag::new())
            .await
            .unwrap();

        // 场景 1 一个片段，场景 2 拆成 5s + 9s
        assert_eq!(
            h.engine.submissions(),
            vec![
                (5, None),
                (5, Some("https://img.test/1.jpg".to_string())),
                (9, Some("https://img.test/2.jpg".to_string())),
            ]
        );
        assert_eq!(h.uploader.calls(), 3);

        assert_eq!(
            outcome.continuity,
            TransferStats {
                within_scene_published: 1,
                within_scene_consumed: 1,
                cross_scene_published: 2,
                cross_scene_consumed: 1,
                upload_attempts: 3,
            }
        );

        let final_video = outcome.final_video.unwrap();
        assert!(final_video.is_file());
        assert!(outcome.degraded.is_empty());

        // 场景 2 的两个片段先拼接，最终按场景顺序拼接
        let concat_calls = h.toolkit.concat_calls();
        assert_eq!(concat_calls[0].len(), 2);
        let last = concat_calls.last().unwrap();
        assert!(last[0].ends_with("assembly/scene_1_with_audio.mp4"));
        assert!(last[1].ends_with("assembly/scene_2_with_audio.mp4"));

        let metadata = tokio::fs::read_to_string(outcome.run_dir.join("scene_metadata.json"))
            .await
            .unwrap();
        let parsed: Vec<Scene> = serde_json::from_str(&metadata).unwrap();
        assert_eq!(parsed, two_scenes());
    }

    #[tokio::test]
    async fn metadata_only_skips_rendering() {
        let h = harness(two_scenes(), RecordingEngine::default(), &["https://img.test/1.jpg"]);
        let options = GenerationOptions {
            metadata_only: true,
            ..GenerationOptions::default()
        };

        let outcome = h
            .pipeline
            .generate("script", &options, CancelFlag::new())
            .await
            .unwrap();

        assert!(outcome.final_video.is_none());
        assert!(h.engine.submissions().is_empty());
        assert_eq!(outcome.scenes.len(), 2);
        assert!(outcome.run_dir.join("scene_metadata.json").is_file());
    }

    #[tokio::test]
    async fn invalid_duration_rejected_before_rendering() {
        let h = harness(
            vec![Scene::new(1, "Too long", 7)],
            RecordingEngine::default(),
            &["https://img.test/1.jpg"],
        );

        let err = h
            .pipeline
            .generate("script", &GenerationOptions::default(), CancelFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, VideoError::InvalidPlan(_)));
        assert!(h.engine.submissions().is_empty());
    }

    #[tokio::test]
    async fn both_initial_frame_sources_rejected() {
        let h = harness(two_scenes(), RecordingEngine::default(), &["https://img.test/1.jpg"]);
        let options = GenerationOptions {
            initial_image_path: Some(PathBuf::from("start.jpg")),
            initial_image_prompt: Some("a lighthouse".into()),
            ..GenerationOptions::default()
        };

        let err = h
            .pipeline
            .generate("script", &options, CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::Planning(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_at_scene_boundary() {
        let cancel = CancelFlag::new();
        let engine = RecordingEngine {
            cancel_on_submit: Some(cancel.clone()),
            ..RecordingEngine::default()
        };
        let h = harness(two_scenes(), engine, &["https://img.test/1.jpg"]);

        let err = h
            .pipeline
            .generate("script", &GenerationOptions::default(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, VideoError::Cancelled { completed_scenes: 1 }));
        assert_eq!(h.engine.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_upload_aborts_chain() {
        let h = harness(
            vec![Scene::new(1, "Long take", 14)],
            RecordingEngine::default(),
            &["https://img.test/same.jpg"],
        );

        let err = h
            .pipeline
            .generate("script", &GenerationOptions::default(), CancelFlag::new())
            .await
            .unwrap_err();

        // 片段 1 的帧没有可比较的旧 URL，直接被接受；片段 2 的帧始终重复
        assert!(matches!(err, VideoError::UploadStaleness { attempts: 3, .. }));
        assert_eq!(
            h.engine.submissions(),
            vec![(5, None), (9, Some("https://img.test/same.jpg".to_string()))]
        );
        assert_eq!(h.uploader.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn generated_initial_frame_seeds_first_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let services = Services {
            planner: Arc::new(FixedPlanner(vec![Scene::new(1, "Lighthouse", 5)])),
            narration_writer: Arc::new(EchoAudio),
            engine: engine.clone(),
            uploader: Arc::new(ScriptedUploader::new(&["https://img.test/1.jpg"])),
            audio: Arc::new(EchoAudio),
            stills: Some(Arc::new(FixedStill("https://img.test/initial.jpg"))),
            toolkit: Arc::new(FakeToolkit::default()),
        };
        let settings = PipelineSettings {
            output_root: tmp.path().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            upload_retry: RetryPolicy::default(),
            narration_mix: MixLevels::default(),
        };
        let options = GenerationOptions {
            initial_image_prompt: Some("a lighthouse at night".into()),
            skip_narration: true,
            skip_sound_effects: true,
            ..GenerationOptions::default()
        };

        let outcome = Pipeline::new(services, settings)
            .generate("script", &options, CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(
            engine.submissions(),
            vec![(5, Some("https://img.test/initial.jpg".to_string()))]
        );
        assert_eq!(outcome.continuity.cross_scene_consumed, 1);
    }

    #[test]
    fn initial_frame_resolution() {
        let options = GenerationOptions {
            initial_image_prompt: Some("dawn".into()),
            ..GenerationOptions::default()
        };
        assert_eq!(
            options.initial_frame().unwrap(),
            Some(InitialFrame::ImagePrompt("dawn".into()))
        );
        assert_eq!(GenerationOptions::default().initial_frame().unwrap(), None);
    }
}
