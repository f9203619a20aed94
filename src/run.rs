use crate::engine::EngineKind;
use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 取消标记，由信号处理器设置，流水线只在场景边界检查
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 请求取消，返回此前是否已经请求过（用于识别第二次中断）
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }
}

/// 一次被降级处理的失败（音效缺失、旁白失败、装配时丢弃的场景等）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub stage: &'static str,
    pub scene: Option<u32>,
    pub message: String,
}

/// 一次端到端生成的上下文：运行标识、工作目录、渲染引擎、累计的失败记录
#[derive(Debug, Clone)]
pub struct PipelineRun {
    id: String,
    root: PathBuf,
    engine: EngineKind,
    cancel: CancelFlag,
    failures: Arc<Mutex<Vec<RunFailure>>>,
}

impl PipelineRun {
    /// 以当前时间戳创建运行目录 `<output_root>/video_<YYYYmmdd_HHMMSS>`。
    ///
    /// 同一秒内已有运行占用该目录时追加 `_2`、`_3` 等后缀，每次运行独占自己的目录。
    pub async fn create(output_root: &Path, engine: EngineKind, cancel: CancelFlag) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        tokio::fs::create_dir_all(output_root).await?;

        let mut id = stamp.clone();
        let mut suffix = 1u32;
        loop {
            let root = output_root.join(format!("video_{}", id));
            match tokio::fs::create_dir(&root).await {
                Ok(()) => return Ok(Self::at(id, root, engine, cancel)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    id = format!("{}_{}", stamp, suffix);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 使用调用方给定的运行标识，目录已存在时直接复用
    pub async fn create_with_id(
        output_root: &Path,
        id: impl Into<String>,
        engine: EngineKind,
        cancel: CancelFlag,
    ) -> Result<Self> {
        let id = id.into();
        let root = output_root.join(format!("video_{}", id));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self::at(id, root, engine, cancel))
    }

    fn at(id: String, root: PathBuf, engine: EngineKind, cancel: CancelFlag) -> Self {
        info!("Pipeline run {} using {} at {}", id, engine, root.display());
        Self {
            id,
            root,
            engine,
            cancel,
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn scene_dir(&self, scene: u32) -> PathBuf {
        self.root.join(format!("scene_{}", scene))
    }

    pub async fn ensure_scene_dir(&self, scene: u32) -> Result<PathBuf> {
        let dir = self.scene_dir(scene);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub fn segment_video_path(&self, scene: u32, segment: usize) -> PathBuf {
        self.scene_dir(scene).join(format!("segment_{}.mp4", segment))
    }

    pub fn segment_frame_path(&self, scene: u32, segment: usize) -> PathBuf {
        self.scene_dir(scene)
            .join(format!("segment_{}_last_frame.jpg", segment))
    }

    pub fn scene_video_path(&self, scene: u32) -> PathBuf {
        self.root.join(format!("scene_{}.mp4", scene))
    }

    pub fn sound_effect_path(&self, scene: u32) -> PathBuf {
        self.scene_dir(scene).join("sound_effect.mp3")
    }

    pub fn assembly_dir(&self) -> PathBuf {
        self.root.join("assembly")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("scene_metadata.json")
    }

    pub fn narration_text_path(&self) -> PathBuf {
        self.root.join("narration_text.txt")
    }

    pub fn narration_raw_path(&self) -> PathBuf {
        self.root.join("narration_raw.mp3")
    }

    pub fn narration_audio_path(&self) -> PathBuf {
        self.root.join("narration.mp3")
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.root.join(format!("final_video_{}.mp4", self.id))
    }

    pub fn record_failure(&self, stage: &'static str, scene: Option<u32>, message: impl Into<String>) {
        let failure = RunFailure {
            stage,
            scene,
            message: message.into(),
        };
        warn!(
            "Degraded [{}{}]: {}",
            failure.stage,
            failure
                .scene
                .map(|s| format!(" scene {}", s))
                .unwrap_or_default(),
            failure.message
        );
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(failure);
    }

    pub fn failures(&self) -> Vec<RunFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
