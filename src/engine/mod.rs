use crate::continuity::ContinuityToken;
use crate::error::Result;
use crate::segment::{plan_segments, Segment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 可选的视频渲染引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Luma Dream Machine (ray-2)
    Luma,
    /// fal.ai LTX-Video
    Ltx,
}

impl EngineKind {
    /// 该引擎允许的场景时长菜单（秒）
    pub fn allowed_durations(self) -> &'static [u32] {
        match self {
            EngineKind::Luma => &[5, 9, 14, 18],
            EngineKind::Ltx => &[5, 10],
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Luma => write!(f, "luma"),
            EngineKind::Ltx => write!(f, "ltx"),
        }
    }
}

/// 单个片段的渲染请求。起始帧令牌按值移入，渲染结束后即被丢弃
#[derive(Debug)]
pub struct RenderRequest {
    pub prompt: String,
    pub duration_secs: u32,
    pub start_frame: Option<ContinuityToken>,
}

impl RenderRequest {
    pub fn start_frame_url(&self) -> Option<&str> {
        self.start_frame.as_ref().map(ContinuityToken::url)
    }
}

/// 外部渲染任务的句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId {
    pub id: String,
    pub status_url: Option<String>,
    pub result_url: Option<String>,
}

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_url: None,
            result_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    Pending,
    Completed { video_url: String },
    Failed { reason: String },
}

/// 渲染引擎能力接口：时长拆分 + 提交/轮询/下载
#[async_trait]
pub trait RenderEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn plan(&self, duration: u32) -> Result<Vec<Segment>> {
        plan_segments(self.kind(), duration)
    }

    async fn submit(&self, request: &RenderRequest) -> Result<JobId>;

    async fn poll(&self, job: &JobId) -> Result<RenderStatus>;

    async fn download(&self, video_url: &str, dest: &Path) -> Result<()>;
}

/// 文生图服务，用于根据提示词生成首个场景的起始帧
#[async_trait]
pub trait StillImageService: Send + Sync {
    /// 生成图片并保存到 `dest`，返回可公开访问的 URL
    async fn generate_still(&self, prompt: &str, dest: &Path) -> Result<String>;
}
