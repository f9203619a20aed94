use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Scene planning error: {0}")]
    Planning(String),

    #[error("Invalid scene plan: {0}")]
    InvalidPlan(String),

    #[error("Unsupported scene duration {duration}s for engine {engine}")]
    UnsupportedDuration { engine: String, duration: u32 },

    #[error("Render error (scene {scene}, segment {segment}): {reason}")]
    Render {
        scene: u32,
        segment: usize,
        reason: String,
    },

    #[error("Upload returned a stale URL {attempts} times for {frame}")]
    UploadStaleness { frame: String, attempts: u32 },

    #[error("Failed to decode last frame of {video}: {reason}")]
    Decode { video: String, reason: String },

    #[error("Stitch error: {0}")]
    Stitch(String),

    #[error("Audio synthesis error: {0}")]
    Synthesis(String),

    #[error("No renderable content: every scene failed during assembly")]
    NoRenderableContent,

    #[error("Run cancelled after {completed_scenes} completed scene(s)")]
    Cancelled { completed_scenes: usize },

    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Environment variable error: {0}")]
    Env(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),
}

/// 错误分类，用于区分致命错误与可降级错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Planning,
    Render,
    UploadStaleness,
    Decode,
    Stitch,
    Synthesis,
    NoRenderableContent,
    Cancelled,
    Transport,
    Configuration,
}

impl ErrorKind {
    /// 音频合成失败只会降级输出，其余错误都会终止本次运行
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorKind::Synthesis)
    }
}

impl VideoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VideoError::Planning(_) | VideoError::InvalidPlan(_) => ErrorKind::Planning,
            VideoError::UnsupportedDuration { .. } | VideoError::Env(_) => ErrorKind::Configuration,
            VideoError::Render { .. } => ErrorKind::Render,
            VideoError::UploadStaleness { .. } => ErrorKind::UploadStaleness,
            VideoError::Decode { .. } => ErrorKind::Decode,
            VideoError::Stitch(_) => ErrorKind::Stitch,
            VideoError::Synthesis(_) => ErrorKind::Synthesis,
            VideoError::NoRenderableContent => ErrorKind::NoRenderableContent,
            VideoError::Cancelled { .. } => ErrorKind::Cancelled,
            VideoError::Api(_)
            | VideoError::Io(_)
            | VideoError::Http(_)
            | VideoError::Json(_)
            | VideoError::Ffmpeg(_) => ErrorKind::Transport,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// 网络中断或响应体无法解析，轮询时可以直接重试
    pub fn is_transient(&self) -> bool {
        matches!(self, VideoError::Http(_) | VideoError::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_errors_degrade() {
        let err = VideoError::Synthesis("sound effect for scene 2".to_string());
        assert_eq!(err.kind(), ErrorKind::Synthesis);
        assert!(!err.is_fatal());
    }

    #[test]
    fn chain_errors_halt_the_run() {
        let stale = VideoError::UploadStaleness {
            frame: "scene_1/segment_1_last_frame.jpg".to_string(),
            attempts: 3,
        };
        assert!(stale.is_fatal());
        assert!(VideoError::Stitch("missing".into()).is_fatal());
        assert!(VideoError::NoRenderableContent.is_fatal());
        assert_eq!(
            VideoError::InvalidPlan("gap".into()).kind(),
            ErrorKind::Planning
        );
    }

    #[test]
    fn decode_failures_are_transient() {
        let err = VideoError::from(serde_json::from_str::<u32>("{").unwrap_err());
        assert!(err.is_transient());
        assert!(!VideoError::Api("missing queue url".into()).is_transient());
    }
}
