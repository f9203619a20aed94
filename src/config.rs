use crate::error::{Result, VideoError};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_SCENES: usize = 5;
pub const DEFAULT_MAX_ENVIRONMENTS: usize = 3;
pub const DEFAULT_OUTPUT_ROOT: &str = "generated_videos";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// 上传重试策略：固定间隔，不做指数退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// 旁白混音时原声与旁白的相对音量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixLevels {
    pub original: f32,
    pub narration: f32,
}

impl Default for MixLevels {
    fn default() -> Self {
        Self {
            original: 0.7,
            narration: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dashscope_api_key: Option<String>,
    pub luma_api_key: Option<String>,
    pub fal_key: Option<String>,
    pub eleven_labs_api_key: Option<String>,
    /// 旁白使用的音色，未设置时使用默认音色
    pub eleven_labs_voice_id: Option<String>,
    pub imgur_client_id: Option<String>,
    pub output_root: PathBuf,
    pub poll_interval: Duration,
    pub upload_retry: RetryPolicy,
    pub narration_mix: MixLevels,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dashscope_api_key: None,
            luma_api_key: None,
            fal_key: None,
            eleven_labs_api_key: None,
            eleven_labs_voice_id: None,
            imgur_client_id: None,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            poll_interval: DEFAULT_POLL_INTERVAL,
            upload_retry: RetryPolicy::default(),
            narration_mix: MixLevels::default(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl Config {
    /// 从环境变量读取凭据（调用方负责先加载 .env）
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut config = Self {
            dashscope_api_key: var("DASHSCOPE_API_KEY"),
            luma_api_key: var("LUMAAI_API_KEY"),
            fal_key: var("FAL_KEY").or_else(|| var("FAL_API_KEY")),
            eleven_labs_api_key: var("ELEVEN_LABS_API_KEY"),
            eleven_labs_voice_id: var("ELEVEN_LABS_VOICE_ID"),
            imgur_client_id: var("IMGUR_CLIENT_ID"),
            ..Self::default()
        };

        if let Some(secs) = var("STORYREEL_POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            config.poll_interval = Duration::from_secs(secs);
        }

        config
    }

    /// 取出某项必需的凭据，缺失时返回 `VideoError::Env`
    pub fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| VideoError::Env(format!("{} not found", name)))
    }

    pub fn http_client(&self) -> Result<Client> {
        Ok(Client::builder().timeout(self.http_timeout).build()?)
    }
}
