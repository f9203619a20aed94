use crate::error::{Result, VideoError};
use crate::scene::Scene;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 分镜规划的约束条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub script: String,
    pub max_scenes: usize,
    pub max_environments: usize,
    /// 引擎允许的场景时长（秒）
    pub duration_menu: Vec<u32>,
    pub custom_env_prompt: Option<String>,
    /// 预先给定的物理环境描述，提供时不再让模型生成环境
    pub custom_environments: Option<Vec<String>>,
}

/// 分镜规划服务：把剧本拆成按序编号的场景
#[async_trait]
pub trait ScenePlanner: Send + Sync {
    async fn plan_scenes(&self, request: &PlanRequest) -> Result<Vec<Scene>>;
}

/// 去掉模型输出中可能存在的 markdown 代码块标记
pub fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// 解析模型返回的场景 JSON：接受裸数组或 `{"scenes": [...]}`，超出上限的场景被截掉
pub fn parse_scenes(text: &str, max_scenes: usize) -> Result<Vec<Scene>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        List(Vec<Scene>),
        Wrapped { scenes: Vec<Scene> },
    }

    let payload: Payload = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| VideoError::Planning(format!("Failed to parse scenes JSON: {}", e)))?;
    let mut scenes = match payload {
        Payload::List(scenes) | Payload::Wrapped { scenes } => scenes,
    };

    if scenes.is_empty() {
        return Err(VideoError::Planning("model returned no scenes".to_string()));
    }
    if scenes.len() > max_scenes {
        warn!(
            "Model returned {} scenes, keeping the first {}",
            scenes.len(),
            max_scenes
        );
        scenes.truncate(max_scenes);
    }

    Ok(scenes)
}
