use super::ensure_success;
use crate::audio::NarrationWriter;
use crate::error::{Result, VideoError};
use crate::planner::{parse_scenes, PlanRequest, ScenePlanner};
use crate::scene::Scene;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const QWEN_TEXT_API: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
const QWEN_MODEL: &str = "qwen-plus";

#[derive(Debug, Clone)]
pub struct QwenClient {
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TextGenerationResponse {
    output: TextOutput,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct TextOutput {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

impl QwenClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self { api_key, client }
    }

    /// 调用千问文本生成，返回第一条回复
    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let request_body = json!({
            "model": QWEN_MODEL,
            "input": {
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt }
                ]
            },
            "parameters": {
                "result_format": "message",
                "temperature": 0.7,
                "top_p": 0.8
            }
        });

        let response = self
            .client
            .post(QWEN_TEXT_API)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;
        let response = ensure_success(response, "Qwen API").await?;

        let body: TextGenerationResponse = response.json().await?;
        if let Some(tokens) = body.usage.and_then(|u| u.total_tokens) {
            info!("Qwen used {} tokens", tokens);
        }

        body.output
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VideoError::Api("Failed to extract generated text".to_string()))
    }
}

fn environment_instructions(request: &PlanRequest) -> String {
    if let Some(environments) = &request.custom_environments {
        let list = environments
            .iter()
            .enumerate()
            .map(|(i, env)| format!("{}. {}", i + 1, env))
            .collect::<Vec<_>>()
            .join("\n");
        return format!(
            "Choose scene_physical_environment for every scene from exactly these environments:\n{}",
            list
        );
    }

    let base = request.custom_env_prompt.clone().unwrap_or_else(|| {
        "Describe each physical environment in detail: setting, lighting, weather and \
         atmosphere, time of day, key objects."
            .to_string()
    });
    format!(
        "{}\nUse at most {} distinct physical environments and reuse the same environment \
         across consecutive scenes where the story allows, to keep visual continuity.",
        base, request.max_environments
    )
}

/// 构造分镜规划提示词
pub fn scene_prompt(request: &PlanRequest) -> String {
    format!(
        r#"Break the movie script below into at most {max_scenes} scenes for video generation.

For every scene provide:
- scene_number: integer, starting at 1 and increasing by one
- scene_name: a short descriptive name
- scene_physical_environment: detailed physical environment
- scene_movement_description: character movements and actions; describe characters' appearance (ethnicity, gender, age, clothing, style) consistently across scenes
- scene_emotions: mood, atmosphere and visual emotional cues
- scene_camera_movement: shot type, angle and smooth movement, or "static"
- scene_duration: seconds, one of {menu:?}
- sound_effects_prompt: environmental, action and ambient sounds
- previous_scene_movement_description, previous_scene_emotions, previous_scene_camera_movement: copied from the previous scene, "none" for the first scene

{environments}

Script:
{script}

Return only a JSON array of scene objects, no other text."#,
        max_scenes = request.max_scenes,
        menu = request.duration_menu,
        environments = environment_instructions(request),
        script = request.script,
    )
}

/// 构造旁白文案提示词，按每秒约两个词控制长度
pub fn narration_prompt(scenes: &[Scene], total_duration_secs: u32) -> String {
    let descriptions = scenes
        .iter()
        .map(|s| {
            format!(
                "{}:\nEnvironment: {}\nAction: {}\nEmotional Atmosphere: {}\nCamera Movement: {}",
                s.scene_name,
                s.scene_physical_environment,
                s.scene_movement_description,
                s.scene_emotions,
                s.scene_camera_movement
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"{descriptions}

Create a narration script for the scenes above. The narration should:
1. Take approximately {total} seconds when read at a normal pace ({words} words)
2. Enhance the visual elements with context and atmosphere
3. Be written in present tense with clear, engaging language suitable for voice-over
4. Flow smoothly between scenes while maintaining continuity

Return the narration text only, without any formatting or additional notes."#,
        descriptions = descriptions,
        total = total_duration_secs,
        words = total_duration_secs * 2,
    )
}

#[async_trait]
impl ScenePlanner for QwenClient {
    async fn plan_scenes(&self, request: &PlanRequest) -> Result<Vec<Scene>> {
        info!("Generating scenes from script using Qwen...");

        let text = self
            .chat(
                "You are an expert at creating detailed scene descriptions for video generation.",
                &scene_prompt(request),
            )
            .await
            .map_err(|e| VideoError::Planning(e.to_string()))?;

        let scenes = parse_scenes(&text, request.max_scenes)?;
        info!("Successfully generated {} scenes", scenes.len());
        Ok(scenes)
    }
}

#[async_trait]
impl NarrationWriter for QwenClient {
    async fn write_narration(&self, scenes: &[Scene], total_duration_secs: u32) -> Result<String> {
        self.chat(
            "You are an expert at writing engaging narration scripts.",
            &narration_prompt(scenes, total_duration_secs),
        )
        .await
    }
}
