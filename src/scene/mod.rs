use crate::error::{Result, VideoError};
use serde::{Deserialize, Serialize};

/// 表示一个场景（叙事中的一个节拍）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// 场景序号，从 1 开始连续
    pub scene_number: u32,
    pub scene_name: String,
    /// 物理环境描述
    pub scene_physical_environment: String,
    /// 人物动作描述
    pub scene_movement_description: String,
    /// 情绪氛围
    pub scene_emotions: String,
    /// 镜头运动
    pub scene_camera_movement: String,
    /// 该场景的时长（秒），取值必须在引擎允许的时长菜单内
    pub scene_duration: u32,
    /// 音效提示词
    pub sound_effects_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_scene_movement_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_scene_emotions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_scene_camera_movement: Option<String>,
}

impl Scene {
    pub fn new(scene_number: u32, scene_name: impl Into<String>, scene_duration: u32) -> Self {
        Self {
            scene_number,
            scene_name: scene_name.into(),
            scene_physical_environment: String::new(),
            scene_movement_description: String::new(),
            scene_emotions: String::new(),
            scene_camera_movement: String::new(),
            scene_duration,
            sound_effects_prompt: String::new(),
            previous_scene_movement_description: None,
            previous_scene_emotions: None,
            previous_scene_camera_movement: None,
        }
    }

    /// 组合发送给视频引擎的提示词。有上一场景信息时附加承接段落
    pub fn video_prompt(&self) -> String {
        let mut prompt = format!(
            "{}\n\nMovement and Action:\n{}\n\nEmotional Atmosphere:\n{}\n\nCamera Instructions:\n{}",
            self.scene_physical_environment.trim(),
            self.scene_movement_description.trim(),
            self.scene_emotions.trim(),
            self.scene_camera_movement.trim(),
        );

        let previous = [
            ("Movement", &self.previous_scene_movement_description),
            ("Emotions", &self.previous_scene_emotions),
            ("Camera", &self.previous_scene_camera_movement),
        ];
        let lines: Vec<String> = previous
            .iter()
            .filter_map(|(label, value)| {
                let value = value.as_deref()?.trim();
                // 模型对第一个场景返回 "none"
                (!value.is_empty() && !value.eq_ignore_ascii_case("none"))
                    .then(|| format!("{}: {}", label, value))
            })
            .collect();
        if !lines.is_empty() {
            prompt.push_str("\n\nContinuing From Previous Scene:\n");
            prompt.push_str(&lines.join("\n"));
        }

        prompt
    }
}

/// 校验分镜计划：序号从 1 连续递增，时长在引擎菜单内
pub fn validate_plan(scenes: &[Scene], allowed_durations: &[u32]) -> Result<()> {
    if scenes.is_empty() {
        return Err(VideoError::InvalidPlan("scene plan is empty".to_string()));
    }

    for (idx, scene) in scenes.iter().enumerate() {
        let expected = idx as u32 + 1;
        if scene.scene_number != expected {
            return Err(VideoError::InvalidPlan(format!(
                "expected scene number {}, found {}",
                expected, scene.scene_number
            )));
        }
        if !allowed_durations.contains(&scene.scene_duration) {
            return Err(VideoError::InvalidPlan(format!(
                "scene {} has duration {}s, allowed: {:?}",
                scene.scene_number, scene.scene_duration, allowed_durations
            )));
        }
    }

    Ok(())
}

/// 所有场景的总时长（秒）
pub fn total_duration(scenes: &[Scene]) -> u32 {
    scenes.iter().map(|s| s.scene_duration).sum()
}
