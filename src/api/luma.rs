use super::{download_to, ensure_success};
use crate::engine::{EngineKind, JobId, RenderEngine, RenderRequest, RenderStatus, StillImageService};
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const LUMA_API: &str = "https://api.lumalabs.ai/dream-machine/v1/generations";
const LUMA_VIDEO_MODEL: &str = "ray-2";
const LUMA_RESOLUTION: &str = "540p";

#[derive(Debug, Clone)]
pub struct LumaEngine {
    api_key: String,
    client: Client,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct Generation {
    id: String,
    state: String,
    failure_reason: Option<String>,
    assets: Option<GenerationAssets>,
}

#[derive(Debug, Deserialize)]
struct GenerationAssets {
    video: Option<String>,
    image: Option<String>,
}

impl LumaEngine {
    pub fn new(api_key: String, client: Client, poll_interval: Duration) -> Self {
        Self {
            api_key,
            client,
            poll_interval,
        }
    }

    async fn create(&self, url: &str, body: serde_json::Value) -> Result<Generation> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, "Luma generation").await?;
        Ok(response.json().await?)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Generation>> {
        let response = self
            .client
            .get(format!("{}/{}", LUMA_API, id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // 查询失败视为仍在处理中，下一轮继续轮询
            let error_text = response.text().await?;
            warn!("Failed to get generation {} (HTTP {}): {}", id, status, error_text);
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }
}

/// 构造 Luma 视频生成请求体，起始帧放在 `keyframes.frame0`
fn video_request_body(request: &RenderRequest) -> serde_json::Value {
    let mut body = json!({
        "prompt": request.prompt,
        "model": LUMA_VIDEO_MODEL,
        "resolution": LUMA_RESOLUTION,
        "duration": format!("{}s", request.duration_secs),
    });

    if let Some(url) = request.start_frame_url() {
        body["keyframes"] = json!({
            "frame0": { "type": "image", "url": url }
        });
    }

    body
}

fn status_of(generation: Generation) -> RenderStatus {
    match generation.state.as_str() {
        "completed" => match generation.assets.and_then(|a| a.video) {
            Some(video_url) => RenderStatus::Completed { video_url },
            None => RenderStatus::Failed {
                reason: "generation completed without a video asset".to_string(),
            },
        },
        "failed" => RenderStatus::Failed {
            reason: generation
                .failure_reason
                .unwrap_or_else(|| "unknown failure".to_string()),
        },
        _ => RenderStatus::Pending,
    }
}

#[async_trait]
impl RenderEngine for LumaEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Luma
    }

    async fn submit(&self, request: &RenderRequest) -> Result<JobId> {
        let generation = self.create(LUMA_API, video_request_body(request)).await?;
        info!(
            "Luma generation submitted: {} ({}s, keyframe: {})",
            generation.id,
            request.duration_secs,
            request.start_frame.is_some()
        );
        Ok(JobId::new(generation.id))
    }

    async fn poll(&self, job: &JobId) -> Result<RenderStatus> {
        match self.fetch(&job.id).await? {
            Some(generation) => Ok(status_of(generation)),
            None => Ok(RenderStatus::Pending),
        }
    }

    async fn download(&self, video_url: &str, dest: &Path) -> Result<()> {
        download_to(&self.client, video_url, dest).await
    }
}

#[async_trait]
impl StillImageService for LumaEngine {
    async fn generate_still(&self, prompt: &str, dest: &Path) -> Result<String> {
        info!("Generating initial image for prompt: {}", prompt);

        let generation = self
            .create(&format!("{}/image", LUMA_API), json!({ "prompt": prompt }))
            .await?;

        let image_url = loop {
            tokio::time::sleep(self.poll_interval).await;
            let current = match self.fetch(&generation.id).await {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(e) if e.is_transient() => {
                    warn!("Polling image generation {} failed, will retry: {}", generation.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match current.state.as_str() {
                "completed" => {
                    break current.assets.and_then(|a| a.image).ok_or_else(|| {
                        VideoError::Api("No image URL in generation response".to_string())
                    })?;
                }
                "failed" => {
                    return Err(VideoError::Api(format!(
                        "Image generation failed: {}",
                        current.failure_reason.unwrap_or_default()
                    )));
                }
                state => info!("Image generation {} state: {}", generation.id, state),
            }
        };

        download_to(&self.client, &image_url, dest).await?;
        info!("Initial image saved to: {}", dest.display());
        Ok(image_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::ContinuityToken;

    #[test]
    fn keyframe_is_set_only_with_start_frame() {
        let text_only = RenderRequest {
            prompt: "a lighthouse".into(),
            duration_secs: 9,
            start_frame: None,
        };
        let body = video_request_body(&text_only);
        assert_eq!(body["duration"], "9s");
        assert_eq!(body["model"], "ray-2");
        assert_eq!(body["resolution"], "540p");
        assert!(body.get("keyframes").is_none());

        let seeded = RenderRequest {
            start_frame: Some(ContinuityToken::new("https://cdn/frame.jpg")),
            ..text_only
        };
        let body = video_request_body(&seeded);
        assert_eq!(body["keyframes"]["frame0"]["url"], "https://cdn/frame.jpg");
        assert_eq!(body["keyframes"]["frame0"]["type"], "image");
    }

    #[test]
    fn generation_states_map_to_render_status() {
        let completed: Generation = serde_json::from_value(json!({
            "id": "g1",
            "state": "completed",
            "assets": { "video": "https://cdn/v.mp4" }
        }))
        .unwrap();
        assert_eq!(
            status_of(completed),
            RenderStatus::Completed {
                video_url: "https://cdn/v.mp4".into()
            }
        );

        let failed: Generation = serde_json::from_value(json!({
            "id": "g2",
            "state": "failed",
            "failure_reason": "moderation"
        }))
        .unwrap();
        assert_eq!(
            status_of(failed),
            RenderStatus::Failed {
                reason: "moderation".into()
            }
        );

        let dreaming: Generation =
            serde_json::from_value(json!({ "id": "g3", "state": "dreaming" })).unwrap();
        assert_eq!(status_of(dreaming), RenderStatus::Pending);
    }
}
