use super::{download_to, ensure_success};
use crate::engine::{EngineKind, JobId, RenderEngine, RenderRequest, RenderStatus};
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

const FAL_QUEUE_API: &str = "https://queue.fal.run";
const LTX_TEXT_TO_VIDEO: &str = "fal-ai/ltx-video";
const LTX_IMAGE_TO_VIDEO: &str = "fal-ai/ltx-video/image-to-video";

/// fal.ai 队列接口上的 LTX-Video 引擎
#[derive(Debug, Clone)]
pub struct LtxEngine {
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct QueueSubmission {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LtxResult {
    video: Option<LtxVideo>,
}

#[derive(Debug, Deserialize)]
struct LtxVideo {
    url: String,
}

impl LtxEngine {
    pub fn new(api_key: String, client: Client) -> Self {
        Self { api_key, client }
    }

    fn auth(&self) -> String {
        format!("Key {}", self.api_key)
    }

    async fn fetch_result(&self, result_url: &str) -> Result<RenderStatus> {
        let response = self
            .client
            .get(result_url)
            .header("Authorization", self.auth())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Ok(RenderStatus::Failed {
                reason: format!("HTTP {}: {}", status, error_text),
            });
        }

        let result: LtxResult = response.json().await?;
        Ok(match result.video {
            Some(video) => RenderStatus::Completed {
                video_url: video.url,
            },
            None => RenderStatus::Failed {
                reason: "No video URL found in the API response".to_string(),
            },
        })
    }
}

/// 有起始帧时走 image-to-video 端点，否则走纯文生视频
fn endpoint_and_body(request: &RenderRequest) -> (&'static str, serde_json::Value) {
    match request.start_frame_url() {
        Some(url) => (
            LTX_IMAGE_TO_VIDEO,
            json!({ "prompt": request.prompt, "image_url": url }),
        ),
        None => (LTX_TEXT_TO_VIDEO, json!({ "prompt": request.prompt })),
    }
}

#[async_trait]
impl RenderEngine for LtxEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Ltx
    }

    async fn submit(&self, request: &RenderRequest) -> Result<JobId> {
        let (endpoint, body) = endpoint_and_body(request);

        let response = self
            .client
            .post(format!("{}/{}", FAL_QUEUE_API, endpoint))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, "fal.ai queue").await?;
        let submission: QueueSubmission = response.json().await?;

        info!("LTX request queued: {} ({})", submission.request_id, endpoint);
        Ok(JobId {
            id: submission.request_id,
            status_url: Some(submission.status_url),
            result_url: Some(submission.response_url),
        })
    }

    async fn poll(&self, job: &JobId) -> Result<RenderStatus> {
        let (Some(status_url), Some(result_url)) = (&job.status_url, &job.result_url) else {
            return Err(VideoError::Api(format!(
                "LTX job {} is missing its queue URLs",
                job.id
            )));
        };

        let response = self
            .client
            .get(status_url)
            .header("Authorization", self.auth())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            warn!("Failed to get LTX status (HTTP {}): {}", status, error_text);
            return Ok(RenderStatus::Pending);
        }

        let queue: QueueStatus = response.json().await?;
        match queue.status.as_str() {
            "COMPLETED" => match queue.error {
                Some(reason) => Ok(RenderStatus::Failed { reason }),
                None => self.fetch_result(result_url).await,
            },
            "IN_QUEUE" | "IN_PROGRESS" => Ok(RenderStatus::Pending),
            other => Ok(RenderStatus::Failed {
                reason: format!("unexpected queue status {}", other),
            }),
        }
    }

    async fn download(&self, video_url: &str, dest: &Path) -> Result<()> {
        download_to(&self.client, video_url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::ContinuityToken;

    #[test]
    fn start_frame_selects_image_to_video() {
        let request = RenderRequest {
            prompt: "rain on glass".into(),
            duration_secs: 5,
            start_frame: Some(ContinuityToken::new("https://cdn/last.jpg")),
        };
        let (endpoint, body) = endpoint_and_body(&request);
        assert_eq!(endpoint, LTX_IMAGE_TO_VIDEO);
        assert_eq!(body["image_url"], "https://cdn/last.jpg");
    }

    #[test]
    fn text_only_uses_base_model() {
        let request = RenderRequest {
            prompt: "rain on glass".into(),
            duration_secs: 5,
            start_frame: None,
        };
        let (endpoint, body) = endpoint_and_body(&request);
        assert_eq!(endpoint, LTX_TEXT_TO_VIDEO);
        assert!(body.get("image_url").is_none());
    }
}
