use super::ensure_success;
use crate::error::{Result, VideoError};
use crate::upload::AssetUploader;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;

const IMGUR_UPLOAD_API: &str = "https://api.imgur.com/3/image";

/// 把关键帧上传到 Imgur，得到公开可访问的链接
#[derive(Debug, Clone)]
pub struct ImgurUploader {
    client_id: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    data: ImgurData,
}

#[derive(Debug, Deserialize)]
struct ImgurData {
    link: Option<String>,
}

impl ImgurUploader {
    pub fn new(client_id: String, client: Client) -> Self {
        Self { client_id, client }
    }
}

#[async_trait]
impl AssetUploader for ImgurUploader {
    async fn upload(&self, image: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.jpg".to_string());

        let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(IMGUR_UPLOAD_API)
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response, "Imgur upload").await?;
        let body: ImgurResponse = response.json().await?;

        body.data
            .link
            .ok_or_else(|| VideoError::Api("Imgur response has no link".to_string()))
    }
}
