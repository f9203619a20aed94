//! 关键帧连续性追踪。
//!
//! 每个片段渲染完成后抽取最后一帧并上传，得到的 URL 作为令牌交给下一个消费者：
//! 同一场景内的下一个片段（场景内令牌），或下一个场景的第一个片段（跨场景令牌）。
//! 令牌不可克隆，被消费时按值移走，因此不会有两个渲染请求共用同一个旧帧。

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::upload::{upload_distinct, AssetUploader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 最近一次生成的静帧的 URL
#[derive(Debug, PartialEq, Eq)]
pub struct ContinuityToken {
    url: String,
}

impl ContinuityToken {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    /// 喂给同一场景的下一个片段
    WithinScene,
    /// 喂给下一个场景的第一个片段
    CrossScene,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    NoFrame,
    PendingUpload(PathBuf),
    Ready(TokenScope),
}

/// 令牌发布与消费的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub within_scene_published: usize,
    pub within_scene_consumed: usize,
    pub cross_scene_published: usize,
    pub cross_scene_consumed: usize,
    pub upload_attempts: u32,
}

pub struct ContinuityTracker {
    uploader: Arc<dyn AssetUploader>,
    policy: RetryPolicy,
    within_scene: Option<ContinuityToken>,
    cross_scene: Option<ContinuityToken>,
    last_url: Option<String>,
    state: ChainState,
    stats: TransferStats,
}

impl ContinuityTracker {
    pub fn new(uploader: Arc<dyn AssetUploader>, policy: RetryPolicy) -> Self {
        Self {
            uploader,
            policy,
            within_scene: None,
            cross_scene: None,
            last_url: None,
            state: ChainState::NoFrame,
            stats: TransferStats::default(),
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// 外部提供的初始帧，作为第一个场景第一个片段的起始帧
    pub fn seed_initial(&mut self, url: String) {
        info!("Seeding continuity chain with initial frame {}", url);
        self.last_url = Some(url.clone());
        self.cross_scene = Some(ContinuityToken::new(url));
        self.state = ChainState::Ready(TokenScope::CrossScene);
    }

    /// 为即将渲染的片段取出起始帧。
    ///
    /// 场景的第一个片段消费跨场景令牌，其余片段消费场景内令牌。取出后该令牌的作用域关闭，
    /// 直到这个片段渲染完成并发布新帧。
    pub fn take_start_frame(&mut self, first_in_scene: bool) -> Option<ContinuityToken> {
        let token = if first_in_scene {
            // 场景内令牌不会跨越场景边界
            self.within_scene = None;
            self.cross_scene.take()
        } else {
            self.within_scene.take()
        };

        if token.is_some() {
            if first_in_scene {
                self.stats.cross_scene_consumed += 1;
            } else {
                self.stats.within_scene_consumed += 1;
            }
        }
        self.state = ChainState::NoFrame;
        token
    }

    /// 上传刚抽取的最后一帧，并把得到的 URL 作为 `scope` 作用域的令牌发布。
    ///
    /// 与上一次持有的 URL 相同视为过期结果，按重试策略重试，用尽后返回
    /// `UploadStalenessError`，此时不发布任何令牌。
    pub async fn publish(&mut self, frame: &Path, scope: TokenScope) -> Result<()> {
        self.state = ChainState::PendingUpload(frame.to_path_buf());

        let upload = upload_distinct(
            self.uploader.as_ref(),
            frame,
            self.last_url.as_deref(),
            self.policy,
        )
        .await;

        let upload = match upload {
            Ok(upload) => upload,
            Err(e) => {
                self.state = ChainState::NoFrame;
                return Err(e);
            }
        };

        self.stats.upload_attempts += upload.attempts;
        self.last_url = Some(upload.url.clone());
        let token = Some(ContinuityToken::new(upload.url));

        let slot = match scope {
            TokenScope::WithinScene => {
                self.stats.within_scene_published += 1;
                &mut self.within_scene
            }
            TokenScope::CrossScene => {
                self.stats.cross_scene_published += 1;
                &mut self.cross_scene
            }
        };
        if slot.is_some() {
            debug!("Replacing unconsumed {:?} token", scope);
        }
        *slot = token;
        self.state = ChainState::Ready(scope);
        Ok(())
    }

    /// 链条结束：没有后续消费者，丢弃剩余令牌。返回是否有令牌被丢弃
    pub fn finish(&mut self) -> bool {
        let discarded = self.within_scene.take().is_some() | self.cross_scene.take().is_some();
        self.state = ChainState::NoFrame;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VideoError;
    use crate::upload::testing::ScriptedUploader;

    fn tracker(urls: &[&str]) -> (ContinuityTracker, Arc<ScriptedUploader>) {
        let uploader = Arc::new(ScriptedUploader::new(urls));
        (
            ContinuityTracker::new(uploader.clone(), RetryPolicy::default()),
            uploader,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn within_scene_token_feeds_next_segment_once() {
        let (mut tracker, _) = tracker(&["https://img/1"]);
        assert_eq!(tracker.state(), &ChainState::NoFrame);
        assert!(tracker.take_start_frame(true).is_none());

        tracker
            .publish(Path::new("seg1.jpg"), TokenScope::WithinScene)
            .await
            .unwrap();
        assert_eq!(tracker.state(), &ChainState::Ready(TokenScope::WithinScene));

        let token = tracker.take_start_frame(false).unwrap();
        assert_eq!(token.url(), "https://img/1");
        assert_eq!(tracker.state(), &ChainState::NoFrame);
        // 单一所有者：再次读取为空
        assert!(tracker.take_start_frame(false).is_none());
        assert_eq!(tracker.stats().within_scene_consumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cross_scene_token_is_not_visible_within_scene() {
        let (mut tracker, _) = tracker(&["https://img/1"]);
        tracker
            .publish(Path::new("scene1.jpg"), TokenScope::CrossScene)
            .await
            .unwrap();

        assert!(tracker.take_start_frame(false).is_none());
        let token = tracker.take_start_frame(true).unwrap();
        assert_eq!(token.url(), "https://img/1");
        assert_eq!(tracker.stats().cross_scene_consumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_url_twice_then_fresh_reaches_ready() {
        let (mut tracker, uploader) = tracker(&["https://img/1", "https://img/1", "https://img/1", "https://img/2"]);
        tracker
            .publish(Path::new("seg1.jpg"), TokenScope::WithinScene)
            .await
            .unwrap();
        let _consumed = tracker.take_start_frame(false);

        tracker
            .publish(Path::new("seg2.jpg"), TokenScope::CrossScene)
            .await
            .unwrap();
        assert_eq!(tracker.state(), &ChainState::Ready(TokenScope::CrossScene));
        assert_eq!(uploader.calls(), 4);
        assert_eq!(tracker.take_start_frame(true).unwrap().url(), "https://img/2");
    }

    #[tokio::test(start_paused = true)]
    async fn always_stale_fails_after_three_attempts() {
        let (mut tracker, uploader) = tracker(&["https://img/1"]);
        tracker
            .publish(Path::new("seg1.jpg"), TokenScope::WithinScene)
            .await
            .unwrap();
        let _consumed = tracker.take_start_frame(false);

        let err = tracker
            .publish(Path::new("seg2.jpg"), TokenScope::WithinScene)
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::UploadStaleness { attempts: 3, .. }));
        assert_eq!(uploader.calls(), 4);
        assert_eq!(tracker.state(), &ChainState::NoFrame);
        assert!(tracker.take_start_frame(false).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_initial_frame_counts_as_previous_url() {
        let (mut tracker, uploader) = tracker(&["https://img/seed", "https://img/2"]);
        tracker.seed_initial("https://img/seed".to_string());

        let seed = tracker.take_start_frame(true).unwrap();
        assert_eq!(seed.url(), "https://img/seed");

        tracker
            .publish(Path::new("seg1.jpg"), TokenScope::CrossScene)
            .await
            .unwrap();
        assert_eq!(uploader.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_discards_terminal_token() {
        let (mut tracker, _) = tracker(&["https://img/1"]);
        tracker
            .publish(Path::new("last.jpg"), TokenScope::CrossScene)
            .await
            .unwrap();
        assert!(tracker.finish());
        assert!(!tracker.finish());
        assert!(tracker.take_start_frame(true).is_none());
    }
}
