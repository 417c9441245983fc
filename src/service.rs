//! End-to-end handling of one Reddit link
//! Fetch, classify and hand the media to a delivery surface

use std::sync::Arc;

use crate::config::AppConfig;
use crate::dispatcher::{Delivery, MediaDispatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::http::HttpClient;
use crate::reddit::RedditClient;
use crate::types::{DispatchReport, SubmissionData};
use crate::video::Ffmpeg;

/// Cheap to clone; clones share the HTTP connection pool
#[derive(Clone)]
pub struct RedditMediaService {
    reddit: RedditClient,
    dispatcher: MediaDispatcher,
}

impl RedditMediaService {
    pub fn new(reddit: RedditClient, dispatcher: MediaDispatcher) -> Self {
        Self { reddit, dispatcher }
    }

    pub fn from_config(config: &AppConfig) -> PipelineResult<Self> {
        let http = HttpClient::from_config(config)?;
        let reddit = RedditClient::new(http.clone(), config)?;
        let dispatcher = MediaDispatcher::new(
            Arc::new(http),
            Arc::new(Ffmpeg::new(config.compression.clone())),
            config,
        )?;

        Ok(Self::new(reddit, dispatcher))
    }

    pub fn find_reddit_url(&self, text: &str) -> Option<String> {
        self.reddit.find_reddit_url(text)
    }

    /// Process one post URL. The submission is returned even when it carries
    /// no media; in that case nothing is delivered.
    pub async fn handle(
        &self,
        url: &str,
        ceiling: Option<u64>,
        delivery: &dyn Delivery,
    ) -> PipelineResult<(SubmissionData, DispatchReport)> {
        let url = url.trim();
        if !self.reddit.is_reddit_url(url) {
            return Err(PipelineError::InvalidUrl(url.to_string()));
        }

        let submission = self.reddit.fetch_submission(url).await?;
        if submission.medias.is_empty() {
            log::info!("Submission {} has no media to deliver", submission.id);
            return Ok((submission, DispatchReport::default()));
        }

        let report = self
            .dispatcher
            .dispatch(&submission.medias, ceiling, delivery)
            .await?;

        Ok((submission, report))
    }
}
