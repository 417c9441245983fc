//! Media dispatch for reddit-media
//! Routes classified media to the matching delivery strategy

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, CompressionConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::http::{path_segment, ByteFetcher};
use crate::types::{DispatchReport, MediaFile, MediaReference};
use crate::video::{AssemblyJob, MediaToolchain};

/// Outbound surface. The pipeline never talks to a chat platform directly;
/// each surface implements this once.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_text(&self, text: &str) -> PipelineResult<()>;

    async fn send_files(&self, files: Vec<MediaFile>) -> PipelineResult<()>;
}

#[derive(Clone)]
pub struct MediaDispatcher {
    fetcher: Arc<dyn ByteFetcher>,
    toolchain: Arc<dyn MediaToolchain>,
    external_video: Regex,
    max_files_per_batch: usize,
    default_ceiling: u64,
    temp_root: Option<PathBuf>,
    compression: CompressionConfig,
}

impl MediaDispatcher {
    pub fn new(
        fetcher: Arc<dyn ByteFetcher>,
        toolchain: Arc<dyn MediaToolchain>,
        config: &AppConfig,
    ) -> PipelineResult<Self> {
        let external_video = Regex::new(&config.external_video_pattern)
            .map_err(|e| PipelineError::Config(format!("external_video_pattern: {}", e)))?;

        Ok(Self {
            fetcher,
            toolchain,
            external_video,
            max_files_per_batch: config.max_files_per_batch.max(1),
            default_ceiling: config.default_filesize_limit,
            temp_root: config.temp_root.clone(),
            compression: config.compression.clone(),
        })
    }

    /// Deliver `medias`. The first entry decides the strategy for the whole list.
    ///
    /// `ceiling` is the upload limit of the destination; the configured
    /// default applies when the caller has no platform context.
    pub async fn dispatch(
        &self,
        medias: &[MediaReference],
        ceiling: Option<u64>,
        delivery: &dyn Delivery,
    ) -> PipelineResult<DispatchReport> {
        let Some(first) = medias.first() else {
            return Ok(DispatchReport::default());
        };

        if let MediaReference::Video(fallback_url) = first {
            let ceiling = ceiling.unwrap_or(self.default_ceiling);
            return self.send_video(fallback_url, ceiling, delivery).await;
        }

        if self.external_video.is_match(first.url()) {
            delivery.send_text(first.url()).await?;
            log::info!("External video link sent: {}", first.url());
            return Ok(DispatchReport {
                payloads: 1,
                files: 0,
            });
        }

        self.send_images_batch(medias, delivery).await
    }

    async fn send_video(
        &self,
        fallback_url: &str,
        ceiling: u64,
        delivery: &dyn Delivery,
    ) -> PipelineResult<DispatchReport> {
        let job = AssemblyJob::new(fallback_url, ceiling, self.temp_root.as_deref()).await?;
        let file = job
            .run(
                self.fetcher.as_ref(),
                self.toolchain.as_ref(),
                &self.compression,
            )
            .await?;

        let size = file.data.len();
        delivery.send_files(vec![file]).await?;
        log::info!("Reddit video uploaded ({} bytes)", size);

        Ok(DispatchReport {
            payloads: 1,
            files: 1,
        })
    }

    /// Download images one by one, in order, and deliver them in batches.
    /// Failed downloads are dropped before batching.
    async fn send_images_batch(
        &self,
        medias: &[MediaReference],
        delivery: &dyn Delivery,
    ) -> PipelineResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut batch = Vec::with_capacity(self.max_files_per_batch);

        for (i, media) in medias.iter().enumerate() {
            let url = media.url();
            let Some(data) = self.fetcher.fetch(url).await else {
                log::warn!("Skipping image {} of {}: {}", i + 1, medias.len(), url);
                continue;
            };

            batch.push(MediaFile {
                filename: image_filename(url, i + 1),
                data,
            });

            if batch.len() == self.max_files_per_batch {
                report.files += batch.len();
                report.payloads += 1;
                delivery.send_files(std::mem::take(&mut batch)).await?;
            }
        }

        if !batch.is_empty() {
            report.files += batch.len();
            report.payloads += 1;
            delivery.send_files(batch).await?;
        }

        log::info!(
            "{} of {} images uploaded in {} messages",
            report.files,
            medias.len(),
            report.payloads
        );

        Ok(report)
    }
}

/// Last path component of an image URL, or `media_<n>.jpg` when there is none
pub fn image_filename(url: &str, position: usize) -> String {
    match path_segment(url, 1) {
        Some(name) if !name.is_empty() => name,
        _ => format!("media_{}.jpg", position),
    }
}
