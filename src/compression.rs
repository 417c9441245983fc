//! Video compression module for reddit-media
//! Keeps delivered videos under the upload ceiling with a single bitrate-targeted re-encode.

use std::path::{Path, PathBuf};

use crate::config::CompressionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::video::{format_seconds_to_timestamp, MediaToolchain};

/// Bitrates for one re-encode, derived from the probed duration and the ceiling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionPlan {
    pub duration_secs: f64,
    pub audio_bitrate_bps: u64,
    pub video_bitrate_bps: u64,
}

impl CompressionPlan {
    /// Spend the whole ceiling over the duration, minus the audio share.
    /// `video = max(floor, floor(ceiling * 8 / duration) - audio)`
    pub fn compute(
        duration_secs: f64,
        ceiling_bytes: u64,
        settings: &CompressionConfig,
    ) -> PipelineResult<Self> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(PipelineError::Compression(format!(
                "Invalid video duration: {}",
                duration_secs
            )));
        }

        let total_bitrate_bps = ((ceiling_bytes as f64 * 8.0) / duration_secs).floor() as u64;
        let video_bitrate_bps = total_bitrate_bps
            .saturating_sub(settings.audio_bitrate_bps)
            .max(settings.min_video_bitrate_bps);

        Ok(Self {
            duration_secs,
            audio_bitrate_bps: settings.audio_bitrate_bps,
            video_bitrate_bps,
        })
    }
}

async fn file_size(path: &Path) -> PipelineResult<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|e| PipelineError::io(path, e))
}

/// Return a file no larger than `ceiling` when possible.
///
/// Files already under the ceiling come back untouched. Otherwise the video is
/// re-encoded once into `<name>_compressed.mp4`; a result that is still too
/// large is returned anyway and left to the upload to reject.
pub async fn ensure_within_limit(
    merged: &Path,
    ceiling: u64,
    work_dir: &Path,
    name: &str,
    toolchain: &dyn MediaToolchain,
    settings: &CompressionConfig,
) -> PipelineResult<PathBuf> {
    let size = file_size(merged).await?;
    if size <= ceiling {
        log::debug!("{} is {} bytes, under {} ceiling", name, size, ceiling);
        return Ok(merged.to_path_buf());
    }

    let duration = toolchain.probe_duration(merged).await?;
    let plan = CompressionPlan::compute(duration, ceiling, settings)?;

    log::info!(
        "Compressing {} ({} bytes, {}) to {} bps video",
        name,
        size,
        format_seconds_to_timestamp(duration as u64),
        plan.video_bitrate_bps
    );

    let output = work_dir.join(format!("{}_compressed.mp4", name));
    toolchain.reencode(merged, &output, &plan).await?;

    let compressed_size = file_size(&output).await?;
    if compressed_size > ceiling {
        log::warn!(
            "{} is still {} bytes after compression (ceiling {}), delivering as is",
            name,
            compressed_size,
            ceiling
        );
    }

    Ok(output)
}
