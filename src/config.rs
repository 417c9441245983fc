//! Configuration management for reddit-media
//! Handles loading and saving settings to settings.json

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{DEFAULT_FILESIZE_LIMIT, MAX_FILES_PER_BATCH};

/// Encoder configuration for muxing and size-constrained re-encoding
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    /// ffmpeg executable (looked up in PATH when bare)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// ffprobe executable
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Width of re-encoded video; height follows the aspect ratio (default 1280)
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Encoding preset (default "fast")
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Audio bitrate assumed by the bitrate budget and used when re-encoding
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_bps: u64,
    /// Lowest video bitrate ever requested from the encoder
    #[serde(default = "default_min_video_bitrate")]
    pub min_video_bitrate_bps: u64,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_target_width() -> u32 {
    1280
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> u64 {
    128_000
}

fn default_min_video_bitrate() -> u64 {
    10_000
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            target_width: default_target_width(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate_bps: default_audio_bitrate(),
            min_video_bitrate_bps: default_min_video_bitrate(),
        }
    }
}

/// Application configuration stored in settings.json
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// User agent sent to Reddit and media hosts
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout for every HTTP call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_reddit_base_url")]
    pub reddit_base_url: String,
    /// Upload ceiling in bytes used when the caller supplies none
    #[serde(default = "default_filesize_limit")]
    pub default_filesize_limit: u64,
    /// Maximum number of images per delivered message
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    /// URLs matching this pattern are delivered as plain links
    #[serde(default = "default_external_video_pattern")]
    pub external_video_pattern: String,
    #[serde(default = "default_reddit_url_pattern")]
    pub reddit_url_pattern: String,
    #[serde(default = "default_output_dir")]
    pub default_output_dir: String,
    /// Posts processed at the same time by `batch`
    #[serde(default = "default_max_concurrent_posts")]
    pub max_concurrent_posts: usize,
    /// Parent directory for per-video scratch directories (system temp when unset)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
    #[serde(default)]
    pub compression: CompressionConfig,
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::types::APP_NAME, crate::types::APP_VERSION)
}

fn default_http_timeout() -> u64 {
    10
}

fn default_reddit_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_filesize_limit() -> u64 {
    DEFAULT_FILESIZE_LIMIT
}

fn default_max_files_per_batch() -> usize {
    MAX_FILES_PER_BATCH
}

fn default_external_video_pattern() -> String {
    r"^(?:https?://)?(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch|shorts/|embed/|live/)|youtu\.be/)"
        .to_string()
}

fn default_reddit_url_pattern() -> String {
    r"https?://(?:www\.)?reddit\.com/r/\w+/comments/[A-Za-z0-9]+/\S+".to_string()
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_max_concurrent_posts() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout(),
            reddit_base_url: default_reddit_base_url(),
            default_filesize_limit: default_filesize_limit(),
            max_files_per_batch: default_max_files_per_batch(),
            external_video_pattern: default_external_video_pattern(),
            reddit_url_pattern: default_reddit_url_pattern(),
            default_output_dir: default_output_dir(),
            max_concurrent_posts: default_max_concurrent_posts(),
            temp_root: None,
            compression: CompressionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Configuration file name
    const CONFIG_PATH: &'static str = "settings.json";

    /// Environment variable overriding `user_agent`
    const USER_AGENT_ENV: &'static str = "REDDIT_USER_AGENT";

    /// Load settings.json, writing a default one first if it does not exist
    pub fn load_or_create() -> Result<Self> {
        if !Path::new(Self::CONFIG_PATH).exists() {
            Self::default().save()?;
            println!("📝 Created default {}", Self::CONFIG_PATH);
        }
        Self::load_from(Path::new(Self::CONFIG_PATH))
    }

    /// Load configuration from a given file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Ok(agent) = std::env::var(Self::USER_AGENT_ENV) {
            if !agent.trim().is_empty() {
                config.user_agent = agent;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::CONFIG_PATH, json)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_files_per_batch == 0 || self.max_files_per_batch > MAX_FILES_PER_BATCH {
            return Err(anyhow!(
                "max_files_per_batch must be between 1 and {}",
                MAX_FILES_PER_BATCH
            ));
        }
        if self.max_concurrent_posts == 0 {
            return Err(anyhow!("max_concurrent_posts must be at least 1"));
        }
        if self.default_filesize_limit == 0 {
            return Err(anyhow!("default_filesize_limit must be greater than 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be greater than 0"));
        }
        Regex::new(&self.external_video_pattern)
            .context("Invalid external_video_pattern")?;
        Regex::new(&self.reddit_url_pattern).context("Invalid reddit_url_pattern")?;
        Ok(())
    }

    /// Ensure output directory exists
    pub fn ensure_output_dir(&self) -> Result<()> {
        if !Path::new(&self.default_output_dir).exists() {
            fs::create_dir_all(&self.default_output_dir)?;
        }
        Ok(())
    }
}
