//! Video processing module for reddit-media
//! Handles DASH stream downloads, ffmpeg/ffprobe invocations and per-video jobs

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tempfile::TempDir;
use tokio::process::Command;

use crate::compression::{ensure_within_limit, CompressionPlan};
use crate::config::CompressionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::http::{path_segment, ByteFetcher};
use crate::types::MediaFile;

/// Audio rendition Reddit publishes next to every DASH video stream
const DASH_AUDIO_SUFFIX: &str = "DASH_AUDIO_128.mp4";
const DASH_MARKER: &str = "DASH_";

/// External encoder operations used by the pipeline
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Combine a video stream and an optional audio stream into `output`
    async fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> PipelineResult<()>;

    /// Container duration in seconds
    async fn probe_duration(&self, input: &Path) -> PipelineResult<f64>;

    /// Re-encode `input` following `plan`
    async fn reencode(
        &self,
        input: &Path,
        output: &Path,
        plan: &CompressionPlan,
    ) -> PipelineResult<()>;
}

/// ffmpeg/ffprobe backed toolchain
pub struct Ffmpeg {
    settings: CompressionConfig,
}

impl Ffmpeg {
    pub fn new(settings: CompressionConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl MediaToolchain for Ffmpeg {
    async fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> PipelineResult<()> {
        let args = mux_args(video, audio, output);
        let result = run_tool(&self.settings.ffmpeg_path, &args)
            .await
            .map_err(|e| PipelineError::Assembly(format!("Failed to execute ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Assembly(format!(
                "ffmpeg merge failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn probe_duration(&self, input: &Path) -> PipelineResult<f64> {
        let args = probe_args(input);
        let result = run_tool(&self.settings.ffprobe_path, &args)
            .await
            .map_err(|e| PipelineError::Compression(format!("Failed to run ffprobe: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Compression(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        parse_duration(&String::from_utf8_lossy(&result.stdout))
    }

    async fn reencode(
        &self,
        input: &Path,
        output: &Path,
        plan: &CompressionPlan,
    ) -> PipelineResult<()> {
        let args = reencode_args(input, output, plan, &self.settings);
        let result = run_tool(&self.settings.ffmpeg_path, &args)
            .await
            .map_err(|e| PipelineError::Compression(format!("Failed to execute ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Compression(format!(
                "ffmpeg compress failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}

async fn run_tool(program: &str, args: &[String]) -> std::io::Result<Output> {
    log::debug!("Running {} {}", program, args.join(" "));
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Stream-copy the video; audio, when present, is transcoded to AAC
pub fn mux_args(video: &Path, audio: Option<&Path>, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(video),
    ];

    match audio {
        Some(audio) => args.extend([
            "-i".to_string(),
            path_arg(audio),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ]),
        None => args.extend(["-c:v".to_string(), "copy".to_string()]),
    }

    args.push(path_arg(output));
    args
}

pub fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path_arg(input),
    ]
}

/// Scale to the target width (even height), encode at the planned bitrate
pub fn reencode_args(
    input: &Path,
    output: &Path,
    plan: &CompressionPlan,
    settings: &CompressionConfig,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-b:v".to_string(),
        plan.video_bitrate_bps.to_string(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-vf".to_string(),
        format!("scale={}:-2", settings.target_width),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        "-b:a".to_string(),
        format!("{}k", plan.audio_bitrate_bps / 1000),
        path_arg(output),
    ]
}

/// Parse ffprobe's bare duration output
pub fn parse_duration(stdout: &str) -> PipelineResult<f64> {
    stdout.trim().parse::<f64>().map_err(|_| {
        PipelineError::Compression(format!("Failed to parse video duration: {:?}", stdout.trim()))
    })
}

/// Audio stream URL for a DASH video URL.
///
/// Everything from the first `DASH_` on is replaced by the fixed 128k audio
/// rendition name, query string included. This mirrors Reddit's current naming
/// and breaks if they change it.
pub fn derive_audio_url(video_url: &str) -> String {
    let base = video_url.split(DASH_MARKER).next().unwrap_or(video_url);
    format!("{}{}", base, DASH_AUDIO_SUFFIX)
}

/// Name used for a job's files: the video id of `v.redd.it/<id>/DASH_*.mp4`
pub fn video_name(fallback_url: &str) -> String {
    let name: String = path_segment(fallback_url, 1)
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if name.is_empty() {
        "video".to_string()
    } else {
        name
    }
}

/// Download the DASH streams of `fallback_url` into `work_dir` and mux them.
/// A missing audio stream is fine; a missing video stream is not.
pub async fn assemble(
    fallback_url: &str,
    work_dir: &Path,
    name: &str,
    fetcher: &dyn ByteFetcher,
    toolchain: &dyn MediaToolchain,
) -> PipelineResult<PathBuf> {
    let video_path = work_dir.join(format!("{}_video.mp4", name));
    let audio_path = work_dir.join(format!("{}_audio.mp4", name));
    let merged_path = work_dir.join(format!("{}_merged.mp4", name));

    let video = fetcher.fetch(fallback_url).await.ok_or_else(|| {
        PipelineError::Assembly(format!("Video stream unavailable: {}", fallback_url))
    })?;
    tokio::fs::write(&video_path, &video)
        .await
        .map_err(|e| PipelineError::io(&video_path, e))?;

    let audio_url = derive_audio_url(fallback_url);
    let audio = match fetcher.fetch(&audio_url).await {
        Some(data) => {
            tokio::fs::write(&audio_path, &data)
                .await
                .map_err(|e| PipelineError::io(&audio_path, e))?;
            Some(audio_path.as_path())
        }
        None => {
            log::info!("No audio stream for {}, muxing video only", fallback_url);
            None
        }
    };

    toolchain.mux(&video_path, audio, &merged_path).await?;
    log::debug!("Muxed {} into {}", fallback_url, merged_path.display());

    Ok(merged_path)
}

/// Working state for one Reddit video. The scratch directory lives exactly as
/// long as the job and is removed however `run` ends.
pub struct AssemblyJob {
    fallback_url: String,
    name: String,
    work_dir: TempDir,
    ceiling: u64,
}

impl AssemblyJob {
    pub async fn new(
        fallback_url: &str,
        ceiling: u64,
        temp_root: Option<&Path>,
    ) -> PipelineResult<Self> {
        let root = match temp_root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| PipelineError::io(root, e))?;
                root.to_path_buf()
            }
            None => std::env::temp_dir(),
        };

        let work_dir = tokio::task::spawn_blocking({
            let root = root.clone();
            move || {
                tempfile::Builder::new()
                    .prefix("reddit-media-")
                    .tempdir_in(root)
            }
        })
        .await
        .map_err(|e| PipelineError::Assembly(format!("scratch directory task failed: {}", e)))?
        .map_err(|e| PipelineError::io(&root, e))?;

        Ok(Self {
            fallback_url: fallback_url.to_string(),
            name: video_name(fallback_url),
            work_dir,
            ceiling,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Assemble, shrink if needed, and load the final file
    pub async fn run(
        self,
        fetcher: &dyn ByteFetcher,
        toolchain: &dyn MediaToolchain,
        settings: &CompressionConfig,
    ) -> PipelineResult<MediaFile> {
        let dir = self.work_dir();

        let merged = assemble(&self.fallback_url, dir, &self.name, fetcher, toolchain).await?;
        let final_path =
            ensure_within_limit(&merged, self.ceiling, dir, &self.name, toolchain, settings)
                .await?;

        let data = tokio::fs::read(&final_path)
            .await
            .map_err(|e| PipelineError::io(&final_path, e))?;

        Ok(MediaFile {
            filename: format!("{}.mp4", self.name),
            data,
        })
    }
}

/// Check if required external dependencies are available
pub fn check_dependencies(settings: &CompressionConfig) -> anyhow::Result<()> {
    let mut missing = Vec::new();

    for program in [&settings.ffmpeg_path, &settings.ffprobe_path] {
        let found = std::process::Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok();
        if !found {
            missing.push(program.as_str());
        }
    }

    if !missing.is_empty() {
        let mut msg = format!(
            "Missing required dependencies: {}.\nPlease install them first.",
            missing.join(", ")
        );

        match std::env::consts::OS {
            "linux" => msg.push_str(
                "\n\nOn Linux (Ubuntu/Debian), try:\n  sudo apt update && sudo apt install ffmpeg",
            ),
            "macos" => msg.push_str("\n\nOn macOS, try:\n  brew install ffmpeg"),
            "windows" => {
                msg.push_str("\n\nOn Windows, ensure ffmpeg and ffprobe are in your PATH.")
            }
            _ => {}
        }

        return Err(anyhow::anyhow!(msg));
    }

    Ok(())
}

/// Format seconds to HH:MM:SS timestamp
pub fn format_seconds_to_timestamp(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
