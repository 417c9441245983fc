//! reddit-media
//! Fetches Reddit posts and delivers their videos, galleries and images,
//! keeping every video under the destination's upload limit.

mod config;

mod compression;
mod dispatcher;
mod error;
mod http;
mod reddit;
mod service;
mod sink;
mod types;
mod video;

use anyhow::{anyhow, Context, Result};
use config::AppConfig;
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use service::RedditMediaService;
use sink::DirectorySink;
use types::{DispatchReport, SubmissionData};

use crate::types::APP_VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Check and strip --debug flag
    let debug_mode = args.contains(&"--debug".to_string());
    init_logging(debug_mode)?;
    if debug_mode {
        log::info!("Starting reddit-media {} with debug logging", APP_VERSION);
        log::debug!("Raw Args: {:?}", args);
    }

    let actual_args: Vec<String> = args.iter().filter(|a| *a != "--debug").cloned().collect();

    if actual_args.len() > 1 {
        return handle_cli_command(&actual_args).await;
    }

    print_help(&actual_args[0]);
    Ok(())
}

/// Terminal logging always; debug.log as well with --debug
fn init_logging(debug_mode: bool) -> Result<()> {
    let term_level = if debug_mode {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    if debug_mode {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?,
        ));
    }

    let _ = CombinedLogger::init(loggers);
    Ok(())
}

/// Handle CLI commands (fetch, batch, check)
async fn handle_cli_command(args: &[String]) -> Result<()> {
    let command = args[1].as_str();

    match command {
        "fetch" => {
            let (positional, limit) = split_limit_flag(&args[2..])?;
            if positional.is_empty() {
                eprintln!(
                    "Usage: {} fetch <reddit_url> [output_dir] [--limit <bytes>]",
                    args[0]
                );
                eprintln!("\nExample:");
                eprintln!(
                    "  {} fetch https://www.reddit.com/r/aww/comments/abc123/title/",
                    args[0]
                );
                eprintln!(
                    "  {} fetch https://www.reddit.com/r/aww/comments/abc123/title/ ./out --limit 26214400",
                    args[0]
                );
                std::process::exit(1);
            }

            let config = load_config_for_cli()?;
            let service = RedditMediaService::from_config(&config)?;

            // Accept pasted text as long as it contains a post link
            let url = service
                .find_reddit_url(&positional[0])
                .unwrap_or_else(|| positional[0].clone());
            let output_dir = positional
                .get(1)
                .cloned()
                .unwrap_or_else(|| config.default_output_dir.clone());
            let sink = DirectorySink::new(&output_dir);

            println!("📥 Fetching Reddit post...");
            println!("   URL: {}", url);
            println!("   Output: {}", output_dir);
            println!(
                "   Limit: {} bytes",
                limit.unwrap_or(config.default_filesize_limit)
            );

            let (submission, report) = service
                .handle(&url, limit, &sink)
                .await
                .with_context(|| format!("Failed to process {}", url))?;

            print_submission(&submission, &report);
            for link in sink.links() {
                println!("   External video: {}", link);
            }
            println!(
                "✅ {} files saved to: {}",
                sink.files_written(),
                sink.output_dir().display()
            );
            Ok(())
        }

        "batch" => {
            let (positional, limit) = split_limit_flag(&args[2..])?;
            if positional.is_empty() {
                eprintln!(
                    "Usage: {} batch <urls_file> [output_dir] [--limit <bytes>]",
                    args[0]
                );
                eprintln!("\nExample:");
                eprintln!("  {} batch links.txt", args[0]);
                eprintln!("  {} batch links.txt ./saved", args[0]);
                std::process::exit(1);
            }

            let config = load_config_for_cli()?;
            let service = RedditMediaService::from_config(&config)?;

            let urls_file = &positional[0];
            let output_dir = PathBuf::from(
                positional
                    .get(1)
                    .cloned()
                    .unwrap_or_else(|| config.default_output_dir.clone()),
            );
            let urls = read_url_list(Path::new(urls_file))?;

            println!("📥 Batch fetching Reddit posts...");
            println!("   Input: {} ({} links)", urls_file, urls.len());
            println!("   Output dir: {}", output_dir.display());

            let failures = run_batch(
                &service,
                urls,
                &output_dir,
                limit,
                config.max_concurrent_posts,
            )
            .await;

            if failures > 0 {
                return Err(anyhow!("{} posts failed, see log for details", failures));
            }
            println!("✅ Batch complete: {}", output_dir.display());
            Ok(())
        }

        "check" => {
            let config = load_config_for_cli()?;
            video::check_dependencies(&config.compression)?;
            println!(
                "✅ {} and {} are available",
                config.compression.ffmpeg_path, config.compression.ffprobe_path
            );
            Ok(())
        }

        "help" | "--help" | "-h" => {
            print_help(&args[0]);
            Ok(())
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            print_help(&args[0]);
            std::process::exit(1);
        }
    }
}

/// Every post runs as its own task, at most `max_concurrent` at a time.
/// Returns how many failed.
async fn run_batch(
    service: &RedditMediaService,
    urls: Vec<String>,
    output_dir: &Path,
    limit: Option<u64>,
    max_concurrent: usize,
) -> usize {
    let total = urls.len();
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (i, url) in urls.into_iter().enumerate() {
        let service = service.clone();
        let permits = Arc::clone(&permits);
        let folder = reddit::extract_post_id(&url).unwrap_or_else(|| format!("post_{}", i + 1));
        let sink = DirectorySink::new(output_dir.join(folder));

        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => service.handle(&url, limit, &sink).await,
                Err(e) => Err(error::PipelineError::Delivery(format!(
                    "batch cancelled: {}",
                    e
                ))),
            };
            (i + 1, url, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, _, Ok((submission, report)))) => {
                println!("   [{}/{}] {}", position, total, submission.title);
                print_submission(&submission, &report);
            }
            Ok((position, url, Err(e))) => {
                failures += 1;
                log::error!("[{}/{}] {} failed: {}", position, total, url, e);
                eprintln!("   [{}/{}] ❌ {}: {}", position, total, url, e);
            }
            Err(e) => {
                failures += 1;
                log::error!("Batch task panicked: {}", e);
            }
        }
    }

    failures
}

/// Pull `--limit <bytes>` out of the argument list
fn split_limit_flag(args: &[String]) -> Result<(Vec<String>, Option<u64>)> {
    let mut positional = Vec::new();
    let mut limit = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--limit" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--limit needs a value in bytes"))?;
            let bytes: u64 = value
                .parse()
                .with_context(|| format!("Invalid --limit value: {}", value))?;
            if bytes == 0 {
                return Err(anyhow!("--limit must be greater than 0"));
            }
            limit = Some(bytes);
        } else {
            positional.push(arg.clone());
        }
    }

    Ok((positional, limit))
}

/// One URL per line; blank lines and `#` comments are skipped
fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_url_list(&content))
}

fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn print_submission(submission: &SubmissionData, report: &DispatchReport) {
    let author = if submission.author.is_empty() {
        "[deleted]"
    } else {
        submission.author.as_str()
    };

    println!("   📌 {}", submission.title);
    println!(
        "      r/{} • u/{} • {}",
        submission.subreddit,
        author,
        submission.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "      ⬆ {} • 💬 {} • {} media, {} files in {} messages",
        submission.upvotes,
        submission.replies,
        submission.medias.len(),
        report.files,
        report.payloads
    );
    println!("      🔗 {}", submission.url);
    if let Some(icon) = &submission.subreddit_icon {
        log::debug!("r/{} icon: {}", submission.subreddit, icon);
    }
    if let Some(first_line) = submission.body.lines().find(|l| !l.trim().is_empty()) {
        let preview: String = first_line.chars().take(120).collect();
        println!("      {}", preview);
    }
}

/// Print help message
fn print_help(program: &str) {
    println!("reddit-media v{}", types::APP_VERSION);
    println!();
    println!("USAGE:");
    println!(
        "  {} fetch <url> [out_dir] [--limit <bytes>]    Download the media of one post",
        program
    );
    println!(
        "  {} batch <file> [out_dir] [--limit <bytes>]   Download every post listed in a file",
        program
    );
    println!(
        "  {} check                                      Verify ffmpeg and ffprobe",
        program
    );
    println!(
        "  {} help                                       Show this help message",
        program
    );
    println!();
    println!("OPTIONS:");
    println!("  --limit <bytes>   Upload ceiling for videos (default from settings.json)");
    println!("  --debug           Verbose logging, also written to debug.log");
    println!();
    println!("CONFIGURATION:");
    println!("  Edit settings.json to configure:");
    println!("  - default_filesize_limit        Video ceiling in bytes (default 10 MiB)");
    println!("  - max_files_per_batch           Images per delivered message (default 10)");
    println!("  - user_agent                    Also settable with REDDIT_USER_AGENT");
    println!("  - compression.ffmpeg_path       ffmpeg binary used for merge and compression");
}

/// Load config for CLI commands, creating settings.json on first run
fn load_config_for_cli() -> Result<AppConfig> {
    let config = AppConfig::load_or_create().context("Failed to load settings.json")?;
    config.ensure_output_dir()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_limit_flag() {
        let (positional, limit) =
            split_limit_flag(&args(&["https://reddit.com/x", "--limit", "2048", "out"])).unwrap();
        assert_eq!(positional, args(&["https://reddit.com/x", "out"]));
        assert_eq!(limit, Some(2048));

        let (positional, limit) = split_limit_flag(&args(&["a"])).unwrap();
        assert_eq!(positional, args(&["a"]));
        assert_eq!(limit, None);
    }

    #[test]
    fn test_split_limit_flag_rejects_bad_values() {
        assert!(split_limit_flag(&args(&["a", "--limit"])).is_err());
        assert!(split_limit_flag(&args(&["a", "--limit", "ten"])).is_err());
        assert!(split_limit_flag(&args(&["a", "--limit", "0"])).is_err());
    }

    #[tokio::test]
    async fn test_run_batch_counts_failures_with_one_permit() {
        let dir = tempfile::tempdir().unwrap();
        let service = RedditMediaService::from_config(&AppConfig::default()).unwrap();
        let urls = args(&[
            "https://example.com/a",
            "not a link",
            "https://www.youtube.com/watch?v=x",
        ]);

        let failures = run_batch(&service, urls, dir.path(), None, 1).await;

        assert_eq!(failures, 3);
    }

    #[tokio::test]
    async fn test_run_batch_with_zero_limit_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let service = RedditMediaService::from_config(&AppConfig::default()).unwrap();

        let failures = run_batch(&service, args(&["bogus"]), dir.path(), None, 0).await;

        assert_eq!(failures, 1);
    }

    #[test]
    fn test_parse_url_list() {
        let content = "# saved posts\nhttps://reddit.com/r/a/comments/1/x\n\n   \n  https://reddit.com/r/b/comments/2/y  \n#https://skipped\n";
        assert_eq!(
            parse_url_list(content),
            args(&[
                "https://reddit.com/r/a/comments/1/x",
                "https://reddit.com/r/b/comments/2/y"
            ])
        );
    }
}
