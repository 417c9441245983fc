//! Shared data types for reddit-media

use chrono::{DateTime, Utc};

/// One piece of media found in a submission.
/// The variant decides how the dispatcher delivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// Reddit-hosted video, carrying the DASH fallback URL
    Video(String),
    GalleryImage(String),
    SingleImage(String),
    /// Link to an external video host (YouTube and friends)
    ExternalLink(String),
}

impl MediaReference {
    pub fn url(&self) -> &str {
        match self {
            MediaReference::Video(url)
            | MediaReference::GalleryImage(url)
            | MediaReference::SingleImage(url)
            | MediaReference::ExternalLink(url) => url,
        }
    }
}

/// Snapshot of a fetched Reddit post
#[derive(Debug, Clone)]
pub struct SubmissionData {
    pub id: String,
    pub title: String,
    pub url: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub subreddit: String,
    pub subreddit_icon: Option<String>,
    /// Empty when the account was deleted
    pub author: String,
    pub upvotes: i64,
    pub replies: u64,
    pub medias: Vec<MediaReference>,
}

/// A file ready to hand to a delivery surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// What a dispatch ended up sending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of `Delivery` calls made
    pub payloads: usize,
    /// Number of files across all payloads
    pub files: usize,
}

/// Default upload ceiling when no guild context is available (10 MiB)
pub const DEFAULT_FILESIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// Maximum number of attachments per message
pub const MAX_FILES_PER_BATCH: usize = 10;

/// Application version constant
pub const APP_VERSION: &str = "0.3.2";

/// Application name constant
pub const APP_NAME: &str = "reddit-media";
