//! Reddit access for reddit-media
//! Fetches submissions through the public JSON API and classifies their media

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::http::{ByteFetcher, HttpClient};
use crate::types::{MediaReference, SubmissionData};

/// Author name Reddit reports for removed accounts
const DELETED_AUTHOR: &str = "[deleted]";

/// Submission fields as returned by `/comments/{id}.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSubmission {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub media: Option<RawMedia>,
    #[serde(default)]
    pub secure_media: Option<RawMedia>,
    #[serde(default)]
    pub gallery_data: Option<GalleryData>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMetadataEntry>>,
    #[serde(default)]
    pub crosspost_parent_list: Option<Vec<RawSubmission>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryData {
    #[serde(default)]
    pub items: Vec<GalleryItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryItem {
    pub media_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaMetadataEntry {
    #[serde(default)]
    pub s: Option<MediaSource>,
}

/// Largest rendition of a gallery entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSource {
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub gif: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct SubredditAbout {
    #[serde(default)]
    icon_img: Option<String>,
    #[serde(default)]
    community_icon: Option<String>,
}

impl RawSubmission {
    /// DASH fallback URL of a Reddit-hosted video, looking through crossposts
    pub fn fallback_url(&self) -> Option<&str> {
        let own = [self.media.as_ref(), self.secure_media.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|media| media.reddit_video.as_ref())
            .find_map(|video| video.fallback_url.as_deref());

        own.or_else(|| {
            self.crosspost_parent_list
                .as_ref()
                .and_then(|parents| parents.first())
                .and_then(|parent| parent.fallback_url())
        })
    }

    /// Author display name; empty for deleted accounts
    pub fn author_name(&self) -> String {
        match self.author.as_deref() {
            Some(DELETED_AUTHOR) | None => String::new(),
            Some(name) => name.to_string(),
        }
    }
}

/// Determine the media carried by a submission.
///
/// Video wins over everything, then galleries (one entry per item, in order),
/// then a HEAD probe of the post URL for a single image or an external video link.
/// An empty result means the post has nothing deliverable.
pub async fn classify(
    raw: &RawSubmission,
    fetcher: &dyn ByteFetcher,
    external_video: &Regex,
) -> Vec<MediaReference> {
    let mut medias = Vec::new();

    if raw.is_video {
        match raw.fallback_url() {
            Some(url) => medias.push(MediaReference::Video(url.to_string())),
            None => log::warn!("Submission {} is a video without fallback url", raw.id),
        }
        return medias;
    }

    if let Some(gallery) = &raw.gallery_data {
        let metadata = raw.media_metadata.as_ref();
        for item in &gallery.items {
            let source = metadata
                .and_then(|m| m.get(&item.media_id))
                .and_then(|entry| entry.s.as_ref())
                .and_then(|s| s.u.clone().or_else(|| s.gif.clone()));

            match source {
                Some(url) => medias.push(MediaReference::GalleryImage(url)),
                None => log::warn!(
                    "Gallery item {} of {} has no usable source",
                    item.media_id,
                    raw.id
                ),
            }
        }
        return medias;
    }

    let content_type = fetcher.content_type(&raw.url).await.unwrap_or_default();

    if content_type.starts_with("image/") {
        medias.push(MediaReference::SingleImage(raw.url.clone()));
    } else if external_video.is_match(&raw.url) {
        medias.push(MediaReference::ExternalLink(raw.url.clone()));
    }

    medias
}

/// Build the immutable snapshot handed to the dispatcher
pub fn build_submission(
    raw: &RawSubmission,
    subreddit_icon: Option<String>,
    medias: Vec<MediaReference>,
) -> SubmissionData {
    SubmissionData {
        id: raw.id.clone(),
        title: raw.title.clone(),
        url: raw.url.clone(),
        body: raw.selftext.clone(),
        created_at: DateTime::<Utc>::from_timestamp(raw.created_utc as i64, 0).unwrap_or_default(),
        subreddit: raw.subreddit.clone(),
        subreddit_icon,
        author: raw.author_name(),
        upvotes: raw.score,
        replies: raw.num_comments,
        medias,
    }
}

/// Extract the post id following `/comments/` in a Reddit URL
pub fn extract_post_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/comments/([A-Za-z0-9]+)").ok()?;
    re.captures(url)
        .and_then(|cap| cap.get(1).map(|m| m.as_str().to_string()))
}

/// Client for the Reddit public JSON API
#[derive(Clone)]
pub struct RedditClient {
    http: HttpClient,
    base_url: String,
    post_url: Regex,
    external_video: Regex,
}

impl RedditClient {
    pub fn new(http: HttpClient, config: &AppConfig) -> PipelineResult<Self> {
        let post_url = Regex::new(&config.reddit_url_pattern)
            .map_err(|e| PipelineError::Config(format!("reddit_url_pattern: {}", e)))?;
        let external_video = Regex::new(&config.external_video_pattern)
            .map_err(|e| PipelineError::Config(format!("external_video_pattern: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.reddit_base_url.trim_end_matches('/').to_string(),
            post_url,
            external_video,
        })
    }

    /// True when `text` starts with a Reddit post URL
    pub fn is_reddit_url(&self, text: &str) -> bool {
        self.post_url.find(text).is_some_and(|m| m.start() == 0)
    }

    /// First Reddit post URL found anywhere in `text`
    pub fn find_reddit_url(&self, text: &str) -> Option<String> {
        self.post_url.find(text).map(|m| m.as_str().to_string())
    }

    /// Fetch a submission and classify its media. Single attempt, no retry.
    pub async fn fetch_submission(&self, url: &str) -> PipelineResult<SubmissionData> {
        if !self.is_reddit_url(url) {
            return Err(PipelineError::InvalidUrl(url.to_string()));
        }
        let post_id =
            extract_post_id(url).ok_or_else(|| PipelineError::InvalidUrl(url.to_string()))?;

        let endpoint = format!("{}/comments/{}.json?raw_json=1", self.base_url, post_id);
        let listings: Vec<serde_json::Value> = self.http.get_json(&endpoint).await?;
        let raw = parse_submission_listing(listings)?;

        let icon = self.fetch_subreddit_icon(&raw.subreddit).await;
        let medias = classify(&raw, &self.http, &self.external_video).await;

        log::info!(
            "Fetched submission {} from r/{} with {} media",
            raw.id,
            raw.subreddit,
            medias.len()
        );

        Ok(build_submission(&raw, icon, medias))
    }

    /// Icon of a subreddit, `None` when missing or unreachable
    async fn fetch_subreddit_icon(&self, subreddit: &str) -> Option<String> {
        if subreddit.is_empty() {
            return None;
        }
        let endpoint = format!("{}/r/{}/about.json?raw_json=1", self.base_url, subreddit);

        match self.http.get_json::<Thing<SubredditAbout>>(&endpoint).await {
            Ok(about) => pick_icon(about.data),
            Err(e) => {
                log::warn!("Could not load icon of r/{}: {}", subreddit, e);
                None
            }
        }
    }
}

fn pick_icon(about: SubredditAbout) -> Option<String> {
    [about.icon_img, about.community_icon]
        .into_iter()
        .flatten()
        .find(|icon| !icon.trim().is_empty())
}

/// The first listing of a comments page holds the submission itself
fn parse_submission_listing(listings: Vec<serde_json::Value>) -> PipelineResult<RawSubmission> {
    let first = listings
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Reddit("empty response".to_string()))?;

    let listing: Listing<RawSubmission> = serde_json::from_value(first)
        .map_err(|e| PipelineError::Reddit(format!("unexpected submission layout: {}", e)))?;

    listing
        .data
        .children
        .into_iter()
        .next()
        .map(|thing| thing.data)
        .ok_or_else(|| PipelineError::Reddit("submission not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{serve, Route};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every HEAD with a fixed content type and records the calls
    struct HeadOnly {
        content_type: Option<String>,
        heads: Mutex<Vec<String>>,
    }

    impl HeadOnly {
        fn new(content_type: Option<&str>) -> Self {
            Self {
                content_type: content_type.map(str::to_string),
                heads: Mutex::new(Vec::new()),
            }
        }

        fn head_count(&self) -> usize {
            self.heads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ByteFetcher for HeadOnly {
        async fn fetch(&self, _url: &str) -> Option<Vec<u8>> {
            None
        }

        async fn content_type(&self, url: &str) -> Option<String> {
            self.heads.lock().unwrap().push(url.to_string());
            self.content_type.clone()
        }
    }

    fn youtube() -> Regex {
        Regex::new(&AppConfig::default().external_video_pattern).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawSubmission {
        serde_json::from_value(value).unwrap()
    }

    fn gallery_post() -> serde_json::Value {
        json!({
            "id": "g1",
            "url": "https://www.reddit.com/gallery/g1",
            "gallery_data": {"items": [
                {"media_id": "b", "id": 2},
                {"media_id": "a", "id": 1},
                {"media_id": "c", "id": 3}
            ]},
            "media_metadata": {
                "a": {"status": "valid", "s": {"u": "https://preview.redd.it/a.jpg?width=640"}},
                "b": {"status": "valid", "s": {"u": "https://preview.redd.it/b.png"}},
                "c": {"status": "valid", "s": {"gif": "https://i.redd.it/c.gif"}}
            }
        })
    }

    #[tokio::test]
    async fn test_video_takes_priority() {
        let submission = raw(json!({
            "id": "v1",
            "url": "https://v.redd.it/v1",
            "is_video": true,
            "media": {"reddit_video": {"fallback_url": "https://v.redd.it/v1/DASH_720.mp4?source=fallback"}},
            "gallery_data": {"items": [{"media_id": "a"}]},
            "media_metadata": {"a": {"s": {"u": "https://preview.redd.it/a.jpg"}}}
        }));
        let fetcher = HeadOnly::new(Some("image/jpeg"));

        let medias = classify(&submission, &fetcher, &youtube()).await;

        assert_eq!(
            medias,
            vec![MediaReference::Video(
                "https://v.redd.it/v1/DASH_720.mp4?source=fallback".to_string()
            )]
        );
        assert_eq!(fetcher.head_count(), 0);
    }

    #[tokio::test]
    async fn test_crosspost_video_uses_parent_fallback() {
        let submission = raw(json!({
            "id": "x1",
            "is_video": true,
            "media": null,
            "crosspost_parent_list": [
                {"id": "p1", "media": {"reddit_video": {"fallback_url": "https://v.redd.it/p1/DASH_480.mp4"}}}
            ]
        }));
        let medias = classify(&submission, &HeadOnly::new(None), &youtube()).await;
        assert_eq!(
            medias,
            vec![MediaReference::Video(
                "https://v.redd.it/p1/DASH_480.mp4".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_gallery_preserves_order_and_count() {
        let submission = raw(gallery_post());
        let fetcher = HeadOnly::new(Some("text/html"));

        let medias = classify(&submission, &fetcher, &youtube()).await;

        assert_eq!(medias.len(), 3);
        assert_eq!(
            medias,
            vec![
                MediaReference::GalleryImage("https://preview.redd.it/b.png".to_string()),
                MediaReference::GalleryImage(
                    "https://preview.redd.it/a.jpg?width=640".to_string()
                ),
                MediaReference::GalleryImage("https://i.redd.it/c.gif".to_string()),
            ]
        );
        assert_eq!(fetcher.head_count(), 0);
    }

    #[tokio::test]
    async fn test_single_image_by_content_type() {
        let submission = raw(json!({"id": "i1", "url": "https://i.redd.it/cat.jpeg"}));
        let fetcher = HeadOnly::new(Some("image/jpeg"));

        let medias = classify(&submission, &fetcher, &youtube()).await;

        assert_eq!(
            medias,
            vec![MediaReference::SingleImage(
                "https://i.redd.it/cat.jpeg".to_string()
            )]
        );
        assert_eq!(fetcher.head_count(), 1);
    }

    #[tokio::test]
    async fn test_external_video_link() {
        let submission = raw(json!({"id": "y1", "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}));
        let medias = classify(&submission, &HeadOnly::new(Some("text/html")), &youtube()).await;
        assert_eq!(
            medias,
            vec![MediaReference::ExternalLink(
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_text_post_has_no_media() {
        let submission = raw(json!({
            "id": "t1",
            "url": "https://www.reddit.com/r/rust/comments/t1/hello/",
            "selftext": "just words"
        }));
        let medias = classify(&submission, &HeadOnly::new(Some("text/html")), &youtube()).await;
        assert!(medias.is_empty());

        // HEAD failure is treated like a non-image response
        let medias = classify(&submission, &HeadOnly::new(None), &youtube()).await;
        assert!(medias.is_empty());
    }

    #[test]
    fn test_deleted_author_is_empty() {
        assert_eq!(raw(json!({"author": null})).author_name(), "");
        assert_eq!(raw(json!({"author": "[deleted]"})).author_name(), "");
        assert_eq!(raw(json!({"author": "ferris"})).author_name(), "ferris");
    }

    #[test]
    fn test_build_submission() {
        let submission = raw(json!({
            "id": "abc123",
            "title": "A crab",
            "url": "https://i.redd.it/crab.png",
            "selftext": "",
            "created_utc": 1_700_000_000.0,
            "subreddit": "rustjerk",
            "author": null,
            "score": 42,
            "num_comments": 7
        }));
        let data = build_submission(&submission, None, Vec::new());

        assert_eq!(data.id, "abc123");
        assert_eq!(data.author, "");
        assert_eq!(data.upvotes, 42);
        assert_eq!(data.replies, 7);
        assert_eq!(data.created_at.timestamp(), 1_700_000_000);
        assert!(data.subreddit_icon.is_none());
    }

    #[test]
    fn test_extract_post_id() {
        assert_eq!(
            extract_post_id("https://www.reddit.com/r/rust/comments/1abcd2/some_title/"),
            Some("1abcd2".to_string())
        );
        assert_eq!(extract_post_id("https://www.reddit.com/r/rust/"), None);
    }

    #[test]
    fn test_reddit_url_matching() {
        let client =
            RedditClient::new(HttpClient::from_config(&AppConfig::default()).unwrap(), &AppConfig::default())
                .unwrap();

        assert!(client.is_reddit_url("https://www.reddit.com/r/rust/comments/1abcd2/some_title/"));
        assert!(!client.is_reddit_url("look https://www.reddit.com/r/rust/comments/1abcd2/x/"));
        assert!(!client.is_reddit_url("https://www.youtube.com/watch?v=abc"));
        assert_eq!(
            client.find_reddit_url("look at this https://reddit.com/r/aww/comments/zz9/cute_dog lol"),
            Some("https://reddit.com/r/aww/comments/zz9/cute_dog".to_string())
        );
    }

    #[tokio::test]
    async fn test_fetch_submission_rejects_foreign_url() {
        let config = AppConfig::default();
        let client = RedditClient::new(HttpClient::from_config(&config).unwrap(), &config).unwrap();
        let result = client.fetch_submission("https://example.com/not/reddit").await;
        assert!(matches!(result, Err(PipelineError::InvalidUrl(_))));
    }

    #[test]
    fn test_parse_submission_listing() {
        let listings = vec![
            json!({"kind": "Listing", "data": {"children": [
                {"kind": "t3", "data": {"id": "abc", "title": "hi", "is_video": false}}
            ]}}),
            json!({"kind": "Listing", "data": {"children": []}}),
        ];
        let parsed = parse_submission_listing(listings).unwrap();
        assert_eq!(parsed.id, "abc");
        assert_eq!(parsed.title, "hi");

        assert!(parse_submission_listing(Vec::new()).is_err());
    }

    #[test]
    fn test_pick_icon_skips_empty() {
        let about = SubredditAbout {
            icon_img: Some(String::new()),
            community_icon: Some("https://styles.redditmedia.com/icon.png".to_string()),
        };
        assert_eq!(
            pick_icon(about),
            Some("https://styles.redditmedia.com/icon.png".to_string())
        );
        assert_eq!(pick_icon(SubredditAbout::default()), None);
    }

    fn listing(post: serde_json::Value) -> String {
        json!([
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": post}]}},
            {"kind": "Listing", "data": {"children": []}}
        ])
        .to_string()
    }

    fn local_client(base: &str, external_video_pattern: Option<&str>) -> RedditClient {
        let mut config = AppConfig {
            reddit_base_url: base.to_string(),
            http_timeout_secs: 2,
            ..AppConfig::default()
        };
        if let Some(pattern) = external_video_pattern {
            config.external_video_pattern = pattern.to_string();
        }
        RedditClient::new(HttpClient::from_config(&config).unwrap(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_submission_single_image_end_to_end() {
        let post = json!({
            "id": "abc123",
            "title": "A cat",
            "url": "{base}/i/cat.png",
            "selftext": "",
            "created_utc": 1700000000.0,
            "subreddit": "pics",
            "author": "[deleted]",
            "score": 512,
            "num_comments": 31,
            "is_video": false,
            "media": null,
            "secure_media": null,
            "gallery_data": null,
            "media_metadata": null,
            "all_awardings": []
        });
        let about = json!({"kind": "t5", "data": {
            "icon_img": "",
            "community_icon": "https://styles.redditmedia.com/i.png?width=256&s=x"
        }});
        let base = serve(vec![
            Route::get("/comments/abc123.json", 200, "application/json", &listing(post)),
            Route::get("/r/pics/about.json", 200, "application/json", &about.to_string()),
            Route::head("/i/cat.png", "image/png"),
        ])
        .await;

        let submission = local_client(&base, None)
            .fetch_submission("https://www.reddit.com/r/pics/comments/abc123/a_cat/")
            .await
            .unwrap();

        assert_eq!(submission.id, "abc123");
        assert_eq!(submission.title, "A cat");
        assert_eq!(submission.author, "");
        assert_eq!(submission.subreddit, "pics");
        assert_eq!(
            submission.subreddit_icon.as_deref(),
            Some("https://styles.redditmedia.com/i.png?width=256&s=x")
        );
        assert_eq!(submission.upvotes, 512);
        assert_eq!(submission.replies, 31);
        assert_eq!(submission.created_at.timestamp(), 1_700_000_000);
        assert_eq!(
            submission.medias,
            vec![MediaReference::SingleImage(format!("{}/i/cat.png", base))]
        );
    }

    #[tokio::test]
    async fn test_fetch_submission_embedded_video_link() {
        // Shape of a YouTube link post: oembed media, no reddit_video
        let post = json!({
            "id": "yt42",
            "title": "Never gonna",
            "url": "{base}/watch?v=dQw4w9WgXcQ",
            "created_utc": 1650000000.5,
            "subreddit": "music",
            "author": "ferris",
            "score": 7,
            "num_comments": 0,
            "is_video": false,
            "media": {"type": "youtube.com", "oembed": {
                "provider_name": "YouTube",
                "type": "video",
                "thumbnail_url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
            }},
            "secure_media": {"type": "youtube.com", "oembed": {"provider_name": "YouTube"}},
            "gallery_data": null
        });
        let base = serve(vec![
            Route::get("/comments/yt42.json", 200, "application/json", &listing(post)),
            Route::head("/watch", "text/html; charset=utf-8"),
        ])
        .await;

        // Point the external video pattern at the loopback host
        let submission = local_client(&base, Some(r"/watch\?v="))
            .fetch_submission("https://www.reddit.com/r/music/comments/yt42/never_gonna/")
            .await
            .unwrap();

        assert_eq!(submission.author, "ferris");
        // about.json is not served, so no icon
        assert_eq!(submission.subreddit_icon, None);
        assert_eq!(
            submission.medias,
            vec![MediaReference::ExternalLink(format!(
                "{}/watch?v=dQw4w9WgXcQ",
                base
            ))]
        );
    }

    #[tokio::test]
    async fn test_fetch_submission_missing_post_is_error() {
        let base = serve(vec![]).await;
        let result = local_client(&base, None)
            .fetch_submission("https://www.reddit.com/r/pics/comments/nope1/gone/")
            .await;
        assert!(matches!(result, Err(PipelineError::Reddit(_))));
    }
}
