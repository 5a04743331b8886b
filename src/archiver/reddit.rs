//! Reddit API client for Reddit Archiver
//!
//! Fetches a user's combined post/comment listing (newest first), the top
//! listing of a subreddit for author discovery, and performs the one login
//! the daemon needs at startup. Listing children are converted into the
//! `ContentItem` sum type; everything downstream dispatches on the variant.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::archiver::config::Http;

const REDDIT_BASE: &str = "https://www.reddit.com";

/// Error types for the Reddit client
#[derive(Error, Debug)]
pub enum RedditError {
    #[error("account not found")]
    NotFound,

    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("login rejected: {0}")]
    Auth(String),
}

/// Result type for Reddit operations
pub type RedditResult<T> = Result<T, RedditError>;

/// A harvested post.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: i64,
    pub title: String,
    pub selftext: Option<String>,
    pub url: Option<String>,
}

/// A harvested comment.
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: i64,
    pub body: String,
    pub post_id: String,
}

/// A post or comment, dispatched by pattern match.
#[derive(Debug, Clone)]
pub enum ContentItem {
    Post(Post),
    Comment(Comment),
}

impl ContentItem {
    pub fn id(&self) -> &str {
        match self {
            ContentItem::Post(p) => &p.id,
            ContentItem::Comment(c) => &c.id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            ContentItem::Post(p) => &p.author,
            ContentItem::Comment(c) => &c.author,
        }
    }

    pub fn subreddit(&self) -> &str {
        match self {
            ContentItem::Post(p) => &p.subreddit,
            ContentItem::Comment(c) => &c.subreddit,
        }
    }

    pub fn permalink(&self) -> &str {
        match self {
            ContentItem::Post(p) => &p.permalink,
            ContentItem::Comment(c) => &c.permalink,
        }
    }
}

/// Source of content items. The pipeline and scheduler are generic over this
/// seam so tests can run against canned listings.
pub trait ItemSource {
    /// Fetch a user's items newest-first, stopping at `since` (exclusive)
    /// and reading at most `max_pages` listing pages. Fails with
    /// `RedditError::NotFound` when the account no longer exists.
    fn fetch_user_items(
        &self,
        handle: &str,
        since: Option<&str>,
        max_pages: usize,
    ) -> RedditResult<Vec<ContentItem>>;

    /// Fetch the top posts of a subreddit for the given window.
    fn fetch_top(&self, subreddit: &str, window: &str) -> RedditResult<Vec<ContentItem>>;
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct ListingChild {
    kind: String,
    data: Value,
}

/// Blocking client against the public JSON listing endpoints.
pub struct RedditClient {
    client: Client,
    page_size: usize,
    session: Mutex<Option<String>>,
}

impl RedditClient {
    pub fn new(http: &Http, page_size: usize) -> RedditResult<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            page_size,
            session: Mutex::new(None),
        })
    }

    /// Log in with the stored credentials. The session cookie is attached to
    /// subsequent listing requests; accounts configured for 100-item pages
    /// make polling cheaper.
    pub fn login(&self, username: &str, secret: &str) -> RedditResult<()> {
        let url = format!("{REDDIT_BASE}/api/login/{username}");
        let response = self
            .client
            .post(&url)
            .form(&[
                ("user", username),
                ("passwd", secret),
                ("api_type", "json"),
            ])
            .send()?;
        if !response.status().is_success() {
            return Err(RedditError::Status(response.status().as_u16()));
        }

        let body: Value = response.json()?;
        let json = &body["json"];
        if let Some(errors) = json["errors"].as_array() {
            if !errors.is_empty() {
                return Err(RedditError::Auth(errors[0].to_string()));
            }
        }
        let cookie = json["data"]["cookie"]
            .as_str()
            .ok_or_else(|| RedditError::Auth("no session cookie in response".to_string()))?;
        *self.session.lock() = Some(format!("reddit_session={cookie}"));
        Ok(())
    }

    fn get_listing(&self, url: &str) -> RedditResult<Listing> {
        let mut request = self.client.get(url);
        let session = self.session.lock().clone();
        if let Some(cookie) = session {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(RedditError::NotFound),
            status if !status.is_success() => Err(RedditError::Status(status.as_u16())),
            _ => Ok(response.json()?),
        }
    }
}

impl ItemSource for RedditClient {
    fn fetch_user_items(
        &self,
        handle: &str,
        since: Option<&str>,
        max_pages: usize,
    ) -> RedditResult<Vec<ContentItem>> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        'pages: for _ in 0..max_pages.max(1) {
            let mut url = format!(
                "{REDDIT_BASE}/user/{handle}.json?limit={}&raw_json=1",
                self.page_size
            );
            if let Some(cursor) = &after {
                url.push_str("&after=");
                url.push_str(cursor);
            }

            let listing = self.get_listing(&url)?;
            if listing.data.children.is_empty() {
                break;
            }
            for child in &listing.data.children {
                let Some(item) = child_to_item(&child.kind, &child.data) else {
                    continue;
                };
                if since == Some(item.id()) {
                    break 'pages;
                }
                items.push(item);
            }

            match listing.data.after {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(items)
    }

    fn fetch_top(&self, subreddit: &str, window: &str) -> RedditResult<Vec<ContentItem>> {
        let url = format!("{REDDIT_BASE}/r/{subreddit}/top.json?t={window}&limit=100&raw_json=1");
        let listing = self.get_listing(&url)?;
        Ok(listing
            .data
            .children
            .iter()
            .filter_map(|child| child_to_item(&child.kind, &child.data))
            .collect())
    }
}

/// Convert a listing child into a `ContentItem`. Kinds other than `t1`
/// (comment) and `t3` (post) are skipped.
fn child_to_item(kind: &str, data: &Value) -> Option<ContentItem> {
    let id = data["id"].as_str()?.to_string();
    let author = data["author"].as_str()?.to_string();
    let subreddit = data["subreddit"].as_str()?.to_string();
    let created_utc = data["created_utc"].as_f64().unwrap_or(0.0) as i64;

    match kind {
        "t3" => {
            let permalink = format!(
                "{REDDIT_BASE}{}",
                data["permalink"].as_str().unwrap_or_default()
            );
            let selftext = data["selftext"]
                .as_str()
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            let url = data["url"]
                .as_str()
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            Some(ContentItem::Post(Post {
                id,
                author,
                subreddit,
                permalink,
                created_utc,
                title: data["title"].as_str().unwrap_or_default().to_string(),
                selftext,
                url,
            }))
        }
        "t1" => {
            let post_id = data["link_id"]
                .as_str()?
                .trim_start_matches("t3_")
                .to_string();
            let permalink =
                format!("{REDDIT_BASE}/r/{subreddit}/comments/{post_id}/_/{id}");
            Some(ContentItem::Comment(Comment {
                id,
                author,
                subreddit,
                permalink,
                created_utc,
                body: data["body"].as_str().unwrap_or_default().to_string(),
                post_id,
            }))
        }
        _ => None,
    }
}
