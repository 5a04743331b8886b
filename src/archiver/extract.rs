//! URL extraction from harvested content
//!
//! Pure scan over an item's text fields. A post's selftext wins over its
//! external link; a post with neither yields nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::archiver::reddit::ContentItem;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("URL regex"));

/// Returns the candidate URLs in an item, in document order.
pub fn extract_urls(item: &ContentItem) -> Vec<String> {
    match item {
        ContentItem::Post(post) => match &post.selftext {
            Some(text) if !text.is_empty() => links_in(text),
            _ => post.url.clone().into_iter().collect(),
        },
        ContentItem::Comment(comment) => links_in(&comment.body),
    }
}

fn links_in(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .collect()
}
