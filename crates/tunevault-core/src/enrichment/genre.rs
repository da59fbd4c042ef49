//! Genre lookup from last.fm track tags.

use super::{fetch_html, LookupProvider, LookupQuery};
use crate::config::LookupConfig;
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static TAG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ol.big-tags .big-tags-item-name a").unwrap());

/// Builds the genre field from the top last.fm tags of a track.
pub struct LastFmGenreProvider {
    client: Client,
    root_url: String,
}

impl LastFmGenreProvider {
    pub fn new(client: Client) -> Self {
        Self::with_root_url(client, LookupConfig::GENRE_ROOT_URL)
    }

    pub fn with_root_url(client: Client, root_url: impl Into<String>) -> Self {
        Self {
            client,
            root_url: root_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn tags_url(&self, query: &LookupQuery) -> String {
        format!(
            "{}/{}/_/{}/+tags",
            self.root_url,
            urlencoding::encode(&query.artist),
            urlencoding::encode(&query.full_title)
        )
    }
}

#[async_trait]
impl LookupProvider for LastFmGenreProvider {
    type Output = String;

    fn name(&self) -> &'static str {
        "genre"
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<String> {
        let page = fetch_html(self.client.get(self.tags_url(query))).await?;
        let tags = parse_genre_tags(&page);
        if tags.is_empty() {
            return Err(VaultError::NoDataFound);
        }
        Ok(format_genre(&tags))
    }
}

/// Tag names in page order.
pub fn parse_genre_tags(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&TAG_SELECTOR)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Join the leading tags as `Tag One/Tag Two`.
pub fn format_genre(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .take(LookupConfig::MAX_GENRE_TAGS)
        .map(|tag| {
            tag.split_whitespace()
                .map(title_case)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("/")
}
