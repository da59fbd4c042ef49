//! Tempo and key lookup against songbpm.com.
//!
//! The site has no API: a form search returns result cards, the card whose
//! artist, title and duration match is followed, and the track page prose is
//! scraped for tempo, key and mode.

use super::{fetch_html, LookupProvider, LookupQuery, TempoKey};
use crate::config::LookupConfig;
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

static TEMPO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tempo of <span[^>]*>(\d+) BPM").unwrap());

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"with a <span[^>]*>([A-G](?:♯|#|♭|b)?(?:/[A-G](?:♯|#|♭|b)?)?)</span> key")
        .unwrap()
});

static MODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"a\s+<span[^>]*>([a-z]+)</span> mode").unwrap());

static CARD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.flex.flex-col").unwrap());

static STAT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.flex-1.flex-col.items-center").unwrap());

static STAT_VALUE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.text-2xl").unwrap());

/// Looks up tempo and key on songbpm.com.
pub struct SongBpmProvider {
    client: Client,
    root_url: String,
}

impl SongBpmProvider {
    pub fn new(client: Client) -> Self {
        Self::with_root_url(client, LookupConfig::TEMPO_ROOT_URL)
    }

    pub fn with_root_url(client: Client, root_url: impl Into<String>) -> Self {
        Self {
            client,
            root_url: root_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LookupProvider for SongBpmProvider {
    type Output = TempoKey;

    fn name(&self) -> &'static str {
        "BPM and key"
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<TempoKey> {
        let search = format!("{} {}", query.artist, query.title);
        let results = fetch_html(
            self.client
                .post(format!("{}/searches", self.root_url))
                .header("Origin", &self.root_url)
                .form(&[("query", search.as_str())]),
        )
        .await?;

        let link = find_song_link(&results, &query.artist, &query.title, query.duration_secs)?;
        let url = format!("{}{}", self.root_url, link);
        debug!("Tempo lookup for {} - {} matched {}", query.artist, query.title, url);

        let page = fetch_html(self.client.get(&url)).await?;
        parse_tempo_key(&page)
    }
}

/// Parse `m:ss` into seconds.
fn parse_duration(text: &str) -> Option<i64> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    Some(minutes.trim().parse::<i64>().ok()? * 60 + seconds.trim().parse::<i64>().ok()?)
}

/// Pick the search result matching the track, returning its relative link.
pub fn find_song_link(html: &str, artist: &str, title: &str, duration_secs: u32) -> Result<String> {
    let document = Html::parse_document(html);
    let artist = artist.to_lowercase();
    let title = title.to_lowercase();
    let wanted = i64::from(duration_secs);

    for card in document.select(&CARD_SELECTOR) {
        let text = card.text().collect::<String>().to_lowercase();
        if !text.contains(&title) || !text.contains(&artist) {
            continue;
        }

        // Second stat column holds the duration.
        let Some(found) = card
            .select(&STAT_SELECTOR)
            .nth(1)
            .and_then(|stat| stat.select(&STAT_VALUE_SELECTOR).next())
            .and_then(|value| parse_duration(&value.text().collect::<String>()))
        else {
            continue;
        };

        if (found - wanted).abs() >= LookupConfig::DURATION_TOLERANCE_SECS {
            continue;
        }

        if let Some(href) = card.value().attr("href") {
            return Ok(href.to_string());
        }
    }

    Err(VaultError::NoDataFound)
}

/// Extract tempo and key from a track page.
///
/// Keys are normalized to ASCII accidentals, only the first of an enharmonic
/// pair is kept, and minor keys get an `m` suffix.
pub fn parse_tempo_key(html: &str) -> Result<TempoKey> {
    let bpm = TEMPO_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(VaultError::NoDataFound)?;
    let key = KEY_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(VaultError::NoDataFound)?;
    let mode = MODE_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(VaultError::NoDataFound)?;

    let mut key = key
        .as_str()
        .split('/')
        .next()
        .unwrap_or_default()
        .replace('♯', "#")
        .replace('♭', "b");
    if mode.as_str() == "minor" && !key.ends_with('m') {
        key.push('m');
    }

    Ok(TempoKey {
        bpm: bpm.as_str().to_string(),
        key,
    })
}
