use crate::{EngineError, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

const FEED_FETCH_TIMEOUT_SECS: u64 = 30;
const FEED_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

/// One declared remote video, as published by the feed.
///
/// `id` is `"<source>_<sourceid>"` (e.g. `"yt_dQw4w9WgXcQ"`) and doubles as
/// the cache filename stem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub name: String,
    pub url: String,
    pub date: String,
    pub duration: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FeedItem {
    /// The `<source>` half of the id.
    pub fn source(&self) -> &str {
        self.id.split_once('_').map(|(source, _)| source).unwrap_or("")
    }
}

/// The ordered, validated video catalog. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct VideoFeed {
    pub items: Vec<FeedItem>,
}

impl VideoFeed {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<VideoFeed> {
        let items: Vec<FeedItem> = serde_json::from_slice(bytes)?;
        for item in &items {
            validate_item(item)?;
        }
        Ok(VideoFeed { items })
    }

    pub fn from_file(path: &Path) -> Result<VideoFeed> {
        let bytes = std::fs::read(path)?;
        Self::from_json_bytes(&bytes)
    }

    pub fn from_url(url: &str) -> Result<VideoFeed> {
        let agent = build_http_agent(FEED_FETCH_TIMEOUT_SECS);
        let mut response = agent.get(url).call().map_err(|err| EngineError::FeedFetch {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(EngineError::FeedFetch {
                url: url.to_string(),
                reason: format!("http {status}"),
            });
        }

        let mut bytes = Vec::new();
        response
            .body_mut()
            .as_reader()
            .take(FEED_MAX_BODY_BYTES)
            .read_to_end(&mut bytes)?;
        Self::from_json_bytes(&bytes)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a VideoFeed {
    type Item = &'a FeedItem;
    type IntoIter = std::slice::Iter<'a, FeedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn build_http_agent(timeout_secs: u64) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(timeout_secs.max(1))))
        .build()
        .into()
}

fn validate_item(item: &FeedItem) -> Result<()> {
    match item.id.split_once('_') {
        Some((source, sourceid)) if !source.is_empty() && !sourceid.is_empty() => {}
        _ => {
            return Err(EngineError::FeedInvalid(format!(
                "item id is not of the form <source>_<sourceid>: {:?}",
                item.id
            )));
        }
    }
    Url::parse(&item.url).map_err(|e| {
        EngineError::FeedInvalid(format!("item {} has an invalid url: {e}", item.id))
    })?;
    Ok(())
}
