//! MyAnimeList prefix-search wrapper.
//!
//! Returns the raw ranked results; scoring adjustments (dropping
//! unaired entries, the pre-2006 penalty) are applied by the fetcher.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::platform::MalSearch;

const SEARCH_URL: &str = "https://myanimelist.net/search/prefix.json";

/// One ranked hit from the MAL search endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MalSearchResult {
    pub id: i32,
    pub name: String,
    /// MAL's relevance score for the query.
    pub es_score: f64,
    pub status: String,
    pub start_year: Option<i32>,
}

impl MalSearchResult {
    pub fn is_not_yet_aired(&self) -> bool {
        self.status.eq_ignore_ascii_case("not yet aired")
    }
}

pub struct MalClient {
    http: reqwest::Client,
    url: String,
}

impl MalClient {
    pub fn new() -> Self {
        Self::with_url(SEARCH_URL.to_string())
    }

    pub fn with_url(url: String) -> Self {
        Self { http: reqwest::Client::new(), url }
    }
}

impl Default for MalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MalSearch for MalClient {
    async fn search(&self, title: &str) -> Result<Vec<MalSearchResult>> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("type", "anime"), ("keyword", title), ("v", "1")])
            .send()
            .await
            .map_err(|e| ScanError::TransientRemote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScanError::TransientRemote(format!(
                "mal search responded {}",
                response.status()
            )));
        }

        let wire: WireSearch = response
            .json()
            .await
            .map_err(|e| ScanError::TransientRemote(format!("malformed search payload: {e}")))?;

        let results = wire.into_results();
        debug!(target: "scanner::mal", title, hits = results.len(), "search complete");
        Ok(results)
    }
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: i32,
    name: String,
    #[serde(default)]
    es_score: f64,
    #[serde(default)]
    payload: WirePayload,
}

#[derive(Debug, Default, Deserialize)]
struct WirePayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    start_year: Option<i32>,
}

impl WireSearch {
    fn into_results(self) -> Vec<MalSearchResult> {
        self.categories
            .into_iter()
            .filter(|c| c.kind == "anime")
            .flat_map(|c| c.items)
            .map(|item| MalSearchResult {
                id: item.id,
                name: item.name,
                es_score: item.es_score,
                status: item.payload.status,
                start_year: item.payload.start_year,
            })
            .collect()
    }
}
