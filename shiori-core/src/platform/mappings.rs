//! Episode-metadata and cross-platform id-mapping provider.
//!
//! Speaks the ani.zip mappings API: one GET per entry returns the
//! id mappings plus the full per-episode table (relative number,
//! absolute number, air date) keyed by canonical episode id. Responses
//! are cached for the lifetime of the client.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Deserialize;
use shiori_model::{AnimeMetadata, EpisodeMetadata, ExternalMappings};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::platform::{MetadataPlatform, MetadataProvider};

const API_URL: &str = "https://api.ani.zip/mappings";

pub struct MappingsClient {
    http: reqwest::Client,
    url: String,
    cache: DashMap<(MetadataPlatform, i32), AnimeMetadata>,
}

impl MappingsClient {
    pub fn new() -> Self {
        Self::with_url(API_URL.to_string())
    }

    pub fn with_url(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            cache: DashMap::new(),
        }
    }
}

impl Default for MappingsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for MappingsClient {
    async fn anime_metadata(&self, platform: MetadataPlatform, id: i32) -> Result<AnimeMetadata> {
        if let Some(cached) = self.cache.get(&(platform, id)) {
            return Ok(cached.clone());
        }

        let param = match platform {
            MetadataPlatform::Anilist => "anilist_id",
            MetadataPlatform::Mal => "mal_id",
        };
        let response = self
            .http
            .get(&self.url)
            .query(&[(param, id.to_string())])
            .send()
            .await
            .map_err(|e| ScanError::TransientRemote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScanError::TransientRemote(format!(
                "mappings provider responded {} for {} {id}",
                response.status(),
                platform.as_str()
            )));
        }

        let wire: WireMetadata = response
            .json()
            .await
            .map_err(|e| ScanError::TransientRemote(format!("malformed mappings payload: {e}")))?;
        let metadata = wire.into_metadata();
        debug!(
            target: "scanner::mappings",
            platform = platform.as_str(),
            id,
            episodes = metadata.episodes.len(),
            "fetched episode metadata"
        );
        self.cache.insert((platform, id), metadata.clone());
        Ok(metadata)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    #[serde(default)]
    episodes: HashMap<String, WireEpisode>,
    #[serde(default)]
    episode_count: i32,
    #[serde(default)]
    special_count: i32,
    #[serde(default)]
    mappings: WireMappings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEpisode {
    #[serde(default)]
    episode_number: i32,
    #[serde(default)]
    absolute_episode_number: i32,
    #[serde(default)]
    air_date: Option<String>,
    #[serde(default)]
    title: Option<WireEpisodeTitle>,
}

/// ani.zip episode titles come as a language map; `en` preferred.
#[derive(Debug, Deserialize)]
struct WireEpisodeTitle {
    #[serde(default)]
    en: Option<String>,
    #[serde(rename = "x-jat", default)]
    x_jat: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMappings {
    #[serde(default)]
    anilist_id: Option<i32>,
    #[serde(default)]
    mal_id: Option<i32>,
    #[serde(default)]
    anidb_id: Option<i32>,
}

impl WireMetadata {
    fn into_metadata(self) -> AnimeMetadata {
        AnimeMetadata {
            episodes: self
                .episodes
                .into_iter()
                .map(|(key, ep)| {
                    (
                        key,
                        EpisodeMetadata {
                            episode_number: ep.episode_number,
                            absolute_episode_number: ep.absolute_episode_number,
                            air_date: ep
                                .air_date
                                .as_deref()
                                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                            title: ep.title.and_then(|t| t.en.or(t.x_jat)),
                        },
                    )
                })
                .collect(),
            episode_count: self.episode_count,
            special_count: self.special_count,
            mappings: ExternalMappings {
                anilist_id: self.mappings.anilist_id,
                mal_id: self.mappings.mal_id,
                anidb_id: self.mappings.anidb_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_metadata_converts_episode_table() {
        let wire: WireMetadata = serde_json::from_value(serde_json::json!({
            "episodes": {
                "1": {
                    "episodeNumber": 1,
                    "absoluteEpisodeNumber": 12,
                    "airDate": "2021-10-03",
                    "title": { "en": "The Spearhead Squadron" }
                },
                "S1": { "episodeNumber": 1, "absoluteEpisodeNumber": 0 }
            },
            "episodeCount": 12,
            "specialCount": 1,
            "mappings": { "anilist_id": 131586, "mal_id": 48569 }
        }))
        .unwrap();
        let meta = wire.into_metadata();
        let ep1 = meta.first_episode().unwrap();
        assert_eq!(ep1.absolute_episode_number, 12);
        assert_eq!(ep1.air_date, NaiveDate::from_ymd_opt(2021, 10, 3));
        assert_eq!(ep1.title.as_deref(), Some("The Spearhead Squadron"));
        assert_eq!(meta.mappings.anilist_id, Some(131586));
        assert_eq!(meta.main_episode_count(), 1);
    }
}
