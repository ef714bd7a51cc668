//! AniList GraphQL catalog client.
//!
//! Rate-limit handling lives entirely inside this client: on a 429 (or
//! missing `X-Ratelimit-Remaining`) the request is retried once after
//! the server-indicated delay. Callers never re-enter a failed call.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shiori_model::{AnimeCollection, MediaEntry};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::platform::CatalogPlatform;

const API_URL: &str = "https://graphql.anilist.co";
const MAX_ATTEMPTS: u32 = 2;
const WARNING_DEBOUNCE: Duration = Duration::from_secs(10);

const MEDIA_FIELDS: &str = r#"
    id
    idMal
    title { romaji english native userPreferred }
    synonyms
    format
    status
    episodes
    startDate { year month day }
    nextAiringEpisode { episode airingAt }
"#;

const RELATION_FIELDS: &str = r#"
    relations {
        edges {
            relationType
            node { id format status }
        }
    }
"#;

/// Catalog client carrying an optional bearer token.
pub struct AnilistClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    /// Debounce for the user-facing rate-limit warning. Client-local so
    /// two clients never clobber each other's debounce.
    last_rate_limit_warning: Mutex<Option<Instant>>,
}

impl AnilistClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_url(API_URL.to_string(), token)
    }

    pub fn with_url(url: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            token,
            last_rate_limit_warning: Mutex::new(None),
        }
    }

    async fn graphql(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let body = json!({ "query": query, "variables": variables });

        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .http
                .post(&self.url)
                .header("Accept", "application/json")
                .json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ScanError::CatalogUnreachable(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_ATTEMPTS {
                    return Err(ScanError::TransientRemote(format!(
                        "rate limited after {MAX_ATTEMPTS} attempts"
                    )));
                }
                let delay = rate_limit_delay(response.headers());
                self.warn_rate_limited(delay).await;
                tokio::time::sleep(delay).await;
                continue;
            }
            if status.is_server_error() {
                return Err(ScanError::TransientRemote(format!(
                    "catalog responded {status}"
                )));
            }
            if !status.is_success() {
                return Err(ScanError::CatalogUnreachable(format!(
                    "catalog responded {status}"
                )));
            }
            if quota_header_missing(response.headers()) && attempt < MAX_ATTEMPTS {
                // AniList sends X-Ratelimit-Remaining on every response;
                // its absence means an intermediary answered instead.
                let delay = Duration::from_secs(5);
                self.warn_rate_limited(delay).await;
                tokio::time::sleep(delay).await;
                continue;
            }

            let payload: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ScanError::TransientRemote(e.to_string()))?;
            if let Some(errors) = payload.get("errors") {
                return Err(ScanError::TransientRemote(format!(
                    "graphql errors: {errors}"
                )));
            }
            return Ok(payload["data"].clone());
        }
        unreachable!("loop returns on the final attempt")
    }

    async fn warn_rate_limited(&self, delay: Duration) {
        let mut last = self.last_rate_limit_warning.lock().await;
        let now = Instant::now();
        let due = match *last {
            Some(t) => now.duration_since(t) >= WARNING_DEBOUNCE,
            None => true,
        };
        if due {
            warn!(target: "scanner::catalog", ?delay, "catalog rate limited, backing off");
            *last = Some(now);
        }
    }

    async fn fetch_entry(&self, id: i32, with_relations: bool) -> Result<MediaEntry> {
        let relations = if with_relations { RELATION_FIELDS } else { "" };
        let query = format!(
            "query ($id: Int) {{ Media(id: $id, type: ANIME) {{ {MEDIA_FIELDS} {relations} }} }}"
        );
        let data = self.graphql(&query, json!({ "id": id })).await?;
        parse_media(&data["Media"])
    }
}

/// Sleep hint for a rate-limited response: `Retry-After + 1` seconds
/// when the header is numeric, otherwise 5 s.
fn rate_limit_delay(headers: &reqwest::header::HeaderMap) -> Duration {
    let retry_after = headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match retry_after {
        Some(seconds) => Duration::from_secs(seconds + 1),
        None => Duration::from_secs(5),
    }
}

fn quota_header_missing(headers: &reqwest::header::HeaderMap) -> bool {
    !headers.contains_key("X-Ratelimit-Remaining")
}

#[async_trait]
impl CatalogPlatform for AnilistClient {
    async fn get_collection(&self, with_relations: bool) -> Result<AnimeCollection> {
        let relations = if with_relations { RELATION_FIELDS } else { "" };
        let query = format!(
            "query {{ MediaListCollection(type: ANIME) {{ lists {{ status entries {{ progress score media {{ {MEDIA_FIELDS} {relations} }} }} }} }} }}"
        );
        let data = self.graphql(&query, json!({})).await?;
        parse_collection(&data["MediaListCollection"])
    }

    async fn get_entry(&self, id: i32) -> Result<MediaEntry> {
        self.fetch_entry(id, false).await
    }

    async fn get_entry_with_relations(&self, id: i32) -> Result<MediaEntry> {
        self.fetch_entry(id, true).await
    }

    async fn get_entry_by_mal_id(&self, mal_id: i32) -> Result<MediaEntry> {
        let query = format!(
            "query ($idMal: Int) {{ Media(idMal: $idMal, type: ANIME) {{ {MEDIA_FIELDS} {RELATION_FIELDS} }} }}"
        );
        let data = self.graphql(&query, json!({ "idMal": mal_id })).await?;
        parse_media(&data["Media"])
    }

    async fn add_to_list(&self, ids: &[i32]) -> Result<()> {
        for id in ids {
            let query = "mutation ($mediaId: Int) { SaveMediaListEntry(mediaId: $mediaId, status: PLANNING) { id } }";
            if let Err(err) = self.graphql(query, json!({ "mediaId": id })).await {
                debug!(target: "scanner::catalog", media_id = id, %err, "add_to_list failed");
            }
        }
        Ok(())
    }
}

fn parse_media(value: &serde_json::Value) -> Result<MediaEntry> {
    if value.is_null() {
        return Err(ScanError::TransientRemote("media not found".to_string()));
    }
    let wire: WireMedia = serde_json::from_value(value.clone())
        .map_err(|e| ScanError::TransientRemote(format!("malformed media payload: {e}")))?;
    Ok(wire.into_entry())
}

fn parse_collection(value: &serde_json::Value) -> Result<AnimeCollection> {
    if value.is_null() {
        return Err(ScanError::CatalogUnreachable(
            "collection not found".to_string(),
        ));
    }
    let wire: WireCollection = serde_json::from_value(value.clone())
        .map_err(|e| ScanError::CatalogUnreachable(format!("malformed collection payload: {e}")))?;
    Ok(wire.into_collection())
}

// Wire structs mirror the GraphQL response shape and convert into the
// model types; relation edges are flattened to id-only nodes.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMedia {
    id: i32,
    #[serde(default)]
    id_mal: Option<i32>,
    #[serde(default)]
    title: shiori_model::MediaTitle,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    format: Option<shiori_model::MediaFormat>,
    #[serde(default)]
    status: Option<shiori_model::MediaStatus>,
    #[serde(default)]
    episodes: Option<i32>,
    #[serde(default)]
    start_date: Option<shiori_model::FuzzyDate>,
    #[serde(default)]
    next_airing_episode: Option<shiori_model::NextAiringEpisode>,
    #[serde(default)]
    relations: Option<WireRelations>,
}

#[derive(Debug, Deserialize)]
struct WireRelations {
    #[serde(default)]
    edges: Vec<WireEdge>,
}

#[derive(Debug, Deserialize)]
struct WireEdge {
    #[serde(rename = "relationType")]
    relation_type: Option<shiori_model::MediaRelation>,
    node: Option<WireNode>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    id: i32,
    #[serde(default)]
    format: Option<shiori_model::MediaFormat>,
    #[serde(default)]
    status: Option<shiori_model::MediaStatus>,
}

impl WireMedia {
    fn into_entry(self) -> MediaEntry {
        let relations = self
            .relations
            .map(|r| {
                r.edges
                    .into_iter()
                    .filter_map(|edge| {
                        let relation = edge.relation_type?;
                        let node = edge.node?;
                        Some(shiori_model::MediaEdge {
                            relation,
                            node: shiori_model::RelatedNode {
                                id: node.id,
                                format: node.format,
                                status: node.status,
                            },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        MediaEntry {
            id: self.id,
            id_mal: self.id_mal,
            title: self.title,
            synonyms: self.synonyms,
            format: self.format,
            status: self.status,
            episodes: self.episodes,
            next_airing_episode: self.next_airing_episode,
            start_date: self.start_date,
            relations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCollection {
    #[serde(default)]
    lists: Vec<WireList>,
}

#[derive(Debug, Deserialize)]
struct WireList {
    #[serde(default)]
    status: Option<shiori_model::ListStatus>,
    #[serde(default)]
    entries: Vec<WireListEntry>,
}

#[derive(Debug, Deserialize)]
struct WireListEntry {
    media: WireMedia,
    #[serde(default)]
    progress: Option<i32>,
    #[serde(default)]
    score: Option<f64>,
}

impl WireCollection {
    fn into_collection(self) -> AnimeCollection {
        AnimeCollection {
            lists: self
                .lists
                .into_iter()
                .map(|list| shiori_model::CollectionList {
                    status: list.status,
                    entries: list
                        .entries
                        .into_iter()
                        .map(|entry| shiori_model::CollectionEntry {
                            media: entry.media.into_entry(),
                            progress: entry.progress,
                            score: entry.score,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
