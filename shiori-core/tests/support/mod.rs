//! In-process fakes for the external platforms, plus builders for
//! catalog entries and episode metadata.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use shiori_core::ScanError;
use shiori_core::platform::{
    CatalogPlatform, MalSearch, MalSearchResult, MetadataPlatform, MetadataProvider,
};
use shiori_model::{
    AnimeCollection, AnimeMetadata, CollectionEntry, CollectionList, EpisodeMetadata,
    ExternalMappings, ListStatus, MediaEdge, MediaEntry, MediaFormat, MediaRelation, MediaStatus,
    MediaTitle, RelatedNode,
};

/// Route stage logs through the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Catalog fake: a fixed entry arena plus a list of collection ids.
#[derive(Default)]
pub struct FakeCatalog {
    entries: HashMap<i32, MediaEntry>,
    collection_ids: Vec<i32>,
    pub added_to_list: Mutex<Vec<i32>>,
    pub fetches: Mutex<Vec<i32>>,
}

impl FakeCatalog {
    pub fn new(entries: Vec<MediaEntry>, collection_ids: Vec<i32>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
            collection_ids,
            added_to_list: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogPlatform for FakeCatalog {
    async fn get_collection(&self, _with_relations: bool) -> Result<AnimeCollection, ScanError> {
        let entries = self
            .collection_ids
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .map(|media| CollectionEntry { media, progress: None, score: None })
            .collect();
        Ok(AnimeCollection {
            lists: vec![CollectionList { status: Some(ListStatus::Current), entries }],
        })
    }

    async fn get_entry(&self, id: i32) -> Result<MediaEntry, ScanError> {
        self.get_entry_with_relations(id).await
    }

    async fn get_entry_with_relations(&self, id: i32) -> Result<MediaEntry, ScanError> {
        self.fetches.lock().unwrap().push(id);
        self.entries
            .get(&id)
            .cloned()
            .ok_or_else(|| ScanError::TransientRemote(format!("no entry {id}")))
    }

    async fn get_entry_by_mal_id(&self, mal_id: i32) -> Result<MediaEntry, ScanError> {
        self.entries
            .values()
            .find(|e| e.id_mal == Some(mal_id))
            .cloned()
            .ok_or_else(|| ScanError::TransientRemote(format!("no entry for mal {mal_id}")))
    }

    async fn add_to_list(&self, ids: &[i32]) -> Result<(), ScanError> {
        self.added_to_list.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

/// A catalog whose collection call always fails.
pub struct UnreachableCatalog;

#[async_trait]
impl CatalogPlatform for UnreachableCatalog {
    async fn get_collection(&self, _with_relations: bool) -> Result<AnimeCollection, ScanError> {
        Err(ScanError::CatalogUnreachable("connection refused".into()))
    }

    async fn get_entry(&self, _id: i32) -> Result<MediaEntry, ScanError> {
        Err(ScanError::CatalogUnreachable("connection refused".into()))
    }

    async fn get_entry_with_relations(&self, _id: i32) -> Result<MediaEntry, ScanError> {
        Err(ScanError::CatalogUnreachable("connection refused".into()))
    }

    async fn get_entry_by_mal_id(&self, _mal_id: i32) -> Result<MediaEntry, ScanError> {
        Err(ScanError::CatalogUnreachable("connection refused".into()))
    }

    async fn add_to_list(&self, _ids: &[i32]) -> Result<(), ScanError> {
        Err(ScanError::CatalogUnreachable("connection refused".into()))
    }
}

/// MAL search fake keyed by lowercase query substring.
#[derive(Default)]
pub struct FakeMal {
    results: Vec<(String, Vec<MalSearchResult>)>,
}

impl FakeMal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query_contains: &str, results: Vec<MalSearchResult>) -> Self {
        self.results.push((query_contains.to_lowercase(), results));
        self
    }
}

#[async_trait]
impl MalSearch for FakeMal {
    async fn search(&self, title: &str) -> Result<Vec<MalSearchResult>, ScanError> {
        let title = title.to_lowercase();
        Ok(self
            .results
            .iter()
            .find(|(needle, _)| title.contains(needle))
            .map(|(_, results)| results.clone())
            .unwrap_or_default())
    }
}

/// Episode-metadata fake keyed by `(platform, id)`.
#[derive(Default)]
pub struct FakeMetadata {
    metadata: HashMap<(&'static str, i32), AnimeMetadata>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anilist(mut self, id: i32, metadata: AnimeMetadata) -> Self {
        self.metadata.insert(("anilist", id), metadata);
        self
    }

    pub fn with_mal(mut self, id: i32, metadata: AnimeMetadata) -> Self {
        self.metadata.insert(("mal", id), metadata);
        self
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn anime_metadata(
        &self,
        platform: MetadataPlatform,
        id: i32,
    ) -> Result<AnimeMetadata, ScanError> {
        self.metadata
            .get(&(platform.as_str(), id))
            .cloned()
            .ok_or_else(|| {
                ScanError::TransientRemote(format!("no metadata for {} {id}", platform.as_str()))
            })
    }
}

pub fn entry(id: i32, romaji: &str, english: Option<&str>, episodes: Option<i32>) -> MediaEntry {
    MediaEntry {
        id,
        title: MediaTitle {
            romaji: Some(romaji.to_string()),
            english: english.map(str::to_string),
            ..Default::default()
        },
        format: Some(MediaFormat::Tv),
        status: Some(MediaStatus::Finished),
        episodes,
        ..Default::default()
    }
}

pub fn movie(id: i32, romaji: &str) -> MediaEntry {
    MediaEntry {
        format: Some(MediaFormat::Movie),
        episodes: Some(1),
        ..entry(id, romaji, None, Some(1))
    }
}

pub fn relate(entry: &mut MediaEntry, relation: MediaRelation, other: &MediaEntry) {
    entry.relations.push(MediaEdge {
        relation,
        node: RelatedNode {
            id: other.id,
            format: other.format,
            status: other.status,
        },
    });
}

/// Metadata whose main episodes are `1..=count`, with episode 1 sitting
/// at `abs_start` on the absolute timeline.
pub fn metadata(abs_start: i32, count: i32, air: Option<(i32, u32, u32)>) -> AnimeMetadata {
    metadata_part(abs_start, 1, count, air)
}

/// Like [`metadata`] but with episode 1 reporting `rel_start` as its
/// relative number (a part-N split).
pub fn metadata_part(
    abs_start: i32,
    rel_start: i32,
    count: i32,
    air: Option<(i32, u32, u32)>,
) -> AnimeMetadata {
    let air_date = air.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
    let mut episodes = HashMap::new();
    for offset in 0..count {
        episodes.insert(
            (offset + 1).to_string(),
            EpisodeMetadata {
                episode_number: rel_start + offset,
                absolute_episode_number: abs_start + offset,
                air_date: air_date.and_then(|d| d.checked_add_days(chrono::Days::new(7 * offset as u64))),
                title: None,
            },
        );
    }
    AnimeMetadata {
        episodes,
        episode_count: count,
        special_count: 0,
        mappings: ExternalMappings::default(),
    }
}
