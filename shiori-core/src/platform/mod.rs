//! External service interfaces: the catalog platform, the MAL title
//! search and the episode-metadata (id mapping) provider.
//!
//! The pipeline only ever talks to these traits; real clients live in
//! the submodules, tests substitute in-process fakes.

use async_trait::async_trait;
use dashmap::DashMap;
use shiori_model::{AnimeCollection, AnimeMetadata, MediaEntry};

use crate::error::Result;

pub mod anilist;
pub mod mal;
pub mod mappings;

pub use anilist::AnilistClient;
pub use mal::{MalClient, MalSearchResult};
pub use mappings::MappingsClient;

/// The catalog provider (AniList-shaped GraphQL).
#[async_trait]
pub trait CatalogPlatform: Send + Sync {
    /// The user's collection in a single call.
    async fn get_collection(&self, with_relations: bool) -> Result<AnimeCollection>;

    async fn get_entry(&self, id: i32) -> Result<MediaEntry>;

    async fn get_entry_with_relations(&self, id: i32) -> Result<MediaEntry>;

    async fn get_entry_by_mal_id(&self, mal_id: i32) -> Result<MediaEntry>;

    /// Best-effort; callers ignore failures.
    async fn add_to_list(&self, ids: &[i32]) -> Result<()>;
}

/// Ranked external title search (MyAnimeList-shaped).
#[async_trait]
pub trait MalSearch: Send + Sync {
    async fn search(&self, title: &str) -> Result<Vec<MalSearchResult>>;
}

/// Which external platform an id belongs to when asking the metadata
/// provider for mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataPlatform {
    Anilist,
    Mal,
}

impl MetadataPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anilist => "anilist",
            Self::Mal => "mal",
        }
    }
}

/// Episode metadata and cross-platform id mappings per entry.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn anime_metadata(&self, platform: MetadataPlatform, id: i32) -> Result<AnimeMetadata>;
}

/// Read-mostly per-scan cache of fetched entries, keyed by catalog id.
/// Written only by the fetcher and the tree builder.
#[derive(Debug, Default)]
pub struct EntryCache {
    entries: DashMap<i32, MediaEntry>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i32) -> Option<MediaEntry> {
        self.entries.get(&id).map(|e| e.clone())
    }

    pub fn contains(&self, id: i32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn insert(&self, entry: MediaEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all cached entries, ascending by id.
    pub fn snapshot(&self) -> Vec<MediaEntry> {
        let mut entries: Vec<MediaEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.id);
        entries
    }
}
