//! Candidate-set construction.
//!
//! The fetcher decides which catalog entries the matcher is allowed to
//! pick from: the user's collection, plus (in enhanced mode) entries
//! discovered from the parsed file titles via MAL search, the id-mapping
//! provider and sequel/prequel tree expansion.

use std::collections::HashSet;
use std::sync::Arc;

use shiori_model::{LocalFile, MediaEntry};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::limiter::Limiter;
use crate::platform::{
    CatalogPlatform, EntryCache, MalSearch, MetadataPlatform, MetadataProvider,
};
use crate::tree;

/// Entries older than this year get a small relevance penalty in
/// enhanced discovery; MAL's prefix search over-ranks old classics.
const PENALTY_YEAR: i32 = 2006;
const ES_SCORE_PENALTY: f64 = 0.1;

/// Unknown entries are only auto-added to the user's list below this
/// count; a big batch is more likely a matching accident.
const MAX_AUTO_ADD: usize = 5;

pub struct MediaFetcher {
    catalog: Arc<dyn CatalogPlatform>,
    mal: Arc<dyn MalSearch>,
    metadata: Arc<dyn MetadataProvider>,
    cache: Arc<EntryCache>,
    catalog_limiter: Arc<Limiter>,
    mal_limiter: Limiter,
}

/// What the fetcher hands to the rest of the pipeline.
#[derive(Debug, Default)]
pub struct FetchOutput {
    /// The candidate set, ascending by id.
    pub entries: Vec<MediaEntry>,
    /// Candidate ids that are not on the user's list.
    pub unknown_ids: Vec<i32>,
    /// Ids present in the user's collection.
    pub collection_ids: HashSet<i32>,
}

impl MediaFetcher {
    pub fn new(
        catalog: Arc<dyn CatalogPlatform>,
        mal: Arc<dyn MalSearch>,
        metadata: Arc<dyn MetadataProvider>,
        cache: Arc<EntryCache>,
        catalog_limiter: Arc<Limiter>,
    ) -> Self {
        Self {
            catalog,
            mal,
            metadata,
            cache,
            catalog_limiter,
            mal_limiter: Limiter::mal(),
        }
    }

    /// Build the candidate set. A collection fetch failure is fatal;
    /// every enhanced-mode failure degrades to a smaller candidate set.
    pub async fn fetch(&self, files: &[LocalFile], enhanced: bool) -> Result<FetchOutput> {
        let collection = self.catalog.get_collection(true).await?;
        let collection_ids: HashSet<i32> = collection.entries().map(|e| e.id).collect();
        for entry in collection.entries() {
            self.cache.insert(entry.clone());
        }
        debug!(target: "scanner::fetcher", entries = collection_ids.len(), "collection fetched");

        if enhanced {
            self.discover_from_titles(files).await;
        }

        let entries = self.cache.snapshot();
        let mut unknown_ids: Vec<i32> = entries
            .iter()
            .map(|e| e.id)
            .filter(|id| !collection_ids.contains(id))
            .collect();
        unknown_ids.sort_unstable();

        if !unknown_ids.is_empty() && unknown_ids.len() < MAX_AUTO_ADD {
            if let Err(err) = self.catalog.add_to_list(&unknown_ids).await {
                warn!(target: "scanner::fetcher", %err, "could not add discovered entries to list");
            }
        }

        Ok(FetchOutput { entries, unknown_ids, collection_ids })
    }

    /// Enhanced mode: parsed titles -> MAL search -> id mapping ->
    /// catalog fetch -> tree expansion. Populates the entry cache.
    async fn discover_from_titles(&self, files: &[LocalFile]) {
        let titles = unique_parsed_titles(files);
        info!(target: "scanner::fetcher", titles = titles.len(), "enhanced discovery from file titles");

        let mut mal_ids: Vec<i32> = Vec::new();
        for title in &titles {
            self.mal_limiter.acquire().await;
            let results = match self.mal.search(title).await {
                Ok(r) => r,
                Err(err) => {
                    warn!(target: "scanner::fetcher", title, %err, "mal search failed");
                    continue;
                }
            };
            if let Some(best) = pick_best_result(results) {
                mal_ids.push(best);
            }
        }
        mal_ids.sort_unstable();
        mal_ids.dedup();

        let mut catalog_ids: Vec<i32> = Vec::new();
        for mal_id in mal_ids {
            match self
                .metadata
                .anime_metadata(MetadataPlatform::Mal, mal_id)
                .await
            {
                Ok(meta) => {
                    if let Some(id) = meta.mappings.anilist_id {
                        catalog_ids.push(id);
                    }
                }
                Err(err) => {
                    warn!(target: "scanner::fetcher", mal_id, %err, "id mapping failed");
                }
            }
        }
        catalog_ids.sort_unstable();
        catalog_ids.dedup();

        for id in catalog_ids {
            let entry = match self.cache.get(id) {
                Some(entry) => entry,
                None => {
                    self.catalog_limiter.acquire().await;
                    match self.catalog.get_entry_with_relations(id).await {
                        Ok(entry) => {
                            self.cache.insert(entry.clone());
                            entry
                        }
                        Err(err) => {
                            warn!(target: "scanner::fetcher", media_id = id, %err, "could not fetch discovered entry");
                            continue;
                        }
                    }
                }
            };
            // Pull the whole sequel/prequel neighborhood in so that
            // cross-season files can land on the right entry.
            if let Err(err) = tree::build_tree(
                &entry,
                self.catalog.as_ref(),
                &self.cache,
                &self.catalog_limiter,
            )
            .await
            {
                warn!(target: "scanner::fetcher", media_id = entry.id, %err, "tree expansion failed");
            }
        }
    }
}

/// Unique, non-empty parsed titles across filenames and folders.
fn unique_parsed_titles(files: &[LocalFile]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut titles: Vec<String> = Vec::new();
    let mut push = |title: &str| {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return;
        }
        if seen.insert(trimmed.to_lowercase()) {
            titles.push(trimmed.to_string());
        }
    };
    for file in files {
        push(&file.parsed.title);
        for folder in &file.parsed_folders {
            push(&folder.title);
        }
    }
    titles.sort();
    titles
}

/// Best MAL hit: rank by ES-score with a small penalty for pre-2006
/// entries, drop anything not yet aired.
fn pick_best_result(results: Vec<crate::platform::MalSearchResult>) -> Option<i32> {
    results
        .into_iter()
        .filter(|r| !r.is_not_yet_aired())
        .map(|r| {
            let penalty = match r.start_year {
                Some(year) if year < PENALTY_YEAR => ES_SCORE_PENALTY,
                _ => 0.0,
            };
            (r.id, r.es_score - penalty)
        })
        .max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                // ties by ascending id, lowest wins
                .then(b.0.cmp(&a.0))
        })
        .map(|(id, _)| id)
}
