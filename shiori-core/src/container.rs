//! Candidate-entry container and title indexes.
//!
//! The container owns the scan's candidate set and builds everything the
//! matcher reads: per-entry normalized titles, an inverted token index
//! for cheap prefiltering, and three flat title pools used by the final
//! similarity vote.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use shiori_model::MediaEntry;
use tracing::debug;

use crate::normalize::{self, NormalizedTitle};

/// One comparable title string together with the entry it belongs to.
#[derive(Debug, Clone)]
pub struct TitleRef {
    pub title: String,
    pub media_id: i32,
}

/// Which pool a [`TitleRef`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePool {
    English,
    Romaji,
    Synonym,
}

/// Holds the candidate entries plus the derived indexes.
pub struct MediaContainer {
    entries: HashMap<i32, MediaEntry>,
    /// Normalized forms of every title per entry.
    normalized_titles: HashMap<i32, Vec<NormalizedTitle>>,
    /// token -> ids of entries whose normalized titles contain it.
    /// BTree keeps iteration deterministic.
    token_index: BTreeMap<String, BTreeSet<i32>>,
    english_titles: Vec<TitleRef>,
    romaji_titles: Vec<TitleRef>,
    season_synonyms: Vec<TitleRef>,
}

impl MediaContainer {
    pub fn new(entries: Vec<MediaEntry>) -> Self {
        let mut container = Self {
            entries: HashMap::new(),
            normalized_titles: HashMap::new(),
            token_index: BTreeMap::new(),
            english_titles: Vec::new(),
            romaji_titles: Vec::new(),
            season_synonyms: Vec::new(),
        };
        // Deterministic index regardless of caller ordering.
        let mut entries = entries;
        entries.sort_by_key(|e| e.id);
        entries.dedup_by_key(|e| e.id);
        for entry in entries {
            container.index_entry(entry);
        }
        debug!(
            entries = container.entries.len(),
            tokens = container.token_index.len(),
            "built media container"
        );
        container
    }

    fn index_entry(&mut self, entry: MediaEntry) {
        let id = entry.id;
        let mut normalized = Vec::new();

        let push_title = |titles: &mut Vec<NormalizedTitle>, raw: &str, is_main: bool| {
            if raw.is_empty() {
                return;
            }
            let mut title = normalize::normalize_title(raw);
            title.is_main = is_main;
            titles.push(title);
        };

        if let Some(romaji) = entry.title.romaji.as_deref() {
            push_title(&mut normalized, romaji, true);
            self.romaji_titles.push(TitleRef { title: romaji.to_string(), media_id: id });
        }
        if let Some(english) = entry.title.english.as_deref() {
            push_title(&mut normalized, english, true);
            self.english_titles.push(TitleRef { title: english.to_string(), media_id: id });
        }
        if let Some(preferred) = entry.title.user_preferred.as_deref() {
            push_title(&mut normalized, preferred, true);
        }
        if let Some(native) = entry.title.native.as_deref() {
            push_title(&mut normalized, native, false);
        }
        for synonym in &entry.synonyms {
            push_title(&mut normalized, synonym, false);
            if shiori_model::media::synonym_contains_season(synonym) {
                self.season_synonyms
                    .push(TitleRef { title: synonym.clone(), media_id: id });
            }
        }

        for title in &normalized {
            for token in &title.tokens {
                self.token_index
                    .entry(token.clone())
                    .or_default()
                    .insert(id);
            }
            // Compound tokens: adjacent pairs of short tokens, so a file
            // titled "ReZero" still reaches an entry titled "Re Zero ...".
            for pair in title.tokens.windows(2) {
                if pair[0].len() <= 5 && pair[1].len() <= 5 {
                    let compound = format!("{}{}", pair[0], pair[1]);
                    self.token_index.entry(compound).or_default().insert(id);
                }
            }
        }

        self.normalized_titles.insert(id, normalized);
        self.entries.insert(id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: i32) -> Option<&MediaEntry> {
        self.entries.get(&id)
    }

    /// All candidate entries, ascending by id.
    pub fn entries(&self) -> impl Iterator<Item = &MediaEntry> {
        let mut ids: Vec<i32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.entries.get(&id))
    }

    pub fn normalized_titles(&self, id: i32) -> &[NormalizedTitle] {
        self.normalized_titles
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn english_titles(&self) -> &[TitleRef] {
        &self.english_titles
    }

    pub fn romaji_titles(&self) -> &[TitleRef] {
        &self.romaji_titles
    }

    pub fn season_synonyms(&self) -> &[TitleRef] {
        &self.season_synonyms
    }

    pub fn pool(&self, pool: TitlePool) -> &[TitleRef] {
        match pool {
            TitlePool::English => &self.english_titles,
            TitlePool::Romaji => &self.romaji_titles,
            TitlePool::Synonym => &self.season_synonyms,
        }
    }

    /// Entries whose indexed tokens intersect `tokens` (compound pairs of
    /// the input are tried too). Empty result means the matcher can skip
    /// the similarity vote entirely.
    pub fn candidates_for_tokens(&self, tokens: &[String]) -> BTreeSet<i32> {
        let mut ids = BTreeSet::new();
        for token in tokens {
            if normalize::is_noise_word(token) {
                continue;
            }
            if let Some(hits) = self.token_index.get(token) {
                ids.extend(hits.iter().copied());
            }
        }
        for pair in tokens.windows(2) {
            let compound = format!("{}{}", pair[0], pair[1]);
            if let Some(hits) = self.token_index.get(&compound) {
                ids.extend(hits.iter().copied());
            }
        }
        ids
    }

    /// Look an exact title string back up to its entry. Comparison is
    /// case-insensitive; used by the matcher after the vote picked a
    /// winning pool title.
    pub fn entry_by_title(&self, title: &str) -> Option<&MediaEntry> {
        let lower = title.to_lowercase();
        for pool in [&self.english_titles, &self.romaji_titles, &self.season_synonyms] {
            if let Some(hit) = pool.iter().find(|t| t.title.to_lowercase() == lower) {
                return self.entries.get(&hit.media_id);
            }
        }
        None
    }

    #[cfg(test)]
    pub(crate) fn indexed_tokens(&self) -> impl Iterator<Item = (&String, &BTreeSet<i32>)> {
        self.token_index.iter()
    }
}
