use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-episode record from the episode-metadata provider.
///
/// `episode_number` is relative to the entry, `absolute_episode_number`
/// is the position on the series' contiguous global timeline. A provider
/// that has no absolute numbering reports 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EpisodeMetadata {
    pub episode_number: i32,
    pub absolute_episode_number: i32,
    pub air_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Cross-platform id mappings reported alongside episode metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalMappings {
    pub anilist_id: Option<i32>,
    pub mal_id: Option<i32>,
    pub anidb_id: Option<i32>,
}

/// Everything the episode-metadata provider knows about one entry.
///
/// Episodes are keyed by their canonical id: `"1"`, `"2"`, ... for main
/// episodes, `"S1"`, `"S2"`, ... for specials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimeMetadata {
    pub episodes: HashMap<String, EpisodeMetadata>,
    pub episode_count: i32,
    pub special_count: i32,
    pub mappings: ExternalMappings,
}

impl AnimeMetadata {
    /// Number of main (non-special) episodes the provider lists; falls
    /// back to the reported count when the map is sparse.
    pub fn main_episode_count(&self) -> i32 {
        let listed = self
            .episodes
            .keys()
            .filter(|k| k.parse::<i32>().is_ok())
            .count() as i32;
        if listed > 0 { listed } else { self.episode_count }
    }

    /// The record for main episode 1, the anchor for absolute-range math.
    pub fn first_episode(&self) -> Option<&EpisodeMetadata> {
        self.episodes.get("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_count_ignores_special_keys() {
        let mut meta = AnimeMetadata::default();
        for key in ["1", "2", "3", "S1", "S2"] {
            meta.episodes.insert(key.to_string(), EpisodeMetadata::default());
        }
        assert_eq!(meta.main_episode_count(), 3);
    }

    #[test]
    fn main_count_falls_back_to_reported_count() {
        let meta = AnimeMetadata { episode_count: 12, ..Default::default() };
        assert_eq!(meta.main_episode_count(), 12);
    }
}
