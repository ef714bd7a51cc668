use serde::{Deserialize, Serialize};

use crate::media::MediaEntry;

/// Watch-list bucket a collection entry sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListStatus {
    Current,
    Completed,
    Paused,
    Dropped,
    Planning,
    Repeating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub media: MediaEntry,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionList {
    pub status: Option<ListStatus>,
    #[serde(default)]
    pub entries: Vec<CollectionEntry>,
}

/// A user's catalog collection, as returned by the platform in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeCollection {
    #[serde(default)]
    pub lists: Vec<CollectionList>,
}

impl AnimeCollection {
    /// Every entry across all lists.
    pub fn entries(&self) -> impl Iterator<Item = &MediaEntry> {
        self.lists
            .iter()
            .flat_map(|l| l.entries.iter())
            .map(|e| &e.media)
    }

    pub fn has_entry(&self, media_id: i32) -> bool {
        self.entries().any(|m| m.id == media_id)
    }
}
