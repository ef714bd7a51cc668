use serde::{Deserialize, Serialize};

/// Metadata extracted from a single filename or folder name.
///
/// All fields are kept as raw string tokens the way the parser produced
/// them. Interpretation (e.g. turning the episode token into a number)
/// happens downstream so that the original parse is never lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedData {
    /// The string this block was parsed from.
    pub original: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub release_group: String,
    /// First season token when not a range.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub season: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub season_range: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub part: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub part_range: Vec<String>,
    /// First episode token when not a range.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub episode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub episode_range: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub episode_title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub year: String,
}

impl ParsedData {
    /// Parsed episode token as a number, if there is one and it is numeric.
    pub fn episode_number(&self) -> Option<i32> {
        if self.episode.is_empty() {
            return None;
        }
        self.episode.trim().parse::<i32>().ok()
    }

    /// Parsed season token as a number.
    pub fn season_number(&self) -> Option<i32> {
        if self.season.is_empty() {
            return None;
        }
        self.season.trim().parse::<i32>().ok()
    }

    /// Parsed part token as a number.
    pub fn part_number(&self) -> Option<i32> {
        if self.part.is_empty() {
            return None;
        }
        self.part.trim().parse::<i32>().ok()
    }
}
