use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Catalog media format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
}

/// Catalog airing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

/// Kind of edge between two related catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaRelation {
    Sequel,
    Prequel,
    SideStory,
    Parent,
    Alternative,
    SpinOff,
    Adaptation,
    Source,
    Character,
    Summary,
    Compilation,
    Other,
}

/// The title set carried by a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
    pub user_preferred: Option<String>,
}

/// A partial date as reported by the catalog (any component may be absent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl FuzzyDate {
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextAiringEpisode {
    pub episode: i32,
    pub airing_at: Option<i64>,
}

/// Lightweight summary of a related entry; enough to filter a traversal
/// without fetching the full entry. Edges carry ids, never nested entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedNode {
    pub id: i32,
    #[serde(default)]
    pub format: Option<MediaFormat>,
    #[serde(default)]
    pub status: Option<MediaStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEdge {
    #[serde(rename = "relationType")]
    pub relation: MediaRelation,
    pub node: RelatedNode,
}

/// An immutable-during-scan catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaEntry {
    pub id: i32,
    /// External (MyAnimeList) id when the catalog knows it.
    pub id_mal: Option<i32>,
    pub title: MediaTitle,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    pub format: Option<MediaFormat>,
    pub status: Option<MediaStatus>,
    /// Total episode count; `None` when the catalog does not know it yet.
    pub episodes: Option<i32>,
    pub next_airing_episode: Option<NextAiringEpisode>,
    pub start_date: Option<FuzzyDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<MediaEdge>,
}

impl MediaEntry {
    /// English title, falling back to romaji, falling back to `"N/A"`.
    pub fn title_safe(&self) -> &str {
        self.title
            .english
            .as_deref()
            .or(self.title.romaji.as_deref())
            .unwrap_or("N/A")
    }

    pub fn romaji_title_safe(&self) -> &str {
        self.title
            .romaji
            .as_deref()
            .or(self.title.english.as_deref())
            .unwrap_or("N/A")
    }

    pub fn preferred_title(&self) -> &str {
        self.title
            .user_preferred
            .as_deref()
            .unwrap_or_else(|| self.title_safe())
    }

    /// Romaji and english titles plus season-marked synonyms; the set
    /// used for group validation.
    pub fn all_titles(&self) -> Vec<&str> {
        let mut titles = Vec::new();
        if let Some(romaji) = self.title.romaji.as_deref() {
            titles.push(romaji);
        }
        if let Some(english) = self.title.english.as_deref() {
            titles.push(english);
        }
        if self.synonyms.len() > 1 {
            titles.extend(
                self.synonyms
                    .iter()
                    .map(String::as_str)
                    .filter(|s| crate::media::synonym_contains_season(s)),
            );
        }
        titles
    }

    /// The highest episode number known to have aired, -1 when unknown.
    pub fn current_episode_count(&self) -> i32 {
        let mut ceil = self.episodes.unwrap_or(-1);
        if let Some(next) = &self.next_airing_episode {
            if next.episode > 0 {
                ceil = next.episode - 1;
            }
        }
        ceil
    }

    /// The total episode count, -1 when the catalog does not know it.
    pub fn total_episode_count(&self) -> i32 {
        self.episodes.unwrap_or(-1)
    }

    pub fn is_movie(&self) -> bool {
        self.format == Some(MediaFormat::Movie)
    }

    pub fn is_finished(&self) -> bool {
        self.status == Some(MediaStatus::Finished)
    }

    /// A "main story" entry narrows sequel/prequel traversal.
    pub fn is_main_story(&self) -> bool {
        matches!(self.format, Some(MediaFormat::Tv) | Some(MediaFormat::TvShort))
    }
}

/// Whether a format should be considered when walking the relation graph.
pub fn is_broad_relation_format(format: Option<MediaFormat>) -> bool {
    matches!(
        format,
        Some(MediaFormat::Tv)
            | Some(MediaFormat::TvShort)
            | Some(MediaFormat::Ona)
            | Some(MediaFormat::Ova)
            | Some(MediaFormat::Movie)
            | Some(MediaFormat::Special)
    )
}

/// Cheap season-marker check used to pick which synonyms matter for
/// matching (full extraction lives in the normalizer).
pub fn synonym_contains_season(s: &str) -> bool {
    let lower = s.to_lowercase();
    if lower.contains('期') || lower.contains("シーズン") {
        return true;
    }
    let bytes = lower.as_bytes();
    for (idx, _) in lower.match_indices("season") {
        let boundary_before = idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric();
        if boundary_before {
            return true;
        }
    }
    // "S2".."S99" style markers
    let mut chars = lower.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == 's'
            && (i == 0 || !bytes[i - 1].is_ascii_alphanumeric())
            && chars.peek().is_some_and(|(_, n)| n.is_ascii_digit())
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> MediaEntry {
        MediaEntry {
            id: 21,
            title: MediaTitle {
                romaji: Some("One Piece".into()),
                english: Some("ONE PIECE".into()),
                ..Default::default()
            },
            episodes: None,
            next_airing_episode: Some(NextAiringEpisode { episode: 1100, airing_at: None }),
            ..Default::default()
        }
    }

    #[test]
    fn current_count_prefers_airing_hint() {
        assert_eq!(entry().current_episode_count(), 1099);
    }

    #[test]
    fn unknown_total_is_sentinel() {
        assert_eq!(entry().total_episode_count(), -1);
    }

    #[test]
    fn season_synonym_detection() {
        assert!(synonym_contains_season("Shingeki no Kyojin Season 3"));
        assert!(synonym_contains_season("SnK S2"));
        assert!(synonym_contains_season("進撃の巨人 2期"));
        assert!(!synonym_contains_season("Attack on Titan"));
        assert!(!synonym_contains_season("Last Exile"));
    }

    #[test]
    fn format_enum_uses_catalog_wire_names() {
        assert_eq!(
            serde_json::to_string(&MediaFormat::TvShort).unwrap(),
            "\"TV_SHORT\""
        );
        assert_eq!(
            serde_json::from_str::<MediaStatus>("\"NOT_YET_RELEASED\"").unwrap(),
            MediaStatus::NotYetReleased
        );
    }
}
