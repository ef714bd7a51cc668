use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parsed::ParsedData;

/// The role a hydrated file plays within its matched media entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// A regular, tracked episode. Movies also hydrate to `Main`.
    #[default]
    #[serde(rename = "main", alias = "movie")]
    Main,
    /// OVA, OAD, or anything living under an Extras/Specials folder.
    #[serde(rename = "special")]
    Special,
    /// Non-credit opening/ending.
    #[serde(rename = "nc")]
    NC,
}

/// Mutable metadata block, written by the hydrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMetadata {
    pub episode: i32,
    /// Episode key used by the episode-metadata provider, e.g. `"1"` or `"S2"`.
    pub canonical_episode_id: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

/// A persistent handle identifying one video file on disk.
///
/// Created by the filesystem walker, matched by the matcher
/// (`media_id`), hydrated by the file hydrator (`metadata`). Identity is
/// the normalized path; records are merged by path across rescans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub path: PathBuf,
    /// The library directory this file was found under.
    pub library_root: PathBuf,
    pub name: String,
    pub parsed: ParsedData,
    /// Parsed data for each path component between the library root and
    /// the file, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parsed_folders: Vec<ParsedData>,
    #[serde(flatten)]
    pub metadata: FileMetadata,
    /// Matched catalog entry, 0 when unmatched.
    pub media_id: i32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub ignored: bool,
}

impl LocalFile {
    pub fn new(path: PathBuf, library_root: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            library_root,
            name,
            parsed: ParsedData::default(),
            parsed_folders: Vec::new(),
            metadata: FileMetadata::default(),
            media_id: 0,
            locked: false,
            ignored: false,
        }
    }

    /// Lowercased, forward-slashed path. Use this for comparisons.
    pub fn normalized_path(&self) -> String {
        normalize_path(&self.path)
    }

    pub fn has_same_path(&self, other: &Path) -> bool {
        self.normalized_path() == normalize_path(other)
    }

    pub fn is_in_dir(&self, dir: &Path) -> bool {
        self.normalized_path()
            .starts_with(&normalize_path(dir))
    }

    /// The parsed title, preferring the innermost folder title.
    pub fn parsed_title(&self) -> &str {
        if let Some(folder) = self.parsed_folders.last() {
            if !folder.title.is_empty() {
                return &folder.title;
            }
        }
        &self.parsed.title
    }

    /// The parsed episode number, if any.
    pub fn parsed_episode(&self) -> Option<i32> {
        self.parsed.episode_number()
    }

    fn folder_title(&self) -> Option<&str> {
        self.parsed_folders
            .iter()
            .find(|p| !p.title.is_empty())
            .map(|p| p.title.as_str())
    }

    fn folder_season(&self) -> i32 {
        self.parsed_folders
            .iter()
            .find_map(|p| p.season_number())
            .filter(|s| *s > 0)
            .unwrap_or(0)
    }

    /// Candidate title strings for similarity comparison, built from the
    /// filename title, the folder title and any season/part markers.
    pub fn title_variations(&self) -> Vec<String> {
        let folder_season = self.folder_season();
        let season = self.parsed.season_number().filter(|s| *s > 0).unwrap_or(0);
        let part = self.parsed.part_number().filter(|p| *p > 0).unwrap_or(0);
        let folder_title = self.folder_title().unwrap_or("");
        let file_title = self.parsed.title.as_str();

        if file_title.is_empty() && folder_title.is_empty() {
            return Vec::new();
        }

        let both_titles = !file_title.is_empty() && !folder_title.is_empty();
        let no_seasons_or_parts = folder_season == 0 && season == 0 && part == 0;
        let both_titles_similar = both_titles && folder_title.contains(file_title);
        let either_season = folder_season > 0 || season > 0;
        let either_season_first = folder_season == 1 || season == 1;

        let mut variations: Vec<String> = Vec::new();

        if part > 0 {
            for base in [folder_title, file_title] {
                if base.is_empty() {
                    continue;
                }
                variations.push(format!("{base} Part {part}"));
                variations.push(format!("{base} Part {}", ordinal(part)));
                variations.push(format!("{base} Cour {part}"));
                variations.push(format!("{base} Cour {}", ordinal(part)));
            }
        }

        if no_seasons_or_parts || either_season_first {
            if !folder_title.is_empty() && both_titles_similar {
                variations.push(folder_title.to_string());
            }
            if !file_title.is_empty() {
                variations.push(file_title.to_string());
            }
        }

        if part > 0 && either_season {
            let seas = if season > 0 { season } else { folder_season };
            for base in [folder_title, file_title] {
                if !base.is_empty() {
                    variations.push(format!("{base} Season {seas} Part {part}"));
                }
            }
        }

        if either_season {
            let seas = if season > 0 { season } else { folder_season };
            let mut bases: Vec<String> = Vec::new();
            if both_titles {
                bases.push(file_title.to_string());
                if both_titles_similar {
                    bases.push(folder_title.to_string());
                } else {
                    bases.push(format!("{folder_title} {file_title}"));
                }
            } else if !folder_title.is_empty() {
                bases.push(folder_title.to_string());
            } else {
                bases.push(file_title.to_string());
            }
            for base in &bases {
                variations.push(format!("{base} Season {seas}"));
                variations.push(format!("{base} S{seas}"));
                variations.push(format!("{base} {} Season", ordinal(seas)));
            }
        }

        variations.dedup();
        let mut seen = std::collections::HashSet::new();
        variations.retain(|v| seen.insert(v.clone()));
        variations
    }
}

/// Lowercase a path and normalize separators to forward slashes.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn ordinal(n: i32) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(title: &str, season: &str, part: &str, folder: Option<(&str, &str)>) -> LocalFile {
        let mut lf = LocalFile::new(
            PathBuf::from("/library/a/file.mkv"),
            PathBuf::from("/library"),
        );
        lf.parsed.title = title.to_string();
        lf.parsed.season = season.to_string();
        lf.parsed.part = part.to_string();
        if let Some((ftitle, fseason)) = folder {
            lf.parsed_folders.push(ParsedData {
                title: ftitle.to_string(),
                season: fseason.to_string(),
                ..Default::default()
            });
        }
        lf
    }

    #[test]
    fn plain_title_yields_single_variation() {
        let lf = file_with("86 Eighty Six", "", "", None);
        assert_eq!(lf.title_variations(), vec!["86 Eighty Six".to_string()]);
    }

    #[test]
    fn season_markers_expand_variations() {
        let lf = file_with("Spy x Family", "2", "", None);
        let vars = lf.title_variations();
        assert!(vars.contains(&"Spy x Family Season 2".to_string()));
        assert!(vars.contains(&"Spy x Family S2".to_string()));
        assert!(vars.contains(&"Spy x Family 2nd Season".to_string()));
        // A bare "Spy x Family" would spuriously match season 1.
        assert!(!vars.contains(&"Spy x Family".to_string()));
    }

    #[test]
    fn folder_season_is_used_when_filename_has_none() {
        let lf = file_with("Mushoku Tensei", "", "", Some(("Mushoku Tensei", "2")));
        let vars = lf.title_variations();
        assert!(vars.contains(&"Mushoku Tensei Season 2".to_string()));
    }

    #[test]
    fn part_markers_expand_variations() {
        let lf = file_with("86 Eighty Six", "", "2", None);
        let vars = lf.title_variations();
        assert!(vars.contains(&"86 Eighty Six Part 2".to_string()));
        assert!(vars.contains(&"86 Eighty Six Cour 2".to_string()));
        assert!(vars.contains(&"86 Eighty Six Part 2nd".to_string()));
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(21), "21st");
    }

    #[test]
    fn serde_round_trip_flattens_metadata() {
        let mut lf = file_with("Overlord III", "", "", None);
        lf.metadata.episode = 1;
        lf.metadata.canonical_episode_id = "1".to_string();
        let json = serde_json::to_value(&lf).unwrap();
        assert_eq!(json["episode"], 1);
        assert_eq!(json["canonicalEpisodeId"], "1");
        assert_eq!(json["type"], "main");
        let back: LocalFile = serde_json::from_value(json).unwrap();
        assert_eq!(back, lf);
    }

    #[test]
    fn movie_type_alias_deserializes_to_main() {
        let meta: FileMetadata = serde_json::from_str(
            r#"{"episode":1,"canonicalEpisodeId":"1","type":"movie"}"#,
        )
        .unwrap();
        assert_eq!(meta.file_type, FileType::Main);
    }
}
