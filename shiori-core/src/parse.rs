//! Anime release filename parsing.
//!
//! Turns `"[Group] 86 - Eighty Six - 20 (1080p).mkv"` into a
//! [`ParsedData`] block: title, episode token, season/part markers,
//! release group, year. Folder components between the library root and
//! the file are parsed with the same rules so the matcher can fall back
//! to folder titles.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use shiori_model::ParsedData;

static RELEASE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]").unwrap());
static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static PAREN_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());
static PAREN_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

static SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,2})\s*[._ -]?\s*E(\d{1,4})(?:\s*-\s*E?(\d{1,4}))?\b").unwrap());
static EPISODE_X: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})x(\d{1,3})\b").unwrap());
static EPISODE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:episode|ep)\.?\s*(\d{1,4})\b").unwrap());
static EPISODE_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_]\s*(\d{1,4})(?:\s*[-~]\s*(\d{1,4}))?\s*(?:v\d+)?\s*$").unwrap());
static EPISODE_DASH_MID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s-\s(\d{1,4})(?:v\d+)?(?:\s|$)").unwrap());

static SEASON_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:season|series)\s*(\d{1,2})\b|(?i:\bS(\d{1,2})\b)|(?i:\b(\d{1,2})(?:st|nd|rd|th)\s+season\b)").unwrap());
static PART_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:part|cour)\s*(\d{1,2})\b").unwrap());

static NC_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b|_)(?:NCOP|NCED|NC\s?(?:OP|ED)|Creditless|Credit-?less|(?:Clean\s)?(?:Opening|Ending))\s*\d*(?:\b|_)").unwrap()
});
static OVA_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\b|_|\d)(?:OVA|OAD|OAV)\s*\d*(?:\b|_)").unwrap());
static SPECIAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\b|_)(?:SP|Specials?)\s*\d*(?:\b|_)").unwrap());
static MOVIE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\b|_)(?:Movie|Film|Gekijouban)(?:\b|_)").unwrap());
static EXTRAS_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[/\\])(?:Extras?|Specials?)(?:[/\\]|$)").unwrap());

static TECH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:\d{3,4}p|[48]k|x26[45]|h\.?26[45]|hevc|avc|av1|aac|e?ac3|flac|opus|10-?bit|8-?bit|hi10p?|blu-?ray|bdrip|web-?(?:dl|rip)|hdtv|dual[\s.-]?audio|multi[\s.-]?sub|uncensored|remux|hdr10?\+?|dv)\b")
        .unwrap()
});
static NC_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:NC)?(OP|ED)\s*(\d{1,3})?\b").unwrap());

/// Whether a filename looks like a non-credit opening/ending.
pub fn value_contains_nc(value: &str) -> bool {
    NC_MARKER.is_match(value)
}

/// Whether a filename looks like a special/OVA.
pub fn value_contains_special(value: &str) -> bool {
    OVA_MARKER.is_match(value) || SPECIAL_MARKER.is_match(value)
}

/// Whether a filename carries an explicit movie marker.
pub fn value_contains_movie(value: &str) -> bool {
    MOVIE_MARKER.is_match(value)
}

/// Whether any path component is an `Extras`/`Specials` folder.
pub fn path_contains_extras_folder(path: &Path) -> bool {
    EXTRAS_FOLDER.is_match(&path.to_string_lossy())
}

/// Extract the NC kind and number from a filename, e.g. `("OP", 1)`.
pub fn extract_nc_type(value: &str) -> Option<(String, Option<i32>)> {
    let caps = NC_TYPE.captures(value)?;
    let kind = caps[1].to_uppercase();
    let number = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
    Some((kind, number))
}

/// Parse one filename into a [`ParsedData`] block.
pub fn parse_filename(filename: &str) -> ParsedData {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, ext)| if ext.len() <= 4 { stem } else { filename })
        .unwrap_or(filename);

    let mut parsed = ParsedData {
        original: filename.to_string(),
        ..Default::default()
    };

    let mut work = stem.to_string();

    // Leading [Group] tag
    if let Some((group, end)) = leading_release_group(&work) {
        parsed.release_group = group;
        work.drain(..end);
    }

    // Year before the parenthesized tags are dropped
    if let Some(caps) = PAREN_YEAR.captures(&work) {
        parsed.year = caps[1].to_string();
    }

    // Remaining bracketed/parenthesized tags are technical noise
    work = BRACKET_TAG.replace_all(&work, " ").into_owned();
    work = PAREN_TAG.replace_all(&work, " ").into_owned();
    work = TECH_TOKEN.replace_all(&work, " ").into_owned();

    let mut title_end = work.len();

    // SxxEyy wins over everything else
    if let Some(caps) = SEASON_EPISODE.captures(&work) {
        parsed.season = trim_zeros(&caps[1]);
        parsed.episode = trim_zeros(&caps[2]);
        if let Some(end) = caps.get(3) {
            parsed.episode_range = vec![parsed.episode.clone(), trim_zeros(end.as_str())];
        }
        title_end = title_end.min(caps.get(0).unwrap().start());
    } else if let Some(caps) = EPISODE_X.captures(&work) {
        parsed.season = trim_zeros(&caps[1]);
        parsed.episode = trim_zeros(&caps[2]);
        title_end = title_end.min(caps.get(0).unwrap().start());
    } else if let Some(caps) = EPISODE_WORD.captures(&work) {
        parsed.episode = trim_zeros(&caps[1]);
        title_end = title_end.min(caps.get(0).unwrap().start());
    } else if !value_contains_nc(&work) {
        // " - NN" style episode markers; NC markers like "NCOP1" must not
        // be mistaken for episode numbers.
        if let Some(caps) = EPISODE_DASH.captures(&work) {
            parsed.episode = trim_zeros(&caps[1]);
            if let Some(end) = caps.get(2) {
                parsed.episode_range = vec![parsed.episode.clone(), trim_zeros(end.as_str())];
                parsed.episode = parsed.episode_range[0].clone();
            }
            title_end = title_end.min(caps.get(0).unwrap().start());
        } else if let Some(caps) = EPISODE_DASH_MID.captures(&work) {
            parsed.episode = trim_zeros(&caps[1]);
            title_end = title_end.min(caps.get(0).unwrap().start());
        }
    }

    let mut title_part = work[..title_end].to_string();

    // Season/part markers inside the title region
    if parsed.season.is_empty() {
        if let Some(season) = take_season_marker(&mut title_part) {
            parsed.season = season;
        }
    }
    if let Some(part) = take_part_marker(&mut title_part) {
        parsed.part = part;
    }

    // NC markers are not part of the title
    title_part = NC_MARKER.replace_all(&title_part, " ").into_owned();

    parsed.title = clean_title(&title_part);

    // Episode title: alphabetic remainder after the episode marker
    if title_end < work.len() {
        let rest = clean_title(&work[title_end..]);
        let rest_trimmed = rest
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == 'v' || c == ' ' || c == '-')
            .trim();
        if rest_trimmed.chars().any(|c| c.is_alphabetic()) {
            parsed.episode_title = rest_trimmed.to_string();
        }
    }

    parsed
}

/// Parse a folder name. Episode markers are ignored; folders carry
/// titles and season/part markers only.
pub fn parse_folder_name(name: &str) -> ParsedData {
    let mut parsed = ParsedData {
        original: name.to_string(),
        ..Default::default()
    };

    let mut work = name.to_string();
    if let Some((group, end)) = leading_release_group(&work) {
        parsed.release_group = group;
        work.drain(..end);
    }
    if let Some(caps) = PAREN_YEAR.captures(&work) {
        parsed.year = caps[1].to_string();
    }
    work = BRACKET_TAG.replace_all(&work, " ").into_owned();
    work = PAREN_TAG.replace_all(&work, " ").into_owned();
    work = TECH_TOKEN.replace_all(&work, " ").into_owned();

    if let Some(season) = take_season_marker(&mut work) {
        parsed.season = season;
    }
    if let Some(part) = take_part_marker(&mut work) {
        parsed.part = part;
    }

    parsed.title = clean_title(&work);
    parsed
}

fn leading_release_group(value: &str) -> Option<(String, usize)> {
    let caps = RELEASE_GROUP.captures(value)?;
    let end = caps.get(0).map(|m| m.end())?;
    Some((caps[1].trim().to_string(), end))
}

/// Blank out the first season marker in-place and return its number.
fn take_season_marker(value: &mut String) -> Option<String> {
    let (range, number) = {
        let caps = SEASON_MARKER.captures(value)?;
        let num = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())?;
        (caps.get(0).map(|m| m.range())?, num)
    };
    let len = range.len();
    value.replace_range(range, &" ".repeat(len));
    Some(trim_zeros(&number))
}

fn take_part_marker(value: &mut String) -> Option<String> {
    let (range, number) = {
        let caps = PART_MARKER.captures(value)?;
        (caps.get(0).map(|m| m.range())?, caps[1].to_string())
    };
    let len = range.len();
    value.replace_range(range, &" ".repeat(len));
    Some(trim_zeros(&number))
}

/// Parse every path component between `library_root` and the file.
pub fn parse_folder_components(path: &Path, library_root: &Path) -> Vec<ParsedData> {
    let relative = path.strip_prefix(library_root).unwrap_or(path);
    let mut folders = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            let name = component.as_os_str().to_string_lossy();
            if name.is_empty() || name == "/" {
                continue;
            }
            folders.push(parse_folder_name(&name));
        }
    }
    folders
}

fn trim_zeros(s: &str) -> String {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
}

fn clean_title(raw: &str) -> String {
    let replaced = raw.replace(['_', '.'], " ");
    let cleaned: String = replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    cleaned
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '~')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_group_and_dash_episode() {
        let p = parse_filename("[SubsPlease] 86 - Eighty Six - 20 (1080p).mkv");
        assert_eq!(p.release_group, "SubsPlease");
        assert_eq!(p.title, "86 - Eighty Six");
        assert_eq!(p.episode, "20");
        assert!(p.season.is_empty());
    }

    #[test]
    fn roman_numeral_title_with_dash_episode() {
        let p = parse_filename("Overlord III - 01.mkv");
        assert_eq!(p.title, "Overlord III");
        assert_eq!(p.episode, "1");
    }

    #[test]
    fn sxx_eyy() {
        let p = parse_filename("Vinland.Saga.S02E04.1080p.mkv");
        assert_eq!(p.title, "Vinland Saga");
        assert_eq!(p.season, "2");
        assert_eq!(p.episode, "4");
    }

    #[test]
    fn season_word_marker() {
        let p = parse_filename("[Group] Mushoku Tensei Season 2 - 12.mkv");
        assert_eq!(p.title, "Mushoku Tensei");
        assert_eq!(p.season, "2");
        assert_eq!(p.episode, "12");
    }

    #[test]
    fn part_marker() {
        let p = parse_filename("86 Eighty Six Part 2 - 21.mkv");
        assert_eq!(p.title, "86 Eighty Six");
        assert_eq!(p.part, "2");
        assert_eq!(p.episode, "21");
    }

    #[test]
    fn ncop_is_not_an_episode() {
        let p = parse_filename("[Group] Attack on Titan - NCOP1.mkv");
        assert_eq!(p.title, "Attack on Titan");
        assert!(p.episode.is_empty(), "NC number must not parse as episode: {p:?}");
        assert!(value_contains_nc(&p.original));
    }

    #[test]
    fn nc_type_extraction() {
        assert_eq!(extract_nc_type("NCOP1"), Some(("OP".to_string(), Some(1))));
        assert_eq!(extract_nc_type("Show NCED 2"), Some(("ED".to_string(), Some(2))));
        assert_eq!(extract_nc_type("Show - 05"), None);
    }

    #[test]
    fn movie_filename() {
        let p = parse_filename("KonoSuba Movie.mkv");
        assert!(p.episode.is_empty());
        assert!(value_contains_movie(&p.original));
    }

    #[test]
    fn special_and_ova_markers() {
        assert!(value_contains_special("Show SP1.mkv"));
        assert!(value_contains_special("Show_OVA_2.mkv"));
        assert!(!value_contains_special("Spice and Wolf - 01.mkv"));
        assert!(path_contains_extras_folder(Path::new("/lib/Show/Specials/ep.mkv")));
        assert!(path_contains_extras_folder(Path::new("/lib/Show/Extras/ep.mkv")));
        assert!(!path_contains_extras_folder(Path::new("/lib/Show/Season 1/ep.mkv")));
    }

    #[test]
    fn episode_version_suffix() {
        let p = parse_filename("[Group] Frieren - 07v2 (1080p).mkv");
        assert_eq!(p.episode, "7");
    }

    #[test]
    fn episode_range() {
        let p = parse_filename("Show - 01-12.mkv");
        assert_eq!(p.episode_range, vec!["1".to_string(), "12".to_string()]);
        assert_eq!(p.episode, "1");
    }

    #[test]
    fn folder_components() {
        let folders = parse_folder_components(
            Path::new("/library/Re Zero Season 2/[Group] Re Zero - 30.mkv"),
            Path::new("/library"),
        );
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].title, "Re Zero");
        assert_eq!(folders[0].season, "2");
    }

    #[test]
    fn bare_title() {
        let p = parse_filename("random_video.mkv");
        assert_eq!(p.title, "random video");
        assert!(p.episode.is_empty());
    }
}
