//! Title normalization and token comparison helpers.
//!
//! Normalization is pure and idempotent: feeding a normalized string back
//! through [`normalize_title`] yields the same result. Season, part and
//! year markers are stripped from the normalized text and surfaced as
//! dedicated integer fields so that "Title S2" can never spuriously match
//! "Other Title 2" on the bare digit.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Words that should weigh less during token comparison.
static NOISE_WORDS: &[&str] = &[
    "the", "a", "an", "of", "to", "in", "for", "on", "with", "at", "by", "from", "as", "is",
    "it", "that", "this", "be", "are", "was", "were",
    // japanese particles/common words
    "no", "wa", "wo", "ga", "ni", "de", "ka", "mo", "ya", "e", "he",
    // common anime title words
    "anime", "ova", "ona", "oad", "tv", "movie", "nc", "nced", "ncop", "extras", "ending",
    "opening", "preview", "special", "specials", "sp", "finale", "season", "uncensored",
    "censored", "bluray",
];

/// Tokens stripped when building the clean base title.
static FORMAT_WORDS: &[&str] = &[
    "ova", "ona", "oad", "oav", "sp", "special", "specials", "movie", "film", "tv", "nc",
    "nced", "ncop", "extras", "opening", "ending", "preview", "finale",
];

// Lone "i" and "x" are skipped, they are too ambiguous.
static ROMAN_NUMERALS: &[(&str, i32)] = &[
    ("ii", 2),
    ("iii", 3),
    ("iv", 4),
    ("v", 5),
    ("vi", 6),
    ("vii", 7),
    ("viii", 8),
    ("ix", 9),
    ("xi", 11),
    ("xii", 12),
    ("xiii", 13),
];

static ORDINAL_WORDS: &[(&str, i32)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

static SEASON_EXPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:season|s|series)\s*0*(\d+)\b").unwrap());
static SEASON_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)(?:st|nd|rd|th)\s*(?:part|season|series)\b").unwrap());
static SEASON_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:期|シーズン)").unwrap());
static SEASON_WORD_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth)\s+season\b")
        .unwrap()
});

static PART_EXPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:part|cour)\s*0*(\d+)\b").unwrap());
static PART_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)(?:st|nd|rd|th)\s*(?:part|cour)\b").unwrap());
static PART_ROMAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:part|cour)\s+(i{1,3}|iv|v|vi{0,3}|ix|x)\b").unwrap());

static YEAR_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());
static YEAR_STANDALONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

static TRAILING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b$").unwrap());

/// The normalized form of a title plus the metadata extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTitle {
    pub original: String,
    pub normalized: String,
    /// Normalized title with roman numerals, format words and a trailing
    /// standalone number removed.
    pub clean_base_title: String,
    /// Clean base title with noise words additionally removed.
    pub denoised_title: String,
    pub tokens: Vec<String>,
    /// Extracted season number, -1 when absent.
    pub season: i32,
    /// Extracted part number, -1 when absent.
    pub part: i32,
    /// Extracted year, -1 when absent.
    pub year: i32,
    /// Whether this came from a main title (romaji/english/user-preferred).
    pub is_main: bool,
}

/// Normalize a raw title for matching. Pure and idempotent.
pub fn normalize_title(title: &str) -> NormalizedTitle {
    if title.is_empty() {
        return NormalizedTitle {
            season: -1,
            part: -1,
            year: -1,
            ..Default::default()
        };
    }

    let mut result = NormalizedTitle {
        original: title.to_string(),
        season: extract_season_number(title),
        part: extract_part_number(title),
        year: extract_year(title),
        ..Default::default()
    };

    let normalized = normalize_string(title);
    let (clean_base, denoised) = compute_clean_base_title(&normalized);
    result.tokens = tokenize(&normalized);
    result.normalized = normalized;
    result.clean_base_title = clean_base;
    result.denoised_title = denoised;
    result
}

fn normalize_string(title: &str) -> String {
    let mut s = title.to_lowercase();

    // Macrons to double vowels
    s = s.replace('ō', "ou").replace('ū', "uu");

    // Character replacements
    s = s
        .replace('@', "a")
        .replace('×', " x ")
        .replace('꞉', ":")
        .replace('＊', " * ");

    s = replace_word(&s, "the animation", "");
    s = replace_word(&s, "the", "");
    s = replace_word(&s, "episode", "");
    s = replace_word(&s, "oad", "ova");
    s = replace_word(&s, "oav", "ova");
    s = replace_word(&s, "specials", "sp");
    s = replace_word(&s, "special", "sp");
    s = s.replace("(tv)", "");
    s = replace_word(&s, "&", "and");

    // Possessives would otherwise glue onto the next word
    s = s.replace("'s", " ").replace("’s", " ").replace("`s", " ");
    for quote in ['\'', '’', '`', '"', '“', '”'] {
        s = s.replace(quote, "");
    }

    // Separators and any remaining non-alphanumeric characters to spaces
    let mut cleaned = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit();
        if keep {
            cleaned.push(c);
            prev_space = false;
        } else if !prev_space {
            cleaned.push(' ');
            prev_space = true;
        }
    }

    // Season and part markers are stripped entirely; the extracted
    // integers carry that information instead.
    let mut out = cleaned;
    for re in [
        &*SEASON_EXPLICIT,
        &*SEASON_ORDINAL,
        &*SEASON_WORD_ORDINAL,
        &*SEASON_SUFFIX,
        &*PART_EXPLICIT,
        &*PART_ORDINAL,
        &*PART_ROMAN,
    ] {
        out = re.replace_all(&out, " ").into_owned();
    }

    // Roman numerals are intentionally kept; they distinguish sequels
    // like "overlord iii" from "overlord".
    collapse_whitespace(&out)
}

/// Replace whole-word occurrences of `old` in a lowercased string.
fn replace_word(s: &str, old: &str, new: &str) -> String {
    if s.is_empty() || old.is_empty() {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut start = 0;
    while let Some(idx) = s[start..].find(old) {
        let abs = start + idx;
        let end = abs + old.len();
        let start_boundary = abs == 0 || !bytes[abs - 1].is_ascii_alphanumeric();
        let end_boundary = end == s.len() || !bytes[end].is_ascii_alphanumeric();
        if start_boundary && end_boundary {
            out.push_str(&s[start..abs]);
            out.push_str(new);
            start = end;
        } else {
            // Advance one byte past the failed match to make progress.
            out.push_str(&s[start..=abs]);
            start = abs + 1;
        }
        if start >= s.len() {
            break;
        }
    }
    out.push_str(&s[start.min(s.len())..]);
    out
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = true;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn compute_clean_base_title(normalized: &str) -> (String, String) {
    let stripped = TRAILING_NUMBER.replace(normalized, " ");
    let mut base = Vec::new();
    let mut denoised = Vec::new();
    for token in stripped.split_whitespace() {
        if FORMAT_WORDS.contains(&token) || roman_numeral_value(token).is_some() {
            continue;
        }
        if !is_noise_word(token) {
            denoised.push(token);
        }
        base.push(token);
    }
    (base.join(" "), denoised.join(" "))
}

fn roman_numeral_value(token: &str) -> Option<i32> {
    ROMAN_NUMERALS
        .iter()
        .find(|(r, _)| *r == token)
        .map(|(_, n)| *n)
}

/// Extract a season number from a title, -1 when absent.
pub fn extract_season_number(title: &str) -> i32 {
    for re in [&*SEASON_EXPLICIT, &*SEASON_ORDINAL, &*SEASON_SUFFIX] {
        if let Some(caps) = re.captures(title) {
            if let Ok(n) = caps[1].parse::<i32>() {
                return n;
            }
        }
    }
    if let Some(caps) = SEASON_WORD_ORDINAL.captures(title) {
        let word = caps[1].to_lowercase();
        if let Some((_, n)) = ORDINAL_WORDS.iter().find(|(w, _)| *w == word) {
            return *n;
        }
    }
    -1
}

/// Extract a part number from a title, -1 when absent.
pub fn extract_part_number(title: &str) -> i32 {
    for re in [&*PART_EXPLICIT, &*PART_ORDINAL] {
        if let Some(caps) = re.captures(title) {
            if let Ok(n) = caps[1].parse::<i32>() {
                return n;
            }
        }
    }
    if let Some(caps) = PART_ROMAN.captures(title) {
        let roman = caps[1].to_lowercase();
        if let Some(n) = roman_numeral_value(&roman) {
            return n;
        }
    }
    -1
}

/// Extract a year from a title, -1 when absent. Parenthesized years win.
pub fn extract_year(title: &str) -> i32 {
    if let Some(caps) = YEAR_PAREN.captures(title) {
        if let Ok(year) = caps[1].parse::<i32>() {
            if (1900..=2100).contains(&year) {
                return year;
            }
        }
    }
    if let Some(caps) = YEAR_STANDALONE.captures(title) {
        if let Ok(year) = caps[1].parse::<i32>() {
            return year;
        }
    }
    -1
}

pub fn is_noise_word(word: &str) -> bool {
    NOISE_WORDS.contains(&word.to_lowercase().as_str())
}

fn is_year_token(token: &str) -> bool {
    token.len() == 4
        && (token.starts_with("19") || token.starts_with("20"))
        && token.chars().all(|c| c.is_ascii_digit())
}

/// Tokens that are neither noise words nor single characters.
pub fn significant_tokens(tokens: &[String]) -> Vec<&str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !is_noise_word(t) && t.len() > 1)
        .collect()
}

/// Ratio of matching tokens, relative to the smaller set.
pub fn token_match_ratio(tokens_a: &[String], tokens_b: &[String]) -> f64 {
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();
    let matches = tokens_a.iter().filter(|t| set_b.contains(t.as_str())).count();
    let min_len = tokens_a.len().min(tokens_b.len());
    matches as f64 / min_len as f64
}

/// Match ratio with noise words weighted 0.3 and year tokens 0.5.
pub fn weighted_token_match_ratio(tokens_a: &[String], tokens_b: &[String]) -> f64 {
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();
    let mut total = 0.0;
    let mut matched = 0.0;
    for token in tokens_a {
        let weight = if is_noise_word(token) {
            0.3
        } else if is_year_token(token) {
            0.5
        } else {
            1.0
        };
        total += weight;
        if set_b.contains(token.as_str()) {
            matched += weight;
        }
    }
    if total == 0.0 { 0.0 } else { matched / total }
}

/// Whether the token sets share at least one non-noise, non-year token.
pub fn has_strong_match(tokens_a: &[String], tokens_b: &[String]) -> bool {
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return false;
    }
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();
    tokens_a
        .iter()
        .filter(|t| !is_noise_word(t) && !is_year_token(t))
        .any(|t| set_b.contains(t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Re:Zero kara Hajimeru Isekai Seikatsu 2nd Season Part 2",
            "86: Eighty-Six Part 2",
            "Overlord III",
            "Mahōtsukai no Yome SEASON2",
            "[Group]_Some.Title_-_S02",
            "それでも歩は寄せてくる",
            "",
        ];
        for sample in samples {
            let once = normalize_title(sample);
            let twice = normalize_title(&once.normalized);
            assert_eq!(once.normalized, twice.normalized, "sample: {sample:?}");
            assert_eq!(once.tokens, twice.tokens, "sample: {sample:?}");
        }
    }

    #[test]
    fn season_markers_become_fields() {
        let n = normalize_title("Kimetsu no Yaiba Season 2");
        assert_eq!(n.season, 2);
        assert!(!n.normalized.contains('2'));

        let n = normalize_title("Kaguya-sama wa Kokurasetai S3");
        assert_eq!(n.season, 3);

        let n = normalize_title("Mob Psycho 100 III 3rd Season");
        assert_eq!(n.season, 3);

        let n = normalize_title("Second Season of Something");
        assert_eq!(n.season, 2);

        let n = normalize_title("ゆるキャン 2期");
        assert_eq!(n.season, 2);
    }

    #[test]
    fn part_markers_become_fields() {
        assert_eq!(normalize_title("86 Eighty Six Part 2").part, 2);
        assert_eq!(normalize_title("Shingeki Cour 2").part, 2);
        assert_eq!(normalize_title("Vinland Saga Part II").part, 2);
        assert_eq!(normalize_title("Plain Title").part, -1);
    }

    #[test]
    fn roman_numerals_survive_normalization() {
        let n = normalize_title("Overlord III");
        assert_eq!(n.normalized, "overlord iii");
        // ...but not the clean base title.
        assert_eq!(n.clean_base_title, "overlord");
    }

    #[test]
    fn macrons_and_symbols() {
        assert_eq!(normalize_title("Shōnen").normalized, "shounen");
        assert_eq!(normalize_title("Kūkai").normalized, "kuukai");
        assert_eq!(normalize_title("Hunter × Hunter").normalized, "hunter x hunter");
        assert_eq!(normalize_title("K-On!").normalized, "k on");
    }

    #[test]
    fn word_replacements() {
        assert_eq!(
            normalize_title("Golden Kamuy The Animation").normalized,
            "golden kamuy"
        );
        assert_eq!(normalize_title("Tate no Yuusha OAD").normalized, "tate no yuusha ova");
        assert_eq!(normalize_title("A & B").normalized, "a and b");
        // "theater" must not lose its prefix to the word-level "the" strip
        assert_eq!(normalize_title("theater").normalized, "theater");
    }

    #[test]
    fn clean_base_strips_formats_and_trailing_numbers() {
        let n = normalize_title("Persona 4");
        assert_eq!(n.clean_base_title, "persona");
        let n = normalize_title("Attack on Titan OVA");
        assert_eq!(n.clean_base_title, "attack on titan");
    }

    #[test]
    fn denoised_removes_noise_words() {
        let n = normalize_title("Attack on Titan");
        assert_eq!(n.denoised_title, "attack titan");
    }

    #[test]
    fn year_extraction() {
        assert_eq!(extract_year("Hunter x Hunter (2011)"), 2011);
        assert_eq!(extract_year("Hellsing 1998"), 1998);
        assert_eq!(extract_year("86 Eighty Six"), -1);
    }

    #[test]
    fn token_ratios() {
        let a = normalize_title("re zero kara hajimeru").tokens;
        let b = normalize_title("re zero").tokens;
        assert_eq!(token_match_ratio(&a, &b), 1.0);
        assert!(has_strong_match(&a, &b));

        let c = normalize_title("fully different").tokens;
        assert_eq!(token_match_ratio(&a, &c), 0.0);
        assert!(!has_strong_match(&a, &c));
    }

    #[test]
    fn weighted_ratio_discounts_noise() {
        let a = vec!["no".to_string(), "titan".to_string()];
        let b = vec!["no".to_string(), "colossus".to_string()];
        // Only the noise word matches: 0.3 / 1.3
        let ratio = weighted_token_match_ratio(&a, &b);
        assert!((ratio - 0.3 / 1.3).abs() < 1e-9);
        assert!(!has_strong_match(&a, &b));
    }
}
