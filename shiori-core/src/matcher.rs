//! Title-similarity matching.
//!
//! Runs in two phases with a hard barrier between them: first every file
//! gets a tentative media id from a per-file similarity vote, then each
//! media-id group is validated and stray matches are evicted. Nothing
//! mutates a file while another task can still read it.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use shiori_model::LocalFile;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::container::{MediaContainer, TitlePool, TitleRef};
use crate::error::Result;
use crate::normalize;
use crate::parse;
use crate::summary::ScanSummaryLogger;

/// A match below this Dice rating is discarded.
const MATCH_THRESHOLD: f64 = 0.5;

/// A file whose group rating trails the group's best by more than this
/// is evicted during validation.
const GROUP_EVICTION_THRESHOLD: f64 = 0.7;

pub struct Matcher {
    container: Arc<MediaContainer>,
    logger: Arc<ScanSummaryLogger>,
}

#[derive(Debug, Clone)]
struct MatchOutcome {
    media_id: i32,
    logs: Vec<String>,
}

impl Matcher {
    pub fn new(container: Arc<MediaContainer>, logger: Arc<ScanSummaryLogger>) -> Self {
        Self { container, logger }
    }

    /// Assign a tentative media id to every unlocked file, then validate
    /// each media-id group. Panics in per-file work are caught, recorded,
    /// and leave the file unmatched.
    pub async fn match_files(&self, files: &mut [LocalFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let limit = fan_out_limit(files.len());
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut set: JoinSet<(usize, std::result::Result<MatchOutcome, String>)> = JoinSet::new();

        for (idx, file) in files.iter().enumerate() {
            if file.locked || file.ignored {
                continue;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let container = Arc::clone(&self.container);
            let file = file.clone();
            set.spawn_blocking(move || {
                let _permit = permit;
                let result = catch_unwind(AssertUnwindSafe(|| match_file(&file, &container)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                (idx, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            let Ok((idx, result)) = joined else {
                // JoinError without a recorded index; per-file panics are
                // caught inside the task, so this is a cancellation.
                continue;
            };
            match result {
                Ok(outcome) => {
                    files[idx].media_id = outcome.media_id;
                    for line in outcome.logs {
                        self.logger.log(&files[idx], line);
                    }
                }
                Err(message) => {
                    error!(target: "scanner::matcher", path = %files[idx].path.display(), panic = %message, "panic during matching");
                    files[idx].media_id = 0;
                    self.logger
                        .log(&files[idx], format!("internal panic during matching: {message}"));
                }
            }
        }

        self.validate_groups(files).await;

        let matched = files.iter().filter(|f| f.media_id != 0).count();
        debug!(target: "scanner::matcher", total = files.len(), matched, "matching complete");
        Ok(())
    }

    /// Second phase: per-group eviction of stray matches. NC and special
    /// files ride along with whatever their group decided.
    async fn validate_groups(&self, files: &mut [LocalFile]) {
        let mut groups: HashMap<i32, Vec<usize>> = HashMap::new();
        for (idx, file) in files.iter().enumerate() {
            if file.media_id != 0 && !file.locked {
                groups.entry(file.media_id).or_default().push(idx);
            }
        }

        let limit = fan_out_limit(groups.len().max(1));
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut set: JoinSet<Vec<(usize, f64, f64)>> = JoinSet::new();

        for (media_id, indices) in groups {
            let Some(entry) = self.container.entry(media_id).cloned() else {
                continue;
            };
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let group: Vec<(usize, LocalFile)> = indices
                .into_iter()
                .map(|i| (i, files[i].clone()))
                .collect();
            set.spawn_blocking(move || {
                let _permit = permit;
                let titles = entry.all_titles();
                let rated: Vec<(usize, f64)> = group
                    .iter()
                    .filter(|(_, f)| {
                        !parse::value_contains_nc(&f.name) && !parse::value_contains_special(&f.name)
                    })
                    .map(|(i, f)| (*i, best_dice(f.parsed_title(), &titles)))
                    .collect();
                let highest = rated
                    .iter()
                    .map(|(_, r)| *r)
                    .fold(0.0_f64, f64::max);
                rated
                    .into_iter()
                    .filter(|(_, rating)| highest - rating > GROUP_EVICTION_THRESHOLD)
                    .map(|(i, rating)| (i, rating, highest))
                    .collect()
            });
        }

        while let Some(joined) = set.join_next().await {
            let Ok(evicted) = joined else { continue };
            for (idx, rating, highest) in evicted {
                self.logger.log(
                    &files[idx],
                    format!(
                        "group validation evicted match (rating {rating:.2}, group best {highest:.2})"
                    ),
                );
                files[idx].media_id = 0;
            }
        }
    }
}

/// Bounded fan-out: one task per item, capped at twice the core count.
fn fan_out_limit(items: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    items.clamp(1, 2 * cores)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The per-file similarity vote. Pure; exclusive writer of nothing.
fn match_file(file: &LocalFile, container: &MediaContainer) -> MatchOutcome {
    let mut logs = Vec::new();

    let variations = file.title_variations();
    if variations.is_empty() {
        logs.push("no parsed title".to_string());
        return MatchOutcome { media_id: 0, logs };
    }

    // Cheap prefilter through the inverted token index. A file whose
    // tokens reach no candidate cannot produce a usable vote.
    let mut all_tokens: Vec<String> = Vec::new();
    for variation in &variations {
        all_tokens.extend(normalize::normalize_title(variation).tokens);
    }
    let candidates = container.candidates_for_tokens(&all_tokens);
    if candidates.is_empty() {
        logs.push("no comparison results".to_string());
        return MatchOutcome { media_id: 0, logs };
    }

    let lowered: Vec<String> = variations.iter().map(|v| v.to_lowercase()).collect();

    let mut best_dice: Option<(&TitleRef, f64)> = None;
    let mut best_lev: Option<(&TitleRef, usize)> = None;

    for pool in [TitlePool::English, TitlePool::Romaji, TitlePool::Synonym] {
        for title in container.pool(pool) {
            if !candidates.contains(&title.media_id) {
                continue;
            }
            let title_lower = title.title.to_lowercase();
            for variation in &lowered {
                let dice = strsim::sorensen_dice(variation, &title_lower);
                let lev = strsim::levenshtein(variation, &title_lower);
                let dice_better = match best_dice {
                    None => true,
                    Some((held, rating)) => {
                        dice > rating || (dice == rating && title.media_id < held.media_id)
                    }
                };
                if dice_better {
                    best_dice = Some((title, dice));
                }
                let lev_better = match best_lev {
                    None => true,
                    Some((held, distance)) => {
                        lev < distance || (lev == distance && title.media_id < held.media_id)
                    }
                };
                if lev_better {
                    best_lev = Some((title, lev));
                }
            }
        }
    }

    let (Some((dice_title, _)), Some((lev_title, _))) = (best_dice, best_lev) else {
        logs.push("no comparison results".to_string());
        return MatchOutcome { media_id: 0, logs };
    };

    // Feed both winners back through Dice against the file's own
    // variations; the closer of the two takes the match.
    let dice_feedback = best_dice_against(&dice_title.title, &lowered);
    let lev_feedback = best_dice_against(&lev_title.title, &lowered);
    let (winner, rating) = if lev_feedback > dice_feedback {
        (lev_title, lev_feedback)
    } else {
        (dice_title, dice_feedback)
    };

    logs.push(format!(
        "best match {:?} (dice {rating:.2})",
        winner.title
    ));

    if rating < MATCH_THRESHOLD {
        logs.push(format!("rating {rating:.2} below threshold, unmatched"));
        return MatchOutcome { media_id: 0, logs };
    }
    if container.entry(winner.media_id).is_none() {
        logs.push("winning title has no entry".to_string());
        return MatchOutcome { media_id: 0, logs };
    }

    logs.push(format!("matched to media {}", winner.media_id));
    MatchOutcome { media_id: winner.media_id, logs }
}

fn best_dice_against(title: &str, lowered_variations: &[String]) -> f64 {
    let title_lower = title.to_lowercase();
    lowered_variations
        .iter()
        .map(|v| strsim::sorensen_dice(v, &title_lower))
        .fold(0.0_f64, f64::max)
}

fn best_dice(parsed_title: &str, titles: &[&str]) -> f64 {
    let parsed_lower = parsed_title.to_lowercase();
    titles
        .iter()
        .map(|t| strsim::sorensen_dice(&parsed_lower, &t.to_lowercase()))
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use shiori_model::{MediaEntry, MediaTitle, ParsedData};

    use super::*;

    fn entry(id: i32, romaji: &str, english: Option<&str>) -> MediaEntry {
        MediaEntry {
            id,
            title: MediaTitle {
                romaji: Some(romaji.to_string()),
                english: english.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn file(name: &str, title: &str, episode: &str) -> LocalFile {
        let mut lf = LocalFile::new(
            PathBuf::from(format!("/library/{name}")),
            PathBuf::from("/library"),
        );
        lf.parsed = ParsedData {
            original: name.to_string(),
            title: title.to_string(),
            episode: episode.to_string(),
            ..Default::default()
        };
        lf
    }

    fn matcher(entries: Vec<MediaEntry>) -> Matcher {
        Matcher::new(
            Arc::new(MediaContainer::new(entries)),
            Arc::new(ScanSummaryLogger::new()),
        )
    }

    #[tokio::test]
    async fn roman_numerals_break_sequel_ties() {
        let m = matcher(vec![
            entry(1, "Overlord", None),
            entry(2, "Overlord II", None),
            entry(3, "Overlord III", None),
        ]);
        let mut files = vec![file("Overlord III - 01.mkv", "Overlord III", "01")];
        m.match_files(&mut files).await.unwrap();
        assert_eq!(files[0].media_id, 3);
    }

    #[tokio::test]
    async fn unrelated_titles_stay_unmatched() {
        let m = matcher(vec![entry(1, "Sousou no Frieren", Some("Frieren: Beyond Journey's End"))]);
        let mut files = vec![file("random_video.mkv", "random video", "")];
        m.match_files(&mut files).await.unwrap();
        assert_eq!(files[0].media_id, 0);
        assert!(
            m.logger
                .trace_for(&files[0])
                .iter()
                .any(|l| l.contains("no comparison results"))
        );
    }

    #[tokio::test]
    async fn empty_parsed_title_never_matches() {
        let m = matcher(vec![entry(1, "86: Eighty Six", None)]);
        let mut files = vec![file("ep01.mkv", "", "01")];
        m.match_files(&mut files).await.unwrap();
        assert_eq!(files[0].media_id, 0);
    }

    #[tokio::test]
    async fn locked_files_are_untouched() {
        let m = matcher(vec![entry(1, "86: Eighty Six", None)]);
        let mut files = vec![file("[G] 86 - Eighty Six - 01.mkv", "86 - Eighty Six", "01")];
        files[0].locked = true;
        files[0].media_id = 999;
        m.match_files(&mut files).await.unwrap();
        assert_eq!(files[0].media_id, 999);
    }

    #[tokio::test]
    async fn matching_is_deterministic() {
        let entries = vec![
            entry(116589, "86: Eighty Six", Some("86 EIGHTY-SIX")),
            entry(131586, "86: Eighty Six Part 2", Some("86 EIGHTY-SIX Season 2")),
        ];
        let make_files = || {
            (20..=23)
                .map(|n| {
                    file(
                        &format!("[Group] 86 - Eighty Six - {n} (1080p).mkv"),
                        "86 - Eighty Six",
                        &n.to_string(),
                    )
                })
                .collect::<Vec<_>>()
        };
        let m1 = matcher(entries.clone());
        let mut first = make_files();
        m1.match_files(&mut first).await.unwrap();
        let m2 = matcher(entries);
        let mut second = make_files();
        m2.match_files(&mut second).await.unwrap();
        let ids1: Vec<i32> = first.iter().map(|f| f.media_id).collect();
        let ids2: Vec<i32> = second.iter().map(|f| f.media_id).collect();
        assert_eq!(ids1, ids2);
        assert!(ids1.iter().all(|id| *id != 0));
    }

    #[tokio::test]
    async fn group_validation_evicts_strays() {
        let m = matcher(vec![entry(1, "Mushoku Tensei", None)]);
        let mut files = vec![
            file("[G] Mushoku Tensei - 01.mkv", "Mushoku Tensei", "01"),
            file("[G] Mushoku Tensei - 02.mkv", "Mushoku Tensei", "02"),
            file("totally unrelated thing.mkv", "totally unrelated thing", ""),
        ];
        // Force the stray into the group to exercise validation alone.
        m.match_files(&mut files).await.unwrap();
        files[2].media_id = 1;
        m.validate_groups(&mut files).await;
        assert_eq!(files[0].media_id, 1);
        assert_eq!(files[1].media_id, 1);
        assert_eq!(files[2].media_id, 0);
    }
}
