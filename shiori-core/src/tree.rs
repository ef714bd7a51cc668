//! Sequel/prequel tree traversal and absolute-episode range analysis.
//!
//! A media tree is the set of entries reachable from a root by following
//! sequel and prequel edges. Entries live in a flat arena keyed by id and
//! edges carry ids only, so cyclic relation graphs (sequels and prequels
//! both point outward) are walked with a plain visited set.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::NaiveDate;
use futures::future::join_all;
use shiori_model::{MediaEntry, MediaRelation, MediaStatus, media::is_broad_relation_format};
use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::limiter::Limiter;
use crate::platform::{CatalogPlatform, EntryCache, MetadataPlatform, MetadataProvider};

/// Flat arena of related entries, keyed by catalog id.
#[derive(Debug, Default)]
pub struct MediaTree {
    root_id: i32,
    entries: HashMap<i32, MediaEntry>,
}

impl MediaTree {
    pub fn root_id(&self) -> i32 {
        self.root_id
    }

    pub fn get(&self, id: i32) -> Option<&MediaEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node ids, ascending.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn entries(&self) -> impl Iterator<Item = &MediaEntry> {
        self.entries.values()
    }
}

/// Whether an edge should be followed during traversal.
fn follow_edge(edge: &shiori_model::MediaEdge) -> bool {
    matches!(edge.relation, MediaRelation::Sequel | MediaRelation::Prequel)
        && edge.node.status != Some(MediaStatus::NotYetReleased)
        && is_broad_relation_format(edge.node.format)
}

/// Breadth-first fetch of the sequel/prequel tree rooted at `root`.
///
/// Entries already in the per-scan cache are never refetched; new ones
/// go through the shared catalog limiter and are inserted into the
/// cache for the rest of the scan.
pub async fn build_tree(
    root: &MediaEntry,
    catalog: &dyn CatalogPlatform,
    cache: &EntryCache,
    limiter: &Limiter,
) -> Result<MediaTree> {
    let mut tree = MediaTree { root_id: root.id, entries: HashMap::new() };
    let mut visited: HashSet<i32> = HashSet::new();
    let mut queue: VecDeque<i32> = VecDeque::new();

    // The root may have been fetched without relations.
    let root = if root.relations.is_empty() && !cache_has_relations(cache, root.id) {
        fetch_node(root.id, catalog, cache, limiter)
            .await
            .map_err(|e| tree_error(root.id, e))?
    } else {
        cache
            .get(root.id)
            .filter(|e| !e.relations.is_empty())
            .unwrap_or_else(|| root.clone())
    };

    visited.insert(root.id);
    for edge in root.relations.iter().filter(|e| follow_edge(e)) {
        queue.push_back(edge.node.id);
    }
    tree.entries.insert(root.id, root);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let entry = match cache.get(id).filter(|e| !e.relations.is_empty()) {
            Some(entry) => entry,
            None => fetch_node(id, catalog, cache, limiter)
                .await
                .map_err(|e| tree_error(tree.root_id, e))?,
        };
        for edge in entry.relations.iter().filter(|e| follow_edge(e)) {
            if !visited.contains(&edge.node.id) {
                queue.push_back(edge.node.id);
            }
        }
        tree.entries.insert(id, entry);
    }

    debug!(target: "scanner::tree", root = tree.root_id, nodes = tree.len(), "built media tree");
    Ok(tree)
}

fn cache_has_relations(cache: &EntryCache, id: i32) -> bool {
    cache.get(id).is_some_and(|e| !e.relations.is_empty())
}

async fn fetch_node(
    id: i32,
    catalog: &dyn CatalogPlatform,
    cache: &EntryCache,
    limiter: &Limiter,
) -> Result<MediaEntry> {
    limiter.acquire().await;
    let entry = catalog.get_entry_with_relations(id).await?;
    cache.insert(entry.clone());
    Ok(entry)
}

fn tree_error(media_id: i32, source: ScanError) -> ScanError {
    ScanError::TreeFetchFailure { media_id, reason: source.to_string() }
}

/// Absolute-episode range owned by one tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBranch {
    pub media_id: i32,
    /// Inclusive absolute range on the contiguous global timeline.
    pub min_absolute: i32,
    pub max_absolute: i32,
    /// Present when the provider reports a part-N split within a logical
    /// season: the relative numbering the split uses.
    pub part_range: Option<(i32, i32)>,
    pub total_episode_count: i32,
    /// Episode 1 had no absolute number; the branch only participates in
    /// the air-date fallback.
    pub no_absolute_found: bool,
    pub first_air_date: Option<NaiveDate>,
}

/// Resolution of one absolute episode number against a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEpisode {
    pub media_id: i32,
    pub relative: i32,
}

/// Per-tree branch set derived from external episode metadata.
#[derive(Debug, Default)]
pub struct MediaTreeAnalysis {
    branches: Vec<TreeBranch>,
}

impl MediaTreeAnalysis {
    pub fn branches(&self) -> &[TreeBranch] {
        &self.branches
    }

    pub fn branch_for(&self, media_id: i32) -> Option<&TreeBranch> {
        self.branches.iter().find(|b| b.media_id == media_id)
    }

    /// Map an absolute episode number to `(relative, mediaId)`.
    ///
    /// Tries the part ranges first, then the absolute ranges, then falls
    /// back to synthetic contiguous ranges in first-air-date order.
    pub fn resolve(&self, absolute: i32) -> Option<ResolvedEpisode> {
        if absolute < 1 {
            return None;
        }

        for branch in &self.branches {
            if let Some((min_part, max_part)) = branch.part_range {
                if min_part <= absolute && absolute <= max_part {
                    return Some(ResolvedEpisode {
                        media_id: branch.media_id,
                        relative: absolute - (min_part - 1),
                    });
                }
            }
        }

        for branch in &self.branches {
            if branch.no_absolute_found {
                continue;
            }
            if branch.min_absolute <= absolute && absolute <= branch.max_absolute {
                return Some(ResolvedEpisode {
                    media_id: branch.media_id,
                    relative: absolute - (branch.min_absolute - 1),
                });
            }
        }

        // Some providers never report absolute numbers. Order every
        // branch by the air date of its first episode and rebuild the
        // timeline from 1.
        let mut dated: Vec<&TreeBranch> = self
            .branches
            .iter()
            .filter(|b| b.first_air_date.is_some() && b.total_episode_count > 0)
            .collect();
        dated.sort_by_key(|b| (b.first_air_date, b.media_id));

        let mut start = 1;
        for branch in dated {
            let end = start + branch.total_episode_count - 1;
            if start <= absolute && absolute <= end {
                return Some(ResolvedEpisode {
                    media_id: branch.media_id,
                    relative: absolute - (start - 1),
                });
            }
            start = end + 1;
        }

        None
    }
}

/// Derive one branch per tree node from the metadata provider's episode
/// table. Nodes whose metadata cannot be fetched are skipped with a
/// warning; an analysis with no branches at all is a tree failure.
pub async fn analyze_tree(
    tree: &MediaTree,
    provider: &dyn MetadataProvider,
) -> Result<MediaTreeAnalysis> {
    let ids = tree.ids();
    let fetches = ids.iter().map(|id| async move {
        (
            *id,
            provider.anime_metadata(MetadataPlatform::Anilist, *id).await,
        )
    });

    let mut branches = Vec::new();
    for (id, result) in join_all(fetches).await {
        let metadata = match result {
            Ok(m) => m,
            Err(err) => {
                warn!(target: "scanner::tree", media_id = id, %err, "no episode metadata for tree node");
                continue;
            }
        };
        let total = metadata.main_episode_count();
        if total <= 0 {
            continue;
        }
        let ep1 = metadata.first_episode();
        let (min_absolute, no_absolute_found) = match ep1 {
            Some(ep) if ep.absolute_episode_number > 0 => (ep.absolute_episode_number, false),
            _ => (1, true),
        };
        let part_range = ep1.and_then(|ep| {
            let rel = ep.episode_number;
            let abs = ep.absolute_episode_number;
            (rel > 1 && abs - rel > 1).then_some((rel, rel + total - 1))
        });
        branches.push(TreeBranch {
            media_id: id,
            min_absolute,
            max_absolute: min_absolute + total - 1,
            part_range,
            total_episode_count: total,
            no_absolute_found,
            first_air_date: ep1.and_then(|ep| ep.air_date),
        });
    }

    if branches.is_empty() {
        return Err(ScanError::TreeFetchFailure {
            media_id: tree.root_id,
            reason: "no usable episode metadata in tree".to_string(),
        });
    }

    Ok(MediaTreeAnalysis { branches })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(
        media_id: i32,
        min_absolute: i32,
        total: i32,
        part_range: Option<(i32, i32)>,
        air: Option<(i32, u32, u32)>,
        no_absolute: bool,
    ) -> TreeBranch {
        TreeBranch {
            media_id,
            min_absolute,
            max_absolute: min_absolute + total - 1,
            part_range,
            total_episode_count: total,
            no_absolute_found: no_absolute,
            first_air_date: air.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        }
    }

    #[test]
    fn resolve_prefers_part_range() {
        // 86 part 2: providers report episodes 12..23 relative to the
        // logical season, absolute 12..23 on the timeline.
        let analysis = MediaTreeAnalysis {
            branches: vec![
                branch(116589, 1, 11, None, Some((2021, 4, 11)), false),
                branch(131586, 12, 12, Some((12, 23)), Some((2021, 10, 3)), false),
            ],
        };
        let hit = analysis.resolve(20).unwrap();
        assert_eq!(hit.media_id, 131586);
        assert_eq!(hit.relative, 9);
    }

    #[test]
    fn resolve_uses_absolute_ranges() {
        let analysis = MediaTreeAnalysis {
            branches: vec![
                branch(108632, 1, 25, None, Some((2016, 4, 4)), false),
                branch(119661, 26, 13, None, Some((2020, 7, 8)), false),
                branch(163134, 39, 13, None, Some((2021, 1, 6)), false),
            ],
        };
        let hit = analysis.resolve(51).unwrap();
        assert_eq!(hit.media_id, 163134);
        assert_eq!(hit.relative, 13);
    }

    #[test]
    fn resolve_falls_back_to_air_date_ordering() {
        let analysis = MediaTreeAnalysis {
            branches: vec![
                branch(2, 1, 13, None, Some((2019, 7, 1)), true),
                branch(1, 1, 12, None, Some((2018, 1, 1)), true),
            ],
        };
        // Synthetic timeline: entry 1 covers 1..12, entry 2 covers 13..25.
        let hit = analysis.resolve(14).unwrap();
        assert_eq!(hit.media_id, 2);
        assert_eq!(hit.relative, 2);
        let first = analysis.resolve(5).unwrap();
        assert_eq!(first.media_id, 1);
        assert_eq!(first.relative, 5);
    }

    #[test]
    fn resolve_misses_outside_all_ranges() {
        let analysis = MediaTreeAnalysis {
            branches: vec![branch(1, 1, 12, None, None, false)],
        };
        assert!(analysis.resolve(13).is_none());
        assert!(analysis.resolve(0).is_none());
    }

    #[test]
    fn branch_coverage_matches_total_count() {
        let b = branch(1, 26, 13, None, None, false);
        assert_eq!(b.max_absolute - b.min_absolute + 1, b.total_episode_count);
    }
}
