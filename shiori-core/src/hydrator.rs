//! Episode number and metadata resolution.
//!
//! Files are grouped by matched media id; groups run concurrently while
//! files inside a group run sequentially, so a media tree fetched for
//! one overflowing file is reused by the rest of its group.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use shiori_model::{FileType, LocalFile, MediaEntry};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::container::MediaContainer;
use crate::limiter::Limiter;
use crate::parse;
use crate::platform::{CatalogPlatform, EntryCache, MetadataPlatform, MetadataProvider};
use crate::summary::ScanSummaryLogger;
use crate::tree::{self, MediaTreeAnalysis};

#[derive(Clone)]
pub struct FileHydrator {
    catalog: Arc<dyn CatalogPlatform>,
    metadata: Arc<dyn MetadataProvider>,
    container: Arc<MediaContainer>,
    cache: Arc<EntryCache>,
    catalog_limiter: Arc<Limiter>,
    logger: Arc<ScanSummaryLogger>,
    /// User-supplied override: every file was forced onto this entry and
    /// overflow resolution uses the entry's own metadata, never the tree.
    force_media_id: Option<i32>,
}

/// Tree analysis state shared by the files of one group.
enum GroupAnalysis {
    NotFetched,
    Ready(MediaTreeAnalysis),
    Failed,
}

impl FileHydrator {
    pub fn new(
        catalog: Arc<dyn CatalogPlatform>,
        metadata: Arc<dyn MetadataProvider>,
        container: Arc<MediaContainer>,
        cache: Arc<EntryCache>,
        catalog_limiter: Arc<Limiter>,
        logger: Arc<ScanSummaryLogger>,
        force_media_id: Option<i32>,
    ) -> Self {
        Self {
            catalog,
            metadata,
            container,
            cache,
            catalog_limiter,
            logger,
            force_media_id,
        }
    }

    /// Resolve episode metadata for every matched file. Unmatched and
    /// locked files pass through untouched.
    pub async fn hydrate(&self, files: Vec<LocalFile>) -> Vec<LocalFile> {
        let mut passthrough: Vec<LocalFile> = Vec::new();
        let mut groups: HashMap<i32, Vec<LocalFile>> = HashMap::new();
        for file in files {
            if file.media_id == 0 || file.locked {
                passthrough.push(file);
            } else {
                groups.entry(file.media_id).or_default().push(file);
            }
        }

        let mut set: JoinSet<Vec<LocalFile>> = JoinSet::new();
        for (media_id, group) in groups {
            let hydrator = self.clone();
            set.spawn(async move { hydrator.hydrate_group(media_id, group).await });
        }

        let mut out = passthrough;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut group) => out.append(&mut group),
                Err(err) => {
                    // Group-level panics are already caught per file;
                    // this is a cancellation.
                    error!(target: "scanner::hydrator", %err, "hydration group aborted");
                }
            }
        }
        debug!(target: "scanner::hydrator", files = out.len(), "hydration complete");
        out
    }

    async fn hydrate_group(&self, media_id: i32, mut files: Vec<LocalFile>) -> Vec<LocalFile> {
        let Some(entry) = self.entry_for(media_id) else {
            warn!(target: "scanner::hydrator", media_id, "no entry for matched group, clearing");
            for file in &mut files {
                self.logger.log(file, "matched entry disappeared from candidate set");
                file.media_id = 0;
            }
            return files;
        };

        files.sort_by(|a, b| a.path.cmp(&b.path));
        let mut analysis = GroupAnalysis::NotFetched;

        for file in &mut files {
            let outcome = std::panic::AssertUnwindSafe(self.hydrate_file(file, &entry, &mut analysis))
                .catch_unwind()
                .await;
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                error!(target: "scanner::hydrator", path = %file.path.display(), panic = %message, "panic during hydration");
                self.logger
                    .log(file, format!("internal panic during hydration: {message}"));
                file.media_id = 0;
            }
        }
        files
    }

    fn entry_for(&self, media_id: i32) -> Option<MediaEntry> {
        self.container
            .entry(media_id)
            .cloned()
            .or_else(|| self.cache.get(media_id))
    }

    /// The per-file decision tree. First matching rule wins.
    async fn hydrate_file(
        &self,
        file: &mut LocalFile,
        entry: &MediaEntry,
        analysis: &mut GroupAnalysis,
    ) {
        let parsed_episode = file.parsed_episode();

        // Rule 1: non-credit opening/ending.
        if parse::value_contains_nc(&file.name) {
            file.metadata.file_type = FileType::NC;
            file.metadata.episode = parsed_episode.unwrap_or(0);
            file.metadata.canonical_episode_id = String::new();
            self.logger.log(file, "hydrated as NC");
            return;
        }

        // Rule 2: special by filename marker or Extras/Specials folder.
        if parse::value_contains_special(&file.name)
            || parse::path_contains_extras_folder(&file.path)
        {
            self.hydrate_special(file, entry, parsed_episode);
            return;
        }

        // Rule 3: movies are always episode 1.
        if entry.is_movie() {
            file.metadata.file_type = FileType::Main;
            file.metadata.episode = 1;
            file.metadata.canonical_episode_id = "1".to_string();
            self.logger.log(file, "hydrated as movie");
            return;
        }

        let current = entry.current_episode_count();
        let total = entry.total_episode_count();

        match parsed_episode {
            // Rule 4: parsed episode inside the entry's range (or the
            // range is unknown): pass through.
            Some(e) if total == -1 || e <= current => {
                file.metadata.file_type = FileType::Main;
                file.metadata.episode = e;
                // Episode 0 stays 0; the metadata provider indexes main
                // episodes from 1 and files episode 0 under "S1".
                file.metadata.canonical_episode_id =
                    if e == 0 { "S1".to_string() } else { e.to_string() };
                self.logger
                    .log(file, format!("episode {e} within range, passed through"));
            }
            // Rule 5: overflow against a single-episode entry.
            Some(_) if total == 1 => {
                file.metadata.file_type = FileType::Main;
                file.metadata.episode = 1;
                file.metadata.canonical_episode_id = "1".to_string();
                self.logger.log(file, "single-episode entry, coerced to 1");
            }
            // Rule 6: no parsed episode, single-episode entry.
            None if total == 1 => {
                file.metadata.file_type = FileType::Main;
                file.metadata.episode = 1;
                file.metadata.canonical_episode_id = "1".to_string();
                self.logger.log(file, "no parsed episode, single-episode entry");
            }
            // Rule 7: no parsed episode against a multi-episode entry.
            None => {
                file.metadata.file_type = FileType::Special;
                file.metadata.episode = 1;
                file.metadata.canonical_episode_id = "S1".to_string();
                warn!(target: "scanner::hydrator", path = %file.path.display(), "no parsed episode for multi-episode entry");
                self.logger
                    .log(file, "no parsed episode for multi-episode entry, marked special");
            }
            // Rule 8: overflow against a multi-episode entry.
            Some(e) => {
                self.hydrate_overflow(file, entry, e, analysis).await;
            }
        }
    }

    fn hydrate_special(&self, file: &mut LocalFile, entry: &MediaEntry, parsed: Option<i32>) {
        file.metadata.file_type = FileType::Special;
        let current = entry.current_episode_count();
        let episode = match parsed {
            Some(e) if current > 0 && e > current => e - current,
            Some(e) => e,
            None => 1,
        };
        file.metadata.episode = episode;
        file.metadata.canonical_episode_id = format!("S{}", episode.max(1));
        self.logger
            .log(file, format!("hydrated as special {}", file.metadata.canonical_episode_id));
    }

    /// Parsed episode exceeds the entry's range: normalize it onto the
    /// right entry, or demote to special.
    async fn hydrate_overflow(
        &self,
        file: &mut LocalFile,
        entry: &MediaEntry,
        episode: i32,
        analysis: &mut GroupAnalysis,
    ) {
        if let Some(forced) = self.force_media_id {
            if forced == entry.id {
                self.hydrate_forced(file, entry, episode).await;
                return;
            }
        }

        // The entry's own metadata may already explain the overflow: a
        // part-N split numbers its episodes relative to the logical
        // season, so the parsed number normalizes without a tree fetch.
        if let Some(relative) = self.try_part_relative(entry, episode).await {
            file.metadata.file_type = FileType::Main;
            file.metadata.episode = relative;
            file.metadata.canonical_episode_id = relative.to_string();
            self.logger.log(
                file,
                format!("part-relative normalization: {episode} -> {relative}"),
            );
            return;
        }

        if matches!(analysis, GroupAnalysis::NotFetched) {
            *analysis = self.fetch_analysis(entry).await;
        }

        match analysis {
            GroupAnalysis::Ready(tree_analysis) => {
                if let Some(hit) = tree_analysis.resolve(episode) {
                    self.logger.log(
                        file,
                        format!(
                            "absolute episode {episode} resolved to media {} episode {}",
                            hit.media_id, hit.relative
                        ),
                    );
                    file.media_id = hit.media_id;
                    file.metadata.file_type = FileType::Main;
                    file.metadata.episode = hit.relative;
                    file.metadata.canonical_episode_id = hit.relative.to_string();
                    return;
                }
                self.logger
                    .log(file, format!("no tree branch covers episode {episode}"));
                self.demote_overflow(file, entry, episode);
            }
            GroupAnalysis::Failed | GroupAnalysis::NotFetched => {
                self.logger
                    .log(file, "media tree unavailable, falling back to special");
                self.demote_overflow(file, entry, episode);
            }
        }
    }

    async fn fetch_analysis(&self, entry: &MediaEntry) -> GroupAnalysis {
        let tree = match tree::build_tree(
            entry,
            self.catalog.as_ref(),
            &self.cache,
            &self.catalog_limiter,
        )
        .await
        {
            Ok(tree) => tree,
            Err(err) => {
                error!(target: "scanner::hydrator", media_id = entry.id, %err, "tree fetch failed");
                return GroupAnalysis::Failed;
            }
        };
        match tree::analyze_tree(&tree, self.metadata.as_ref()).await {
            Ok(analysis) => GroupAnalysis::Ready(analysis),
            Err(err) => {
                error!(target: "scanner::hydrator", media_id = entry.id, %err, "tree analysis failed");
                GroupAnalysis::Failed
            }
        }
    }

    /// Part-split shortcut on the entry's own episode metadata.
    async fn try_part_relative(&self, entry: &MediaEntry, episode: i32) -> Option<i32> {
        let metadata = self
            .metadata
            .anime_metadata(MetadataPlatform::Anilist, entry.id)
            .await
            .ok()?;
        let ep1 = metadata.first_episode()?;
        let start = ep1.episode_number;
        if start <= 1 {
            return None;
        }
        let end = start + metadata.main_episode_count() - 1;
        (start <= episode && episode <= end).then(|| episode - (start - 1))
    }

    /// Forced-override normalization straight off the forced entry's
    /// metadata; no tree involved.
    async fn hydrate_forced(&self, file: &mut LocalFile, entry: &MediaEntry, episode: i32) {
        let metadata = match self
            .metadata
            .anime_metadata(MetadataPlatform::Anilist, entry.id)
            .await
        {
            Ok(m) => m,
            Err(err) => {
                warn!(target: "scanner::hydrator", media_id = entry.id, %err, "no metadata for forced entry");
                self.demote_overflow(file, entry, episode);
                return;
            }
        };

        let Some(ep1) = metadata.first_episode() else {
            self.demote_overflow(file, entry, episode);
            return;
        };
        let count = metadata.main_episode_count();

        // Part split: the provider numbers episodes relative to the
        // logical season.
        let part_start = ep1.episode_number;
        if part_start > 1
            && ep1.absolute_episode_number - part_start > 1
            && part_start <= episode
            && episode < part_start + count
        {
            let relative = episode - (part_start - 1);
            file.metadata.file_type = FileType::Main;
            file.metadata.episode = relative;
            file.metadata.canonical_episode_id = relative.to_string();
            self.logger
                .log(file, format!("forced normalization (part): {episode} -> {relative}"));
            return;
        }

        let absolute_start = ep1.absolute_episode_number;
        if absolute_start > 1 && absolute_start <= episode && episode < absolute_start + count {
            let relative = episode - (absolute_start - 1);
            file.metadata.file_type = FileType::Main;
            file.metadata.episode = relative;
            file.metadata.canonical_episode_id = relative.to_string();
            self.logger
                .log(file, format!("forced normalization: {episode} -> {relative}"));
            return;
        }

        self.demote_overflow(file, entry, episode);
    }

    fn demote_overflow(&self, file: &mut LocalFile, entry: &MediaEntry, episode: i32) {
        let current = entry.current_episode_count();
        let special = if current > 0 && episode > current {
            episode - current
        } else {
            episode
        };
        file.metadata.file_type = FileType::Special;
        file.metadata.episode = special;
        file.metadata.canonical_episode_id = format!("S{}", special.max(1));
        self.logger.log(
            file,
            format!("episode {episode} demoted to special {}", file.metadata.canonical_episode_id),
        );
    }
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
