//! Scan orchestration.
//!
//! Wires the pipeline together: walk, parse, fetch, match, hydrate,
//! merge, summarize. Emits the fixed progress sequence on an event
//! sink and honors a cancellation token at every stage boundary.

use std::collections::HashMap;
use std::sync::Arc;

use shiori_model::{LocalFile, ScanProgressEvent};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::container::MediaContainer;
use crate::error::{Result, ScanError};
use crate::fetcher::MediaFetcher;
use crate::hydrator::FileHydrator;
use crate::limiter::Limiter;
use crate::matcher::Matcher;
use crate::parse;
use crate::platform::{CatalogPlatform, EntryCache, MalSearch, MetadataProvider};
use crate::summary::{ScanSummary, ScanSummaryLogger};
use crate::walker::{FileSystem, FilesystemWalker, RealFs};

/// Receives scan progress events. Implementations must be cheap; the
/// scanner emits from its own task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanProgressEvent);
}

/// Discards all events.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ScanProgressEvent) {}
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<ScanProgressEvent> {
    fn emit(&self, event: ScanProgressEvent) {
        let _ = self.send(event);
    }
}

/// What a finished scan hands back.
#[derive(Debug)]
pub struct ScanResult {
    /// Deduplicated file records, sorted by path.
    pub files: Vec<LocalFile>,
    pub summary: ScanSummary,
}

pub struct Scanner {
    config: ScanConfig,
    catalog: Arc<dyn CatalogPlatform>,
    mal: Arc<dyn MalSearch>,
    metadata: Arc<dyn MetadataProvider>,
    fs: Arc<dyn FileSystem>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        catalog: Arc<dyn CatalogPlatform>,
        mal: Arc<dyn MalSearch>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            config,
            catalog,
            mal,
            metadata,
            fs: Arc::new(RealFs),
            events: Arc::new(NoopSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one scan against the previously known file records.
    pub async fn scan(&self, existing: Vec<LocalFile>) -> Result<ScanResult> {
        let cache = Arc::new(EntryCache::new());
        let catalog_limiter = Arc::new(Limiter::catalog());
        let logger = Arc::new(ScanSummaryLogger::new());

        self.emit(ScanProgressEvent::new(10, "retrieving files"));
        let paths = self
            .guarded(
                FilesystemWalker::new(Arc::clone(&self.fs))
                    .get_video_file_paths(&self.config.all_paths()),
            )
            .await?;

        // Split what we found into files to scan and files to carry
        // through untouched.
        let existing_by_path: HashMap<String, LocalFile> = existing
            .into_iter()
            .map(|f| (f.normalized_path(), f))
            .collect();
        let mut skipped: Vec<LocalFile> = Vec::new();
        let mut to_scan: Vec<std::path::PathBuf> = Vec::new();
        for path in paths {
            let known = existing_by_path.get(&shiori_model::file::normalize_path(&path));
            match known {
                Some(file)
                    if (file.locked && self.config.skip_locked)
                        || (file.ignored && self.config.skip_ignored) =>
                {
                    skipped.push(file.clone());
                }
                _ => to_scan.push(path),
            }
        }

        if to_scan.is_empty() && skipped.is_empty() {
            return Err(ScanError::NoLocalFiles);
        }
        if to_scan.is_empty() {
            // Nothing new on disk; the surviving records are the result.
            // Consumers still get the full checkpoint sequence.
            self.emit(ScanProgressEvent::new(20, fetch_message(self.config.enhanced)));
            self.emit(ScanProgressEvent::new(40, "matching"));
            self.emit(ScanProgressEvent::silent(60));
            self.emit(ScanProgressEvent::new(70, "hydrating metadata"));
            self.emit(ScanProgressEvent::silent(80));
            self.emit(ScanProgressEvent::new(90, "verifying integrity"));
            skipped.sort_by(|a, b| a.path.cmp(&b.path));
            self.emit(ScanProgressEvent::new(100, "complete"));
            let container = MediaContainer::new(Vec::new());
            let summary = logger.build(&skipped, &container, &Default::default());
            return Ok(ScanResult { files: skipped, summary });
        }

        let mut files = self.guarded(parse_files(to_scan, &self.config)).await?;
        // Known records keep their flags; locked ones keep everything.
        for file in &mut files {
            if let Some(known) = existing_by_path.get(&file.normalized_path()) {
                file.locked = known.locked;
                file.ignored = known.ignored;
                if known.locked {
                    file.media_id = known.media_id;
                    file.metadata = known.metadata.clone();
                }
            }
        }
        info!(target: "scanner", new = files.len(), skipped = skipped.len(), "files retrieved");

        self.emit(ScanProgressEvent::new(20, fetch_message(self.config.enhanced)));
        let fetcher = MediaFetcher::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.mal),
            Arc::clone(&self.metadata),
            Arc::clone(&cache),
            Arc::clone(&catalog_limiter),
        );
        let fetched = self.guarded(fetcher.fetch(&files, self.config.enhanced)).await??;
        let container = Arc::new(MediaContainer::new(fetched.entries));

        self.emit(ScanProgressEvent::new(40, "matching"));
        if let Some(forced) = self.config.force_media_id {
            if container.entry(forced).is_none() {
                warn!(target: "scanner", media_id = forced, "forced media id is not in the candidate set");
            }
            for file in &mut files {
                if file.locked {
                    continue;
                }
                file.media_id = forced;
                logger.log(file, format!("forced onto media {forced}"));
            }
        } else {
            let matcher = Matcher::new(Arc::clone(&container), Arc::clone(&logger));
            self.guarded(matcher.match_files(&mut files)).await??;
        }
        self.emit(ScanProgressEvent::silent(60));

        self.emit(ScanProgressEvent::new(70, "hydrating metadata"));
        let hydrator = FileHydrator::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.metadata),
            Arc::clone(&container),
            Arc::clone(&cache),
            Arc::clone(&catalog_limiter),
            Arc::clone(&logger),
            self.config.force_media_id,
        );
        let mut files = self.guarded(hydrator.hydrate(files)).await?;
        self.emit(ScanProgressEvent::silent(80));

        self.emit(ScanProgressEvent::new(90, "verifying integrity"));
        files.append(&mut skipped);
        let mut seen = std::collections::HashSet::new();
        files.retain(|f| seen.insert(f.normalized_path()));
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let summary = logger.build(&files, &container, &fetched.collection_ids);
        self.emit(ScanProgressEvent::new(100, "complete"));
        debug!(target: "scanner", files = files.len(), "scan complete");
        Ok(ScanResult { files, summary })
    }

    fn emit(&self, event: ScanProgressEvent) {
        self.events.emit(event);
    }

    /// Run a stage future, aborting at its next suspension point when
    /// the scan is cancelled.
    async fn guarded<T>(&self, fut: impl std::future::Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
            value = fut => Ok(value),
        }
    }
}

fn fetch_message(enhanced: bool) -> &'static str {
    if enhanced {
        "fetching media detected from file titles"
    } else {
        "fetching media"
    }
}

/// Parse every found path into a LocalFile, in parallel.
async fn parse_files(paths: Vec<std::path::PathBuf>, config: &ScanConfig) -> Vec<LocalFile> {
    let roots = config.all_paths();
    let mut set: JoinSet<(usize, LocalFile)> = JoinSet::new();
    for (idx, path) in paths.into_iter().enumerate() {
        let root = roots
            .iter()
            .find(|r| path.starts_with(r))
            .cloned()
            .unwrap_or_else(|| config.library_path.clone());
        set.spawn_blocking(move || {
            let mut file = LocalFile::new(path, root);
            file.parsed = parse::parse_filename(&file.name);
            file.parsed_folders = parse::parse_folder_components(&file.path, &file.library_root);
            (idx, file)
        });
    }

    let mut files: Vec<(usize, LocalFile)> = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(item) = joined {
            files.push(item);
        }
    }
    files.sort_by_key(|(idx, _)| *idx);
    files.into_iter().map(|(_, f)| f).collect()
}
