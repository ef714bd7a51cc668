//! Per-file scan trace and end-of-scan summary.
//!
//! Every pipeline stage appends human-readable decisions for a file
//! ("no comparison results", "matched to 131586 (0.82)", ...). After
//! hydration the traces are folded into a serializable [`ScanSummary`]
//! grouped by matched media.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shiori_model::{FileType, LocalFile};
use tracing::trace;

use crate::container::MediaContainer;

/// Collects ordered per-file log lines from concurrent pipeline stages.
#[derive(Debug, Default)]
pub struct ScanSummaryLogger {
    traces: DashMap<String, Vec<String>>,
}

impl ScanSummaryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decision line to a file's trace.
    pub fn log(&self, file: &LocalFile, message: impl Into<String>) {
        let message = message.into();
        trace!(target: "scanner::summary", path = %file.path.display(), "{message}");
        self.traces
            .entry(file.normalized_path())
            .or_default()
            .push(message);
    }

    pub fn trace_for(&self, file: &LocalFile) -> Vec<String> {
        self.traces
            .get(&file.normalized_path())
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Fold the traces into the final summary.
    pub fn build(
        &self,
        files: &[LocalFile],
        container: &MediaContainer,
        collection_ids: &HashSet<i32>,
    ) -> ScanSummary {
        let mut groups: BTreeMap<i32, SummaryGroup> = BTreeMap::new();
        let mut unmatched = Vec::new();

        for file in files {
            let summary_file = SummaryFile {
                path: file.path.display().to_string(),
                episode: file.metadata.episode,
                canonical_episode_id: file.metadata.canonical_episode_id.clone(),
                file_type: file.metadata.file_type,
                logs: self.trace_for(file),
            };
            if file.media_id == 0 {
                unmatched.push(summary_file);
                continue;
            }
            let group = groups.entry(file.media_id).or_insert_with(|| SummaryGroup {
                media_id: file.media_id,
                media_title: container
                    .entry(file.media_id)
                    .map(|e| e.title_safe().to_string())
                    .unwrap_or_default(),
                in_collection: collection_ids.contains(&file.media_id),
                files: Vec::new(),
            });
            group.files.push(summary_file);
        }

        for group in groups.values_mut() {
            group.files.sort_by(|a, b| a.path.cmp(&b.path));
        }
        unmatched.sort_by(|a, b| a.path.cmp(&b.path));

        ScanSummary {
            groups: groups.into_values().collect(),
            unmatched,
        }
    }
}

/// Final, serializable scan report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub groups: Vec<SummaryGroup>,
    pub unmatched: Vec<SummaryFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryGroup {
    pub media_id: i32,
    pub media_title: String,
    /// Whether the entry was already on the user's list.
    pub in_collection: bool,
    pub files: Vec<SummaryFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFile {
    pub path: String,
    pub episode: i32,
    pub canonical_episode_id: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub logs: Vec<String>,
}
