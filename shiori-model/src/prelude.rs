//! Convenience re-exports for downstream crates.

pub use crate::collection::{AnimeCollection, CollectionEntry, CollectionList, ListStatus};
pub use crate::file::{FileMetadata, FileType, LocalFile, normalize_path};
pub use crate::media::{
    FuzzyDate, MediaEdge, MediaEntry, MediaFormat, MediaRelation, MediaStatus,
    MediaTitle, NextAiringEpisode, RelatedNode, is_broad_relation_format,
};
pub use crate::metadata::{AnimeMetadata, EpisodeMetadata, ExternalMappings};
pub use crate::parsed::ParsedData;
pub use crate::scan::{ScanProgressEvent, ScanStatus};
