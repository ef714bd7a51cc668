//! Core data model definitions shared across Shiori crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod collection;
pub mod file;
pub mod media;
pub mod metadata;
pub mod parsed;
pub mod prelude;
pub mod scan;

// Intentionally curated re-exports for downstream consumers.
pub use collection::{AnimeCollection, CollectionEntry, CollectionList, ListStatus};
pub use file::{FileMetadata, FileType, LocalFile};
pub use media::{
    FuzzyDate, MediaEdge, MediaEntry, MediaFormat, MediaRelation, MediaStatus,
    MediaTitle, NextAiringEpisode, RelatedNode,
};
pub use metadata::{AnimeMetadata, EpisodeMetadata, ExternalMappings};
pub use parsed::ParsedData;
pub use scan::{ScanProgressEvent, ScanStatus};
