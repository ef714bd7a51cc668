//! # Shiori Core
//!
//! The scan pipeline behind Shiori: point it at a library of downloaded
//! anime video files and it identifies which series each file belongs
//! to, which episode it is, and enriches each record with canonical
//! metadata from the catalog.
//!
//! ## Overview
//!
//! A scan flows through four tightly coupled stages:
//!
//! - [`fetcher`]: builds the candidate set from the user's collection,
//!   optionally discovering entries from parsed file titles
//! - [`matcher`]: assigns each file a candidate entry through a
//!   multi-algorithm title-similarity vote with group validation
//! - [`hydrator`]: resolves episode numbering, including cross-season
//!   absolute-to-relative normalization
//! - [`tree`]: sequel/prequel graph traversal deriving per-entry
//!   absolute-episode ranges
//!
//! [`scanner::Scanner`] orchestrates the stages, emits progress events
//! and honors cancellation. External services are reached through the
//! traits in [`platform`]; tests substitute in-process fakes.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shiori_core::config::ScanConfig;
//! use shiori_core::platform::{AnilistClient, MalClient, MappingsClient};
//! use shiori_core::scanner::Scanner;
//!
//! async fn run() -> shiori_core::Result<()> {
//!     let scanner = Scanner::new(
//!         ScanConfig::new("/mnt/anime"),
//!         Arc::new(AnilistClient::new(None)),
//!         Arc::new(MalClient::new()),
//!         Arc::new(MappingsClient::new()),
//!     );
//!     let result = scanner.scan(Vec::new()).await?;
//!     println!("{} files", result.files.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod fetcher;
pub mod hydrator;
pub mod limiter;
pub mod matcher;
pub mod normalize;
pub mod parse;
pub mod platform;
pub mod scanner;
pub mod summary;
pub mod tree;
pub mod walker;

pub use config::ScanConfig;
pub use error::{Result, ScanError};
pub use scanner::{EventSink, NoopSink, ScanResult, Scanner};
pub use summary::ScanSummary;
