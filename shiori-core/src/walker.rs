//! Recursive video file enumeration.
//!
//! The walker is symlink-aware and loop-safe: every directory is visited
//! at most once per resolved (canonical) path. Unreadable directories
//! are skipped with a warning rather than failing the scan.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Recognized video containers. Anything else is ignored.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "webm", "m4v"];

/// Lightweight metadata needed by the walker.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
}

/// Minimal async filesystem abstraction so the walker is testable
/// without touching a disk.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// List a directory's entries.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Metadata with symlinks followed.
    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    /// Resolve symlinks to a canonical absolute path.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Real filesystem backed by tokio::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

#[async_trait]
impl FileSystem for RealFs {
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(path).await?;
        while let Some(entry) = rd.next_entry().await? {
            entries.push(entry.path());
        }
        Ok(entries)
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let md = tokio::fs::metadata(path).await?;
        Ok(FsMetadata { is_dir: md.is_dir(), is_file: md.is_file() })
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }
}

/// Enumerates video files below a set of library directories.
pub struct FilesystemWalker {
    fs: Arc<dyn FileSystem>,
}

impl FilesystemWalker {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Walk `dirs` breadth-first and return every video file found,
    /// sorted and deduplicated by resolved path.
    pub async fn get_video_file_paths(&self, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut visited_dirs: HashSet<PathBuf> = HashSet::new();
        let mut seen_files: HashSet<PathBuf> = HashSet::new();
        let mut found: Vec<PathBuf> = Vec::new();
        let mut queue: VecDeque<PathBuf> = dirs.iter().cloned().collect();

        while let Some(dir) = queue.pop_front() {
            let resolved = match self.fs.canonicalize(&dir).await {
                Ok(p) => p,
                Err(err) => {
                    warn!(target: "scanner::walker", path = %dir.display(), %err, "cannot resolve directory, skipping");
                    continue;
                }
            };
            if !visited_dirs.insert(resolved) {
                // Symlink loop or duplicate library root.
                continue;
            }

            let entries = match self.fs.read_dir(&dir).await {
                Ok(e) => e,
                Err(err) => {
                    warn!(target: "scanner::walker", path = %dir.display(), %err, "cannot read directory, skipping");
                    continue;
                }
            };

            for entry in entries {
                let md = match self.fs.metadata(&entry).await {
                    Ok(md) => md,
                    Err(err) => {
                        warn!(target: "scanner::walker", path = %entry.display(), %err, "cannot stat entry, skipping");
                        continue;
                    }
                };
                if md.is_dir {
                    if is_hidden_dir(&entry) {
                        continue;
                    }
                    queue.push_back(entry);
                } else if md.is_file && has_video_extension(&entry) {
                    // Count a symlinked file once per resolved target.
                    let identity = self
                        .fs
                        .canonicalize(&entry)
                        .await
                        .unwrap_or_else(|_| entry.clone());
                    if seen_files.insert(identity) {
                        found.push(entry);
                    }
                }
            }
        }

        found.sort();
        debug!(target: "scanner::walker", files = found.len(), "walk complete");
        found
    }
}

fn is_hidden_dir(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// In-memory filesystem for tests.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    nodes: HashMap<PathBuf, InMemoryNode>,
    links: HashMap<PathBuf, PathBuf>,
}

#[derive(Debug, Clone)]
enum InMemoryNode {
    Dir(Vec<PathBuf>),
    File,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.nodes.contains_key(&path) {
            return;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && parent != Path::new("/") {
                self.add_dir(parent.to_path_buf());
            }
        }
        self.link_to_parent(&path);
        self.nodes.insert(path, InMemoryNode::Dir(Vec::new()));
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent.to_path_buf());
        }
        self.link_to_parent(&path);
        self.nodes.insert(path, InMemoryNode::File);
    }

    /// Register `path` as a symlink pointing at `target`.
    pub fn add_symlink(&mut self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        let path = path.into();
        self.link_to_parent(&path);
        self.links.insert(path, target.into());
    }

    fn link_to_parent(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            if parent.as_os_str().is_empty() {
                return;
            }
            if let Some(InMemoryNode::Dir(children)) = self.nodes.get_mut(parent) {
                if !children.contains(&path.to_path_buf()) {
                    children.push(path.to_path_buf());
                }
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let mut current = path.to_path_buf();
        let mut hops = 0;
        while let Some(target) = self.links.get(&current) {
            current = target.clone();
            hops += 1;
            if hops > 16 {
                break;
            }
        }
        current
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        match self.nodes.get(&self.resolve(path)) {
            Some(InMemoryNode::Dir(children)) => Ok(children.clone()),
            _ => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        match self.nodes.get(&self.resolve(path)) {
            Some(InMemoryNode::Dir(_)) => Ok(FsMetadata { is_dir: true, is_file: false }),
            Some(InMemoryNode::File) => Ok(FsMetadata { is_dir: false, is_file: true }),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolve(path);
        if self.nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(io::Error::from(io::ErrorKind::NotFound))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walker(fs: InMemoryFs) -> FilesystemWalker {
        FilesystemWalker::new(Arc::new(fs))
    }

    #[tokio::test]
    async fn finds_video_files_recursively() {
        let mut fs = InMemoryFs::new();
        fs.add_dir("/library");
        fs.add_file("/library/Show/Season 1/ep01.mkv");
        fs.add_file("/library/Show/Season 1/ep01.srt");
        fs.add_file("/library/movie.mp4");
        fs.add_file("/library/notes.txt");

        let found = walker(fs)
            .get_video_file_paths(&[PathBuf::from("/library")])
            .await;
        assert_eq!(
            found,
            vec![
                PathBuf::from("/library/Show/Season 1/ep01.mkv"),
                PathBuf::from("/library/movie.mp4"),
            ]
        );
    }

    #[tokio::test]
    async fn skips_hidden_directories() {
        let mut fs = InMemoryFs::new();
        fs.add_dir("/library");
        fs.add_file("/library/.trash/deleted.mkv");
        fs.add_file("/library/kept.mkv");

        let found = walker(fs)
            .get_video_file_paths(&[PathBuf::from("/library")])
            .await;
        assert_eq!(found, vec![PathBuf::from("/library/kept.mkv")]);
    }

    #[tokio::test]
    async fn symlink_loops_terminate() {
        let mut fs = InMemoryFs::new();
        fs.add_dir("/library");
        fs.add_file("/library/Show/ep01.mkv");
        fs.add_symlink("/library/Show/loop", "/library");

        let found = walker(fs)
            .get_video_file_paths(&[PathBuf::from("/library")])
            .await;
        assert_eq!(found, vec![PathBuf::from("/library/Show/ep01.mkv")]);
    }

    #[tokio::test]
    async fn symlinked_file_counted_once() {
        let mut fs = InMemoryFs::new();
        fs.add_dir("/library");
        fs.add_file("/library/a/ep01.mkv");
        fs.add_dir("/library/b");
        fs.add_symlink("/library/b/ep01.mkv", "/library/a/ep01.mkv");

        let found = walker(fs)
            .get_video_file_paths(&[PathBuf::from("/library")])
            .await;
        assert_eq!(found, vec![PathBuf::from("/library/a/ep01.mkv")]);
    }

    #[tokio::test]
    async fn real_fs_walks_a_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let show = dir.path().join("Show");
        std::fs::create_dir_all(&show).unwrap();
        std::fs::write(show.join("ep01.mkv"), b"x").unwrap();
        std::fs::write(show.join("cover.jpg"), b"x").unwrap();

        let found = FilesystemWalker::new(Arc::new(RealFs))
            .get_video_file_paths(&[dir.path().to_path_buf()])
            .await;
        assert_eq!(found, vec![show.join("ep01.mkv")]);
    }
}
