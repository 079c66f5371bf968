//! Repository walker.
//!
//! Yields the text files of a repository in file-name order. Binary, oversized
//! and unreadable files are skipped and recorded in [`WalkStats`] instead of
//! failing the walk.

mod language;

pub use language::Language;

use crate::report::{FailureEntry, SkipReason, SkippedFile, Stage};
use globset::{Glob, GlobSet, GlobSetBuilder};
use locodata_core::{AppError, AppResult, WalkerConfig};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories never worth descending into.
const NOISE_DIRS: [&str; 7] = [
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
];

const BINARY_EXTENSIONS: [&str; 40] = [
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "pdf", "zip", "gz", "tgz", "tar",
    "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "o", "a", "lib",
    "bin", "dat", "db", "sqlite", "woff", "woff2", "ttf", "otf", "mp3", "mp4", "wav", "pyc",
    "wasm",
];

/// Bytes inspected for a NUL when sniffing binary content.
const SNIFF_LEN: usize = 8 * 1024;

/// A text file read from the repository.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the root, `/`-separated
    pub path: String,
    pub abs_path: PathBuf,
    pub language: Language,
    pub text: String,
    pub size: u64,
}

/// What a walk saw besides the files it yielded.
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    pub files_walked: usize,
    pub skipped_binary: usize,
    pub skipped_oversize: usize,
    pub skipped_unreadable: usize,
    pub limit_reached: bool,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<FailureEntry>,
}

/// Walker over one repository root.
pub struct RepoWalker {
    root: PathBuf,
    config: WalkerConfig,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl RepoWalker {
    /// Validate the root and compile the glob rules.
    ///
    /// A missing or non-directory root is a configuration error.
    pub fn new(root: &Path, config: &WalkerConfig) -> AppResult<Self> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            AppError::Config(format!("Repository root {:?} is unreadable: {}", root, e))
        })?;
        if !metadata.is_dir() {
            return Err(AppError::Config(format!(
                "Repository root {:?} is not a directory",
                root
            )));
        }

        let include = if config.include.is_empty() {
            None
        } else {
            Some(build_globset(&config.include)?)
        };

        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            include,
            exclude: build_globset(&config.exclude)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new walk from the beginning.
    pub fn walk(&self) -> Walk<'_> {
        let entries = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_pruned(entry));

        Walk {
            walker: self,
            entries: Box::new(entries),
            visited: HashSet::new(),
            stats: WalkStats::default(),
            done: false,
        }
    }

    fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn selected(&self, rel: &str, language: Language) -> bool {
        if self.exclude.is_match(rel) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(rel),
            None => language.is_known(),
        }
    }
}

fn build_globset(patterns: &[String]) -> AppResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| AppError::Config(format!("Invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| AppError::Config(format!("Invalid glob set: {}", e)))
}

fn is_pruned(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && NOISE_DIRS.contains(&name.as_ref()))
}

fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

enum FileContent {
    Text(String),
    Binary,
}

fn read_text(path: &Path) -> std::io::Result<FileContent> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;

    if bytes[..bytes.len().min(SNIFF_LEN)].contains(&0) {
        return Ok(FileContent::Binary);
    }
    Ok(match String::from_utf8(bytes) {
        Ok(text) => FileContent::Text(text),
        Err(_) => FileContent::Binary,
    })
}

/// A single pass over the repository.
///
/// Finite and not restartable; call [`RepoWalker::walk`] again to start over.
pub struct Walk<'a> {
    walker: &'a RepoWalker,
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
    /// Canonical paths already yielded
    visited: HashSet<PathBuf>,
    stats: WalkStats,
    done: bool,
}

impl Walk<'_> {
    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    pub fn into_stats(self) -> WalkStats {
        self.stats
    }

    fn skip(&mut self, rel: String, reason: SkipReason, detail: Option<String>) {
        match reason {
            SkipReason::Binary => self.stats.skipped_binary += 1,
            SkipReason::Oversize => self.stats.skipped_oversize += 1,
            SkipReason::Unreadable => self.stats.skipped_unreadable += 1,
        }
        tracing::debug!(path = %rel, ?reason, "Skipping file");
        self.stats.skipped.push(SkippedFile {
            path: rel,
            reason,
            detail,
        });
    }

    fn unreadable(&mut self, rel: String, error: std::io::Error) {
        let error = AppError::Io(error);
        tracing::warn!(path = %rel, %error, "Unreadable file");
        self.stats
            .failures
            .push(FailureEntry::new(Stage::Walk, rel.clone(), &error));
        self.skip(rel, SkipReason::Unreadable, Some(error.to_string()));
    }

    /// Turn one directory entry into a source file, or record why not.
    fn visit(&mut self, entry: DirEntry) -> Option<SourceFile> {
        if !entry.file_type().is_file() {
            return None;
        }

        let path = entry.path();
        let rel = self.walker.relative(path);

        // Cheap pre-filter before touching the file; shebang detection needs the content.
        let ext_language = path
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension);
        if self.walker.exclude.is_match(&rel) {
            return None;
        }
        if self.walker.include.is_none()
            && ext_language == Some(Language::Unknown)
            && !has_binary_extension(path)
        {
            return None;
        }

        match std::fs::canonicalize(path) {
            Ok(real) => {
                if !self.visited.insert(real) {
                    tracing::debug!(path = %rel, "Already visited through another link");
                    return None;
                }
            }
            Err(e) => {
                self.unreadable(rel, e);
                return None;
            }
        }

        if has_binary_extension(path) {
            if self.walker.include.as_ref().map_or(true, |i| i.is_match(&rel)) {
                self.skip(rel, SkipReason::Binary, None);
            }
            return None;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                let error = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
                self.unreadable(rel, error);
                return None;
            }
        };

        if size > self.walker.config.max_file_size {
            self.skip(
                rel,
                SkipReason::Oversize,
                Some(format!(
                    "{} bytes > {} byte limit",
                    size, self.walker.config.max_file_size
                )),
            );
            return None;
        }

        let text = match read_text(path) {
            Ok(FileContent::Text(text)) => text,
            Ok(FileContent::Binary) => {
                self.skip(rel, SkipReason::Binary, None);
                return None;
            }
            Err(e) => {
                self.unreadable(rel, e);
                return None;
            }
        };

        let language = Language::detect(path, &text);
        if !self.walker.selected(&rel, language) {
            return None;
        }

        Some(SourceFile {
            path: rel,
            abs_path: path.to_path_buf(),
            language,
            text,
            size,
        })
    }
}

impl Iterator for Walk<'_> {
    type Item = SourceFile;

    fn next(&mut self) -> Option<SourceFile> {
        while !self.done {
            let entry = match self.entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    if e.loop_ancestor().is_some() {
                        tracing::debug!("Skipping symlink cycle: {}", e);
                    } else {
                        let rel = e
                            .path()
                            .map(|p| self.walker.relative(p))
                            .unwrap_or_default();
                        let error = e
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("walk error"));
                        self.unreadable(rel, error);
                    }
                    continue;
                }
                None => {
                    self.done = true;
                    break;
                }
            };

            if let Some(file) = self.visit(entry) {
                if let Some(max) = self.walker.config.max_files {
                    if self.stats.files_walked >= max {
                        tracing::info!(max, "File limit reached, stopping walk");
                        self.stats.limit_reached = true;
                        self.done = true;
                        break;
                    }
                }
                self.stats.files_walked += 1;
                return Some(file);
            }
        }
        None
    }
}
