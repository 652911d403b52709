//! Discovery of candidate module files.
//!
//! [`Scanner::candidates`] walks the configured roots lazily and yields every
//! regular file (or symlink to one) whose extension matches. Nothing is
//! opened. A root that is missing or unreadable contributes nothing and the
//! walk moves on to the next root.
//!
//! Entries are visited depth-first, sorted by file name within a directory,
//! so discovery order is the same on every platform. Symlinked directories
//! are not descended into.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::LoaderConfig;
use crate::module::platform_module_suffix;

/// Filters applied while walking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Accepted extensions without the dot. Empty accepts every file.
    pub extensions: Vec<String>,
    pub skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            extensions: vec![platform_module_suffix().to_string()],
            skip_hidden: true,
        }
    }
}

impl ScanOptions {
    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Walks root directories for loadable modules.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    roots: Vec<PathBuf>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            options: ScanOptions::default(),
        }
    }

    /// Roots and filters taken from a loader configuration.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            roots: config.search_paths.clone(),
            options: ScanOptions {
                recursive: config.recursive,
                extensions: config.file_extensions.clone(),
                skip_hidden: config.skip_hidden,
            },
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.options.recursive = recursive;
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Lazy, finite sequence of candidate module paths.
    pub fn candidates(&self) -> Candidates {
        Candidates {
            roots: self.roots.iter().cloned().collect(),
            stack: Vec::new(),
            options: self.options.clone(),
        }
    }
}

/// Call `callback` once for every regular file or file symlink under `root`.
///
/// No extension or hidden-file filtering is applied. An unreadable `root`
/// produces no calls.
pub fn for_each_file<F>(root: impl AsRef<Path>, recursive: bool, mut callback: F)
where
    F: FnMut(&Path),
{
    let scanner = Scanner::new([root.as_ref()]).with_options(ScanOptions {
        recursive,
        extensions: Vec::new(),
        skip_hidden: false,
    });
    for path in scanner.candidates() {
        callback(&path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
}

type Level = std::vec::IntoIter<(PathBuf, Kind)>;

/// Iterator returned by [`Scanner::candidates`].
#[derive(Debug)]
pub struct Candidates {
    roots: VecDeque<PathBuf>,
    stack: Vec<Level>,
    options: ScanOptions,
}

impl Iterator for Candidates {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(level) = self.stack.last_mut() {
                match level.next() {
                    Some((path, Kind::File)) => {
                        if self.options.accepts(&path) {
                            return Some(path);
                        }
                    }
                    Some((path, Kind::Dir)) => {
                        if self.options.recursive {
                            if let Some(level) = list_dir(&path, self.options.skip_hidden) {
                                self.stack.push(level);
                            }
                        }
                    }
                    None => {
                        self.stack.pop();
                    }
                }
                continue;
            }

            let root = self.roots.pop_front()?;
            match list_dir(&root, self.options.skip_hidden) {
                Some(level) => self.stack.push(level),
                None => tracing::debug!(root = %root.display(), "Skipping unreadable root"),
            }
        }
    }
}

fn list_dir(dir: &Path, skip_hidden: bool) -> Option<Level> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "Cannot read directory: {}", e);
            return None;
        }
    };

    let mut listing = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if skip_hidden && name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        let kind = if file_type.is_dir() {
            Kind::Dir
        } else if file_type.is_file() {
            Kind::File
        } else if file_type.is_symlink() {
            // Follow file symlinks only.
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => Kind::File,
                _ => continue,
            }
        } else {
            continue;
        };

        listing.push((path, kind));
    }

    listing.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Some(listing.into_iter())
}
