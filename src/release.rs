//! Directory-level view of a release folder.
//!
//! Only the tree is inspected here. Decoding FLAC streams is left to
//! external tools.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Errors raised while scanning a release folder.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The path does not exist or is not a directory.
    #[error("target path {0} not found")]
    NotADirectory(PathBuf),
    /// Walking the tree failed.
    #[error("could not read release folder: {0}")]
    Walk(#[from] walkdir::Error),
}

/// A regular file inside the release, relative to the release root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    /// Path relative to the release root.
    pub relative: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

impl ReleaseFile {
    /// Lower-cased extension including the leading dot (e.g. `".flac"`).
    pub fn extension(&self) -> String {
        self.relative
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    /// Extension exactly as written on disk, without lower-casing.
    pub fn raw_extension(&self) -> Option<String> {
        self.relative
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    /// File name component.
    pub fn file_name(&self) -> String {
        self.relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Snapshot of a release folder's files and subfolders.
#[derive(Debug, Clone)]
pub struct ReleaseDir {
    root: PathBuf,
    files: Vec<ReleaseFile>,
    dirs: Vec<PathBuf>,
    empty_dirs: Vec<PathBuf>,
}

impl ReleaseDir {
    /// Walk `root`, skipping any subfolder whose name is in `ignored_dirs`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if `root` is not a directory or cannot be read.
    pub fn scan(root: &Path, ignored_dirs: &[&str]) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut empty_dirs = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && ignored_dirs
                        .iter()
                        .any(|ignored| e.file_name().to_string_lossy() == *ignored))
            });

        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            if entry.file_type().is_dir() {
                let is_empty = std::fs::read_dir(entry.path())
                    .map(|mut it| it.next().is_none())
                    .unwrap_or(false);
                if is_empty {
                    empty_dirs.push(relative.clone());
                }
                dirs.push(relative);
            } else if entry.file_type().is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push(ReleaseFile { relative, size });
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            files,
            dirs,
            empty_dirs,
        })
    }

    /// Release root as given to [`ReleaseDir::scan`].
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the release folder itself.
    pub fn folder_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.to_string_lossy().into_owned())
    }

    /// All regular files.
    pub fn files(&self) -> &[ReleaseFile] {
        &self.files
    }

    /// All subfolders, relative to the root.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Subfolders without any entry.
    pub fn empty_dirs(&self) -> &[PathBuf] {
        &self.empty_dirs
    }

    /// FLAC tracks, in file name order.
    pub fn flacs(&self) -> Vec<&ReleaseFile> {
        self.files_with_extensions(&[".flac"])
    }

    /// Files whose lower-cased extension is in `extensions`.
    pub fn files_with_extensions(&self, extensions: &[&str]) -> Vec<&ReleaseFile> {
        self.files
            .iter()
            .filter(|f| extensions.contains(&f.extension().as_str()))
            .collect()
    }

    /// Files whose lower-cased extension is not in `allowed`.
    pub fn files_without_extensions(&self, allowed: &[&str]) -> Vec<&ReleaseFile> {
        self.files
            .iter()
            .filter(|f| !allowed.contains(&f.extension().as_str()))
            .collect()
    }

    /// Relative paths of files and folders whose name contains any of `needles`.
    pub fn names_containing(&self, needles: &[&str]) -> Vec<String> {
        self.entry_names()
            .filter(|(name, _)| needles.iter().any(|n| name.contains(n)))
            .map(|(_, path)| path)
            .collect()
    }

    /// Relative paths of files and folders whose name starts with any of `prefixes`.
    pub fn names_starting_with(&self, prefixes: &[&str]) -> Vec<String> {
        self.entry_names()
            .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p)))
            .map(|(_, path)| path)
            .collect()
    }

    /// Full paths (folder name included) longer than `max` characters.
    pub fn paths_longer_than(&self, max: usize) -> Vec<String> {
        let folder = self.folder_name();
        self.files
            .iter()
            .map(|f| format!("{folder}/{}", f.relative.to_string_lossy()))
            .filter(|p| p.chars().count() > max)
            .collect()
    }

    /// Total size of all files in bytes.
    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .fold(0u64, |acc, f| acc.saturating_add(f.size))
    }

    /// Whether `name` exists at the top level or in every folder holding tracks.
    pub fn has_file_in_track_folders(&self, name: &str) -> bool {
        let mut track_dirs: Vec<PathBuf> = self
            .flacs()
            .iter()
            .map(|f| f.relative.parent().map(Path::to_path_buf).unwrap_or_default())
            .collect();
        track_dirs.sort();
        track_dirs.dedup();

        let exists_in = |dir: &Path| {
            self.files
                .iter()
                .any(|f| f.relative.parent().unwrap_or(Path::new("")) == dir && f.file_name() == name)
        };

        if exists_in(Path::new("")) {
            return true;
        }
        !track_dirs.is_empty() && track_dirs.iter().all(|d| exists_in(d.as_path()))
    }

    fn entry_names(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.files
            .iter()
            .map(|f| f.relative.as_path())
            .chain(self.dirs.iter().map(PathBuf::as_path))
            .map(|p| {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (name, p.to_string_lossy().into_owned())
            })
    }
}
