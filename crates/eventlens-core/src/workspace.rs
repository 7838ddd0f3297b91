//! Source discovery for analysis runs.
//!
//! This module walks a source root and produces the inventory of files to parse:
//! - Language detection by extension
//! - Deterministic ordering (sorted by relative path)
//! - Default and caller-supplied exclusion globs
//! - Content hashes for every discovered file

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

// ============================================================================
// Content Hash
// ============================================================================

/// SHA-256 hash of file content, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Language Detection
// ============================================================================

/// Source languages recognized during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// PHP source files (.php)
    Php,
    /// Unknown or unsupported language
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("php") => Language::Php,
            _ => Language::Unknown,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Php => write!(f, "php"),
            Language::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while discovering sources.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Source root does not exist or is not a directory.
    #[error("source root not found: {}", .path.display())]
    RootNotFound { path: PathBuf },

    /// An exclusion pattern is not a valid glob.
    #[error("invalid exclude pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    /// IO error while walking or reading.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Discovery Configuration
// ============================================================================

/// Default directory names excluded from discovery.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "node_modules"];

/// Configuration for source discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Language of files to include.
    pub language: Language,
    /// Glob patterns (matched against forward-slash relative paths) to exclude.
    pub exclude_patterns: Vec<String>,
    /// Whether to follow symlinks.
    pub follow_symlinks: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            language: Language::Php,
            exclude_patterns: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl DiscoveryConfig {
    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude_patterns.push(pattern.to_string());
        self
    }

    fn build_globset(&self) -> Result<GlobSet, WorkspaceError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|e| WorkspaceError::InvalidGlob {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| WorkspaceError::InvalidGlob {
            pattern: self.exclude_patterns.join(", "),
            message: e.to_string(),
        })
    }
}

/// Check if a path contains a default-excluded directory component.
fn is_default_excluded(path: &Path) -> bool {
    path.components().any(|component| match component {
        std::path::Component::Normal(name) => {
            let name = name.to_string_lossy();
            DEFAULT_EXCLUDE_DIRS.iter().any(|dir| name == *dir)
        }
        _ => false,
    })
}

// ============================================================================
// Discovered Sources
// ============================================================================

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Relative path from the source root (forward slashes).
    pub path: String,
    /// Absolute path on disk.
    pub full_path: PathBuf,
}

impl SourceEntry {
    /// Read the file's bytes.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.full_path)
    }
}

/// Discover all source files under `root`, sorted by relative path.
pub fn discover_sources(
    root: &Path,
    config: &DiscoveryConfig,
) -> Result<Vec<SourceEntry>, WorkspaceError> {
    if !root.is_dir() {
        return Err(WorkspaceError::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    let root = root.canonicalize()?;
    let excludes = config.build_globset()?;
    let mut entries = Vec::new();

    for entry in WalkDir::new(&root)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(&root)
                .map(|rel| !is_default_excluded(rel))
                .unwrap_or(true)
        })
    {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop detected"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let full_path = entry.path();
        if Language::from_path(full_path) != config.language {
            continue;
        }
        let relative = full_path.strip_prefix(&root).map_err(io::Error::other)?;
        let relative_str = relative
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        if excludes.is_match(&relative_str) {
            tracing::trace!(path = %relative_str, "excluded by pattern");
            continue;
        }
        entries.push(SourceEntry {
            path: relative_str,
            full_path: full_path.to_path_buf(),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(root = %root.display(), files = entries.len(), "discovered sources");
    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================
