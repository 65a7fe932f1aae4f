//! Recording file placement
//!
//! Stream names come straight from the publisher. They are flattened into a
//! single file name so the resolved path is always a direct child of the
//! base directory, whatever the input contains.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Longest file stem kept from a stream name
const MAX_STEM_LEN: usize = 200;

/// Stem used when nothing usable is left of the stream name
const FALLBACK_STEM: &str = "unnamed";

/// Maps stream names to recording paths under a base directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    extension: String,
}

impl PathResolver {
    pub fn new(base_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a stream name to `<base>/<sanitized>.<ext>`
    ///
    /// Creates the base directory if needed; a failure there is returned
    /// as an I/O error.
    pub fn resolve(&self, stream_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(self.base_dir.join(self.file_name(stream_name)))
    }

    /// File name for a stream, without touching the filesystem
    pub fn file_name(&self, stream_name: &str) -> String {
        if self.extension.is_empty() {
            sanitize(stream_name)
        } else {
            format!("{}.{}", sanitize(stream_name), self.extension)
        }
    }
}

/// Flatten a stream name into one safe file stem
///
/// The name is normalized as if rooted at `/` (so `..` can never climb
/// above the root), the surviving segments are joined with `_`, and any
/// byte outside `[A-Za-z0-9_-]` becomes `_`.
fn sanitize(stream_name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in stream_name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut stem: String = segments
        .join("_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.truncate(MAX_STEM_LEN);

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}
