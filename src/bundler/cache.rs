//! Per-build caches
//!
//! A [`BuildContext`] is created for each top-level compile and shared by
//! every nested component build and file copy it triggers. Starting a new
//! run means creating a new context.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::BundleInfo;

/// Canonical component source path -> destination of its compiled module
#[derive(Debug, Default)]
pub struct BuildCache {
    entries: DashMap<PathBuf, PathBuf>,
}

impl BuildCache {
    pub fn get(&self, source: &Path) -> Option<PathBuf> {
        self.entries.get(source).map(|entry| entry.value().clone())
    }

    /// Record a destination before the component is built
    pub fn register(&self, source: PathBuf, destination: PathBuf) {
        self.entries.insert(source, destination);
    }

    /// Forget a component whose build failed
    pub fn evict(&self, source: &Path) {
        self.entries.remove(source);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source file -> destinations it was already copied to
#[derive(Debug, Default)]
pub struct CopyCache {
    entries: DashMap<PathBuf, HashSet<PathBuf>>,
}

impl CopyCache {
    /// Claim the `(source, destination)` pair; `false` if it was claimed before
    pub fn claim(&self, source: &Path, destination: &Path) -> bool {
        self.entries
            .entry(source.to_path_buf())
            .or_default()
            .insert(destination.to_path_buf())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State shared across one top-level build
#[derive(Debug, Default)]
pub struct BuildContext {
    pub build_cache: BuildCache,
    pub copy_cache: CopyCache,
    outputs: Mutex<Vec<BundleInfo>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, bundle: BundleInfo) {
        self.outputs.lock().push(bundle);
    }

    /// Every module written so far, nested components first
    pub fn outputs(&self) -> Vec<BundleInfo> {
        self.outputs.lock().clone()
    }
}
