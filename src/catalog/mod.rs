// Catalog module: persisted, sorted collection of known releases

pub mod model;
pub mod plugins;
pub mod resolver;

pub use model::{Architecture, Download, EDITOR_PACKAGE_ID, FileType, Module, Platform, Release};
pub use resolver::PackageSelection;

use crate::constants;
use crate::version::{ReleaseType, VersionIdentity};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of adding a release to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    New,
    Updated,
}

/// On-disk snapshot of the catalog
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    format: u32,
    releases: Vec<Release>,
    #[serde(default)]
    last_updated: BTreeMap<ReleaseType, DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FormatHeader {
    format: Option<u32>,
}

/// Known releases, kept sorted newest first
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    releases: Vec<Release>,
    last_updated: BTreeMap<ReleaseType, DateTime<Utc>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog from disk. A missing file or a different format version
    /// yields an empty catalog that will be rebuilt on the next update.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No catalog at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog '{}'", path.display()))?;

        let header: FormatHeader = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse catalog '{}'", path.display()))?;
        if header.format != Some(constants::CATALOG_FORMAT) {
            warn!(
                "Catalog format {:?} does not match {}, discarding cached releases",
                header.format,
                constants::CATALOG_FORMAT
            );
            return Ok(Self::new());
        }

        let file: CatalogFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse catalog '{}'", path.display()))?;

        let mut catalog = Self {
            releases: Vec::with_capacity(file.releases.len()),
            last_updated: file.last_updated,
        };
        for release in file.releases {
            catalog.add(release);
        }
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CatalogFile {
            format: constants::CATALOG_FORMAT,
            releases: self.releases.clone(),
            last_updated: self.last_updated.clone(),
        };
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write catalog '{}'", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Find the newest release matching `version`.
    ///
    /// Full versions must match exactly (or by content hash), partial versions are
    /// used as a fuzzy filter.
    pub fn find(&self, version: &VersionIdentity) -> Option<Release> {
        if !version.is_valid() {
            return None;
        }
        let found = if version.is_full() {
            self.releases
                .iter()
                .find(|r| is_same_release(&r.version, version))
        } else {
            self.releases
                .iter()
                .find(|r| version.fuzzy_matches(&r.version))
        };
        found.cloned()
    }

    /// Add a release or merge it into the existing entry for the same version
    pub fn add(&mut self, release: Release) -> AddOutcome {
        if let Some(existing) = self
            .releases
            .iter_mut()
            .find(|r| is_same_release(&r.version, &release.version))
        {
            debug!("Merging release {} into catalog", release.version);
            existing.merge(release);
            return AddOutcome::Updated;
        }

        let position = self
            .releases
            .iter()
            .position(|r| release.version.compare(&r.version).is_gt())
            .unwrap_or(self.releases.len());
        debug!("Adding release {} to catalog", release.version);
        self.releases.insert(position, release);
        AddOutcome::New
    }

    /// Add many releases, returning the ones that were not known before
    pub fn add_all(&mut self, releases: impl IntoIterator<Item = Release>) -> Vec<Release> {
        let mut added = Vec::new();
        for release in releases {
            let copy = release.clone();
            if self.add(release) == AddOutcome::New {
                added.push(copy);
            }
        }
        added
    }

    /// Releases at least as stable as `min_type`, newest first
    pub fn releases_of(&self, min_type: ReleaseType) -> Vec<&Release> {
        self.releases
            .iter()
            .filter(|r| r.version.release_type.rank() >= min_type.rank())
            .collect()
    }

    pub fn last_updated(&self, release_type: ReleaseType) -> Option<DateTime<Utc>> {
        self.last_updated.get(&release_type).copied()
    }

    pub fn is_outdated(&self, release_type: ReleaseType, max_age: Duration) -> bool {
        match self.last_updated(release_type) {
            Some(updated) => Utc::now() - updated > max_age,
            None => true,
        }
    }

    pub fn mark_updated(&mut self, release_type: ReleaseType) {
        self.last_updated.insert(release_type, Utc::now());
    }
}

fn is_same_release(a: &VersionIdentity, b: &VersionIdentity) -> bool {
    if a == b {
        return true;
    }
    matches!((&a.hash, &b.hash), (Some(x), Some(y)) if x == y)
}
