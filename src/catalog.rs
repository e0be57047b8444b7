//! Loaded archives plus the name index built over them.
//!
//! A `Catalog` is plain data; the cached store wraps it in a lock and the
//! uncached store owns one outright.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use crate::archive::{Fingerprint, LibraryArchive, LinkStyle};
use crate::error::{ArchiveOpenError, IndexError};
use crate::model::{ArchiveId, ClassName};
use crate::registry::{ClassRegistry, Resolution};

/// Hands out archive ids; never reuses one.
#[derive(Debug)]
pub struct ArchiveIds(AtomicU64);

impl Default for ArchiveIds {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}

impl ArchiveIds {
    pub fn next(&self) -> ArchiveId {
        ArchiveId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub id: ArchiveId,
    pub path: PathBuf,
    pub library: Option<String>,
    pub version: Option<String>,
    pub project_url: Option<String>,
    pub class_count: usize,
    pub digest: String,
}

impl ArchiveSummary {
    fn of(archive: &LibraryArchive) -> Self {
        let metadata = archive.metadata();
        Self {
            id: archive.id(),
            path: archive.path().to_path_buf(),
            library: metadata.name.clone(),
            version: metadata.version.clone(),
            project_url: metadata.project_url.clone(),
            class_count: archive.class_count(),
            digest: archive.digest().to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Unreadable,
    DuplicateClass,
}

/// An archive file that is on disk but not being served.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedArchive {
    pub path: PathBuf,
    pub kind: RejectionKind,
    pub reason: String,
    #[serde(skip)]
    pub fingerprint: Option<Fingerprint>,
}

#[derive(Debug)]
pub struct Removed {
    pub archive: Arc<LibraryArchive>,
    pub classes: Vec<ClassName>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    archives: HashMap<ArchiveId, Arc<LibraryArchive>>,
    by_path: HashMap<PathBuf, ArchiveId>,
    registry: ClassRegistry,
    rejected: BTreeMap<PathBuf, RejectedArchive>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `paths` in parallel and indexes them in the given order, so which
    /// of two conflicting archives gets rejected is deterministic.
    pub fn load(paths: &[PathBuf], ids: &ArchiveIds) -> Self {
        let opened: Vec<(&PathBuf, Result<LibraryArchive, ArchiveOpenError>)> = paths
            .par_iter()
            .map(|path| (path, LibraryArchive::open(path, ids.next())))
            .collect();

        let mut catalog = Self::new();
        for (path, result) in opened {
            match result {
                Ok(archive) => {
                    if let Err(err) = catalog.add(archive) {
                        debug!(archive = %path.display(), %err, "archive not admitted at load");
                    }
                }
                Err(err) => catalog.reject_unreadable(path, &err),
            }
        }

        info!(
            archives = catalog.archive_count(),
            classes = catalog.class_count(),
            rejected = catalog.rejected.len(),
            "catalog loaded"
        );
        catalog
    }

    /// Indexes a freshly opened archive. Any archive previously loaded from
    /// the same path must have been removed first.
    pub fn add(&mut self, archive: LibraryArchive) -> Result<ArchiveId, IndexError> {
        let id = archive.id();
        let path = archive.path().to_path_buf();
        debug_assert!(!self.by_path.contains_key(&path));

        let names: Vec<ClassName> = archive.class_names().cloned().collect();
        match self.registry.insert(id, names) {
            Ok(()) => {
                info!(
                    archive = %path.display(),
                    %id,
                    classes = archive.class_count(),
                    "archive loaded"
                );
                self.rejected.remove(&path);
                self.by_path.insert(path, id);
                self.archives.insert(id, Arc::new(archive));
                Ok(id)
            }
            Err(err) => {
                let IndexError::DuplicateClass { existing, .. } = &err;
                let existing_path = self
                    .archives
                    .get(existing)
                    .map(|a| a.path().display().to_string())
                    .unwrap_or_default();
                error!(
                    archive = %path.display(),
                    existing = %existing_path,
                    %err,
                    "rejecting archive with a duplicate fully-qualified class name"
                );
                self.rejected.insert(
                    path.clone(),
                    RejectedArchive {
                        path,
                        kind: RejectionKind::DuplicateClass,
                        reason: format!("{err} ({existing_path})"),
                        fingerprint: Some(archive.fingerprint()),
                    },
                );
                Err(err)
            }
        }
    }

    /// Remembers a file that could not be opened so polling does not retry it
    /// until it changes.
    pub fn reject_unreadable(&mut self, path: &Path, err: &ArchiveOpenError) {
        warn!(archive = %path.display(), %err, "failed to open archive; treating it as absent");
        self.rejected.insert(
            path.to_path_buf(),
            RejectedArchive {
                path: path.to_path_buf(),
                kind: RejectionKind::Unreadable,
                reason: err.to_string(),
                fingerprint: Fingerprint::of(path).ok(),
            },
        );
    }

    pub fn forget_rejected(&mut self, path: &Path) -> Option<RejectedArchive> {
        self.rejected.remove(path)
    }

    /// Drops every duplicate-name rejection and returns the paths, so the
    /// caller can try them again once names have been freed.
    pub fn take_duplicate_rejections(&mut self) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = self
            .rejected
            .values()
            .filter(|r| r.kind == RejectionKind::DuplicateClass)
            .map(|r| r.path.clone())
            .collect();
        for path in &paths {
            self.rejected.remove(path);
        }
        paths
    }

    pub fn remove_path(&mut self, path: &Path) -> Option<Removed> {
        let id = self.by_path.remove(path)?;
        let archive = self.archives.remove(&id)?;
        let classes = self.registry.remove(id);
        info!(archive = %path.display(), %id, classes = classes.len(), "archive unloaded");
        Some(Removed { archive, classes })
    }

    /// Swaps in a re-opened archive whose bytes did not change, keeping its id
    /// so cached class documents stay valid.
    pub fn refresh(&mut self, archive: LibraryArchive) -> bool {
        match self.by_path.get(archive.path()) {
            Some(&id) if id == archive.id() => {
                self.archives.insert(id, Arc::new(archive));
                true
            }
            _ => false,
        }
    }

    pub fn archive(&self, id: ArchiveId) -> Option<&Arc<LibraryArchive>> {
        self.archives.get(&id)
    }

    pub fn archive_at(&self, path: &Path) -> Option<&Arc<LibraryArchive>> {
        self.by_path.get(path).and_then(|id| self.archives.get(id))
    }

    pub fn is_current(&self, id: ArchiveId) -> bool {
        self.archives.contains_key(&id)
    }

    /// Case-insensitive fully-qualified lookup of a class and its archive.
    pub fn lookup(&self, name: &str) -> Option<(&ClassName, &Arc<LibraryArchive>)> {
        let (class, id) = self.registry.find_qualified(name)?;
        let archive = self.archives.get(&id)?;
        Some((class, archive))
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        self.registry.resolve(name)
    }

    pub fn search(&self, query: &str) -> Vec<ClassName> {
        self.registry.search(query)
    }

    pub fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String> {
        let id = self.registry.owner(&class.fully_qualified)?;
        self.archives.get(&id)?.class_url(class, style)
    }

    pub fn summaries(&self) -> Vec<ArchiveSummary> {
        let mut summaries: Vec<ArchiveSummary> = self
            .archives
            .values()
            .map(|a| ArchiveSummary::of(a))
            .collect();
        summaries.sort_by(|a, b| a.path.cmp(&b.path));
        summaries
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RejectedArchive> + '_ {
        self.rejected.values()
    }

    pub fn rejected_at(&self, path: &Path) -> Option<&RejectedArchive> {
        self.rejected.get(path)
    }

    /// Fingerprints of every archive file the catalog knows about, served or not.
    pub fn known_fingerprints(&self) -> HashMap<PathBuf, Fingerprint> {
        let loaded = self
            .archives
            .values()
            .map(|a| (a.path().to_path_buf(), a.fingerprint()));
        let rejected = self
            .rejected
            .values()
            .filter_map(|r| r.fingerprint.map(|f| (r.path.clone(), f)));
        loaded.chain(rejected).collect()
    }

    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    pub fn class_count(&self) -> usize {
        self.registry.class_count()
    }
}
