//! Cached store: an eagerly built name index, lazily parsed class documents
//! and a background watcher keeping both in step with the directory.
//!
//! Parsed classes are keyed by `(ArchiveId, fully-qualified name)`. Archive
//! ids are never reused, so a document parsed from an archive that has since
//! been replaced can never be served for the new one: the insert is refused
//! when the id is no longer current, and removal evicts the old keys.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::archive::{Fingerprint, LibraryArchive, LinkStyle};
use crate::catalog::{ArchiveIds, ArchiveSummary, Catalog, RejectedArchive, Removed};
use crate::config::{StoreConfig, WatchFallback, WatchMode};
use crate::error::{LookupError, StoreError};
use crate::incremental::{DirectoryChanges, scan_changes};
use crate::model::{ArchiveId, ClassInfo, ClassName};
use crate::registry::Resolution;
use crate::scan::{ArchiveFilter, scan_archives};
use crate::store::DocStore;
use crate::watcher::DirectoryWatcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub archives: usize,
    pub classes: usize,
    pub rejected: usize,
    pub cached_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub parses: u64,
    /// Parses whose archive was replaced before the result could be cached.
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    parses: AtomicU64,
    discarded: AtomicU64,
}

/// State shared between the store handle and its watcher thread.
#[derive(Debug)]
pub(crate) struct StoreState {
    dir: PathBuf,
    filter: ArchiveFilter,
    ids: ArchiveIds,
    catalog: RwLock<Catalog>,
    classes: DashMap<(ArchiveId, String), Arc<ClassInfo>>,
    counters: Counters,
    /// Serializes index mutations; readers never take it.
    mutation: Mutex<()>,
}

impl StoreState {
    fn new(dir: PathBuf, filter: ArchiveFilter) -> Self {
        let ids = ArchiveIds::default();
        let catalog = Catalog::load(&scan_archives(&dir, &filter), &ids);
        Self {
            dir,
            filter,
            ids,
            catalog: RwLock::new(catalog),
            classes: DashMap::new(),
            counters: Counters::default(),
            mutation: Mutex::new(()),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a path reported by the notifier onto the directory as we scan
    /// it, or `None` when it cannot be an archive we serve.
    pub(crate) fn archive_path(&self, reported: &Path) -> Option<PathBuf> {
        let path = self.dir.join(reported.file_name()?);
        self.filter.matches(&path).then_some(path)
    }

    /// Brings the index in line with whatever is at `path` right now.
    pub(crate) fn apply(&self, path: &Path) {
        let _guard = self.mutation.lock();
        if path.is_file() {
            self.upsert(path);
        } else {
            self.remove(path);
        }
    }

    /// Full rescan against the fingerprints the index knows about.
    pub(crate) fn reconcile(&self) -> DirectoryChanges {
        let _guard = self.mutation.lock();
        let known = self.catalog.read().known_fingerprints();
        let changes = scan_changes(&self.dir, &self.filter, &known);

        for path in &changes.removed {
            self.remove(path);
        }
        for path in changes.created.iter().chain(&changes.modified) {
            self.upsert(path);
        }

        if !changes.is_empty() {
            info!(
                created = changes.created.len(),
                modified = changes.modified.len(),
                removed = changes.removed.len(),
                "archive directory reconciled"
            );
        }
        changes
    }

    fn upsert(&self, path: &Path) {
        if !self.filter.matches(path) {
            return;
        }
        let Ok(fingerprint) = Fingerprint::of(path) else {
            self.remove(path);
            return;
        };

        let current = {
            let catalog = self.catalog.read();
            if catalog
                .rejected_at(path)
                .is_some_and(|r| r.fingerprint == Some(fingerprint))
            {
                return;
            }
            catalog.archive_at(path).cloned()
        };
        if current
            .as_ref()
            .is_some_and(|a| a.fingerprint() == fingerprint)
        {
            return;
        }

        // Opening and hashing happen before any write lock is taken.
        let opened = LibraryArchive::open(path, self.ids.next());

        let freed = {
            let mut catalog = self.catalog.write();
            match opened {
                Err(err) => {
                    let freed = catalog.remove_path(path).map(|r| self.evict(&r)).is_some();
                    catalog.reject_unreadable(path, &err);
                    freed
                }
                Ok(archive) => {
                    if let Some(current) = current.filter(|c| c.digest() == archive.digest()) {
                        debug!(archive = %path.display(), id = %current.id(), "archive touched; contents unchanged");
                        catalog.refresh(archive.with_id(current.id()));
                        return;
                    }
                    let freed = catalog.remove_path(path).map(|r| self.evict(&r)).is_some();
                    catalog.forget_rejected(path);
                    if let Err(err) = catalog.add(archive) {
                        debug!(archive = %path.display(), %err, "reloaded archive not admitted");
                    }
                    freed
                }
            }
        };

        if freed {
            self.retry_duplicates();
        }
    }

    fn remove(&self, path: &Path) {
        let freed = {
            let mut catalog = self.catalog.write();
            catalog.forget_rejected(path);
            catalog.remove_path(path).map(|r| self.evict(&r)).is_some()
        };
        if freed {
            self.retry_duplicates();
        }
    }

    /// Caller holds the catalog write lock, so no lookup can re-insert an
    /// evicted key in between.
    fn evict(&self, removed: &Removed) {
        let id = removed.archive.id();
        let before = self.classes.len();
        for class in &removed.classes {
            self.classes.remove(&(id, class.fully_qualified.clone()));
        }
        debug!(%id, evicted = before.saturating_sub(self.classes.len()), "cache entries evicted");
    }

    /// Archives rejected for clashing names get another chance once an
    /// archive has gone away.
    fn retry_duplicates(&self) {
        let paths = self.catalog.write().take_duplicate_rejections();
        for path in paths {
            self.upsert(&path);
        }
    }

    /// An archive found changed on disk is reloaded right here, under the
    /// mutation lock, and the lookup answered from the new generation.
    fn lookup(&self, fully_qualified: &str) -> Result<Option<Arc<ClassInfo>>, LookupError> {
        match self.lookup_current(fully_qualified) {
            Err(LookupError::Stale { path }) => {
                debug!(archive = %path.display(), class = fully_qualified, "archive changed on disk; reloading before lookup");
                self.apply(&path);
                self.lookup_current(fully_qualified)
            }
            result => result,
        }
    }

    fn lookup_current(&self, fully_qualified: &str) -> Result<Option<Arc<ClassInfo>>, LookupError> {
        let (class, archive) = {
            let catalog = self.catalog.read();
            match catalog.lookup(fully_qualified) {
                Some((class, archive)) => (class.fully_qualified.clone(), Arc::clone(archive)),
                None => return Ok(None),
            }
        };

        let key = (archive.id(), class);
        if let Some(hit) = self.classes.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(Arc::clone(hit.value())));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.counters.parses.fetch_add(1, Ordering::Relaxed);
        let Some(info) = archive.class_info(&key.1)? else {
            return Ok(None);
        };
        let info = Arc::new(info);

        let catalog = self.catalog.read();
        if !catalog.is_current(key.0) {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(class = %key.1, archive = %key.0, "archive replaced during parse; result not cached");
            return Ok(Some(info));
        }
        let cached = Arc::clone(self.classes.entry(key).or_insert(info).value());
        Ok(Some(cached))
    }

    fn stats(&self) -> CacheStats {
        let catalog = self.catalog.read();
        CacheStats {
            archives: catalog.archive_count(),
            classes: catalog.class_count(),
            rejected: catalog.rejected().count(),
            cached_entries: self.classes.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            parses: self.counters.parses.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Documentation store that keeps its index live while it is open.
///
/// Reads take the catalog's read lock and parse outside it, so a slow parse
/// never holds up other readers. A read that finds its archive rewritten
/// applies that change itself rather than waiting for the watcher.
#[derive(Debug)]
pub struct CachedStore {
    state: Arc<StoreState>,
    watcher: Option<DirectoryWatcher>,
}

impl CachedStore {
    /// Creates the directory if needed, indexes it and starts watching
    /// according to `config.watch`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.dir).map_err(|source| StoreError::CreateDirectory {
            path: config.dir.clone(),
            source,
        })?;

        let state = Arc::new(StoreState::new(config.dir.clone(), config.filter()));

        let watcher = match config.watch {
            WatchMode::Off => None,
            WatchMode::Notify | WatchMode::Poll => {
                match DirectoryWatcher::spawn(Arc::clone(&state), &config) {
                    Ok(watcher) => Some(watcher),
                    Err(err) if config.fallback == WatchFallback::Fail => return Err(err.into()),
                    Err(err) => {
                        error!(dir = %config.dir.display(), %err, "directory watching unavailable; serving a static index");
                        None
                    }
                }
            }
        };

        Ok(Self { state, watcher })
    }

    pub fn dir(&self) -> &Path {
        self.state.dir()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| w.is_polling())
    }

    pub fn stats(&self) -> CacheStats {
        self.state.stats()
    }

    /// Rescans the directory now instead of waiting for the watcher.
    pub fn refresh(&self) -> DirectoryChanges {
        self.state.reconcile()
    }

    /// Stops the watcher and waits for it to finish any change in progress.
    pub fn close(mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.shutdown();
        }
    }
}

impl DocStore for CachedStore {
    fn resolve(&self, name: &str) -> Resolution {
        self.state.catalog.read().resolve(name)
    }

    fn search(&self, query: &str) -> Vec<ClassName> {
        self.state.catalog.read().search(query)
    }

    fn lookup(&self, fully_qualified: &str) -> Result<Option<Arc<ClassInfo>>, LookupError> {
        self.state.lookup(fully_qualified)
    }

    fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String> {
        self.state.catalog.read().class_url(class, style)
    }

    fn archives(&self) -> Vec<ArchiveSummary> {
        self.state.catalog.read().summaries()
    }

    fn rejected(&self) -> Vec<RejectedArchive> {
        self.state.catalog.read().rejected().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{class_xml, temp_dir, write_archive};

    fn static_store(dir: &Path) -> CachedStore {
        CachedStore::open(StoreConfig::new(dir).with_watch(WatchMode::Off)).unwrap()
    }

    #[test]
    fn lookups_parse_once_and_share_the_result() -> anyhow::Result<()> {
        let dir = temp_dir("cached_once");
        write_archive(
            &dir.join("lib.zip"),
            &[("org/lib/Widget.xml", &class_xml("class", ""))],
        )?;

        let store = static_store(&dir);
        let first = store.class_info("org.lib.Widget").unwrap();
        let second = store.class_info("ORG.LIB.WIDGET").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = store.stats();
        assert_eq!(stats.parses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cached_entries, 1);
        assert!(store.class_info("org.lib.Missing").is_none());

        store.close();
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn concurrent_first_lookups_agree() -> anyhow::Result<()> {
        let dir = temp_dir("cached_concurrent");
        write_archive(
            &dir.join("lib.zip"),
            &[("org/lib/Widget.xml", &class_xml("class", ""))],
        )?;

        let store = static_store(&dir);
        let results: Vec<Arc<ClassInfo>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.class_info("org.lib.Widget").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0]) || **r == *results[0]));
        assert_eq!(store.stats().cached_entries, 1);
        assert_eq!(store.stats().discarded, 0);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn replacing_an_archive_evicts_its_documents() -> anyhow::Result<()> {
        let dir = temp_dir("cached_replace");
        let path = dir.join("lib.zip");
        write_archive(
            &path,
            &[("org/lib/Widget.xml", r#"<class><description>v1</description></class>"#)],
        )?;

        let store = static_store(&dir);
        let v1 = store.class_info("org.lib.Widget").unwrap();
        assert_eq!(v1.description, "v1");

        write_archive(
            &path,
            &[
                ("org/lib/Widget.xml", r#"<class><description>version 2</description></class>"#),
                ("org/lib/Gadget.xml", &class_xml("class", "")),
            ],
        )?;
        let changes = store.refresh();
        assert_eq!(changes.modified, vec![path.clone()]);

        let v2 = store.class_info("org.lib.Widget").unwrap();
        assert_eq!(v2.description, "version 2");
        assert_ne!(v1.owning_archive, v2.owning_archive);
        assert!(store.resolve("Gadget").found().is_some());
        assert_eq!(store.stats().cached_entries, 1);

        std::fs::remove_file(&path)?;
        assert_eq!(store.refresh().removed, vec![path]);
        assert!(store.class_info("org.lib.Widget").is_none());
        assert_eq!(store.stats().cached_entries, 0);
        assert_eq!(store.resolve("Widget"), Resolution::NotFound);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn static_store_serves_rewritten_archive_from_new_generation() -> anyhow::Result<()> {
        let dir = temp_dir("cached_static_rewrite");
        let path = dir.join("lib.zip");
        write_archive(&path, &[("a/B.xml", "<class><description>v1</description></class>")])?;

        let store = static_store(&dir);
        let old_id = store.archives()[0].id;

        write_archive(
            &path,
            &[("a/B.xml", "<class><description>version two</description></class>")],
        )?;
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert!(store.resolve("B").found().is_some());
        let info = store.class_info("a.B").unwrap();
        assert_eq!(info.description, "version two");
        assert_ne!(info.owning_archive, old_id);
        assert_eq!(store.archives().len(), 1);
        assert_eq!(store.archives()[0].id, info.owning_archive);
        assert_eq!(store.stats().cached_entries, 1);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn touching_an_archive_keeps_cached_documents() -> anyhow::Result<()> {
        let dir = temp_dir("cached_touch");
        let path = dir.join("lib.zip");
        let entries = [("org/lib/Widget.xml", class_xml("class", ""))];
        let entries: Vec<(&str, &str)> = entries.iter().map(|(n, c)| (*n, c.as_str())).collect();
        write_archive(&path, &entries)?;

        let store = static_store(&dir);
        let before = store.class_info("org.lib.Widget").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let bytes = std::fs::read(&path)?;
        std::fs::write(&path, bytes)?;
        store.refresh();

        let after = store.class_info("org.lib.Widget").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(store.stats().parses, 1);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn removing_an_owner_admits_the_rejected_duplicate() -> anyhow::Result<()> {
        let dir = temp_dir("cached_duplicate");
        let first = dir.join("a.zip");
        let second = dir.join("b.zip");
        write_archive(&first, &[("org/lib/Widget.xml", &class_xml("class", ""))])?;
        write_archive(
            &second,
            &[
                ("org/lib/Widget.xml", &class_xml("class", "")),
                ("org/lib/Extra.xml", &class_xml("class", "")),
            ],
        )?;

        let store = static_store(&dir);
        assert_eq!(store.rejected().len(), 1);
        assert_eq!(store.resolve("Extra"), Resolution::NotFound);

        std::fs::remove_file(&first)?;
        store.refresh();

        assert!(store.rejected().is_empty());
        assert_eq!(store.archives().len(), 1);
        assert!(store.resolve("Extra").found().is_some());
        let widget = store.class_info("org.lib.Widget").unwrap();
        assert_eq!(
            store.archives()[0].id,
            widget.owning_archive,
        );

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn unreadable_archive_is_absent_until_fixed() -> anyhow::Result<()> {
        let dir = temp_dir("cached_unreadable");
        let path = dir.join("lib.zip");
        std::fs::write(&path, b"partial download")?;

        let store = static_store(&dir);
        assert!(store.archives().is_empty());
        assert_eq!(store.rejected().len(), 1);
        assert!(store.refresh().is_empty());

        write_archive(&path, &[("org/lib/Widget.xml", &class_xml("class", ""))])?;
        store.refresh();
        assert!(store.rejected().is_empty());
        assert!(store.class_info("org.lib.Widget").is_some());

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn open_creates_missing_directory() -> anyhow::Result<()> {
        let dir = temp_dir("cached_create").join("nested").join("archives");
        let store = static_store(&dir);
        assert!(dir.is_dir());
        assert!(!store.is_watching());
        assert_eq!(store.stats(), CacheStats::default());
        Ok(())
    }
}
