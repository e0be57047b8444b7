//! Fingerprint-based change detection for the archive directory.
//!
//! Used when filesystem notifications are unavailable (polling) and to
//! reconcile the store after the notifier reports lost events.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::archive::Fingerprint;
use crate::scan::{ArchiveFilter, scan_archives};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryChanges {
    pub scanned: usize,
    pub created: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl DirectoryChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Compares the archives currently in `dir` against `known` fingerprints.
///
/// A file that vanishes between listing and `stat` counts as removed.
pub fn scan_changes(
    dir: &Path,
    filter: &ArchiveFilter,
    known: &HashMap<PathBuf, Fingerprint>,
) -> DirectoryChanges {
    let archives = scan_archives(dir, filter);
    let mut changes = DirectoryChanges {
        scanned: archives.len(),
        ..Default::default()
    };

    let mut seen = HashSet::with_capacity(archives.len());
    for path in archives {
        let Ok(current) = Fingerprint::of(&path) else {
            continue;
        };
        match known.get(&path) {
            None => changes.created.push(path.clone()),
            Some(previous) if *previous != current => changes.modified.push(path.clone()),
            Some(_) => {}
        }
        seen.insert(path);
    }

    let mut removed: Vec<PathBuf> = known
        .keys()
        .filter(|path| !seen.contains(*path))
        .cloned()
        .collect();
    removed.sort();
    changes.removed = removed;
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;
    use std::time::Duration;

    fn snapshot(paths: &[&PathBuf]) -> HashMap<PathBuf, Fingerprint> {
        paths
            .iter()
            .map(|p| ((*p).clone(), Fingerprint::of(p).unwrap()))
            .collect()
    }

    #[test]
    fn scan_changes_detects_created_modified_and_removed() {
        let dir = temp_dir("incremental");
        let filter = ArchiveFilter::default();
        let a = dir.join("a.zip");
        let b = dir.join("b.zip");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"x").unwrap();
        std::fs::write(dir.join("ignored.txt"), b"x").unwrap();

        let first = scan_changes(&dir, &filter, &HashMap::new());
        assert_eq!(first.scanned, 2);
        assert_eq!(first.created, vec![a.clone(), b.clone()]);

        let known = snapshot(&[&a, &b]);
        assert!(scan_changes(&dir, &filter, &known).is_empty());

        std::thread::sleep(Duration::from_millis(5));
        std::fs::write(&a, b"longer contents").unwrap();
        std::fs::remove_file(&b).unwrap();
        let changes = scan_changes(&dir, &filter, &known);
        assert_eq!(changes.modified, vec![a.clone()]);
        assert_eq!(changes.removed, vec![b.clone()]);
        assert!(changes.created.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }
}
