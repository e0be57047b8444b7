//! Lookup surface shared by both stores, and the uncached store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::archive::{LibraryArchive, LinkStyle};
use crate::catalog::{ArchiveIds, ArchiveSummary, Catalog, RejectedArchive};
use crate::error::{LookupError, StoreError};
use crate::model::{ClassInfo, ClassName};
use crate::registry::Resolution;
use crate::scan::{ArchiveFilter, scan_archives};

/// What a consumer can ask of a documentation store.
pub trait DocStore: Send + Sync {
    fn resolve(&self, name: &str) -> Resolution;

    fn search(&self, query: &str) -> Vec<ClassName>;

    /// Parsed documentation for a fully-qualified name (matched
    /// case-insensitively). `Ok(None)` when no loaded archive has it.
    fn lookup(&self, fully_qualified: &str) -> Result<Option<Arc<ClassInfo>>, LookupError>;

    fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String>;

    /// Link to a method or constructor, e.g. `get(int)` or `<init>()`.
    fn member_url(&self, class: &ClassName, anchor: &str, style: LinkStyle) -> Option<String> {
        self.class_url(class, style)
            .map(|url| format!("{url}#{anchor}"))
    }

    fn archives(&self) -> Vec<ArchiveSummary>;

    fn rejected(&self) -> Vec<RejectedArchive>;

    /// Like [`DocStore::lookup`], but a broken archive or class document is
    /// logged and reported as absent.
    fn class_info(&self, fully_qualified: &str) -> Option<Arc<ClassInfo>> {
        match self.lookup(fully_qualified) {
            Ok(info) => info,
            Err(err) => {
                warn!(class = fully_qualified, %err, "class documentation unavailable");
                None
            }
        }
    }
}

/// Scans the directory once and never looks again. Every class lookup
/// re-opens and re-parses the owning archive, so the archive set is fixed
/// while archive contents are always current.
pub struct UncachedStore {
    dir: PathBuf,
    catalog: Catalog,
}

impl UncachedStore {
    pub fn open(dir: &Path, filter: &ArchiveFilter) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir.to_path_buf()));
        }
        let paths = scan_archives(dir, filter);
        let catalog = Catalog::load(&paths, &ArchiveIds::default());
        Ok(Self {
            dir: dir.to_path_buf(),
            catalog,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocStore for UncachedStore {
    fn resolve(&self, name: &str) -> Resolution {
        self.catalog.resolve(name)
    }

    fn search(&self, query: &str) -> Vec<ClassName> {
        self.catalog.search(query)
    }

    fn lookup(&self, fully_qualified: &str) -> Result<Option<Arc<ClassInfo>>, LookupError> {
        let Some((class, archive)) = self.catalog.lookup(fully_qualified) else {
            return Ok(None);
        };
        let current = LibraryArchive::open(archive.path(), archive.id())?;
        Ok(current.class_info(&class.fully_qualified)?.map(Arc::new))
    }

    fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String> {
        self.catalog.class_url(class, style)
    }

    fn archives(&self) -> Vec<ArchiveSummary> {
        self.catalog.summaries()
    }

    fn rejected(&self) -> Vec<RejectedArchive> {
        self.catalog.rejected().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::METADATA_ENTRY;
    use crate::testing::{class_xml, temp_dir, write_archive};

    #[test]
    fn uncached_store_serves_fixed_archive_set() -> anyhow::Result<()> {
        let dir = temp_dir("uncached");
        write_archive(
            &dir.join("jdk.zip"),
            &[
                (METADATA_ENTRY, r#"{"name":"JDK","baseUrl":"https://docs.example/api/"}"#),
                ("java/util/List.xml", &class_xml("interface", "")),
                ("java/util/Broken.xml", "<interface"),
            ],
        )?;
        write_archive(
            &dir.join("awt.zip"),
            &[("java/awt/List.xml", &class_xml("class", ""))],
        )?;
        std::fs::write(dir.join("notes.txt"), b"ignored")?;

        let store = UncachedStore::open(&dir, &ArchiveFilter::default())?;
        assert_eq!(store.archives().len(), 2);
        assert!(matches!(store.resolve("list"), Resolution::Ambiguous(c) if c.len() == 2));

        let list = store.class_info("JAVA.UTIL.LIST").unwrap();
        assert_eq!(list.name.fully_qualified, "java.util.List");
        assert_eq!(
            store.class_url(&list.name, LinkStyle::Direct).as_deref(),
            Some("https://docs.example/api/java/util/List.html")
        );
        assert!(store.class_url(&ClassName::new("java.awt.List"), LinkStyle::Direct).is_none());
        assert_eq!(
            store.member_url(&list.name, "get(int)", LinkStyle::Framed).as_deref(),
            Some("https://docs.example/api/index.html?java/util/List.html#get(int)")
        );

        assert!(matches!(store.lookup("java.util.Broken"), Err(LookupError::Entry(_))));
        assert!(store.class_info("java.util.Broken").is_none());
        assert!(store.class_info("java.util.List").is_some());

        write_archive(
            &dir.join("late.zip"),
            &[("org/late/Late.xml", &class_xml("class", ""))],
        )?;
        assert_eq!(store.resolve("Late"), Resolution::NotFound);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn uncached_store_reads_rewritten_archive_contents() -> anyhow::Result<()> {
        let dir = temp_dir("uncached_rewrite");
        let path = dir.join("lib.zip");
        write_archive(&path, &[("a/B.xml", "<class><description>v1</description></class>")])?;

        let store = UncachedStore::open(&dir, &ArchiveFilter::default())?;
        assert_eq!(store.class_info("a.B").unwrap().description, "v1");

        write_archive(
            &path,
            &[("a/B.xml", "<class><description>version two</description></class>")],
        )?;
        assert_eq!(store.lookup("a.B")?.unwrap().description, "version two");
        assert_eq!(store.class_info("a.B").unwrap().description, "version two");

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn uncached_store_requires_existing_directory() {
        let dir = temp_dir("uncached_missing").join("absent");
        let err = UncachedStore::open(&dir, &ArchiveFilter::default()).err().unwrap();
        assert!(matches!(err, StoreError::MissingDirectory(_)));
    }
}
