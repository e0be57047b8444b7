use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSIONS: [&str; 2] = ["zip", "jar"];

/// Decides which files in the watched directory are archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFilter {
    extensions: Vec<String>,
}

impl Default for ArchiveFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl ArchiveFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Extension check only; hidden files (editor swap files, partial
    /// downloads) never match.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if file_name.starts_with('.') {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

/// Archive files directly inside `dir`, sorted by path.
pub fn scan_archives(dir: &Path, filter: &ArchiveFilter) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .build();

    let mut archives: Vec<PathBuf> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| filter.matches(path))
        .collect();
    archives.sort();
    archives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;
    use std::fs;

    #[test]
    fn filter_matches_extensions_case_insensitively() {
        let filter = ArchiveFilter::new([".ZIP", "jar", " "]);
        assert_eq!(filter.extensions(), ["zip".to_string(), "jar".to_string()]);
        assert!(filter.matches(Path::new("/docs/jdk.zip")));
        assert!(filter.matches(Path::new("/docs/guava.JAR")));
        assert!(!filter.matches(Path::new("/docs/notes.txt")));
        assert!(!filter.matches(Path::new("/docs/.jdk.zip")));
        assert!(!filter.matches(Path::new("/docs/zip")));
    }

    #[test]
    fn scan_lists_top_level_archives_only() {
        let dir = temp_dir("scan");
        fs::write(dir.join("b.zip"), b"x").unwrap();
        fs::write(dir.join("a.jar"), b"x").unwrap();
        fs::write(dir.join("readme.md"), b"x").unwrap();
        fs::write(dir.join(".hidden.zip"), b"x").unwrap();
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("c.zip"), b"x").unwrap();

        let found = scan_archives(&dir, &ArchiveFilter::default());
        assert_eq!(found, vec![dir.join("a.jar"), dir.join("b.zip")]);

        let _ = fs::remove_dir_all(dir);
    }
}
