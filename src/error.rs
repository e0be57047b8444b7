use std::path::PathBuf;
use thiserror::Error;

use crate::model::ArchiveId;

/// The file could not be opened as a documentation archive.
#[derive(Debug, Error)]
pub enum ArchiveOpenError {
    #[error("failed to read archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a readable zip archive: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveOpenError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. } | Self::Zip { path, .. } => path,
        }
    }
}

/// One class document inside an otherwise healthy archive is unusable.
#[derive(Debug, Error)]
#[error("failed to parse {entry} in {}: {kind}", archive.display())]
pub struct EntryParseError {
    pub archive: PathBuf,
    pub entry: String,
    #[source]
    pub kind: DocumentError,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("entry could not be read: {0}")]
    Read(#[from] zip::result::ZipError),
    #[error("entry could not be decompressed: {0}")]
    Io(#[from] std::io::Error),
    #[error("entry is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("malformed xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Archive(#[from] ArchiveOpenError),
    #[error(transparent)]
    Entry(#[from] EntryParseError),
    #[error("archive {} changed on disk since it was loaded", path.display())]
    Stale { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("class {class} is already provided by archive {existing}")]
    DuplicateClass { class: String, existing: ArchiveId },
}

/// The OS file-watch primitive failed; freshness can no longer be guaranteed.
#[derive(Debug, Error)]
pub enum WatcherFatalError {
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("archive directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to create archive directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Watcher(#[from] WatcherFatalError),
}
