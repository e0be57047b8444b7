//! One documentation archive on disk.
//!
//! Opening an archive reads its central directory and optional metadata only.
//! Class documents are parsed one at a time, on demand, by re-opening the
//! file, so a `LibraryArchive` never holds file handles between calls.

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ArchiveOpenError, DocumentError, EntryParseError, LookupError};
use crate::model::{ArchiveId, ClassInfo, ClassName};
use crate::parse::parse_class_document;

pub const METADATA_ENTRY: &str = "META-INF/javadoc.json";

const SKIPPED_STEMS: [&str; 2] = ["package-info", "module-info"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub url_pattern: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStyle {
    #[default]
    Direct,
    /// Route through the frameset `index.html?` page.
    Framed,
}

impl LibraryMetadata {
    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    /// `name version`, or just the name when no version is known.
    pub fn label(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        Some(match self.version.as_deref() {
            Some(version) => format!("{name} {version}"),
            None => name.to_string(),
        })
    }

    pub fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String> {
        let path = class.path();
        if let Some(pattern) = self.url_pattern.as_deref() {
            return Some(pattern.replace("{path}", &path));
        }

        let base = self.base_url.as_deref()?;
        let separator = if base.ends_with('/') { "" } else { "/" };
        Some(match style {
            LinkStyle::Direct => format!("{base}{separator}{path}.html"),
            LinkStyle::Framed => format!("{base}{separator}index.html?{path}.html"),
        })
    }

    pub fn member_url(&self, class: &ClassName, anchor: &str, style: LinkStyle) -> Option<String> {
        self.class_url(class, style)
            .map(|url| format!("{url}#{anchor}"))
    }
}

/// Size and modification time of an archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Clone)]
struct ClassEntry {
    name: ClassName,
    entry: String,
}

#[derive(Debug, Clone)]
pub struct LibraryArchive {
    id: ArchiveId,
    path: PathBuf,
    metadata: LibraryMetadata,
    fingerprint: Fingerprint,
    digest: String,
    classes: BTreeMap<String, ClassEntry>,
}

impl LibraryArchive {
    pub fn open(path: &Path, id: ArchiveId) -> Result<Self, ArchiveOpenError> {
        let io_err = |source| ArchiveOpenError::Io {
            path: path.to_path_buf(),
            source,
        };
        let zip_err = |source| ArchiveOpenError::Zip {
            path: path.to_path_buf(),
            source,
        };

        let fingerprint = Fingerprint::of(path).map_err(io_err)?;
        let file = File::open(path).map_err(io_err)?;
        // SAFETY: The file is opened read-only and the map is dropped before this
        // function returns; nothing borrowed from it outlives the call.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        let digest = hex::encode(Sha256::digest(&mmap[..]));
        let mut archive = ZipArchive::new(Cursor::new(&mmap[..])).map_err(zip_err)?;

        let mut metadata = LibraryMetadata::default();
        let mut classes = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(zip_err)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();

            if name == METADATA_ENTRY {
                metadata = read_metadata(&mut entry, path);
                continue;
            }
            if name.starts_with("META-INF/") {
                continue;
            }
            let Some(class_name) = ClassName::from_entry_path(&name) else {
                continue;
            };
            if SKIPPED_STEMS.contains(&class_name.simple.as_str()) {
                continue;
            }
            classes.insert(
                class_name.fully_qualified.clone(),
                ClassEntry {
                    name: class_name,
                    entry: name,
                },
            );
        }

        debug!(
            archive = %path.display(),
            %id,
            classes = classes.len(),
            library = metadata.label().as_deref().unwrap_or("<anonymous>"),
            "opened archive"
        );

        Ok(Self {
            id,
            path: path.to_path_buf(),
            metadata,
            fingerprint,
            digest,
            classes,
        })
    }

    pub fn id(&self) -> ArchiveId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &LibraryMetadata {
        &self.metadata
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Hex SHA-256 of the archive bytes at open time.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &ClassName> + '_ {
        self.classes.values().map(|c| &c.name)
    }

    pub fn contains(&self, fully_qualified: &str) -> bool {
        self.classes.contains_key(fully_qualified)
    }

    /// Same archive contents under another id; used when a reload finds the
    /// bytes unchanged.
    pub(crate) fn with_id(mut self, id: ArchiveId) -> Self {
        self.id = id;
        self
    }

    pub fn class_url(&self, class: &ClassName, style: LinkStyle) -> Option<String> {
        self.metadata.class_url(class, style)
    }

    /// Parses exactly one class document. Unknown names are `Ok(None)`.
    pub fn class_info(&self, fully_qualified: &str) -> Result<Option<ClassInfo>, LookupError> {
        let Some(class) = self.classes.get(fully_qualified) else {
            return Ok(None);
        };

        let io_err = |source| ArchiveOpenError::Io {
            path: self.path.clone(),
            source,
        };
        let current = Fingerprint::of(&self.path).map_err(io_err)?;
        if current != self.fingerprint {
            return Err(LookupError::Stale {
                path: self.path.clone(),
            });
        }

        let file = File::open(&self.path).map_err(io_err)?;
        // SAFETY: Read-only map, dropped at the end of this call.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        let mut archive =
            ZipArchive::new(Cursor::new(&mmap[..])).map_err(|source| ArchiveOpenError::Zip {
                path: self.path.clone(),
                source,
            })?;

        let xml = match read_entry(&mut archive, &class.entry) {
            Ok(xml) => xml,
            Err(DocumentError::Read(ZipError::FileNotFound)) => return Ok(None),
            Err(kind) => return Err(self.entry_error(class, kind).into()),
        };

        parse_class_document(&xml, &class.name, self.id)
            .map(Some)
            .map_err(|kind| self.entry_error(class, kind).into())
    }

    fn entry_error(&self, class: &ClassEntry, kind: DocumentError) -> EntryParseError {
        EntryParseError {
            archive: self.path.clone(),
            entry: class.entry.clone(),
            kind,
        }
    }
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    entry: &str,
) -> Result<String, DocumentError> {
    let mut file = archive.by_name(entry)?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn read_metadata(entry: &mut impl Read, archive: &Path) -> LibraryMetadata {
    let mut buf = Vec::new();
    if let Err(err) = entry.read_to_end(&mut buf) {
        warn!(archive = %archive.display(), %err, "failed to read library metadata; treating archive as anonymous");
        return LibraryMetadata::default();
    }
    match serde_json::from_slice(&buf) {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(archive = %archive.display(), %err, "malformed library metadata; treating archive as anonymous");
            LibraryMetadata::default()
        }
    }
}
