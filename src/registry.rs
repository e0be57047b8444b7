//! Global name index over every loaded archive.
//!
//! Each archive contributes its class names under its `ArchiveId`; adding or
//! removing one archive touches only that contribution. Fully-qualified names
//! have exactly one owner, simple names may be shared between archives.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::error::IndexError;
use crate::model::{ArchiveId, ClassName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "classes", rename_all = "snake_case")]
pub enum Resolution {
    Found(ClassName),
    /// Every candidate, sorted by fully-qualified name.
    Ambiguous(Vec<ClassName>),
    NotFound,
}

impl Resolution {
    pub fn found(&self) -> Option<&ClassName> {
        match self {
            Self::Found(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClassRegistry {
    owners: HashMap<String, ArchiveId>,
    by_folded_name: HashMap<String, BTreeSet<ClassName>>,
    by_simple_name: HashMap<String, BTreeSet<ClassName>>,
    contributions: HashMap<ArchiveId, Vec<ClassName>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, fully_qualified: &str) -> Option<ArchiveId> {
        self.owners.get(fully_qualified).copied()
    }

    pub fn contains_archive(&self, id: ArchiveId) -> bool {
        self.contributions.contains_key(&id)
    }

    pub fn class_count(&self) -> usize {
        self.owners.len()
    }

    pub fn archive_count(&self) -> usize {
        self.contributions.len()
    }

    /// First class in `names` that another archive already owns.
    pub fn conflict<'a>(&self, names: &'a [ClassName]) -> Option<(&'a ClassName, ArchiveId)> {
        names
            .iter()
            .find_map(|name| self.owner(&name.fully_qualified).map(|owner| (name, owner)))
    }

    /// Adds an archive's classes. All-or-nothing: on a duplicate
    /// fully-qualified name nothing is inserted.
    pub fn insert(&mut self, id: ArchiveId, names: Vec<ClassName>) -> Result<(), IndexError> {
        if let Some((name, existing)) = self.conflict(&names) {
            return Err(IndexError::DuplicateClass {
                class: name.fully_qualified.clone(),
                existing,
            });
        }

        for name in names.iter() {
            self.owners.insert(name.fully_qualified.clone(), id);
            self.by_folded_name
                .entry(name.fully_qualified.to_lowercase())
                .or_default()
                .insert(name.clone());
            self.by_simple_name
                .entry(name.simple.to_lowercase())
                .or_default()
                .insert(name.clone());
        }
        self.contributions.insert(id, names);
        Ok(())
    }

    /// Drops an archive's contribution and returns the names it owned.
    pub fn remove(&mut self, id: ArchiveId) -> Vec<ClassName> {
        let Some(names) = self.contributions.remove(&id) else {
            return Vec::new();
        };

        for name in names.iter() {
            if self.owners.get(&name.fully_qualified) == Some(&id) {
                self.owners.remove(&name.fully_qualified);
            }
            remove_from(&mut self.by_folded_name, &name.fully_qualified.to_lowercase(), name);
            remove_from(&mut self.by_simple_name, &name.simple.to_lowercase(), name);
        }
        names
    }

    /// Case-insensitive fully-qualified lookup. When names differ only by
    /// case, the exact spelling wins.
    pub fn find_qualified(&self, name: &str) -> Option<(&ClassName, ArchiveId)> {
        let name = name.trim();
        let candidates = self.by_folded_name.get(&name.to_lowercase())?;
        let chosen = if candidates.len() == 1 {
            candidates.iter().next()
        } else {
            candidates.iter().find(|c| c.fully_qualified == name)
        }?;
        let owner = self.owner(&chosen.fully_qualified)?;
        Some((chosen, owner))
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        let name = name.trim();
        if name.is_empty() {
            return Resolution::NotFound;
        }

        if let Some(candidates) = self.by_folded_name.get(&name.to_lowercase()) {
            if let Some((found, _)) = self.find_qualified(name) {
                return Resolution::Found(found.clone());
            }
            return Resolution::Ambiguous(candidates.iter().cloned().collect());
        }

        let Some(candidates) = self.by_simple_name.get(&name.to_lowercase()) else {
            return Resolution::NotFound;
        };
        let mut iter = candidates.iter();
        match (iter.next(), iter.next()) {
            (Some(only), None) => Resolution::Found(only.clone()),
            (Some(_), Some(_)) => Resolution::Ambiguous(candidates.iter().cloned().collect()),
            _ => Resolution::NotFound,
        }
    }

    /// Case-insensitive substring match on simple names only.
    pub fn search(&self, query: &str) -> Vec<ClassName> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let matches: BTreeSet<&ClassName> = self
            .by_simple_name
            .iter()
            .filter(|(simple, _)| simple.contains(&needle))
            .flat_map(|(_, names)| names.iter())
            .collect();
        matches.into_iter().cloned().collect()
    }
}

fn remove_from(map: &mut HashMap<String, BTreeSet<ClassName>>, key: &str, name: &ClassName) {
    if let Some(set) = map.get_mut(key) {
        set.remove(name);
        if set.is_empty() {
            map.remove(key);
        }
    }
}
