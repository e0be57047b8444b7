//! Plain data returned by the store.
//!
//! Everything here is immutable once built. `ClassInfo` values are shared as
//! `Arc<ClassInfo>` between the cache and callers.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Identifies one loaded version of an archive.
///
/// A fresh id is allocated every time an archive is (re)loaded, so the id also
/// acts as the archive's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArchiveId(pub u64);

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassName {
    pub fully_qualified: String,
    pub simple: String,
}

impl ClassName {
    /// Builds a name whose simple part is the last dotted segment.
    pub fn new(fully_qualified: impl Into<String>) -> Self {
        let fully_qualified = fully_qualified.into();
        let simple = fully_qualified
            .rsplit('.')
            .next()
            .unwrap_or(fully_qualified.as_str())
            .to_string();
        Self {
            fully_qualified,
            simple,
        }
    }

    pub fn with_simple(fully_qualified: impl Into<String>, simple: impl Into<String>) -> Self {
        Self {
            fully_qualified: fully_qualified.into(),
            simple: simple.into(),
        }
    }

    /// Derives a name from an archive entry such as `java/util/Map.Entry.xml`.
    ///
    /// The simple name is the last path segment (`Map.Entry`), which keeps
    /// nested classes addressable by the name their documentation page uses.
    pub fn from_entry_path(entry: &str) -> Option<Self> {
        let stem = entry.strip_suffix(".xml")?;
        let stem = stem.trim_start_matches('/');
        let simple = stem.rsplit('/').next()?;
        if simple.is_empty() || stem.split('/').any(|segment| segment.is_empty()) {
            return None;
        }
        Some(Self::with_simple(stem.replace('/', "."), simple))
    }

    pub fn package(&self) -> &str {
        let suffix_len = self.simple.len() + 1;
        if self.fully_qualified.len() > self.simple.len()
            && self.fully_qualified.ends_with(&self.simple)
            && self.fully_qualified.as_bytes()[self.fully_qualified.len() - suffix_len] == b'.'
        {
            &self.fully_qualified[..self.fully_qualified.len() - suffix_len]
        } else {
            ""
        }
    }

    /// Slash-separated form used in documentation URLs, e.g. `java/util/Map.Entry`.
    pub fn path(&self) -> String {
        let package = self.package();
        if package.is_empty() {
            if self.fully_qualified.ends_with(&self.simple) {
                return self.simple.clone();
            }
            return self.fully_qualified.replace('.', "/");
        }
        format!("{}/{}", package.replace('.', "/"), self.simple)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Enum,
    Annotation,
    Record,
}

impl ClassKind {
    pub fn from_element(tag: &str) -> Option<Self> {
        match tag {
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "enum" => Some(Self::Enum),
            "annotation" => Some(Self::Annotation),
            "record" => Some(Self::Record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Annotation => "annotation",
            Self::Record => "record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterInfo {
    #[serde(rename = "type")]
    pub type_name: ClassName,
    pub name: String,
    pub is_array: bool,
    pub generic_suffix: Option<String>,
}

impl ParameterInfo {
    /// Erased type as it appears in a Javadoc member anchor.
    pub fn anchor_type(&self) -> String {
        if self.is_array {
            format!("{}[]", self.type_name.fully_qualified)
        } else {
            self.type_name.fully_qualified.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub modifiers: BTreeSet<String>,
    pub parameters: Vec<ParameterInfo>,
    pub description: String,
    pub deprecated: bool,
    pub return_type: Option<ClassName>,
    pub throws: Vec<ClassName>,
}

impl MethodInfo {
    pub fn anchor(&self) -> String {
        member_anchor(&self.name, &self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstructorInfo {
    pub name: String,
    pub modifiers: BTreeSet<String>,
    pub parameters: Vec<ParameterInfo>,
    pub description: String,
    pub deprecated: bool,
    pub throws: Vec<ClassName>,
}

impl ConstructorInfo {
    /// Javadoc names constructor anchors `<init>` since JDK 11.
    pub fn anchor(&self) -> String {
        member_anchor("<init>", &self.parameters)
    }
}

fn member_anchor(name: &str, parameters: &[ParameterInfo]) -> String {
    let types: Vec<String> = parameters.iter().map(ParameterInfo::anchor_type).collect();
    format!("{name}({})", types.join(","))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub name: ClassName,
    pub kind: ClassKind,
    pub description: String,
    pub modifiers: BTreeSet<String>,
    pub deprecated: bool,
    pub super_class: Option<ClassName>,
    pub interfaces: Vec<ClassName>,
    pub constructors: Vec<ConstructorInfo>,
    pub methods: Vec<MethodInfo>,
    pub owning_archive: ArchiveId,
}

impl ClassInfo {
    /// All overloads of a method, matched case-insensitively.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(type_name: &str, is_array: bool) -> ParameterInfo {
        ParameterInfo {
            type_name: ClassName::new(type_name),
            name: "p".to_string(),
            is_array,
            generic_suffix: None,
        }
    }

    #[test]
    fn class_name_derives_simple_from_last_segment() {
        let name = ClassName::new("java.util.List");
        assert_eq!(name.simple, "List");
        assert_eq!(name.package(), "java.util");
        assert_eq!(name.path(), "java/util/List");

        let primitive = ClassName::new("int");
        assert_eq!(primitive.simple, "int");
        assert_eq!(primitive.package(), "");
        assert_eq!(primitive.path(), "int");
    }

    #[test]
    fn entry_path_keeps_nested_class_simple_name() {
        let name = ClassName::from_entry_path("java/util/Map.Entry.xml").unwrap();
        assert_eq!(name.fully_qualified, "java.util.Map.Entry");
        assert_eq!(name.simple, "Map.Entry");
        assert_eq!(name.package(), "java.util");
        assert_eq!(name.path(), "java/util/Map.Entry");

        assert!(ClassName::from_entry_path("java/util/List.class").is_none());
        assert!(ClassName::from_entry_path("java//List.xml").is_none());
        assert!(ClassName::from_entry_path("java/util/.xml").is_none());
    }

    #[test]
    fn method_anchor_uses_erased_parameter_types() {
        let method = MethodInfo {
            name: "copyOf".to_string(),
            modifiers: BTreeSet::new(),
            parameters: vec![param("java.lang.Object", true), param("int", false)],
            description: String::new(),
            deprecated: false,
            return_type: None,
            throws: Vec::new(),
        };
        assert_eq!(method.anchor(), "copyOf(java.lang.Object[],int)");
    }
}
