//! Parser for one per-class XML document.
//!
//! The document root names the class kind (`<class>`, `<interface>`, ...).
//! Optional attributes and elements that are missing are left unset; only a
//! wrong root element, a method without a name, or a parameter without a type
//! is rejected.

use roxmltree::{Document, Node};
use std::collections::BTreeSet;

use crate::error::DocumentError;
use crate::model::{
    ArchiveId, ClassInfo, ClassKind, ClassName, ConstructorInfo, MethodInfo, ParameterInfo,
};

pub fn parse_class_document(
    xml: &str,
    name: &ClassName,
    owning_archive: ArchiveId,
) -> Result<ClassInfo, DocumentError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let tag = root.tag_name().name();
    let kind =
        ClassKind::from_element(tag).ok_or_else(|| DocumentError::UnexpectedRoot(tag.to_string()))?;

    let name = match root.attribute("name").map(str::trim) {
        Some(simple) if !simple.is_empty() => {
            ClassName::with_simple(name.fully_qualified.clone(), simple)
        }
        _ => name.clone(),
    };

    let mut constructors = Vec::new();
    let mut methods = Vec::new();
    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "constructor" => constructors.push(parse_constructor(&child, &name)?),
            "method" => methods.push(parse_method(&child)?),
            _ => {}
        }
    }

    Ok(ClassInfo {
        kind,
        description: description_of(&root),
        modifiers: modifiers_of(&root),
        deprecated: flag(&root, "deprecated"),
        super_class: root.attribute("extends").and_then(type_name),
        interfaces: type_list(root.attribute("implements")),
        constructors,
        methods,
        owning_archive,
        name,
    })
}

fn parse_constructor(node: &Node, class: &ClassName) -> Result<ConstructorInfo, DocumentError> {
    let name = node
        .attribute("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(class.simple.as_str())
        .to_string();

    Ok(ConstructorInfo {
        name,
        modifiers: modifiers_of(node),
        parameters: parameters_of(node)?,
        description: description_of(node),
        deprecated: flag(node, "deprecated"),
        throws: type_list(node.attribute("throws")),
    })
}

fn parse_method(node: &Node) -> Result<MethodInfo, DocumentError> {
    let name = node
        .attribute("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(DocumentError::MissingAttribute {
            element: "method",
            attribute: "name",
        })?
        .to_string();

    Ok(MethodInfo {
        name,
        modifiers: modifiers_of(node),
        parameters: parameters_of(node)?,
        description: description_of(node),
        deprecated: flag(node, "deprecated"),
        return_type: node.attribute("returns").and_then(type_name),
        throws: type_list(node.attribute("throws")),
    })
}

fn parameters_of(node: &Node) -> Result<Vec<ParameterInfo>, DocumentError> {
    let Some(list) = child_element(node, "parameters") else {
        return Ok(Vec::new());
    };

    let mut parameters = Vec::new();
    for param in list
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("parameter"))
    {
        let raw_type = param
            .attribute("type")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(DocumentError::MissingAttribute {
                element: "parameter",
                attribute: "type",
            })?;

        let (base, array_suffix) = match raw_type.strip_suffix("[]") {
            Some(base) => (base.trim_end_matches("[]"), true),
            None => (raw_type, false),
        };

        parameters.push(ParameterInfo {
            type_name: ClassName::new(base),
            name: param.attribute("name").unwrap_or_default().trim().to_string(),
            is_array: array_suffix || flag(&param, "array"),
            generic_suffix: param
                .attribute("generic")
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
        });
    }
    Ok(parameters)
}

fn child_element<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(tag))
}

/// Text of the direct `<description>` child, including text nested in markup.
fn description_of(node: &Node) -> String {
    child_element(node, "description")
        .map(|d| {
            d.descendants()
                .filter(Node::is_text)
                .filter_map(|t| t.text())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn modifiers_of(node: &Node) -> BTreeSet<String> {
    node.attribute("modifiers")
        .map(|m| m.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn flag(node: &Node, attribute: &str) -> bool {
    node.attribute(attribute).is_some_and(|v| {
        let v = v.trim();
        v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v == "1"
    })
}

fn type_name(raw: &str) -> Option<ClassName> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        Some(ClassName::new(raw))
    }
}

fn type_list(raw: Option<&str>) -> Vec<ClassName> {
    raw.map(|r| r.split(',').filter_map(type_name).collect())
        .unwrap_or_default()
}
