//! # XML Access Module
//!
//! ## Purpose
//! Namespace-aware access to legal XML documents. Parsing rejects DTDs and
//! external entities outright, and the parsed tree is converted into an
//! owned node arena so callers can prune subtrees (editorial notes, metadata
//! blocks) before extracting index text.
//!
//! ## Input/Output Specification
//! - **Input**: UTF-8 XML bytes plus a set of prefix -> namespace bindings
//! - **Output**: Queryable `XmlDocument`, normalized text fragments,
//!   attribute values
//!
//! ## Key Features
//! - Path queries of the form `akn:act/akn:body/akn:article`, with an
//!   optional leading `//` for descendant search, one `[@attr='value']`
//!   predicate per step, and a terminal `@attr` selector
//! - In-place tree edits: remove matching nodes, replace matching nodes
//!   with plain text
//! - Text extraction that concatenates descendant text in document order,
//!   collapses whitespace runs, and applies Unicode NFC normalization
//!
//! ## Usage
//! ```rust
//! use legal_index_sync::xml::{Namespaces, XmlDocument};
//!
//! let ns = Namespaces::new().bind("a", "urn:example");
//! let doc = XmlDocument::parse("<a:root xmlns:a='urn:example'><a:x>hi</a:x></a:root>", ns).unwrap();
//! assert_eq!(doc.string_at("a:root/a:x").unwrap().as_deref(), Some("hi"));
//! ```

use crate::errors::{Result, SyncError};
use unicode_normalization::UnicodeNormalization;

/// Prefix -> namespace URI bindings used to resolve path steps.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    bindings: Vec<(String, String)>,
}

impl Namespaces {
    pub fn new() -> Self {
        Namespaces {
            bindings: Vec::new(),
        }
    }

    /// Adds a binding, replacing any previous binding of the same prefix.
    pub fn bind(mut self, prefix: &str, uri: &str) -> Self {
        self.bindings.retain(|(p, _)| p != prefix);
        self.bindings.push((prefix.to_string(), uri.to_string()));
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

/// Index of a node within an [`XmlDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Attribute {
    local: String,
    value: String,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        local: String,
        namespace: Option<String>,
        attributes: Vec<Attribute>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned XML tree supporting queries and structural edits.
///
/// Detached nodes stay in the arena but are unreachable from the root, so
/// subsequent queries and text extraction never see them.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    namespaces: Namespaces,
}

impl XmlDocument {
    /// Parses an XML document. Documents carrying a DOCTYPE declaration are
    /// rejected, which also rules out external entity resolution.
    pub fn parse(xml: &str, namespaces: Namespaces) -> Result<Self> {
        let parsed = roxmltree::Document::parse(xml).map_err(|e| SyncError::XmlParse {
            details: e.to_string(),
        })?;

        let mut nodes = Vec::new();
        let root = Self::import(&mut nodes, parsed.root_element(), None);
        Ok(XmlDocument {
            nodes,
            root,
            namespaces,
        })
    }

    fn import(nodes: &mut Vec<NodeData>, source: roxmltree::Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(nodes.len());
        nodes.push(NodeData {
            kind: NodeKind::Element {
                local: source.tag_name().name().to_string(),
                namespace: source.tag_name().namespace().map(str::to_string),
                attributes: source
                    .attributes()
                    .map(|a| Attribute {
                        local: a.name().to_string(),
                        value: a.value().to_string(),
                    })
                    .collect(),
            },
            parent,
            children: Vec::new(),
        });

        let mut children = Vec::new();
        for child in source.children() {
            if child.is_element() {
                children.push(Self::import(nodes, child, Some(id)));
            } else if child.is_text() {
                let text_id = NodeId(nodes.len());
                nodes.push(NodeData {
                    kind: NodeKind::Text(child.text().unwrap_or_default().to_string()),
                    parent: Some(id),
                    children: Vec::new(),
                });
                children.push(text_id);
            }
        }
        nodes[id.0].children = children;
        id
    }

    /// The document element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Local (unprefixed) element name, or `None` for text nodes.
    pub fn local_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { local, .. } => Some(local),
            NodeKind::Text(_) => None,
        }
    }

    /// Looks up an attribute by local name.
    pub fn attribute(&self, node: NodeId, local: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|a| a.local == local)
                .map(|a| a.value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Direct element children in document order.
    pub fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|c| matches!(self.nodes[c.0].kind, NodeKind::Element { .. }))
            .collect()
    }

    /// Normalized text content of a subtree: descendant text nodes
    /// concatenated in document order, whitespace runs collapsed, NFC.
    pub fn text_of(&self, node: NodeId) -> String {
        let mut raw = String::new();
        self.collect_text(node, &mut raw);
        normalize_text(&raw)
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(content) => out.push_str(content),
            NodeKind::Element { .. } => {
                for child in &self.nodes[node.0].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Finds the first node matching a path, starting at the document
    /// element.
    pub fn query_first(&self, path: &str) -> Result<Option<NodeId>> {
        Ok(self.evaluate(self.root, path, true)?.matches.into_iter().next())
    }

    /// Finds all nodes matching a path, in document order.
    pub fn query_all(&self, path: &str) -> Result<Vec<NodeId>> {
        Ok(self.evaluate(self.root, path, true)?.matches)
    }

    /// Like [`query_first`](Self::query_first), but resolves the path
    /// relative to `origin`'s children.
    pub fn query_first_from(&self, origin: NodeId, path: &str) -> Result<Option<NodeId>> {
        Ok(self
            .evaluate(origin, path, false)?
            .matches
            .into_iter()
            .next())
    }

    pub fn query_all_from(&self, origin: NodeId, path: &str) -> Result<Vec<NodeId>> {
        Ok(self.evaluate(origin, path, false)?.matches)
    }

    /// Resolves a path to a string value: the normalized text of the first
    /// matching node, or the attribute value when the path ends in `@attr`.
    /// Empty results map to `None`.
    pub fn string_at(&self, path: &str) -> Result<Option<String>> {
        self.string_at_from(self.root, path)
    }

    pub fn string_at_from(&self, origin: NodeId, path: &str) -> Result<Option<String>> {
        let absolute = origin == self.root;
        let outcome = self.evaluate(origin, path, absolute)?;
        let Some(node) = outcome.matches.into_iter().next() else {
            return Ok(None);
        };
        let value = match outcome.attribute {
            Some(attr) => self
                .attribute(node, &attr)
                .map(|v| normalize_text(v))
                .unwrap_or_default(),
            None => self.text_of(node),
        };
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    /// Detaches every node matching the path from the tree. Returns how
    /// many nodes were removed.
    pub fn remove_matching(&mut self, path: &str) -> Result<usize> {
        let matches = self.query_all(path)?;
        let mut removed = 0;
        for node in matches {
            if let Some(parent) = self.nodes[node.0].parent {
                self.nodes[parent.0].children.retain(|c| *c != node);
                self.nodes[node.0].parent = None;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Replaces every node matching the path with a plain text node holding
    /// `replacement`. Returns how many nodes were replaced.
    pub fn replace_with_text(&mut self, path: &str, replacement: &str) -> Result<usize> {
        let matches = self.query_all(path)?;
        let mut replaced = 0;
        for node in matches {
            let Some(parent) = self.nodes[node.0].parent else {
                continue;
            };
            let text_id = NodeId(self.nodes.len());
            self.nodes.push(NodeData {
                kind: NodeKind::Text(replacement.to_string()),
                parent: Some(parent),
                children: Vec::new(),
            });
            if let Some(slot) = self.nodes[parent.0].children.iter().position(|c| *c == node) {
                self.nodes[parent.0].children[slot] = text_id;
                self.nodes[node.0].parent = None;
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    fn evaluate(&self, origin: NodeId, path: &str, absolute: bool) -> Result<Evaluation> {
        let parsed = parse_path(path)?;
        if parsed.steps.is_empty() {
            return Err(SyncError::QueryFailed {
                path: path.to_string(),
                details: "path has no element steps".to_string(),
            });
        }

        // Seed the frontier with first-step matches, then narrow through the
        // remaining steps via direct children.
        let first = &parsed.steps[0];
        let mut frontier: Vec<NodeId> = if parsed.descendant {
            let mut found = Vec::new();
            self.find_descendants(origin, first, &mut found)?;
            found
        } else if absolute {
            if self.step_matches(origin, first)? {
                vec![origin]
            } else {
                Vec::new()
            }
        } else {
            let mut found = Vec::new();
            for child in self.child_elements(origin) {
                if self.step_matches(child, first)? {
                    found.push(child);
                }
            }
            found
        };

        for step in &parsed.steps[1..] {
            let mut next = Vec::new();
            for node in &frontier {
                for child in self.child_elements(*node) {
                    if self.step_matches(child, step)? {
                        next.push(child);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        Ok(Evaluation {
            matches: frontier,
            attribute: parsed.attribute,
        })
    }

    fn find_descendants(&self, origin: NodeId, step: &PathStep, out: &mut Vec<NodeId>) -> Result<()> {
        if self.step_matches(origin, step)? {
            out.push(origin);
        }
        for child in self.child_elements(origin) {
            self.find_descendants(child, step, out)?;
        }
        Ok(())
    }

    fn step_matches(&self, node: NodeId, step: &PathStep) -> Result<bool> {
        let NodeKind::Element {
            local, namespace, ..
        } = &self.nodes[node.0].kind
        else {
            return Ok(false);
        };

        if *local != step.local {
            return Ok(false);
        }

        if let Some(prefix) = &step.prefix {
            let expected = self.namespaces.resolve(prefix).ok_or_else(|| {
                SyncError::QueryFailed {
                    path: format!("{}:{}", prefix, step.local),
                    details: format!("namespace prefix '{}' is not bound", prefix),
                }
            })?;
            if namespace.as_deref() != Some(expected) {
                return Ok(false);
            }
        }

        if let Some((attr, value)) = &step.predicate {
            if self.attribute(node, attr) != Some(value.as_str()) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

struct Evaluation {
    matches: Vec<NodeId>,
    attribute: Option<String>,
}

#[derive(Debug, Clone)]
struct PathStep {
    prefix: Option<String>,
    local: String,
    predicate: Option<(String, String)>,
}

#[derive(Debug, Clone)]
struct ParsedPath {
    descendant: bool,
    steps: Vec<PathStep>,
    attribute: Option<String>,
}

fn parse_path(path: &str) -> Result<ParsedPath> {
    let trimmed = path.trim();
    let (descendant, rest) = match trimmed.strip_prefix("//") {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut steps = Vec::new();
    let mut attribute = None;
    let segments: Vec<&str> = rest.split('/').collect();

    for (position, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(SyncError::QueryFailed {
                path: path.to_string(),
                details: "empty path segment".to_string(),
            });
        }

        if let Some(attr) = segment.strip_prefix('@') {
            if position != segments.len() - 1 || attr.is_empty() {
                return Err(SyncError::QueryFailed {
                    path: path.to_string(),
                    details: "attribute selector must be the final segment".to_string(),
                });
            }
            attribute = Some(attr.to_string());
            continue;
        }

        steps.push(parse_step(path, segment)?);
    }

    Ok(ParsedPath {
        descendant,
        steps,
        attribute,
    })
}

fn parse_step(path: &str, segment: &str) -> Result<PathStep> {
    let (name_part, predicate) = match segment.find('[') {
        Some(open) => {
            let closed = segment.ends_with(']');
            let inner = &segment[open + 1..segment.len().saturating_sub(1)];
            let parsed = inner
                .strip_prefix('@')
                .and_then(|rest| rest.split_once('='))
                .and_then(|(attr, value)| {
                    let value = value.strip_prefix('\'')?.strip_suffix('\'')?;
                    Some((attr.to_string(), value.to_string()))
                });
            match (closed, parsed) {
                (true, Some(predicate)) => (&segment[..open], Some(predicate)),
                _ => {
                    return Err(SyncError::QueryFailed {
                        path: path.to_string(),
                        details: format!(
                            "malformed predicate in '{}' (expected [@attr='value'])",
                            segment
                        ),
                    });
                }
            }
        }
        None => (segment, None),
    };

    let (prefix, local) = match name_part.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name_part.to_string()),
    };

    if local.is_empty() {
        return Err(SyncError::QueryFailed {
            path: path.to_string(),
            details: format!("missing element name in segment '{}'", segment),
        });
    }

    Ok(PathStep {
        prefix,
        local,
        predicate,
    })
}

/// Collapses whitespace runs to single spaces, trims, and applies Unicode
/// NFC so that decomposed umlauts compare equal to their composed forms.
pub fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    let mut out = String::with_capacity(composed.len());
    let mut pending_space = false;
    for ch in composed.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <akn:act xmlns:akn="urn:akn" xmlns:ris="urn:ris">
          <akn:meta>
            <ris:metadata>
              <ris:court>BGH</ris:court>
            </ris:metadata>
          </akn:meta>
          <akn:body>
            <akn:article eId="art-1">
              <akn:num>&#167; 1</akn:num>
              <akn:heading>Zweck</akn:heading>
              <akn:paragraph eId="art-1_abs-1">
                <akn:content>Erster  Absatz.</akn:content>
              </akn:paragraph>
            </akn:article>
            <akn:article eId="art-2">
              <akn:num>&#167; 2</akn:num>
            </akn:article>
          </akn:body>
        </akn:act>
    "#;

    fn namespaces() -> Namespaces {
        Namespaces::new().bind("akn", "urn:akn").bind("ris", "urn:ris")
    }

    fn sample() -> XmlDocument {
        XmlDocument::parse(SAMPLE, namespaces()).unwrap()
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = "<!DOCTYPE foo [<!ENTITY x \"y\">]><foo>&x;</foo>";
        let result = XmlDocument::parse(xml, Namespaces::new());
        assert!(matches!(result, Err(SyncError::XmlParse { .. })));
    }

    #[test]
    fn test_absolute_and_descendant_queries() {
        let doc = sample();
        let absolute = doc.query_all("akn:act/akn:body/akn:article").unwrap();
        assert_eq!(absolute.len(), 2);

        let descendant = doc.query_all("//akn:article").unwrap();
        assert_eq!(descendant.len(), 2);

        assert!(doc.query_first("akn:body").unwrap().is_none());
    }

    #[test]
    fn test_predicate_and_attribute_selector() {
        let doc = sample();
        let heading = doc
            .string_at("//akn:article[@eId='art-1']/akn:heading")
            .unwrap();
        assert_eq!(heading.as_deref(), Some("Zweck"));

        let eid = doc
            .string_at("akn:act/akn:body/akn:article/@eId")
            .unwrap();
        assert_eq!(eid.as_deref(), Some("art-1"));

        assert!(doc
            .query_first("//akn:article[@eId='art-9']")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unbound_prefix_is_an_error() {
        let doc = sample();
        let result = doc.query_all("//xyz:article");
        assert!(matches!(result, Err(SyncError::QueryFailed { .. })));
    }

    #[test]
    fn test_malformed_predicate_is_an_error() {
        let doc = sample();
        assert!(doc.query_all("//akn:article[@eId]").is_err());
        assert!(doc.query_all("//akn:article[@eId='x'").is_err());
        assert!(doc.string_at("@eId/akn:num").is_err());
    }

    #[test]
    fn test_text_normalization() {
        let doc = sample();
        let node = doc.query_first("//akn:article[@eId='art-1']").unwrap().unwrap();
        assert_eq!(doc.text_of(node), "§ 1 Zweck Erster Absatz.");

        // decomposed a + combining diaeresis folds into the composed form
        assert_eq!(normalize_text("Ka\u{0308}fer  \n gru\u{0308}n"), "Käfer grün");
    }

    #[test]
    fn test_remove_matching_detaches_subtree() {
        let mut doc = sample();
        let removed = doc.remove_matching("//ris:metadata").unwrap();
        assert_eq!(removed, 1);
        assert!(doc.query_first("//ris:court").unwrap().is_none());
        assert_eq!(doc.text_of(doc.root()).contains("BGH"), false);
    }

    #[test]
    fn test_replace_with_text() {
        let mut doc = sample();
        let replaced = doc
            .replace_with_text("//akn:paragraph[@eId='art-1_abs-1']", "[entfernt]")
            .unwrap();
        assert_eq!(replaced, 1);
        let article = doc.query_first("//akn:article[@eId='art-1']").unwrap().unwrap();
        assert_eq!(doc.text_of(article), "§ 1 Zweck [entfernt]");
    }

    #[test]
    fn test_namespace_mismatch_not_matched() {
        let doc = sample();
        // ris prefix bound to a different URI than akn elements carry
        assert!(doc.query_first("//ris:article").unwrap().is_none());
    }
}
