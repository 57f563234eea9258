//! # Document Mapper Module
//!
//! ## Purpose
//! Transforms one legal XML document into the flat record the search index
//! stores. One mapper per document kind; all of them share the same shape:
//! fail fast when the mandatory identifier is missing, then extract scalars,
//! lists, and (for norms) article structure.
//!
//! ## Input/Output Specification
//! - **Input**: Raw XML bytes plus, for norms, the sibling attachment files
//!   keyed by manifestation path
//! - **Output**: `Ok(Some(LegalDocument))`, or `Ok(None)` when the document
//!   is not indexable (missing identifier), or `Err` for malformed XML
//!
//! ## Key Features
//! - Mapping is pure: no I/O beyond the supplied attachment set
//! - Query failures on optional fields degrade to "field absent"
//! - Per-kind namespace binding sets

pub mod case_law;
pub mod directive;
pub mod literature;
pub mod norm;

pub use case_law::CaseLawMapper;
pub use directive::DirectiveMapper;
pub use literature::LiteratureMapper;
pub use norm::NormMapper;

use crate::errors::Result;
use crate::model::LegalDocument;
use crate::xml::{Namespaces, NodeId, XmlDocument};
use crate::DocumentKind;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Maps raw XML of one document kind into an indexable record.
pub trait DocumentMapper: Send + Sync {
    fn kind(&self) -> DocumentKind;

    /// Maps one document. `Ok(None)` means the document must be silently
    /// omitted from indexing; `Err` means the input could not be read at
    /// all and the caller should log and skip it.
    fn map(&self, xml: &[u8], attachments: &AttachmentSet) -> Result<Option<LegalDocument>>;
}

/// Returns the mapper for a document kind.
pub fn mapper_for(kind: DocumentKind) -> Box<dyn DocumentMapper> {
    match kind {
        DocumentKind::Norm => Box::new(NormMapper),
        DocumentKind::CaseLaw => Box::new(CaseLawMapper),
        DocumentKind::Literature => Box::new(LiteratureMapper),
        DocumentKind::AdministrativeDirective => Box::new(DirectiveMapper),
    }
}

/// Attachment XML files fetched alongside a norm's main body, keyed by
/// their full object key.
#[derive(Debug, Clone, Default)]
pub struct AttachmentSet {
    files: HashMap<String, Vec<u8>>,
}

impl AttachmentSet {
    pub fn new() -> Self {
        AttachmentSet::default()
    }

    pub fn insert(&mut self, key: &str, bytes: Vec<u8>) {
        self.files.insert(key.to_string(), bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolves a `documentRef` href against the set. References may be
    /// full object keys or bare file names, so an exact match is tried
    /// first and the file name second.
    pub fn resolve(&self, href: &str) -> Option<(&str, &[u8])> {
        if let Some((key, bytes)) = self.files.get_key_value(href) {
            return Some((key.as_str(), bytes.as_slice()));
        }
        let file_name = href.rsplit('/').next()?;
        self.files
            .iter()
            .find(|(key, _)| key.rsplit('/').next() == Some(file_name))
            .map(|(key, bytes)| (key.as_str(), bytes.as_slice()))
    }
}

/// Namespace bindings for consolidated legislation markup.
pub(crate) fn norm_namespaces() -> Namespaces {
    Namespaces::new()
        .bind("akn", "http://Inhaltsdaten.LegalDocML.de/1.6/")
        .bind("ris", "http://Metadaten.LegalDocML.de/1.6/")
}

/// Namespace bindings for court-decision markup.
pub(crate) fn case_law_namespaces() -> Namespaces {
    Namespaces::new()
        .bind("akn", "http://docs.oasis-open.org/legaldocml/ns/akn/3.0")
        .bind("ris", "http://MetadatenRIS.LegalDocML.de/1.6/")
}

/// Literature and administrative directives share the court-decision
/// binding set.
pub(crate) fn ris_doc_namespaces() -> Namespaces {
    case_law_namespaces()
}

/// Parses an ISO calendar date, treating anything unparsable as absent.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

// Query helpers for optional fields: absence and query failure both read as
// "field not present in this document".

pub(crate) fn opt_text(doc: &XmlDocument, path: &str) -> Option<String> {
    doc.string_at(path).ok().flatten()
}

pub(crate) fn opt_text_from(doc: &XmlDocument, origin: NodeId, path: &str) -> Option<String> {
    doc.string_at_from(origin, path).ok().flatten()
}

pub(crate) fn nodes(doc: &XmlDocument, path: &str) -> Vec<NodeId> {
    doc.query_all(path).unwrap_or_default()
}

/// Collects the normalized text of every node matching `path`, dropping
/// empty entries.
pub(crate) fn text_list(doc: &XmlDocument, path: &str) -> Vec<String> {
    nodes(doc, path)
        .into_iter()
        .map(|node| doc.text_of(node))
        .filter(|text| !text.is_empty())
        .collect()
}
