//! # Case-Law Mapper
//!
//! ## Purpose
//! Maps court decisions into `CaseLawDocument` records: registry metadata
//! from the proprietary block, court identification with synonym
//! canonicalization, and the named long-text sections as tagged content
//! blocks.
//!
//! ## Mapping Steps
//! 1. Document number; missing aborts with no document produced
//! 2. Scalar and classification metadata (ECLI, court, dates, file numbers)
//! 3. Keyword and decision-name lists
//! 4. Content blocks selected by their `name` attribute; unknown names are
//!    dropped

use super::{case_law_namespaces, nodes, opt_text, parse_date, text_list, AttachmentSet, DocumentMapper};
use crate::errors::{Result, SyncError};
use crate::model::{CaseLawDocument, ContentBlock, LegalDocument};
use crate::xml::XmlDocument;
use crate::DocumentKind;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// Court-type synonym table, initialized once per process. Maps the long
/// registry form to the citation abbreviation; unknown court types pass
/// through unchanged.
static COURT_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Bundesverfassungsgericht", "BVerfG"),
        ("Bundesgerichtshof", "BGH"),
        ("Bundesverwaltungsgericht", "BVerwG"),
        ("Bundesfinanzhof", "BFH"),
        ("Bundesarbeitsgericht", "BAG"),
        ("Bundessozialgericht", "BSG"),
        ("Bundespatentgericht", "BPatG"),
        ("Oberverwaltungsgericht", "OVG"),
        ("Oberlandesgericht", "OLG"),
        ("Verwaltungsgerichtshof", "VGH"),
        ("Landessozialgericht", "LSG"),
        ("Landesarbeitsgericht", "LAG"),
        ("Finanzgericht", "FG"),
        ("Landgericht", "LG"),
        ("Verwaltungsgericht", "VG"),
        ("Sozialgericht", "SG"),
        ("Arbeitsgericht", "ArbG"),
        ("Amtsgericht", "AG"),
    ])
});

fn canonical_court_type(raw: &str) -> String {
    let trimmed = raw.trim();
    match COURT_SYNONYMS.get(trimmed) {
        Some(abbreviation) => (*abbreviation).to_string(),
        None => trimmed.to_string(),
    }
}

pub struct CaseLawMapper;

impl DocumentMapper for CaseLawMapper {
    fn kind(&self) -> DocumentKind {
        DocumentKind::CaseLaw
    }

    fn map(&self, xml: &[u8], _attachments: &AttachmentSet) -> Result<Option<LegalDocument>> {
        let text = std::str::from_utf8(xml).map_err(|e| SyncError::XmlParse {
            details: format!("decision document is not valid UTF-8: {}", e),
        })?;
        let doc = XmlDocument::parse(text, case_law_namespaces())?;

        let Some(document_number) = opt_text(&doc, "//ris:dokumentnummer") else {
            debug!("decision without document number, not indexable");
            return Ok(None);
        };

        let content_blocks = collect_content_blocks(&doc);

        Ok(Some(LegalDocument::CaseLaw(CaseLawDocument {
            document_number,
            ecli: opt_text(&doc, "//ris:ecli"),
            court_type: opt_text(&doc, "//ris:gericht/ris:gerichtstyp")
                .map(|raw| canonical_court_type(&raw)),
            court_location: opt_text(&doc, "//ris:gericht/ris:gerichtsort"),
            decision_date: opt_text(&doc, "//ris:entscheidungsdatum")
                .and_then(|raw| parse_date(&raw)),
            file_numbers: text_list(&doc, "//ris:aktenzeichen"),
            document_type: opt_text(&doc, "//ris:dokumenttyp"),
            judicial_body: opt_text(&doc, "//ris:spruchkoerper"),
            keywords: text_list(&doc, "//ris:schlagwoerter/ris:schlagwort"),
            decision_names: text_list(&doc, "//ris:entscheidungsnamen/ris:entscheidungsname"),
            content_blocks,
        })))
    }
}

/// Every named `div` in the decision body becomes a content block when its
/// name is a known section kind; empty or unnamed sections are dropped.
fn collect_content_blocks(doc: &XmlDocument) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for node in nodes(doc, "//akn:div") {
        let Some(name) = doc.attribute(node, "name") else {
            continue;
        };
        let text = doc.text_of(node);
        if text.is_empty() {
            continue;
        }
        match ContentBlock::from_name(name, text) {
            Some(block) => blocks.push(block),
            None => debug!(name = name, "unknown content block name, dropping"),
        }
    }
    blocks
}
