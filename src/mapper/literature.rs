//! # Literature Mapper
//!
//! Maps bibliographic literature references into `LiteratureDocument`
//! records. Same three-phase shape as the case-law mapper: mandatory
//! document number, scalar metadata, category lists.

use super::{opt_text, ris_doc_namespaces, text_list, AttachmentSet, DocumentMapper};
use crate::errors::{Result, SyncError};
use crate::model::{LegalDocument, LiteratureDocument};
use crate::xml::XmlDocument;
use crate::DocumentKind;
use tracing::debug;

pub struct LiteratureMapper;

impl DocumentMapper for LiteratureMapper {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Literature
    }

    fn map(&self, xml: &[u8], _attachments: &AttachmentSet) -> Result<Option<LegalDocument>> {
        let text = std::str::from_utf8(xml).map_err(|e| SyncError::XmlParse {
            details: format!("literature document is not valid UTF-8: {}", e),
        })?;
        let doc = XmlDocument::parse(text, ris_doc_namespaces())?;

        let Some(document_number) = opt_text(&doc, "//ris:dokumentnummer") else {
            debug!("literature reference without document number, not indexable");
            return Ok(None);
        };

        Ok(Some(LegalDocument::Literature(LiteratureDocument {
            document_number,
            main_title: opt_text(&doc, "//ris:haupttitel"),
            authors: text_list(&doc, "//ris:verfasser"),
            years_of_publication: text_list(
                &doc,
                "//ris:veroeffentlichungsjahre/ris:veroeffentlichungsjahr",
            ),
            document_types: text_list(&doc, "//ris:dokumenttypen/ris:dokumenttyp"),
            short_report: opt_text(&doc, "//akn:div[@name='Kurzreferat']"),
        })))
    }
}
