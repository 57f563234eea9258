//! # Administrative-Directive Mapper
//!
//! Maps administrative directives into `DirectiveDocument` records:
//! mandatory document number, issuing metadata, subject-area list, and the
//! abstract section.

use super::{opt_text, parse_date, ris_doc_namespaces, text_list, AttachmentSet, DocumentMapper};
use crate::errors::{Result, SyncError};
use crate::model::{DirectiveDocument, LegalDocument};
use crate::xml::XmlDocument;
use crate::DocumentKind;
use tracing::debug;

pub struct DirectiveMapper;

impl DocumentMapper for DirectiveMapper {
    fn kind(&self) -> DocumentKind {
        DocumentKind::AdministrativeDirective
    }

    fn map(&self, xml: &[u8], _attachments: &AttachmentSet) -> Result<Option<LegalDocument>> {
        let text = std::str::from_utf8(xml).map_err(|e| SyncError::XmlParse {
            details: format!("directive document is not valid UTF-8: {}", e),
        })?;
        let doc = XmlDocument::parse(text, ris_doc_namespaces())?;

        let Some(document_number) = opt_text(&doc, "//ris:dokumentnummer") else {
            debug!("directive without document number, not indexable");
            return Ok(None);
        };

        Ok(Some(LegalDocument::AdministrativeDirective(
            DirectiveDocument {
                document_number,
                title: opt_text(&doc, "//ris:langueberschrift"),
                issuing_authority: opt_text(&doc, "//ris:normgeber"),
                reference_numbers: text_list(&doc, "//ris:aktenzeichen"),
                date_of_issue: opt_text(&doc, "//ris:zitierdatum").and_then(|raw| parse_date(&raw)),
                subject_areas: text_list(&doc, "//ris:sachgebiete/ris:sachgebiet"),
                abstract_text: opt_text(&doc, "//akn:div[@name='Kurzreferat']"),
            },
        )))
    }
}
