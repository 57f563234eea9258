//! # Document Model Module
//!
//! ## Purpose
//! The flattened document representation handed to the search index, plus
//! the supporting value types the mappers assemble: articles, the table of
//! contents tree, validity intervals, and case-law content blocks.
//!
//! ## Key Features
//! - One denormalized record per document, tagged by kind
//! - Parent-owned TOC tree without back-references
//! - Validity intervals with open ends on either side

use crate::DocumentKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A fully mapped legal document, ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LegalDocument {
    Norm(NormDocument),
    CaseLaw(CaseLawDocument),
    Literature(LiteratureDocument),
    AdministrativeDirective(DirectiveDocument),
}

impl LegalDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            LegalDocument::Norm(_) => DocumentKind::Norm,
            LegalDocument::CaseLaw(_) => DocumentKind::CaseLaw,
            LegalDocument::Literature(_) => DocumentKind::Literature,
            LegalDocument::AdministrativeDirective(_) => DocumentKind::AdministrativeDirective,
        }
    }

    /// The stable index id: the expression-level identifier for norms, the
    /// document number for every other kind.
    pub fn id(&self) -> &str {
        match self {
            LegalDocument::Norm(norm) => &norm.expression_eli,
            LegalDocument::CaseLaw(decision) => &decision.document_number,
            LegalDocument::Literature(entry) => &entry.document_number,
            LegalDocument::AdministrativeDirective(directive) => &directive.document_number,
        }
    }
}

/// Consolidated legislation at a specific expression (point in time).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormDocument {
    /// Work-level identifier, shared by all versions of the act
    pub work_eli: String,
    /// Expression-level identifier of this version; used as the index id
    pub expression_eli: String,
    /// One concrete manifestation the expression was mapped from
    pub manifestation_eli: Option<String>,
    /// Official long title
    pub official_title: Option<String>,
    /// Official short title
    pub short_title: Option<String>,
    /// Official abbreviation, e.g. "BGB"
    pub abbreviation: Option<String>,
    /// Printed announcement reference, e.g. "2024-03-01, BGBl. I, Nr. 70"
    pub published_in: Option<String>,
    /// Earliest entry into force across the expression's temporal groups
    pub entry_into_force_date: Option<NaiveDate>,
    /// Latest expiry across temporal groups; `None` while any group is open
    pub expiry_date: Option<NaiveDate>,
    pub articles: Vec<Article>,
    pub table_of_contents: Vec<TableOfContentsItem>,
}

/// A single article (or article-like unit) of a norm.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Article {
    /// Source element id, e.g. `hauptteil-1_art-1`
    pub eid: String,
    /// Display name: marker plus heading, e.g. "§ 1 Zweck"
    pub name: Option<String>,
    /// Normalized full text of the article
    pub text: String,
    pub entry_into_force_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    /// Source GUID, stable across expressions
    pub guid: Option<String>,
    /// Manifestation key the text came from, set for stitched attachments
    pub source_manifestation_ref: Option<String>,
}

/// One node of the table of contents. Children are owned; the tree carries
/// no references back to the XML it was built from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableOfContentsItem {
    /// Source element id
    pub id: String,
    /// Designation marker, e.g. "§ 1" or "Abschnitt 2"
    pub marker: Option<String>,
    /// Heading text; for heading-less containers a marker range of the
    /// contained articles, e.g. "§ 1 – § 5"
    pub heading: Option<String>,
    pub children: Vec<TableOfContentsItem>,
}

/// Half-open validity period. `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidityInterval {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ValidityInterval {
    /// Whether `date` falls inside the interval, treating missing bounds as
    /// open in that direction.
    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if date > end {
                return false;
            }
        }
        true
    }
}

/// A court decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseLawDocument {
    /// Registry document number; used as the index id
    pub document_number: String,
    pub ecli: Option<String>,
    /// Court type after synonym canonicalization, e.g. "BGH"
    pub court_type: Option<String>,
    pub court_location: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub file_numbers: Vec<String>,
    /// Decision type, e.g. "Urteil" or "Beschluss"
    pub document_type: Option<String>,
    /// Deciding body, e.g. "2. Senat"
    pub judicial_body: Option<String>,
    pub keywords: Vec<String>,
    /// Colloquial decision names, e.g. press-coined case names
    pub decision_names: Vec<String>,
    pub content_blocks: Vec<ContentBlock>,
}

/// A named long-text section of a decision. The variant is selected by the
/// `name` attribute of the source block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum ContentBlock {
    /// "Leitsatz"
    Headnote(String),
    /// "Orientierungssatz"
    OrientationSentence(String),
    /// "Tenor"
    Tenor(String),
    /// "Tatbestand"
    CaseFacts(String),
    /// "Entscheidungsgründe"
    DecisionReasons(String),
    /// "Gründe"
    Reasons(String),
    /// "Abweichende Meinung"
    DissentingOpinion(String),
    /// "Sonstiger Langtext"
    OtherLongText(String),
}

impl ContentBlock {
    /// Maps a source block name to its variant. Unknown names yield `None`
    /// and the block is dropped by the mapper.
    pub fn from_name(name: &str, text: String) -> Option<ContentBlock> {
        match name {
            "Leitsatz" => Some(ContentBlock::Headnote(text)),
            "Orientierungssatz" => Some(ContentBlock::OrientationSentence(text)),
            "Tenor" => Some(ContentBlock::Tenor(text)),
            "Tatbestand" => Some(ContentBlock::CaseFacts(text)),
            "Entscheidungsgründe" => Some(ContentBlock::DecisionReasons(text)),
            "Gründe" => Some(ContentBlock::Reasons(text)),
            "Abweichende Meinung" => Some(ContentBlock::DissentingOpinion(text)),
            "Sonstiger Langtext" => Some(ContentBlock::OtherLongText(text)),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ContentBlock::Headnote(t)
            | ContentBlock::OrientationSentence(t)
            | ContentBlock::Tenor(t)
            | ContentBlock::CaseFacts(t)
            | ContentBlock::DecisionReasons(t)
            | ContentBlock::Reasons(t)
            | ContentBlock::DissentingOpinion(t)
            | ContentBlock::OtherLongText(t) => t,
        }
    }
}

/// A bibliographic literature reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LiteratureDocument {
    /// Registry document number; used as the index id
    pub document_number: String,
    pub main_title: Option<String>,
    pub authors: Vec<String>,
    pub years_of_publication: Vec<String>,
    pub document_types: Vec<String>,
    pub short_report: Option<String>,
}

/// An administrative directive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectiveDocument {
    /// Registry document number; used as the index id
    pub document_number: String,
    pub title: Option<String>,
    pub issuing_authority: Option<String>,
    pub reference_numbers: Vec<String>,
    pub date_of_issue: Option<NaiveDate>,
    pub subject_areas: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}
