//! # Norm Mapper
//!
//! ## Purpose
//! Maps consolidated legislation from LegalDocML markup into a flat
//! `NormDocument`: identifier resolution across the work, expression, and
//! manifestation levels, temporal validity resolved through the lifecycle
//! event chain, a flat article list stitched together from preamble, body,
//! conclusions, and attachment files, and a nested table of contents.
//!
//! ## Mapping Steps
//! 1. Work and expression identifiers; either one missing aborts with no
//!    document produced
//! 2. Scalar metadata with graceful fallbacks (titles, abbreviation,
//!    printed announcement)
//! 3. Temporal group map: lifecycle events dereferenced through the time
//!    intervals that point at them
//! 4. Body walk in document order, one article record per structural unit
//! 5. Attachment placeholders resolved against the supplied attachment set;
//!    missing attachments are enrichment, never an error
//! 6. Table of contents nested by the structural level each element type
//!    implies

use super::{norm_namespaces, nodes, opt_text, opt_text_from, parse_date, AttachmentSet, DocumentMapper};
use crate::errors::{Result, SyncError};
use crate::model::{Article, LegalDocument, NormDocument, TableOfContentsItem, ValidityInterval};
use crate::xml::{NodeId, XmlDocument};
use crate::DocumentKind;
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Temporal group id -> resolved validity interval, in document order.
type TemporalGroupMap = IndexMap<String, ValidityInterval>;

/// Pseudo-level that sorts articles below every container element.
const ARTICLE_LEVEL: u8 = u8::MAX;

pub struct NormMapper;

impl DocumentMapper for NormMapper {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Norm
    }

    fn map(&self, xml: &[u8], attachments: &AttachmentSet) -> Result<Option<LegalDocument>> {
        let text = std::str::from_utf8(xml).map_err(|e| SyncError::XmlParse {
            details: format!("norm document is not valid UTF-8: {}", e),
        })?;
        let mut doc = XmlDocument::parse(text, norm_namespaces())?;

        let Some(work_eli) = opt_text(&doc, "//akn:FRBRWork/akn:FRBRuri/@value") else {
            debug!("norm without work identifier, not indexable");
            return Ok(None);
        };
        let Some(expression_eli) = opt_text(&doc, "//akn:FRBRExpression/akn:FRBRuri/@value") else {
            debug!(work = %work_eli, "norm without expression identifier, not indexable");
            return Ok(None);
        };
        let manifestation_eli = opt_text(&doc, "//akn:FRBRManifestation/akn:FRBRthis/@value");

        // footnote apparatus carries no index text
        doc.remove_matching("//akn:noteRef")?;
        doc.remove_matching("//akn:authorialNote")?;

        let official_title = opt_text(&doc, "//akn:preface//akn:docTitle");
        let short_title = opt_text(&doc, "//akn:preface//akn:shortTitle");
        let abbreviation = opt_text(
            &doc,
            "//akn:shortTitle/akn:inline[@refersTo='amtliche-abkuerzung']",
        )
        .or_else(|| opt_text(&doc, "//ris:amtlicheAbkuerzung"));

        let published_in = assemble_published_in(&doc);
        let temporal = resolve_temporal_groups(&doc);

        let mut articles = Vec::new();
        for node in nodes(&doc, "//akn:preamble/akn:formula") {
            articles.extend(map_formula(&doc, node, &temporal));
        }
        for node in nodes(&doc, "//akn:body//akn:article") {
            articles.extend(map_article(&doc, node, &temporal));
        }
        for node in nodes(&doc, "//akn:conclusions/akn:formula") {
            articles.extend(map_formula(&doc, node, &temporal));
        }
        articles.extend(stitch_attachments(&doc, attachments));

        let table_of_contents = build_toc(&doc);
        let (entry_into_force_date, expiry_date) = document_dates(&temporal);

        Ok(Some(LegalDocument::Norm(NormDocument {
            work_eli,
            expression_eli,
            manifestation_eli,
            official_title,
            short_title,
            abbreviation,
            published_in,
            entry_into_force_date,
            expiry_date,
            articles,
            table_of_contents,
        })))
    }
}

/// Printed announcement assembled from whichever of date, gazette, and
/// citation are present.
fn assemble_published_in(doc: &XmlDocument) -> Option<String> {
    let components: Vec<String> = [
        opt_text(doc, "//ris:fundstelle/ris:datum"),
        opt_text(doc, "//ris:fundstelle/ris:periodikum"),
        opt_text(doc, "//ris:fundstelle/ris:zitatstelle"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if components.is_empty() {
        None
    } else {
        Some(components.join(", "))
    }
}

/// Builds the temporal group map: every lifecycle event is collected by its
/// eId, then each temporal group's time interval is resolved by
/// dereferencing its start/end event references. A missing end reference
/// means open-ended validity; a missing interval resolves to no constraint
/// at all.
fn resolve_temporal_groups(doc: &XmlDocument) -> TemporalGroupMap {
    let mut events: HashMap<String, NaiveDate> = HashMap::new();
    for node in nodes(doc, "//akn:lifecycle/akn:eventRef") {
        let (Some(eid), Some(date)) = (doc.attribute(node, "eId"), doc.attribute(node, "date"))
        else {
            continue;
        };
        if let Some(date) = parse_date(date) {
            events.insert(eid.to_string(), date);
        }
    }

    let mut groups = TemporalGroupMap::new();
    for group in nodes(doc, "//akn:temporalData/akn:temporalGroup") {
        let Some(eid) = doc.attribute(group, "eId") else {
            continue;
        };
        let mut validity = ValidityInterval::default();
        if let Some(interval) = doc.query_first_from(group, "akn:timeInterval").ok().flatten() {
            validity.start = event_date(doc, &events, interval, "start");
            validity.end = event_date(doc, &events, interval, "end");
        }
        groups.insert(eid.to_string(), validity);
    }
    groups
}

fn event_date(
    doc: &XmlDocument,
    events: &HashMap<String, NaiveDate>,
    interval: NodeId,
    attr: &str,
) -> Option<NaiveDate> {
    let reference = doc.attribute(interval, attr)?;
    events.get(reference.trim_start_matches('#')).copied()
}

/// Validity dates for a structural unit, taken from the temporal group its
/// `period` attribute references. Unreferenced units carry no constraint.
fn validity_for(doc: &XmlDocument, node: NodeId, temporal: &TemporalGroupMap) -> ValidityInterval {
    doc.attribute(node, "period")
        .map(|p| p.trim_start_matches('#'))
        .and_then(|eid| temporal.get(eid).copied())
        .unwrap_or_default()
}

fn map_article(doc: &XmlDocument, node: NodeId, temporal: &TemporalGroupMap) -> Option<Article> {
    let eid = doc.attribute(node, "eId")?.to_string();
    let marker = opt_text_from(doc, node, "akn:num");
    let heading = opt_text_from(doc, node, "akn:heading");
    let validity = validity_for(doc, node, temporal);

    Some(Article {
        eid,
        name: join_name(marker, heading),
        text: doc.text_of(node),
        entry_into_force_date: validity.start,
        expiry_date: validity.end,
        guid: doc.attribute(node, "GUID").map(str::to_string),
        source_manifestation_ref: None,
    })
}

/// Opening and closing formulas become article records of their own, named
/// after the formula kind.
fn map_formula(doc: &XmlDocument, node: NodeId, temporal: &TemporalGroupMap) -> Option<Article> {
    let eid = doc.attribute(node, "eId")?.to_string();
    let validity = validity_for(doc, node, temporal);

    Some(Article {
        eid,
        name: doc.attribute(node, "name").map(str::to_string),
        text: doc.text_of(node),
        entry_into_force_date: validity.start,
        expiry_date: validity.end,
        guid: doc.attribute(node, "GUID").map(str::to_string),
        source_manifestation_ref: None,
    })
}

fn join_name(marker: Option<String>, heading: Option<String>) -> Option<String> {
    match (marker, heading) {
        (Some(marker), Some(heading)) => Some(format!("{} {}", marker, heading)),
        (marker, heading) => marker.or(heading),
    }
}

/// Resolves every attachment placeholder against the supplied set and
/// appends one synthetic trailing article per resolved attachment. Missing
/// or unreadable attachments are skipped; the main document stands on its
/// own.
fn stitch_attachments(doc: &XmlDocument, attachments: &AttachmentSet) -> Vec<Article> {
    let mut stitched = Vec::new();
    for node in nodes(doc, "//akn:attachment/akn:documentRef") {
        let Some(href) = doc.attribute(node, "href") else {
            continue;
        };
        let Some((key, bytes)) = attachments.resolve(href) else {
            debug!(href = href, "attachment not present, continuing without it");
            continue;
        };

        let Ok(text) = std::str::from_utf8(bytes) else {
            warn!(key = key, "attachment is not valid UTF-8, skipping");
            continue;
        };
        let mut attachment = match XmlDocument::parse(text, norm_namespaces()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key = key, error = %e, "attachment XML unparsable, skipping");
                continue;
            }
        };

        let title = opt_text(&attachment, "//akn:preface//akn:docTitle")
            .or_else(|| doc.attribute(node, "showAs").map(str::to_string));

        let _ = attachment.remove_matching("//akn:meta");
        let body_text = match attachment.query_first("//akn:mainBody").ok().flatten() {
            Some(body) => attachment.text_of(body),
            None => attachment.text_of(attachment.root()),
        };

        let eid = doc
            .attribute(node, "eId")
            .map(str::to_string)
            .unwrap_or_else(|| {
                key.rsplit('/')
                    .next()
                    .unwrap_or(key)
                    .trim_end_matches(".xml")
                    .to_string()
            });

        stitched.push(Article {
            eid,
            name: title,
            text: body_text,
            entry_into_force_date: None,
            expiry_date: None,
            guid: doc.attribute(node, "GUID").map(str::to_string),
            source_manifestation_ref: Some(key.to_string()),
        });
    }
    stitched
}

/// Document-level dates derived from the temporal groups: the earliest
/// start, and the latest end only when every group is bounded. Any open
/// group keeps the document itself open-ended.
fn document_dates(temporal: &TemporalGroupMap) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let entry = temporal.values().filter_map(|v| v.start).min();
    let expiry = if !temporal.is_empty() && temporal.values().all(|v| v.end.is_some()) {
        temporal.values().filter_map(|v| v.end).max()
    } else {
        None
    };
    (entry, expiry)
}

fn structural_level(local_name: &str) -> Option<u8> {
    match local_name {
        "book" => Some(1),
        "part" => Some(2),
        "chapter" => Some(3),
        "subchapter" => Some(4),
        "title" => Some(5),
        "subtitle" => Some(6),
        "section" => Some(7),
        "subsection" => Some(8),
        _ => None,
    }
}

/// Builds the table of contents. Entries are collected in document order
/// and nested by the level their element type implies, so the tree comes
/// out right whether the source nests containers physically or lists them
/// as flat siblings.
fn build_toc(doc: &XmlDocument) -> Vec<TableOfContentsItem> {
    let Some(body) = doc.query_first("//akn:body").ok().flatten() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    collect_toc_entries(doc, body, &mut entries);
    let mut roots = nest_by_level(entries);
    for item in &mut roots {
        fill_heading_ranges(item);
    }
    roots
}

fn collect_toc_entries(doc: &XmlDocument, node: NodeId, out: &mut Vec<(u8, TableOfContentsItem)>) {
    for child in doc.child_elements(node) {
        let Some(name) = doc.local_name(child) else {
            continue;
        };
        if let Some(level) = structural_level(name) {
            out.push((level, toc_item(doc, child)));
            collect_toc_entries(doc, child, out);
        } else if name == "article" {
            out.push((ARTICLE_LEVEL, toc_item(doc, child)));
        } else {
            collect_toc_entries(doc, child, out);
        }
    }
}

fn toc_item(doc: &XmlDocument, node: NodeId) -> TableOfContentsItem {
    TableOfContentsItem {
        id: doc.attribute(node, "eId").unwrap_or_default().to_string(),
        marker: opt_text_from(doc, node, "akn:num"),
        heading: opt_text_from(doc, node, "akn:heading"),
        children: Vec::new(),
    }
}

/// Folds the flat `(level, item)` sequence into a tree. A container opens a
/// scope that absorbs everything deeper until an element at its level or
/// shallower closes it; articles never open scopes.
fn nest_by_level(entries: Vec<(u8, TableOfContentsItem)>) -> Vec<TableOfContentsItem> {
    let mut roots: Vec<TableOfContentsItem> = Vec::new();
    let mut open: Vec<(u8, usize)> = Vec::new();

    for (level, item) in entries {
        while let Some((open_level, _)) = open.last() {
            if *open_level >= level {
                open.pop();
            } else {
                break;
            }
        }

        let mut target = &mut roots;
        for (_, index) in &open {
            target = &mut target[*index].children;
        }
        target.push(item);

        if level != ARTICLE_LEVEL {
            open.push((level, target.len() - 1));
        }
    }
    roots
}

/// Containers without an explicit heading inherit the marker range of the
/// articles they span, e.g. "§ 1 – § 5".
fn fill_heading_ranges(item: &mut TableOfContentsItem) {
    for child in &mut item.children {
        fill_heading_ranges(child);
    }
    if item.heading.is_none() && !item.children.is_empty() {
        let markers = leaf_markers(item);
        if let (Some(first), Some(last)) = (markers.first(), markers.last()) {
            item.heading = Some(if first == last {
                first.clone()
            } else {
                format!("{} – {}", first, last)
            });
        }
    }
}

fn leaf_markers(item: &TableOfContentsItem) -> Vec<String> {
    let mut markers = Vec::new();
    for child in &item.children {
        if child.children.is_empty() {
            if let Some(marker) = &child.marker {
                markers.push(marker.clone());
            }
        } else {
            markers.extend(leaf_markers(child));
        }
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORM_XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<akn:akomaNtoso xmlns:akn="http://Inhaltsdaten.LegalDocML.de/1.6/"
                xmlns:ris="http://Metadaten.LegalDocML.de/1.6/">
  <akn:act name="regelungstext">
    <akn:meta>
      <akn:identification>
        <akn:FRBRWork>
          <akn:FRBRthis value="eli/bund/bgbl-1/1962/s705/regelungstext-1"/>
          <akn:FRBRuri value="eli/bund/bgbl-1/1962/s705"/>
        </akn:FRBRWork>
        <akn:FRBRExpression>
          <akn:FRBRthis value="eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/regelungstext-1"/>
          <akn:FRBRuri value="eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu"/>
        </akn:FRBRExpression>
        <akn:FRBRManifestation>
          <akn:FRBRthis value="eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/regelungstext-1.xml"/>
        </akn:FRBRManifestation>
      </akn:identification>
      <akn:lifecycle>
        <akn:eventRef eId="ereignis-1" date="1962-07-20" type="generation"/>
        <akn:eventRef eId="ereignis-2" date="2009-12-31" type="repeal"/>
      </akn:lifecycle>
      <akn:temporalData>
        <akn:temporalGroup eId="gel-1">
          <akn:timeInterval eId="gel-1_int-1" start="#ereignis-1"/>
        </akn:temporalGroup>
        <akn:temporalGroup eId="gel-2">
          <akn:timeInterval eId="gel-2_int-1" start="#ereignis-1" end="#ereignis-2"/>
        </akn:temporalGroup>
      </akn:temporalData>
      <akn:proprietary>
        <ris:metadaten>
          <ris:amtlicheAbkuerzung>StBauFG</ris:amtlicheAbkuerzung>
          <ris:fundstelle>
            <ris:datum>1962-07-23</ris:datum>
            <ris:periodikum>BGBl I</ris:periodikum>
            <ris:zitatstelle>S. 465</ris:zitatstelle>
          </ris:fundstelle>
        </ris:metadaten>
      </akn:proprietary>
    </akn:meta>
    <akn:preface>
      <akn:longTitle>
        <akn:p>
          <akn:docTitle>Gesetz &#252;ber st&#228;dtebauliche Sanierungsma&#223;nahmen</akn:docTitle>
          <akn:shortTitle>St&#228;dtebauf&#246;rderungsgesetz (<akn:inline refersTo="amtliche-abkuerzung">StBauFG</akn:inline>)</akn:shortTitle>
        </akn:p>
      </akn:longTitle>
    </akn:preface>
    <akn:preamble>
      <akn:formula eId="preambel-1_formel-1" name="eingangsformel" period="#gel-1">
        <akn:p>Der Bundestag hat das folgende Gesetz beschlossen:</akn:p>
      </akn:formula>
    </akn:preamble>
    <akn:body>
      <akn:part eId="hauptteil-1_teil-1">
        <akn:num>Teil 1</akn:num>
        <akn:heading>Allgemeine Vorschriften</akn:heading>
        <akn:article eId="hauptteil-1_teil-1_art-1" GUID="g-art-1" period="#gel-1">
          <akn:num>&#167; 1</akn:num>
          <akn:heading>Aufgabe</akn:heading>
          <akn:paragraph eId="hauptteil-1_teil-1_art-1_abs-1">
            <akn:num>(1)</akn:num>
            <akn:content>
              <akn:p>Sanierungsma&#223;nahmen<akn:authorialNote><akn:p>Amtliche Fu&#223;note.</akn:p></akn:authorialNote> werden einheitlich vorbereitet.</akn:p>
            </akn:content>
          </akn:paragraph>
        </akn:article>
        <akn:article eId="hauptteil-1_teil-1_art-2" GUID="g-art-2" period="#gel-2">
          <akn:num>&#167; 2</akn:num>
          <akn:heading>Begriffe</akn:heading>
          <akn:paragraph eId="hauptteil-1_teil-1_art-2_abs-1">
            <akn:content><akn:p>Im Sinne dieses Gesetzes gelten die folgenden Begriffe.</akn:p></akn:content>
          </akn:paragraph>
        </akn:article>
      </akn:part>
      <akn:part eId="hauptteil-1_teil-2">
        <akn:num>Teil 2</akn:num>
        <akn:article eId="hauptteil-1_teil-2_art-3">
          <akn:num>&#167; 3</akn:num>
          <akn:paragraph eId="hauptteil-1_teil-2_art-3_abs-1">
            <akn:content><akn:p>Erg&#228;nzende Vorschriften bleiben unber&#252;hrt.</akn:p></akn:content>
          </akn:paragraph>
        </akn:article>
      </akn:part>
    </akn:body>
    <akn:conclusions>
      <akn:formula eId="schluss-1_formel-1" name="schlussformel">
        <akn:p>Das vorstehende Gesetz wird hiermit ausgefertigt.</akn:p>
      </akn:formula>
    </akn:conclusions>
    <akn:attachments>
      <akn:attachment>
        <akn:documentRef eId="anlagen-1_doc-1" href="anlage-regelungstext-1.xml" showAs="Anlage 1"/>
      </akn:attachment>
      <akn:attachment>
        <akn:documentRef eId="anlagen-1_doc-2" href="anlage-regelungstext-2.xml" showAs="Anlage 2"/>
      </akn:attachment>
    </akn:attachments>
  </akn:act>
</akn:akomaNtoso>"##;

    const ATTACHMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<akn:akomaNtoso xmlns:akn="http://Inhaltsdaten.LegalDocML.de/1.6/">
  <akn:doc name="anlage">
    <akn:meta>
      <akn:identification>
        <akn:FRBRManifestation>
          <akn:FRBRthis value="eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/anlage-regelungstext-1.xml"/>
        </akn:FRBRManifestation>
      </akn:identification>
    </akn:meta>
    <akn:preface>
      <akn:longTitle><akn:p><akn:docTitle>Anlage 1 Gebiets&#252;bersicht</akn:docTitle></akn:p></akn:longTitle>
    </akn:preface>
    <akn:mainBody>
      <akn:hcontainer eId="anlage-1_text-1">
        <akn:content><akn:p>Tabelle der f&#246;rderf&#228;higen Gebiete.</akn:p></akn:content>
      </akn:hcontainer>
    </akn:mainBody>
  </akn:doc>
</akn:akomaNtoso>"#;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn map_fixture(attachments: &AttachmentSet) -> NormDocument {
        match NormMapper.map(NORM_XML.as_bytes(), attachments).unwrap() {
            Some(LegalDocument::Norm(norm)) => norm,
            other => panic!("expected a norm, got {other:?}"),
        }
    }

    #[test]
    fn test_identifiers_and_scalars() {
        let norm = map_fixture(&AttachmentSet::new());

        assert_eq!(norm.work_eli, "eli/bund/bgbl-1/1962/s705");
        assert_eq!(
            norm.expression_eli,
            "eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu"
        );
        assert_eq!(
            norm.manifestation_eli.as_deref(),
            Some("eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/regelungstext-1.xml")
        );
        assert_eq!(
            norm.official_title.as_deref(),
            Some("Gesetz über städtebauliche Sanierungsmaßnahmen")
        );
        assert_eq!(
            norm.short_title.as_deref(),
            Some("Städtebauförderungsgesetz (StBauFG)")
        );
        assert_eq!(norm.abbreviation.as_deref(), Some("StBauFG"));
        assert_eq!(norm.published_in.as_deref(), Some("1962-07-23, BGBl I, S. 465"));
    }

    #[test]
    fn test_missing_identifiers_produce_no_document() {
        let no_work = NORM_XML.replace(
            r#"<akn:FRBRuri value="eli/bund/bgbl-1/1962/s705"/>"#,
            r#"<akn:FRBRuri value=""/>"#,
        );
        assert_eq!(
            NormMapper.map(no_work.as_bytes(), &AttachmentSet::new()).unwrap(),
            None
        );

        let no_expression = NORM_XML.replace(
            r#"<akn:FRBRuri value="eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu"/>"#,
            r#"<akn:FRBRuri value=" "/>"#,
        );
        assert_eq!(
            NormMapper
                .map(no_expression.as_bytes(), &AttachmentSet::new())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = NormMapper.map(b"<akn:act>", &AttachmentSet::new());
        assert!(matches!(result, Err(SyncError::XmlParse { .. })));
    }

    #[test]
    fn test_body_walk_order_and_temporal_resolution() {
        let norm = map_fixture(&AttachmentSet::new());
        let eids: Vec<&str> = norm.articles.iter().map(|a| a.eid.as_str()).collect();
        assert_eq!(
            eids,
            vec![
                "preambel-1_formel-1",
                "hauptteil-1_teil-1_art-1",
                "hauptteil-1_teil-1_art-2",
                "hauptteil-1_teil-2_art-3",
                "schluss-1_formel-1",
            ]
        );

        let formula = &norm.articles[0];
        assert_eq!(formula.name.as_deref(), Some("eingangsformel"));
        assert_eq!(formula.entry_into_force_date, Some(date("1962-07-20")));
        assert_eq!(formula.expiry_date, None);

        let art1 = &norm.articles[1];
        assert_eq!(art1.name.as_deref(), Some("§ 1 Aufgabe"));
        assert_eq!(art1.guid.as_deref(), Some("g-art-1"));
        assert_eq!(art1.entry_into_force_date, Some(date("1962-07-20")));
        assert_eq!(art1.expiry_date, None);
        assert!(art1.text.contains("Sanierungsmaßnahmen werden einheitlich"));
        assert!(!art1.text.contains("Fußnote"));

        let art2 = &norm.articles[2];
        assert_eq!(art2.expiry_date, Some(date("2009-12-31")));

        // no period attribute means no temporal constraint
        let art3 = &norm.articles[3];
        assert_eq!(art3.entry_into_force_date, None);
        assert_eq!(art3.expiry_date, None);
    }

    #[test]
    fn test_document_dates_stay_open_while_any_group_is_open() {
        let norm = map_fixture(&AttachmentSet::new());
        assert_eq!(norm.entry_into_force_date, Some(date("1962-07-20")));
        assert_eq!(norm.expiry_date, None);

        // bound the open group and the document closes at the latest end
        let bounded = NORM_XML.replace(
            r##"<akn:timeInterval eId="gel-1_int-1" start="#ereignis-1"/>"##,
            r##"<akn:timeInterval eId="gel-1_int-1" start="#ereignis-1" end="#ereignis-2"/>"##,
        );
        match NormMapper
            .map(bounded.as_bytes(), &AttachmentSet::new())
            .unwrap()
        {
            Some(LegalDocument::Norm(norm)) => {
                assert_eq!(norm.expiry_date, Some(date("2009-12-31")))
            }
            other => panic!("expected a norm, got {other:?}"),
        }
    }

    #[test]
    fn test_temporal_group_without_interval_resolves_unconstrained() {
        let extra_group = NORM_XML.replace(
            "</akn:temporalData>",
            r#"<akn:temporalGroup eId="gel-3"/></akn:temporalData>"#,
        );
        let with_ref = extra_group.replace(
            r#"<akn:article eId="hauptteil-1_teil-2_art-3">"#,
            r##"<akn:article eId="hauptteil-1_teil-2_art-3" period="#gel-3">"##,
        );
        match NormMapper
            .map(with_ref.as_bytes(), &AttachmentSet::new())
            .unwrap()
        {
            Some(LegalDocument::Norm(norm)) => {
                let art3 = norm
                    .articles
                    .iter()
                    .find(|a| a.eid == "hauptteil-1_teil-2_art-3")
                    .unwrap();
                assert_eq!(art3.entry_into_force_date, None);
                assert_eq!(art3.expiry_date, None);
            }
            other => panic!("expected a norm, got {other:?}"),
        }
    }

    #[test]
    fn test_attachment_stitching() {
        let mut attachments = AttachmentSet::new();
        attachments.insert(
            "eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/anlage-regelungstext-1.xml",
            ATTACHMENT_XML.as_bytes().to_vec(),
        );
        let norm = map_fixture(&attachments);

        // one resolved attachment appended, the unresolved one skipped
        assert_eq!(norm.articles.len(), 6);
        let anlage = norm.articles.last().unwrap();
        assert_eq!(anlage.eid, "anlagen-1_doc-1");
        assert_eq!(anlage.name.as_deref(), Some("Anlage 1 Gebietsübersicht"));
        assert!(anlage.text.contains("Tabelle der förderfähigen Gebiete."));
        assert_eq!(
            anlage.source_manifestation_ref.as_deref(),
            Some("eli/bund/bgbl-1/1962/s705/1962-07-20/1/deu/anlage-regelungstext-1.xml")
        );

        // body articles carry no manifestation reference
        assert!(norm.articles[1].source_manifestation_ref.is_none());
    }

    #[test]
    fn test_unreadable_attachment_is_skipped() {
        let mut attachments = AttachmentSet::new();
        attachments.insert("anlage-regelungstext-1.xml", b"<broken".to_vec());
        let norm = map_fixture(&attachments);
        assert_eq!(norm.articles.len(), 5);
    }

    #[test]
    fn test_toc_nesting_and_heading_range() {
        let norm = map_fixture(&AttachmentSet::new());
        assert_eq!(norm.table_of_contents.len(), 2);

        let teil1 = &norm.table_of_contents[0];
        assert_eq!(teil1.marker.as_deref(), Some("Teil 1"));
        assert_eq!(teil1.heading.as_deref(), Some("Allgemeine Vorschriften"));
        assert_eq!(teil1.children.len(), 2);
        assert_eq!(teil1.children[0].marker.as_deref(), Some("§ 1"));
        assert_eq!(teil1.children[0].heading.as_deref(), Some("Aufgabe"));
        assert!(teil1.children[0].children.is_empty());

        // heading-less container inherits the marker range of its articles
        let teil2 = &norm.table_of_contents[1];
        assert_eq!(teil2.heading.as_deref(), Some("§ 3"));
        assert_eq!(teil2.children[0].heading, None);
    }

    #[test]
    fn test_toc_level_reset_over_flat_siblings() {
        let flat = r#"<?xml version="1.0" encoding="UTF-8"?>
<akn:akomaNtoso xmlns:akn="http://Inhaltsdaten.LegalDocML.de/1.6/">
  <akn:act name="regelungstext">
    <akn:meta>
      <akn:identification>
        <akn:FRBRWork><akn:FRBRuri value="eli/bund/bgbl-1/1971/s1125"/></akn:FRBRWork>
        <akn:FRBRExpression><akn:FRBRuri value="eli/bund/bgbl-1/1971/s1125/1971-08-01/1/deu"/></akn:FRBRExpression>
      </akn:identification>
    </akn:meta>
    <akn:body>
      <akn:part eId="teil-1"><akn:num>Teil 1</akn:num></akn:part>
      <akn:title eId="titel-1"><akn:num>Titel 1</akn:num><akn:heading>Grunds&#228;tze</akn:heading></akn:title>
      <akn:article eId="art-1"><akn:num>&#167; 1</akn:num><akn:heading></akn:heading></akn:article>
      <akn:part eId="teil-2"><akn:num>Teil 2</akn:num><akn:heading>Schluss</akn:heading></akn:part>
    </akn:body>
  </akn:act>
</akn:akomaNtoso>"#;

        match NormMapper.map(flat.as_bytes(), &AttachmentSet::new()).unwrap() {
            Some(LegalDocument::Norm(norm)) => {
                let toc = &norm.table_of_contents;
                assert_eq!(toc.len(), 2);
                assert_eq!(toc[0].marker.as_deref(), Some("Teil 1"));
                assert_eq!(toc[0].children.len(), 1);
                assert_eq!(toc[0].children[0].marker.as_deref(), Some("Titel 1"));
                assert_eq!(toc[0].children[0].children.len(), 1);
                // empty heading element reads as headingless
                assert_eq!(toc[0].children[0].children[0].heading, None);
                assert_eq!(toc[1].marker.as_deref(), Some("Teil 2"));
                assert!(toc[1].children.is_empty());
                // range fallback never overwrites an explicit heading
                assert_eq!(toc[1].heading.as_deref(), Some("Schluss"));
            }
            other => panic!("expected a norm, got {other:?}"),
        }
    }

    #[test]
    fn test_published_in_with_partial_components() {
        let without_date = NORM_XML.replace("<ris:datum>1962-07-23</ris:datum>", "");
        match NormMapper
            .map(without_date.as_bytes(), &AttachmentSet::new())
            .unwrap()
        {
            Some(LegalDocument::Norm(norm)) => {
                assert_eq!(norm.published_in.as_deref(), Some("BGBl I, S. 465"))
            }
            other => panic!("expected a norm, got {other:?}"),
        }
    }
}
