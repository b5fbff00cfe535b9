//! The main document's Slide Order List (`p:sldIdLst`).
//!
//! This list, not the relationship file, decides which slides exist and in
//! which order.

use ppt_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::xml::{as_text, local_name, prefixed_attr, xml_err};

/// Relationship ids of the listed slides, in presentation order.
pub fn slide_rel_ids(presentation_xml: &[u8]) -> Result<Vec<String>> {
    let text = as_text(presentation_xml, "presentation")?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut ids = Vec::new();
    let mut in_list = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"sldIdLst" => in_list = true,
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == b"sldIdLst" => in_list = false,
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_list && local_name(e.name().as_ref()) == b"sldId" =>
            {
                if let Some(id) = prefixed_attr(e, b"id") {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err("Error parsing slide list", e)),
            _ => {}
        }
    }
    Ok(ids)
}

/// Rewrite the main document keeping only slides at 1-based positions
/// `start..=end`. Everything else in the document is copied unchanged.
///
/// Returns the new document and the relationship ids that were removed.
pub fn keep_slide_range(presentation_xml: &[u8], start: usize, end: usize) -> Result<(Vec<u8>, Vec<String>)> {
    let listed = slide_rel_ids(presentation_xml)?;
    if start < 1 || end < start || end > listed.len() {
        return Err(Error::InvalidJob(format!(
            "slide range {}-{} is outside a deck of {} slides",
            start,
            end,
            listed.len()
        )));
    }

    // Positions to drop, visited from the back so earlier positions stay put.
    let mut drop = vec![false; listed.len()];
    let mut removed = Vec::new();
    for idx in (0..listed.len()).rev() {
        let position = idx + 1;
        if position < start || position > end {
            drop[idx] = true;
            removed.push(listed[idx].clone());
        }
    }
    removed.reverse();

    let text = as_text(presentation_xml, "presentation")?;
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::with_capacity(presentation_xml.len()));
    let w = |e: quick_xml::Error| xml_err("Error writing presentation", e);

    let mut in_list = false;
    let mut position = 0usize;
    // Depth inside a dropped <p:sldId> that has children.
    let mut skipping = 0usize;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| xml_err("Error parsing presentation", e))?;

        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sldIdLst" => in_list = true,
            Event::End(e) if local_name(e.name().as_ref()) == b"sldIdLst" => in_list = false,
            Event::Empty(e) if in_list && local_name(e.name().as_ref()) == b"sldId" => {
                position += 1;
                if drop.get(position - 1).copied().unwrap_or(false) {
                    continue;
                }
            }
            Event::Start(e) if in_list && local_name(e.name().as_ref()) == b"sldId" => {
                position += 1;
                if drop.get(position - 1).copied().unwrap_or(false) {
                    skipping = 1;
                    continue;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event).map_err(w)?;
    }

    Ok((writer.into_inner(), removed))
}
