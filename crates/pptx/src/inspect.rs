//! Slide listing for choosing split ranges.

use ppt_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::path::Path;

use crate::container::Package;
use crate::presentation::slide_rel_ids;
use crate::rels::{rels_path_for, RelationshipFile};
use crate::split::main_document;
use crate::xml::{as_text, attr, local_name};

/// Longest fallback summary, in characters.
const SUMMARY_CHARS: usize = 20;

/// One slide as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideSummary {
    /// 1-based position in the slide order.
    pub number: usize,
    pub part: String,
    pub summary: String,
    pub videos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckSummary {
    pub slides: Vec<SlideSummary>,
}

impl DeckSummary {
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }
}

/// Summarize every slide of the deck at `path`, in presentation order.
pub fn inspect(path: &Path) -> Result<DeckSummary> {
    let mut pkg = Package::open(path)?;
    let main = main_document(&mut pkg)?;
    let xml = pkg
        .read_part(&main)?
        .ok_or_else(|| Error::PptxParseError(format!("main document '{}' not found", main)))?;
    let rels_name = rels_path_for(&main);
    let rels = match pkg.read_part(&rels_name)? {
        Some(bytes) => RelationshipFile::parse_lenient(&bytes, &rels_name),
        None => RelationshipFile::default(),
    };

    let mut slides = Vec::new();
    for (idx, rid) in slide_rel_ids(&xml)?.iter().enumerate() {
        let Some(part) = rels.get(rid).and_then(|r| r.resolve(&main)) else {
            log::warn!("Slide list entry {} has no target", rid);
            continue;
        };
        let Some(content) = pkg.read_part(&part)? else {
            log::warn!("Slide '{}' is missing from the package", part);
            continue;
        };
        let shapes = extract_shapes(as_text(&content, &part)?);
        let videos = shapes.iter().filter(|s| s.is_video).count();
        slides.push(SlideSummary {
            number: idx + 1,
            part,
            summary: summarize(&shapes),
            videos,
        });
    }

    log::debug!("Inspected {}: {} slides", path.display(), slides.len());
    Ok(DeckSummary { slides })
}

/// Title text, else the first text on the slide shortened, else "(untitled)".
fn summarize(shapes: &[ShapeInfo]) -> String {
    if let Some(title) = shapes.iter().find(|s| s.is_title && !s.text.is_empty()) {
        return title.text.replace('\n', " ");
    }
    let mut texts: Vec<&ShapeInfo> = shapes.iter().filter(|s| !s.text.is_empty()).collect();
    texts.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    match texts.first() {
        Some(first) => {
            let flat = first.text.replace('\n', " ");
            if flat.chars().count() > SUMMARY_CHARS {
                let cut: String = flat.chars().take(SUMMARY_CHARS).collect();
                format!("{}...", cut)
            } else {
                flat
            }
        }
        None => "(untitled)".to_string(),
    }
}

/// Information about a shape extracted from XML.
#[derive(Debug, Default)]
struct ShapeInfo {
    text: String,
    x: f64,
    y: f64,
    is_title: bool,
    is_video: bool,
}

/// Extract shapes with text and position from slide XML.
fn extract_shapes(xml_content: &str) -> Vec<ShapeInfo> {
    let mut shapes = Vec::new();
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut current_shape: Option<ShapeInfo> = None;
    let mut in_text_body = false;
    let mut in_paragraph = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" | b"pic" => current_shape = Some(ShapeInfo::default()),
                b"txBody" => in_text_body = true,
                b"p" if in_text_body => {
                    in_paragraph = true;
                    if !current_text.is_empty() {
                        current_text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                let Some(ref mut shape) = current_shape else {
                    continue;
                };
                match local_name(e.name().as_ref()) {
                    b"off" => {
                        shape.x = attr(e, b"x").and_then(|v| v.parse().ok()).unwrap_or(shape.x);
                        shape.y = attr(e, b"y").and_then(|v| v.parse().ok()).unwrap_or(shape.y);
                    }
                    b"ph" => {
                        shape.is_title = matches!(attr(e, b"type").as_deref(), Some("title") | Some("ctrTitle"));
                    }
                    b"videoFile" | b"media" => shape.is_video = true,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_paragraph {
                    let text = e.unescape().unwrap_or_default();
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" | b"pic" => {
                    if let Some(mut shape) = current_shape.take() {
                        shape.text = current_text.trim().to_string();
                        if !shape.text.is_empty() || shape.is_video {
                            shapes.push(shape);
                        }
                    }
                    current_text.clear();
                    in_text_body = false;
                    in_paragraph = false;
                }
                b"txBody" => in_text_body = false,
                b"p" => in_paragraph = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("XML parsing error (continuing): {}", e);
                break;
            }
            _ => {}
        }
    }

    shapes
}
