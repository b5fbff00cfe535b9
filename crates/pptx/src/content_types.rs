//! The `[Content_Types].xml` index.

use ppt_core::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;

use crate::xml::{as_text, attr, local_name, xml_err};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Extension defaults and per-part overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// `(extension, media type)` pairs.
    pub defaults: Vec<(String, String)>,
    /// `(part name with leading slash, media type)` pairs.
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = as_text(bytes, CONTENT_TYPES_PART)?;
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut types = Self::default();
        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                    b"Default" => {
                        if let (Some(ext), Some(ct)) = (attr(e, b"Extension"), attr(e, b"ContentType")) {
                            types.defaults.push((ext, ct));
                        }
                    }
                    b"Override" => {
                        if let (Some(part), Some(ct)) = (attr(e, b"PartName"), attr(e, b"ContentType")) {
                            types.overrides.push((part, ct));
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_err("Error parsing content types", e)),
                _ => {}
            }
        }
        Ok(types)
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let w = |e: quick_xml::Error| xml_err("Error writing content types", e);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(w)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("Types").with_attributes([("xmlns", CONTENT_TYPES_NS)]),
            ))
            .map_err(w)?;
        for (ext, ct) in &self.defaults {
            let el = BytesStart::new("Default")
                .with_attributes([("Extension", ext.as_str()), ("ContentType", ct.as_str())]);
            writer.write_event(Event::Empty(el)).map_err(w)?;
        }
        for (part, ct) in &self.overrides {
            let el = BytesStart::new("Override")
                .with_attributes([("PartName", part.as_str()), ("ContentType", ct.as_str())]);
            writer.write_event(Event::Empty(el)).map_err(w)?;
        }
        writer.write_event(Event::End(BytesEnd::new("Types"))).map_err(w)?;
        Ok(writer.into_inner())
    }

    /// Drop overrides whose part is not in `kept` (normalized, no slash).
    /// Returns the part names that were dropped.
    pub fn retain_parts(&mut self, kept: &HashSet<String>) -> Vec<String> {
        let mut dropped = Vec::new();
        self.overrides.retain(|(part, _)| {
            let normalized = crate::rels::normalize_part_path(part);
            let keep = kept.contains(&normalized);
            if !keep {
                dropped.push(normalized);
            }
            keep
        });
        dropped
    }

    /// Declare `content_type` for `extension` unless some default covers it.
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) -> bool {
        if self.defaults.iter().any(|(ext, _)| ext.eq_ignore_ascii_case(extension)) {
            return false;
        }
        self.defaults.push((extension.to_string(), content_type.to_string()));
        true
    }

    pub fn override_for(&self, part: &str) -> Option<&str> {
        let wanted = crate::rels::normalize_part_path(part);
        self.overrides
            .iter()
            .find(|(p, _)| crate::rels::normalize_part_path(p) == wanted)
            .map(|(_, ct)| ct.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
  <Override PartName="/ppt/slides/slide1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>
  <Override PartName="/ppt/slides/slide2.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>
</Types>"#;

    #[test]
    fn test_prune_overrides() {
        let mut types = ContentTypes::parse(TYPES.as_bytes()).unwrap();
        assert_eq!(types.defaults.len(), 2);
        assert_eq!(types.overrides.len(), 3);

        let kept: HashSet<String> = ["ppt/presentation.xml", "ppt/slides/slide2.xml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let dropped = types.retain_parts(&kept);
        assert_eq!(dropped, vec!["ppt/slides/slide1.xml"]);

        let again = ContentTypes::parse(&types.to_xml().unwrap()).unwrap();
        assert_eq!(again.overrides.len(), 2);
        assert!(again.override_for("ppt/slides/slide2.xml").is_some());
        assert!(again.override_for("ppt/slides/slide1.xml").is_none());
    }

    #[test]
    fn test_ensure_default() {
        let mut types = ContentTypes::parse(TYPES.as_bytes()).unwrap();
        assert!(types.ensure_default("png", "image/png"));
        assert!(!types.ensure_default("PNG", "image/png"));
        assert!(!types.ensure_default("xml", "application/xml"));
    }
}
