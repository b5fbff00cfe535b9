//! Relationship files: parsing, target resolution and rewriting.
//!
//! Every part may own a sibling `_rels/<name>.rels` listing its outgoing
//! typed edges. Internal edges resolve to another part path relative to the
//! owning part; external edges carry an opaque URI.

use ppt_core::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::media;
use crate::xml::{as_text, attr, local_name, xml_err};

pub const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const SLIDE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
pub const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const HYPERLINK_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
pub const VIDEO_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/video";
pub const MEDIA_REL: &str = "http://schemas.microsoft.com/office/2007/relationships/media";

/// Path of the root manifest.
pub const ROOT_RELS: &str = "_rels/.rels";
/// Well-known location of the main document part.
pub const DEFAULT_MAIN_DOCUMENT: &str = "ppt/presentation.xml";

/// One directed, typed edge out of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn internal(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.into(),
            target: target.into(),
            external: false,
        }
    }

    pub fn external(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::internal(id, rel_type, target)
        }
    }

    /// Resolved part path for an internal edge owned by `source_part`.
    pub fn resolve(&self, source_part: &str) -> Option<String> {
        if self.external {
            None
        } else {
            Some(resolve_target(source_part, &self.target))
        }
    }

    pub fn is_main_document(&self) -> bool {
        self.rel_type.ends_with("/officeDocument")
    }

    pub fn is_slide(&self) -> bool {
        self.rel_type.ends_with("/relationships/slide")
    }

    /// Whether this edge points at video content, embedded or linked.
    pub fn is_video(&self, source_part: &str) -> bool {
        if self.rel_type.ends_with("/relationships/video") {
            return true;
        }
        if self.external {
            self.rel_type == MEDIA_REL || media::has_video_extension(self.target.split(['?', '#']).next().unwrap_or(""))
        } else {
            media::is_video_part(&resolve_target(source_part, &self.target))
        }
    }
}

/// The parsed content of one `.rels` part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipFile {
    pub entries: Vec<Relationship>,
}

impl RelationshipFile {
    /// Parse a relationship part strictly.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = as_text(bytes, "relationships")?;
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut entries = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if local_name(e.name().as_ref()) == b"Relationship" =>
                {
                    let external = attr(e, b"TargetMode")
                        .map(|m| m.eq_ignore_ascii_case("external"))
                        .unwrap_or(false);
                    entries.push(Relationship {
                        id: attr(e, b"Id").unwrap_or_default(),
                        rel_type: attr(e, b"Type").unwrap_or_default(),
                        target: attr(e, b"Target").unwrap_or_default(),
                        external,
                    });
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_err("Error parsing relationships", e)),
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    /// Parse a relationship part, treating malformed content as empty.
    pub fn parse_lenient(bytes: &[u8], part: &str) -> Self {
        match Self::parse(bytes) {
            Ok(rels) => rels,
            Err(e) => {
                log::warn!("Treating unreadable '{}' as empty: {}", part, e);
                Self::default()
            }
        }
    }

    /// Serialize to a standalone relationship part.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let w = |e: quick_xml::Error| xml_err("Error writing relationships", e);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(w)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("Relationships").with_attributes([("xmlns", PACKAGE_RELS_NS)]),
            ))
            .map_err(w)?;
        for rel in &self.entries {
            let mut el = BytesStart::new("Relationship");
            el.push_attribute(("Id", rel.id.as_str()));
            el.push_attribute(("Type", rel.rel_type.as_str()));
            el.push_attribute(("Target", rel.target.as_str()));
            if rel.external {
                el.push_attribute(("TargetMode", "External"));
            }
            writer.write_event(Event::Empty(el)).map_err(w)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("Relationships")))
            .map_err(w)?;
        Ok(writer.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// Keep only the entries matching `keep`. Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Relationship) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|r| keep(r));
        before - self.entries.len()
    }

    /// An `rIdN` not yet used in this file.
    pub fn next_id(&self) -> String {
        let max = self
            .entries
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Append an entry with a fresh id and return that id.
    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let id = self.next_id();
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    /// Internal targets resolved against `source_part`.
    pub fn internal_targets<'a>(&'a self, source_part: &'a str) -> impl Iterator<Item = String> + 'a {
        self.entries.iter().filter_map(move |r| r.resolve(source_part))
    }
}

/// Normalize a part path: forward slashes, no leading slash, `.`/`..` folded.
pub fn normalize_part_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Directory portion of a normalized part path ("" at the root).
pub fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relationship target against the part that owns it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let target = match urlencoding::decode(&target) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => target,
    };
    if target.starts_with('/') {
        return normalize_part_path(&target);
    }
    let dir = part_dir(&normalize_part_path(source_part)).to_string();
    if dir.is_empty() {
        normalize_part_path(&target)
    } else {
        normalize_part_path(&format!("{}/{}", dir, target))
    }
}

/// Location of the relationship part owned by `part` (root: `_rels/.rels`).
pub fn rels_path_for(part: &str) -> String {
    let part = normalize_part_path(part);
    let (dir, name) = match part.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", part.as_str()),
    };
    if dir.is_empty() {
        format!("_rels/{}.rels", name)
    } else {
        format!("{}/_rels/{}.rels", dir, name)
    }
}

/// Whether `part` is itself a relationship part.
pub fn is_rels_part(part: &str) -> bool {
    part.ends_with(".rels") && (part.starts_with("_rels/") || part.contains("/_rels/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.microsoft.com/office/2007/relationships/media" Target="../media/media1.mp4"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/video" Target="https://example.com/v" TargetMode="External"/>
  <Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn test_parse_relationships() {
        let rels = RelationshipFile::parse(SLIDE_RELS.as_bytes()).unwrap();
        assert_eq!(rels.entries.len(), 4);
        assert_eq!(rels.entries[0].target, "../slideLayouts/slideLayout1.xml");
        assert!(rels.entries[2].external);
        assert_eq!(rels.entries[3].target, "https://example.com/?a=1&b=2");
        assert_eq!(rels.next_id(), "rId5");
    }

    #[test]
    fn test_video_classification() {
        let rels = RelationshipFile::parse(SLIDE_RELS.as_bytes()).unwrap();
        let src = "ppt/slides/slide1.xml";
        let flags: Vec<bool> = rels.entries.iter().map(|r| r.is_video(src)).collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let rels = RelationshipFile::parse(SLIDE_RELS.as_bytes()).unwrap();
        let again = RelationshipFile::parse(&rels.to_xml().unwrap()).unwrap();
        assert_eq!(rels, again);
    }

    #[test]
    fn test_malformed_is_empty_when_lenient() {
        assert!(RelationshipFile::parse(b"<Relationships><Relationship").is_err());
        let rels = RelationshipFile::parse_lenient(b"<Relationships><Relationship", "x.rels");
        assert!(rels.entries.is_empty());
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(resolve_target("ppt/presentation.xml", "slides/slide2.xml"), "ppt/slides/slide2.xml");
        assert_eq!(resolve_target("", "ppt/presentation.xml"), "ppt/presentation.xml");
        assert_eq!(resolve_target("ppt/slides/slide1.xml", "/ppt/media/a.png"), "ppt/media/a.png");
        assert_eq!(resolve_target("ppt/slides/slide1.xml", "../media/my%20clip.mp4"), "ppt/media/my clip.mp4");
        assert_eq!(normalize_part_path("\\ppt\\.\\slides\\..\\x.xml"), "ppt/x.xml");
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
        assert_eq!(rels_path_for("ppt/presentation.xml"), "ppt/_rels/presentation.xml.rels");
        assert_eq!(rels_path_for(""), "_rels/.rels");
        assert!(is_rels_part("ppt/slides/_rels/slide1.xml.rels"));
        assert!(is_rels_part("_rels/.rels"));
        assert!(!is_rels_part("ppt/slides/slide1.xml"));
    }
}
