//! Reachability compaction of a package.
//!
//! A mark-and-sweep pass over the relationship graph: starting from the root
//! manifest, every part reachable through internal, non-video edges is kept;
//! everything else is dropped. Relationship parts are rewritten to shed edges
//! to dropped parts, and the content-type index is pruned to match.

use ppt_core::Result;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::container::{Package, PackageWriter};
use crate::content_types::{ContentTypes, CONTENT_TYPES_PART};
use crate::media;
use crate::presentation::slide_rel_ids;
use crate::rels::{rels_path_for, Relationship, RelationshipFile, DEFAULT_MAIN_DOCUMENT, OFFICE_DOCUMENT_REL, ROOT_RELS};

/// Parts kept even when no relationship names them.
const ALWAYS_KEPT: &[&str] = &["docProps/app.xml", "docProps/core.xml"];

/// What a compaction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Number of parts in the output.
    pub kept: usize,
    /// Parts present in the input but not in the output.
    pub dropped: Vec<String>,
    /// Relationship parts whose content changed.
    pub rewritten_rels: usize,
    /// Whether the root manifest lacked a main-document edge.
    pub synthesized_main_document: bool,
}

/// Mark-and-sweep compactor, optionally with replacement part contents.
#[derive(Debug, Default)]
pub struct Compactor {
    replacements: HashMap<String, Vec<u8>>,
}

impl Compactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `bytes` as the content of `part` (which must exist) both for the
    /// traversal and in the output.
    pub fn with_part(mut self, part: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.replacements.insert(part.into(), bytes);
        self
    }

    fn read(&self, pkg: &mut Package, part: &str) -> Result<Option<Vec<u8>>> {
        match self.replacements.get(part) {
            Some(bytes) => Ok(Some(bytes.clone())),
            None => pkg.read_part(part),
        }
    }

    /// Compact `src` into `dest`. `dest` may equal `src`.
    pub fn compact(&self, src: &Path, dest: &Path) -> Result<CompactionReport> {
        let mut pkg = Package::open(src)?;
        let mut report = CompactionReport::default();

        // Root manifest, repaired to always name a main document.
        let mut root = match self.read(&mut pkg, ROOT_RELS)? {
            Some(bytes) => RelationshipFile::parse_lenient(&bytes, ROOT_RELS),
            None => RelationshipFile::default(),
        };
        if !root.entries.iter().any(|r| r.is_main_document() && !r.external) {
            log::warn!("Root manifest has no main document; adding {}", DEFAULT_MAIN_DOCUMENT);
            root.add(OFFICE_DOCUMENT_REL, DEFAULT_MAIN_DOCUMENT, false);
            report.synthesized_main_document = true;
        }
        root.retain(|r| !r.is_video(""));

        let main_documents: HashSet<String> = root
            .entries
            .iter()
            .filter(|r| r.is_main_document())
            .filter_map(|r| r.resolve(""))
            .collect();

        let mut keep: BTreeSet<String> = BTreeSet::new();
        let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        // Main document first, then every other root target.
        let mut seeds: Vec<String> = root.internal_targets("").collect();
        seeds.sort_by_key(|p| !main_documents.contains(p));
        queue.extend(seeds);

        while let Some(part) = queue.pop_front() {
            if keep.contains(&part) || media::is_video_part(&part) || !pkg.contains(&part) {
                continue;
            }
            keep.insert(part.clone());

            let rels_name = rels_path_for(&part);
            let Some(bytes) = self.read(&mut pkg, &rels_name)? else {
                continue;
            };
            keep.insert(rels_name.clone());

            let mut rels = match RelationshipFile::parse(&bytes) {
                Ok(rels) => rels,
                Err(e) => {
                    // Unreadable: follow nothing, keep the bytes as they are.
                    log::warn!("Treating unreadable '{}' as empty: {}", rels_name, e);
                    continue;
                }
            };

            let mut changed = rels.retain(|r| !r.is_video(&part)) > 0;
            if main_documents.contains(&part) {
                changed |= self.drop_unlisted_slides(&mut pkg, &part, &mut rels)? > 0;
            }
            if changed {
                report.rewritten_rels += 1;
                rewritten.insert(rels_name, rels.to_xml()?);
            }

            for target in rels.internal_targets(&part) {
                if !keep.contains(&target) && !media::is_video_part(&target) && pkg.contains(&target) {
                    queue.push_back(target);
                }
            }
        }

        for part in ALWAYS_KEPT {
            if pkg.contains(part) {
                keep.insert(part.to_string());
                let rels_name = rels_path_for(part);
                if pkg.contains(&rels_name) {
                    keep.insert(rels_name);
                }
            }
        }

        keep.insert(ROOT_RELS.to_string());
        let content_types = self.pruned_content_types(&mut pkg, &keep)?;
        if content_types.is_some() {
            keep.insert(CONTENT_TYPES_PART.to_string());
        }

        report.dropped = pkg
            .part_names()
            .into_iter()
            .filter(|p| !keep.contains(p))
            .collect();
        report.kept = keep.len();

        let mut writer = PackageWriter::create(dest)?;
        if let Some(bytes) = &content_types {
            writer.write_part(CONTENT_TYPES_PART, bytes)?;
        }
        writer.write_part(ROOT_RELS, &root.to_xml()?)?;
        for part in &keep {
            if part == CONTENT_TYPES_PART || part == ROOT_RELS {
                continue;
            }
            if let Some(bytes) = rewritten.get(part) {
                writer.write_part(part, bytes)?;
            } else if let Some(bytes) = self.replacements.get(part) {
                writer.write_part(part, bytes)?;
            } else {
                writer.copy_part(&mut pkg, part)?;
            }
        }
        drop(pkg);
        writer.finish()?;

        log::info!(
            "Compacted {}: kept {} parts, dropped {}, rewrote {} relationship parts",
            dest.display(),
            report.kept,
            report.dropped.len(),
            report.rewritten_rels
        );
        Ok(report)
    }

    /// Drop slide edges of the main document that its slide list no longer
    /// references. Returns how many were dropped.
    fn drop_unlisted_slides(&self, pkg: &mut Package, part: &str, rels: &mut RelationshipFile) -> Result<usize> {
        let Some(xml) = self.read(pkg, part)? else {
            return Ok(0);
        };
        let listed: HashSet<String> = match slide_rel_ids(&xml) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                log::warn!("Could not read slide list of '{}', keeping all slides: {}", part, e);
                return Ok(0);
            }
        };
        let dropped = rels.retain(|r: &Relationship| !r.is_slide() || listed.contains(&r.id));
        if dropped > 0 {
            log::debug!("Dropped {} unlisted slide relationships from '{}'", dropped, part);
        }
        Ok(dropped)
    }

    /// The content-type index with overrides limited to `keep`, or `None`
    /// if the package has no index. An unreadable index is kept verbatim.
    fn pruned_content_types(&self, pkg: &mut Package, keep: &BTreeSet<String>) -> Result<Option<Vec<u8>>> {
        let Some(bytes) = self.read(pkg, CONTENT_TYPES_PART)? else {
            return Ok(None);
        };
        match ContentTypes::parse(&bytes) {
            Ok(mut types) => {
                let kept: HashSet<String> = keep.iter().cloned().collect();
                let dropped = types.retain_parts(&kept);
                if dropped.is_empty() {
                    Ok(Some(bytes))
                } else {
                    log::debug!("Pruned {} content-type overrides", dropped.len());
                    Ok(Some(types.to_xml()?))
                }
            }
            Err(e) => {
                log::warn!("Keeping unreadable content types as-is: {}", e);
                Ok(Some(bytes))
            }
        }
    }
}

/// Compact `src` into `dest` with no replacement parts.
pub fn compact(src: &Path, dest: &Path) -> Result<CompactionReport> {
    Compactor::new().compact(src, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::DeckBuilder;
    use crate::rels::is_rels_part;

    /// Every part reachable from the root manifest via internal edges.
    fn reachable(pkg: &mut Package) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from(vec![String::new()]);
        while let Some(part) = queue.pop_front() {
            let rels_name = rels_path_for(&part);
            if let Some(bytes) = pkg.read_part(&rels_name).unwrap() {
                seen.insert(rels_name);
                let rels = RelationshipFile::parse(&bytes).unwrap();
                for target in rels.internal_targets(&part) {
                    if seen.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
            }
        }
        seen
    }

    #[test]
    fn test_compacted_output_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(6).with_video_on(2).with_orphan_image().write(&src).unwrap();
        let out = dir.path().join("out.pptx");

        let report = compact(&src, &out).unwrap();
        assert!(report.dropped.contains(&"ppt/media/orphan.png".to_string()));
        assert!(report.dropped.contains(&"ppt/media/media1.mp4".to_string()));

        let mut pkg = Package::open(&out).unwrap();
        let reach = reachable(&mut pkg);
        for part in pkg.part_names() {
            if part == CONTENT_TYPES_PART {
                continue;
            }
            assert!(reach.contains(&part), "{} is not reachable", part);
        }
        // No kept relationship file points outside the package.
        for target in &reach {
            assert!(pkg.contains(target), "dangling edge to {}", target);
        }
    }

    #[test]
    fn test_no_video_residue() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(3).with_video_on(1).with_video_on(3).write(&src).unwrap();
        let out = dir.path().join("out.pptx");
        compact(&src, &out).unwrap();

        let mut pkg = Package::open(&out).unwrap();
        for part in pkg.part_names() {
            assert!(!media::is_video_part(&part), "video part {} survived", part);
            if is_rels_part(&part) {
                let owner = owner_of(&part);
                let rels = RelationshipFile::parse(&pkg.read_part(&part).unwrap().unwrap()).unwrap();
                assert!(rels.entries.iter().all(|r| !r.is_video(&owner)), "video edge in {}", part);
            }
        }
    }

    #[test]
    fn test_content_types_match_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(4).with_orphan_image().write(&src).unwrap();
        let out = dir.path().join("out.pptx");

        let presentation = crate::fixture::presentation_xml(4)
            .replace(r#"<p:sldId id="256" r:id="rId2"/>"#, "");
        Compactor::new()
            .with_part("ppt/presentation.xml", presentation.into_bytes())
            .compact(&src, &out)
            .unwrap();

        let mut pkg = Package::open(&out).unwrap();
        assert!(!pkg.contains("ppt/slides/slide1.xml"));
        assert!(pkg.contains("ppt/slides/slide2.xml"));
        let types = ContentTypes::parse(&pkg.read_part(CONTENT_TYPES_PART).unwrap().unwrap()).unwrap();
        for (part, _) in &types.overrides {
            assert!(pkg.contains(&crate::rels::normalize_part_path(part)), "override for missing {}", part);
        }
        for part in pkg.part_names() {
            if part.starts_with("ppt/slides/slide") {
                assert!(types.override_for(&part).is_some(), "slide {} lost its override", part);
            }
        }
    }

    #[test]
    fn test_shared_parts_survive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(3).write(&src).unwrap();
        let out = dir.path().join("out.pptx");

        // Only slide 3 survives; the layout, master and theme it shares with
        // the dropped slides must stay.
        let presentation = crate::fixture::presentation_xml(3)
            .replace(r#"<p:sldId id="256" r:id="rId2"/>"#, "")
            .replace(r#"<p:sldId id="257" r:id="rId3"/>"#, "");
        Compactor::new()
            .with_part("ppt/presentation.xml", presentation.into_bytes())
            .compact(&src, &out)
            .unwrap();

        let pkg = Package::open(&out).unwrap();
        assert!(pkg.contains("ppt/slideLayouts/slideLayout1.xml"));
        assert!(pkg.contains("ppt/slideMasters/slideMaster1.xml"));
        assert!(pkg.contains("ppt/theme/theme1.xml"));
        assert!(pkg.contains("ppt/media/image3.png"));
        assert!(!pkg.contains("ppt/media/image1.png"));
    }

    #[test]
    fn test_missing_main_document_edge_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(2).without_main_document_edge().write(&src).unwrap();
        let out = dir.path().join("out.pptx");

        let report = compact(&src, &out).unwrap();
        assert!(report.synthesized_main_document);

        let mut pkg = Package::open(&out).unwrap();
        assert!(pkg.contains("ppt/slides/slide2.xml"));
        let root = RelationshipFile::parse(&pkg.read_part(ROOT_RELS).unwrap().unwrap()).unwrap();
        assert!(root.entries.iter().any(|r| r.is_main_document()));
    }

    #[test]
    fn test_compact_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(2).with_orphan_image().write(&src).unwrap();
        compact(&src, &src).unwrap();
        let pkg = Package::open(&src).unwrap();
        assert!(!pkg.contains("ppt/media/orphan.png"));
        assert!(pkg.contains("ppt/slides/slide1.xml"));
    }

    #[test]
    fn test_unreadable_slide_rels_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("deck.pptx");
        DeckBuilder::new(3).write(&src).unwrap();
        let out = dir.path().join("out.pptx");

        let broken = b"<Relationships><Relationship".to_vec();
        Compactor::new()
            .with_part("ppt/slides/_rels/slide2.xml.rels", broken.clone())
            .compact(&src, &out)
            .unwrap();

        let mut pkg = Package::open(&out).unwrap();
        assert!(pkg.contains("ppt/slides/slide1.xml"));
        assert!(pkg.contains("ppt/slides/slide2.xml"));
        assert!(pkg.contains("ppt/slides/slide3.xml"));
        // Kept as-is, with nothing behind it followed.
        assert_eq!(pkg.read_part("ppt/slides/_rels/slide2.xml.rels").unwrap().unwrap(), broken);
        assert!(!pkg.contains("ppt/media/image2.png"));
        assert!(pkg.contains("ppt/media/image3.png"));
    }

    fn owner_of(rels_part: &str) -> String {
        let (dir, file) = rels_part.rsplit_once('/').unwrap();
        let owner_dir = dir.trim_end_matches("_rels").trim_end_matches('/');
        let owner_file = file.trim_end_matches(".rels");
        if owner_dir.is_empty() {
            owner_file.to_string()
        } else {
            format!("{}/{}", owner_dir, owner_file)
        }
    }
}
