//! Replacement of embedded video shapes by a linked placeholder image.

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use ppt_core::{Error, ProgressSink, Result, VideoMap};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use crate::container::{copy_atomic, Package, PackageWriter};
use crate::content_types::{ContentTypes, CONTENT_TYPES_PART};
use crate::media::{self, natural_cmp};
use crate::rels::{rels_path_for, RelationshipFile, HYPERLINK_REL, IMAGE_REL};
use crate::xml::{as_text, attr, local_name, prefix, prefixed_attr, xml_err};

/// Where the placeholder image is stored.
pub const PLACEHOLDER_PART: &str = "ppt/media/videoPlaceholder.png";
const PLACEHOLDER_TARGET: &str = "../media/videoPlaceholder.png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstituteReport {
    /// Video shapes replaced by a placeholder.
    pub replaced: usize,
    /// Video shapes left as they were because no harvested video matched.
    pub unmatched: usize,
}

/// Replace every video shape whose video was harvested with a placeholder
/// image linking to the harvested URL, writing the result to `dest`.
pub fn substitute(src: &Path, dest: &Path, videos: &VideoMap, sink: &dyn ProgressSink) -> Result<SubstituteReport> {
    if videos.is_empty() {
        log::info!("No harvested videos; copying {} unchanged", src.display());
        copy_atomic(src, dest)?;
        return Ok(SubstituteReport::default());
    }

    let mut pkg = Package::open(src)?;
    let mut slides: Vec<String> = pkg.part_names().into_iter().filter(|p| is_slide_part(p)).collect();
    slides.sort_by(|a, b| natural_cmp(a, b));

    let mut report = SubstituteReport::default();
    let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
    let total = slides.len() as u64;

    for (i, slide) in slides.iter().enumerate() {
        sink.on_progress(i as u64 + 1, total, "Replacing videos");

        let rels_name = rels_path_for(slide);
        let Some(rels_bytes) = pkg.read_part(&rels_name)? else {
            continue;
        };
        let mut rels = RelationshipFile::parse_lenient(&rels_bytes, &rels_name);

        // Video edges of this slide that lead to a harvested video.
        let candidates: Vec<(String, String)> = rels
            .entries
            .iter()
            .filter(|r| r.is_video(slide))
            .filter_map(|r| {
                let name = match r.resolve(slide) {
                    Some(part) => media::basename(&part).to_string(),
                    None => media::basename(&r.target).to_string(),
                };
                videos.lookup(&name).found().map(|url| (r.id.clone(), url.to_string()))
            })
            .collect();
        if candidates.is_empty() {
            continue;
        }

        let Some(xml) = pkg.read_part(slide)? else {
            continue;
        };
        let outcome = rewrite_slide(&xml, &mut rels, &candidates)?;
        report.unmatched += outcome.unmatched;
        if outcome.replaced.is_empty() {
            continue;
        }
        report.replaced += outcome.replaced.len();

        // Drop the edges of replaced videos; their binaries go away later.
        rels.retain(|r| !(outcome.replaced.contains(&r.id) && r.is_video(slide)));
        log::debug!("Replaced {} video shapes on {}", outcome.replaced.len(), slide);
        rewritten.insert(slide.clone(), outcome.xml);
        rewritten.insert(rels_name, rels.to_xml()?);
    }

    if report.replaced > 0 {
        if let Some(bytes) = pkg.read_part(CONTENT_TYPES_PART)? {
            let mut types = ContentTypes::parse(&bytes)?;
            if types.ensure_default("png", "image/png") {
                rewritten.insert(CONTENT_TYPES_PART.to_string(), types.to_xml()?);
            }
        }
    }

    let mut writer = PackageWriter::create(dest)?;
    for part in pkg.part_names() {
        match rewritten.get(&part) {
            Some(bytes) => writer.write_part(&part, bytes)?,
            None => writer.copy_part(&mut pkg, &part)?,
        }
    }
    if report.replaced > 0 && !pkg.contains(PLACEHOLDER_PART) {
        writer.write_part(PLACEHOLDER_PART, &placeholder_png()?)?;
    }
    drop(pkg);
    writer.finish()?;

    if report.unmatched > 0 {
        log::warn!("{} video shapes had no harvested video and were left in place", report.unmatched);
    }
    log::info!("Replaced {} video shapes with placeholders", report.replaced);
    Ok(report)
}

fn is_slide_part(part: &str) -> bool {
    part.starts_with("ppt/slides/") && !part.contains("/_rels/") && part.ends_with(".xml")
}

struct SlideOutcome {
    xml: Vec<u8>,
    /// Relationship ids of the video edges behind replaced shapes.
    replaced: Vec<String>,
    unmatched: usize,
}

/// What a buffered `p:pic` element says about itself.
#[derive(Default)]
struct PicInfo {
    video_rids: Vec<String>,
    is_video: bool,
    id: Option<String>,
    name: Option<String>,
    off: Option<(String, String)>,
    ext: Option<(String, String)>,
}

impl PicInfo {
    fn scan(events: &[Event<'static>]) -> Self {
        let mut info = Self::default();
        let mut in_xfrm = false;
        for event in events {
            let e = match event {
                Event::Start(e) | Event::Empty(e) => e,
                Event::End(e) => {
                    if local_name(e.name().as_ref()) == b"xfrm" {
                        in_xfrm = false;
                    }
                    continue;
                }
                _ => continue,
            };
            let is_start = matches!(event, Event::Start(_));
            match local_name(e.name().as_ref()) {
                b"videoFile" => {
                    info.is_video = true;
                    info.video_rids.extend(prefixed_attr(e, b"link"));
                }
                b"media" => {
                    info.is_video = true;
                    info.video_rids.extend(prefixed_attr(e, b"embed"));
                }
                b"cNvPr" if info.id.is_none() => {
                    info.id = attr(e, b"id");
                    info.name = attr(e, b"name");
                }
                b"xfrm" if is_start && info.off.is_none() => in_xfrm = true,
                b"off" if in_xfrm => {
                    if let (Some(x), Some(y)) = (attr(e, b"x"), attr(e, b"y")) {
                        info.off = Some((x, y));
                    }
                }
                b"ext" if in_xfrm => {
                    if let (Some(cx), Some(cy)) = (attr(e, b"cx"), attr(e, b"cy")) {
                        info.ext = Some((cx, cy));
                    }
                }
                _ => {}
            }
        }
        info
    }

    /// The harvested URL this shape should link to: a video edge named by
    /// the shape, else the slide's first harvested video.
    fn target<'a>(&self, candidates: &'a [(String, String)]) -> Option<(&'a str, &'a str)> {
        if !self.is_video {
            return None;
        }
        self.video_rids
            .iter()
            .find_map(|rid| candidates.iter().find(|(id, _)| id == rid))
            .or_else(|| candidates.first())
            .map(|(id, url)| (id.as_str(), url.as_str()))
    }
}

fn rewrite_slide(xml: &[u8], rels: &mut RelationshipFile, candidates: &[(String, String)]) -> Result<SlideOutcome> {
    let text = as_text(xml, "slide")?;
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let w = |e: quick_xml::Error| xml_err("Error writing slide", e);

    let mut outcome = SlideOutcome {
        xml: Vec::new(),
        replaced: Vec::new(),
        unmatched: 0,
    };
    let mut placeholder_rid: Option<String> = None;
    let mut pic: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| xml_err("Error parsing slide", e))?;
        if matches!(event, Event::Eof) {
            break;
        }

        if depth == 0 {
            if let Event::Start(ref e) = event {
                if local_name(e.name().as_ref()) == b"pic" {
                    depth = 1;
                    pic.push(event.into_owned());
                    continue;
                }
            }
            writer.write_event(event).map_err(w)?;
            continue;
        }

        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        pic.push(event.into_owned());
        if depth > 0 {
            continue;
        }

        let info = PicInfo::scan(&pic);
        match info.target(candidates) {
            Some((video_rid, url)) => {
                let pns = match &pic[0] {
                    Event::Start(e) => prefix(e.name().as_ref()).map(|p| String::from_utf8_lossy(p).into_owned()),
                    _ => None,
                };
                let link_rid = rels.add(HYPERLINK_REL, url, true);
                let image_rid = placeholder_rid
                    .get_or_insert_with(|| rels.add(IMAGE_REL, PLACEHOLDER_TARGET, false))
                    .clone();
                let shape = placeholder_shape(pns.as_deref(), &info, &link_rid, &image_rid);
                writer.get_mut().extend_from_slice(shape.as_bytes());
                outcome.replaced.push(video_rid.to_string());
                // Every edge the shape named is now unused.
                outcome.replaced.extend(info.video_rids.iter().cloned());
            }
            None => {
                if info.is_video {
                    outcome.unmatched += 1;
                }
                for event in pic.drain(..) {
                    writer.write_event(event).map_err(w)?;
                }
            }
        }
        pic.clear();
    }

    if depth > 0 {
        return Err(Error::XmlError("slide ended inside a picture element".to_string()));
    }
    outcome.xml = writer.into_inner();
    Ok(outcome)
}

fn placeholder_shape(ns: Option<&str>, info: &PicInfo, link_rid: &str, image_rid: &str) -> String {
    let p = match ns {
        Some(ns) => format!("{}:", ns),
        None => String::new(),
    };
    let id = info.id.as_deref().unwrap_or("0");
    let name = escape(info.name.as_deref().unwrap_or("Video"));
    let xfrm = match (&info.off, &info.ext) {
        (Some((x, y)), Some((cx, cy))) => format!(
            r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
            x, y, cx, cy
        ),
        _ => String::new(),
    };
    format!(
        r#"<{p}pic><{p}nvPicPr><{p}cNvPr id="{id}" name="{name}"><a:hlinkClick r:id="{link}"/></{p}cNvPr><{p}cNvPicPr><a:picLocks noChangeAspect="1"/></{p}cNvPicPr><{p}nvPr/></{p}nvPicPr><{p}blipFill><a:blip r:embed="{image}"/><a:stretch><a:fillRect/></a:stretch></{p}blipFill><{p}spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></{p}spPr></{p}pic>"#,
        p = p,
        id = escape(id),
        name = name,
        link = link_rid,
        image = image_rid,
        xfrm = xfrm,
    )
}

/// A 200x150 grey frame with a white play triangle.
pub fn placeholder_png() -> Result<Vec<u8>> {
    let img: RgbImage = ImageBuffer::from_fn(200, 150, |x, y| {
        let (x, y) = (x as i32, y as i32);
        let inside = (80..=130).contains(&x) && (y - 75).abs() * 50 <= (130 - x) * 30;
        if inside {
            Rgb([255, 255, 255])
        } else {
            Rgb([96, 96, 96])
        }
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Error::ImageError(format!("Failed to draw placeholder: {}", e)))?;
    Ok(out.into_inner())
}
