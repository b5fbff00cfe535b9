//! Synthetic decks for tests.
//!
//! Builds a small but structurally complete package: slide master, layout,
//! theme, document properties, one picture per slide, and optionally
//! embedded videos, a large photo and an unreferenced part.

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use ppt_core::Result;
use std::io::Cursor;
use std::path::Path;

use crate::container::PackageWriter;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const P14_NS: &str = r#"xmlns:p14="http://schemas.microsoft.com/office/powerpoint/2010/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Location of the large photo added by [`DeckBuilder::with_large_photo`].
pub const LARGE_PHOTO: &str = "ppt/media/photo1.jpeg";
/// Location of the part added by [`DeckBuilder::with_orphan_image`].
pub const ORPHAN_IMAGE: &str = "ppt/media/orphan.png";

#[derive(Debug, Clone)]
pub struct DeckBuilder {
    slides: usize,
    /// `(slide number, media file name)`.
    videos: Vec<(usize, String)>,
    large_photo: bool,
    orphan: bool,
    main_document_edge: bool,
}

impl DeckBuilder {
    pub fn new(slides: usize) -> Self {
        Self {
            slides,
            videos: Vec::new(),
            large_photo: false,
            orphan: false,
            main_document_edge: true,
        }
    }

    /// Embed a video named `media<N>.mp4` on `slide` (1-based).
    pub fn with_video_on(self, slide: usize) -> Self {
        let name = format!("media{}.mp4", self.videos.len() + 1);
        self.with_named_video(slide, &name)
    }

    pub fn with_named_video(mut self, slide: usize, name: &str) -> Self {
        self.videos.push((slide, name.to_string()));
        self
    }

    /// Add a photo on slide 1 well above the recompression threshold.
    pub fn with_large_photo(mut self) -> Self {
        self.large_photo = true;
        self
    }

    /// Add an image nothing refers to.
    pub fn with_orphan_image(mut self) -> Self {
        self.orphan = true;
        self
    }

    /// Leave the officeDocument edge out of the root manifest.
    pub fn without_main_document_edge(mut self) -> Self {
        self.main_document_edge = false;
        self
    }

    pub fn write(&self, dest: &Path) -> Result<()> {
        let mut w = PackageWriter::create(dest)?;

        w.write_part("[Content_Types].xml", self.content_types().as_bytes())?;
        w.write_part("_rels/.rels", self.root_rels().as_bytes())?;
        w.write_part("docProps/core.xml", CORE_PROPS.as_bytes())?;
        w.write_part("docProps/app.xml", APP_PROPS.as_bytes())?;

        w.write_part("ppt/presentation.xml", presentation_xml(self.slides).as_bytes())?;
        w.write_part("ppt/_rels/presentation.xml.rels", self.presentation_rels().as_bytes())?;

        w.write_part("ppt/slideMasters/slideMaster1.xml", master_xml().as_bytes())?;
        w.write_part(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "theme", "../theme/theme1.xml"),
            ])
            .as_bytes(),
        )?;
        w.write_part("ppt/slideLayouts/slideLayout1.xml", layout_xml().as_bytes())?;
        w.write_part(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
        )?;
        w.write_part("ppt/theme/theme1.xml", THEME.as_bytes())?;

        for n in 1..=self.slides {
            // (global video index, file name) for videos on this slide.
            let videos: Vec<(usize, &str)> = self
                .videos
                .iter()
                .enumerate()
                .filter(|(_, (slide, _))| *slide == n)
                .map(|(i, (_, name))| (i, name.as_str()))
                .collect();
            let photo = self.large_photo && n == 1;
            w.write_part(&format!("ppt/slides/slide{}.xml", n), slide_xml(n, &videos, photo).as_bytes())?;
            w.write_part(
                &format!("ppt/slides/_rels/slide{}.xml.rels", n),
                slide_rels(n, &videos, photo).as_bytes(),
            )?;
            w.write_part(&format!("ppt/media/image{}.png", n), &png_bytes(8 + n as u32, 6)?)?;
        }

        for (i, (_, name)) in self.videos.iter().enumerate() {
            w.write_part(&format!("ppt/media/{}", name), &video_bytes(name))?;
            w.write_part(&format!("ppt/media/poster{}.png", i + 1), &png_bytes(16, 9)?)?;
        }
        if self.large_photo {
            w.write_part(LARGE_PHOTO, &noise_jpeg(1600, 1000)?)?;
        }
        if self.orphan {
            w.write_part(ORPHAN_IMAGE, &png_bytes(4, 4)?)?;
        }

        w.finish()?;
        Ok(())
    }

    fn root_rels(&self) -> String {
        let mut entries = Vec::new();
        if self.main_document_edge {
            entries.push(format!(
                r#"<Relationship Id="rId1" Type="{}/officeDocument" Target="ppt/presentation.xml"/>"#,
                R
            ));
        }
        entries.push(r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#.to_string());
        entries.push(format!(
            r#"<Relationship Id="rId3" Type="{}/extended-properties" Target="docProps/app.xml"/>"#,
            R
        ));
        format!(r#"{}<Relationships xmlns="{}">{}</Relationships>"#, XML_DECL, REL_NS, entries.concat())
    }

    fn presentation_rels(&self) -> String {
        let mut entries: Vec<(String, &str, String)> =
            vec![("rId1".into(), "slideMaster", "slideMasters/slideMaster1.xml".into())];
        for n in 1..=self.slides {
            entries.push((format!("rId{}", n + 1), "slide", format!("slides/slide{}.xml", n)));
        }
        entries.push((format!("rId{}", self.slides + 2), "theme", "theme/theme1.xml".into()));
        let borrowed: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(id, kind, target)| (id.as_str(), *kind, target.as_str()))
            .collect();
        rels(&borrowed)
    }

    fn content_types(&self) -> String {
        let mut overrides = vec![
            ("/ppt/presentation.xml", "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml".to_string()),
            ("/ppt/slideMasters/slideMaster1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml".to_string()),
            ("/ppt/slideLayouts/slideLayout1.xml", "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml".to_string()),
            ("/ppt/theme/theme1.xml", "application/vnd.openxmlformats-officedocument.theme+xml".to_string()),
            ("/docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml".to_string()),
            ("/docProps/app.xml", "application/vnd.openxmlformats-officedocument.extended-properties+xml".to_string()),
        ]
        .into_iter()
        .map(|(p, ct)| (p.to_string(), ct))
        .collect::<Vec<_>>();
        for n in 1..=self.slides {
            overrides.push((
                format!("/ppt/slides/slide{}.xml", n),
                "application/vnd.openxmlformats-officedocument.presentationml.slide+xml".to_string(),
            ));
        }

        let defaults = [
            ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
            ("xml", "application/xml"),
            ("png", "image/png"),
            ("jpeg", "image/jpeg"),
            ("mp4", "video/mp4"),
        ];
        let mut body = String::new();
        for (ext, ct) in defaults {
            body.push_str(&format!(r#"<Default Extension="{}" ContentType="{}"/>"#, ext, ct));
        }
        for (part, ct) in overrides {
            body.push_str(&format!(r#"<Override PartName="{}" ContentType="{}"/>"#, part, ct));
        }
        format!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">{}</Types>"#,
            XML_DECL, body
        )
    }
}

/// Main document listing `slides` slides as `rId2..`, ids from 256.
pub fn presentation_xml(slides: usize) -> String {
    let ids: String = (0..slides)
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 2))
        .collect();
    format!(
        r#"{}<p:presentation {}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{}</p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        XML_DECL, NS, ids
    )
}

/// Relationship ids of the `j`-th video on a slide: (link, media, poster).
pub fn video_rel_ids(j: usize) -> (String, String, String) {
    (
        format!("rId{}", 3 + 3 * j),
        format!("rId{}", 4 + 3 * j),
        format!("rId{}", 5 + 3 * j),
    )
}

fn slide_xml(n: usize, videos: &[(usize, &str)], photo: bool) -> String {
    let mut shapes = format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US"/><a:t>Slide {n}</a:t></a:r></a:p></p:txBody></p:sp><p:pic><p:nvPicPr><p:cNvPr id="3" name="Picture 2"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="914400" cy="685800"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
    );
    for (j, (_, name)) in videos.iter().enumerate() {
        let (link, media, poster) = video_rel_ids(j);
        shapes.push_str(&format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="{name}"><a:hlinkClick r:id="" action="ppaction://media"/></p:cNvPr><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr><a:videoFile r:link="{link}"/><p:extLst><p:ext uri="{{DAA4B4D4-6D71-4841-9C94-3DA5C3A2A1C7}}"><p14:media {p14} r:embed="{media}"/></p:ext></p:extLst></p:nvPr></p:nvPicPr><p:blipFill><a:blip r:embed="{poster}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="1524000" y="{y}"/><a:ext cx="6096000" cy="3429000"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
            id = 4 + j,
            name = name,
            link = link,
            media = media,
            poster = poster,
            p14 = P14_NS,
            y = 1397000 + j * 100,
        ));
    }
    if photo {
        shapes.push_str(&format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{}" name="Photo"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{}"/></p:blipFill><p:spPr/></p:pic>"#,
            4 + videos.len(),
            photo_rel_id(videos.len())
        ));
    }
    format!(
        r#"{}<p:sld {}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
        XML_DECL, NS, shapes
    )
}

fn photo_rel_id(video_count: usize) -> String {
    format!("rId{}", 3 + 3 * video_count)
}

fn slide_rels(n: usize, videos: &[(usize, &str)], photo: bool) -> String {
    let mut entries = vec![
        format!(
            r#"<Relationship Id="rId1" Type="{}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#,
            R
        ),
        format!(r#"<Relationship Id="rId2" Type="{}/image" Target="../media/image{}.png"/>"#, R, n),
    ];
    for (j, (global, name)) in videos.iter().enumerate() {
        let (link, media, poster) = video_rel_ids(j);
        entries.push(format!(
            r#"<Relationship Id="{}" Type="{}/video" Target="../media/{}"/>"#,
            link, R, name
        ));
        entries.push(format!(
            r#"<Relationship Id="{}" Type="http://schemas.microsoft.com/office/2007/relationships/media" Target="../media/{}"/>"#,
            media, name
        ));
        entries.push(format!(
            r#"<Relationship Id="{}" Type="{}/image" Target="../media/poster{}.png"/>"#,
            poster,
            R,
            global + 1
        ));
    }
    if photo {
        entries.push(format!(
            r#"<Relationship Id="{}" Type="{}/image" Target="../media/photo1.jpeg"/>"#,
            photo_rel_id(videos.len()),
            R
        ));
    }
    format!(r#"{}<Relationships xmlns="{}">{}</Relationships>"#, XML_DECL, REL_NS, entries.concat())
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(r#"<Relationship Id="{}" Type="{}/{}" Target="{}"/>"#, id, R, kind, target)
        })
        .collect();
    format!(r#"{}<Relationships xmlns="{}">{}</Relationships>"#, XML_DECL, REL_NS, body)
}

fn master_xml() -> String {
    format!(
        r#"{}<p:sldMaster {}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#,
        XML_DECL, NS
    )
}

fn layout_xml() -> String {
    format!(
        r#"{}<p:sldLayout {}><p:cSld name="Title"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld></p:sldLayout>"#,
        XML_DECL, NS
    )
}

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements/></a:theme>"#;
const CORE_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Fixture</dc:title></cp:coreProperties>"#;
const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>Microsoft Office PowerPoint</Application></Properties>"#;

/// Bytes standing in for a video binary.
pub fn video_bytes(name: &str) -> Vec<u8> {
    name.as_bytes().repeat(2048)
}

/// A flat-colored PNG.
pub fn png_bytes(width: u32, height: u32) -> Result<Vec<u8>> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([40, 90, 160]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ppt_core::Error::ImageError(e.to_string()))?;
    Ok(out.into_inner())
}

/// A noisy JPEG that does not compress well.
pub fn noise_jpeg(width: u32, height: u32) -> Result<Vec<u8>> {
    let mut state: u32 = 0x2545_f491;
    let img: RgbImage = ImageBuffer::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95);
    img.write_with_encoder(encoder)
        .map_err(|e| ppt_core::Error::ImageError(e.to_string()))?;
    Ok(out.into_inner())
}
