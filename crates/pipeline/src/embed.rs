//! Swapping linked placeholder images for native videos.

use ppt_core::{Job, ProgressSink, Result};
use ppt_remote::{EditRequest, PageElement, PresentationEditor};
use regex::Regex;
use std::sync::OnceLock;

const VIDEO_HOST: &str = "drive.google.com";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    /// Presentations that received at least one video.
    pub presentations: usize,
    pub videos: usize,
}

fn file_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/file/d/([a-zA-Z0-9_-]+)").expect("valid regex"))
}

/// Id of the stored video an image links to, if it links to one.
pub fn linked_video_id(url: &str) -> Option<&str> {
    if !url.contains(VIDEO_HOST) {
        return None;
    }
    file_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Requests replacing every placeholder among `elements` with its video.
pub fn embed_requests(elements: &[PageElement]) -> Vec<EditRequest> {
    let mut requests = Vec::new();
    for element in elements {
        let Some(video_id) = element.link_url.as_deref().and_then(linked_video_id) else {
            continue;
        };
        requests.push(EditRequest::CreateVideo {
            page_id: element.page_id.clone(),
            video_id: video_id.to_string(),
            size: element.size.clone(),
            transform: element.transform.clone(),
        });
        requests.push(EditRequest::DeleteObject {
            object_id: element.object_id.clone(),
        });
    }
    requests
}

/// Embed videos into every published presentation of `jobs`.
///
/// Presentations without placeholder links are left untouched, so running
/// this again after a successful pass changes nothing.
pub fn embed_videos(editor: &dyn PresentationEditor, jobs: &[Job], sink: &dyn ProgressSink) -> Result<EmbedReport> {
    let mut report = EmbedReport::default();
    let published: Vec<&Job> = jobs.iter().filter(|j| j.result.presentation_id.is_some()).collect();
    let total = published.len() as u64;

    for (idx, job) in published.into_iter().enumerate() {
        let Some(id) = job.result.presentation_id.as_deref() else {
            continue;
        };
        sink.on_progress(idx as u64, total, &job.filename);

        let requests = embed_requests(&editor.page_elements(id)?);
        if requests.is_empty() {
            log::debug!("{}: no video placeholders", job.filename);
            continue;
        }
        let count = requests.len() / 2;
        editor.batch_update(id, &requests)?;
        log::info!("{}: embedded {} video(s)", job.filename, count);
        report.presentations += 1;
        report.videos += count;
    }
    sink.on_progress(total, total, "embed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(id: &str, link: Option<&str>) -> PageElement {
        PageElement {
            object_id: id.into(),
            page_id: "p1".into(),
            link_url: link.map(String::from),
            size: Some(json!({"width": {"magnitude": 100, "unit": "EMU"}})),
            transform: None,
        }
    }

    #[test]
    fn test_linked_video_id() {
        assert_eq!(
            linked_video_id("https://drive.google.com/file/d/1a_B-9/view?usp=drivesdk"),
            Some("1a_B-9")
        );
        assert_eq!(linked_video_id("https://example.com/file/d/abc/view"), None);
        assert_eq!(linked_video_id("https://drive.google.com/drive/folders/x"), None);
    }

    #[test]
    fn test_requests_create_before_delete() {
        let elements = vec![
            element("img1", Some("https://drive.google.com/file/d/vid1/view")),
            element("shape", None),
            element("img2", Some("https://example.com")),
        ];
        let requests = embed_requests(&elements);
        assert_eq!(requests.len(), 2);
        match &requests[0] {
            EditRequest::CreateVideo { page_id, video_id, size, .. } => {
                assert_eq!(page_id, "p1");
                assert_eq!(video_id, "vid1");
                assert!(size.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            requests[1],
            EditRequest::DeleteObject {
                object_id: "img1".into()
            }
        );
    }
}
