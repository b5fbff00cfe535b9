//! Google Drive, Slides and Sheets over their REST APIs.
//!
//! Authentication is a bearer access token supplied by the caller; acquiring
//! and refreshing it happens elsewhere.

use ppt_core::{Error, Lookup, PipelineConfig, ProgressSink, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use crate::service::{
    EditRequest, Ledger, ObjectStore, PageElement, PresentationConverter, PresentationEditor, RemoteFile, PPTX_MIME,
};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const SLIDES_API: &str = "https://slides.googleapis.com/v1/presentations";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const GOOGLE_SLIDES_MIME: &str = "application/vnd.google-apps.presentation";

/// Consecutive failed chunks tolerated before an upload is abandoned.
const MAX_CHUNK_ATTEMPTS: u32 = 5;
/// Resumable chunks must be a multiple of this.
const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Configuration for [`GoogleClient`].
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub access_token: String,
    pub chunk_size: u64,
    pub spreadsheet_id: String,
    pub sheet: String,
    pub timeout_secs: u64,
    /// Base delay before retrying a failed chunk; doubled per failure.
    pub retry_backoff_ms: u64,
}

impl GoogleConfig {
    pub fn new(access_token: impl Into<String>, pipeline: &PipelineConfig) -> Self {
        Self {
            access_token: access_token.into(),
            chunk_size: pipeline.upload_chunk_bytes,
            spreadsheet_id: pipeline.ledger_spreadsheet_id.clone(),
            sheet: pipeline.ledger_sheet.clone(),
            timeout_secs: 300,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

impl DriveFile {
    fn into_remote(self) -> RemoteFile {
        let url = self
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id));
        RemoteFile { id: self.id, url }
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<Permission>,
}

#[derive(Deserialize)]
struct Permission {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Where a resumable upload stands after a request.
enum ChunkOutcome {
    /// The server holds this many bytes.
    Incomplete(u64),
    Done(DriveFile),
}

/// Client for every Google service the pipeline uses.
pub struct GoogleClient {
    config: GoogleConfig,
    client: Client,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        if config.access_token.trim().is_empty() {
            return Err(Error::AuthError("no access token supplied".to_string()));
        }
        if config.chunk_size == 0 || config.chunk_size % CHUNK_GRANULARITY != 0 {
            return Err(Error::remote(
                "drive",
                format!("chunk size {} is not a multiple of 256 KiB", config.chunk_size),
            ));
        }

        // Drive answers partial uploads with 308 and no Location.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::remote("http", format!("Failed to create HTTP client: {}", e)))?;

        log::info!("Google client initialized (chunk size {} KiB)", config.chunk_size / 1024);
        Ok(Self { config, client })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.config.access_token)
    }

    fn send(&self, service: &str, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authed(builder)
            .send()
            .map_err(|e| Error::remote(service, e.to_string()))?;
        check_status(service, response)
    }

    fn send_json<T: for<'de> Deserialize<'de>>(&self, service: &str, builder: RequestBuilder) -> Result<T> {
        self.send(service, builder)?
            .json()
            .map_err(|e| Error::remote(service, format!("unexpected response: {}", e)))
    }

    /// E-mail address of the account the token belongs to.
    pub fn account_email(&self) -> Result<String> {
        let about: Value = self.send_json(
            "drive",
            self.client
                .get(format!("{}/about", DRIVE_API))
                .query(&[("fields", "user(emailAddress)")]),
        )?;
        about["user"]["emailAddress"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::remote("drive", "account has no e-mail address"))
    }

    /// Open a resumable upload session and return its URL.
    fn start_session(&self, metadata: &Value, mime: &str, total: u64) -> Result<String> {
        let response = self.send(
            "drive",
            self.client
                .post(DRIVE_UPLOAD_API)
                .query(&[("uploadType", "resumable"), ("fields", "id,webViewLink")])
                .header("X-Upload-Content-Type", mime)
                .header("X-Upload-Content-Length", total.to_string())
                .json(metadata),
        )?;
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::remote("drive", "resumable session has no location"))
    }

    fn chunk_outcome(&self, response: Response) -> Result<ChunkOutcome> {
        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let held = response
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range_end)
                .map(|end| end + 1)
                .unwrap_or(0);
            return Ok(ChunkOutcome::Incomplete(held));
        }
        let response = check_status("drive", response)?;
        let file: DriveFile = response
            .json()
            .map_err(|e| Error::remote("drive", format!("unexpected upload response: {}", e)))?;
        Ok(ChunkOutcome::Done(file))
    }

    /// Ask the session how many bytes it already holds.
    fn query_offset(&self, session: &str, total: u64) -> Result<ChunkOutcome> {
        let response = self
            .authed(self.client.put(session))
            .header(CONTENT_RANGE, format!("bytes */{}", total))
            .body(Vec::new())
            .send()
            .map_err(|e| Error::remote("drive", e.to_string()))?;
        self.chunk_outcome(response)
    }

    /// Send `source` through `session` chunk by chunk, resuming from the
    /// server's offset after a failed chunk.
    ///
    /// A chunk that errors, or that the server acknowledges without holding
    /// more bytes than before, counts as a failure; `MAX_CHUNK_ATTEMPTS`
    /// consecutive failures abandon the upload.
    fn upload_chunks(&self, session: &str, source: &Path, total: u64, label: &str, sink: &dyn ProgressSink) -> Result<DriveFile> {
        let mut file = File::open(source)?;
        let mut offset = 0u64;
        let mut failures = 0u32;

        loop {
            if offset > total {
                return Err(Error::remote(
                    "drive",
                    format!("session claims {} bytes of the {}-byte '{}'", offset, total, label),
                ));
            }
            let len = self.config.chunk_size.min(total - offset);
            file.seek(SeekFrom::Start(offset))?;
            let mut chunk = vec![0u8; len as usize];
            file.read_exact(&mut chunk)?;

            let range = if len == 0 {
                format!("bytes */{}", total)
            } else {
                format!("bytes {}-{}/{}", offset, offset + len - 1, total)
            };
            let sent = self
                .authed(self.client.put(session))
                .header(CONTENT_RANGE, range)
                .body(chunk)
                .send()
                .map_err(|e| Error::remote("drive", e.to_string()))
                .and_then(|r| self.chunk_outcome(r));

            let failure = match sent {
                Ok(ChunkOutcome::Done(done)) => {
                    sink.on_progress(total, total, label);
                    return Ok(done);
                }
                Ok(ChunkOutcome::Incomplete(held)) if held > offset => {
                    offset = held;
                    failures = 0;
                    sink.on_progress(offset.min(total), total, label);
                    continue;
                }
                Ok(ChunkOutcome::Incomplete(held)) => {
                    let err = Error::remote("drive", format!("no progress past byte {} (server holds {})", offset, held));
                    offset = held;
                    err
                }
                Err(e @ Error::AuthError(_)) => return Err(e),
                Err(e) => e,
            };

            failures += 1;
            if failures >= MAX_CHUNK_ATTEMPTS {
                return Err(failure);
            }
            log::warn!("Chunk at {} of '{}' failed ({}), resuming", offset, label, failure);
            std::thread::sleep(Duration::from_millis(self.config.retry_backoff_ms << failures));
            match self.query_offset(session, total) {
                Ok(ChunkOutcome::Done(done)) => {
                    sink.on_progress(total, total, label);
                    return Ok(done);
                }
                Ok(ChunkOutcome::Incomplete(held)) => offset = held,
                Err(e @ Error::AuthError(_)) => return Err(e),
                Err(e) => log::warn!("Could not query the upload offset of '{}': {}", label, e),
            }
        }
    }

    fn resumable_upload(&self, source: &Path, metadata: Value, mime: &str, label: &str, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        let total = std::fs::metadata(source)?.len();
        log::info!("Uploading '{}' ({:.1} MB)", label, total as f64 / (1024.0 * 1024.0));
        let session = self.start_session(&metadata, mime, total)?;
        let file = self.upload_chunks(&session, source, total, label, sink)?;
        Ok(file.into_remote())
    }

    fn ledger_range(&self, columns: &str) -> Result<String> {
        if self.config.spreadsheet_id.is_empty() {
            return Err(Error::remote("sheets", "no ledger spreadsheet configured"));
        }
        Ok(format!("{}!{}", self.config.sheet, columns))
    }

    /// Turn a permission failure on the ledger into one naming the account.
    fn ledger_auth(&self, err: Error) -> Error {
        match err {
            Error::AuthError(_) => {
                let email = self.account_email().unwrap_or_else(|_| "the current account".to_string());
                Error::AuthError(format!(
                    "{} needs edit access to spreadsheet {}",
                    email, self.config.spreadsheet_id
                ))
            }
            other => other,
        }
    }
}

impl ObjectStore for GoogleClient {
    fn find_by_name(&self, name: &str) -> Result<Lookup<RemoteFile>> {
        let query = format!("name = '{}' and trashed = false", escape_query(name));
        let list: FileList = self.send_json(
            "drive",
            self.client.get(format!("{}/files", DRIVE_API)).query(&[
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "files(id,name,webViewLink)"),
            ]),
        )?;
        Ok(list.files.into_iter().next().map(DriveFile::into_remote).into())
    }

    fn upload(&self, source: &Path, name: &str, mime: &str, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        self.resumable_upload(source, json!({ "name": name }), mime, name, sink)
    }

    fn set_public_readable(&self, id: &str) -> Result<()> {
        let url = format!("{}/files/{}/permissions", DRIVE_API, id);
        let existing: PermissionList = self.send_json(
            "drive",
            self.client.get(&url).query(&[("fields", "permissions(type,role)")]),
        )?;
        if existing.permissions.iter().any(|p| p.kind == "anyone") {
            log::debug!("File {} is already public", id);
            return Ok(());
        }
        self.send(
            "drive",
            self.client.post(&url).json(&json!({ "type": "anyone", "role": "reader" })),
        )?;
        log::debug!("Made file {} public", id);
        Ok(())
    }
}

impl PresentationConverter for GoogleClient {
    fn upload_and_convert(&self, source: &Path, name: &str, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        let metadata = json!({ "name": name, "mimeType": GOOGLE_SLIDES_MIME });
        self.resumable_upload(source, metadata, PPTX_MIME, name, sink)
    }
}

impl PresentationEditor for GoogleClient {
    fn page_elements(&self, presentation_id: &str) -> Result<Vec<PageElement>> {
        let presentation: Value = self.send_json(
            "slides",
            self.client
                .get(format!("{}/{}", SLIDES_API, presentation_id))
                .query(&[("fields", "slides(objectId,pageElements(objectId,size,transform,image))")]),
        )?;
        Ok(parse_page_elements(&presentation))
    }

    fn batch_update(&self, presentation_id: &str, requests: &[EditRequest]) -> Result<()> {
        let body = json!({ "requests": requests.iter().map(edit_request_json).collect::<Vec<_>>() });
        self.send(
            "slides",
            self.client
                .post(format!("{}/{}:batchUpdate", SLIDES_API, presentation_id))
                .json(&body),
        )?;
        Ok(())
    }
}

impl Ledger for GoogleClient {
    fn existing_ids(&self) -> Result<HashSet<String>> {
        let range = self.ledger_range("A:A")?;
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.config.spreadsheet_id,
            urlencoding::encode(&range)
        );
        let values: ValueRange = self
            .send_json("sheets", self.client.get(url))
            .map_err(|e| self.ledger_auth(e))?;
        Ok(values
            .values
            .iter()
            .filter_map(|row| row.first())
            .map(|cell| match cell {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect())
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        let range = self.ledger_range("A:J")?;
        let url = format!(
            "{}/{}/values/{}:append",
            SHEETS_API,
            self.config.spreadsheet_id,
            urlencoding::encode(&range)
        );
        self.send(
            "sheets",
            self.client
                .post(url)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&json!({ "values": rows })),
        )
        .map_err(|e| self.ledger_auth(e))?;
        log::info!("Appended {} rows to the ledger", rows.len());
        Ok(())
    }
}

fn check_status(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(Error::AuthError(format!("{} rejected the request ({}): {}", service, status, body)))
    } else {
        Err(Error::remote(service, format!("{}: {}", status, body)))
    }
}

/// Quote a value for a Drive `q` expression.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Last byte index from a `Range: bytes=0-N` header.
fn parse_range_end(header: &str) -> Option<u64> {
    header.strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}

fn parse_page_elements(presentation: &Value) -> Vec<PageElement> {
    let mut elements = Vec::new();
    for slide in presentation["slides"].as_array().into_iter().flatten() {
        let Some(page_id) = slide["objectId"].as_str() else {
            continue;
        };
        for element in slide["pageElements"].as_array().into_iter().flatten() {
            let Some(object_id) = element["objectId"].as_str() else {
                continue;
            };
            elements.push(PageElement {
                object_id: object_id.to_string(),
                page_id: page_id.to_string(),
                link_url: element["image"]["imageProperties"]["link"]["url"]
                    .as_str()
                    .map(str::to_string),
                size: element.get("size").cloned(),
                transform: element.get("transform").cloned(),
            });
        }
    }
    elements
}

fn edit_request_json(request: &EditRequest) -> Value {
    match request {
        EditRequest::DeleteObject { object_id } => json!({ "deleteObject": { "objectId": object_id } }),
        EditRequest::CreateVideo {
            page_id,
            video_id,
            size,
            transform,
        } => json!({
            "createVideo": {
                "source": "DRIVE",
                "id": video_id,
                "elementProperties": {
                    "pageObjectId": page_id,
                    "size": size,
                    "transform": transform,
                }
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppt_core::NullSink;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("[A]_it's.pptx"), "[A]_it\\'s.pptx");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_parse_range_end() {
        assert_eq!(parse_range_end("bytes=0-5242879"), Some(5242879));
        assert_eq!(parse_range_end("bytes=0-"), None);
        assert_eq!(parse_range_end("items=0-3"), None);
    }

    #[test]
    fn test_parse_page_elements() {
        let presentation = json!({
            "slides": [{
                "objectId": "p1",
                "pageElements": [
                    {
                        "objectId": "img1",
                        "size": { "width": { "magnitude": 100, "unit": "EMU" } },
                        "transform": { "scaleX": 1 },
                        "image": { "imageProperties": { "link": { "url": "https://drive.google.com/file/d/abc/view" } } }
                    },
                    { "objectId": "shape1", "shape": {} }
                ]
            }]
        });
        let elements = parse_page_elements(&presentation);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].page_id, "p1");
        assert_eq!(elements[0].link_url.as_deref(), Some("https://drive.google.com/file/d/abc/view"));
        assert!(elements[0].size.is_some());
        assert_eq!(elements[1].link_url, None);
        assert_eq!(elements[1].transform, None);
    }

    #[test]
    fn test_create_video_request_shape() {
        let request = EditRequest::CreateVideo {
            page_id: "p1".into(),
            video_id: "abc".into(),
            size: Some(json!({ "height": 1 })),
            transform: None,
        };
        let value = edit_request_json(&request);
        assert_eq!(value["createVideo"]["source"], "DRIVE");
        assert_eq!(value["createVideo"]["id"], "abc");
        assert_eq!(value["createVideo"]["elementProperties"]["pageObjectId"], "p1");
    }

    #[test]
    fn test_client_requires_token() {
        let config = GoogleConfig::new("", &PipelineConfig::default());
        assert!(matches!(GoogleClient::new(config), Err(Error::AuthError(_))));
    }

    #[test]
    fn test_client_rejects_unaligned_chunks() {
        let mut config = GoogleConfig::new("token", &PipelineConfig::default());
        config.chunk_size = 1000;
        assert!(GoogleClient::new(config).is_err());
    }

    /// Serve every request on a local port with `respond(content_range)`,
    /// counting requests.
    fn stub_session<F>(respond: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/upload/session", listener.local_addr().unwrap());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut content_range = String::new();
                let mut length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        length = v.trim().parse().unwrap_or(0);
                    }
                    if lower.starts_with("content-range:") {
                        content_range = line["content-range:".len()..].trim().to_string();
                    }
                }
                let mut body = vec![0u8; length];
                let _ = reader.read_exact(&mut body);
                seen.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(respond(&content_range).as_bytes());
            }
        });
        (url, count)
    }

    fn incomplete(range: Option<String>) -> String {
        let range = range.map(|r| format!("Range: {}\r\n", r)).unwrap_or_default();
        format!("HTTP/1.1 308 Resume Incomplete\r\n{}Content-Length: 0\r\nConnection: close\r\n\r\n", range)
    }

    fn test_client() -> GoogleClient {
        let mut config = GoogleConfig::new("token", &PipelineConfig::default());
        config.chunk_size = CHUNK_GRANULARITY;
        config.timeout_secs = 5;
        config.retry_backoff_ms = 1;
        GoogleClient::new(config).unwrap()
    }

    fn source_file(dir: &tempfile::TempDir, len: usize) -> std::path::PathBuf {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![1u8; len]).unwrap();
        path
    }

    #[test]
    fn test_stalled_session_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let total = 2 * CHUNK_GRANULARITY;
        let path = source_file(&dir, total as usize);
        let (session, count) = stub_session(|_| incomplete(None));

        let result = test_client().upload_chunks(&session, &path, total, "clip", &NullSink);
        assert!(result.is_err());
        // One chunk plus one offset query per failure, at most.
        assert!(count.load(Ordering::SeqCst) <= 2 * MAX_CHUNK_ATTEMPTS as usize);
    }

    #[test]
    fn test_offset_beyond_total_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let total = CHUNK_GRANULARITY;
        let path = source_file(&dir, total as usize);
        let (session, count) = stub_session(|_| incomplete(Some("bytes=0-99999999".to_string())));

        let result = test_client().upload_chunks(&session, &path, total, "clip", &NullSink);
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chunks_advance_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let total = 2 * CHUNK_GRANULARITY;
        let path = source_file(&dir, total as usize);
        let (session, count) = stub_session(move |content_range| {
            let end: u64 = content_range
                .split(['-', '/'])
                .nth(1)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if end + 1 < total {
                incomplete(Some(format!("bytes=0-{}", end)))
            } else {
                let body = r#"{"id":"f1","webViewLink":"https://drive.google.com/file/d/f1/view"}"#;
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
            }
        });

        let file = test_client()
            .upload_chunks(&session, &path, total, "clip", &NullSink)
            .unwrap();
        assert_eq!(file.id, "f1");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
