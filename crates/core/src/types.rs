//! Domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One requested slide range and its publishing metadata.
///
/// A job is created by the caller and mutated in place as it moves through
/// the pipeline; the `result` half records what has happened to it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Stable identifier, used for ledger deduplication.
    pub id: String,

    /// Output name without prefix (".pptx" is appended when missing).
    pub filename: String,

    /// First slide, 1-based, inclusive.
    pub start: usize,

    /// Last slide, 1-based, inclusive.
    pub end: usize,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub subcategory: String,

    #[serde(default)]
    pub client: String,

    #[serde(default)]
    pub keywords: String,

    /// Mutable outcome, flattened so persisted jobs stay one flat object.
    #[serde(flatten)]
    pub result: JobResult,
}

impl Job {
    /// Create a job for the given range with empty metadata.
    pub fn new(id: impl Into<String>, filename: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            start,
            end,
            category: String::new(),
            subcategory: String::new(),
            client: String::new(),
            keywords: String::new(),
            result: JobResult::default(),
        }
    }

    /// Number of slides covered by this job.
    pub fn slide_count(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    /// Remote display name for this job's sub-package.
    pub fn display_name(&self, prefix: &str) -> String {
        let name = display_name(prefix, &self.filename);
        if name.to_lowercase().ends_with(".pptx") {
            name
        } else {
            format!("{}.pptx", name)
        }
    }

    /// Whether the job has been published.
    pub fn is_published(&self) -> bool {
        self.result.final_link.is_some()
    }

    /// Carry the durable outcome of an earlier run over to this job.
    ///
    /// Only remote facts (link, remote id, ledger flag) are kept; the size
    /// gate is re-evaluated on every split.
    pub fn adopt_outcome(&mut self, previous: &Job) {
        if self.result.final_link.is_none() {
            self.result.final_link = previous.result.final_link.clone();
            self.result.presentation_id = previous.result.presentation_id.clone();
        }
        self.result.logged_to_sheet |= previous.result.logged_to_sheet;
    }
}

/// Outcome fields written by the split, embed and log stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_id: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error_too_large: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub logged_to_sheet: bool,
}

/// Build the remote display name `[prefix]_name`, or `name` without a prefix.
pub fn display_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("[{}]_{}", prefix, name)
    }
}

/// Explicit result of a keyed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

/// Mapping from embedded video file name to its remote URL.
///
/// Entries are append-only: once a name is resolved it is never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoMap {
    entries: BTreeMap<String, String>,
}

impl VideoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the URL for an original video name.
    pub fn lookup(&self, name: &str) -> Lookup<&str> {
        self.entries.get(name).map(String::as_str).into()
    }

    /// Record a URL for `name`. Returns `false` (and keeps the existing
    /// entry) if the name was already resolved.
    pub fn record(&mut self, name: impl Into<String>, url: impl Into<String>) -> bool {
        match self.entries.entry(name.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(url.into());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
