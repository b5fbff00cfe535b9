//! Pipeline stages and the persisted checkpoint record.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Completion markers of the six-stage pipeline, in execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    #[default]
    None,
    VideosDone,
    ReplaceDone,
    ShrinkDone,
    SplitDone,
    EmbedDone,
    LoggedDone,
}

impl Stage {
    /// All stages in order, `None` first.
    pub const ALL: [Stage; 7] = [
        Stage::None,
        Stage::VideosDone,
        Stage::ReplaceDone,
        Stage::ShrinkDone,
        Stage::SplitDone,
        Stage::EmbedDone,
        Stage::LoggedDone,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The stage that precedes this one, if any.
    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Human-readable name of the work that produces this marker.
    pub fn label(self) -> &'static str {
        match self {
            Stage::None => "start",
            Stage::VideosDone => "harvest videos",
            Stage::ReplaceDone => "substitute placeholders",
            Stage::ShrinkDone => "shrink images",
            Stage::SplitDone => "split and upload",
            Stage::EmbedDone => "embed videos",
            Stage::LoggedDone => "record ledger",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Durable progress for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,

    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,

    /// RFC 3339 time of the last transition.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Checkpoint {
    /// A checkpoint recording `stage` as durably complete now.
    pub fn reached(stage: Stage, fingerprint: Fingerprint) -> Self {
        Self {
            stage,
            fingerprint: Some(fingerprint),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// The last completed stage, if this checkpoint belongs to `fingerprint`.
    pub fn completed_for(&self, fingerprint: &Fingerprint) -> Stage {
        match &self.fingerprint {
            Some(fp) if fp == fingerprint => self.stage,
            _ => Stage::None,
        }
    }
}
