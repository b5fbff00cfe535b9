//! PPTX (Office Open XML) package backend.
//!
//! Reads .pptx files, which are ZIP archives of XML parts linked by
//! relationship files, and writes rewritten copies of them atomically.

pub mod compactor;
pub mod container;
pub mod content_types;
pub mod inspect;
pub mod media;
pub mod presentation;
pub mod rels;
pub mod shrink;
pub mod split;
pub mod substitute;
mod xml;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixture;

pub use compactor::{compact, CompactionReport, Compactor};
pub use container::{copy_atomic, Package, PackageWriter};
pub use inspect::{inspect, DeckSummary, SlideSummary};
pub use shrink::{shrink, ShrinkOptions, ShrinkReport};
pub use split::{split, SplitReport};
pub use substitute::{substitute, SubstituteReport};
