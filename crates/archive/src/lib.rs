//! Archive composition for sheet-music resources.
//!
//! A resource is a set of named parts (usually one PDF per instrument). This
//! crate provides the two transformations the rest of the workspace builds on:
//!
//! - **Merging** zip archives with a first-source-wins policy per entry name
//!   ([`merge`]), so that a resubmitted resource never loses parts it already
//!   had.
//! - **Splitting** a full score into per-part PDFs by page range ([`split`]),
//!   lazily, one [`Assignment`] at a time.
//!
//! Plus the small helpers needed around them: listing and decoding archives
//! ([`entries`], [`read_entries`]), writing archives one entry at a time
//! ([`ZipSink`]) and entry-name handling ([`base_name`]).
//!
//! All entries are written with DEFLATE compression and a fixed modification
//! time, so equal inputs always produce byte-identical archives.

mod codec;
pub mod error;
mod merge;
mod split;

pub use crate::codec::{ZipSink, entries, read_entries, write_entries};
pub use crate::merge::merge;
pub use crate::split::{Assignment, Split, page_count, split};

/// A named blob inside a resource: one file of an archive, or one part
/// produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name. Opaque: may contain `/` separators.
    pub name: String,
    pub data: Vec<u8>,
}
impl Entry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }
}

/// The last `/`-separated component of an entry name.
///
/// Entry names are otherwise treated as opaque identifiers; this is only for
/// callers that explicitly want base-name-only output.
///
/// ```
/// use partbook_archive::base_name;
///
/// assert_eq!(base_name("strings/Violin 1.pdf"), "Violin 1.pdf");
/// assert_eq!(base_name("Flute.pdf"), "Flute.pdf");
/// ```
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
