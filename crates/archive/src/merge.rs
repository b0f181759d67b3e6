use crate::codec::{ZipSink, open};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use tracing::instrument;

/// Merge several zip archives into one, deduplicating by entry name.
///
/// Sources are visited in the order given, which is also their priority: an
/// entry name keeps the bytes of the first source it appears in, and entries
/// with the same name in later sources are skipped. Every kept file entry is
/// re-encoded with DEFLATE; directory entries are carried over as well, so
/// the result's names are the union of the sources' names.
///
/// The result is all-or-nothing. If any source is not a valid archive, or any
/// entry can't be read, the merge fails with
/// [`InvalidArchive`](ErrorKind::InvalidArchive) and everything buffered up to
/// that point is discarded.
///
/// # Examples
///
/// ```
/// use partbook_archive::{Entry, merge, read_entries, write_entries};
///
/// let newer = write_entries(&[Entry::new("Flute.pdf", b"new".to_vec())]).unwrap();
/// let older = write_entries(&[
///     Entry::new("Flute.pdf", b"old".to_vec()),
///     Entry::new("Oboe.pdf", b"oboe".to_vec()),
/// ]).unwrap();
///
/// let merged = read_entries(&merge([&newer[..], &older[..]]).unwrap()).unwrap();
/// assert_eq!(merged, vec![
///     Entry::new("Flute.pdf", b"new".to_vec()),
///     Entry::new("Oboe.pdf", b"oboe".to_vec()),
/// ]);
/// ```
#[instrument(skip_all, fields(sources, entries))]
pub fn merge<'a>(sources: impl IntoIterator<Item = &'a [u8]>) -> Result<Vec<u8>> {
    let mut seen = HashSet::new();
    let mut sink = ZipSink::new(Cursor::new(Vec::new()));
    let mut count = 0usize;
    for source in sources {
        count += 1;
        let mut archive = open(source)?;
        for index in 0..archive.len() {
            let mut file = archive.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
            if seen.contains(file.name()) {
                continue;
            }
            let name = file.name().to_string();
            if file.is_dir() {
                sink.append_directory(&name).or_raise(|| ErrorKind::InvalidArchive)?;
            } else {
                let mut data = Vec::new();
                file.read_to_end(&mut data).or_raise(|| ErrorKind::InvalidArchive)?;
                sink.append(&name, &data).or_raise(|| ErrorKind::InvalidArchive)?;
            }
            seen.insert(name);
        }
    }
    let span = tracing::Span::current();
    span.record("sources", count);
    span.record("entries", sink.len());
    Ok(sink.finish().or_raise(|| ErrorKind::InvalidArchive)?.into_inner())
}
