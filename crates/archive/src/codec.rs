//! Zip reading and writing.

use crate::Entry;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Cursor, Read, Seek, Write};
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Every entry we write uses DEFLATE and the zip epoch as its modification
/// time. Timestamps would otherwise make identical inputs produce different
/// archives.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

pub(crate) fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::InvalidArchive)
}

/// Writes zip entries one at a time into any seekable writer.
///
/// Nothing is buffered beyond the entry currently being written, which makes
/// this suitable for streaming a resource's parts straight into a response
/// body or temporary file.
///
/// ```
/// use partbook_archive::{ZipSink, entries};
/// use std::io::Cursor;
///
/// let mut sink = ZipSink::new(Cursor::new(Vec::new()));
/// sink.append("Flute.pdf", b"%PDF-1.5").unwrap();
/// sink.append("Oboe.pdf", b"%PDF-1.5").unwrap();
/// let bytes = sink.finish().unwrap().into_inner();
/// assert_eq!(entries(&bytes).unwrap(), vec!["Flute.pdf", "Oboe.pdf"]);
/// ```
pub struct ZipSink<W: Write + Seek> {
    writer: ZipWriter<W>,
    written: usize,
}
impl<W: Write + Seek> ZipSink<W> {
    pub fn new(inner: W) -> Self {
        Self { writer: ZipWriter::new(inner), written: 0 }
    }

    /// Add an entry from an in-memory buffer.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.writer.start_file(name, entry_options()).or_raise(|| ErrorKind::Io)?;
        self.writer.write_all(data).or_raise(|| ErrorKind::Io)?;
        self.written += 1;
        Ok(())
    }

    /// Add a directory entry. `name` keeps (or gets) its trailing `/`.
    pub(crate) fn append_directory(&mut self, name: &str) -> Result<()> {
        self.writer.add_directory(name, entry_options()).or_raise(|| ErrorKind::Io)?;
        self.written += 1;
        Ok(())
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Write the central directory and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        self.writer.finish().or_raise(|| ErrorKind::Io)
    }
}

/// Build a complete archive from a set of entries, in the given order.
#[instrument(skip_all)]
pub fn write_entries<'a>(items: impl IntoIterator<Item = &'a Entry>) -> Result<Vec<u8>> {
    let mut sink = ZipSink::new(Cursor::new(Vec::new()));
    for entry in items {
        sink.append(&entry.name, &entry.data)?;
    }
    tracing::debug!(entries = sink.len(), "Archive written");
    Ok(sink.finish()?.into_inner())
}

/// List the entry names of an archive, in central directory order.
pub fn entries(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = open(bytes)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
        names.push(file.name().to_string());
    }
    Ok(names)
}

/// Decode every file entry of an archive. Directory entries are skipped.
#[instrument(skip_all, fields(input_size = bytes.len()))]
pub fn read_entries(bytes: &[u8]) -> Result<Vec<Entry>> {
    let mut archive = open(bytes)?;
    let mut decoded = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data).or_raise(|| ErrorKind::InvalidArchive)?;
        decoded.push(Entry::new(file.name(), data));
    }
    Ok(decoded)
}
