use crate::Entry;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lopdf::Document;
use std::io::Read;
use std::slice::Iter;
use tracing::instrument;

/// Which pages of a full score belong to one part.
///
/// Page numbers are 1-indexed and both ends of the range are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Part name; the extracted document is named `"<id>.pdf"`.
    pub id: String,
    pub from: u32,
    pub to: u32,
}
impl Assignment {
    pub fn new(id: impl Into<String>, from: u32, to: u32) -> Self {
        Self { id: id.into(), from, to }
    }

    fn validate(&self, pages: u32) -> Result<()> {
        if self.from == 0 || self.from > self.to || self.to > pages {
            exn::bail!(ErrorKind::PageRange { id: self.id.clone(), from: self.from, to: self.to, pages });
        }
        Ok(())
    }
}

/// Number of pages in a PDF document.
pub fn page_count(pdf: impl Read) -> Result<u32> {
    let document = Document::load_from(pdf).or_raise(|| ErrorKind::InvalidDocument)?;
    Ok(pages_of(&document))
}

fn pages_of(document: &Document) -> u32 {
    // A document can't realistically have more than u32::MAX pages; lopdf
    // numbers pages with a u32 anyway.
    u32::try_from(document.get_pages().len()).unwrap_or(u32::MAX)
}

/// Split a full score into one PDF per [`Assignment`].
///
/// Only parsing the source document happens up front; each part is extracted
/// when the returned [`Split`] iterator is advanced. See [`Split`] for how
/// invalid page ranges are reported.
///
/// # Examples
///
/// ```no_run
/// use partbook_archive::{Assignment, split};
/// # fn example() -> partbook_archive::error::Result<()> {
/// let score = std::fs::File::open("symphony.pdf").unwrap();
/// let assignments = [Assignment::new("Flute", 1, 4), Assignment::new("Oboe", 5, 8)];
/// for part in split(score, &assignments)? {
///     let part = part?;
///     println!("{}: {} bytes", part.name, part.data.len());
/// }
/// # Ok(())
/// # }
/// ```
#[instrument(skip_all, fields(assignments = assignments.len()))]
pub fn split(pdf: impl Read, assignments: &[Assignment]) -> Result<Split<'_>> {
    let document = Document::load_from(pdf).or_raise(|| ErrorKind::InvalidDocument)?;
    let pages = pages_of(&document);
    tracing::debug!(pages, "Loaded score for splitting");
    Ok(Split { document, pages, assignments: assignments.iter(), halted: false })
}

/// Lazy iterator of extracted parts, produced by [`split`].
///
/// Fail-fast without rollback: the first assignment with an invalid page
/// range produces a single [`PageRange`](ErrorKind::PageRange) error item and
/// the iterator ends. Parts yielded before it remain valid. The iterator can't
/// be resumed past the failure; call [`split`] again instead.
pub struct Split<'a> {
    document: Document,
    pages: u32,
    assignments: Iter<'a, Assignment>,
    halted: bool,
}
impl Split<'_> {
    /// Number of pages in the source document.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    fn extract(&self, assignment: &Assignment) -> Result<Entry> {
        assignment.validate(self.pages)?;
        let mut part = self.document.clone();
        let unwanted: Vec<u32> = (1..=self.pages).filter(|p| *p < assignment.from || *p > assignment.to).collect();
        part.delete_pages(&unwanted);
        part.prune_objects();
        part.renumber_objects();
        let mut data = Vec::new();
        part.save_to(&mut data).or_raise(|| ErrorKind::Io)?;
        tracing::debug!(part = %assignment.id, from = assignment.from, to = assignment.to, size = data.len(), "Extracted part");
        Ok(Entry::new(format!("{}.pdf", assignment.id), data))
    }
}
impl Iterator for Split<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        let assignment = self.assignments.next()?;
        let extracted = self.extract(assignment);
        if extracted.is_err() {
            self.halted = true;
        }
        Some(extracted)
    }
}

/// Build a blank PDF with the given number of pages.
#[cfg(test)]
pub(crate) fn blank_pdf(pages: u32) -> Vec<u8> {
    use lopdf::{Object, Stream, dictionary};

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let content_id = document.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        });
        kids.push(page_id.into());
    }
    let tree = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(i64::from(pages)),
    };
    document.objects.insert(pages_id, Object::Dictionary(tree));
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    document.save_to(&mut bytes).unwrap();
    bytes
}
