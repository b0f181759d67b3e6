//! Records kept by the resource stores.

mod meta;
mod project;

pub use self::meta::{MetaData, Status};
pub use self::project::Project;

/// One named part of a resource, typically a single instrument's PDF.
pub type Part = partbook_archive::Entry;
