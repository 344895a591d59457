//! File organization into the library.
//!
//! Moves completed downloads to their destination, rendering the library
//! template and translating download-client paths into local ones.

mod fs;
mod pathmap;

pub use fs::{FsOrganizer, OrganizeError, OrganizeResult};
pub use pathmap::{transform, TranslatedPath};
