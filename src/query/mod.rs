// Read side of the index: symbol lookups, file content and folder listings

pub mod engine;

pub use engine::{FolderListing, OccurrenceResult, QueryEngine};
