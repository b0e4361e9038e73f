//! Storage adapters: uploaded bytes on the filesystem, records in SQLite.

pub mod blob;
pub mod jobs;
pub mod metadata;
pub mod mime;

pub use blob::FsBlobStore;
pub use metadata::MetadataStore;
pub use mime::{extension_for, is_image};
