pub mod channel;
pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use channel::DocBus;
pub use error::{DocError, DocResult};
pub use message::{JobOutcome, Message, OcrJob};
pub use traits::{BlobStore, Component, TextExtractor};
pub use types::{Document, DocumentId, DocumentText, JobRecord, JobStatus, TextPolicy};
