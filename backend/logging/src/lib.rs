//! Structured logging setup for the document processor.
//!
//! Console output for operators, plus optional rolling JSON files.

pub mod logger;

pub use logger::{init_logger, LOG_FILE_PREFIX};
