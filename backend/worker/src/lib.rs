//! Asynchronous OCR: the enqueue side of the job queue, the worker pool that
//! drains it, and the tracker that records what happened.

pub mod ocr;
pub mod queue;
pub mod tracker;
pub mod worker;

pub use ocr::TesseractExtractor;
#[cfg(any(test, feature = "test-util"))]
pub use ocr::StaticExtractor;
pub use queue::JobQueue;
pub use tracker::JobTracker;
pub use worker::OcrWorker;
