use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::Message;

/// Default channel buffer size for the job queue and result channel.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// The message bus connecting the job queue, the OCR workers and the tracker.
///
/// `queue_tx` is the enqueue side of the job queue; the worker pool owns the
/// matching receiver. Workers report progress on `tracker_tx`.
pub struct DocBus {
    pub queue_tx: mpsc::Sender<Message>,
    pub queue_rx: Option<mpsc::Receiver<Message>>,

    pub tracker_tx: mpsc::Sender<Message>,
    pub tracker_rx: Option<mpsc::Receiver<Message>>,
}

impl DocBus {
    /// Create a new bus with default buffer sizes.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with a custom queue capacity.
    ///
    /// The result channel gets twice the capacity since every job reports twice.
    pub fn with_buffer_size(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(buffer);
        let (tracker_tx, tracker_rx) = mpsc::channel(buffer * 2);

        info!(buffer_size = buffer, "DocBus initialized");

        Self {
            queue_tx,
            queue_rx: Some(queue_rx),
            tracker_tx,
            tracker_rx: Some(tracker_rx),
        }
    }

    /// Take the job queue receiver (can only be called once).
    pub fn take_queue_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Queue receiver taken");
        self.queue_rx.take()
    }

    /// Take the tracker receiver (can only be called once).
    pub fn take_tracker_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Tracker receiver taken");
        self.tracker_rx.take()
    }
}

impl Default for DocBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OcrJob;

    fn run_ocr(id: &str) -> Message {
        Message::RunOcr(OcrJob {
            job_id: id.into(),
            document_id: 1,
            locator: "documents/a.jpg".into(),
        })
    }

    #[tokio::test]
    async fn test_bus_send_receive() {
        let mut bus = DocBus::new();
        let mut rx = bus.take_queue_rx().unwrap();

        bus.queue_tx.send(run_ocr("job-a")).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id(), "job-a");
    }

    #[tokio::test]
    async fn test_bus_take_rx_once() {
        let mut bus = DocBus::new();
        assert!(bus.take_tracker_rx().is_some());
        assert!(bus.take_tracker_rx().is_none());
    }

    #[tokio::test]
    async fn test_bus_backpressure() {
        let mut bus = DocBus::with_buffer_size(2);
        let _rx = bus.take_queue_rx().unwrap();

        for i in 0..2 {
            bus.queue_tx.send(run_ocr(&format!("fill-{i}"))).await.unwrap();
        }

        // Buffer full: a non-blocking send must fail
        assert!(bus.queue_tx.try_send(run_ocr("overflow")).is_err());
    }
}
