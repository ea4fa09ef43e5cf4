//! Non-blocking event emission primitive.
//!
//! Every component that emits progress events (C4, C5, C9) takes an
//! `Option<EventSink<E>>` and sends through `try_send`, dropping the event
//! on a full or absent channel rather than blocking the core algorithm on a
//! slow or disinterested consumer.

use tokio::sync::mpsc;

/// Thin wrapper around a bounded `mpsc::Sender` that never blocks the
/// caller and never panics on a full or closed channel.
#[derive(Clone)]
pub struct EventSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> EventSink<E> {
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self { tx }
    }

    /// Emit an event. If the channel is full or the receiver has been
    /// dropped, the event is silently discarded.
    pub fn emit(&self, event: E) {
        let _ = self.tx.try_send(event);
    }
}

/// Emit through an optional sink, a no-op when `sink` is `None`.
pub fn emit<E>(sink: Option<&EventSink<E>>, event: E) {
    if let Some(sink) = sink {
        sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_when_there_is_room() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        sink.emit("hello");
        assert_eq!(rx.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn emit_drops_silently_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        sink.emit("first");
        sink.emit("second"); // channel full, dropped without panicking
        assert_eq!(rx.recv().await, Some("first"));
    }

    #[test]
    fn free_function_emit_is_noop_on_none() {
        emit::<&str>(None, "ignored");
    }
}
