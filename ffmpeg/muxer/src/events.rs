/*!
    Structured events emitted by the muxer.
*/

use crate::error::MuxError;

/**
    Something that happened to a node.
*/
#[derive(Debug, Clone)]
pub struct Event {
    /// Name of the node that emitted the event.
    pub node: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// The header was written and the node is consuming packets.
    Started,
    /// Teardown has completed.
    Stopped,
    /// A runtime failure, tagged with the operation that failed.
    Error {
        operation: &'static str,
        error: MuxError,
    },
}

impl Event {
    pub fn error(&self) -> Option<&MuxError> {
        match &self.kind {
            EventKind::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

/**
    Receiver of node events.

    Implemented for any `Fn(Event)` closure, which is the easiest way to
    collect events in a pipeline or a test.
*/
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<F> EventSink for F
where
    F: Fn(Event) + Send + Sync,
{
    fn emit(&self, event: Event) {
        self(event)
    }
}

/**
    Event sink that forwards everything to `tracing`.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match event.kind {
            EventKind::Started => tracing::info!(node = %event.node, "node started"),
            EventKind::Stopped => tracing::info!(node = %event.node, "node stopped"),
            EventKind::Error { operation, error } => tracing::error!(
                node = %event.node,
                operation,
                kind = ?error.kind(),
                error = %error,
                "node error"
            ),
        }
    }
}
