use crate::types::StreamEvent;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one stream connection.
///
/// `Idle → Connecting → Streaming → (Completed | Failed | Cancelled)`;
/// any state may move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }
}

/// What the stream task hands to its subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Decoded from the wire, including server-sent `error` frames.
    Event(StreamEvent),
    /// Connect or I/O failure raised on this side; carries the user message.
    Failure(String),
}

impl Delivery {
    pub(crate) fn into_event(self) -> StreamEvent {
        match self {
            Delivery::Event(event) => event,
            Delivery::Failure(message) => StreamEvent::error(message),
        }
    }
}

/// Consumer side of one live stream.
///
/// Yields events in arrival order. Dropping the subscription cancels it and
/// closes the connection.
pub struct EventSubscription {
    session_id: String,
    rx: mpsc::Receiver<Delivery>,
    state: watch::Receiver<StreamState>,
    token: CancellationToken,
}

impl EventSubscription {
    pub(crate) fn new(
        session_id: String,
        rx: mpsc::Receiver<Delivery>,
        state: watch::Receiver<StreamState>,
        token: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            rx,
            state,
            token,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Stop the stream. No further events are yielded after this returns.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this subscription; usable from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next item with its origin kept, for callers that must tell a local
    /// failure from a server `error` frame.
    pub(crate) async fn next_delivery(&mut self) -> Option<Delivery> {
        if self.token.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// Wait until the background task has reached a final state.
    pub async fn finished(&mut self) -> StreamState {
        let reached = self.state.wait_for(|s| s.is_finished()).await.map(|s| *s);
        match reached {
            Ok(state) => state,
            // The task is gone; whatever it last published is final.
            Err(_) => *self.state.borrow(),
        }
    }
}

impl Stream for EventSubscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx
            .poll_recv(cx)
            .map(|item| item.map(Delivery::into_event))
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_failure_surfaces_as_error_event() {
        assert_eq!(
            Delivery::Failure("Cannot reach the server".into()).into_event(),
            StreamEvent::error("Cannot reach the server")
        );
        let server = StreamEvent::error("model overloaded");
        assert_eq!(Delivery::Event(server.clone()).into_event(), server);
    }
}
