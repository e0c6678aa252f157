//! Listener registry
//!
//! Ordered set of zero-argument callbacks. Listeners read coordinator state
//! themselves; the registry only tells them that a cycle completed.
//!
//! Notification always runs over a snapshot taken under the lock, so a
//! listener may add or remove listeners (itself included) while being called.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

/// Subscriber callback
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle returned by `add_listener`, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(ListenerToken, Listener)>,
}

impl ListenerRegistry {
    /// Append a listener; returns its removal token
    pub(crate) fn add(&mut self, listener: Listener) -> ListenerToken {
        self.next_id += 1;
        let token = ListenerToken(self.next_id);
        self.entries.push((token, listener));
        token
    }

    /// Remove a listener; `false` if the token was already removed
    pub(crate) fn remove(&mut self, token: ListenerToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t != token);
        self.entries.len() != before
    }

    /// Listeners in registration order
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Call every listener in order, isolating panics
///
/// Returns the number of listeners that panicked.
pub(crate) fn notify_all(name: &str, listeners: &[Listener]) -> usize {
    let mut panicked = 0;
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
            panicked += 1;
            error!("{}: listener panicked during notification", name);
        }
    }
    panicked
}

/// Stream of update notifications
///
/// Yields `()` after every completed cycle. Notifications that arrive while
/// one is already buffered are merged, so a slow consumer sees at most one
/// pending item. Dropping the stream removes its listener.
pub struct UpdateStream {
    inner: ReceiverStream<()>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl UpdateStream {
    /// Listener feeding a new stream
    pub(crate) fn channel() -> (Listener, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let listener: Listener = Arc::new(move || {
            // Full means a notification is already pending.
            let _ = tx.try_send(());
        });
        (listener, rx)
    }

    pub(crate) fn new(rx: mpsc::Receiver<()>, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            detach: Some(Box::new(detach)),
        }
    }
}

impl Stream for UpdateStream {
    type Item = ();

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for UpdateStream {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for UpdateStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateStream").finish_non_exhaustive()
    }
}
