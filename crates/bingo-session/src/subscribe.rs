//! Cancellable live subscription to one session's snapshots.

use std::pin::Pin;
use std::task::{Context, Poll};

use bingo_core::Session;
use futures::stream::{AbortHandle, Abortable, BoxStream, Stream};

/// A live sequence of session snapshots.
///
/// Yields `Option<Session>`: the current snapshot on subscription (`None`
/// while no session exists for the code), then one snapshot per committed
/// mutation, in commit order. A consumer that stops polling misses
/// intermediate states but always eventually sees the current one.
///
/// Delivery ends when [`Subscription::cancel`] is called (from this or any
/// cloned [`SubscriptionHandle`]) or when the subscription is dropped.
pub struct Subscription {
    snapshots: Abortable<BoxStream<'static, Option<Session>>>,
    handle: AbortHandle,
}

impl Subscription {
    pub(crate) fn new(snapshots: BoxStream<'static, Option<Session>>) -> Self {
        let (handle, registration) = AbortHandle::new_pair();
        Self {
            snapshots: Abortable::new(snapshots, registration),
            handle,
        }
    }

    /// Stops delivery. Synchronous and final: once this returns, no
    /// further snapshot is yielded. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// A cloneable cancel handle usable from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.handle.clone())
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl Stream for Subscription {
    type Item = Option<Session>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.snapshots).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.snapshots.size_hint()
    }
}

/// Detached cancel function for a [`Subscription`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle(AbortHandle);

impl SubscriptionHandle {
    /// Stops the subscription; idempotent.
    pub fn cancel(&self) {
        self.0.abort();
    }
}
