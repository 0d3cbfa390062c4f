//! Flush completion.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Resolves once the pending or running flush has finished.
///
/// Created by [`Runtime::next_tick`](crate::Runtime::next_tick). Resolves
/// immediately when nothing was pending. An aborted flush also resolves it.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    waiter: Option<oneshot::Receiver<()>>,
}

impl NextTick {
    pub(crate) fn ready() -> Self {
        Self { waiter: None }
    }

    pub(crate) fn after(waiter: oneshot::Receiver<()>) -> Self {
        Self {
            waiter: Some(waiter),
        }
    }
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(waiter) = self.waiter.as_mut() else {
            return Poll::Ready(());
        };

        match Pin::new(waiter).poll(cx) {
            Poll::Ready(_) => {
                self.waiter = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
