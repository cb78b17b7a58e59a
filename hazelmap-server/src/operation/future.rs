//! Futures returned by the non-blocking operation variants.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use hazelmap_core::{HazelmapError, Result};
use tokio::task::JoinHandle;

/// The pending result of an operation started with an `*_async` call.
///
/// The operation is spawned when the future is created and runs to
/// completion whether or not the future is awaited. Dropping the future
/// discards the result but does not cancel the operation.
#[derive(Debug)]
#[must_use = "the operation runs regardless; await the future to observe its result"]
pub struct MapFuture<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> MapFuture<T> {
    pub(crate) fn spawn<F>(operation: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(operation),
        }
    }
}

impl<T> MapFuture<T> {
    /// Returns `true` once the operation has finished.
    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for MapFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Poll::Ready(Err(err)) => Poll::Ready(Err(HazelmapError::Cancelled(err.to_string()))),
        }
    }
}
