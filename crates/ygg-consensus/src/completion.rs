use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;
use ygg_types::YggError;

type Callback<T> = Box<dyn FnOnce(Result<T, YggError>) + Send + 'static>;

enum Inner<T> {
    Channel(oneshot::Sender<Result<T, YggError>>),
    Callback(Callback<T>),
}

/// One-shot notification for the outcome of a proposal.
///
/// `complete` consumes the token, so it can fire at most once. A token
/// dropped without firing resolves with [`YggError::Shutdown`], so a waiter
/// never hangs on a proposal that was abandoned.
pub struct Completion<T: Send + 'static> {
    inner: Option<Inner<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Synchronous mode: the caller awaits the returned waiter.
    pub fn channel() -> (Self, CompletionWaiter<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion { inner: Some(Inner::Channel(tx)) }, CompletionWaiter { rx })
    }

    /// Asynchronous mode: `f` runs with the outcome on whichever task finishes
    /// the proposal.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Result<T, YggError>) + Send + 'static,
    {
        Completion { inner: Some(Inner::Callback(Box::new(f))) }
    }

    /// A completion nobody observes.
    pub fn ignore() -> Self {
        Completion::callback(|_| {})
    }

    pub fn complete(mut self, result: Result<T, YggError>) {
        if let Some(inner) = self.inner.take() {
            fire(inner, result);
        }
    }
}

fn fire<T>(inner: Inner<T>, result: Result<T, YggError>) {
    match inner {
        // The waiter may have given up (timeout); nothing left to notify.
        Inner::Channel(tx) => {
            let _ = tx.send(result);
        }
        Inner::Callback(f) => f(result),
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            fire(inner, Err(YggError::Shutdown));
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.inner {
            Some(Inner::Channel(_)) => "channel",
            Some(Inner::Callback(_)) => "callback",
            None => "fired",
        };
        f.debug_struct("Completion").field("mode", &mode).finish()
    }
}

/// Receiving half of [`Completion::channel`].
pub struct CompletionWaiter<T> {
    rx: oneshot::Receiver<Result<T, YggError>>,
}

impl<T> CompletionWaiter<T> {
    pub async fn wait(self) -> Result<T, YggError> {
        self.rx.await.unwrap_or(Err(YggError::Shutdown))
    }

    /// Like [`wait`](Self::wait), giving up with [`YggError::Timeout`] after
    /// `timeout`. The proposal itself is not cancelled.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T, YggError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(r) => r.unwrap_or(Err(YggError::Shutdown)),
            Err(_) => Err(YggError::Timeout),
        }
    }
}
