//! Cooperative cancellation threaded through compile, staging and execution.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::dialect::DialectAdapter;
use crate::error::{DriverError, Error, Result};

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

/// A cloneable cancellation signal.
///
/// All clones observe the same state. Once cancelled, a signal stays
/// cancelled.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Trigger the signal, running every registered callback once.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.notify.notify_waiters();

        let callbacks = std::mem::take(
            &mut *self
                .inner
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (_, callback) in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `callback` when the signal fires. Runs it immediately if the
    /// signal has already fired. Dropping the registration unregisters it.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> CancellationRegistration {
        if self.is_cancelled() {
            callback();
            return CancellationRegistration {
                signal: self.clone(),
                id: None,
            };
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // cancel() may have won the race after the check above
        if self.is_cancelled() {
            drop(callbacks);
            callback();
            return CancellationRegistration {
                signal: self.clone(),
                id: None,
            };
        }
        callbacks.push((id, Box::new(callback)));
        CancellationRegistration {
            signal: self.clone(),
            id: Some(id),
        }
    }

    fn unregister(&self, id: u64) {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Why a guarded driver call did not complete.
#[derive(Debug)]
pub(crate) enum Interruption {
    Cancelled,
    Failed(DriverError),
}

/// Drive `future` unless the signal fires first. The signal is polled first,
/// so an already cancelled signal never starts the I/O.
pub(crate) async fn race<T, F>(
    signal: Option<&CancellationSignal>,
    future: F,
) -> std::result::Result<T, Interruption>
where
    F: Future<Output = std::result::Result<T, DriverError>>,
{
    match signal {
        None => future.await.map_err(Interruption::Failed),
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => Err(Interruption::Cancelled),
                result = future => result.map_err(Interruption::Failed),
            }
        }
    }
}

/// [`race`] for steps that already report crate errors.
pub(crate) async fn guard<T, F>(
    signal: Option<&CancellationSignal>,
    stage: &str,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match signal {
        None => future.await,
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => Err(Error::cancelled(stage)),
                result = future => result,
            }
        }
    }
}

/// Turn an interruption into the error callers see. Driver errors that look
/// like a cancellation the caller asked for become `CancelledByCaller`.
pub(crate) fn settle(
    adapter: &dyn DialectAdapter,
    signal: Option<&CancellationSignal>,
    context: String,
    interruption: Interruption,
) -> Error {
    match interruption {
        Interruption::Cancelled => Error::cancelled(context),
        Interruption::Failed(e) if signal.is_some_and(|s| adapter.classify_cancellation(&e, s)) => {
            Error::cancelled(context)
        }
        Interruption::Failed(e) => Error::driver(context, e),
    }
}

/// A callback registered on a [`CancellationSignal`].
pub struct CancellationRegistration {
    signal: CancellationSignal,
    id: Option<u64>,
}

impl CancellationRegistration {
    /// Unregister now. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(id) = self.id.take() {
            self.signal.unregister(id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        self.dispose();
    }
}
