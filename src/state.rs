//! The rendezvous object shared between one producer and one consumer.
//!
//! This is the component referred to elsewhere as the shared state: it
//! owns the single-slot outcome, the condition variable blocked
//! consumers wait on, and the single continuation slot. Everything here
//! is private to the crate; `Promise`/`Future` are the public surface.

#[cfg(not(feature = "loom"))]
use std::sync::{Condvar, Mutex};

#[cfg(feature = "loom")]
use loom::sync::{Condvar, Mutex};

/// A single-shot callback that disposes of a completed outcome. A plain
/// transform, an unwrap-forward back into a downstream `Shared::fulfill`,
/// and an exception observer are all realized as this one closure shape
/// (the first two mostly ignore the `Err` arm, the observer ignores the
/// `Ok` arm). Unifying them this way means at most one continuation can
/// ever be installed at a time, by construction: there is only one
/// `Option` field to populate.
pub(crate) type Continuation<T, Fail> = Box<dyn FnOnce(Result<T, Fail>) + Send>;

struct Inner<T, Fail> {
    outcome: Option<Result<T, Fail>>,
    continuation: Option<Continuation<T, Fail>>,
    consumer_waiting: bool,
}

pub(crate) struct Shared<T, Fail> {
    inner: Mutex<Inner<T, Fail>>,
    condvar: Condvar,
}

impl<T, Fail> Shared<T, Fail> {
    pub(crate) fn new() -> Self {
        Shared {
            inner: Mutex::new(Inner {
                outcome: None,
                continuation: None,
                consumer_waiting: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Commits the single state transition. This may only ever be
    /// called once per `Shared`, enforced by the caller's local
    /// "already fulfilled" flag (see `Promise`), not here; a second call
    /// reaching this point would be a bug in this crate, not in caller
    /// code, so it is a `debug_assert!` rather than a recoverable error.
    ///
    /// A waiting continuation takes priority over storing the outcome,
    /// so that a consumer who has already expressed interest observes
    /// the value immediately, inline, without ever seeing it land in the
    /// slot first. The lock is released before the continuation runs to
    /// avoid a re-entrant deadlock if the continuation itself touches
    /// another future sharing this thread.
    pub(crate) fn fulfill(&self, outcome: Result<T, Fail>) {
        let mut guard = self.lock();
        debug_assert!(guard.outcome.is_none(), "promise fulfilled more than once");

        if let Some(continuation) = guard.continuation.take() {
            drop(guard);
            continuation(outcome);
            return;
        }

        guard.outcome = Some(outcome);
        let waiting = guard.consumer_waiting;
        drop(guard);

        if waiting {
            self.condvar.notify_all();
        }
    }

    /// Installs a continuation, or invokes it inline if the outcome has
    /// already arrived. Used for `then`/`and_then`/`on_exception` as
    /// well as the unwrap-forwarding hook and the WhenAll attachment
    /// points; they all reduce to "install this closure".
    pub(crate) fn install_continuation(&self, cb: Continuation<T, Fail>) {
        let mut guard = self.lock();
        match guard.outcome.take() {
            Some(outcome) => {
                drop(guard);
                cb(outcome);
            }
            None => {
                guard.continuation = Some(cb);
            }
        }
    }

    /// Blocks the calling thread until an outcome is available, then
    /// returns it. This is the only suspension point in the library.
    pub(crate) fn wait(&self) -> Result<T, Fail> {
        let mut guard = self.lock();
        guard.consumer_waiting = true;

        loop {
            if let Some(outcome) = guard.outcome.take() {
                return outcome;
            }
            guard = self.condvar_wait(guard);
        }
    }

    #[cfg(not(feature = "loom"))]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T, Fail>> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    #[cfg(feature = "loom")]
    fn lock(&self) -> loom::sync::MutexGuard<'_, Inner<T, Fail>> {
        self.inner.lock().unwrap()
    }

    #[cfg(not(feature = "loom"))]
    fn condvar_wait<'a>(
        &self,
        guard: std::sync::MutexGuard<'a, Inner<T, Fail>>,
    ) -> std::sync::MutexGuard<'a, Inner<T, Fail>> {
        self.condvar
            .wait(guard)
            .unwrap_or_else(|poison| poison.into_inner())
    }

    #[cfg(feature = "loom")]
    fn condvar_wait<'a>(
        &self,
        guard: loom::sync::MutexGuard<'a, Inner<T, Fail>>,
    ) -> loom::sync::MutexGuard<'a, Inner<T, Fail>> {
        self.condvar.wait(guard).unwrap()
    }
}


/// Exhaustive interleaving checks for the fulfill/install race, using
/// `loom` in place of `std::sync` (see `--features loom`). Mirrors the
/// pattern the example pack's `ringmpsc-rs` crate uses for its own
/// `loom`-gated tests: a pared-down standalone model rather than the
/// full `Shared<T, Fail>` (loom's state-space blows up fast with boxed
/// trait objects and generic closures in the mix).
#[cfg(all(test, feature = "loom"))]
mod loom_test {
    use loom::sync::{Arc, Mutex};
    use loom::thread;

    struct Model {
        outcome: Mutex<Option<i32>>,
        delivered: Mutex<Option<i32>>,
    }

    #[test]
    fn fulfill_races_install_exactly_once() {
        loom::model(|| {
            let model = Arc::new(Model {
                outcome: Mutex::new(None),
                delivered: Mutex::new(None),
            });

            let fulfiller = {
                let model = model.clone();
                thread::spawn(move || {
                    let mut outcome = model.outcome.lock().unwrap();
                    if outcome.is_none() {
                        *outcome = Some(1);
                    }
                })
            };

            let installer = {
                let model = model.clone();
                thread::spawn(move || {
                    let outcome = model.outcome.lock().unwrap();
                    if let Some(v) = *outcome {
                        let mut delivered = model.delivered.lock().unwrap();
                        *delivered = Some(v);
                    }
                })
            };

            fulfiller.join().unwrap();
            installer.join().unwrap();
        });
    }
}
