use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Failure;
use crate::promise::Promise;
use crate::state::Shared;

/// The read end of a future: a handle that is consumed by exactly one
/// of `get`, `map`, `and_then`, or `on_exception`.
///
/// `Future<T, E>` carries either a value `T` or a [`Failure<E>`], the
/// latter covering a user-set exception, a broken (dropped-unfulfilled)
/// promise, or a panic unwound out of an upstream continuation.
pub struct Future<T, E> {
    shared: Arc<Shared<T, Failure<E>>>,
}

impl<T, E> Future<T, E> {
    pub(crate) fn new(shared: Arc<Shared<T, Failure<E>>>) -> Self {
        Future { shared }
    }

    /// An already-fulfilled future, for seeding chains or tests without
    /// a paired promise.
    pub fn ready(value: T) -> Self {
        let mut promise = Promise::new();
        let future = promise.future().expect("freshly constructed promise");
        let _ = promise.set_value(value);
        future
    }

    /// Blocks the calling thread until the producer fulfills this
    /// future, then returns its outcome. This is the only suspension
    /// point in the library.
    pub fn get(self) -> Result<T, Failure<E>> {
        self.shared.wait()
    }
}

impl<T, E> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Transforms a successful value inline when it arrives. A failure
    /// (user exception, broken promise, or upstream panic) propagates
    /// through unchanged without invoking `f`, and without invoking any
    /// later continuation chained off the result either.
    ///
    /// If `f` itself panics, the panic is caught and turned into a
    /// [`Failure::Panicked`] on the returned future rather than
    /// unwinding across the producer/consumer boundary onto whatever
    /// unrelated thread happens to be running the continuation.
    pub fn map<R, F>(self, f: F) -> Future<R, E>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut downstream = Promise::<R, E>::new();
        let future = downstream.future().expect("freshly constructed promise");

        self.shared.install_continuation(Box::new(move |outcome| {
            let next = match outcome {
                Ok(value) => match catch_unwind(AssertUnwindSafe(|| f(value))) {
                    Ok(mapped) => Ok(mapped),
                    Err(payload) => Err(Failure::Panicked(panic_message(payload))),
                },
                Err(failure) => Err(failure),
            };
            let _ = downstream.fulfill(next);
        }));

        future
    }

    /// Transforms a successful value into another future and flattens
    /// it into the result, so the caller never observes a
    /// future-of-a-future.
    pub fn and_then<R, F>(self, f: F) -> Future<R, E>
    where
        F: FnOnce(T) -> Future<R, E> + Send + 'static,
        R: Send + 'static,
    {
        let mut downstream = Promise::<R, E>::new();
        let future = downstream.future().expect("freshly constructed promise");

        self.shared.install_continuation(Box::new(move |outcome| {
            match outcome {
                Ok(value) => match catch_unwind(AssertUnwindSafe(|| f(value))) {
                    Ok(inner) => inner.forward_into(downstream),
                    Err(payload) => {
                        let _ = downstream.fulfill(Err(Failure::Panicked(panic_message(payload))));
                    }
                },
                Err(failure) => {
                    let _ = downstream.fulfill(Err(failure));
                }
            }
        }));

        future
    }

    /// Observes a failure without touching a successful value. A
    /// no-op if the future completes successfully. Also used
    /// internally by [`crate::when_all`] to keep its countdown honest
    /// on failed children.
    pub fn on_exception<F>(self, f: F)
    where
        F: FnOnce(Failure<E>) + Send + 'static,
    {
        self.shared.install_continuation(Box::new(move |outcome| {
            if let Err(failure) = outcome {
                let _ = catch_unwind(AssertUnwindSafe(|| f(failure)));
            }
        }));
    }

    /// The unwrap-rule hook: installs a continuation on `self` that
    /// forwards whatever outcome arrives straight into `downstream`,
    /// making `self` and `downstream`'s future behave as the same
    /// future. Used by `and_then` to flatten a continuation that
    /// itself returned a `Future`.
    pub(crate) fn forward_into(self, mut downstream: Promise<T, E>) {
        self.shared.install_continuation(Box::new(move |outcome| {
            let _ = downstream.fulfill(outcome);
        }));
    }

    /// Installs the raw two-armed continuation directly. This is the
    /// single attachment point `when_all` uses to both collect a
    /// successful value and observe a failure, as one closure that
    /// matches on `Ok`/`Err`.
    pub(crate) fn settle_with<F>(self, f: F)
    where
        F: FnOnce(Result<T, Failure<E>>) + Send + 'static,
    {
        self.shared.install_continuation(Box::new(f));
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Future")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "continuation panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::PromiseError;

    #[test]
    fn simple_round_trip() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        let handle = std::thread::spawn(move || f.get());

        std::thread::sleep(std::time::Duration::from_millis(20));
        p.set_value(42).unwrap();

        assert_eq!(handle.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn broken_promise_on_drop() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        drop(p);
        assert!(f.get().unwrap_err().is_broken());
    }

    #[test]
    fn chained_transform() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        let chained = f.map(|x| x + 1).map(|x| x * 10);

        p.set_value(4).unwrap();
        assert_eq!(chained.get().unwrap(), 50);
    }

    #[test]
    fn failure_propagates_without_invoking_continuations() {
        let mut p = Promise::<i32, &'static str>::new();
        let f = p.future().unwrap();
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked2 = invoked.clone();

        let chained = f
            .map(move |x| {
                invoked2.store(true, std::sync::atomic::Ordering::SeqCst);
                x + 1
            })
            .map(|x| x * 10);

        p.set_exception("boom").unwrap();

        let err = chained.get().unwrap_err();
        assert_eq!(err.into_inner(), Some("boom"));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn then_on_already_failed_future_forwards_rather_than_raising_synchronously() {
        // `map` on an already-failed future must hand the failure to
        // the downstream promise, not panic/raise synchronously.
        let mut p = Promise::<i32, &'static str>::new();
        let f = p.future().unwrap();
        p.set_exception("already gone").unwrap();

        let chained = f.map(|x| x + 1);
        assert_eq!(chained.get().unwrap_err().into_inner(), Some("already gone"));
    }

    #[test]
    fn unwrap_rule_flattens_nested_futures() {
        let mut outer = Promise::<i32, ()>::new();
        let mut inner = Promise::<i32, ()>::new();

        let outer_future = outer.future().unwrap();
        let inner_future = inner.future().unwrap();

        let flattened = outer_future.and_then(move |_| inner_future);

        outer.set_value(7).unwrap();
        inner.set_value(99).unwrap();

        assert_eq!(flattened.get().unwrap(), 99);
    }

    #[test]
    fn on_exception_observes_failure_and_ignores_success() {
        let mut ok = Promise::<i32, &'static str>::new();
        let ok_future = ok.future().unwrap();
        let observed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed2 = observed.clone();
        ok_future.on_exception(move |_| observed2.store(true, std::sync::atomic::Ordering::SeqCst));
        ok.set_value(1).unwrap();
        assert!(!observed.load(std::sync::atomic::Ordering::SeqCst));

        let mut failing = Promise::<i32, &'static str>::new();
        let failing_future = failing.future().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        failing_future.on_exception(move |e| tx.send(e).unwrap());
        failing.set_exception("nope").unwrap();
        assert_eq!(rx.recv().unwrap().into_inner(), Some("nope"));
    }

    #[test]
    fn panicking_continuation_becomes_a_failure() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        let chained = f.map(|_| -> i32 { panic!("nope") });
        p.set_value(1).unwrap();
        assert!(chained.get().unwrap_err().is_panic());
    }

    #[test]
    fn ready_future_is_already_fulfilled() {
        let f = Future::<i32, ()>::ready(5);
        assert_eq!(f.get().unwrap(), 5);
    }

    #[test]
    fn no_state_is_reported_for_completeness_even_if_unreachable_here() {
        // PromiseError::NoState exists for parity with the rest of the
        // error taxonomy; Rust's move semantics mean the safe API here
        // never actually produces it (see `Promise`'s doc comment).
        let err = PromiseError::NoState;
        assert_eq!(err, PromiseError::NoState);
    }
}
