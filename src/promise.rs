use std::fmt;
use std::sync::Arc;

use crate::error::{Failure, PromiseError};
use crate::future::Future;
use crate::state::Shared;

/// The write end of a future: a handle that fulfills the paired
/// [`Future`] exactly once, either with a value or with a failure.
///
/// A `Promise` is constructed standalone (`Promise::new`); its `Future`
/// is materialized on demand via [`Promise::future`], which may only
/// succeed once (`FutureAlreadyRetrieved` on a second call). Dropping a
/// `Promise` that was never fulfilled completes its future with
/// [`Failure::Broken`], so no consumer is ever left waiting forever.
///
/// Rust's ownership rules already make "operate on a moved-from handle"
/// unrepresentable for the common path (the compiler refuses to let you
/// call a method on a value you no longer own), so `PromiseError::NoState`
/// is carried for API completeness rather than because the safe surface
/// here can actually produce it.
pub struct Promise<T, E> {
    shared: Arc<Shared<T, Failure<E>>>,
    future_taken: bool,
    fulfilled: bool,
}

impl<T, E> Promise<T, E> {
    /// Creates a fresh, unfulfilled promise.
    pub fn new() -> Self {
        Promise {
            shared: Arc::new(Shared::new()),
            future_taken: false,
            fulfilled: false,
        }
    }

    /// Hands out the paired consumer handle. May only be called once
    /// per promise.
    pub fn future(&mut self) -> Result<Future<T, E>, PromiseError> {
        if self.future_taken {
            return Err(PromiseError::FutureAlreadyRetrieved);
        }

        self.future_taken = true;
        Ok(Future::new(self.shared.clone()))
    }

    /// Fulfills the future with a value.
    pub fn set_value(&mut self, value: T) -> Result<(), PromiseError> {
        self.fulfill(Ok(value))
    }

    /// Fulfills the future with a user failure.
    pub fn set_exception(&mut self, error: E) -> Result<(), PromiseError> {
        self.fulfill(Err(Failure::Failed(error)))
    }

    pub(crate) fn fulfill(&mut self, outcome: Result<T, Failure<E>>) -> Result<(), PromiseError> {
        if self.fulfilled {
            return Err(PromiseError::PromiseAlreadySatisfied);
        }

        self.fulfilled = true;
        self.shared.fulfill(outcome);
        Ok(())
    }
}

impl<T, E> Default for Promise<T, E> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("fulfilled", &self.fulfilled)
            .field("future_taken", &self.future_taken)
            .finish()
    }
}

impl<T, E> Drop for Promise<T, E> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }

        self.fulfilled = true;
        log::debug!("promise dropped unfulfilled; completing with BrokenPromise");
        self.shared.fulfill(Err(Failure::Broken));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn future_can_only_be_retrieved_once() {
        let mut p = Promise::<i32, ()>::new();
        assert!(p.future().is_ok());
        assert_eq!(p.future().unwrap_err(), PromiseError::FutureAlreadyRetrieved);
    }

    #[test]
    fn drop_without_fulfilling_breaks_the_future() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        drop(p);
        assert!(f.get().unwrap_err().is_broken());
    }

    #[test]
    fn set_value_then_get_round_trips() {
        let mut p = Promise::<i32, ()>::new();
        let f = p.future().unwrap();
        p.set_value(1).unwrap();
        assert_eq!(f.get().unwrap(), 1);
    }

    #[test]
    fn fulfilling_twice_reports_already_satisfied() {
        let mut p = Promise::<i32, ()>::new();
        let _f = p.future().unwrap();
        p.set_value(1).unwrap();
        assert_eq!(p.set_value(2), Err(PromiseError::PromiseAlreadySatisfied));
    }

    #[test]
    fn set_exception_then_get_reraises_it() {
        let mut p = Promise::<i32, &'static str>::new();
        let f = p.future().unwrap();
        p.set_exception("boom").unwrap();
        let err = f.get().unwrap_err();
        assert_eq!(err.into_inner(), Some("boom"));
    }
}
