//! A promise/future pair for one-shot cross-thread handoff.
//!
//! A [`Promise`] is the write end; [`Future`] is the read end retrieved
//! from it exactly once. The two are connected by a single piece of
//! shared state (mutex + condvar) that is fulfilled exactly once, either
//! with a value or with a [`Failure`]. Continuations attached via
//! [`Future::map`]/[`Future::and_then`]/[`Future::on_exception`] run
//! inline, on whichever thread happens to fulfill the promise, with no
//! executor or thread pool involved.
//!
//! [`when_all`] (and its fixed-arity `when_all2`..`when_all6` siblings)
//! fan a set of futures in, producing a single future that resolves once
//! every child has.

mod error;
mod future;
mod promise;
mod state;
mod when_all;

pub use error::{AggregateFailure, Failure, PromiseError};
pub use future::Future;
pub use promise::Promise;
pub use when_all::{when_all, when_all2, when_all3, when_all4, when_all5, when_all6};
