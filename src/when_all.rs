//! The WhenAll fan-in combinator: wait for a homogeneous sequence, or a
//! heterogeneous fixed-arity set, of futures and produce a single
//! future of the aggregated results.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AggregateFailure, Failure};
use crate::future::Future;
use crate::promise::Promise;

/// Waits for every future in `futures` to complete, preserving input
/// order in the result. If one or more fail, the returned future fails
/// with an [`AggregateFailure`] listing every failed child at its
/// original position; no partial values are observable either way.
///
/// Sibling futures are attached to with no ordering between them.
/// Whichever thread observes the last remaining completion is the one
/// that fulfills the aggregate, and it does so exactly once by
/// construction of the atomic countdown below.
pub fn when_all<T, E>(futures: Vec<Future<T, E>>) -> Future<Vec<T>, AggregateFailure<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let total = futures.len();
    let mut aggregate = Promise::<Vec<T>, AggregateFailure<E>>::new();
    let aggregate_future = aggregate.future().expect("freshly constructed promise");

    if total == 0 {
        let _ = aggregate.set_value(Vec::new());
        return aggregate_future;
    }

    let context = std::sync::Arc::new(Context {
        slots: Mutex::new((0..total).map(|_| None).collect()),
        remaining: AtomicUsize::new(total),
        aggregate: Mutex::new(Some(aggregate)),
    });

    for (index, future) in futures.into_iter().enumerate() {
        let context = context.clone();
        future.settle_with(move |outcome| context.resolve(index, outcome));
    }

    aggregate_future
}

struct Context<T, E> {
    slots: Mutex<Vec<Option<Result<T, Failure<E>>>>>,
    remaining: AtomicUsize,
    aggregate: Mutex<Option<Promise<Vec<T>, AggregateFailure<E>>>>,
}

impl<T, E> Context<T, E> {
    fn resolve(&self, index: usize, outcome: Result<T, Failure<E>>) {
        {
            let mut slots = self.slots.lock().unwrap();
            slots[index] = Some(outcome);
        }

        // Exactly one caller observes the countdown reach zero. This is
        // what lets the aggregate be fulfilled exactly once regardless
        // of completion interleaving.
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let slots = std::mem::take(&mut *self.slots.lock().unwrap());
        let total = slots.len();
        let mut promise = self
            .aggregate
            .lock()
            .unwrap()
            .take()
            .expect("whenall aggregate fulfilled more than once");

        let has_failure = slots.iter().any(|slot| matches!(slot, Some(Err(_))));

        if has_failure {
            let failures = slots
                .into_iter()
                .enumerate()
                .filter_map(|(index, slot)| match slot {
                    Some(Err(failure)) => Some((index, failure)),
                    _ => None,
                })
                .collect();
            log::warn!("when_all: {} of {} children failed", failures.len(), total);
            let _ = promise.fulfill(Err(Failure::Failed(AggregateFailure::new(failures, total))));
        } else {
            let values = slots
                .into_iter()
                .map(|slot| slot.expect("slot filled before countdown reached zero").expect("checked above: no failures"))
                .collect();
            let _ = promise.set_value(values);
        }
    }
}

/// A single-slot raw value, type-erased so the heterogeneous combinator
/// can hold a fixed-arity set of differently-typed futures behind one
/// context object. Every slot is written exactly once, by the
/// continuation for that position, before being downcast back to its
/// known concrete type in `finish`. The macro below emits the downcast
/// call for each position since it alone knows each position's concrete
/// type.
type ErasedValue = Box<dyn Any + Send>;

struct HeterogeneousContext<E> {
    values: Mutex<Vec<Option<ErasedValue>>>,
    failures: Mutex<Vec<Option<Failure<E>>>>,
    remaining: AtomicUsize,
}

impl<E> HeterogeneousContext<E> {
    fn new(arity: usize) -> Self {
        HeterogeneousContext {
            values: Mutex::new((0..arity).map(|_| None).collect()),
            failures: Mutex::new((0..arity).map(|_| None).collect()),
            remaining: AtomicUsize::new(arity),
        }
    }

    fn resolve<T: Send + 'static>(&self, index: usize, outcome: Result<T, Failure<E>>) -> bool {
        match outcome {
            Ok(value) => {
                self.values.lock().unwrap()[index] = Some(Box::new(value));
            }
            Err(failure) => {
                self.failures.lock().unwrap()[index] = Some(failure);
            }
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    fn failures_or_total(&self) -> (Vec<(usize, Failure<E>)>, usize) {
        let failures = std::mem::take(&mut *self.failures.lock().unwrap());
        let total = failures.len();
        let collected = failures
            .into_iter()
            .enumerate()
            .filter_map(|(index, failure)| failure.map(|f| (index, f)))
            .collect();
        (collected, total)
    }

    fn take_value<T: Send + 'static>(&self, index: usize) -> T {
        self.values.lock().unwrap()[index]
            .take()
            .expect("value slot filled before countdown reached zero")
            .downcast::<T>()
            .map(|boxed| *boxed)
            .expect("heterogeneous when_all slot type mismatch")
    }
}

/// Generates a `when_allN` function fanning in `N` futures of
/// (possibly) distinct types into a single future of an `N`-tuple,
/// sharing one failure type `E` across all of them.
macro_rules! when_all_tuple {
    ($name:ident, $arity:expr, [$( ($idx:tt, $T:ident, $f:ident) ),+ $(,)?]) => {
        #[allow(clippy::too_many_arguments)]
        pub fn $name<$($T,)+ E>(
            $( $f: Future<$T, E>, )+
        ) -> Future<($($T,)+), AggregateFailure<E>>
        where
            $( $T: Send + 'static, )+
            E: Send + 'static,
        {
            let mut aggregate = Promise::<($($T,)+), AggregateFailure<E>>::new();
            let aggregate_future = aggregate.future().expect("freshly constructed promise");

            let context = std::sync::Arc::new(HeterogeneousContext::<E>::new($arity));
            let aggregate = std::sync::Arc::new(Mutex::new(Some(aggregate)));

            // Zero captures, so this closure is a ZST and `Copy`: every
            // settle_with closure below gets its own copy, but only the
            // one that observes the countdown reach zero ever calls it.
            let build_tuple = |ctx: &HeterogeneousContext<E>| -> ($($T,)+) {
                ( $( ctx.take_value::<$T>($idx), )+ )
            };

            $(
                {
                    let context = context.clone();
                    let aggregate = aggregate.clone();
                    $f.settle_with(move |outcome| {
                        if context.resolve::<$T>($idx, outcome) {
                            finish_heterogeneous(&context, &aggregate, build_tuple);
                        }
                    });
                }
            )+

            aggregate_future
        }
    };
}

fn finish_heterogeneous<E, Tuple>(
    context: &std::sync::Arc<HeterogeneousContext<E>>,
    aggregate: &std::sync::Arc<Mutex<Option<Promise<Tuple, AggregateFailure<E>>>>>,
    build: impl FnOnce(&HeterogeneousContext<E>) -> Tuple,
) {
    let mut promise = aggregate
        .lock()
        .unwrap()
        .take()
        .expect("whenall aggregate fulfilled more than once");

    let (failures, total) = context.failures_or_total();

    if failures.is_empty() {
        let _ = promise.set_value(build(context));
    } else {
        log::warn!("when_all: {} of {} children failed", failures.len(), total);
        let _ = promise.fulfill(Err(Failure::Failed(AggregateFailure::new(failures, total))));
    }
}

when_all_tuple!(when_all2, 2, [(0, T0, f0), (1, T1, f1)]);
when_all_tuple!(when_all3, 3, [(0, T0, f0), (1, T1, f1), (2, T2, f2)]);
when_all_tuple!(when_all4, 4, [(0, T0, f0), (1, T1, f1), (2, T2, f2), (3, T3, f3)]);
when_all_tuple!(
    when_all5,
    5,
    [(0, T0, f0), (1, T1, f1), (2, T2, f2), (3, T3, f3), (4, T4, f4)]
);
when_all_tuple!(
    when_all6,
    6,
    [
        (0, T0, f0),
        (1, T1, f1),
        (2, T2, f2),
        (3, T3, f3),
        (4, T4, f4),
        (5, T5, f5)
    ]
);
