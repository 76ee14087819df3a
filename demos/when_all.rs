//! Fans three futures in with `when_all`, one of which fails, and
//! prints the resulting aggregate.
//!
//! Run with: `cargo run --example when_all`

use std::thread;
use std::time::Duration;

use pledge::{when_all, Promise};

fn main() {
    env_logger::init();

    let mut p1 = Promise::<i32, &'static str>::new();
    let mut p2 = Promise::<i32, &'static str>::new();
    let mut p3 = Promise::<i32, &'static str>::new();

    let f1 = p1.future().expect("freshly constructed promise");
    let f2 = p2.future().expect("freshly constructed promise");
    let f3 = p3.future().expect("freshly constructed promise");

    let all = when_all(vec![f1, f2, f3]);

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        p1.set_value(10).expect("first and only fulfillment");
    });
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        p2.set_exception("connection reset").expect("first and only fulfillment");
    });
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        p3.set_value(30).expect("first and only fulfillment");
    });

    match all.get() {
        Ok(values) => println!("all succeeded: {values:?}"),
        Err(failure) => {
            let aggregate = failure.into_inner().expect("when_all only fails with an aggregate");
            println!("{} of {} children failed:", aggregate.failures.len(), aggregate.total());
            for (index, child) in &aggregate.failures {
                println!("  [{index}] {child}");
            }
        }
    }
}
