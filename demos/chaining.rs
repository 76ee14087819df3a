//! Fulfills a promise on a background thread while the main thread
//! chains transforms onto its future and blocks for the final result.
//!
//! Run with: `cargo run --example chaining`

use std::thread;
use std::time::Duration;

use pledge::Promise;

fn main() {
    env_logger::init();

    let mut promise = Promise::<i32, &'static str>::new();
    let future = promise.future().expect("freshly constructed promise");

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        promise.set_value(4).expect("first and only fulfillment");
    });

    let chained = future
        .map(|x| x + 1)
        .map(|x| x * 10)
        .and_then(|x| pledge::Future::ready(x - 5));

    match chained.get() {
        Ok(value) => println!("chained result: {value}"),
        Err(failure) => println!("chain failed: {failure}"),
    }
}
