//! Two batches of counters sharing the global scheduler.

use coroutines::{current_id, finish, initialize_scheduler, live_count, spawn, yield_now};

fn counter(n: usize) -> impl FnOnce() {
    move || {
        for i in 0..n {
            println!("[{}] {}", current_id(), i);
            yield_now();
        }
    }
}

fn main() {
    initialize_scheduler();
    println!("[{}]", current_id());

    spawn(counter(5));
    spawn(counter(10));
    while live_count() > 1 {
        yield_now();
    }

    spawn(counter(4));
    spawn(counter(2));
    spawn(counter(5));
    while live_count() > 1 {
        yield_now();
    }

    finish();
}
