use coroutines::Scheduler;
use std::cell::Cell;
use std::rc::Rc;

#[test]
pub fn basic_test() {
    let scheduler = Scheduler::new();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    scheduler.spawn_with(move |_| hello(&flag));
    scheduler.run();
    assert!(ran.get());
    scheduler.finish();
    assert!(scheduler.is_torn_down());
}

pub fn hello(ran: &Cell<bool>) {
    println!("hello world!");
    ran.set(true);
}
