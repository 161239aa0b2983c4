//! Stackful coroutines scheduled round robin on a single thread.
//!
//! Every coroutine owns a fixed-size stack. Control moves only at
//! [`Scheduler::yield_now`] and [`Scheduler::finish`]; the scheduler then
//! resumes the next live coroutine in insertion order, the root context
//! (id 0) included.
//!
//! Without the `global` feature the crate is `no_std` and needs only `alloc`.
//! The global functions need `std` to pin the process-wide scheduler to the
//! thread that initialized it.

#![cfg_attr(not(any(test, feature = "global")), no_std)]

extern crate alloc;

#[cfg(not(all(target_arch = "x86_64", unix, not(target_vendor = "apple"))))]
compile_error!("coroutines only supports x86_64 System V ELF targets");

use core::arch::global_asm;
use core::ffi::c_void;

global_asm!(
    include_str!("switch.S"),
    advance = sym runtime::switch_from,
    finish = sym runtime::finish_from_trampoline,
);

extern "C" {
    pub(crate) fn coroutines_suspend(scheduler: *const c_void);
    pub(crate) fn coroutines_resume(saved: context::SavedState) -> !;
    pub(crate) fn coroutines_finish_trampoline();
}

mod config;
mod context;
mod registry;
mod runtime;
mod stack;

pub use config::{SchedulerConfig, DEFAULT_STACK_SIZE, MIN_STACK_SIZE, STACK_ALIGN};
pub use registry::CoroutineId;
pub use runtime::Scheduler;
pub use stack::StackStats;

#[cfg(feature = "global")]
pub use runtime::{current_id, finish, initialize_scheduler, live_count, spawn, yield_now};
