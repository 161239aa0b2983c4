extern crate alloc;

use crate::config::SchedulerConfig;
use crate::context::{InitialFrame, SavedState};
use crate::registry::{CoroutineId, Registry};
use crate::stack::StackStats;
use crate::{coroutines_finish_trampoline, coroutines_resume, coroutines_suspend};
use alloc::boxed::Box;
use core::ffi::c_void;
use core::marker::PhantomPinned;
use core::pin::Pin;
use spin::Mutex;

/// A set of coroutines sharing one thread, resumed in round-robin order.
///
/// Created already running its root context (id 0), which is whoever called
/// [`Scheduler::new`]. The scheduler is pinned because every coroutine stack
/// keeps its address; it must outlive all of them and must not be dropped
/// from inside a coroutine.
pub struct Scheduler {
    // 同一时刻只有一个协程在运行, 锁从不跨越一次切换持有
    registry: Mutex<Registry>,
    _pin: PhantomPinned,
}

/// What a fresh coroutine's entry shim receives in its first argument.
struct Launch {
    scheduler: *const Scheduler,
    body: Box<dyn FnOnce(&Scheduler)>,
}

impl Scheduler {
    /// Initializes a scheduler with the default configuration.
    pub fn new() -> Pin<Box<Self>> {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Pin<Box<Self>> {
        let stack_size = config.effective_stack_size();
        log::debug!("scheduler initialized, stack size {}", stack_size);
        Box::pin(Scheduler {
            registry: Mutex::new(Registry::new(stack_size)),
            _pin: PhantomPinned,
        })
    }

    /// Spawns a coroutine that calls `entry(scheduler, argument)`.
    ///
    /// The coroutine is appended to the schedule and first runs when the
    /// round robin reaches it. Returning from `entry` finishes it.
    pub fn spawn<T: 'static>(&self, entry: fn(&Scheduler, T), argument: T) -> CoroutineId {
        self.spawn_with(move |scheduler| entry(scheduler, argument))
    }

    /// Spawns a coroutine running `body`.
    pub fn spawn_with<F>(&self, body: F) -> CoroutineId
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        let mut registry = self.registry.lock();
        // panics after teardown while `body` is still owned here and dropped
        let mut stack = registry.acquire_stack();

        let launch = Box::new(Launch {
            scheduler: self,
            body: Box::new(body),
        });
        let frame = InitialFrame::new(
            coroutine_main as *const () as usize,
            Box::into_raw(launch) as usize,
            coroutines_finish_trampoline as *const () as usize,
        );
        let saved = frame.prime(&mut stack);
        let id = registry.insert(saved, stack);
        log::trace!("spawn coroutine {}, {} live", id, registry.live_count());
        id
    }

    /// Suspends the running coroutine and resumes the next live one. Returns
    /// once the round robin comes back around.
    pub fn yield_now(&self) {
        // fail here rather than inside the switch
        assert!(
            !self.registry.lock().is_torn_down(),
            "scheduler has been torn down"
        );
        unsafe { coroutines_suspend(self as *const Self as *const c_void) }
    }

    /// Ends the running coroutine.
    ///
    /// From a spawned coroutine this never returns: its stack is kept for
    /// reuse and the next live coroutine is resumed. Values owned by the
    /// coroutine's frames are leaked, not dropped. From the root it tears the
    /// scheduler down and returns; any coroutine still suspended is abandoned.
    pub fn finish(&self) {
        if self.registry.lock().is_root_current() {
            self.registry.lock().teardown();
            return;
        }
        self.exit_current()
    }

    fn exit_current(&self) -> ! {
        let next = self.registry.lock().retire_current();
        // 当前栈已回到空闲链表, 这之后不能再使用它上面的任何值
        unsafe { coroutines_resume(next) }
    }

    /// Id of the running coroutine; `CoroutineId::ROOT` for the root.
    pub fn current_id(&self) -> CoroutineId {
        self.registry.lock().current_id()
    }

    /// Number of live coroutines, the root included.
    pub fn live_count(&self) -> usize {
        self.registry.lock().live_count()
    }

    /// Yields until the root is the only live coroutine left.
    pub fn run(&self) {
        log::trace!("run until {} coroutine(s) finish", self.live_count() - 1);
        while self.live_count() > 1 {
            self.yield_now();
        }
    }

    pub fn stack_stats(&self) -> StackStats {
        self.registry.lock().stack_stats()
    }

    /// Whether the root has already called [`Scheduler::finish`].
    pub fn is_torn_down(&self) -> bool {
        self.registry.lock().is_torn_down()
    }
}

/// Entry shim every fresh stack resumes into. Its return value lands in rax
/// for `coroutines_finish_trampoline`.
extern "C" fn coroutine_main(launch: *mut Launch) -> *const Scheduler {
    let Launch { scheduler, body } = *unsafe { Box::from_raw(launch) };
    body(unsafe { &*scheduler });
    scheduler
}

/// Advance step of `coroutines_suspend`: `saved` is the stack of the
/// coroutine that just suspended.
pub(crate) extern "C" fn switch_from(scheduler: *const c_void, saved: SavedState) -> ! {
    let scheduler = unsafe { &*(scheduler as *const Scheduler) };
    let next = scheduler.registry.lock().advance(saved);
    unsafe { coroutines_resume(next) }
}

/// Reached when a coroutine's entry returns normally.
pub(crate) extern "C" fn finish_from_trampoline(scheduler: *const c_void) -> ! {
    let scheduler = unsafe { &*(scheduler as *const Scheduler) };
    scheduler.exit_current()
}

#[cfg(feature = "global")]
mod global {
    use super::Scheduler;
    use crate::registry::CoroutineId;
    use alloc::boxed::Box;
    use core::pin::Pin;
    use lazy_static::*;
    use spin::Mutex;
    use std::thread::{self, ThreadId};

    /// The process-wide scheduler and the thread allowed to drive it.
    struct GlobalScheduler {
        scheduler: Pin<Box<Scheduler>>,
        owner: ThreadId,
    }

    // 只有 owner 线程能拿到 scheduler, 见 with_global
    unsafe impl Send for GlobalScheduler {}

    lazy_static! {
        static ref GLOBAL_SCHEDULER: Mutex<Option<GlobalScheduler>> = Mutex::new(None);
    }

    /// Runs `f` on the global scheduler without holding the lock, `f` may
    /// switch coroutines. Panics on any thread but the initializing one.
    fn with_global<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
        let scheduler = {
            let global = GLOBAL_SCHEDULER.lock();
            let global = global
                .as_ref()
                .expect("initialize_scheduler() has not been called");
            assert!(
                global.owner == thread::current().id(),
                "global scheduler used from a thread other than the one that initialized it"
            );
            &*global.scheduler as *const Scheduler
        };
        f(unsafe { &*scheduler })
    }

    /// Creates the process-wide scheduler, with the caller as its root.
    ///
    /// Only the calling thread may use the global functions afterwards; they
    /// panic on any other thread until the root calls [`finish`].
    pub fn initialize_scheduler() {
        let mut global = GLOBAL_SCHEDULER.lock();
        assert!(global.is_none(), "scheduler already initialized");
        *global = Some(GlobalScheduler {
            scheduler: Scheduler::new(),
            owner: thread::current().id(),
        });
    }

    /// Spawns a coroutine on the global scheduler.
    pub fn spawn(f: impl FnOnce() + 'static) -> CoroutineId {
        with_global(|scheduler| scheduler.spawn_with(move |_| f()))
    }

    pub fn yield_now() {
        with_global(Scheduler::yield_now)
    }

    /// Ends the running coroutine. Called by the root it tears the global
    /// scheduler down so it can be initialized again.
    pub fn finish() {
        if !with_global(Scheduler::current_id).is_root() {
            with_global(Scheduler::finish);
            unreachable!();
        }
        let taken = GLOBAL_SCHEDULER.lock().take();
        if let Some(GlobalScheduler { scheduler, .. }) = taken {
            scheduler.finish();
        }
    }

    pub fn current_id() -> CoroutineId {
        with_global(Scheduler::current_id)
    }

    pub fn live_count() -> usize {
        with_global(Scheduler::live_count)
    }
}

#[cfg(feature = "global")]
pub use global::{current_id, finish, initialize_scheduler, live_count, spawn, yield_now};
