extern crate alloc;

use crate::context::SavedState;
use crate::stack::{StackBuffer, StackPool, StackStats};
use alloc::vec::Vec;
use core::fmt;

/// Identifier of a coroutine. The root context is always `CoroutineId::ROOT`;
/// spawned coroutines count up from 1 and ids are never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoroutineId(u64);

impl CoroutineId {
    pub const ROOT: CoroutineId = CoroutineId(0);

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    Running,
    Suspended,
}

/// Everything needed to resume one coroutine.
pub(crate) struct ExecutionState {
    saved: SavedState,
    // None for the root, which runs on the host's own stack.
    stack: Option<StackBuffer>,
    id: CoroutineId,
    state: RunState,
}

/// Live coroutines in scheduling order. Slot 0 is the root for as long as
/// the registry is up.
pub(crate) struct Registry {
    live: Vec<ExecutionState>,
    current: usize,
    next_id: u64,
    stacks: StackPool,
}

impl Registry {
    pub fn new(stack_size: usize) -> Self {
        let root = ExecutionState {
            saved: SavedState::UNSET,
            stack: None,
            id: CoroutineId::ROOT,
            state: RunState::Running,
        };
        let mut live = Vec::new();
        live.push(root);
        Registry {
            live,
            current: 0,
            next_id: 1,
            stacks: StackPool::new(stack_size),
        }
    }

    /// Panics once the root has torn the registry down.
    fn assert_up(&self) {
        assert!(!self.live.is_empty(), "scheduler has been torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.live.is_empty()
    }

    pub fn current_id(&self) -> CoroutineId {
        self.assert_up();
        self.live[self.current].id
    }

    pub fn live_count(&self) -> usize {
        self.assert_up();
        self.live.len()
    }

    pub fn is_root_current(&self) -> bool {
        self.current_id().is_root()
    }

    pub fn stack_stats(&self) -> StackStats {
        self.stacks.stats()
    }

    /// A stack for the next coroutine, reused when one is retained.
    pub fn acquire_stack(&mut self) -> StackBuffer {
        self.assert_up();
        self.stacks.acquire()
    }

    /// Appends a primed coroutine behind every live one.
    pub fn insert(&mut self, saved: SavedState, stack: StackBuffer) -> CoroutineId {
        self.assert_up();
        let id = CoroutineId(self.next_id);
        self.next_id += 1;
        self.live.push(ExecutionState {
            saved,
            stack: Some(stack),
            id,
            state: RunState::Suspended,
        });
        id
    }

    /// Records `saved` for the running coroutine and moves on to the next
    /// one, wrapping around to the root. Returns the state to resume.
    pub fn advance(&mut self, saved: SavedState) -> SavedState {
        self.assert_up();
        let from = &mut self.live[self.current];
        from.saved = saved;
        from.state = RunState::Suspended;
        let from_id = from.id;

        self.current = (self.current + 1) % self.live.len();
        let to = &mut self.live[self.current];
        to.state = RunState::Running;
        log::trace!("switch {} -> {}", from_id, to.id);
        debug_assert!(to.saved.is_set());
        to.saved
    }

    /// Drops the running coroutine from the schedule, keeping its stack for
    /// reuse, and returns the state of the coroutine that takes its turn.
    ///
    /// The stack goes back to the pool while it is still in use; the caller
    /// must resume the returned state before anything can acquire it.
    pub fn retire_current(&mut self) -> SavedState {
        self.assert_up();
        assert!(self.current != 0, "the root context can not be retired");
        let finished = self.live.remove(self.current);
        debug_assert_eq!(finished.state, RunState::Running);
        if let Some(stack) = finished.stack {
            self.stacks.retain(stack);
        }

        self.current %= self.live.len();
        let to = &mut self.live[self.current];
        to.state = RunState::Running;
        log::trace!("coroutine {} finished, switch to {}", finished.id, to.id);
        to.saved
    }

    /// Ends the registry. Must be called by the root; coroutines that are
    /// still suspended are abandoned and their stacks released.
    pub fn teardown(&mut self) {
        self.assert_up();
        assert!(self.current == 0, "only the root context can tear down");
        if self.live.len() > 1 {
            log::warn!(
                "tearing down with {} coroutine(s) still suspended",
                self.live.len() - 1
            );
        }
        self.live.clear();
        self.current = 0;
        self.stacks.release_all();
        log::debug!("scheduler torn down after {} spawn(s)", self.next_id - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(n: usize) -> SavedState {
        SavedState::from_raw((n * 16) as *mut usize)
    }

    fn spawn_fake(registry: &mut Registry, n: usize) -> CoroutineId {
        let stack = registry.acquire_stack();
        registry.insert(fake(n), stack)
    }

    #[test]
    fn starts_with_root() {
        let registry = Registry::new(4096);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.current_id(), CoroutineId::ROOT);
        assert!(registry.is_root_current());
    }

    #[test]
    fn ids_count_up_from_one() {
        let mut registry = Registry::new(4096);
        let ids: Vec<_> = (1..=3).map(|n| spawn_fake(&mut registry, n)).collect();
        assert_eq!(
            ids.iter().map(|id| id.as_u64()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(registry.live_count(), 4);
    }

    #[test]
    fn advance_is_round_robin() {
        let mut registry = Registry::new(4096);
        spawn_fake(&mut registry, 1);
        spawn_fake(&mut registry, 2);

        assert_eq!(registry.advance(fake(10)), fake(1));
        assert_eq!(registry.current_id().as_u64(), 1);
        assert_eq!(registry.advance(fake(11)), fake(2));
        assert_eq!(registry.current_id().as_u64(), 2);
        assert_eq!(registry.advance(fake(12)), fake(10));
        assert!(registry.is_root_current());
        assert_eq!(registry.advance(fake(13)), fake(11));
    }

    #[test]
    fn advance_with_only_root_resumes_root() {
        let mut registry = Registry::new(4096);
        assert_eq!(registry.advance(fake(5)), fake(5));
        assert!(registry.is_root_current());
    }

    #[test]
    fn retire_keeps_order_and_retains_stack() {
        let mut registry = Registry::new(4096);
        for n in 1..=3 {
            spawn_fake(&mut registry, n);
        }
        registry.advance(fake(10));
        registry.advance(fake(1));
        assert_eq!(registry.current_id().as_u64(), 2);

        // 2 goes away, 3 takes its turn
        assert_eq!(registry.retire_current(), fake(3));
        assert_eq!(registry.current_id().as_u64(), 3);
        assert_eq!(registry.live_count(), 3);
        assert_eq!(registry.stack_stats().retained, 1);

        // then 3 goes away and the turn wraps to the root
        assert_eq!(registry.retire_current(), fake(10));
        assert!(registry.is_root_current());
        assert_eq!(registry.stack_stats().retained, 2);
    }

    #[test]
    fn reused_stack_gets_fresh_id() {
        let mut registry = Registry::new(4096);
        spawn_fake(&mut registry, 1);
        registry.advance(fake(10));
        registry.retire_current();

        let id = spawn_fake(&mut registry, 2);
        assert_eq!(id.as_u64(), 2);
        let stats = registry.stack_stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    #[should_panic(expected = "root context can not be retired")]
    fn root_is_not_retired() {
        let mut registry = Registry::new(4096);
        registry.retire_current();
    }

    #[test]
    fn teardown_releases_everything() {
        let mut registry = Registry::new(4096);
        spawn_fake(&mut registry, 1);
        spawn_fake(&mut registry, 2);
        registry.advance(fake(10));
        registry.retire_current();
        registry.advance(fake(2));
        assert!(registry.is_root_current());

        registry.teardown();
        assert!(registry.is_torn_down());
        assert_eq!(registry.stack_stats().retained, 0);
    }

    #[test]
    #[should_panic(expected = "torn down")]
    fn use_after_teardown_panics() {
        let mut registry = Registry::new(4096);
        registry.teardown();
        registry.live_count();
    }
}
