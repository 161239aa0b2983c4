extern crate alloc;

use crate::config::STACK_ALIGN;
use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use alloc::vec::Vec;
use core::ptr::NonNull;

/// A fixed-size region one coroutine runs on.
///
/// The buffer is released when dropped; nothing else frees it.
pub(crate) struct StackBuffer {
    base: NonNull<u8>,
    layout: Layout,
}

impl StackBuffer {
    /// Allocates a new stack. Running out of memory aborts the process, a
    /// coroutine can not exist without its stack.
    pub fn allocate(size: usize) -> Self {
        let layout =
            Layout::from_size_align(size, STACK_ALIGN).expect("stack size overflows a layout");
        let base = match NonNull::new(unsafe { alloc(layout) }) {
            Some(base) => base,
            None => handle_alloc_error(layout),
        };
        StackBuffer { base, layout }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// One past the highest address of the buffer. Stacks grow down from
    /// here, and it is always `STACK_ALIGN` aligned.
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.layout.size()) }
    }
}

impl Drop for StackBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Counters describing a scheduler's stack usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackStats {
    /// Size in bytes of every stack buffer.
    pub stack_size: usize,
    /// Buffers obtained from the allocator since the scheduler was created.
    pub allocated: usize,
    /// Buffers of finished coroutines waiting to be reused.
    pub retained: usize,
    /// Spawns that were served from a retained buffer.
    pub reused: usize,
}

/// Hands out stack buffers, preferring ones left behind by finished
/// coroutines over fresh allocations.
pub(crate) struct StackPool {
    stack_size: usize,
    retained: Vec<StackBuffer>,
    allocated: usize,
    reused: usize,
}

impl StackPool {
    pub fn new(stack_size: usize) -> Self {
        StackPool {
            stack_size,
            retained: Vec::new(),
            allocated: 0,
            reused: 0,
        }
    }

    pub fn acquire(&mut self) -> StackBuffer {
        if let Some(stack) = self.retained.pop() {
            self.reused += 1;
            log::trace!("reusing retained stack, {} left", self.retained.len());
            return stack;
        }
        self.allocated += 1;
        log::trace!("allocating stack #{} of {} bytes", self.allocated, self.stack_size);
        StackBuffer::allocate(self.stack_size)
    }

    /// Keeps a finished coroutine's buffer for a later `acquire`.
    pub fn retain(&mut self, stack: StackBuffer) {
        debug_assert_eq!(stack.len(), self.stack_size);
        self.retained.push(stack);
    }

    /// Gives every retained buffer back to the allocator.
    pub fn release_all(&mut self) {
        self.retained.clear();
    }

    pub fn stats(&self) -> StackStats {
        StackStats {
            stack_size: self.stack_size,
            allocated: self.allocated,
            retained: self.retained.len(),
            reused: self.reused,
        }
    }
}
