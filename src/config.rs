/// Stack size used when none is configured.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a coroutine may be given; smaller requests are raised to it.
pub const MIN_STACK_SIZE: usize = 4 * 1024;

/// Alignment of every stack buffer, and the granularity of its size.
pub const STACK_ALIGN: usize = 16;

/// Settings fixed for the lifetime of one scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    stack_size: usize,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        SchedulerConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Sets the size of every coroutine stack. The value is raised to
    /// [`MIN_STACK_SIZE`] and rounded up to a multiple of [`STACK_ALIGN`].
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// The stack size buffers will actually be allocated with.
    pub fn effective_stack_size(&self) -> usize {
        let size = self.stack_size.max(MIN_STACK_SIZE);
        assert!(
            size <= isize::MAX as usize - STACK_ALIGN,
            "stack size {} is too large",
            size
        );
        (size + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
