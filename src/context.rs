//! Saved execution states and the synthetic first frame of a new coroutine.
//!
//! A suspended coroutine's stack looks like this, from the saved stack
//! pointer upwards:
//!
//! ```text
//! r15 r14 r13 r12 rbp rbx rdi <resume address>
//! ```
//!
//! `coroutines_suspend` pushes that image and `coroutines_resume` pops it. A
//! fresh stack is primed with an [`InitialFrame`] holding the same image, so
//! resume can not tell the two apart.

use crate::stack::StackBuffer;
use core::mem::size_of;
use core::ptr;

/// Stack pointer of a suspended coroutine. Only meaningful to
/// `coroutines_resume`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SavedState(*mut usize);

impl SavedState {
    /// Placeholder for the root context, which is running when the scheduler
    /// is created and gets a real state on its first suspend.
    pub const UNSET: SavedState = SavedState(ptr::null_mut());

    pub fn is_set(&self) -> bool {
        !self.0.is_null()
    }

    #[cfg(test)]
    pub fn from_raw(sp: *mut usize) -> Self {
        SavedState(sp)
    }

    #[cfg(test)]
    pub fn as_ptr(&self) -> *mut usize {
        self.0
    }
}

/// The register image `coroutines_resume` expects, in pop order, followed by
/// the two return addresses a fresh coroutine unwinds through.
#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct InitialFrame {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub rbp: usize,
    pub rbx: usize,
    /// First argument of `entry`.
    pub rdi: usize,
    /// Where the final `ret` of the resume lands.
    pub entry: usize,
    /// Return address of `entry`.
    pub finish: usize,
}

const _: () = assert!(size_of::<InitialFrame>() == 9 * size_of::<usize>());

impl InitialFrame {
    pub fn new(entry: usize, argument: usize, finish: usize) -> Self {
        InitialFrame {
            rdi: argument,
            entry,
            finish,
            ..Default::default()
        }
    }

    /// Writes the frame at the top of `stack` and returns the state that
    /// starts it.
    ///
    /// The frame ends flush with the 16-byte aligned top, which leaves the
    /// `finish` slot eight bytes off alignment: `entry` starts with the stack
    /// pointer where a `call` would have left it.
    pub fn prime(self, stack: &mut StackBuffer) -> SavedState {
        let top = stack.top() as usize;
        let frame = (top - size_of::<InitialFrame>()) as *mut InitialFrame;
        debug_assert_eq!(unsafe { ptr::addr_of!((*frame).finish) } as usize % 16, 8);
        unsafe {
            frame.write(self);
        }
        SavedState(frame as *mut usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primed_frame_matches_resume_layout() {
        let mut stack = StackBuffer::allocate(4096);
        let top = stack.top() as usize;
        let state = InitialFrame::new(0x1111, 0x2222, 0x3333).prime(&mut stack);
        assert!(state.is_set());

        let words = unsafe { core::slice::from_raw_parts(state.as_ptr(), 9) };
        assert_eq!(&words[..6], &[0; 6]);
        assert_eq!(words[6], 0x2222);
        assert_eq!(words[7], 0x1111);
        assert_eq!(words[8], 0x3333);

        let finish_slot = state.as_ptr() as usize + 8 * size_of::<usize>();
        assert_eq!(finish_slot, top - size_of::<usize>());
        assert_eq!(finish_slot % 16, 8);
    }

    #[test]
    fn unset_state() {
        assert!(!SavedState::UNSET.is_set());
        assert!(SavedState::from_raw(8 as *mut usize).is_set());
    }
}
