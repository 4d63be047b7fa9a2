//! User frame pool
//!
//! A bitmap allocator over one contiguous physical range, handing out
//! single 4 KiB frames for user pages. The demand-paging paths only need
//! [`FrameAllocator`]; [`FramePool`] is the implementation the kernel boots
//! with.

use alloc::{vec, vec::Vec};

use bitflags::bitflags;
use spin::{Mutex, Once};
use x86_64::{
    structures::paging::{PhysFrame, Size4KiB},
    PhysAddr,
};

use super::{PhysWindow, PAGE_SIZE};

bitflags! {
    /// Allocation request flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u8 {
        /// Frame backs a user page.
        const USER = 1 << 0;
        /// Frame must be zero-filled before it is returned.
        const ZERO = 1 << 1;
    }
}

/// Physical frame allocator used by the demand-paging paths.
///
/// Allocation never blocks: exhaustion is reported as `None` and the caller
/// decides what to kill.
pub trait FrameAllocator {
    fn allocate(&mut self, flags: AllocFlags) -> Option<PhysFrame>;

    fn free(&mut self, frame: PhysFrame);
}

/// Bitmap allocator over `[base, base + frames * PAGE_SIZE)`.
#[derive(Debug)]
pub struct FramePool {
    /// Bitmap tracking free frames (1 = free, 0 = allocated)
    bitmap: Vec<u64>,
    base: PhysFrame,
    total_frames: usize,
    free_frames: usize,
    window: PhysWindow,
}

impl FramePool {
    /// Create a pool over `frames` frames starting at `base`, zero-filling
    /// through `window`.
    pub fn new(base: PhysAddr, frames: usize, window: PhysWindow) -> Self {
        let mut bitmap = vec![u64::MAX; frames.div_ceil(64)];
        // Bits past the end of the range are never free.
        if frames % 64 != 0 {
            if let Some(last) = bitmap.last_mut() {
                *last = (1u64 << (frames % 64)) - 1;
            }
        }
        Self {
            bitmap,
            base: PhysFrame::containing_address(base),
            total_frames: frames,
            free_frames: frames,
            window,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    /// Frames currently handed out.
    pub fn outstanding(&self) -> usize {
        self.total_frames - self.free_frames
    }

    fn index_of(&self, frame: PhysFrame) -> Option<usize> {
        let start = self.base.start_address().as_u64();
        let addr = frame.start_address().as_u64();
        if addr < start {
            return None;
        }
        let index = ((addr - start) / PAGE_SIZE as u64) as usize;
        (index < self.total_frames).then_some(index)
    }
}

impl FrameAllocator for FramePool {
    fn allocate(&mut self, flags: AllocFlags) -> Option<PhysFrame> {
        let (word_idx, word) = self
            .bitmap
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != 0)?;
        let bit = word.trailing_zeros() as usize;
        *word &= !(1 << bit);
        self.free_frames -= 1;

        let frame = self.base + (word_idx * 64 + bit) as u64;
        if flags.contains(AllocFlags::ZERO) {
            // SAFETY: the frame was just taken out of the free bitmap, so no
            // one else refers to it, and the pool's range lies in the window.
            unsafe { self.window.frame_bytes(frame) }.fill(0);
        }
        Some(frame)
    }

    fn free(&mut self, frame: PhysFrame) {
        let Some(index) = self.index_of(frame) else {
            log::error!("freeing frame {:?} outside the user pool", frame);
            return;
        };
        let (word_idx, bit) = (index / 64, index % 64);
        if self.bitmap[word_idx] & (1 << bit) != 0 {
            log::error!("double free of frame {:?}", frame);
            return;
        }
        self.bitmap[word_idx] |= 1 << bit;
        self.free_frames += 1;
    }
}

static USER_POOL: Once<Mutex<FramePool>> = Once::new();

/// Install the global user pool. Later calls keep the first pool.
pub fn init_user_pool(pool: FramePool) {
    USER_POOL.call_once(|| Mutex::new(pool));
}

/// Handle to the global user pool.
///
/// The lock is taken per call, so nothing stays locked across an exit or a
/// panic on the fault path.
#[derive(Debug, Clone, Copy)]
pub struct SharedPool(&'static Mutex<FramePool>);

impl SharedPool {
    /// The global user pool, once [`init_user_pool`] has run.
    pub fn get() -> Option<Self> {
        USER_POOL.get().map(Self)
    }

    pub fn outstanding(&self) -> usize {
        self.0.lock().outstanding()
    }
}

impl FrameAllocator for SharedPool {
    fn allocate(&mut self, flags: AllocFlags) -> Option<PhysFrame> {
        self.0.lock().allocate(flags)
    }

    fn free(&mut self, frame: PhysFrame) {
        self.0.lock().free(frame)
    }
}

/// Adapter letting the x86_64 page-table code draw intermediate tables from
/// a [`FrameAllocator`].
pub struct TableFrames<'a>(pub &'a mut dyn FrameAllocator);

// SAFETY: frames come from the wrapped allocator, which hands each frame
// out at most once and zero-fills it as page tables require.
unsafe impl x86_64::structures::paging::FrameAllocator<Size4KiB> for TableFrames<'_> {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        self.0.allocate(AllocFlags::ZERO)
    }
}
