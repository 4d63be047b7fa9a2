//! Kernel heap allocator
//!
//! The page registry and address-space descriptors live on the kernel heap.
//! On bare metal the heap is a `linked_list_allocator` region handed over by
//! [`crate::bootstrap::init`].

use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand the heap region to the global allocator.
///
/// # Safety
///
/// `start..start + size` must be mapped, writable, unused memory that stays
/// reserved for the heap, and this must be called at most once.
pub unsafe fn init(start: *mut u8, size: usize) {
    // SAFETY: forwarded from the caller's contract.
    unsafe { ALLOCATOR.lock().init(start, size) };
}
