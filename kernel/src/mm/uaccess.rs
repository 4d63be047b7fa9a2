//! Kernel access to user memory
//!
//! User pointers handed to the kernel are checked page by page through the
//! query layer, which faults in registered pages that are not loaded yet.
//! Bytes are copied through the physical memory window, never by
//! dereferencing the user address.

use super::{is_user_vaddr, pagedir::Pager, user_page, PAGE_SIZE};
use crate::{error::FaultError, process::ProcessMemory};

/// Copy `buf.len()` bytes starting at user address `addr` into `buf`.
pub fn copy_from_user(
    pager: &mut Pager<'_>,
    memory: &mut ProcessMemory,
    addr: u64,
    buf: &mut [u8],
) -> Result<(), FaultError> {
    let mut copied = 0;
    while copied < buf.len() {
        let cursor = addr
            .checked_add(copied as u64)
            .ok_or(FaultError::KernelAddress { addr })?;
        if !is_user_vaddr(cursor) {
            return Err(FaultError::KernelAddress { addr: cursor });
        }

        let page = user_page(cursor);
        if let super::Residency::Unavailable(err) = pager.resolve(memory, page) {
            return Err(err);
        }
        let frame = memory
            .address_space
            .translate(page)
            .ok_or(FaultError::NoBacking { addr: cursor })?;

        let offset = (cursor - page.start_address().as_u64()) as usize;
        let len = (PAGE_SIZE - offset).min(buf.len() - copied);
        // SAFETY: the frame is mapped in the current process and only read
        // here; the trap core never hands out a second mutable view of it
        // while a system call runs.
        let bytes = unsafe { pager.window.frame_bytes(frame) };
        buf[copied..copied + len].copy_from_slice(&bytes[offset..offset + len]);
        copied += len;
    }
    Ok(())
}

/// Read one little-endian 64-bit word from user memory.
pub fn read_user_u64(
    pager: &mut Pager<'_>,
    memory: &mut ProcessMemory,
    addr: u64,
) -> Result<u64, FaultError> {
    let mut word = [0u8; 8];
    copy_from_user(pager, memory, addr, &mut word)?;
    Ok(u64::from_le_bytes(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mm::{Backing, FileId, USER_TOP},
        test_support::{Arena, MemStore},
    };

    #[test]
    fn test_copy_spans_lazy_pages() {
        let arena = Arena::new(4);
        let mut pool = arena.pool();
        let mut store = MemStore::new();
        store.add_file(FileId(1), alloc::vec![b'x'; 2 * PAGE_SIZE]);
        let (mut memory, _mapper) = arena.process_memory();
        memory
            .pages
            .register_segment(
                x86_64::VirtAddr::new(0x40_0000),
                FileId(1),
                0,
                2 * PAGE_SIZE,
                0,
                false,
            )
            .unwrap();
        let mut pager = Pager::new(&mut pool, &mut store, arena.window());

        let mut buf = [0u8; 32];
        copy_from_user(&mut pager, &mut memory, 0x40_1000 - 16, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == b'x'));
        assert!(memory.pages.lookup(user_page(0x40_0000)).unwrap().is_loaded());
        assert!(memory.pages.lookup(user_page(0x40_1000)).unwrap().is_loaded());
        drop(pager);
        assert_eq!(pool.outstanding(), 2);
    }

    #[test]
    fn test_read_word() {
        let arena = Arena::new(2);
        let mut pool = arena.pool();
        let mut store = MemStore::new();
        let (mut memory, _mapper) = arena.process_memory();
        memory
            .pages
            .insert(user_page(0x40_0000), Backing::Zero, true)
            .unwrap();
        let mut pager = Pager::new(&mut pool, &mut store, arena.window());

        assert_eq!(read_user_u64(&mut pager, &mut memory, 0x40_0008), Ok(0));
    }

    #[test]
    fn test_bad_pointers_are_rejected() {
        let arena = Arena::new(2);
        let mut pool = arena.pool();
        let mut store = MemStore::new();
        let (mut memory, _mapper) = arena.process_memory();
        let mut pager = Pager::new(&mut pool, &mut store, arena.window());

        let mut buf = [0u8; 4];
        assert_eq!(
            copy_from_user(&mut pager, &mut memory, 0, &mut buf),
            Err(FaultError::KernelAddress { addr: 0 })
        );
        assert_eq!(
            copy_from_user(&mut pager, &mut memory, USER_TOP - 2, &mut buf),
            Err(FaultError::NoBacking {
                addr: USER_TOP - PAGE_SIZE as u64
            })
        );
        assert_eq!(
            copy_from_user(&mut pager, &mut memory, 0x40_0000, &mut buf),
            Err(FaultError::NoBacking { addr: 0x40_0000 })
        );
    }
}
