//! Page registry (supplemental page table)
//!
//! Per-process records describing how each user page is populated on first
//! access, and whether it is resident yet. The executable loader fills the
//! registry when it maps a segment; the query layer flips `loaded` the one
//! time it faults a page in.

use alloc::collections::BTreeMap;

use x86_64::{structures::paging::Page, VirtAddr};

use super::{is_user_vaddr, user_page, PAGE_SIZE, USER_TOP};
use crate::error::{KernelError, KernelResult};

/// Handle to an open file in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// How a page's contents are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// `read_bytes` bytes from `file` at `offset`; the rest of the page is
    /// zero-filled.
    File {
        file: FileId,
        offset: u64,
        read_bytes: usize,
    },
    /// Zero-filled page.
    Zero,
}

/// Source of file-backed page contents (the loader's file system side).
pub trait BackingStore {
    /// Read into `buf` from `file` at `offset`, returning the bytes read.
    fn read_at(&mut self, file: FileId, offset: u64, buf: &mut [u8]) -> KernelResult<usize>;
}

/// Registry entry for one user page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRecord {
    pub backing: Backing,
    pub writable: bool,
    loaded: bool,
}

impl PageRecord {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Records keyed by user page.
#[derive(Debug, Default)]
pub struct PageRegistry {
    records: BTreeMap<Page, PageRecord>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Register a not-yet-resident page.
    pub fn insert(&mut self, page: Page, backing: Backing, writable: bool) -> KernelResult<()> {
        self.insert_record(page, backing, writable, false)
    }

    /// Register a page that was mapped eagerly (e.g. a stack page).
    pub fn insert_resident(
        &mut self,
        page: Page,
        backing: Backing,
        writable: bool,
    ) -> KernelResult<()> {
        self.insert_record(page, backing, writable, true)
    }

    fn insert_record(
        &mut self,
        page: Page,
        backing: Backing,
        writable: bool,
        loaded: bool,
    ) -> KernelResult<()> {
        if let Backing::File { read_bytes, .. } = backing {
            if read_bytes > PAGE_SIZE {
                return Err(KernelError::InvalidArgument {
                    name: "read_bytes",
                    value: "larger than a page",
                });
            }
        }
        if self.records.contains_key(&page) {
            return Err(KernelError::AlreadyExists {
                resource: "page record",
                id: page.start_address().as_u64(),
            });
        }
        self.records.insert(
            page,
            PageRecord {
                backing,
                writable,
                loaded,
            },
        );
        Ok(())
    }

    /// Register a loadable segment the way the executable loader lays it
    /// out: `read_bytes` bytes from `file` at `offset`, followed by
    /// `zero_bytes` zeroes, starting at page-aligned `upage`.
    ///
    /// Pages with nothing to read are registered as [`Backing::Zero`]. The
    /// whole segment must lie in user space and overlap no existing record;
    /// otherwise nothing is registered.
    pub fn register_segment(
        &mut self,
        upage: VirtAddr,
        file: FileId,
        mut offset: u64,
        mut read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> KernelResult<()> {
        let start = upage.as_u64();
        if start % PAGE_SIZE as u64 != 0 {
            return Err(KernelError::InvalidArgument {
                name: "upage",
                value: "not page aligned",
            });
        }
        let len = read_bytes
            .checked_add(zero_bytes)
            .ok_or(KernelError::InvalidArgument {
                name: "segment",
                value: "size overflows",
            })?;
        if len % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidArgument {
                name: "segment",
                value: "size is not a multiple of the page size",
            });
        }
        if offset.checked_add(read_bytes as u64).is_none() {
            return Err(KernelError::InvalidArgument {
                name: "offset",
                value: "file range overflows",
            });
        }
        let in_user_space = start
            .checked_add(len as u64)
            .is_some_and(|end| is_user_vaddr(start) && end <= USER_TOP);
        if !in_user_space {
            return Err(KernelError::InvalidArgument {
                name: "segment",
                value: "outside user space",
            });
        }

        let pages = len / PAGE_SIZE;
        if pages == 0 {
            return Ok(());
        }
        let first = user_page(start);
        let last = user_page(start + (len - PAGE_SIZE) as u64);
        if let Some((page, _)) = self.records.range(first..=last).next() {
            return Err(KernelError::AlreadyExists {
                resource: "page record",
                id: page.start_address().as_u64(),
            });
        }

        for index in 0..pages {
            let page = user_page(start + (index * PAGE_SIZE) as u64);
            let page_read = read_bytes.min(PAGE_SIZE);
            let backing = if page_read == 0 {
                Backing::Zero
            } else {
                Backing::File {
                    file,
                    offset,
                    read_bytes: page_read,
                }
            };
            self.insert(page, backing, writable)?;

            read_bytes -= page_read;
            offset += page_read as u64;
        }
        Ok(())
    }

    pub fn lookup(&self, page: Page) -> Option<&PageRecord> {
        self.records.get(&page)
    }

    /// Flag a page as resident. Returns `false` if there is no record.
    pub fn mark_loaded(&mut self, page: Page) -> bool {
        match self.records.get_mut(&page) {
            Some(record) => {
                debug_assert!(!record.loaded, "page {:?} loaded twice", page);
                record.loaded = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
