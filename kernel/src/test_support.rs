//! Host-side test doubles
//!
//! Frames and page tables live in a page-aligned host allocation reached
//! through the same [`PhysWindow`] offset the kernel uses for RAM, so the
//! real frame pool and x86_64 page-table code run unmodified.

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    any::Any,
    cell::RefCell,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use x86_64::{
    structures::paging::{Page, PhysFrame},
    PhysAddr, VirtAddr,
};

use crate::{
    arch::Cpu,
    error::{KernelError, KernelResult},
    mm::{
        AddressSpace, AllocFlags, BackingStore, FileId, FrameAllocator, FramePool, OffsetMapper,
        PageMapper, PhysWindow, PAGE_SIZE,
    },
    process::{CurrentProcess, ProcessMemory},
};

/// Physical address the arena pretends to start at.
const ARENA_BASE: u64 = 0x10_0000;

/// Page-aligned host memory standing in for a range of physical frames.
pub struct Arena {
    ptr: *mut u8,
    layout: Layout,
    frames: usize,
}

impl Arena {
    pub fn new(frames: usize) -> Self {
        let layout = Layout::from_size_align(frames.max(1) * PAGE_SIZE, PAGE_SIZE).unwrap();
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "arena allocation failed");
        Self {
            ptr,
            layout,
            frames,
        }
    }

    /// Arena that lives for the rest of the test run, for global state.
    pub fn leaked(frames: usize) -> &'static Self {
        Box::leak(Box::new(Self::new(frames)))
    }

    pub fn base(&self) -> PhysAddr {
        PhysAddr::new(ARENA_BASE)
    }

    pub fn window(&self) -> PhysWindow {
        PhysWindow::new(VirtAddr::new(self.ptr as u64 - ARENA_BASE))
    }

    /// A fresh pool over every frame of the arena.
    pub fn pool(&self) -> FramePool {
        FramePool::new(self.base(), self.frames, self.window())
    }

    /// Contents of an arena frame.
    #[allow(clippy::mut_from_ref)]
    pub fn bytes(&self, frame: PhysFrame) -> &mut [u8] {
        let addr = frame.start_address().as_u64();
        assert!(
            addr >= ARENA_BASE && addr < ARENA_BASE + (self.frames * PAGE_SIZE) as u64,
            "frame {:?} is outside the arena",
            frame
        );
        // SAFETY: the frame lies inside the arena allocation; tests only
        // hold one view of a frame at a time.
        unsafe { self.window().frame_bytes(frame) }
    }

    /// Address space over real x86_64 page tables built inside the arena.
    pub fn address_space(&self, pool: &mut dyn FrameAllocator) -> AddressSpace {
        let pml4 = pool
            .allocate(AllocFlags::ZERO)
            .expect("no frame for the PML4");
        // SAFETY: the PML4 frame is zeroed, lives in the arena, and the
        // window covers every frame the pool can hand out.
        let mapper = unsafe { OffsetMapper::new(pml4, self.window()) };
        AddressSpace::new(Box::new(mapper))
    }

    /// Process memory over a [`MockMapper`] that snapshots frame contents
    /// at install time. The returned mapper shares state with the one
    /// inside the address space.
    pub fn process_memory(&self) -> (ProcessMemory, MockMapper) {
        let mapper = MockMapper::with_window(self.window());
        let memory = ProcessMemory::new(AddressSpace::new(Box::new(mapper.clone())));
        (memory, mapper)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// Observable CPU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEvent {
    Enable,
    ReadFaultAddress { masked: bool },
}

/// CPU whose fault address is fixed and whose interrupt flag is a field.
#[derive(Debug)]
pub struct MockCpu {
    pub enabled: bool,
    pub fault_addr: u64,
    pub events: Vec<CpuEvent>,
}

impl MockCpu {
    /// CPU as it is on page-fault entry: interrupts masked.
    pub fn masked(fault_addr: u64) -> Self {
        Self {
            enabled: false,
            fault_addr,
            events: Vec::new(),
        }
    }

    pub fn unmasked() -> Self {
        Self {
            enabled: true,
            fault_addr: 0,
            events: Vec::new(),
        }
    }
}

impl Cpu for MockCpu {
    fn interrupts_enabled(&self) -> bool {
        self.enabled
    }

    fn enable_interrupts(&mut self) {
        self.enabled = true;
        self.events.push(CpuEvent::Enable);
    }

    fn read_fault_address(&mut self) -> u64 {
        self.events.push(CpuEvent::ReadFaultAddress {
            masked: !self.enabled,
        });
        self.fault_addr
    }
}

/// A mapping as the mapper saw it when it was installed.
#[derive(Debug, Clone)]
pub struct Installed {
    pub frame: PhysFrame,
    pub writable: bool,
    /// Frame contents at install time (empty without a window).
    pub contents: Vec<u8>,
}

#[derive(Debug, Default)]
struct MapperState {
    window: Option<PhysWindow>,
    maps: BTreeMap<Page, Installed>,
    fail_installs: bool,
}

/// In-memory page table with failure injection. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMapper {
    state: Rc<RefCell<MapperState>>,
}

impl MockMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: PhysWindow) -> Self {
        let mapper = Self::new();
        mapper.state.borrow_mut().window = Some(window);
        mapper
    }

    /// Make every following install fail.
    pub fn fail_installs(&self, fail: bool) {
        self.state.borrow_mut().fail_installs = fail;
    }

    pub fn installed(&self, page: Page) -> Option<Installed> {
        self.state.borrow().maps.get(&page).cloned()
    }

    pub fn mapped(&self) -> usize {
        self.state.borrow().maps.len()
    }
}

impl PageMapper for MockMapper {
    fn install(
        &mut self,
        page: Page,
        frame: PhysFrame,
        writable: bool,
        _tables: &mut dyn FrameAllocator,
    ) -> KernelResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_installs {
            return Err(KernelError::OutOfMemory {
                requested: PAGE_SIZE,
                available: 0,
            });
        }
        if state.maps.contains_key(&page) {
            return Err(KernelError::AlreadyExists {
                resource: "page mapping",
                id: page.start_address().as_u64(),
            });
        }
        let contents = state
            .window
            // SAFETY: test frames come from an arena the window covers.
            .map(|window| unsafe { window.frame_bytes(frame) }.to_vec())
            .unwrap_or_default();
        state.maps.insert(
            page,
            Installed {
                frame,
                writable,
                contents,
            },
        );
        Ok(())
    }

    fn translate(&self, page: Page) -> Option<PhysFrame> {
        self.state.borrow().maps.get(&page).map(|m| m.frame)
    }
}

/// Backing store over in-memory files.
#[derive(Debug, Default)]
pub struct MemStore {
    files: BTreeMap<FileId, Vec<u8>>,
    pub fail_reads: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: FileId, contents: Vec<u8>) {
        self.files.insert(file, contents);
    }
}

impl BackingStore for MemStore {
    fn read_at(&mut self, file: FileId, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        if self.fail_reads {
            return Err(KernelError::IoError {
                operation: "read_at",
            });
        }
        let data = self.files.get(&file).ok_or(KernelError::NotFound {
            resource: "file",
            id: u64::from(file.0),
        })?;
        let start = (offset as usize).min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        Ok(len)
    }
}

/// Payload of the panic a [`MockProcess`] raises when it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit(pub i32);

/// Current process whose exit unwinds out of the trap.
pub struct MockProcess {
    pub name: String,
    pub memory: ProcessMemory,
    pub files: BTreeMap<i32, Vec<u8>>,
}

impl MockProcess {
    pub fn new(name: &str, memory: ProcessMemory) -> Self {
        Self {
            name: name.into(),
            memory,
            files: BTreeMap::new(),
        }
    }

    pub fn open_file(&mut self, fd: i32) {
        self.files.insert(fd, Vec::new());
    }
}

impl CurrentProcess for MockProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn memory(&mut self) -> &mut ProcessMemory {
        &mut self.memory
    }

    fn write_file(&mut self, fd: i32, bytes: &[u8]) -> Option<usize> {
        let file = self.files.get_mut(&fd)?;
        file.extend_from_slice(bytes);
        Some(bytes.len())
    }

    fn exit(&mut self, status: i32) -> ! {
        panic::panic_any(ProcessExit(status))
    }
}

/// Run `f`, which must end with the current process exiting, and return
/// the exit status.
pub fn expect_exit(f: impl FnOnce()) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => panic!("process did not exit"),
        Err(payload) => exit_status(payload),
    }
}

fn exit_status(payload: Box<dyn Any + Send>) -> i32 {
    match payload.downcast::<ProcessExit>() {
        Ok(exit) => exit.0,
        Err(other) => panic::resume_unwind(other),
    }
}
