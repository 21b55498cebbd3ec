//! Device memory, the per-device handle registry and scratch allocation
//!
//! Kernel descriptors never carry pointers. They carry registry ids that the
//! executing stream resolves into an `Arc<DeviceMemory>`. Once resolved, the
//! memory stays alive until the kernel drops its view, even if the owning
//! buffer is released in the meantime.
//!
//! Every allocation carries a reader-writer lock. Typed views and host copies
//! hold it for as long as they touch the memory, so a host upload never races
//! a kernel and two streams never write the same allocation at once.

use super::Allocator;
use super::cpu::{CpuAllocator, CpuRuntime};
use crate::buffer::PtrType;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One raw allocation on a device, freed on drop
#[derive(Debug)]
pub struct DeviceMemory {
    ptr: u64,
    size_bytes: usize,
    placement: PtrType,
    allocator: CpuAllocator,
    access: Arc<RwLock<()>>,
}

impl DeviceMemory {
    /// Allocate `size_bytes` of zeroed memory
    pub fn allocate(allocator: &CpuAllocator, size_bytes: usize, placement: PtrType) -> Result<Self> {
        let ptr = allocator.allocate(size_bytes)?;
        Ok(Self {
            ptr,
            size_bytes,
            placement,
            allocator: allocator.clone(),
            access: Arc::new(RwLock::new(())),
        })
    }

    /// Raw device address (0 for empty allocations)
    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Allocation size in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Placement class the memory was allocated with
    pub fn placement(&self) -> PtrType {
        self.placement
    }

    /// Shared access for a reading kernel; waits while a writer holds it
    ///
    /// Recursive so that one kernel may read the same allocation twice.
    pub(crate) fn lock_shared(&self) -> ArcRwLockReadGuard<RawRwLock, ()> {
        self.access.read_arc_recursive()
    }

    /// Exclusive access for a writing kernel
    ///
    /// Blocks forever if the calling thread already holds this allocation.
    pub(crate) fn lock_exclusive(&self) -> ArcRwLockWriteGuard<RawRwLock, ()> {
        self.access.write_arc()
    }

    /// Copy host bytes into the allocation at `offset_bytes`
    ///
    /// Waits for kernels that currently read or write the allocation.
    pub fn write_bytes(&self, offset_bytes: usize, src: &[u8]) -> Result<()> {
        self.check_range(offset_bytes, src.len())?;
        if src.is_empty() {
            return Ok(());
        }
        let _access = self.access.write();
        CpuRuntime::copy_to_device(src, self.ptr + offset_bytes as u64, self.allocator.device());
        Ok(())
    }

    /// Copy bytes at `offset_bytes` out to the host
    ///
    /// Waits for a kernel that currently writes the allocation.
    pub fn read_bytes(&self, offset_bytes: usize, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset_bytes, dst.len())?;
        if dst.is_empty() {
            return Ok(());
        }
        let _access = self.access.read();
        CpuRuntime::copy_from_device(self.ptr + offset_bytes as u64, dst, self.allocator.device());
        Ok(())
    }

    fn check_range(&self, offset_bytes: usize, len_bytes: usize) -> Result<()> {
        match offset_bytes.checked_add(len_bytes) {
            Some(end) if end <= self.size_bytes => Ok(()),
            _ => Err(Error::invalid_argument(
                "range",
                format!(
                    "bytes [{offset_bytes}, +{len_bytes}) exceed allocation of {}",
                    self.size_bytes
                ),
            )),
        }
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        self.allocator.deallocate(self.ptr, self.size_bytes);
    }
}

/// Maps handle ids to live allocations of one device
#[derive(Debug)]
pub struct BufferRegistry {
    device: usize,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<u64, Arc<DeviceMemory>>>,
}

impl BufferRegistry {
    /// Empty registry for `device`
    pub fn new(device: usize) -> Self {
        Self {
            device,
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Device the registry belongs to
    pub fn device(&self) -> usize {
        self.device
    }

    /// Register an allocation and return its handle id
    pub fn register(&self, memory: DeviceMemory) -> (u64, Arc<DeviceMemory>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let memory = Arc::new(memory);
        self.buffers.lock().insert(id, Arc::clone(&memory));
        (id, memory)
    }

    /// Look up a handle
    pub fn get(&self, id: u64) -> Option<Arc<DeviceMemory>> {
        if id == 0 {
            return None;
        }
        self.buffers.lock().get(&id).cloned()
    }

    /// Drop the registry's reference to a handle
    pub fn release(&self, id: u64) -> bool {
        self.buffers.lock().remove(&id).is_some()
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn checked_view<T: Element>(memory: Option<&Arc<DeviceMemory>>, offset: usize, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let size = std::mem::size_of::<T>();
    let end = offset
        .checked_add(len)
        .and_then(|end| end.checked_mul(size));
    let available = memory.map_or(0, |m| m.size_bytes());
    match end {
        Some(end) if end <= available => Ok(()),
        _ => Err(Error::invalid_argument(
            "handle",
            format!(
                "view of {len} {} at offset {offset} exceeds allocation of {available} bytes",
                T::DTYPE
            ),
        )),
    }
}

/// Read-only typed view of device memory held by a running kernel
///
/// Holds shared access to the allocation until dropped.
#[derive(Debug)]
pub struct DeviceView<T> {
    memory: Option<Arc<DeviceMemory>>,
    offset: usize,
    len: usize,
    _access: Option<ArcRwLockReadGuard<RawRwLock, ()>>,
    _marker: PhantomData<T>,
}

impl<T: Element> DeviceView<T> {
    pub(crate) fn new(memory: Option<Arc<DeviceMemory>>, offset: usize, len: usize) -> Result<Self> {
        checked_view::<T>(memory.as_ref(), offset, len)?;
        let access = memory.as_ref().map(|m| m.lock_shared());
        Ok(Self {
            memory,
            offset,
            len,
            _access: access,
            _marker: PhantomData,
        })
    }
}

impl<T: Element> Deref for DeviceView<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.memory {
            // SAFETY: bounds were checked against the allocation in `new`, the
            // allocation is 64-byte aligned, kept alive by the Arc and held
            // shared until the view drops.
            Some(memory) if self.len > 0 => unsafe {
                std::slice::from_raw_parts((memory.ptr() as *const T).add(self.offset), self.len)
            },
            _ => &[],
        }
    }
}

/// Mutable typed view of device memory held by a running kernel
///
/// Holds exclusive access to the allocation until dropped, so no other view
/// or host copy of the allocation exists meanwhile.
#[derive(Debug)]
pub struct DeviceViewMut<T> {
    memory: Option<Arc<DeviceMemory>>,
    offset: usize,
    len: usize,
    _access: Option<ArcRwLockWriteGuard<RawRwLock, ()>>,
    _marker: PhantomData<T>,
}

impl<T: Element> DeviceViewMut<T> {
    pub(crate) fn new(memory: Option<Arc<DeviceMemory>>, offset: usize, len: usize) -> Result<Self> {
        checked_view::<T>(memory.as_ref(), offset, len)?;
        let access = memory.as_ref().map(|m| m.lock_exclusive());
        Ok(Self {
            memory,
            offset,
            len,
            _access: access,
            _marker: PhantomData,
        })
    }

    fn base(&self) -> Option<*mut T> {
        match &self.memory {
            Some(memory) if self.len > 0 => {
                // SAFETY: offset is inside the allocation (checked in `new`)
                Some(unsafe { (memory.ptr() as *mut T).add(self.offset) })
            }
            _ => None,
        }
    }
}

impl DeviceViewMut<u32> {
    /// View the words as atomics for concurrent bit merges
    pub fn as_atomic(&self) -> &[AtomicU32] {
        match self.base() {
            // SAFETY: AtomicU32 has the same size and alignment as u32
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr as *const AtomicU32, self.len) },
            None => &[],
        }
    }
}

impl<T: Element> Deref for DeviceViewMut<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self.base() {
            // SAFETY: see `DeviceView::deref`
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr, self.len) },
            None => &[],
        }
    }
}

impl<T: Element> DerefMut for DeviceViewMut<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self.base() {
            // SAFETY: see `DeviceView::deref`; the write guard makes this the
            // only live view of the allocation
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr, self.len) },
            None => &mut [],
        }
    }
}

/// Zeroed scratch memory owned by one kernel invocation
#[derive(Debug)]
pub struct ScratchBuffer<T> {
    memory: Option<DeviceMemory>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Default for ScratchBuffer<T> {
    fn default() -> Self {
        Self {
            memory: None,
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: Element> ScratchBuffer<T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Scratch contents
    pub fn as_slice(&self) -> &[T] {
        match &self.memory {
            // SAFETY: the allocation holds exactly `len` elements
            Some(m) if self.len > 0 => unsafe { std::slice::from_raw_parts(m.ptr() as *const T, self.len) },
            _ => &[],
        }
    }

    /// Mutable scratch contents
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &self.memory {
            // SAFETY: the allocation holds exactly `len` elements and is owned here
            Some(m) if self.len > 0 => unsafe { std::slice::from_raw_parts_mut(m.ptr() as *mut T, self.len) },
            _ => &mut [],
        }
    }
}

/// Per-invocation scratch allocator handed to `Kernel::prepare_context`
#[derive(Clone, Debug)]
pub struct MemoryManager {
    allocator: CpuAllocator,
}

impl MemoryManager {
    /// Manager allocating from `allocator`
    pub fn new(allocator: CpuAllocator) -> Self {
        Self { allocator }
    }

    /// Allocate `count` zeroed elements that live as long as the returned buffer
    pub fn allocate<T: Element>(&self, count: usize) -> Result<ScratchBuffer<T>> {
        let size_bytes = count
            .checked_mul(T::DTYPE.size_in_bytes())
            .ok_or(Error::OutOfMemory { size: usize::MAX })?;
        tracing::trace!(count, dtype = %T::DTYPE, "allocating scratch");
        let memory = DeviceMemory::allocate(&self.allocator, size_bytes, PtrType::DeviceLocal)?;
        Ok(ScratchBuffer {
            memory: Some(memory),
            len: count,
            _marker: PhantomData,
        })
    }

    /// Bytes currently held by the underlying allocator
    pub fn allocated_bytes(&self) -> usize {
        self.allocator.allocated_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, create_cpu_allocator};

    fn allocator() -> CpuAllocator {
        create_cpu_allocator(CpuDevice::new(0))
    }

    #[test]
    fn test_scratch_is_zeroed_and_freed() {
        let alloc = allocator();
        let manager = MemoryManager::new(alloc.clone());
        {
            let mut scratch = manager.allocate::<f32>(16).unwrap();
            assert_eq!(scratch.len(), 16);
            assert!(scratch.as_slice().iter().all(|&v| v == 0.0));
            scratch.as_mut_slice()[3] = 2.5;
            assert_eq!(scratch.as_slice()[3], 2.5);
            assert_eq!(alloc.allocated_bytes(), 64);
        }
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn test_registry_keeps_resolved_memory_alive() {
        let alloc = allocator();
        let registry = BufferRegistry::new(0);
        let memory = DeviceMemory::allocate(&alloc, 16, PtrType::DeviceLocal).unwrap();
        let (id, _) = registry.register(memory);

        let resolved = registry.get(id).unwrap();
        assert!(registry.release(id));
        assert!(registry.get(id).is_none());
        assert_eq!(alloc.allocated_bytes(), 16);

        drop(resolved);
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn test_view_bounds_checked() {
        let alloc = allocator();
        let memory = Arc::new(DeviceMemory::allocate(&alloc, 16, PtrType::DeviceLocal).unwrap());
        assert!(DeviceView::<u32>::new(Some(Arc::clone(&memory)), 0, 4).is_ok());
        assert!(DeviceView::<u32>::new(Some(Arc::clone(&memory)), 1, 4).is_err());
        assert!(DeviceView::<u64>::new(Some(memory), 0, 3).is_err());
        assert!(DeviceView::<u64>::new(None, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_host_write_waits_for_writing_view() {
        use std::sync::atomic::AtomicBool;
        use std::thread;
        use std::time::Duration;

        let alloc = allocator();
        let memory = Arc::new(DeviceMemory::allocate(&alloc, 8, PtrType::DeviceLocal).unwrap());
        let mut view = DeviceViewMut::<u32>::new(Some(Arc::clone(&memory)), 0, 2).unwrap();
        let written = Arc::new(AtomicBool::new(false));

        let writer = thread::spawn({
            let memory = Arc::clone(&memory);
            let written = Arc::clone(&written);
            move || {
                memory.write_bytes(0, bytemuck::cast_slice(&[7u32, 8])).unwrap();
                written.store(true, Ordering::SeqCst);
            }
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!written.load(Ordering::SeqCst));
        view[0] = 1;
        drop(view);

        writer.join().unwrap();
        let mut out = [0u32; 2];
        memory.read_bytes(0, bytemuck::cast_slice_mut(&mut out)).unwrap();
        assert_eq!(out, [7, 8]);
    }

    #[test]
    fn test_one_kernel_may_read_an_allocation_twice() {
        let alloc = allocator();
        let memory = Arc::new(DeviceMemory::allocate(&alloc, 16, PtrType::DeviceLocal).unwrap());
        let head = DeviceView::<u32>::new(Some(Arc::clone(&memory)), 0, 2).unwrap();
        let tail = DeviceView::<u32>::new(Some(memory), 2, 2).unwrap();
        assert_eq!(head.len() + tail.len(), 4);
    }

    #[test]
    fn test_atomic_view_matches_plain_view() {
        let alloc = allocator();
        let memory = Arc::new(DeviceMemory::allocate(&alloc, 8, PtrType::DeviceLocal).unwrap());
        let view = DeviceViewMut::<u32>::new(Some(memory), 0, 2).unwrap();
        view.as_atomic()[1].fetch_or(0b101, Ordering::Relaxed);
        assert_eq!(&view[..], &[0, 0b101]);
    }
}
