//! Memory allocator traits and default implementation
//!
//! Allocators hand out raw device addresses (`u64`) and keep a running count
//! of live bytes so callers can check that per-invocation scratch memory is
//! released.

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory allocator trait for runtime backends
pub trait Allocator: Clone + Send + Sync {
    /// Allocate zeroed memory of given size
    ///
    /// Returns a device pointer (u64). Zero-sized requests return 0.
    fn allocate(&self, size_bytes: usize) -> Result<u64>;

    /// Deallocate memory
    fn deallocate(&self, ptr: u64, size_bytes: usize);

    /// Get the total allocated bytes
    fn allocated_bytes(&self) -> usize {
        0 // Default: tracking not supported
    }
}

/// Default allocator that delegates to Runtime methods
///
/// Clones share the same live-byte counter.
#[derive(Clone, Debug)]
pub struct DefaultAllocator<D> {
    device: D,
    allocate_fn: fn(usize, &D) -> Result<u64>,
    deallocate_fn: fn(u64, usize, &D),
    live_bytes: Arc<AtomicUsize>,
}

impl<D: Clone + Send + Sync> DefaultAllocator<D> {
    /// Create a new default allocator
    pub fn new(
        device: D,
        allocate_fn: fn(usize, &D) -> Result<u64>,
        deallocate_fn: fn(u64, usize, &D),
    ) -> Self {
        Self {
            device,
            allocate_fn,
            deallocate_fn,
            live_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the device this allocator is associated with
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: Clone + Send + Sync> Allocator for DefaultAllocator<D> {
    fn allocate(&self, size_bytes: usize) -> Result<u64> {
        let ptr = (self.allocate_fn)(size_bytes, &self.device)?;
        if ptr != 0 {
            self.live_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        }
        Ok(ptr)
    }

    fn deallocate(&self, ptr: u64, size_bytes: usize) {
        if ptr == 0 {
            return;
        }
        (self.deallocate_fn)(ptr, size_bytes, &self.device);
        self.live_bytes.fetch_sub(size_bytes, Ordering::Relaxed);
    }

    fn allocated_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_alloc(size: usize, _dev: &()) -> Result<u64> {
        Ok(if size == 0 { 0 } else { 0x1000 })
    }

    fn fake_dealloc(_ptr: u64, _size: usize, _dev: &()) {}

    #[test]
    fn test_default_allocator_trait_bounds() {
        fn assert_allocator<A: Allocator>() {}
        assert_allocator::<DefaultAllocator<()>>();
    }

    #[test]
    fn test_live_bytes_shared_between_clones() {
        let alloc = DefaultAllocator::new((), fake_alloc, fake_dealloc);
        let other = alloc.clone();

        let ptr = alloc.allocate(64).unwrap();
        assert_eq!(other.allocated_bytes(), 64);

        other.deallocate(ptr, 64);
        assert_eq!(alloc.allocated_bytes(), 0);

        assert_eq!(alloc.allocate(0).unwrap(), 0);
        assert_eq!(alloc.allocated_bytes(), 0);
    }
}
