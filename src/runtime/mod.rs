//! Runtime backends that execute kernels
//!
//! # Architecture
//!
//! ```text
//! Cluster (all devices of one training process)
//! └── Client (one per device, owns allocator + buffer registry)
//!     ├── Allocator (memory management with live-byte tracking)
//!     ├── BufferRegistry (handle id -> device memory)
//!     └── StreamQueue[n] (FIFO worker per numbered stream)
//!         └── Stream (what a running kernel sees)
//! ```
//!
//! The only backend is [`cpu`], which simulates accelerator devices with host
//! memory and one worker thread per stream.

mod allocator;
pub mod cluster;
pub mod cpu;
pub mod memory;

pub use allocator::{Allocator, DefaultAllocator};
pub use cluster::Cluster;
pub use memory::{BufferRegistry, DeviceMemory, DeviceView, DeviceViewMut, MemoryManager, ScratchBuffer};

use crate::error::Result;

/// Core trait for compute backends
///
/// It uses static dispatch via generics for zero-cost abstraction.
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Client for dispatching operations
    type Client: RuntimeClient<Self>;

    /// Memory allocator type
    type Allocator: Allocator;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Allocate zeroed device memory
    ///
    /// Returns a device pointer (u64). Zero-sized requests return 0.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device);

    /// Copy data from device to host
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device);
}

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Trait for runtime clients that handle operation dispatch
pub trait RuntimeClient<R: Runtime>: Clone + Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// Wait for all streams of the device and report the first failure
    fn synchronize(&self) -> Result<()>;

    /// Get the allocator for this client
    fn allocator(&self) -> &R::Allocator;
}
