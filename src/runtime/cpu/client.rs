//! CPU client and allocator implementation

use super::device::CpuDevice;
use super::runtime::CpuRuntime;
use super::stream::{Stream, StreamQueue};
use crate::error::{Error, Result};
use crate::runtime::memory::{BufferRegistry, MemoryManager};
use crate::runtime::{DefaultAllocator, Device, Runtime, RuntimeClient};
use std::sync::Arc;

/// Per-device client: allocator, handle registry and streams
#[derive(Clone, Debug)]
pub struct CpuClient {
    pub(crate) device: CpuDevice,
    allocator: CpuAllocator,
    registry: Arc<BufferRegistry>,
    streams: Arc<Vec<StreamQueue>>,
}

impl CpuClient {
    /// Create a client with `stream_count` numbered streams
    pub fn new(device: CpuDevice, stream_count: u32) -> Result<Self> {
        let allocator = create_cpu_allocator(device.clone());
        let registry = Arc::new(BufferRegistry::new(device.id()));
        let streams = (0..stream_count)
            .map(|index| {
                StreamQueue::spawn(Stream::new(index, Arc::clone(&registry), allocator.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            device,
            allocator,
            registry,
            streams: Arc::new(streams),
        })
    }

    /// Handle registry of this device
    pub fn registry(&self) -> &Arc<BufferRegistry> {
        &self.registry
    }

    /// Number of streams
    pub fn stream_count(&self) -> u32 {
        self.streams.len() as u32
    }

    /// Stream queue by number
    pub fn queue(&self, index: u32) -> Result<&StreamQueue> {
        self.streams.get(index as usize).ok_or_else(|| {
            Error::invalid_argument(
                "stream",
                format!(
                    "device {} has {} streams, got index {index}",
                    self.device.id(),
                    self.streams.len()
                ),
            )
        })
    }

    /// Scratch allocator on this device
    pub fn memory_manager(&self) -> MemoryManager {
        MemoryManager::new(self.allocator.clone())
    }
}

impl RuntimeClient<CpuRuntime> for CpuClient {
    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn synchronize(&self) -> Result<()> {
        let mut first = None;
        for queue in self.streams.iter() {
            if let Err(err) = queue.synchronize() {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn allocator(&self) -> &CpuAllocator {
        &self.allocator
    }
}

/// CPU-specific allocator type alias
pub type CpuAllocator = DefaultAllocator<CpuDevice>;

/// Create a CPU allocator for the given device
pub(crate) fn create_cpu_allocator(device: CpuDevice) -> CpuAllocator {
    DefaultAllocator::new(device, CpuRuntime::allocate, CpuRuntime::deallocate)
}
