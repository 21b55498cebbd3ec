//! Host-side owner of a distributed device allocation

use super::mapping::Mapping;
use super::placement::{DeviceLocal, MemoryPlacement};
use super::ptr::{BufferPtr, ConstPtr};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::{BufferRegistry, Cluster, DeviceMemory, RuntimeClient};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

struct Slot {
    registry: Arc<BufferRegistry>,
    handle: u64,
    len: usize,
}

/// One allocation per device laid out by a [`Mapping`]
///
/// Host data passed to [`write`](Self::write) and returned by
/// [`read`](Self::read) is the device slices concatenated in device order.
/// Reads and writes do not wait for streams; synchronize first.
///
/// Dropping the buffer unregisters its handles. Kernels that already resolved
/// a handle keep the memory alive until they finish.
pub struct DeviceBuffer<T, P = DeviceLocal> {
    mapping: Mapping,
    slots: Vec<Slot>,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T: Element, P: MemoryPlacement> DeviceBuffer<T, P> {
    /// Allocate zeroed memory on every device the mapping covers
    pub fn new(cluster: &Cluster, mapping: Mapping) -> Result<Self> {
        if mapping.device_count() != cluster.device_count() {
            return Err(Error::invalid_argument(
                "mapping",
                format!(
                    "mapping spans {} devices, cluster has {}",
                    mapping.device_count(),
                    cluster.device_count()
                ),
            ));
        }

        let mut slots = Vec::with_capacity(mapping.device_count());
        for (device, &len) in mapping.sizes().iter().enumerate() {
            let client = cluster.device(device)?;
            let registry = Arc::clone(client.registry());
            let handle = if len == 0 {
                0
            } else {
                let size_bytes = len * T::DTYPE.size_in_bytes();
                let memory = DeviceMemory::allocate(client.allocator(), size_bytes, P::PTR_TYPE)?;
                registry.register(memory).0
            };
            slots.push(Slot {
                registry,
                handle,
                len,
            });
        }

        tracing::trace!(
            dtype = %T::DTYPE,
            placement = ?P::PTR_TYPE,
            sizes = ?mapping.sizes(),
            "allocated device buffer"
        );
        Ok(Self {
            mapping,
            slots,
            _marker: PhantomData,
        })
    }

    /// Allocate and upload `data`
    pub fn from_slice(cluster: &Cluster, mapping: Mapping, data: &[T]) -> Result<Self> {
        let buffer = Self::new(cluster, mapping)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Per-device layout
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Total element count over all devices
    pub fn len(&self) -> usize {
        self.mapping.total_len()
    }

    /// Returns true if no device holds data
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Devices holding at least one element
    pub fn non_empty_devices(&self) -> Vec<usize> {
        self.mapping.non_empty_devices()
    }

    /// Element count on `device`
    pub fn device_len(&self, device: usize) -> usize {
        self.mapping.size(device)
    }

    /// Mutable handle to the slice on `device`
    ///
    /// Handles are plain data and may be copied freely. A kernel that writes
    /// through one holds the allocation exclusively while it runs, and
    /// descriptors whose output shares an allocation with another argument
    /// fail validation.
    pub fn device_ptr(&self, device: usize) -> Result<BufferPtr<T, P>> {
        let slot = self.slot(device)?;
        Ok(BufferPtr::new(device, slot.handle, 0, slot.len))
    }

    /// Read-only handle to the slice on `device`
    pub fn const_ptr(&self, device: usize) -> Result<ConstPtr<T, P>> {
        self.device_ptr(device).map(ConstPtr::from)
    }

    /// Upload the concatenated device slices
    ///
    /// Each copy waits for kernels running on that allocation but is not
    /// ordered against queued ones; synchronize the cluster first.
    pub fn write(&self, data: &[T]) -> Result<()> {
        if data.len() != self.len() {
            return Err(Error::invalid_argument(
                "data",
                format!("expected {} elements, got {}", self.len(), data.len()),
            ));
        }
        let mut rest = data;
        for device in 0..self.slots.len() {
            let (head, tail) = rest.split_at(self.slots[device].len);
            self.write_device(device, head)?;
            rest = tail;
        }
        Ok(())
    }

    /// Upload the slice of one device
    pub fn write_device(&self, device: usize, data: &[T]) -> Result<()> {
        let slot = self.slot(device)?;
        if data.len() != slot.len {
            return Err(Error::invalid_argument(
                "data",
                format!(
                    "device {device} holds {} elements, got {}",
                    slot.len,
                    data.len()
                ),
            ));
        }
        match slot.memory()? {
            Some(memory) => memory.write_bytes(0, bytemuck::cast_slice(data)),
            None => Ok(()),
        }
    }

    /// Download the concatenated device slices
    pub fn read(&self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.len());
        for device in 0..self.slots.len() {
            out.extend(self.read_device(device)?);
        }
        Ok(out)
    }

    /// Download the slice of one device
    pub fn read_device(&self, device: usize) -> Result<Vec<T>> {
        let slot = self.slot(device)?;
        let mut out = vec![T::zeroed(); slot.len];
        if let Some(memory) = slot.memory()? {
            memory.read_bytes(0, bytemuck::cast_slice_mut(&mut out))?;
        }
        Ok(out)
    }

    fn slot(&self, device: usize) -> Result<&Slot> {
        self.slots.get(device).ok_or_else(|| {
            Error::invalid_argument(
                "device",
                format!("device {device} out of range for {} devices", self.slots.len()),
            )
        })
    }
}

impl Slot {
    fn memory(&self) -> Result<Option<Arc<DeviceMemory>>> {
        if self.len == 0 {
            return Ok(None);
        }
        self.registry
            .get(self.handle)
            .map(Some)
            .ok_or(Error::BufferReleased {
                handle: self.handle,
            })
    }
}

impl<T, P> Drop for DeviceBuffer<T, P> {
    fn drop(&mut self) {
        for slot in &self.slots {
            if slot.handle != 0 {
                slot.registry.release(slot.handle);
            }
        }
    }
}

impl<T: Element, P: MemoryPlacement> fmt::Debug for DeviceBuffer<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("dtype", &T::DTYPE)
            .field("placement", &P::PTR_TYPE)
            .field("sizes", &self.mapping.sizes())
            .finish()
    }
}
