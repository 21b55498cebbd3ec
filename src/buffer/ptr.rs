//! Serializable device handles

use super::placement::{DeviceLocal, MemoryPlacement};
use crate::dtype::{DType, Element};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Device allocation a handle resolves to
///
/// Streams lock memory per allocation, so two handles conflict when they name
/// the same allocation even if their element ranges are disjoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// Device the memory lives on
    pub device: usize,
    /// Registry id on that device
    pub handle: u64,
}

/// Typed, mutable handle to a slice of device memory
///
/// A handle is plain data: device id, registry id, element offset and length.
/// It never owns memory; the stream that runs a kernel resolves it through
/// the device's buffer registry.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BufferPtr<T, P = DeviceLocal> {
    device: usize,
    handle: u64,
    offset: usize,
    len: usize,
    #[serde(skip)]
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T: Element, P: MemoryPlacement> BufferPtr<T, P> {
    pub(crate) fn new(device: usize, handle: u64, offset: usize, len: usize) -> Self {
        Self {
            device,
            handle,
            offset,
            len,
            _marker: PhantomData,
        }
    }

    /// Device the memory lives on
    #[inline]
    pub fn device(&self) -> usize {
        self.device
    }

    /// Registry id of the allocation
    #[inline]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Element offset inside the allocation
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the handle covers no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Allocation locked when a kernel resolves this handle; `None` if empty
    #[inline]
    pub fn allocation(&self) -> Option<Allocation> {
        (self.len > 0).then_some(Allocation {
            device: self.device,
            handle: self.handle,
        })
    }

    /// Sub-range `[start, start + len)` of this handle
    ///
    /// # Panics
    /// If the range does not fit in the handle.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "slice [{start}, +{len}) out of range for handle of {} elements",
            self.len
        );
        Self::new(self.device, self.handle, self.offset + start, len)
    }

    /// Read-only view of the same memory
    #[inline]
    pub fn as_const(&self) -> ConstPtr<T, P> {
        ConstPtr(*self)
    }
}

impl<T, P> Clone for BufferPtr<T, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, P> Copy for BufferPtr<T, P> {}

impl<T, P> PartialEq for BufferPtr<T, P> {
    fn eq(&self, other: &Self) -> bool {
        (self.device, self.handle, self.offset, self.len)
            == (other.device, other.handle, other.offset, other.len)
    }
}

impl<T, P> Eq for BufferPtr<T, P> {}

impl<T: Element, P: MemoryPlacement> fmt::Debug for BufferPtr<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPtr")
            .field("dtype", &T::DTYPE)
            .field("placement", &P::PTR_TYPE)
            .field("device", &self.device)
            .field("handle", &self.handle)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Read-only handle; a kernel may not write through it
#[derive(Serialize, Deserialize)]
#[serde(bound = "", transparent)]
pub struct ConstPtr<T, P = DeviceLocal>(BufferPtr<T, P>);

impl<T: Element, P: MemoryPlacement> ConstPtr<T, P> {
    /// Device the memory lives on
    #[inline]
    pub fn device(&self) -> usize {
        self.0.device
    }

    /// Registry id of the allocation
    #[inline]
    pub fn handle(&self) -> u64 {
        self.0.handle
    }

    /// Element offset inside the allocation
    #[inline]
    pub fn offset(&self) -> usize {
        self.0.offset
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    /// Returns true if the handle covers no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.len == 0
    }

    /// Allocation locked when a kernel resolves this handle; `None` if empty
    #[inline]
    pub fn allocation(&self) -> Option<Allocation> {
        self.0.allocation()
    }
}

impl<T, P> Clone for ConstPtr<T, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, P> Copy for ConstPtr<T, P> {}

impl<T, P> PartialEq for ConstPtr<T, P> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T, P> Eq for ConstPtr<T, P> {}

impl<T: Element, P: MemoryPlacement> fmt::Debug for ConstPtr<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConstPtr").field(&self.0).finish()
    }
}

impl<T, P> From<BufferPtr<T, P>> for ConstPtr<T, P> {
    fn from(ptr: BufferPtr<T, P>) -> Self {
        Self(ptr)
    }
}
