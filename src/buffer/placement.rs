//! Memory placement classes
//!
//! Placement is a type parameter on handles and buffers so a kernel that
//! expects pinned host memory cannot be handed a device-local buffer by
//! accident. The runtime value is [`PtrType`], checked again when a stream
//! resolves the handle.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Runtime tag of a placement class
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PtrType {
    /// Memory local to the accelerator
    #[default]
    DeviceLocal,
    /// Page-locked host memory visible to the accelerator
    HostPinned,
}

/// Type-level placement marker
pub trait MemoryPlacement: Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// Runtime tag for this placement
    const PTR_TYPE: PtrType;
}

/// Device-local memory
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceLocal;

/// Pinned host memory
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostPinned;

impl MemoryPlacement for DeviceLocal {
    const PTR_TYPE: PtrType = PtrType::DeviceLocal;
}

impl MemoryPlacement for HostPinned {
    const PTR_TYPE: PtrType = PtrType::HostPinned;
}
