//! # boostkern
//!
//! **Device kernels for the data-preparation stage of gradient boosting.**
//!
//! boostkern turns raw feature columns and query groupings into the inputs a
//! boosting trainer consumes: split borders, binarized and bit-packed feature
//! indices, and per-query statistics for ranking losses.
//!
//! ## Features
//!
//! - **Binarization**: median and uniform border finding, float bucketizing
//!   with optional gather and atomic merges, compressed-index writes
//! - **Query statistics**: group ids, query-end masks, in-group shuffle keys,
//!   grouped sampling weights, group mean/max removal
//! - **Serializable kernels**: every kernel is a plain descriptor encoded with
//!   bincode and executed on a numbered device stream
//! - **Simulated devices**: a host backend with per-device allocators, handle
//!   registries and one worker thread per stream
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use boostkern::prelude::*;
//!
//! let cluster = Cluster::new(ClusterConfig::with_devices(2))?;
//! let sizes = DeviceBuffer::from_slice(&cluster, Mapping::single(2, 0, 3)?, &[3, 2, 4])?;
//! let offsets = DeviceBuffer::from_slice(&cluster, Mapping::single(2, 0, 3)?, &[0, 3, 5])?;
//! let mut qids = DeviceBuffer::new(&cluster, Mapping::single(2, 0, 9)?)?;
//!
//! ops::compute_query_ids(&cluster, &sizes, &offsets, 0, &mut qids, DEFAULT_STREAM)?;
//! cluster.synchronize()?;
//! assert_eq!(qids.read()?, [0, 0, 0, 1, 1, 2, 2, 2, 2]);
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): data-parallel kernel bodies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod dtype;
pub mod error;
pub mod feature;
pub mod kernel;
pub mod ops;
pub mod options;
pub mod runtime;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::buffer::{
        BufferPtr, ConstPtr, DeviceBuffer, DeviceLocal, DistributedObject, HostPinned, Mapping,
    };
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::feature::PackedFeature;
    pub use crate::kernel::{Kernel, KernelTask, launch_kernels};
    pub use crate::ops::{self, DEFAULT_STREAM};
    pub use crate::options::{BinarizationOptions, BorderSelectionType, ClusterConfig};
    pub use crate::runtime::cpu::CpuRuntime;
    pub use crate::runtime::{Cluster, Device, Runtime, RuntimeClient};
}
