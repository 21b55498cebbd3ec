//! CPU runtime implementation
//!
//! Simulates a set of accelerator devices on the host. Each device gets its
//! own allocator, handle registry and a fixed number of numbered streams,
//! each backed by a worker thread. Kernel bodies live in [`kernels`] and use
//! rayon for data parallelism when the `rayon` feature is enabled.

mod client;
mod device;
pub mod kernels;
mod runtime;
mod stream;

pub use client::{CpuAllocator, CpuClient};
#[cfg(test)]
pub(crate) use client::create_cpu_allocator;
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
pub use stream::{Job, Stream, StreamQueue};
