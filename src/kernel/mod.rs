//! Kernel descriptors and their transport
//!
//! # Architecture
//!
//! ```text
//! ops::remove_query_means(...)            host, typed entry point
//!          │ build one descriptor per non-empty device
//!          ▼
//! launch_kernels()                         validate + check invariants on all
//!          │ KernelTask::encode -> bytes
//!          ▼
//! StreamQueue::enqueue(job)                returns immediately
//!          │ worker: KernelTask::decode
//!          ▼
//! Kernel::prepare_context -> Kernel::run  on the device stream
//! ```
//!
//! A descriptor is plain data: buffer handles plus scalar parameters, in a
//! fixed field order. It is never mutated after construction.
//!
//! While a kernel runs it holds a write lock on every allocation it writes
//! and a read lock on every allocation it reads. `validate` therefore rejects
//! descriptors whose outputs share an allocation with another argument.

mod binarize;
mod dispatch;
mod query;
mod task;

pub use binarize::{BinarizeFloatFeatureKernel, FindBordersKernel, WriteCompressedIndexKernel};
pub use dispatch::launch_kernels;
pub use query::{
    ComputeQueryIdsKernel, CreateKeysForSegmentedDocsSampleKernel, FillQueryEndMaskKernel,
    FillTakenDocsMaskKernel, RemoveQueryBiasContext, RemoveQueryMax, RemoveQueryMeans,
};
pub use task::KernelTask;

use crate::buffer::Allocation;
use crate::error::{Error, Result};
use crate::runtime::MemoryManager;
use crate::runtime::cpu::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A device kernel described by serializable data
///
/// Execution is two-phase: [`prepare_context`](Kernel::prepare_context)
/// allocates per-invocation scratch, then [`run`](Kernel::run) does the work.
/// The context is dropped, and its scratch freed, right after `run`.
///
/// Kernels without scratch use `type Context = ()`.
pub trait Kernel: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Per-invocation scratch state
    type Context: Default + Send;

    /// Kernel name used in logs
    const NAME: &'static str;

    /// Recoverable host-side checks, run before anything is enqueued
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Caller-bug checks; panic on violation
    ///
    /// Runs host-side before enqueue. `run` repeats the same assertions.
    fn check_invariants(&self) {}

    /// Allocate scratch for one invocation
    fn prepare_context(&self, _memory: &MemoryManager) -> Result<Self::Context> {
        Ok(Self::Context::default())
    }

    /// Execute on `stream`
    fn run(&self, stream: &Stream, context: &mut Self::Context) -> Result<()>;
}

/// Validate, prepare a context, run the kernel and release the context
pub fn execute<K: Kernel>(kernel: &K, stream: &Stream) -> Result<()> {
    kernel.validate()?;
    let memory = stream.memory_manager();
    let mut context = kernel.prepare_context(&memory)?;
    tracing::trace!(
        kernel = K::NAME,
        device = stream.device(),
        stream = stream.index(),
        "running kernel"
    );
    kernel.run(stream, &mut context)
}

/// Fail if an output shares its allocation with any other argument
pub(crate) fn ensure_exclusive(
    outputs: &[(&'static str, Option<Allocation>)],
    inputs: &[Option<Allocation>],
) -> Result<()> {
    for (i, &(arg, output)) in outputs.iter().enumerate() {
        let Some(output) = output else { continue };
        let other_outputs = outputs
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, &(_, allocation))| allocation);
        if other_outputs
            .chain(inputs.iter().copied())
            .any(|allocation| allocation == Some(output))
        {
            return Err(Error::invalid_argument(
                arg,
                format!(
                    "buffer {} on device {} is also passed as another argument",
                    output.handle, output.device
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(device: usize, handle: u64) -> Option<Allocation> {
        Some(Allocation { device, handle })
    }

    #[test]
    fn test_exclusive_outputs() {
        assert!(ensure_exclusive(&[("dst", on(0, 1))], &[on(0, 2), on(1, 1), None]).is_ok());
        assert!(ensure_exclusive(&[("dst", None)], &[None]).is_ok());

        let err = ensure_exclusive(&[("dst", on(0, 1))], &[on(0, 2), on(0, 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "dst", .. }));

        let err = ensure_exclusive(&[("seeds", on(0, 3)), ("keys", on(0, 3))], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "seeds", .. }));
    }
}
