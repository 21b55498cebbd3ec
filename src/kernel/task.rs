//! Closed set of descriptors that can cross the device boundary

use super::{
    BinarizeFloatFeatureKernel, ComputeQueryIdsKernel, CreateKeysForSegmentedDocsSampleKernel,
    FillQueryEndMaskKernel, FillTakenDocsMaskKernel, FindBordersKernel, Kernel, RemoveQueryMax,
    RemoveQueryMeans, WriteCompressedIndexKernel, execute,
};
use crate::buffer::{DeviceLocal, HostPinned};
use crate::error::Result;
use crate::runtime::cpu::Stream;
use serde::{Deserialize, Serialize};

/// Tagged union over every kernel descriptor
///
/// This is the wire format: the host encodes a task, the stream worker
/// decodes it and executes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KernelTask {
    /// Border finding
    FindBorders(FindBordersKernel),
    /// Float binarization
    BinarizeFloatFeature(BinarizeFloatFeatureKernel),
    /// Compressed-index write from device-local bins
    WriteCompressedIndex(WriteCompressedIndexKernel<DeviceLocal>),
    /// Compressed-index write from pinned host bins
    WriteCompressedIndexPinned(WriteCompressedIndexKernel<HostPinned>),
    /// Group ids
    ComputeQueryIds(ComputeQueryIdsKernel),
    /// Query-end flags
    FillQueryEndMask(FillQueryEndMaskKernel),
    /// Shuffle keys
    CreateKeysForSegmentedDocsSample(CreateKeysForSegmentedDocsSampleKernel),
    /// Grouped sampling weights
    FillTakenDocsMask(FillTakenDocsMaskKernel),
    /// Group-mean removal
    RemoveQueryMeans(RemoveQueryMeans),
    /// Group-max removal
    RemoveQueryMax(RemoveQueryMax),
}

macro_rules! for_each_task {
    ($task:expr, $kernel:ident => $body:expr) => {
        match $task {
            KernelTask::FindBorders($kernel) => $body,
            KernelTask::BinarizeFloatFeature($kernel) => $body,
            KernelTask::WriteCompressedIndex($kernel) => $body,
            KernelTask::WriteCompressedIndexPinned($kernel) => $body,
            KernelTask::ComputeQueryIds($kernel) => $body,
            KernelTask::FillQueryEndMask($kernel) => $body,
            KernelTask::CreateKeysForSegmentedDocsSample($kernel) => $body,
            KernelTask::FillTakenDocsMask($kernel) => $body,
            KernelTask::RemoveQueryMeans($kernel) => $body,
            KernelTask::RemoveQueryMax($kernel) => $body,
        }
    };
}

fn kernel_name<K: Kernel>(_: &K) -> &'static str {
    K::NAME
}

impl KernelTask {
    /// Serialize for transport
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a task produced by [`encode`](Self::encode)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Name of the wrapped kernel
    pub fn name(&self) -> &'static str {
        for_each_task!(self, kernel => kernel_name(kernel))
    }

    /// Prepare context, run and release context on `stream`
    pub fn execute(&self, stream: &Stream) -> Result<()> {
        for_each_task!(self, kernel => execute(kernel, stream))
    }
}

macro_rules! impl_from_kernel {
    ($($variant:ident($kernel:ty)),* $(,)?) => {
        $(
            impl From<$kernel> for KernelTask {
                fn from(kernel: $kernel) -> Self {
                    Self::$variant(kernel)
                }
            }
        )*
    };
}

impl_from_kernel!(
    FindBorders(FindBordersKernel),
    BinarizeFloatFeature(BinarizeFloatFeatureKernel),
    WriteCompressedIndex(WriteCompressedIndexKernel<DeviceLocal>),
    WriteCompressedIndexPinned(WriteCompressedIndexKernel<HostPinned>),
    ComputeQueryIds(ComputeQueryIdsKernel),
    FillQueryEndMask(FillQueryEndMaskKernel),
    CreateKeysForSegmentedDocsSample(CreateKeysForSegmentedDocsSampleKernel),
    FillTakenDocsMask(FillTakenDocsMaskKernel),
    RemoveQueryMeans(RemoveQueryMeans),
    RemoveQueryMax(RemoveQueryMax),
);
