//! Border finding, binarization and compressed-index writes

use super::value_on;
use crate::buffer::{DeviceBuffer, DistributedObject, MemoryPlacement};
use crate::error::Result;
use crate::feature::PackedFeature;
use crate::kernel::{
    BinarizeFloatFeatureKernel, FindBordersKernel, Kernel, KernelTask, WriteCompressedIndexKernel,
    launch_kernels,
};
use crate::options::BinarizationOptions;
use crate::runtime::Cluster;

/// Compute borders of `feature` into `dst` on every device holding values
///
/// `dst` receives `[count, borders...]` and must hold more than
/// `options.border_count` elements on each of those devices. Only `Median` and
/// `Uniform` selection run on device; other modes fail before launch.
pub fn compute_borders_on_device(
    cluster: &Cluster,
    feature: &DeviceBuffer<f32>,
    options: &BinarizationOptions,
    dst: &mut DeviceBuffer<f32>,
    stream: u32,
) -> Result<()> {
    launch_kernels(cluster, &feature.non_empty_devices(), stream, |device| {
        Ok(FindBordersKernel::new(
            feature.const_ptr(device)?,
            dst.device_ptr(device)?,
            options.border_count,
            options.border_selection_type,
        ))
    })
}

/// Bucketize `values` with `borders` into the feature's field of `dst`
///
/// With `atomic_update` the bits are merged with atomic OR, so the feature's
/// field must be zero beforehand. `gather` reorders the input rows.
#[allow(clippy::too_many_arguments)]
pub fn binarize_on_device(
    cluster: &Cluster,
    values: &DeviceBuffer<f32>,
    borders: &DeviceBuffer<f32>,
    feature: &DistributedObject<PackedFeature>,
    dst: &mut DeviceBuffer<u32>,
    atomic_update: bool,
    gather: Option<&DeviceBuffer<u32>>,
    stream: u32,
) -> Result<()> {
    launch_kernels(cluster, &values.non_empty_devices(), stream, |device| {
        Ok(BinarizeFloatFeatureKernel {
            values: values.const_ptr(device)?,
            borders: borders.const_ptr(device)?,
            feature: value_on(feature, "feature", device)?,
            dst: dst.device_ptr(device)?,
            gather_index: gather.map(|g| g.const_ptr(device)).transpose()?,
            atomic_update,
        })
    })
}

/// Pack binarized `bins` into the feature's field of the compressed index
///
/// # Panics
/// If the feature on a target device has a zero mask or no offset.
pub fn write_compressed_feature<P>(
    cluster: &Cluster,
    feature: &DistributedObject<PackedFeature>,
    bins: &DeviceBuffer<u8, P>,
    cindex: &mut DeviceBuffer<u32>,
    stream: u32,
) -> Result<()>
where
    P: MemoryPlacement,
    WriteCompressedIndexKernel<P>: Kernel + Into<KernelTask>,
{
    launch_kernels(cluster, &bins.non_empty_devices(), stream, |device| {
        Ok(WriteCompressedIndexKernel::new(
            bins.const_ptr(device)?,
            value_on(feature, "feature", device)?,
            cindex.device_ptr(device)?,
        ))
    })
}
