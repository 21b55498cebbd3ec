//! Per-query statistics for ranking losses

use super::value_on;
use crate::buffer::{DeviceBuffer, DistributedObject, Mapping};
use crate::error::Result;
use crate::kernel::{
    ComputeQueryIdsKernel, CreateKeysForSegmentedDocsSampleKernel, FillQueryEndMaskKernel,
    FillTakenDocsMaskKernel, RemoveQueryMax, RemoveQueryMeans, launch_kernels,
};
use crate::runtime::Cluster;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Group id of every row: `q + bias` for rows of group `q`
///
/// Offsets on each device are rebased on their first entry. `bias` shifts the
/// numbering, usually by the number of groups on earlier devices.
pub fn compute_query_ids(
    cluster: &Cluster,
    sizes: &DeviceBuffer<u32>,
    offsets: &DeviceBuffer<u32>,
    bias: impl Into<DistributedObject<u32>>,
    qids: &mut DeviceBuffer<u32>,
    stream: u32,
) -> Result<()> {
    let bias = bias.into();
    launch_kernels(cluster, &sizes.non_empty_devices(), stream, |device| {
        Ok(ComputeQueryIdsKernel {
            sizes: sizes.const_ptr(device)?,
            offsets: offsets.const_ptr(device)?,
            offsets_bias: value_on(&bias, "bias", device)?,
            dst: qids.device_ptr(device)?,
        })
    })
}

/// Flag rows that end their group, walking rows in `docs` order
pub fn fill_query_end_masks(
    cluster: &Cluster,
    qids: &DeviceBuffer<u32>,
    docs: &DeviceBuffer<u32>,
    masks: &mut DeviceBuffer<u32>,
    stream: u32,
) -> Result<()> {
    launch_kernels(cluster, &docs.non_empty_devices(), stream, |device| {
        Ok(FillQueryEndMaskKernel {
            qids: qids.const_ptr(device)?,
            docs: docs.const_ptr(device)?,
            masks: masks.device_ptr(device)?,
        })
    })
}

/// Random sort keys that shuffle rows within their groups
///
/// Sorting rows by key keeps groups contiguous and in order. `seeds` is
/// advanced in place.
///
/// # Panics
/// If `doc_qids` and `keys` differ in length on a device, or a device has
/// rows but no seeds.
pub fn create_shuffle_keys(
    cluster: &Cluster,
    seeds: &mut DeviceBuffer<u64>,
    doc_qids: &DeviceBuffer<u32>,
    keys: &mut DeviceBuffer<u64>,
    stream: u32,
) -> Result<()> {
    let mut devices = doc_qids.non_empty_devices();
    devices.extend(keys.non_empty_devices());
    devices.sort_unstable();
    devices.dedup();

    launch_kernels(cluster, &devices, stream, |device| {
        Ok(CreateKeysForSegmentedDocsSampleKernel {
            seeds: seeds.device_ptr(device)?,
            qids: doc_qids.const_ptr(device)?,
            keys: keys.device_ptr(device)?,
        })
    })
}

/// Per-document weights of a grouped sample
///
/// A document is kept when its group was kept (`taken_query_mask`) and it is
/// among the first `min(max_query_size, ceil(size * docwise_sample_rate))`
/// rows of its group in `shuffled_docs` order.
#[allow(clippy::too_many_arguments)]
pub fn create_taken_docs_mask(
    cluster: &Cluster,
    taken_query_mask: &DeviceBuffer<f32>,
    doc_qids: &DeviceBuffer<u32>,
    shuffled_docs: &DeviceBuffer<u32>,
    query_offsets: &DeviceBuffer<u32>,
    bias: impl Into<DistributedObject<u32>>,
    query_sizes: &DeviceBuffer<u32>,
    docwise_sample_rate: f32,
    max_query_size: u32,
    sampled_weights: &mut DeviceBuffer<f32>,
    stream: u32,
) -> Result<()> {
    let bias = bias.into();
    launch_kernels(cluster, &doc_qids.non_empty_devices(), stream, |device| {
        Ok(FillTakenDocsMaskKernel {
            taken_query_masks: taken_query_mask.const_ptr(device)?,
            qids: doc_qids.const_ptr(device)?,
            docs: shuffled_docs.const_ptr(device)?,
            query_offsets: query_offsets.const_ptr(device)?,
            query_offsets_bias: value_on(&bias, "bias", device)?,
            query_sizes: query_sizes.const_ptr(device)?,
            docwise_sample_rate,
            max_query_size,
            taken_mask: sampled_weights.device_ptr(device)?,
        })
    })
}

/// Subtract each group's mean from its rows of `values`
///
/// `qids` are device-local group indices; `qid_offsets` carries one start per
/// group plus a trailing end.
///
/// # Panics
/// If `qid_offsets` is empty on a device holding values.
pub fn remove_query_means(
    cluster: &Cluster,
    qids: &DeviceBuffer<u32>,
    qid_offsets: &DeviceBuffer<u32>,
    values: &mut DeviceBuffer<f32>,
    stream: u32,
) -> Result<()> {
    launch_kernels(cluster, &values.non_empty_devices(), stream, |device| {
        Ok(RemoveQueryMeans {
            qids: qids.const_ptr(device)?,
            qid_offsets: qid_offsets.const_ptr(device)?,
            dest: values.device_ptr(device)?,
        })
    })
}

/// Subtract each group's maximum from its rows of `values`
///
/// # Panics
/// If `qid_offsets` is empty on a device holding values.
pub fn remove_query_max(
    cluster: &Cluster,
    qids: &DeviceBuffer<u32>,
    qid_offsets: &DeviceBuffer<u32>,
    values: &mut DeviceBuffer<f32>,
    stream: u32,
) -> Result<()> {
    launch_kernels(cluster, &values.non_empty_devices(), stream, |device| {
        Ok(RemoveQueryMax {
            qids: qids.const_ptr(device)?,
            qid_offsets: qid_offsets.const_ptr(device)?,
            dest: values.device_ptr(device)?,
        })
    })
}

/// Seed buffer for [`create_shuffle_keys`]: `per_device` seeds on every device
///
/// Seeds are drawn from `seed` and truncated to the 48-bit generator state.
pub fn make_seeds(cluster: &Cluster, per_device: usize, seed: u64) -> Result<DeviceBuffer<u64>> {
    let mapping = Mapping::mirror(cluster.device_count(), per_device);
    let mut rng = StdRng::seed_from_u64(seed);
    let seeds: Vec<u64> = (0..mapping.total_len())
        .map(|_| rng.random::<u64>() & ((1 << 48) - 1))
        .collect();
    DeviceBuffer::from_slice(cluster, mapping, &seeds)
}
