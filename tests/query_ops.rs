//! Integration tests for per-query statistics

mod common;

use boostkern::buffer::{DeviceBuffer, DistributedObject, Mapping};
use boostkern::ops::{self, DEFAULT_STREAM};
use boostkern::runtime::Cluster;
use common::{assert_allclose_f32, create_cluster, on_device, zeros_on_device};

const SIZES: [u32; 3] = [3, 2, 4];
const OFFSETS: [u32; 4] = [0, 3, 5, 9];
const QIDS: [u32; 9] = [0, 0, 0, 1, 1, 2, 2, 2, 2];

fn group_means(values: &[f32]) -> Vec<f32> {
    OFFSETS
        .windows(2)
        .map(|w| {
            let rows = &values[w[0] as usize..w[1] as usize];
            rows.iter().sum::<f32>() / rows.len() as f32
        })
        .collect()
}

fn shuffled_keys(cluster: &Cluster, qids: &[u32], seed: u64) -> Vec<u64> {
    let mut seeds = ops::make_seeds(cluster, 4, seed).unwrap();
    let doc_qids = on_device(cluster, 0, qids);
    let mut keys = zeros_on_device::<u64>(cluster, 0, qids.len());
    ops::create_shuffle_keys(cluster, &mut seeds, &doc_qids, &mut keys, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();
    keys.read().unwrap()
}

#[test]
fn test_query_ids_accept_offsets_with_end_sentinel() {
    let cluster = create_cluster(1);
    let sizes = on_device(&cluster, 0, &SIZES);
    let offsets = on_device(&cluster, 0, &OFFSETS);
    let mut qids = zeros_on_device::<u32>(&cluster, 0, 9);

    ops::compute_query_ids(&cluster, &sizes, &offsets, 0, &mut qids, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();

    assert_eq!(qids.read().unwrap(), QIDS);
}

#[test]
fn test_query_ids_continue_numbering_across_devices() {
    let cluster = create_cluster(2);
    let sizes = DeviceBuffer::<u32>::from_slice(&cluster, Mapping::from_sizes(vec![2, 1]), &[2, 1, 3]).unwrap();
    let offsets =
        DeviceBuffer::<u32>::from_slice(&cluster, Mapping::from_sizes(vec![2, 1]), &[0, 2, 3]).unwrap();
    let mut qids = DeviceBuffer::<u32>::new(&cluster, Mapping::from_sizes(vec![3, 3])).unwrap();

    ops::compute_query_ids(
        &cluster,
        &sizes,
        &offsets,
        DistributedObject::per_device(vec![0, 2]),
        &mut qids,
        DEFAULT_STREAM,
    )
    .unwrap();
    cluster.synchronize().unwrap();

    assert_eq!(qids.read().unwrap(), [0, 0, 1, 2, 2, 2]);
}

#[test]
fn test_query_end_mask_marks_last_rows() {
    let cluster = create_cluster(1);
    let qids = on_device(&cluster, 0, &QIDS);
    let docs = on_device(&cluster, 0, &(0..9).collect::<Vec<u32>>());
    let mut masks = on_device(&cluster, 0, &[9u32; 9]);

    ops::fill_query_end_masks(&cluster, &qids, &docs, &mut masks, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();

    let masks = masks.read().unwrap();
    let ends: Vec<usize> = (0..9).filter(|&i| masks[i] == 1).collect();
    assert_eq!(ends, [2, 4, 8]);
    assert!(masks.iter().all(|&m| m <= 1));
}

#[test]
fn test_remove_query_means_centers_groups() {
    let cluster = create_cluster(1);
    let data = [1.0f32, 2.0, 6.0, -4.0, 10.0, 0.5, 0.25, 3.0, 100.0];
    let qids = on_device(&cluster, 0, &QIDS);
    let offsets = on_device(&cluster, 0, &OFFSETS);
    let mut values = on_device(&cluster, 0, &data);

    ops::remove_query_means(&cluster, &qids, &offsets, &mut values, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();
    let once = values.read().unwrap();
    assert_allclose_f32(&group_means(&once), &[0.0; 3], 0.0, 1e-4, "group means");

    let expected: Vec<f32> = data
        .iter()
        .zip(QIDS)
        .map(|(&v, q)| v - group_means(&data)[q as usize])
        .collect();
    assert_allclose_f32(&once, &expected, 1e-5, 1e-5, "centered values");

    ops::remove_query_means(&cluster, &qids, &offsets, &mut values, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();
    assert_allclose_f32(&values.read().unwrap(), &once, 0.0, 1e-4, "second application");
}

#[test]
fn test_remove_query_max_zeroes_group_maximum() {
    let cluster = create_cluster(1);
    let data = [1.0f32, 2.0, 6.0, -4.0, -10.0, 0.5, 0.25, 3.0, 100.0];
    let qids = on_device(&cluster, 0, &QIDS);
    let offsets = on_device(&cluster, 0, &OFFSETS);
    let mut values = on_device(&cluster, 0, &data);

    ops::remove_query_max(&cluster, &qids, &offsets, &mut values, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();

    let out = values.read().unwrap();
    for w in OFFSETS.windows(2) {
        let rows = &out[w[0] as usize..w[1] as usize];
        assert_eq!(rows.iter().copied().fold(f32::NEG_INFINITY, f32::max), 0.0);
        assert!(rows.iter().all(|&v| v <= 0.0));
    }
}

#[test]
#[should_panic(expected = "must not be empty")]
fn test_remove_query_means_empty_offsets_panics() {
    let cluster = create_cluster(1);
    let qids = on_device(&cluster, 0, &[0u32, 0]);
    let offsets = zeros_on_device::<u32>(&cluster, 0, 0);
    let mut values = on_device(&cluster, 0, &[1.0f32, 2.0]);
    let _ = ops::remove_query_means(&cluster, &qids, &offsets, &mut values, DEFAULT_STREAM);
}

#[test]
fn test_shuffle_keys_are_deterministic_and_keep_groups() {
    let cluster = create_cluster(1);
    let first = shuffled_keys(&cluster, &QIDS, 7);
    let second = shuffled_keys(&cluster, &QIDS, 7);
    assert_eq!(first, second);

    let mut order: Vec<usize> = (0..QIDS.len()).collect();
    order.sort_by_key(|&i| first[i]);
    let sorted_qids: Vec<u32> = order.iter().map(|&i| QIDS[i]).collect();
    assert_eq!(sorted_qids, QIDS);
}

#[test]
fn test_shuffle_keys_advance_seeds() {
    let cluster = create_cluster(1);
    let mut seeds = ops::make_seeds(&cluster, 2, 1).unwrap();
    let before = seeds.read().unwrap();
    let doc_qids = on_device(&cluster, 0, &QIDS);
    let mut keys = zeros_on_device::<u64>(&cluster, 0, QIDS.len());

    ops::create_shuffle_keys(&cluster, &mut seeds, &doc_qids, &mut keys, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();
    let first = keys.read().unwrap();
    assert_ne!(seeds.read().unwrap(), before);

    ops::create_shuffle_keys(&cluster, &mut seeds, &doc_qids, &mut keys, DEFAULT_STREAM).unwrap();
    cluster.synchronize().unwrap();
    assert_ne!(keys.read().unwrap(), first);
}

#[test]
#[should_panic(expected = "same length")]
fn test_shuffle_keys_length_mismatch_panics() {
    let cluster = create_cluster(1);
    let mut seeds = ops::make_seeds(&cluster, 1, 0).unwrap();
    let doc_qids = on_device(&cluster, 0, &QIDS);
    let mut keys = zeros_on_device::<u64>(&cluster, 0, QIDS.len() - 1);
    let _ = ops::create_shuffle_keys(&cluster, &mut seeds, &doc_qids, &mut keys, DEFAULT_STREAM);
}

#[test]
fn test_taken_docs_mask_respects_group_sample() {
    let cluster = create_cluster(1);
    let keys = shuffled_keys(&cluster, &QIDS, 3);
    let mut shuffled: Vec<u32> = (0..QIDS.len() as u32).collect();
    shuffled.sort_by_key(|&i| keys[i as usize]);

    let taken_query_mask = on_device(&cluster, 0, &[1.0f32, 0.0, 2.0]);
    let doc_qids = on_device(&cluster, 0, &QIDS);
    let docs = on_device(&cluster, 0, &shuffled);
    let query_offsets = on_device(&cluster, 0, &[100u32, 103, 105, 109]);
    let query_sizes = on_device(&cluster, 0, &SIZES);
    let mut weights = on_device(&cluster, 0, &[-1.0f32; 9]);

    ops::create_taken_docs_mask(
        &cluster,
        &taken_query_mask,
        &doc_qids,
        &docs,
        &query_offsets,
        100,
        &query_sizes,
        0.5,
        3,
        &mut weights,
        DEFAULT_STREAM,
    )
    .unwrap();
    cluster.synchronize().unwrap();

    let weights = weights.read().unwrap();
    let taken = |q: u32| QIDS.iter().zip(&weights).filter(|&(&g, &w)| g == q && w > 0.0).count();
    assert_eq!(taken(0), 2);
    assert_eq!(taken(1), 0);
    assert_eq!(taken(2), 2);
    assert!(weights.iter().all(|&w| w == 0.0 || w == 1.0 || w == 2.0));
    assert!(
        QIDS.iter()
            .zip(&weights)
            .all(|(&q, &w)| w == 0.0 || (q == 2) == (w == 2.0))
    );
}

#[test]
fn test_taken_docs_mask_caps_group_size() {
    let cluster = create_cluster(1);
    let qids = [0u32; 8];
    let taken_query_mask = on_device(&cluster, 0, &[1.0f32]);
    let doc_qids = on_device(&cluster, 0, &qids);
    let docs = on_device(&cluster, 0, &(0..8).rev().collect::<Vec<u32>>());
    let query_offsets = on_device(&cluster, 0, &[0u32]);
    let query_sizes = on_device(&cluster, 0, &[8u32]);
    let mut weights = zeros_on_device::<f32>(&cluster, 0, 8);

    ops::create_taken_docs_mask(
        &cluster,
        &taken_query_mask,
        &doc_qids,
        &docs,
        &query_offsets,
        0,
        &query_sizes,
        1.0,
        3,
        &mut weights,
        DEFAULT_STREAM,
    )
    .unwrap();
    cluster.synchronize().unwrap();

    assert_eq!(weights.read().unwrap(), [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
}
