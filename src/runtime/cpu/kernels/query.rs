//! Per-query (grouped) kernels used by ranking losses
//!
//! Group offsets may be global document indices; every kernel rebases them on
//! the first group's offset (or an explicit bias) to address local rows.

use crate::error::{Error, Result};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Mask of the 48-bit LCG state
const SEED_MASK: u64 = (1 << 48) - 1;

/// Advance a 48-bit linear congruential seed
#[inline]
pub fn next_seed(seed: u64) -> u64 {
    seed.wrapping_mul(0x5DEE_CE66D).wrapping_add(0xB) & SEED_MASK
}

/// Write `q + bias` to every row of group `q`
///
/// Group `q` covers rows `[offsets[q] - offsets[0], + sizes[q])`. Rows not
/// covered by any group are left untouched. Offsets past `sizes.len()` (such
/// as a trailing end sentinel) are ignored.
pub fn compute_group_ids(sizes: &[u32], offsets: &[u32], bias: u32, dst: &mut [u32]) -> Result<()> {
    let base = offsets.first().copied().unwrap_or(0);
    let capacity = dst.len();
    for (q, (&size, &offset)) in sizes.iter().zip(offsets).enumerate() {
        let start = offset.wrapping_sub(base) as usize;
        let end = start + size as usize;
        let rows = dst.get_mut(start..end).ok_or_else(|| {
            Error::invalid_argument(
                "qids",
                format!("group {q} covers rows {start}..{end}, output holds {capacity}"),
            )
        })?;
        rows.fill((q as u32).wrapping_add(bias));
    }
    Ok(())
}

/// Mark the last row of every group
///
/// Row `i` belongs to document `docs[i]`; it ends its group when it is the
/// last row or the next row's document is in another group.
pub fn fill_query_end_mask(qids: &[u32], docs: &[u32], masks: &mut [u32]) {
    let n = docs.len();
    let body = |(i, mask): (usize, &mut u32)| {
        let qid = qids[docs[i] as usize];
        let is_end = i + 1 == n || qids[docs[i + 1] as usize] != qid;
        *mask = is_end as u32;
    };

    let masks = &mut masks[..n];
    #[cfg(feature = "rayon")]
    masks.par_iter_mut().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    masks.iter_mut().enumerate().for_each(body);
}

/// Sort keys that shuffle rows inside their group
///
/// `key = (qid << 32) | rand32`. Rows are split into `seeds.len()`
/// contiguous chunks; every chunk draws from its own seed slot, which is
/// advanced in place.
pub fn create_sort_keys(seeds: &mut [u64], qids: &[u32], keys: &mut [u64]) {
    if keys.is_empty() || seeds.is_empty() {
        return;
    }
    let chunk = keys.len().div_ceil(seeds.len());
    let body = |((keys, qids), seed): ((&mut [u64], &[u32]), &mut u64)| {
        let mut state = *seed;
        for (key, &qid) in keys.iter_mut().zip(qids) {
            state = next_seed(state);
            *key = ((qid as u64) << 32) | (state >> 16);
        }
        *seed = state;
    };

    #[cfg(feature = "rayon")]
    keys.par_chunks_mut(chunk)
        .zip(qids.par_chunks(chunk))
        .zip(seeds.par_iter_mut())
        .for_each(body);
    #[cfg(not(feature = "rayon"))]
    keys.chunks_mut(chunk)
        .zip(qids.chunks(chunk))
        .zip(seeds.iter_mut())
        .for_each(body);
}

/// Rows kept from a group of `size` rows: `min(max_query_size, ceil(size * rate))`
#[inline]
pub fn sampled_group_size(size: u32, docwise_sample_rate: f32, max_query_size: u32) -> u32 {
    ((size as f32 * docwise_sample_rate).ceil() as u32).min(max_query_size)
}

/// Per-document sampling weights for grouped sampling
///
/// `docs` is the shuffled row order (groups contiguous). A document is taken
/// when its group was taken and its position inside the group is below the
/// sampled group size; it then receives the group's weight.
#[allow(clippy::too_many_arguments)]
pub fn fill_taken_docs_mask(
    taken_query_masks: &[f32],
    qids: &[u32],
    docs: &[u32],
    query_offsets: &[u32],
    query_offsets_bias: u32,
    query_sizes: &[u32],
    docwise_sample_rate: f32,
    max_query_size: u32,
    taken_mask: &mut [f32],
) {
    for (i, &doc) in docs.iter().enumerate() {
        let doc = doc as usize;
        let q = qids[doc] as usize;
        let start = query_offsets[q].wrapping_sub(query_offsets_bias);
        let position = (i as u32).wrapping_sub(start);
        let limit = sampled_group_size(query_sizes[q], docwise_sample_rate, max_query_size);
        taken_mask[doc] = if position < limit {
            taken_query_masks[q]
        } else {
            0.0
        };
    }
}

fn group_rows(offsets: &[u32], q: usize) -> std::ops::Range<usize> {
    let base = offsets[0];
    (offsets[q] - base) as usize..(offsets[q + 1] - base) as usize
}

/// Mean of every group; `offsets` carries a trailing end sentinel
///
/// Empty groups get 0. `means` must hold at least `offsets.len() - 1` slots.
pub fn compute_group_means(values: &[f32], offsets: &[u32], means: &mut [f32]) {
    let groups = offsets.len().saturating_sub(1);
    let body = |(q, mean): (usize, &mut f32)| {
        let rows = &values[group_rows(offsets, q)];
        *mean = if rows.is_empty() {
            0.0
        } else {
            (rows.iter().map(|&v| v as f64).sum::<f64>() / rows.len() as f64) as f32
        };
    };

    let means = &mut means[..groups];
    #[cfg(feature = "rayon")]
    means.par_iter_mut().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    means.iter_mut().enumerate().for_each(body);
}

/// Maximum of every group; `offsets` carries a trailing end sentinel
///
/// Empty groups get 0. `maxima` must hold at least `offsets.len() - 1` slots.
pub fn compute_group_max(values: &[f32], offsets: &[u32], maxima: &mut [f32]) {
    let groups = offsets.len().saturating_sub(1);
    let body = |(q, max): (usize, &mut f32)| {
        let rows = &values[group_rows(offsets, q)];
        *max = if rows.is_empty() {
            0.0
        } else {
            rows.iter().copied().fold(f32::NEG_INFINITY, f32::max)
        };
    };

    let maxima = &mut maxima[..groups];
    #[cfg(feature = "rayon")]
    maxima.par_iter_mut().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    maxima.iter_mut().enumerate().for_each(body);
}

/// Subtract each row's group statistic in place: `dest[i] -= bias[qids[i]]`
pub fn remove_group_bias(bias: &[f32], qids: &[u32], dest: &mut [f32]) {
    let body = |(value, &qid): (&mut f32, &u32)| {
        *value -= bias[qid as usize];
    };

    #[cfg(feature = "rayon")]
    dest.par_iter_mut().zip(qids.par_iter()).for_each(body);
    #[cfg(not(feature = "rayon"))]
    dest.iter_mut().zip(qids.iter()).for_each(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_group_ids_for_three_groups() {
        let mut qids = vec![u32::MAX; 9];
        compute_group_ids(&[3, 2, 4], &[0, 3, 5], 0, &mut qids).unwrap();
        assert_eq!(qids, [0, 0, 0, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_group_ids_rebase_offsets_and_add_bias() {
        let mut qids = vec![0; 5];
        compute_group_ids(&[2, 0, 3], &[100, 102, 102], 7, &mut qids).unwrap();
        assert_eq!(qids, [7, 7, 9, 9, 9]);
    }

    #[test]
    fn test_group_ids_ignore_end_sentinel() {
        let mut qids = vec![u32::MAX; 9];
        compute_group_ids(&[3, 2, 4], &[0, 3, 5, 9], 0, &mut qids).unwrap();
        assert_eq!(qids, [0, 0, 0, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_group_ids_reject_short_output() {
        let mut qids = vec![0; 4];
        let err = compute_group_ids(&[3, 2], &[0, 3], 0, &mut qids).unwrap_err();
        assert!(err.to_string().contains("output holds 4"));
    }

    #[test]
    fn test_group_ids_bias_wraps() {
        let mut qids = vec![0; 3];
        compute_group_ids(&[1, 2], &[0, 1], u32::MAX, &mut qids).unwrap();
        assert_eq!(qids, [u32::MAX, 0, 0]);
    }

    #[test]
    fn test_query_end_mask() {
        let qids = [0, 0, 0, 1, 1, 2, 2, 2, 2];
        let docs: Vec<u32> = (0..9).collect();
        let mut masks = vec![7; 9];
        fill_query_end_mask(&qids, &docs, &mut masks);
        assert_eq!(masks, [0, 0, 1, 0, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_query_end_mask_follows_docs_order() {
        let qids = [1, 0, 1, 0];
        let docs = [1, 3, 0, 2];
        let mut masks = vec![0; 4];
        fill_query_end_mask(&qids, &docs, &mut masks);
        assert_eq!(masks, [0, 1, 0, 1]);
    }

    #[test]
    fn test_sort_keys_keep_groups_contiguous() {
        let qids = [0, 0, 0, 1, 1, 2, 2, 2, 2];
        let mut seeds = vec![11, 22, 33];
        let mut keys = vec![0u64; 9];
        create_sort_keys(&mut seeds, &qids, &mut keys);
        assert_ne!(seeds, [11, 22, 33]);

        let mut order: Vec<usize> = (0..9).collect();
        order.sort_by_key(|&i| keys[i]);
        let sorted_qids: Vec<u32> = order.iter().map(|&i| qids[i]).collect();
        assert_eq!(sorted_qids, qids);
    }

    #[test]
    fn test_sort_keys_are_deterministic() {
        let qids = [3, 3, 4, 4, 4];
        let mut first_seeds = vec![42, 7];
        let mut second_seeds = first_seeds.clone();
        let mut first = vec![0u64; 5];
        let mut second = vec![0u64; 5];
        create_sort_keys(&mut first_seeds, &qids, &mut first);
        create_sort_keys(&mut second_seeds, &qids, &mut second);
        assert_eq!(first, second);
        assert_eq!(first_seeds, second_seeds);
        assert!(first.iter().zip(&qids).all(|(&k, &q)| (k >> 32) as u32 == q));
    }

    #[test]
    fn test_taken_docs_mask_respects_group_mask() {
        let qids = [0, 0, 0, 1, 1, 1];
        let docs = [2, 0, 1, 5, 3, 4];
        let mut mask = vec![9.0; 6];
        fill_taken_docs_mask(&[1.0, 0.0], &qids, &docs, &[10, 13], 10, &[3, 3], 0.5, 10, &mut mask);
        assert_eq!(mask, [1.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_group_means_and_max() {
        let values = [1.0, 2.0, 3.0, -4.0, 10.0];
        let offsets = [0, 3, 3, 5];
        let mut stats = vec![f32::NAN; 4];

        compute_group_means(&values, &offsets, &mut stats);
        assert_eq!(&stats[..3], &[2.0, 0.0, 3.0]);

        compute_group_max(&values, &offsets, &mut stats);
        assert_eq!(&stats[..3], &[3.0, 0.0, 10.0]);
    }

    #[test]
    fn test_remove_group_bias() {
        let mut dest = [1.0, 2.0, 3.0, 4.0];
        remove_group_bias(&[1.5, 4.0], &[0, 0, 1, 1], &mut dest);
        assert_eq!(dest, [-0.5, 0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_next_seed_stays_in_48_bits() {
        let mut seed = u64::MAX;
        for _ in 0..100 {
            seed = next_seed(seed);
            assert!(seed <= SEED_MASK);
        }
    }

    proptest! {
        #[test]
        fn prop_sampled_docs_bounded_per_group(
            sizes in prop::collection::vec(0u32..20, 1..8),
            taken in prop::collection::vec(prop::bool::ANY, 8),
            rate in 0.0f32..1.0,
            max_query_size in 0u32..25,
        ) {
            let mut offsets = Vec::with_capacity(sizes.len());
            let mut qids = Vec::new();
            for (q, &size) in sizes.iter().enumerate() {
                offsets.push(qids.len() as u32);
                qids.extend(std::iter::repeat_n(q as u32, size as usize));
            }
            // reversed inside each group, groups stay contiguous
            let docs: Vec<u32> = sizes
                .iter()
                .zip(&offsets)
                .flat_map(|(&size, &start)| (start..start + size).rev())
                .collect();
            let group_mask: Vec<f32> = taken.iter().map(|&t| if t { 1.0 } else { 0.0 }).collect();
            let mut mask = vec![0.0; qids.len()];

            fill_taken_docs_mask(&group_mask, &qids, &docs, &offsets, 0, &sizes, rate, max_query_size, &mut mask);

            for (q, &size) in sizes.iter().enumerate() {
                let start = offsets[q] as usize;
                let taken_rows = mask[start..start + size as usize].iter().filter(|&&m| m > 0.0).count() as u32;
                prop_assert!(taken_rows <= sampled_group_size(size, rate, max_query_size));
                prop_assert!(taken_rows <= max_query_size);
                if group_mask[q] == 0.0 {
                    prop_assert_eq!(taken_rows, 0);
                }
            }
        }
    }
}
