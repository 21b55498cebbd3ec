//! Border finding, float binarization and compressed index writes
//!
//! Border arrays use the device layout `[count, b_1, ..., b_count]` with the
//! borders sorted ascending.

use crate::feature::PackedFeature;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Number of borders stored in a `[count, borders...]` array
#[inline]
pub fn border_count(borders: &[f32]) -> usize {
    match borders.first() {
        Some(&count) if count > 0.0 => (count as usize).min(borders.len() - 1),
        _ => 0,
    }
}

/// Bucket of `value`: the number of borders strictly below it
///
/// `borders` is the sorted border list without the count slot.
#[inline]
pub fn bin_index(value: f32, borders: &[f32]) -> u32 {
    borders.partition_point(|&border| value > border) as u32
}

/// Quantile borders
///
/// Border `i` is the largest value of the lowest `ceil((i+1) * n / (k+1))`
/// sorted values. NaNs are ignored. `dst` must hold `border_count + 1` slots.
pub fn fast_borders(values: &[f32], border_count: u32, dst: &mut [f32]) {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    #[cfg(feature = "rayon")]
    sorted.par_sort_unstable_by(f32::total_cmp);
    #[cfg(not(feature = "rayon"))]
    sorted.sort_unstable_by(f32::total_cmp);

    let n = sorted.len();
    let k = border_count as usize;
    if n == 0 || k == 0 {
        dst[0] = 0.0;
        return;
    }

    for i in 0..k {
        let pos = ((i + 1) * n).div_ceil(k + 1) - 1;
        dst[i + 1] = sorted[pos.min(n - 1)];
    }
    dst[0] = k as f32;
}

/// Evenly spaced borders: `lo + (hi - lo) * (i + 1) / (k + 1)`
///
/// NaNs are ignored. `dst` must hold `border_count + 1` slots.
pub fn uniform_borders(values: &[f32], border_count: u32, dst: &mut [f32]) {
    let merge = |(lo_a, hi_a): (f32, f32), (lo_b, hi_b): (f32, f32)| (lo_a.min(lo_b), hi_a.max(hi_b));
    let empty = (f32::INFINITY, f32::NEG_INFINITY);

    #[cfg(feature = "rayon")]
    let (lo, hi) = values
        .par_iter()
        .copied()
        .filter(|v| !v.is_nan())
        .map(|v| (v, v))
        .reduce(|| empty, merge);
    #[cfg(not(feature = "rayon"))]
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .map(|v| (v, v))
        .fold(empty, merge);

    let k = border_count as usize;
    if lo > hi || k == 0 {
        dst[0] = 0.0;
        return;
    }

    let steps = (k + 1) as f32;
    for i in 0..k {
        dst[i + 1] = lo + (hi - lo) * (i + 1) as f32 / steps;
    }
    dst[0] = k as f32;
}

/// Binarize `values` into the feature's bit field with plain stores
///
/// Row `i` reads `values[gather[i]]` when a gather index is given. `dst` is
/// the feature block (`dst[i]` is row `i`'s word).
pub fn binarize_float_feature(
    values: &[f32],
    borders: &[f32],
    feature: &PackedFeature,
    gather: Option<&[u32]>,
    dst: &mut [u32],
) {
    let borders = borders.get(1..=border_count(borders)).unwrap_or(&[]);
    let value_at = |i: usize| match gather {
        Some(gather) => values[gather[i] as usize],
        None => values[i],
    };
    let body = |(i, word): (usize, &mut u32)| {
        *word = feature.store(*word, bin_index(value_at(i), borders));
    };

    let dst = &mut dst[..values.len()];
    #[cfg(feature = "rayon")]
    dst.par_iter_mut().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    dst.iter_mut().enumerate().for_each(body);
}

/// Binarize `values` and merge the bits with atomic OR
///
/// Used when several features share words and are written concurrently; the
/// feature's field must be zero beforehand.
pub fn binarize_float_feature_atomic(
    values: &[f32],
    borders: &[f32],
    feature: &PackedFeature,
    gather: Option<&[u32]>,
    dst: &[AtomicU32],
) {
    let borders = borders.get(1..=border_count(borders)).unwrap_or(&[]);
    let value_at = |i: usize| match gather {
        Some(gather) => values[gather[i] as usize],
        None => values[i],
    };
    let body = |(i, word): (usize, &AtomicU32)| {
        word.fetch_or(feature.encode(bin_index(value_at(i), borders)), Ordering::Relaxed);
    };

    let dst = &dst[..values.len()];
    #[cfg(feature = "rayon")]
    dst.par_iter().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    dst.iter().enumerate().for_each(body);
}

/// Pack already binarized one-byte bins into the feature's bit field
pub fn write_compressed_index(feature: &PackedFeature, bins: &[u8], dst: &mut [u32]) {
    let body = |(word, &bin): (&mut u32, &u8)| {
        *word = feature.store(*word, bin as u32);
    };

    let dst = &mut dst[..bins.len()];
    #[cfg(feature = "rayon")]
    dst.par_iter_mut().zip(bins.par_iter()).for_each(body);
    #[cfg(not(feature = "rayon"))]
    dst.iter_mut().zip(bins.iter()).for_each(body);
}
