//! CPU kernel implementations
//!
//! Device-side bodies of the data-preparation kernels. They operate on
//! resolved slices; descriptors in [`crate::kernel`] validate shapes and
//! resolve handles before calling in here.

pub mod binarize;
pub mod query;

pub use binarize::{
    bin_index, binarize_float_feature, binarize_float_feature_atomic, fast_borders,
    uniform_borders, write_compressed_index,
};
pub use query::{
    compute_group_ids, compute_group_max, compute_group_means, create_sort_keys,
    fill_query_end_mask, fill_taken_docs_mask, next_seed, remove_group_bias, sampled_group_size,
};
