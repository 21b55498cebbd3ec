//! Typed entry points of the data-preparation pipeline
//!
//! Every entry point takes host-level buffers, builds one kernel descriptor
//! per device that holds input, and launches it on the given stream. Calls
//! return as soon as the work is enqueued; results are visible after
//! [`Cluster::synchronize`](crate::runtime::Cluster::synchronize).
//!
//! ```text
//! binarization                     query
//!   compute_borders_on_device        compute_query_ids
//!   binarize_on_device               fill_query_end_masks
//!   write_compressed_feature         create_shuffle_keys
//!                                    create_taken_docs_mask
//!                                    remove_query_means / remove_query_max
//! ```
//!
//! Validation errors are returned before anything is enqueued. Broken caller
//! invariants panic.

mod binarization;
mod query;

pub use binarization::{binarize_on_device, compute_borders_on_device, write_compressed_feature};
pub use query::{
    compute_query_ids, create_shuffle_keys, create_taken_docs_mask, fill_query_end_masks,
    make_seeds, remove_query_max, remove_query_means,
};

use crate::buffer::DistributedObject;
use crate::error::{Error, Result};

/// Stream used when the caller has no preference
pub const DEFAULT_STREAM: u32 = 0;

fn value_on<T: Clone>(object: &DistributedObject<T>, arg: &'static str, device: usize) -> Result<T> {
    object
        .at(device)
        .ok_or_else(|| Error::invalid_argument(arg, format!("no value for device {device}")))
}
