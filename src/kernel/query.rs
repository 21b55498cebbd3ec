//! Per-query descriptors used by ranking losses

use super::{Kernel, ensure_exclusive};
use crate::buffer::{BufferPtr, ConstPtr};
use crate::error::{Error, Result};
use crate::runtime::cpu::{Stream, kernels};
use crate::runtime::{MemoryManager, ScratchBuffer};
use serde::{Deserialize, Serialize};

fn ensure_at_least(arg: &'static str, got: usize, expected: usize) -> Result<()> {
    if got >= expected {
        Ok(())
    } else {
        Err(Error::invalid_argument(
            arg,
            format!("expected at least {expected} elements, got {got}"),
        ))
    }
}

fn ensure_len(arg: &'static str, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::invalid_argument(
            arg,
            format!("expected {expected} elements, got {got}"),
        ))
    }
}

/// Assign every row the id of the group containing it, plus a bias
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeQueryIdsKernel {
    /// Rows per group
    pub sizes: ConstPtr<u32>,
    /// Start of every group; rebased on the first entry. Extra trailing
    /// entries are ignored
    pub offsets: ConstPtr<u32>,
    /// Added to every produced id
    pub offsets_bias: u32,
    /// One id per row
    pub dst: BufferPtr<u32>,
}

impl Kernel for ComputeQueryIdsKernel {
    type Context = ();
    const NAME: &'static str = "compute_query_ids";

    fn validate(&self) -> Result<()> {
        ensure_at_least("offsets", self.offsets.len(), self.sizes.len())?;
        ensure_exclusive(
            &[("dst", self.dst.allocation())],
            &[self.sizes.allocation(), self.offsets.allocation()],
        )
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        let sizes = stream.view(&self.sizes)?;
        let offsets = stream.view(&self.offsets)?;
        let mut dst = stream.view_mut(&self.dst)?;
        kernels::compute_group_ids(&sizes, &offsets, self.offsets_bias, &mut dst)
    }
}

/// Flag the last row of every group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillQueryEndMaskKernel {
    /// Group id per document
    pub qids: ConstPtr<u32>,
    /// Row order as document indices
    pub docs: ConstPtr<u32>,
    /// One flag per row
    pub masks: BufferPtr<u32>,
}

impl Kernel for FillQueryEndMaskKernel {
    type Context = ();
    const NAME: &'static str = "fill_query_end_mask";

    fn validate(&self) -> Result<()> {
        ensure_len("masks", self.masks.len(), self.docs.len())?;
        ensure_exclusive(
            &[("masks", self.masks.allocation())],
            &[self.qids.allocation(), self.docs.allocation()],
        )
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        let qids = stream.view(&self.qids)?;
        let docs = stream.view(&self.docs)?;
        let mut masks = stream.view_mut(&self.masks)?;
        kernels::fill_query_end_mask(&qids, &docs, &mut masks);
        Ok(())
    }
}

/// Sort keys that shuffle rows within their group
///
/// The seeds are advanced in place, so consecutive launches on the same
/// stream draw fresh keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateKeysForSegmentedDocsSampleKernel {
    /// Generator state, one slot per contiguous chunk of rows
    pub seeds: BufferPtr<u64>,
    /// Group id per row
    pub qids: ConstPtr<u32>,
    /// One key per row
    pub keys: BufferPtr<u64>,
}

impl Kernel for CreateKeysForSegmentedDocsSampleKernel {
    type Context = ();
    const NAME: &'static str = "create_keys_for_segmented_docs_sample";

    fn check_invariants(&self) {
        assert_eq!(
            self.qids.len(),
            self.keys.len(),
            "keys and group ids must have the same length"
        );
        assert!(
            self.keys.is_empty() || !self.seeds.is_empty(),
            "at least one seed is required"
        );
    }

    fn validate(&self) -> Result<()> {
        ensure_exclusive(
            &[("seeds", self.seeds.allocation()), ("keys", self.keys.allocation())],
            &[self.qids.allocation()],
        )
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        self.check_invariants();
        let mut seeds = stream.view_mut(&self.seeds)?;
        let qids = stream.view(&self.qids)?;
        let mut keys = stream.view_mut(&self.keys)?;
        kernels::create_sort_keys(&mut seeds, &qids, &mut keys);
        Ok(())
    }
}

/// Per-document weights of a grouped sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillTakenDocsMaskKernel {
    /// Group-level weight, 0 for groups left out
    pub taken_query_masks: ConstPtr<f32>,
    /// Group id per document
    pub qids: ConstPtr<u32>,
    /// Shuffled row order as document indices, groups contiguous
    pub docs: ConstPtr<u32>,
    /// Start of every group, minus `query_offsets_bias`
    pub query_offsets: ConstPtr<u32>,
    /// Subtracted from `query_offsets` to get local rows
    pub query_offsets_bias: u32,
    /// Rows per group
    pub query_sizes: ConstPtr<u32>,
    /// Fraction of a group's rows to keep
    pub docwise_sample_rate: f32,
    /// Upper bound of kept rows per group
    pub max_query_size: u32,
    /// One weight per document
    pub taken_mask: BufferPtr<f32>,
}

impl Kernel for FillTakenDocsMaskKernel {
    type Context = ();
    const NAME: &'static str = "fill_taken_docs_mask";

    fn validate(&self) -> Result<()> {
        ensure_len("taken_mask", self.taken_mask.len(), self.qids.len())?;
        ensure_len("docs", self.docs.len(), self.qids.len())?;
        ensure_at_least("query_offsets", self.query_offsets.len(), self.query_sizes.len())?;
        if !(0.0..=1.0).contains(&self.docwise_sample_rate) {
            return Err(Error::invalid_argument(
                "docwise_sample_rate",
                format!("{} is outside [0, 1]", self.docwise_sample_rate),
            ));
        }
        ensure_exclusive(
            &[("taken_mask", self.taken_mask.allocation())],
            &[
                self.taken_query_masks.allocation(),
                self.qids.allocation(),
                self.docs.allocation(),
                self.query_offsets.allocation(),
                self.query_sizes.allocation(),
            ],
        )
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        let taken_query_masks = stream.view(&self.taken_query_masks)?;
        let qids = stream.view(&self.qids)?;
        let docs = stream.view(&self.docs)?;
        let query_offsets = stream.view(&self.query_offsets)?;
        let query_sizes = stream.view(&self.query_sizes)?;
        let mut taken_mask = stream.view_mut(&self.taken_mask)?;
        kernels::fill_taken_docs_mask(
            &taken_query_masks,
            &qids,
            &docs,
            &query_offsets,
            self.query_offsets_bias,
            &query_sizes,
            self.docwise_sample_rate,
            self.max_query_size,
            &mut taken_mask,
        );
        Ok(())
    }
}

/// Scratch for group mean/max removal: one statistic per offsets slot
#[derive(Debug, Default)]
pub struct RemoveQueryBiasContext {
    /// Per-group statistic
    pub query_bias: ScratchBuffer<f32>,
}

type GroupStatistic = fn(&[f32], &[u32], &mut [f32]);

fn remove_query_bias(
    stream: &Stream,
    qids: &ConstPtr<u32>,
    qid_offsets: &ConstPtr<u32>,
    dest: &BufferPtr<f32>,
    context: &mut RemoveQueryBiasContext,
    statistic: GroupStatistic,
) -> Result<()> {
    let qids = stream.view(qids)?;
    let offsets = stream.view(qid_offsets)?;
    let mut dest = stream.view_mut(dest)?;
    statistic(&dest, &offsets, context.query_bias.as_mut_slice());
    kernels::remove_group_bias(context.query_bias.as_slice(), &qids, &mut dest);
    Ok(())
}

macro_rules! remove_query_bias_kernel {
    ($(#[$doc:meta])* $name:ident, $kernel_name:literal, $statistic:path) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            /// Group id per row, local to the device
            pub qids: ConstPtr<u32>,
            /// Group starts with a trailing end sentinel
            pub qid_offsets: ConstPtr<u32>,
            /// Values centered in place
            pub dest: BufferPtr<f32>,
        }

        impl Kernel for $name {
            type Context = RemoveQueryBiasContext;
            const NAME: &'static str = $kernel_name;

            fn check_invariants(&self) {
                assert!(!self.qid_offsets.is_empty(), "group offsets must not be empty");
            }

            fn validate(&self) -> Result<()> {
                ensure_len("qids", self.qids.len(), self.dest.len())?;
                ensure_exclusive(
                    &[("dest", self.dest.allocation())],
                    &[self.qids.allocation(), self.qid_offsets.allocation()],
                )
            }

            fn prepare_context(&self, memory: &MemoryManager) -> Result<RemoveQueryBiasContext> {
                Ok(RemoveQueryBiasContext {
                    query_bias: memory.allocate(self.qid_offsets.len())?,
                })
            }

            fn run(&self, stream: &Stream, context: &mut RemoveQueryBiasContext) -> Result<()> {
                self.check_invariants();
                remove_query_bias(stream, &self.qids, &self.qid_offsets, &self.dest, context, $statistic)
            }
        }
    };
}

remove_query_bias_kernel!(
    /// Subtract every group's mean from its rows
    RemoveQueryMeans,
    "remove_query_means",
    kernels::compute_group_means
);

remove_query_bias_kernel!(
    /// Subtract every group's maximum from its rows
    RemoveQueryMax,
    "remove_query_max",
    kernels::compute_group_max
);
