//! Binarization descriptors

use super::{Kernel, ensure_exclusive};
use crate::buffer::{BufferPtr, ConstPtr, DeviceLocal, MemoryPlacement};
use crate::error::{Error, Result};
use crate::feature::PackedFeature;
use crate::options::BorderSelectionType;
use crate::runtime::cpu::{Stream, kernels};
use serde::{Deserialize, Serialize};

fn ensure_block_fits(offset: usize, rows: usize, words: usize) -> Result<()> {
    match offset.checked_add(rows) {
        Some(end) if end <= words => Ok(()),
        _ => Err(Error::invalid_argument(
            "dst",
            format!("feature block [{offset}, +{rows}) exceeds index of {words} words"),
        )),
    }
}

/// Compute split borders of one feature into `[count, borders...]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindBordersKernel {
    /// Raw feature values
    pub feature: ConstPtr<f32>,
    /// Destination, at least `border_count + 1` slots
    pub dst: BufferPtr<f32>,
    /// Requested number of borders
    pub border_count: u32,
    /// Selection mode; only `Median` and `Uniform` run on device
    pub border_type: BorderSelectionType,
}

impl FindBordersKernel {
    /// Build a border-finding descriptor
    pub fn new(
        feature: ConstPtr<f32>,
        dst: BufferPtr<f32>,
        border_count: u32,
        border_type: BorderSelectionType,
    ) -> Self {
        Self {
            feature,
            dst,
            border_count,
            border_type,
        }
    }
}

impl Kernel for FindBordersKernel {
    type Context = ();
    const NAME: &'static str = "find_borders";

    fn validate(&self) -> Result<()> {
        if self.dst.len() <= self.border_count as usize {
            return Err(Error::BorderCountTooLarge {
                border_count: self.border_count,
                dst_len: self.dst.len(),
            });
        }
        if !self.border_type.is_device_supported() {
            return Err(Error::UnsupportedBorderSelection {
                selection: self.border_type,
            });
        }
        ensure_exclusive(&[("dst", self.dst.allocation())], &[self.feature.allocation()])
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        self.validate()?;
        let values = stream.view(&self.feature)?;
        let mut dst = stream.view_mut(&self.dst)?;
        match self.border_type {
            BorderSelectionType::Median => kernels::fast_borders(&values, self.border_count, &mut dst),
            BorderSelectionType::Uniform => kernels::uniform_borders(&values, self.border_count, &mut dst),
            selection => return Err(Error::UnsupportedBorderSelection { selection }),
        }
        Ok(())
    }
}

/// Bucketize float values into a feature's bit field of the compressed index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinarizeFloatFeatureKernel {
    /// Raw values, one per row
    pub values: ConstPtr<f32>,
    /// Borders in `[count, borders...]` layout
    pub borders: ConstPtr<f32>,
    /// Placement of the feature inside `dst`
    pub feature: PackedFeature,
    /// Compressed index
    pub dst: BufferPtr<u32>,
    /// Row `i` reads `values[gather_index[i]]` when set
    pub gather_index: Option<ConstPtr<u32>>,
    /// Merge bits with atomic OR instead of a plain store
    pub atomic_update: bool,
}

impl Kernel for BinarizeFloatFeatureKernel {
    type Context = ();
    const NAME: &'static str = "binarize_float_feature";

    fn validate(&self) -> Result<()> {
        let offset = self
            .feature
            .word_offset()
            .ok_or_else(|| Error::invalid_argument("feature", "feature has no index offset"))?;
        let rows = self.values.len();
        ensure_block_fits(offset, rows, self.dst.len())?;
        if let Some(gather) = &self.gather_index {
            if gather.len() < rows {
                return Err(Error::invalid_argument(
                    "gather_index",
                    format!("gather index holds {} rows, need {rows}", gather.len()),
                ));
            }
        }
        ensure_exclusive(
            &[("dst", self.dst.allocation())],
            &[
                self.values.allocation(),
                self.borders.allocation(),
                self.gather_index.and_then(|gather| gather.allocation()),
            ],
        )
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        self.validate()?;
        let offset = self.feature.word_offset().unwrap_or_default();
        let rows = self.values.len();

        let values = stream.view(&self.values)?;
        let borders = stream.view(&self.borders)?;
        let gather = self.gather_index.as_ref().map(|g| stream.view(g)).transpose()?;
        let mut dst = stream.view_mut(&self.dst)?;

        if self.atomic_update {
            let block = &dst.as_atomic()[offset..offset + rows];
            kernels::binarize_float_feature_atomic(&values, &borders, &self.feature, gather.as_deref(), block);
        } else {
            let block = &mut dst[offset..offset + rows];
            kernels::binarize_float_feature(&values, &borders, &self.feature, gather.as_deref(), block);
        }
        Ok(())
    }
}

/// Pack one-byte bins into a feature's bit field of the compressed index
///
/// Generic over where the bins live; pinned host and device-local sources
/// behave the same.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct WriteCompressedIndexKernel<P: MemoryPlacement = DeviceLocal> {
    /// Binarized feature, one bucket per row
    pub bins: ConstPtr<u8, P>,
    /// Placement of the feature inside `dst`
    pub feature: PackedFeature,
    /// Compressed index
    pub dst: BufferPtr<u32>,
}

impl<P: MemoryPlacement> WriteCompressedIndexKernel<P> {
    /// Build a write descriptor
    pub fn new(bins: ConstPtr<u8, P>, feature: PackedFeature, dst: BufferPtr<u32>) -> Self {
        Self { bins, feature, dst }
    }
}

impl<P: MemoryPlacement> Clone for WriteCompressedIndexKernel<P> {
    fn clone(&self) -> Self {
        Self {
            bins: self.bins,
            feature: self.feature,
            dst: self.dst,
        }
    }
}

impl<P: MemoryPlacement> std::fmt::Debug for WriteCompressedIndexKernel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCompressedIndexKernel")
            .field("bins", &self.bins)
            .field("feature", &self.feature)
            .field("dst", &self.dst)
            .finish()
    }
}

impl<P: MemoryPlacement> PartialEq for WriteCompressedIndexKernel<P> {
    fn eq(&self, other: &Self) -> bool {
        self.bins == other.bins && self.feature == other.feature && self.dst == other.dst
    }
}

impl<P: MemoryPlacement> Kernel for WriteCompressedIndexKernel<P> {
    type Context = ();
    const NAME: &'static str = "write_compressed_index";

    fn check_invariants(&self) {
        assert!(self.feature.mask != 0, "feature mask must be non-zero");
        assert!(self.feature.offset.is_some(), "feature offset must be set");
    }

    fn validate(&self) -> Result<()> {
        let offset = self.feature.word_offset().unwrap_or_default();
        ensure_block_fits(offset, self.bins.len(), self.dst.len())?;
        ensure_exclusive(&[("dst", self.dst.allocation())], &[self.bins.allocation()])
    }

    fn run(&self, stream: &Stream, _context: &mut ()) -> Result<()> {
        self.check_invariants();
        self.validate()?;
        let offset = self.feature.word_offset().unwrap_or_default();

        let bins = stream.view(&self.bins)?;
        let mut dst = stream.view_mut(&self.dst)?;
        kernels::write_compressed_index(&self.feature, &bins, &mut dst[offset..offset + bins.len()]);
        Ok(())
    }
}
