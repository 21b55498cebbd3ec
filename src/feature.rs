//! Placement of a binarized feature inside the compressed index

use serde::{Deserialize, Serialize};

/// Where a feature's bucket id lives inside the packed 32-bit index words
///
/// The compressed index is a flat `u32` array. Every feature owns a block of
/// words starting at `offset` (one word per document) and a bit field inside
/// each word: the bucket is stored as `(bin & mask) << shift`.
///
/// `offset == None` marks a feature that has not been placed yet. Writers
/// require a placed feature with a non-zero mask.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackedFeature {
    /// Word offset of the feature block inside the compressed index
    pub offset: Option<u64>,
    /// Bit position of the field inside a word
    pub shift: u32,
    /// Unshifted bit mask of the field
    pub mask: u32,
    /// Index of this feature's first fold in the global fold numbering
    pub first_fold_index: u32,
    /// Number of folds (bucket count) of the feature
    pub folds: u32,
    /// One-hot encoded categorical feature
    pub one_hot: bool,
    /// First bin is excluded from split scoring
    pub skip_first_bin_in_score_count: bool,
}

impl PackedFeature {
    /// Feature stored at `offset` in bits `[shift, shift + bits)`
    pub fn new(offset: u64, shift: u32, bits: u32) -> Self {
        let mask = if bits >= 32 {
            u32::MAX
        } else {
            (1u32 << bits) - 1
        };
        Self {
            offset: Some(offset),
            shift,
            mask,
            folds: mask,
            ..Self::default()
        }
    }

    /// Returns true if the feature can be written to the index
    pub fn is_placed(&self) -> bool {
        self.offset.is_some() && self.mask != 0
    }

    /// Word offset as an index, if placed
    pub fn word_offset(&self) -> Option<usize> {
        self.offset.map(|o| o as usize)
    }

    /// Mask of the field in word coordinates
    #[inline]
    pub fn field_mask(&self) -> u32 {
        self.mask.checked_shl(self.shift).unwrap_or(0)
    }

    /// Encode a bucket id into the feature's bit field
    #[inline]
    pub fn encode(&self, bin: u32) -> u32 {
        (bin & self.mask).checked_shl(self.shift).unwrap_or(0)
    }

    /// Extract this feature's bucket id from a packed word
    #[inline]
    pub fn decode(&self, word: u32) -> u32 {
        word.checked_shr(self.shift).unwrap_or(0) & self.mask
    }

    /// Replace this feature's field in `word` with `bin`
    #[inline]
    pub fn store(&self, word: u32, bin: u32) -> u32 {
        (word & !self.field_mask()) | self.encode(bin)
    }
}
