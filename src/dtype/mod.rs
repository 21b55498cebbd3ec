//! Element types that can live in device buffers

mod element;

pub use element::Element;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime tag for the element type of a device buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DType {
    /// 32-bit floating point (feature values, borders, weights)
    F32 = 1,
    /// 64-bit unsigned integer (seeds, sort keys)
    U64 = 20,
    /// 32-bit unsigned integer (group ids, offsets, compressed index words)
    U32 = 21,
    /// 8-bit unsigned integer (binarized feature values)
    U8 = 23,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::U64 => 8,
            Self::F32 | Self::U32 => 4,
            Self::U8 => 1,
        }
    }

    /// Short lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::U64 => "u64",
            Self::U32 => "u32",
            Self::U8 => "u8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_rust_types() {
        assert_eq!(DType::F32.size_in_bytes(), std::mem::size_of::<f32>());
        assert_eq!(DType::U64.size_in_bytes(), std::mem::size_of::<u64>());
        assert_eq!(DType::U32.size_in_bytes(), std::mem::size_of::<u32>());
        assert_eq!(DType::U8.size_in_bytes(), std::mem::size_of::<u8>());
    }

    #[test]
    fn test_element_dtype() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<u8 as Element>::DTYPE.to_string(), "u8");
    }
}
