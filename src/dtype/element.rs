//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

/// Trait for types that can be stored in a device buffer
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - handles cross thread boundaries freely
/// - `Pod + Zeroable` - host/device copies are plain byte moves (bytemuck)
/// - `PartialOrd + Debug` - comparisons and diagnostics in kernels and tests
pub trait Element: Copy + Send + Sync + Pod + Zeroable + PartialOrd + Debug + 'static {
    /// The corresponding DType for this Rust type
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for u64 {
    const DTYPE: DType = DType::U64;
}

impl Element for u32 {
    const DTYPE: DType = DType::U32;
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;
}
