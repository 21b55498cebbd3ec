//! Layout of a logical buffer across devices

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-device element counts of a distributed buffer
///
/// Devices with a zero count hold nothing and are skipped when a kernel fans
/// out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    sizes: Vec<usize>,
}

impl Mapping {
    /// Everything on `device`, nothing elsewhere
    pub fn single(device_count: usize, device: usize, len: usize) -> Result<Self> {
        if device >= device_count {
            return Err(Error::invalid_argument(
                "device",
                format!("device {device} out of range for {device_count} devices"),
            ));
        }
        let mut sizes = vec![0; device_count];
        sizes[device] = len;
        Ok(Self { sizes })
    }

    /// A full copy of `len` elements on every device
    pub fn mirror(device_count: usize, len: usize) -> Self {
        Self {
            sizes: vec![len; device_count],
        }
    }

    /// `len` elements split into contiguous, nearly equal stripes
    ///
    /// The first `len % device_count` devices get one extra element.
    pub fn stripe(device_count: usize, len: usize) -> Self {
        if device_count == 0 {
            return Self { sizes: Vec::new() };
        }
        let base = len / device_count;
        let extra = len % device_count;
        Self {
            sizes: (0..device_count).map(|d| base + usize::from(d < extra)).collect(),
        }
    }

    /// Explicit per-device counts
    pub fn from_sizes(sizes: Vec<usize>) -> Self {
        Self { sizes }
    }

    /// Number of devices the mapping spans
    pub fn device_count(&self) -> usize {
        self.sizes.len()
    }

    /// Element count on `device` (0 for unknown devices)
    pub fn size(&self, device: usize) -> usize {
        self.sizes.get(device).copied().unwrap_or(0)
    }

    /// Per-device counts
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Sum over all devices
    pub fn total_len(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Devices holding at least one element, ascending
    pub fn non_empty_devices(&self) -> Vec<usize> {
        self.sizes
            .iter()
            .enumerate()
            .filter_map(|(d, &size)| (size > 0).then_some(d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_spreads_remainder() {
        let mapping = Mapping::stripe(3, 10);
        assert_eq!(mapping.sizes(), &[4, 3, 3]);
        assert_eq!(mapping.total_len(), 10);
    }

    #[test]
    fn test_non_empty_devices() {
        assert_eq!(Mapping::stripe(4, 2).non_empty_devices(), vec![0, 1]);
        assert_eq!(Mapping::mirror(2, 5).non_empty_devices(), vec![0, 1]);
        assert_eq!(Mapping::single(3, 2, 1).unwrap().non_empty_devices(), vec![2]);
        assert!(Mapping::mirror(3, 0).non_empty_devices().is_empty());
    }

    #[test]
    fn test_single_rejects_unknown_device() {
        assert!(Mapping::single(2, 2, 1).is_err());
    }
}
