//! Configuration values consumed by the kernels and the runtime
//!
//! These are plain data. Parsing them out of command lines or config files
//! is left to the training pipeline.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy used to pick split thresholds for a float feature
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderSelectionType {
    /// Quantile (median split) borders
    Median,
    /// Greedy log-sum borders
    #[default]
    GreedyLogSum,
    /// Half uniform, half quantile borders
    UniformAndQuantiles,
    /// Minimum entropy borders
    MinEntropy,
    /// Maximum log-sum borders
    MaxLogSum,
    /// Evenly spaced borders over the value range
    Uniform,
    /// Greedy minimum entropy borders
    GreedyMinEntropy,
}

impl BorderSelectionType {
    /// All selection modes, in declaration order
    pub const ALL: [BorderSelectionType; 7] = [
        Self::Median,
        Self::GreedyLogSum,
        Self::UniformAndQuantiles,
        Self::MinEntropy,
        Self::MaxLogSum,
        Self::Uniform,
        Self::GreedyMinEntropy,
    ];

    /// Canonical name of the mode
    pub const fn name(self) -> &'static str {
        match self {
            Self::Median => "Median",
            Self::GreedyLogSum => "GreedyLogSum",
            Self::UniformAndQuantiles => "UniformAndQuantiles",
            Self::MinEntropy => "MinEntropy",
            Self::MaxLogSum => "MaxLogSum",
            Self::Uniform => "Uniform",
            Self::GreedyMinEntropy => "GreedyMinEntropy",
        }
    }

    /// Whether border finding on device supports this mode
    pub const fn is_device_supported(self) -> bool {
        matches!(self, Self::Median | Self::Uniform)
    }
}

impl fmt::Display for BorderSelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BorderSelectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::invalid_argument(
                    "border_selection_type",
                    format!("unknown border selection type '{s}'"),
                )
            })
    }
}

/// Binarization settings for one float feature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizationOptions {
    /// How borders are chosen
    pub border_selection_type: BorderSelectionType,
    /// Number of borders to produce
    pub border_count: u32,
}

impl Default for BinarizationOptions {
    fn default() -> Self {
        Self {
            border_selection_type: BorderSelectionType::default(),
            border_count: 128,
        }
    }
}

impl BinarizationOptions {
    /// Create options for the given mode and border count
    pub fn new(border_selection_type: BorderSelectionType, border_count: u32) -> Self {
        Self {
            border_selection_type,
            border_count,
        }
    }
}

/// Shape of the simulated device cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of devices
    pub device_count: usize,
    /// Number of independent streams created on every device
    pub streams_per_device: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            streams_per_device: 4,
        }
    }
}

impl ClusterConfig {
    /// Config with `device_count` devices and the default stream count
    pub fn with_devices(device_count: usize) -> Self {
        Self {
            device_count,
            ..Self::default()
        }
    }

    /// Check that the cluster can be built
    pub fn validate(&self) -> Result<()> {
        if self.device_count == 0 {
            return Err(Error::invalid_argument(
                "device_count",
                "cluster needs at least one device",
            ));
        }
        if self.streams_per_device == 0 {
            return Err(Error::invalid_argument(
                "streams_per_device",
                "every device needs at least one stream",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_selection_parse_display() {
        for mode in BorderSelectionType::ALL {
            let parsed: BorderSelectionType = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert_eq!(
            "median".parse::<BorderSelectionType>().unwrap(),
            BorderSelectionType::Median
        );
        assert!("Quantile".parse::<BorderSelectionType>().is_err());
    }

    #[test]
    fn test_device_supported_modes() {
        let supported: Vec<_> = BorderSelectionType::ALL
            .into_iter()
            .filter(|m| m.is_device_supported())
            .collect();
        assert_eq!(
            supported,
            [BorderSelectionType::Median, BorderSelectionType::Uniform]
        );
    }

    #[test]
    fn test_defaults() {
        let opts = BinarizationOptions::default();
        assert_eq!(opts.border_selection_type, BorderSelectionType::GreedyLogSum);
        assert_eq!(opts.border_count, 128);

        let config = ClusterConfig::default();
        assert_eq!(config.device_count, 1);
        assert!(config.validate().is_ok());
        assert!(ClusterConfig::with_devices(0).validate().is_err());
    }

    #[test]
    fn test_options_bincode() {
        let opts = BinarizationOptions::new(BorderSelectionType::Uniform, 32);
        let bytes = bincode::serialize(&opts).unwrap();
        let back: BinarizationOptions = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, opts);
    }
}
