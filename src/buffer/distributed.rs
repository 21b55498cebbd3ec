//! Per-device scalar values

use serde::{Deserialize, Serialize};

/// A value that may differ per device, such as a feature placement or a
/// group-offset bias
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributedObject<T> {
    /// Same value on every device
    Uniform(T),
    /// One value per device
    PerDevice(Vec<T>),
}

impl<T: Clone> DistributedObject<T> {
    /// One value per device
    pub fn per_device(values: Vec<T>) -> Self {
        Self::PerDevice(values)
    }

    /// Value for `device`, if the object covers it
    pub fn at(&self, device: usize) -> Option<T> {
        match self {
            Self::Uniform(value) => Some(value.clone()),
            Self::PerDevice(values) => values.get(device).cloned(),
        }
    }
}

impl<T> From<T> for DistributedObject<T> {
    fn from(value: T) -> Self {
        Self::Uniform(value)
    }
}
