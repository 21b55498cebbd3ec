//! Common test utilities
#![allow(dead_code)]

use boostkern::buffer::{DeviceBuffer, Mapping};
use boostkern::dtype::Element;
use boostkern::options::ClusterConfig;
use boostkern::runtime::Cluster;

/// Create a cluster of `devices` simulated devices with default streams
pub fn create_cluster(devices: usize) -> Cluster {
    Cluster::new(ClusterConfig::with_devices(devices)).expect("cluster should start")
}

/// Upload `data` to a single device of the cluster
pub fn on_device<T: Element>(cluster: &Cluster, device: usize, data: &[T]) -> DeviceBuffer<T> {
    let mapping = Mapping::single(cluster.device_count(), device, data.len()).unwrap();
    DeviceBuffer::from_slice(cluster, mapping, data).unwrap()
}

/// Zeroed buffer of `len` elements on a single device
pub fn zeros_on_device<T: Element>(cluster: &Cluster, device: usize, len: usize) -> DeviceBuffer<T> {
    let mapping = Mapping::single(cluster.device_count(), device, len).unwrap();
    DeviceBuffer::new(cluster, mapping).unwrap()
}

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
