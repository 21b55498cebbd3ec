//! Fan-out of one kernel type over a set of devices

use super::{Kernel, KernelTask};
use crate::error::Result;
use crate::runtime::Cluster;
use crate::runtime::cpu::{Stream, StreamQueue};

/// Launch one descriptor per device on stream `stream` and return without
/// waiting
///
/// `build` produces the descriptor for a device. Every descriptor is built,
/// checked and encoded before the first one is enqueued, so
/// a failure on any device leaves all devices untouched.
///
/// # Panics
/// If a descriptor violates a kernel invariant.
pub fn launch_kernels<K, F>(cluster: &Cluster, devices: &[usize], stream: u32, mut build: F) -> Result<()>
where
    K: Kernel + Into<KernelTask>,
    F: FnMut(usize) -> Result<K>,
{
    let mut launches: Vec<(&StreamQueue, Vec<u8>)> = Vec::with_capacity(devices.len());
    for &device in devices {
        let kernel = build(device)?;
        kernel.check_invariants();
        kernel.validate()?;
        let queue = cluster.stream(device, stream)?;
        launches.push((queue, kernel.into().encode()?));
    }

    for (queue, bytes) in launches {
        tracing::debug!(
            kernel = K::NAME,
            device = queue.stream().device(),
            stream,
            bytes = bytes.len(),
            "enqueue kernel"
        );
        queue.enqueue(Box::new(move |stream: &Stream| -> Result<()> {
            KernelTask::decode(&bytes)?.execute(stream)
        }))?;
    }
    Ok(())
}
