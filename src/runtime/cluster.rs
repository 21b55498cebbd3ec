//! A fixed set of simulated devices

use super::RuntimeClient;
use super::cpu::{CpuClient, CpuDevice, StreamQueue};
use crate::error::{Error, Result};
use crate::options::ClusterConfig;

/// All devices of one process, each with its own client and streams
#[derive(Clone, Debug)]
pub struct Cluster {
    config: ClusterConfig,
    clients: Vec<CpuClient>,
}

impl Cluster {
    /// Start every device and its stream workers
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let clients = (0..config.device_count)
            .map(|id| CpuClient::new(CpuDevice::new(id), config.streams_per_device))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            devices = config.device_count,
            streams_per_device = config.streams_per_device,
            "cluster started"
        );
        Ok(Self { config, clients })
    }

    /// Config the cluster was built from
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Number of devices
    pub fn device_count(&self) -> usize {
        self.clients.len()
    }

    /// Client of `device`
    pub fn device(&self, device: usize) -> Result<&CpuClient> {
        self.clients.get(device).ok_or_else(|| {
            Error::invalid_argument(
                "device",
                format!("device {device} out of range for {} devices", self.clients.len()),
            )
        })
    }

    /// Stream `index` of `device`
    pub fn stream(&self, device: usize, index: u32) -> Result<&StreamQueue> {
        self.device(device)?.queue(index)
    }

    /// Wait for every stream of every device; report the first failure
    pub fn synchronize(&self) -> Result<()> {
        let mut first = None;
        for client in &self.clients {
            if let Err(err) = client.synchronize() {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
