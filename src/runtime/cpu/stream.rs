//! Numbered execution streams
//!
//! Every stream is a FIFO queue drained by one worker thread. `enqueue`
//! returns immediately; results become visible after `synchronize`. Streams
//! of the same device do not order against each other. Allocation locks keep
//! their kernels from racing, but two kernels that read and write the same
//! pair of allocations in opposite roles on different streams can wait on
//! each other forever; order them with `synchronize`.

use super::client::CpuAllocator;
use crate::buffer::{BufferPtr, ConstPtr, MemoryPlacement, PtrType};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::memory::{BufferRegistry, DeviceMemory, DeviceView, DeviceViewMut, MemoryManager};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Work item executed on a stream worker
pub type Job = Box<dyn FnOnce(&Stream) -> Result<()> + Send + 'static>;

/// Execution context seen by a kernel running on a device stream
#[derive(Clone, Debug)]
pub struct Stream {
    device: usize,
    index: u32,
    registry: Arc<BufferRegistry>,
    allocator: CpuAllocator,
}

impl Stream {
    pub(crate) fn new(index: u32, registry: Arc<BufferRegistry>, allocator: CpuAllocator) -> Self {
        Self {
            device: registry.device(),
            index,
            registry,
            allocator,
        }
    }

    /// Device this stream runs on
    pub fn device(&self) -> usize {
        self.device
    }

    /// Stream number on the device
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Resolve a read-only handle into a typed view
    pub fn view<T: Element, P: MemoryPlacement>(&self, ptr: &ConstPtr<T, P>) -> Result<DeviceView<T>> {
        let memory = self.resolve(ptr.device(), ptr.handle(), ptr.len(), P::PTR_TYPE)?;
        DeviceView::new(memory, ptr.offset(), ptr.len())
    }

    /// Resolve a mutable handle into a typed view
    pub fn view_mut<T: Element, P: MemoryPlacement>(
        &self,
        ptr: &BufferPtr<T, P>,
    ) -> Result<DeviceViewMut<T>> {
        let memory = self.resolve(ptr.device(), ptr.handle(), ptr.len(), P::PTR_TYPE)?;
        DeviceViewMut::new(memory, ptr.offset(), ptr.len())
    }

    /// Scratch allocator for one kernel invocation
    pub fn memory_manager(&self) -> MemoryManager {
        MemoryManager::new(self.allocator.clone())
    }

    fn resolve(
        &self,
        device: usize,
        handle: u64,
        len: usize,
        placement: PtrType,
    ) -> Result<Option<Arc<DeviceMemory>>> {
        if device != self.device {
            return Err(Error::DeviceMismatch {
                expected: device,
                got: self.device,
            });
        }
        if len == 0 {
            return Ok(None);
        }
        let memory = self
            .registry
            .get(handle)
            .ok_or(Error::BufferReleased { handle })?;
        if memory.placement() != placement {
            return Err(Error::invalid_argument(
                "handle",
                format!(
                    "buffer {handle} is {:?} memory, kernel expects {placement:?}",
                    memory.placement()
                ),
            ));
        }
        Ok(Some(memory))
    }
}

#[derive(Default)]
struct QueueState {
    pending: usize,
    first_error: Option<String>,
}

#[derive(Default)]
struct QueueShared {
    state: Mutex<QueueState>,
    idle: Condvar,
}

/// Host-side owner of a stream worker
pub struct StreamQueue {
    stream: Stream,
    sender: Mutex<Option<Sender<Job>>>,
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamQueue {
    /// Start the worker thread for `stream`
    pub fn spawn(stream: Stream) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let shared = Arc::new(QueueShared::default());

        let worker = thread::Builder::new()
            .name(format!("boostkern-d{}-s{}", stream.device, stream.index))
            .spawn({
                let stream = stream.clone();
                let shared = Arc::clone(&shared);
                move || worker_loop(stream, receiver, shared)
            })
            .map_err(|e| Error::Internal(format!("failed to start stream worker: {e}")))?;

        Ok(Self {
            stream,
            sender: Mutex::new(Some(sender)),
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Kernel-side view of this stream
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Queue a job and return without waiting for it
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.shared.state.lock().pending += 1;

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            self.finish_one(None);
            return Err(Error::Internal(format!(
                "stream {} on device {} is shut down",
                self.stream.index, self.stream.device
            )));
        }
        Ok(())
    }

    /// Number of jobs queued or running
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending
    }

    /// Block until the queue drains; report and clear the first failure
    pub fn synchronize(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.pending > 0 {
            self.shared.idle.wait(&mut state);
        }
        match state.first_error.take() {
            Some(reason) => Err(Error::StreamFailed {
                device: self.stream.device,
                stream: self.stream.index,
                reason,
            }),
            None => Ok(()),
        }
    }

    fn finish_one(&self, failure: Option<String>) {
        complete(&self.shared, failure);
    }
}

impl fmt::Debug for StreamQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamQueue")
            .field("device", &self.stream.device)
            .field("index", &self.stream.index)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.sender.get_mut().take();
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}

fn complete(shared: &QueueShared, failure: Option<String>) {
    let mut state = shared.state.lock();
    if state.first_error.is_none() {
        state.first_error = failure;
    }
    state.pending -= 1;
    if state.pending == 0 {
        shared.idle.notify_all();
    }
}

fn worker_loop(stream: Stream, receiver: Receiver<Job>, shared: Arc<QueueShared>) {
    for job in receiver {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&stream)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(reason) = &failure {
            tracing::warn!(
                device = stream.device,
                stream = stream.index,
                %reason,
                "stream job failed"
            );
        }
        complete(&shared, failure);
    }
    tracing::trace!(device = stream.device, stream = stream.index, "stream worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("kernel panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("kernel panicked: {msg}")
    } else {
        "kernel panicked".to_string()
    }
}
