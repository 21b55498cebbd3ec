//! Device buffers and the handles kernels carry
//!
//! [`DeviceBuffer`] owns memory on the host side. Kernels only ever see
//! [`BufferPtr`] / [`ConstPtr`] handles, which serialize to a few integers and
//! are resolved by the executing stream.

mod device_buffer;
mod distributed;
mod mapping;
mod placement;
mod ptr;

pub use device_buffer::DeviceBuffer;
pub use distributed::DistributedObject;
pub use mapping::Mapping;
pub use placement::{DeviceLocal, HostPinned, MemoryPlacement, PtrType};
pub use ptr::{Allocation, BufferPtr, ConstPtr};
