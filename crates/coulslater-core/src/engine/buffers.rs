use super::device::{Device, DeviceError};
use std::mem::size_of;
use std::sync::Arc;

/// A buffer in device memory.
///
/// Allocation charges `len * size_of::<T>()` bytes against the device's memory
/// pool; dropping the buffer returns them.
pub struct DeviceVec<T: Copy + Default> {
    data: Vec<T>,
    device: Arc<Device>,
}

impl<T: Copy + Default> DeviceVec<T> {
    pub fn alloc(device: &Arc<Device>, len: usize) -> Result<Self, DeviceError> {
        device.reserve(len * size_of::<T>())?;
        Ok(Self {
            data: vec![T::default(); len],
            device: Arc::clone(device),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.data.len() * size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Host-to-device copy into the front of the buffer.
    pub fn upload(&mut self, host: &[T]) -> Result<(), DeviceError> {
        if host.len() > self.data.len() {
            return Err(DeviceError::OutOfMemory {
                requested: host.len() * size_of::<T>(),
                available: self.bytes(),
            });
        }
        self.data[..host.len()].copy_from_slice(host);
        Ok(())
    }

    /// Device-to-host copy of the first `len` elements.
    pub fn download(&self, len: usize) -> &[T] {
        &self.data[..len.min(self.data.len())]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Copy + Default> Drop for DeviceVec<T> {
    fn drop(&mut self) {
        self.device.release(self.bytes());
    }
}

impl<T: Copy + Default> std::fmt::Debug for DeviceVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceVec")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes())
            .finish()
    }
}
