use ndarray::ArrayD;

use crate::{
    device::{Device, DeviceArray, DeviceId},
    error::Result,
};

/// A parameter or gradient buffer, resident either on host or on a device.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Host(ArrayD<f32>),
    Device(DeviceArray),
}

impl Buffer {
    pub fn shape(&self) -> &[usize] {
        match self {
            Buffer::Host(a) => a.shape(),
            Buffer::Device(a) => a.shape(),
        }
    }

    /// The amount of `f32` elements in the buffer.
    pub fn len(&self) -> usize {
        match self {
            Buffer::Host(a) => a.len(),
            Buffer::Device(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Buffer::Host(_))
    }

    /// The device holding this buffer, `None` if it's on host.
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Buffer::Host(_) => None,
            Buffer::Device(a) => Some(a.device()),
        }
    }

    pub fn as_host(&self) -> Option<&ArrayD<f32>> {
        match self {
            Buffer::Host(a) => Some(a),
            Buffer::Device(_) => None,
        }
    }

    pub fn as_host_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        match self {
            Buffer::Host(a) => Some(a),
            Buffer::Device(_) => None,
        }
    }

    /// Moves the buffer to `device` in place.
    ///
    /// Device buffers are left untouched, whichever device they live on.
    ///
    /// # Returns
    /// Whether a transfer took place.
    pub fn move_to_device<D: Device + ?Sized>(&mut self, device: &D) -> Result<bool> {
        match self {
            Buffer::Host(a) => {
                let on_device = device.upload(a)?;
                *self = Buffer::Device(on_device);
                Ok(true)
            }
            Buffer::Device(_) => Ok(false),
        }
    }

    /// Moves the buffer back to host memory in place, reading it through `device`.
    ///
    /// Host buffers are left untouched.
    ///
    /// # Returns
    /// Whether a transfer took place.
    pub fn move_to_host<D: Device + ?Sized>(&mut self, device: &D) -> Result<bool> {
        match self {
            Buffer::Host(_) => Ok(false),
            Buffer::Device(a) => {
                let on_host = device.download(a)?;
                *self = Buffer::Host(on_host);
                Ok(true)
            }
        }
    }
}

impl From<ArrayD<f32>> for Buffer {
    fn from(value: ArrayD<f32>) -> Self {
        Self::Host(value)
    }
}

impl From<DeviceArray> for Buffer {
    fn from(value: DeviceArray) -> Self {
        Self::Device(value)
    }
}
