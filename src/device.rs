use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::{
    config::DeviceConfig,
    error::{FsetErr, Result},
};

/// Identifies a compute device by its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// An array resident in device memory.
///
/// The storage is opaque to the host, it can only be read back through
/// the `Device` that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceArray {
    device: DeviceId,
    shape: Vec<usize>,
    storage: Vec<u8>,
}

impl DeviceArray {
    /// Wraps raw device storage.
    ///
    /// # Arguments
    /// * `device` - The device holding the storage.
    /// * `shape` - The logical shape of the array.
    /// * `storage` - The `f32` elements as raw bytes.
    ///
    /// # Returns
    /// A new `DeviceArray` or `FsetErr::Storage` if the storage doesn't fit the shape.
    pub fn new(device: DeviceId, shape: Vec<usize>, storage: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * size_of::<f32>();

        if storage.len() != expected {
            return Err(FsetErr::Storage {
                got: storage.len(),
                expected,
            });
        }

        Ok(Self {
            device,
            shape,
            storage,
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The amount of `f32` elements in the array.
    pub fn len(&self) -> usize {
        self.storage.len() / size_of::<f32>()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn storage(&self) -> &[u8] {
        &self.storage
    }
}

/// The transfer primitives between host and a single device.
///
/// Device selection is explicit: every transfer goes through a `Device`
/// value, there is no process-wide current device.
pub trait Device {
    /// The device this handle transfers to and from.
    fn id(&self) -> DeviceId;

    /// Copies a host array into device memory.
    fn upload(&self, host: &ArrayD<f32>) -> Result<DeviceArray>;

    /// Copies a device array back into host memory.
    ///
    /// # Returns
    /// `FsetErr::DeviceMismatch` if `array` doesn't live on this device.
    fn download(&self, array: &DeviceArray) -> Result<ArrayD<f32>>;
}

/// A device whose memory is a separate host allocation.
///
/// Elements are stored as native-endian `f32` bytes, so a round trip
/// through it is bit exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorDevice {
    id: DeviceId,
}

impl MirrorDevice {
    /// Creates a new `MirrorDevice`.
    ///
    /// # Arguments
    /// * `config` - Selects the device ordinal.
    ///
    /// # Returns
    /// A new `MirrorDevice` instance.
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            id: DeviceId(config.ordinal),
        }
    }
}

impl Device for MirrorDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn upload(&self, host: &ArrayD<f32>) -> Result<DeviceArray> {
        let elems: Vec<f32> = host.iter().copied().collect();
        let storage = bytemuck::cast_slice::<f32, u8>(&elems).to_vec();
        DeviceArray::new(self.id, host.shape().to_vec(), storage)
    }

    fn download(&self, array: &DeviceArray) -> Result<ArrayD<f32>> {
        if array.device != self.id {
            return Err(FsetErr::DeviceMismatch {
                got: array.device,
                expected: self.id,
            });
        }

        let elems: Vec<f32> = array
            .storage
            .chunks_exact(size_of::<f32>())
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        let host = ArrayD::from_shape_vec(IxDyn(&array.shape), elems)?;
        Ok(host)
    }
}
