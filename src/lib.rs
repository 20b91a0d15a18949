pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod function;
pub mod functions;
pub mod layout;
pub mod set;

pub use buffer::Buffer;
pub use config::{DeviceConfig, LengthPolicy, SetConfig};
pub use device::{Device, DeviceArray, DeviceId, MirrorDevice};
pub use error::{FsetErr, Result};
pub use function::Function;
pub use layout::{FlatLayout, Segment};
pub use set::{FunctionSet, FunctionSetBuilder};
