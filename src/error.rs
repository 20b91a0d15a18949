use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

use crate::device::DeviceId;

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, FsetErr>;

/// The function set's error type.
#[derive(Debug)]
pub enum FsetErr {
    NotAFunction {
        name: String,
        reason: String,
    },
    NameNotFound {
        name: String,
    },
    TypeMismatch {
        name: String,
        expected: &'static str,
    },
    Underflow {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Overflow {
        what: &'static str,
        expected: usize,
    },
    ShapeMismatch {
        name: String,
        index: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    NotOnHost {
        name: String,
    },
    DeviceMismatch {
        got: DeviceId,
        expected: DeviceId,
    },
    Storage {
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    Config(serde_json::Error),
    Io(io::Error),
}

impl Display for FsetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsetErr::NotAFunction { name, reason } => {
                write!(f, "'{name}' is not a usable function: {reason}")
            }
            FsetErr::NameNotFound { name } => write!(f, "no function named '{name}'"),
            FsetErr::TypeMismatch { name, expected } => {
                write!(f, "function '{name}' is not a {expected}")
            }
            FsetErr::Underflow {
                what,
                got,
                expected,
            } => write!(
                f,
                "not enough {what} to redistribute, got {got} and expected {expected}"
            ),
            FsetErr::Overflow { what, expected } => write!(
                f,
                "too many {what} to redistribute, got more than the expected {expected}"
            ),
            FsetErr::ShapeMismatch {
                name,
                index,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch at slot {index} of '{name}', got {got:?} and expected {expected:?}"
            ),
            FsetErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "there's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            FsetErr::NotOnHost { name } => {
                write!(f, "function '{name}' has buffers resident on a device")
            }
            FsetErr::DeviceMismatch { got, expected } => {
                write!(f, "buffer lives on {got} but the transfer goes through {expected}")
            }
            FsetErr::Storage { got, expected } => write!(
                f,
                "device storage holds {got} bytes but the shape needs {expected}"
            ),
            FsetErr::Shape(e) => write!(f, "shape error: {e}"),
            FsetErr::Config(e) => write!(f, "invalid config: {e}"),
            FsetErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FsetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FsetErr::Shape(e) => Some(e),
            FsetErr::Config(e) => Some(e),
            FsetErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for FsetErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<serde_json::Error> for FsetErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value)
    }
}

impl From<io::Error> for FsetErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
