pub mod backend;
pub mod error;
pub mod iter;
pub mod kernel;
pub mod types;

pub use backend::ContractionBackend;
pub use error::{Error, ErrorKind, Result, Status};
pub use iter::{AxisArrays, AxisDescriptor, KernelShape, TensorRole, ThreadInfo};
pub use kernel::{KernelProvider, KernelSet, MainKernelFn, TouchKernelFn};
pub use types::{DimKind, ExecKind, KernelKind, ScalarType};
