pub mod descriptor;
pub(crate) mod driver;
pub mod partition;
pub mod shape;

pub use descriptor::{AxisArrays, AxisDescriptor, TensorRole};
pub use partition::ThreadInfo;
pub use shape::KernelShape;
