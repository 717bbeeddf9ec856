pub mod fast;
pub mod scalar;

pub use fast::MatrixMultiplyKernelProvider;
pub use scalar::ScalarKernelProvider;
