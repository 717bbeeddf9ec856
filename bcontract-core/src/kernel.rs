//! C7: the kernel adapter. Three opaque slots the loop driver invokes; the
//! core never generates their bodies itself, only the canonical shape they
//! must honor (§1, §4.C7, Design Notes: "kernel provider as an interface").

use crate::error::Result;
use crate::iter::shape::KernelShape;
use crate::types::{KernelKind, ScalarType};

/// `(left_tile, right_tile, out_tile)`, byte pointers honoring the strides
/// `KernelShape` derived.
pub type MainKernelFn = dyn Fn(*const u8, *const u8, *mut u8) + Send + Sync;
/// `(out_aux_tile, out_tile)`, byte pointers. `out_aux_tile` may be null when
/// the contraction has no auxiliary output tensor.
pub type TouchKernelFn = dyn Fn(*const u8, *mut u8) + Send + Sync;

/// The three compiled, callable kernels a compiled plan carries.
pub struct KernelSet {
    pub first_touch: Option<Box<TouchKernelFn>>,
    pub main: Box<MainKernelFn>,
    pub last_touch: Option<Box<TouchKernelFn>>,
}

/// External collaborator contract (§6): given the planner's canonical shape,
/// return callables honoring it. Implementations must be thread-safe — the
/// same compiled kernel is invoked concurrently from every worker (§5).
pub trait KernelProvider {
    fn compile_first_touch(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_out: ScalarType,
    ) -> Result<Option<Box<TouchKernelFn>>>;

    fn compile_main(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_left: ScalarType,
        dtype_right: ScalarType,
        dtype_comp: ScalarType,
        dtype_out: ScalarType,
    ) -> Result<Box<MainKernelFn>>;

    fn compile_last_touch(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_out: ScalarType,
    ) -> Result<Option<Box<TouchKernelFn>>>;
}
