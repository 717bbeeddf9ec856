//! C6: the backend facade — `init` / `compile` / `contract`.

use crate::error::{Error, ErrorKind, Result, Status};
use crate::iter::descriptor::{AxisArrays, AxisDescriptor};
use crate::iter::driver::{contract_thread, DriverCtx};
use crate::iter::partition::{partition, ThreadInfo};
use crate::iter::shape::{plan_kernel_shape, KernelShape};
use crate::kernel::{KernelProvider, KernelSet};
use crate::types::{DimKind, ExecKind, KernelKind, ScalarType};

/// A pointer wrapper so raw tensor base pointers can cross the `rayon`
/// thread-pool boundary. Sound because the partition produced by C4
/// guarantees each worker only ever touches its own, disjoint region
/// (§5 — "no two workers ever write the same output element").
#[derive(Clone, Copy)]
struct SendPtr<T>(*const T);
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

#[derive(Clone, Copy)]
struct SendPtrMut<T>(*mut T);
unsafe impl<T> Send for SendPtrMut<T> {}
unsafe impl<T> Sync for SendPtrMut<T> {}

#[derive(Default)]
pub struct ContractionBackend {
    axes: Vec<AxisDescriptor>,

    dtype_left: ScalarType,
    dtype_right: ScalarType,
    dtype_comp: ScalarType,
    dtype_out: ScalarType,

    kind_first_touch: KernelKind,
    kind_main: KernelKind,
    kind_last_touch: KernelKind,

    /// set via `set_num_threads_target`, applied at the next `compile()`
    /// (mirrors the original's separate `threading()` entry point).
    num_threads_target: i64,

    compiled: bool,
    kernel_shape: KernelShape,
    kernels: Option<KernelSet>,
    thread_infos: Vec<ThreadInfo>,
    first_parallel: Option<usize>,
    num_parallel: usize,
    first_prim: usize,
    has_first_touch: bool,
    has_last_touch: bool,
    num_threads: usize,
}

impl Default for ScalarType {
    fn default() -> Self {
        ScalarType::Fp32
    }
}

impl Default for KernelKind {
    fn default() -> Self {
        KernelKind::Undefined
    }
}

impl Default for KernelShape {
    fn default() -> Self {
        KernelShape {
            m: 0,
            n: 0,
            k: 0,
            br: 1,
            br_stride_a: 0,
            br_stride_b: 0,
            r: 1,
            lda: 0,
            ldb: 0,
            ldc: 0,
            trans_a: false,
            trans_b: false,
            stride_m_out_aux: 0,
            stride_n_out_aux: 0,
            cpx_stride_left_bytes: 0,
            cpx_stride_right_bytes: 0,
            cpx_stride_out_bytes: 0,
            cpx_stride_out_aux_bytes: 0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
impl ContractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Array-of-structs `init` (§4.C6).
    pub fn init(
        &mut self,
        axes: Vec<AxisDescriptor>,
        dtype_left: ScalarType,
        dtype_right: ScalarType,
        dtype_comp: ScalarType,
        dtype_out: ScalarType,
        kind_first_touch: KernelKind,
        kind_main: KernelKind,
        kind_last_touch: KernelKind,
        num_threads: i64,
    ) {
        self.axes = axes;
        self.dtype_left = dtype_left;
        self.dtype_right = dtype_right;
        self.dtype_comp = dtype_comp;
        self.dtype_out = dtype_out;
        self.kind_first_touch = kind_first_touch;
        self.kind_main = kind_main;
        self.kind_last_touch = kind_last_touch;
        self.num_threads_target = num_threads;
        self.compiled = false;
    }

    /// Struct-of-arrays `init` (§4.C6); equivalent to the array-of-structs form.
    pub fn init_soa(
        &mut self,
        axes: AxisArrays,
        dtype_left: ScalarType,
        dtype_right: ScalarType,
        dtype_comp: ScalarType,
        dtype_out: ScalarType,
        kind_first_touch: KernelKind,
        kind_main: KernelKind,
        kind_last_touch: KernelKind,
        num_threads: i64,
    ) {
        self.init(
            axes.into_descriptors(),
            dtype_left,
            dtype_right,
            dtype_comp,
            dtype_out,
            kind_first_touch,
            kind_main,
            kind_last_touch,
            num_threads,
        );
    }

    /// Sets the targeted thread count ahead of the next `compile()`, kept
    /// distinct from `init`'s `num_threads` as in the original design.
    pub fn set_num_threads_target(&mut self, num_threads: i64) {
        self.num_threads_target = num_threads;
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Idempotent. Runs C3, compiles kernels via `provider` (C7), inserts a
    /// leading SEQ axis when necessary, locates the parallel/PRIM boundaries,
    /// converts strides to byte units, and runs C4.
    pub fn compile(&mut self, provider: &dyn KernelProvider) -> Result<()> {
        if self.compiled {
            return Ok(());
        }
        if self.axes.is_empty() {
            return Err(Error::new(ErrorKind::ShapeValidation, "no axes given to init"));
        }

        let shape = plan_kernel_shape(
            &self.axes,
            self.kind_main,
            self.dtype_left,
            self.dtype_right,
            self.dtype_out,
        )?;

        let first_touch = provider
            .compile_first_touch(self.kind_first_touch, &shape, self.dtype_out)
            .map_err(|e| Error::new(ErrorKind::KernelGeneration, e.to_string()))?;
        let main = provider
            .compile_main(
                self.kind_main,
                &shape,
                self.dtype_left,
                self.dtype_right,
                self.dtype_comp,
                self.dtype_out,
            )
            .map_err(|e| Error::new(ErrorKind::KernelGeneration, e.to_string()))?;
        let last_touch = provider
            .compile_last_touch(self.kind_last_touch, &shape, self.dtype_out)
            .map_err(|e| Error::new(ErrorKind::KernelGeneration, e.to_string()))?;

        self.has_first_touch = first_touch.is_some();
        self.has_last_touch = last_touch.is_some();
        self.kernels = Some(KernelSet {
            first_touch,
            main,
            last_touch,
        });
        self.kernel_shape = shape;

        // guarantee the driver always has at least one non-PRIM loop to enter.
        if self.axes[0].exec == ExecKind::Prim {
            self.axes.insert(
                0,
                AxisDescriptor::new(DimKind::Undefined, ExecKind::Seq, 1, 0, 0, 0, 0),
            );
        }

        self.first_parallel = None;
        self.num_parallel = 0;
        self.first_prim = self.axes.len();
        for (idx, axis) in self.axes.iter().enumerate() {
            if axis.exec.is_parallel() {
                if self.first_parallel.is_none() {
                    self.first_parallel = Some(idx);
                }
                self.num_parallel += 1;
            }
            if axis.exec == ExecKind::Prim {
                self.first_prim = idx;
                break;
            }
        }

        let num_threads_target = if self.num_threads_target > 0 {
            self.num_threads_target as usize
        } else {
            num_cpus::get()
        };
        self.num_threads = if self.num_parallel == 0 {
            1
        } else {
            num_threads_target.max(1)
        };

        for axis in self.axes.iter_mut() {
            axis.stride_left *= self.dtype_left.n_bytes();
            axis.stride_right *= self.dtype_right.n_bytes();
            axis.stride_out *= self.dtype_out.n_bytes();
            axis.stride_out_aux *= self.dtype_out.n_bytes();
        }

        self.thread_infos = partition(
            &self.axes,
            self.first_parallel,
            self.num_parallel,
            self.num_threads,
        );

        log::debug!(
            "compiled {:?}: m={} n={} k={} br={} r={} lda={} ldb={} ldc={} trans_a={} trans_b={}",
            self.kind_main,
            self.kernel_shape.m,
            self.kernel_shape.n,
            self.kernel_shape.k,
            self.kernel_shape.br,
            self.kernel_shape.r,
            self.kernel_shape.lda,
            self.kernel_shape.ldb,
            self.kernel_shape.ldc,
            self.kernel_shape.trans_a,
            self.kernel_shape.trans_b,
        );
        log::trace!(
            "partitioned into {} thread(s), first_parallel={:?}, num_parallel={}",
            self.thread_infos.len(),
            self.first_parallel,
            self.num_parallel,
        );

        self.compiled = true;
        Ok(())
    }

    /// Convenience wrapper returning the spec's literal three-value status
    /// code instead of the richer `Error`.
    pub fn compile_status(&mut self, provider: &dyn KernelProvider) -> Status {
        match self.compile(provider) {
            Ok(()) => Status::Success,
            Err(e) => Status::from(e.kind),
        }
    }

    /// Four-pointer form (§4.C6, §6). Errors with `ErrorKind::Uninitialized`
    /// if called before a successful `compile()`.
    pub fn contract(
        &self,
        left: *const u8,
        right: *const u8,
        out_aux: *const u8,
        out: *mut u8,
    ) -> Result<()> {
        if !self.compiled {
            return Err(Error::new(
                ErrorKind::Uninitialized,
                "contract() called before a successful compile()",
            ));
        }
        let kernels = self
            .kernels
            .as_ref()
            .expect("compiled backend must carry a kernel set");

        log::trace!("contracting across {} thread(s)", self.thread_infos.len());

        let ctx = DriverCtx {
            axes: &self.axes,
            first_parallel: self.first_parallel,
            num_parallel: self.num_parallel,
            first_prim: self.first_prim,
            kernels,
        };

        let left = SendPtr(left);
        let right = SendPtr(right);
        let out_aux = SendPtr(out_aux);
        let out = SendPtrMut(out);
        let thread_infos = &self.thread_infos;

        use rayon::prelude::*;
        thread_infos.par_iter().for_each(|thread_info| {
            contract_thread(&ctx, thread_info, left.0, right.0, out_aux.0, out.0);
        });
        Ok(())
    }

    /// Three-pointer form: equivalent to passing a null `out_aux`.
    pub fn contract3(&self, left: *const u8, right: *const u8, out: *mut u8) -> Result<()> {
        self.contract(left, right, std::ptr::null(), out)
    }

    pub fn kernel_shape(&self) -> &KernelShape {
        &self.kernel_shape
    }

    pub fn thread_infos(&self) -> &[ThreadInfo] {
        &self.thread_infos
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn has_first_touch(&self) -> bool {
        self.has_first_touch
    }

    pub fn has_last_touch(&self) -> bool {
        self.has_last_touch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::descriptor::AxisDescriptor;
    use crate::kernel::{MainKernelFn, TouchKernelFn};
    use crate::types::ExecKind;

    struct IdentityProvider;

    impl KernelProvider for IdentityProvider {
        fn compile_first_touch(
            &self,
            kind: KernelKind,
            _shape: &KernelShape,
            _dtype_out: ScalarType,
        ) -> Result<Option<Box<TouchKernelFn>>> {
            if kind == KernelKind::Undefined {
                Ok(None)
            } else {
                Ok(Some(Box::new(|_aux, _out| {})))
            }
        }

        fn compile_main(
            &self,
            _kind: KernelKind,
            _shape: &KernelShape,
            _dtype_left: ScalarType,
            _dtype_right: ScalarType,
            _dtype_comp: ScalarType,
            _dtype_out: ScalarType,
        ) -> Result<Box<MainKernelFn>> {
            Ok(Box::new(|_l, _r, _o| {}))
        }

        fn compile_last_touch(
            &self,
            kind: KernelKind,
            _shape: &KernelShape,
            _dtype_out: ScalarType,
        ) -> Result<Option<Box<TouchKernelFn>>> {
            if kind == KernelKind::Undefined {
                Ok(None)
            } else {
                Ok(Some(Box::new(|_aux, _out| {})))
            }
        }
    }

    /// M-packed output convention: `stride_out[M]` is always the unit/`r`
    /// stride, `stride_out[N]` (== `ldc`) carries the row-to-row jump.
    fn plain_gemm_axes(m: i64, n: i64, k: i64) -> Vec<AxisDescriptor> {
        vec![
            AxisDescriptor::new(DimKind::M, ExecKind::Prim, m, k, 0, 1, 0),
            AxisDescriptor::new(DimKind::N, ExecKind::Prim, n, 0, 1, m, 0),
            AxisDescriptor::new(DimKind::K, ExecKind::Prim, k, 1, n, 0, 0),
        ]
    }

    #[test]
    fn compile_is_idempotent() {
        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(4, 4, 4),
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            KernelKind::Undefined,
            KernelKind::Madd,
            KernelKind::Undefined,
            1,
        );
        backend.compile(&IdentityProvider).unwrap();
        let shape_after_first = *backend.kernel_shape();
        let axes_after_first = backend.axes.clone();

        backend.compile(&IdentityProvider).unwrap();
        assert_eq!(*backend.kernel_shape(), shape_after_first);
        assert_eq!(backend.axes, axes_after_first);
    }

    #[test]
    fn compile_inserts_a_leading_seq_axis_when_axis_zero_is_prim() {
        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(4, 4, 4),
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            KernelKind::Undefined,
            KernelKind::Madd,
            KernelKind::Undefined,
            1,
        );
        backend.compile(&IdentityProvider).unwrap();
        assert_eq!(backend.axes[0].exec, ExecKind::Seq);
        assert_eq!(backend.axes[0].size, 1);
        assert_eq!(backend.axes.len(), 4);
    }

    #[test]
    fn strides_are_converted_to_bytes() {
        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(4, 4, 4),
            ScalarType::Fp64,
            ScalarType::Fp64,
            ScalarType::Fp64,
            ScalarType::Fp64,
            KernelKind::Undefined,
            KernelKind::Madd,
            KernelKind::Undefined,
            1,
        );
        backend.compile(&IdentityProvider).unwrap();
        // post-insert layout: [dummy SEQ, M, N, K]; M's stride_left was `k`=4 elements.
        assert_eq!(backend.axes[1].stride_left, 4 * 8);
    }

    #[test]
    fn no_parallel_axes_clamps_thread_count_to_one() {
        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(4, 4, 4),
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            KernelKind::Undefined,
            KernelKind::Madd,
            KernelKind::Undefined,
            8,
        );
        backend.compile(&IdentityProvider).unwrap();
        assert_eq!(backend.num_threads(), 1);
        assert_eq!(backend.thread_infos().len(), 1);
    }

    #[test]
    fn contract_before_compile_is_uninitialized_error() {
        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(4, 4, 4),
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            KernelKind::Undefined,
            KernelKind::Madd,
            KernelKind::Undefined,
            1,
        );
        let err = backend
            .contract3(std::ptr::null(), std::ptr::null(), std::ptr::null_mut())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Uninitialized);
        assert_eq!(Status::from(&err), Status::UndefinedError);
    }
}
