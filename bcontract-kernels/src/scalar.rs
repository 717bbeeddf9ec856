//! A naive, scalar `KernelProvider` reference implementation.
//!
//! This exists so `bcontract-core`'s loop driver, partitioner and planner can
//! be exercised and checked against a reference numeric result without
//! depending on any real code generator (see the core's Design Notes: "the
//! engine can be tested against a naive scalar reference kernel independent
//! of any real code-generator").

use bcontract_core::error::{Error, ErrorKind, Result};
use bcontract_core::kernel::{KernelProvider, MainKernelFn, TouchKernelFn};
use bcontract_core::{KernelKind, KernelShape, ScalarType};

/// Reads element `idx` (not bytes) of an `f32` tensor at byte pointer `base`.
unsafe fn get_f32(base: *const u8, idx: i64) -> f32 {
    *(base as *const f32).offset(idx as isize)
}

unsafe fn set_f32(base: *mut u8, idx: i64, value: f32) {
    *(base as *mut f32).offset(idx as isize) = value;
}

unsafe fn get_f64(base: *const u8, idx: i64) -> f64 {
    *(base as *const f64).offset(idx as isize)
}

unsafe fn set_f64(base: *mut u8, idx: i64, value: f64) {
    *(base as *mut f64).offset(idx as isize) = value;
}

/// Element offset of the (primary, secondary) logical index pair within an
/// operand addressed by `ld` and (when packed) the channel count `r`. `r`
/// is always the fastest-varying, unit-stride dimension; `primary` is `m`
/// for the left/out operands (`k` when transposed) and `k` for the right
/// operand (`n` when transposed).
#[inline]
fn packed_offset(primary: i64, secondary: i64, ld: i64, r: i64, r_idx: i64) -> i64 {
    r_idx + primary * r + secondary * ld
}

fn main_real_f32(kind: KernelKind, shape: KernelShape) -> Box<MainKernelFn> {
    Box::new(move |left, right, out| {
        let brs = if kind == KernelKind::BrMadd { shape.br } else { 1 };
        for br in 0..brs {
            let left_br = unsafe { left.offset((br * shape.br_stride_a * 4) as isize) };
            let right_br = unsafe { right.offset((br * shape.br_stride_b * 4) as isize) };
            for r in 0..shape.r {
                for m in 0..shape.m {
                    for n in 0..shape.n {
                        let mut acc =
                            unsafe { get_f32(out, packed_offset(m, n, shape.ldc, shape.r, r)) };
                        for k in 0..shape.k {
                            let (pa, sa) = if shape.trans_a { (k, m) } else { (m, k) };
                            let (pb, sb) = if shape.trans_b { (n, k) } else { (k, n) };
                            let a = unsafe {
                                get_f32(left_br, packed_offset(pa, sa, shape.lda, shape.r, r))
                            };
                            let b = unsafe {
                                get_f32(right_br, packed_offset(pb, sb, shape.ldb, shape.r, r))
                            };
                            acc += a * b;
                        }
                        unsafe {
                            set_f32(out, packed_offset(m, n, shape.ldc, shape.r, r), acc);
                        }
                    }
                }
            }
        }
    })
}

fn main_real_f64(kind: KernelKind, shape: KernelShape) -> Box<MainKernelFn> {
    Box::new(move |left, right, out| {
        let brs = if kind == KernelKind::BrMadd { shape.br } else { 1 };
        for br in 0..brs {
            let left_br = unsafe { left.offset((br * shape.br_stride_a * 8) as isize) };
            let right_br = unsafe { right.offset((br * shape.br_stride_b * 8) as isize) };
            for r in 0..shape.r {
                for m in 0..shape.m {
                    for n in 0..shape.n {
                        let mut acc =
                            unsafe { get_f64(out, packed_offset(m, n, shape.ldc, shape.r, r)) };
                        for k in 0..shape.k {
                            let (pa, sa) = if shape.trans_a { (k, m) } else { (m, k) };
                            let (pb, sb) = if shape.trans_b { (n, k) } else { (k, n) };
                            let a = unsafe {
                                get_f64(left_br, packed_offset(pa, sa, shape.lda, shape.r, r))
                            };
                            let b = unsafe {
                                get_f64(right_br, packed_offset(pb, sb, shape.ldb, shape.r, r))
                            };
                            acc += a * b;
                        }
                        unsafe {
                            set_f64(out, packed_offset(m, n, shape.ldc, shape.r, r), acc);
                        }
                    }
                }
            }
        }
    })
}

/// `CPX_MADD`/`CPX_PACKED_MADD`: complex multiply-accumulate, real and
/// imaginary parts interleaved at `cpx_stride_*_bytes` apart.
fn main_complex_f32(shape: KernelShape) -> Box<MainKernelFn> {
    Box::new(move |left, right, out| {
        for r in 0..shape.r {
            for m in 0..shape.m {
                for n in 0..shape.n {
                    let out_elem = packed_offset(m, n, shape.ldc, shape.r, r) * 4;
                    let out_re_ptr = unsafe { out.offset(out_elem as isize) };
                    let out_im_ptr =
                        unsafe { out.offset((out_elem + shape.cpx_stride_out_bytes) as isize) };
                    let mut acc_re = unsafe { get_f32(out_re_ptr, 0) };
                    let mut acc_im = unsafe { get_f32(out_im_ptr, 0) };

                    for k in 0..shape.k {
                        let (pa, sa) = if shape.trans_a { (k, m) } else { (m, k) };
                        let (pb, sb) = if shape.trans_b { (n, k) } else { (k, n) };
                        let a_elem = packed_offset(pa, sa, shape.lda, shape.r, r) * 4;
                        let b_elem = packed_offset(pb, sb, shape.ldb, shape.r, r) * 4;
                        let a_re_ptr = unsafe { left.offset(a_elem as isize) };
                        let a_im_ptr =
                            unsafe { left.offset((a_elem + shape.cpx_stride_left_bytes) as isize) };
                        let b_re_ptr = unsafe { right.offset(b_elem as isize) };
                        let b_im_ptr = unsafe {
                            right.offset((b_elem + shape.cpx_stride_right_bytes) as isize)
                        };
                        let a_re = unsafe { get_f32(a_re_ptr, 0) };
                        let a_im = unsafe { get_f32(a_im_ptr, 0) };
                        let b_re = unsafe { get_f32(b_re_ptr, 0) };
                        let b_im = unsafe { get_f32(b_im_ptr, 0) };
                        acc_re += a_re * b_re - a_im * b_im;
                        acc_im += a_re * b_im + a_im * b_re;
                    }

                    unsafe {
                        set_f32(out_re_ptr, 0, acc_re);
                        set_f32(out_im_ptr, 0, acc_im);
                    }
                }
            }
        }
    })
}

pub(crate) fn touch_real_f32(kind: KernelKind, shape: KernelShape) -> Option<Box<TouchKernelFn>> {
    match kind {
        KernelKind::Undefined => None,
        KernelKind::Zero => Some(Box::new(move |_aux, out| {
            for r in 0..shape.r {
                for m in 0..shape.m {
                    for n in 0..shape.n {
                        unsafe { set_f32(out, packed_offset(m, n, shape.ldc, shape.r, r), 0.0) };
                    }
                }
            }
        })),
        KernelKind::Copy | KernelKind::Add => Some(Box::new(move |aux, out| {
            for m in 0..shape.m {
                for n in 0..shape.n {
                    for r in 0..shape.r {
                        let aux_idx = m * shape.stride_m_out_aux + n * shape.stride_n_out_aux + r;
                        let out_idx = packed_offset(m, n, shape.ldc, shape.r, r);
                        let a = unsafe { get_f32(aux, aux_idx) };
                        if kind == KernelKind::Copy {
                            unsafe { set_f32(out, out_idx, a) };
                        } else {
                            let cur = unsafe { get_f32(out, out_idx) };
                            unsafe { set_f32(out, out_idx, cur + a) };
                        }
                    }
                }
            }
        })),
        KernelKind::Relu => Some(Box::new(move |_aux, out| {
            for r in 0..shape.r {
                for m in 0..shape.m {
                    for n in 0..shape.n {
                        let idx = packed_offset(m, n, shape.ldc, shape.r, r);
                        let v = unsafe { get_f32(out, idx) };
                        unsafe { set_f32(out, idx, v.max(0.0)) };
                    }
                }
            }
        })),
        _ => None,
    }
}

/// A dependency-free micro-kernel provider suitable for property and
/// end-to-end tests. Supports FP32/FP64 real main kernels (plain, batch
/// reduce, and packed) and FP32 complex main kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarKernelProvider;

impl KernelProvider for ScalarKernelProvider {
    fn compile_first_touch(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_out: ScalarType,
    ) -> Result<Option<Box<TouchKernelFn>>> {
        match dtype_out {
            ScalarType::Fp32 => Ok(touch_real_f32(kind, *shape)),
            ScalarType::Fp64 | ScalarType::CFp32 | ScalarType::CFp64 => {
                // first/last touch over f64 or complex tiles share the same
                // shape bookkeeping; only FP32 has a worked-out reference here.
                if kind == KernelKind::Undefined {
                    Ok(None)
                } else {
                    Err(Error::new(
                        ErrorKind::KernelGeneration,
                        format!("scalar reference first-touch kernel not implemented for {dtype_out:?}"),
                    ))
                }
            }
            _ => Err(Error::new(
                ErrorKind::KernelGeneration,
                format!("unsupported dtype {dtype_out:?} for the scalar reference provider"),
            )),
        }
    }

    fn compile_main(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_left: ScalarType,
        dtype_right: ScalarType,
        _dtype_comp: ScalarType,
        dtype_out: ScalarType,
    ) -> Result<Box<MainKernelFn>> {
        if !kind.is_main_kernel() {
            return Err(Error::new(
                ErrorKind::KernelGeneration,
                format!("{kind:?} is not a main kernel variant"),
            ));
        }

        match (dtype_left, dtype_right, dtype_out) {
            (ScalarType::CFp32, ScalarType::CFp32, ScalarType::CFp32) => {
                Ok(main_complex_f32(*shape))
            }
            (ScalarType::Fp64, ScalarType::Fp64, ScalarType::Fp64) => {
                Ok(main_real_f64(kind, *shape))
            }
            (ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32) => {
                Ok(main_real_f32(kind, *shape))
            }
            _ => Err(Error::new(
                ErrorKind::KernelGeneration,
                format!(
                    "unsupported dtype combination for the scalar reference provider: \
                     left={dtype_left:?} right={dtype_right:?} out={dtype_out:?}"
                ),
            )),
        }
    }

    fn compile_last_touch(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_out: ScalarType,
    ) -> Result<Option<Box<TouchKernelFn>>> {
        self.compile_first_touch(kind, shape, dtype_out)
    }
}
