//! A `KernelProvider` backed by the `matrixmultiply` crate.
//!
//! Covers the plain and batch-reduce `MADD` variants over FP32/FP64 — the
//! two main-kernel shapes `matrixmultiply::sgemm`/`dgemm` can drive directly
//! via their row/column element strides. `PACKED_MADD` and the complex
//! variants fall outside what a plain GEMM call expresses; use
//! `ScalarKernelProvider` for those.

use bcontract_core::error::{Error, ErrorKind, Result};
use bcontract_core::kernel::{KernelProvider, MainKernelFn, TouchKernelFn};
use bcontract_core::{KernelKind, KernelShape, ScalarType};

use crate::scalar::touch_real_f32;

fn gemm_strides(shape: &KernelShape) -> (isize, isize, isize, isize, isize, isize) {
    let rsa = if shape.trans_a { shape.lda } else { 1 };
    let csa = if shape.trans_a { 1 } else { shape.lda };
    let rsb = if shape.trans_b { shape.ldb } else { 1 };
    let csb = if shape.trans_b { 1 } else { shape.ldb };
    (rsa as isize, csa as isize, rsb as isize, csb as isize, 1, shape.ldc as isize)
}

fn main_madd_f32(kind: KernelKind, shape: KernelShape) -> Box<MainKernelFn> {
    let (rsa, csa, rsb, csb, rsc, csc) = gemm_strides(&shape);
    Box::new(move |left, right, out| {
        let brs = if kind == KernelKind::BrMadd { shape.br } else { 1 };
        for br in 0..brs {
            let a = unsafe { left.offset((br * shape.br_stride_a * 4) as isize) as *const f32 };
            let b = unsafe { right.offset((br * shape.br_stride_b * 4) as isize) as *const f32 };
            unsafe {
                matrixmultiply::sgemm(
                    shape.m as usize,
                    shape.k as usize,
                    shape.n as usize,
                    1.0,
                    a,
                    rsa,
                    csa,
                    b,
                    rsb,
                    csb,
                    1.0,
                    out as *mut f32,
                    rsc,
                    csc,
                );
            }
        }
    })
}

fn main_madd_f64(kind: KernelKind, shape: KernelShape) -> Box<MainKernelFn> {
    let (rsa, csa, rsb, csb, rsc, csc) = gemm_strides(&shape);
    Box::new(move |left, right, out| {
        let brs = if kind == KernelKind::BrMadd { shape.br } else { 1 };
        for br in 0..brs {
            let a = unsafe { left.offset((br * shape.br_stride_a * 8) as isize) as *const f64 };
            let b = unsafe { right.offset((br * shape.br_stride_b * 8) as isize) as *const f64 };
            unsafe {
                matrixmultiply::dgemm(
                    shape.m as usize,
                    shape.k as usize,
                    shape.n as usize,
                    1.0,
                    a,
                    rsa,
                    csa,
                    b,
                    rsb,
                    csb,
                    1.0,
                    out as *mut f64,
                    rsc,
                    csc,
                );
            }
        }
    })
}

/// GEMM-backed main kernels for `MADD`/`BR_MADD`, matching `matrixmultiply`'s
/// `sgemm`/`dgemm` entry points. First/last-touch reuse the naive reference
/// provider's tile bookkeeping, since those are a handful of element writes
/// regardless of how the main accumulation is implemented.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatrixMultiplyKernelProvider;

impl KernelProvider for MatrixMultiplyKernelProvider {
    fn compile_first_touch(
        &self,
        kind: KernelKind,
        shape: &KernelShape,
        dtype_out: ScalarType,
    ) -> Result<Option<Box<TouchKernelFn>>> {
        match dtype_out {
            ScalarType::Fp32 => Ok(touch_real_f32(kind, *shape)),
            _ if kind == KernelKind::Undefined => Ok(None),
            _ => Err(Error::new(
                ErrorKind::KernelGeneration,
                format!("matrixmultiply provider has no first-touch kernel for {dtype_out:?}"),
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
        if kind != KernelKind::Madd && kind != KernelKind::BrMadd {
            return Err(Error::new(
                ErrorKind::KernelGeneration,
                format!("matrixmultiply provider does not implement {kind:?}; use ScalarKernelProvider"),
            ));
        }
        if shape.r != 1 {
            return Err(Error::new(
                ErrorKind::KernelGeneration,
                "matrixmultiply provider does not support a packed channel axis",
            ));
        }

        match (dtype_left, dtype_right, dtype_out) {
            (ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32) => {
                Ok(main_madd_f32(kind, *shape))
            }
            (ScalarType::Fp64, ScalarType::Fp64, ScalarType::Fp64) => {
                Ok(main_madd_f64(kind, *shape))
            }
            _ => Err(Error::new(
                ErrorKind::KernelGeneration,
                format!(
                    "matrixmultiply provider only supports homogeneous FP32/FP64 operands, \
                     got left={dtype_left:?} right={dtype_right:?} out={dtype_out:?}"
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bcontract_core::{AxisDescriptor, ContractionBackend, DimKind, ExecKind};

    fn plain_gemm_axes(m: i64, n: i64, k: i64) -> Vec<AxisDescriptor> {
        vec![
            AxisDescriptor::new(DimKind::M, ExecKind::Prim, m, k, 0, 1, 0),
            AxisDescriptor::new(DimKind::N, ExecKind::Prim, n, 0, 1, m, 0),
            AxisDescriptor::new(DimKind::K, ExecKind::Prim, k, 1, n, 0, 0),
        ]
    }

    #[test]
    fn matrixmultiply_matches_a_direct_triple_loop() {
        let (m, n, k) = (12usize, 9usize, 7usize);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32 * 0.1 - 2.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| i as f32 * 0.05 + 0.3).collect();
        let mut c = vec![0f32; m * n];

        let mut backend = ContractionBackend::new();
        backend.init(
            plain_gemm_axes(m as i64, n as i64, k as i64),
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
            KernelKind::Zero,
            KernelKind::Madd,
            KernelKind::Undefined,
            1,
        );
        backend.compile(&MatrixMultiplyKernelProvider).unwrap();
        backend
            .contract3(
                a.as_ptr() as *const u8,
                b.as_ptr() as *const u8,
                c.as_mut_ptr() as *mut u8,
            )
            .unwrap();

        let mut expected = vec![0f64; m * n];
        for mi in 0..m {
            for ni in 0..n {
                let mut acc = 0f64;
                for ki in 0..k {
                    acc += a[mi * k + ki] as f64 * b[ki * n + ni] as f64;
                }
                expected[mi + ni * m] = acc;
            }
        }

        for i in 0..m * n {
            assert_relative_eq!(c[i] as f64, expected[i], epsilon = 1e-2);
        }
    }

    #[test]
    fn rejects_packed_shapes() {
        let mut shape = KernelShape {
            m: 4,
            n: 4,
            k: 4,
            br: 1,
            br_stride_a: 0,
            br_stride_b: 0,
            r: 4,
            lda: 4,
            ldb: 4,
            ldc: 4,
            trans_a: true,
            trans_b: true,
            stride_m_out_aux: 0,
            stride_n_out_aux: 0,
            cpx_stride_left_bytes: 0,
            cpx_stride_right_bytes: 0,
            cpx_stride_out_bytes: 0,
            cpx_stride_out_aux_bytes: 0,
        };
        let provider = MatrixMultiplyKernelProvider;
        assert!(provider
            .compile_main(
                KernelKind::PackedMadd,
                &shape,
                ScalarType::Fp32,
                ScalarType::Fp32,
                ScalarType::Fp32,
                ScalarType::Fp32,
            )
            .is_err());
        shape.r = 1;
        assert!(provider
            .compile_main(
                KernelKind::PackedMadd,
                &shape,
                ScalarType::Fp32,
                ScalarType::Fp32,
                ScalarType::Fp32,
                ScalarType::Fp32,
            )
            .is_err());
    }
}
