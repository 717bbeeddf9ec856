//! C3: the kernel-shape planner.
//!
//! Inspects the trailing (PRIM) axes of the iteration space to fix which
//! main-kernel variant applies and how its operands must be addressed.
//! Everything here works in element units; byte conversion of the axis
//! strides used by the outer loop driver happens later, in `compile`.

use crate::error::{Error, ErrorKind, Result};
use crate::iter::descriptor::AxisDescriptor;
use crate::types::{DimKind, KernelKind, ScalarType};

/// The canonical micro-kernel shape derived from the trailing axes, handed
/// to the kernel provider (C7) so it only ever sees a handful of shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelShape {
    pub m: i64,
    pub n: i64,
    pub k: i64,

    /// batch-reduce count and per-operand strides (BR_MADD only; 1/0/0 otherwise).
    pub br: i64,
    pub br_stride_a: i64,
    pub br_stride_b: i64,

    /// packed/channel count (PACKED_MADD, CPX_PACKED_MADD; 1 otherwise).
    pub r: i64,

    pub lda: i64,
    pub ldb: i64,
    pub ldc: i64,
    pub trans_a: bool,
    pub trans_b: bool,

    pub stride_m_out_aux: i64,
    pub stride_n_out_aux: i64,

    /// complex-plane strides, already in bytes (CPX_MADD, CPX_PACKED_MADD only).
    pub cpx_stride_left_bytes: i64,
    pub cpx_stride_right_bytes: i64,
    pub cpx_stride_out_bytes: i64,
    pub cpx_stride_out_aux_bytes: i64,
}

fn fail(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ShapeValidation, message)
}

fn fail_layout(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::LayoutValidation, message)
}

/// Validates the trailing axes against `kind_main` and derives the shape.
pub fn plan_kernel_shape(
    axes: &[AxisDescriptor],
    kind_main: KernelKind,
    dtype_left: ScalarType,
    dtype_right: ScalarType,
    dtype_out: ScalarType,
) -> Result<KernelShape> {
    let l = axes.len() as i64;
    let required_prims = kind_main
        .required_prim_count()
        .ok_or_else(|| fail(format!("{kind_main:?} is not a main kernel variant")))?;

    let num_prims = axes
        .iter()
        .rev()
        .take_while(|a| a.exec == crate::types::ExecKind::Prim)
        .count() as i64;
    if num_prims != required_prims as i64 {
        return Err(fail(format!(
            "{kind_main:?} requires {required_prims} trailing PRIM axes, found {num_prims}"
        )));
    }

    let idx = |from_end: i64| -> usize { (l - from_end) as usize };
    if axes[idx(3)].kind != DimKind::M || axes[idx(2)].kind != DimKind::N || axes[idx(1)].kind != DimKind::K {
        return Err(fail(
            "the three trailing axes must be kinds M, N, K in that order",
        ));
    }

    match kind_main {
        KernelKind::BrMadd if axes[idx(4)].kind != DimKind::K => {
            return Err(fail("BR_MADD requires a K-kind axis at L-4"));
        }
        KernelKind::PackedMadd if axes[idx(4)].kind != DimKind::C => {
            return Err(fail("PACKED_MADD requires a C-kind axis at L-4"));
        }
        KernelKind::CpxMadd if axes[idx(4)].kind != DimKind::Cpx => {
            return Err(fail("CPX_MADD requires a CPX-kind axis at L-4"));
        }
        KernelKind::CpxPackedMadd
            if axes[idx(4)].kind != DimKind::C || axes[idx(5)].kind != DimKind::Cpx =>
        {
            // axis at L-4 must be C *and* axis at L-5 must be CPX (see SPEC_FULL.md §2,
            // and DESIGN.md for why this reading is deliberate rather than `||`).
            return Err(fail(
                "CPX_PACKED_MADD requires a C-kind axis at L-4 and a CPX-kind axis at L-5",
            ));
        }
        _ => {}
    }

    let id_m = idx(3);
    let id_n = idx(2);
    let id_k = idx(1);
    let id_br_or_packed = idx(4);

    let m = axes[id_m].size;
    let n = axes[id_n].size;
    let k = axes[id_k].size;

    let (br, br_stride_a, br_stride_b) = if kind_main == KernelKind::BrMadd {
        (
            axes[id_br_or_packed].size,
            axes[id_br_or_packed].stride_left,
            axes[id_br_or_packed].stride_right,
        )
    } else {
        (1, 0, 0)
    };

    let r = if kind_main == KernelKind::PackedMadd || kind_main == KernelKind::CpxPackedMadd {
        axes[id_br_or_packed].size
    } else {
        1
    };

    let (trans_a, mut lda) = if m == 1 || axes[id_m].stride_left == r || axes[id_m].stride_left == 1 {
        (false, axes[id_k].stride_left)
    } else if k == 1 || axes[id_k].stride_left == 1 {
        (true, axes[id_m].stride_left)
    } else {
        return Err(fail_layout("no consistent layout for the left operand"));
    };

    let (trans_b, mut ldb) = if k == 1 || axes[id_k].stride_right == r || axes[id_k].stride_right == 1 {
        (false, axes[id_n].stride_right)
    } else if n == 1 || axes[id_n].stride_right == 1 {
        (true, axes[id_k].stride_right)
    } else {
        return Err(fail_layout("no consistent layout for the right operand"));
    };

    let mut ldc = if m == 1 || axes[id_m].stride_out == r {
        axes[id_n].stride_out
    } else {
        return Err(fail_layout("output stride_out[M] must equal r (or m == 1)"));
    };

    let (mut stride_m_out_aux, mut stride_n_out_aux) = if m == 1 || axes[id_m].stride_out_aux <= r {
        (axes[id_m].stride_out_aux, axes[id_n].stride_out_aux)
    } else {
        return Err(fail_layout(
            "auxiliary output stride_out_aux[M] must be <= r (or m == 1)",
        ));
    };

    // degenerate-axis fixups: synthesize a safe non-zero leading stride so
    // the kernel provider always sees a valid shape, even for size-1 axes.
    if k == 1 && !trans_a {
        lda = m * r;
    }
    if m == 1 && trans_a {
        lda = k * r;
    }
    if n == 1 && !trans_b {
        ldb = k * r;
    }
    if k == 1 && trans_b {
        ldb = n * r;
    }
    if n == 1 {
        ldc = m * r;
        stride_n_out_aux = m * r;
    }
    if m == 1 {
        stride_m_out_aux = r;
    }

    let id_cpx = match kind_main {
        KernelKind::CpxMadd => Some(idx(4)),
        KernelKind::CpxPackedMadd => Some(idx(5)),
        _ => None,
    };

    let mut cpx_stride_left_bytes = 0;
    let mut cpx_stride_right_bytes = 0;
    let mut cpx_stride_out_bytes = 0;
    let mut cpx_stride_out_aux_bytes = 0;
    if let Some(id_cpx) = id_cpx {
        if axes[id_cpx].size != 2 {
            return Err(fail("a CPX axis must have extent exactly 2"));
        }
        cpx_stride_left_bytes = axes[id_cpx].stride_left * dtype_left.n_bytes();
        cpx_stride_right_bytes = axes[id_cpx].stride_right * dtype_right.n_bytes();
        cpx_stride_out_bytes = axes[id_cpx].stride_out * dtype_out.n_bytes();
        cpx_stride_out_aux_bytes = axes[id_cpx].stride_out_aux * dtype_out.n_bytes();
    }

    Ok(KernelShape {
        m,
        n,
        k,
        br,
        br_stride_a,
        br_stride_b,
        r,
        lda,
        ldb,
        ldc,
        trans_a,
        trans_b,
        stride_m_out_aux,
        stride_n_out_aux,
        cpx_stride_left_bytes,
        cpx_stride_right_bytes,
        cpx_stride_out_bytes,
        cpx_stride_out_aux_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecKind;

    fn prim_axis(kind: DimKind, size: i64, sl: i64, sr: i64, so: i64) -> AxisDescriptor {
        AxisDescriptor::new(kind, ExecKind::Prim, size, sl, sr, so, 0)
    }

    /// M-packed output convention: `stride_out[M]` is always the unit/`r`
    /// stride, `stride_out[N]` (== `ldc`) carries the row-to-row jump.
    fn plain_gemm_axes(m: i64, n: i64, k: i64) -> Vec<AxisDescriptor> {
        vec![
            prim_axis(DimKind::M, m, k, 0, 1),
            prim_axis(DimKind::N, n, 0, 1, m),
            prim_axis(DimKind::K, k, 1, n, 0),
        ]
    }

    #[test]
    fn plain_madd_row_major() {
        let axes = plain_gemm_axes(64, 48, 64);
        let shape =
            plan_kernel_shape(&axes, KernelKind::Madd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap();
        assert_eq!(shape.m, 64);
        assert_eq!(shape.n, 48);
        assert_eq!(shape.k, 64);
        assert_eq!(shape.br, 1);
        assert_eq!(shape.r, 1);
        // row-major (K-contiguous A, N-contiguous B) is "transposed" relative
        // to this kernel's native M-packed/N-packed convention.
        assert!(shape.trans_a);
        assert!(shape.trans_b);
        assert_eq!(shape.lda, 64); // stride_left[M]
        assert_eq!(shape.ldb, 48); // stride_right[K]
        assert_eq!(shape.ldc, 64); // stride_out[N]
    }

    #[test]
    fn wrong_trailing_kind_fails() {
        let mut axes = plain_gemm_axes(8, 8, 8);
        axes[2].kind = DimKind::M; // should be K
        let err =
            plan_kernel_shape(&axes, KernelKind::Madd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeValidation);
    }

    #[test]
    fn wrong_prim_count_fails() {
        let mut axes = plain_gemm_axes(8, 8, 8);
        axes.insert(0, prim_axis(DimKind::Undefined, 1, 0, 0, 0));
        let err =
            plan_kernel_shape(&axes, KernelKind::Madd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeValidation);
    }

    #[test]
    fn br_madd_requires_k_at_l4() {
        let mut axes = plain_gemm_axes(8, 8, 8);
        axes.insert(0, AxisDescriptor::new(DimKind::K, ExecKind::Prim, 4, 64, 64, 0, 0));
        let shape =
            plan_kernel_shape(&axes, KernelKind::BrMadd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap();
        assert_eq!(shape.br, 4);
        assert_eq!(shape.br_stride_a, 64);
        assert_eq!(shape.br_stride_b, 64);

        axes[0].kind = DimKind::C;
        let err =
            plan_kernel_shape(&axes, KernelKind::BrMadd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeValidation);
    }

    #[test]
    fn packed_madd_uses_c_axis_as_r() {
        let mut axes = vec![
            prim_axis(DimKind::C, 8, 1, 1, 1),
            prim_axis(DimKind::M, 8, 8, 0, 8),
            prim_axis(DimKind::N, 8, 0, 8, 1),
            prim_axis(DimKind::K, 8, 8, 8, 0),
        ];
        axes[1].stride_left = 8; // stride_left[M] == r
        let shape = plan_kernel_shape(
            &axes,
            KernelKind::PackedMadd,
            ScalarType::Fp32,
            ScalarType::Fp32,
            ScalarType::Fp32,
        )
        .unwrap();
        assert_eq!(shape.r, 8);
    }

    #[test]
    fn cpx_madd_requires_extent_two() {
        let mut axes = plain_gemm_axes(8, 8, 8);
        axes.insert(0, AxisDescriptor::new(DimKind::Cpx, ExecKind::Prim, 3, 64, 64, 1, 0));
        let err =
            plan_kernel_shape(&axes, KernelKind::CpxMadd, ScalarType::CFp32, ScalarType::CFp32, ScalarType::CFp32)
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeValidation);
    }

    #[test]
    fn cpx_packed_madd_rejects_swapped_axis_order() {
        // L-4 should be C, L-5 should be CPX; swap them and expect failure,
        // regressing the `&&` vs `||` ambiguity noted in SPEC_FULL.md.
        let mut axes = vec![
            AxisDescriptor::new(DimKind::Cpx, ExecKind::Prim, 2, 64, 64, 1, 0),
            prim_axis(DimKind::C, 8, 1, 1, 1),
            prim_axis(DimKind::M, 8, 8, 0, 8),
            prim_axis(DimKind::N, 8, 0, 8, 1),
            prim_axis(DimKind::K, 8, 8, 8, 0),
        ];
        let err = plan_kernel_shape(
            &axes,
            KernelKind::CpxPackedMadd,
            ScalarType::CFp32,
            ScalarType::CFp32,
            ScalarType::CFp32,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeValidation);

        // correct order: C at L-4, CPX at L-5.
        axes.swap(0, 1);
        axes[0].kind = DimKind::C;
        axes[1].kind = DimKind::Cpx;
        let shape = plan_kernel_shape(
            &axes,
            KernelKind::CpxPackedMadd,
            ScalarType::CFp32,
            ScalarType::CFp32,
            ScalarType::CFp32,
        )
        .unwrap();
        assert_eq!(shape.r, 8);
    }

    #[test]
    fn degenerate_m_axis_gets_synthesized_lda() {
        let axes = vec![
            prim_axis(DimKind::M, 1, 999, 0, 999),
            prim_axis(DimKind::N, 8, 0, 1, 1),
            prim_axis(DimKind::K, 8, 1, 8, 0),
        ];
        let shape =
            plan_kernel_shape(&axes, KernelKind::Madd, ScalarType::Fp32, ScalarType::Fp32, ScalarType::Fp32)
                .unwrap();
        // m == 1 falls into the non-transposed branch regardless of the
        // nonsensical stride_left[M], and lda is left as stride_left[K] (1)
        // since the k==1 fixup doesn't apply here; m==1 only rewrites ldc/aux.
        assert_eq!(shape.ldc, shape.m * shape.r);
        assert_eq!(shape.stride_m_out_aux, shape.r);
    }
}
