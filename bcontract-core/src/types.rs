//! C1: datatype and kernel taxonomy shared by every other component.

use int_enum::IntEnum;

/// Scalar datatype of a tensor operand. Complex variants store the real and
/// imaginary part back to back; their byte size already accounts for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Fp32,
    Fp64,
    Bf16,
    Fp16,
    CFp32,
    CFp64,
    CBf16,
    CFp16,
}

impl ScalarType {
    /// Size in bytes of one element of this type, as stored in a tensor buffer.
    pub fn n_bytes(self) -> i64 {
        match self {
            ScalarType::Fp32 => 4,
            ScalarType::Fp64 => 8,
            ScalarType::Bf16 => 2,
            ScalarType::Fp16 => 2,
            ScalarType::CFp32 => 8,
            ScalarType::CFp64 => 16,
            ScalarType::CBf16 => 4,
            ScalarType::CFp16 => 4,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(
            self,
            ScalarType::CFp32 | ScalarType::CFp64 | ScalarType::CBf16 | ScalarType::CFp16
        )
    }
}

/// Axis kind (`dim_t`): what role an iteration axis plays in the contraction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum DimKind {
    /// output row axis, shared between the left operand and the output.
    M = 0,
    /// output column axis, shared between the right operand and the output.
    N = 1,
    /// reduced axis, shared between the left and right operands.
    K = 2,
    /// packed/batched axis shared between left, right and output.
    C = 3,
    /// size-2 complex-plane sentinel axis.
    Cpx = 4,
    Undefined = 99,
}

/// Execution kind (`exec_t`): how an axis is driven by the outer loop nest.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum ExecKind {
    /// parallelized across worker threads with a plain block division.
    Omp = 0,
    /// serial outer loop.
    Seq = 1,
    /// parallelized across worker threads via a space-filling traversal.
    Sfc = 2,
    /// consumed by the micro-kernel, not iterated by the driver.
    Prim = 3,
    Undefined = 99,
}

impl ExecKind {
    pub fn is_parallel(self) -> bool {
        matches!(self, ExecKind::Omp | ExecKind::Sfc)
    }
}

/// Kernel kind (`kernel_t`): identifies both the main micro-kernel variant
/// and the first-touch/last-touch element-wise operations.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum KernelKind {
    Undefined = 0,
    /// zero-initialize the output tile (typical first-touch).
    Zero = 1,
    /// copy from `out_aux` into the output tile (typical first-touch).
    Copy = 2,
    /// elementwise add of `out_aux` into the output tile (typical last-touch).
    Add = 3,
    /// rectified-linear finalization (typical last-touch).
    Relu = 4,
    /// plain dense tiled multiply-add.
    Madd = 10,
    /// batch-reduce multiply-add: an extra K-like axis is reduced in-kernel.
    BrMadd = 11,
    /// complex multiply-add over paired real kernels.
    CpxMadd = 12,
    /// packed (channel-first) multiply-add.
    PackedMadd = 13,
    /// complex and packed multiply-add combined.
    CpxPackedMadd = 14,
}

impl KernelKind {
    pub fn is_main_kernel(self) -> bool {
        matches!(
            self,
            KernelKind::Madd
                | KernelKind::BrMadd
                | KernelKind::CpxMadd
                | KernelKind::PackedMadd
                | KernelKind::CpxPackedMadd
        )
    }

    /// Number of trailing PRIM axes the kernel shape planner requires (§4.C3).
    pub fn required_prim_count(self) -> Option<usize> {
        match self {
            KernelKind::Madd => Some(3),
            KernelKind::BrMadd => Some(4),
            KernelKind::CpxMadd => Some(4),
            KernelKind::PackedMadd => Some(4),
            KernelKind::CpxPackedMadd => Some(5),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes() {
        assert_eq!(ScalarType::Fp32.n_bytes(), 4);
        assert_eq!(ScalarType::Fp64.n_bytes(), 8);
        assert_eq!(ScalarType::Bf16.n_bytes(), 2);
        assert_eq!(ScalarType::CFp32.n_bytes(), 8);
        assert_eq!(ScalarType::CFp64.n_bytes(), 16);
    }

    #[test]
    fn dim_kind_roundtrips_through_its_discriminant() {
        assert_eq!(DimKind::from_int(2).unwrap(), DimKind::K);
        assert_eq!(DimKind::Undefined.int_value(), 99);
    }

    #[test]
    fn required_prim_counts_match_the_kernel_shape_table() {
        assert_eq!(KernelKind::Madd.required_prim_count(), Some(3));
        assert_eq!(KernelKind::BrMadd.required_prim_count(), Some(4));
        assert_eq!(KernelKind::CpxPackedMadd.required_prim_count(), Some(5));
        assert_eq!(KernelKind::Zero.required_prim_count(), None);
    }
}
