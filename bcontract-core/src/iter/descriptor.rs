//! C2: the per-axis iteration descriptor.

use crate::types::{DimKind, ExecKind};

/// One axis of the iteration space: its role, how it is driven, its extent,
/// and the stride of that axis in each of the four tensors it touches.
///
/// Strides are element counts as given to `init`; `compile` rewrites them in
/// place to byte units (see `ContractionBackend::compile`). This struct also
/// doubles as the array-of-structs input form `init` accepts (`iter_property`
/// in the original design).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisDescriptor {
    pub kind: DimKind,
    pub exec: ExecKind,
    pub size: i64,
    pub stride_left: i64,
    pub stride_right: i64,
    pub stride_out: i64,
    pub stride_out_aux: i64,
}

impl Default for DimKind {
    fn default() -> Self {
        DimKind::Undefined
    }
}

impl Default for ExecKind {
    fn default() -> Self {
        ExecKind::Seq
    }
}

impl AxisDescriptor {
    pub fn new(
        kind: DimKind,
        exec: ExecKind,
        size: i64,
        stride_left: i64,
        stride_right: i64,
        stride_out: i64,
        stride_out_aux: i64,
    ) -> Self {
        AxisDescriptor {
            kind,
            exec,
            size,
            stride_left,
            stride_right,
            stride_out,
            stride_out_aux,
        }
    }

    /// Stride of this axis in the tensor identified by `role`, in whatever
    /// unit (element or byte) the descriptor currently holds.
    pub fn stride(&self, role: TensorRole) -> i64 {
        match role {
            TensorRole::Left => self.stride_left,
            TensorRole::Right => self.stride_right,
            TensorRole::Out => self.stride_out,
            TensorRole::OutAux => self.stride_out_aux,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Left,
    Right,
    Out,
    OutAux,
}

/// Struct-of-arrays input form `init` also accepts, one vector per field.
#[derive(Debug, Clone, Default)]
pub struct AxisArrays {
    pub kind: Vec<DimKind>,
    pub exec: Vec<ExecKind>,
    pub size: Vec<i64>,
    pub stride_left: Vec<i64>,
    pub stride_right: Vec<i64>,
    pub stride_out: Vec<i64>,
    pub stride_out_aux: Vec<i64>,
}

impl AxisArrays {
    pub fn len(&self) -> usize {
        self.kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
    }

    pub fn into_descriptors(self) -> Vec<AxisDescriptor> {
        let n = self.len();
        (0..n)
            .map(|i| AxisDescriptor {
                kind: self.kind[i],
                exec: self.exec[i],
                size: self.size[i],
                stride_left: self.stride_left[i],
                stride_right: self.stride_right[i],
                stride_out: self.stride_out[i],
                stride_out_aux: self.stride_out_aux[i],
            })
            .collect()
    }
}
