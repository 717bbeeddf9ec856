//! C4: the iteration-space partitioner.
//!
//! Splits the axes classified OMP or SFC across worker threads. Two distinct
//! strategies apply (see SPEC_FULL.md §2 for why the split is drawn here):
//!
//! - **OMP**: only the first parallel axis is cyclically divided into
//!   contiguous per-thread blocks; any further OMP axes are iterated in full
//!   by every thread. The driver falls through to its ordinary per-axis
//!   recursion, just with that one axis' trip count overridden per thread.
//! - **SFC**: the whole parallel region is linearized via a boustrophedon
//!   (snake) traversal so consecutive tiles always differ in exactly one
//!   axis coordinate by one step, then that traversal is cut into
//!   contiguous per-thread chunks and re-expressed as direction-encoded
//!   moves (§3 Thread info, §8 Property 5).

use crate::iter::descriptor::{AxisDescriptor, TensorRole};
use crate::types::ExecKind;

/// Per-thread starting state produced by `partition`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    pub offset_left: i64,
    pub offset_right: i64,
    pub offset_out: i64,
    pub offset_out_aux: i64,
    /// non-empty only in SFC mode; least-significant bit is the direction
    /// (0 => +1, 1 => -1), the remaining bits are the axis index to step.
    pub movement_ids: Vec<u8>,
    /// in OMP mode, this thread's trip count on the first parallel axis
    /// (overrides the shared axis size just for that one axis).
    pub omp_local_extent: i64,
}

fn encode_move(axis: usize, direction: i64) -> u8 {
    debug_assert!(axis < 128, "axis index does not fit the 7 movement bits");
    let sign = if direction < 0 { 1u8 } else { 0u8 };
    ((axis as u8) << 1) | sign
}

pub fn decode_move(code: u8) -> (usize, i64) {
    let axis = (code >> 1) as usize;
    let direction = if code & 1 == 1 { -1 } else { 1 };
    (axis, direction)
}

/// Enumerates the full Cartesian product of `extents` in boustrophedon
/// (snake) order: consecutive entries differ in exactly one coordinate,
/// by exactly one step, because each axis reverses direction on every
/// other sweep instead of resetting.
fn boustrophedon_path(extents: &[i64]) -> Vec<Vec<i64>> {
    match extents.split_first() {
        None => vec![Vec::new()],
        Some((&head, rest)) => {
            let sub = boustrophedon_path(rest);
            let mut out = Vec::with_capacity(head.max(0) as usize * sub.len().max(1));
            for i in 0..head {
                let ordered: Vec<&Vec<i64>> = if i % 2 == 0 {
                    sub.iter().collect()
                } else {
                    sub.iter().rev().collect()
                };
                for coord in ordered {
                    let mut full = Vec::with_capacity(coord.len() + 1);
                    full.push(i);
                    full.extend_from_slice(coord);
                    out.push(full);
                }
            }
            out
        }
    }
}

fn offset_for(axes: &[AxisDescriptor], first: usize, coord: &[i64], role: TensorRole) -> i64 {
    coord
        .iter()
        .enumerate()
        .map(|(local, &c)| axes[first + local].stride(role) * c)
        .sum()
}

/// Splits `n` items into `parts` contiguous chunks, as evenly as possible,
/// with the first `n % parts` chunks getting one extra item.
fn even_chunks(n: i64, parts: usize) -> Vec<(i64, i64)> {
    let parts = parts.max(1) as i64;
    let base = n / parts;
    let extra = n % parts;
    let mut chunks = Vec::with_capacity(parts as usize);
    let mut start = 0;
    for p in 0..parts {
        let count = base + if p < extra { 1 } else { 0 };
        chunks.push((start, count));
        start += count;
    }
    chunks
}

fn sfc_partition(
    axes: &[AxisDescriptor],
    first_parallel: usize,
    num_parallel: usize,
    num_threads: usize,
) -> Vec<ThreadInfo> {
    let extents: Vec<i64> = axes[first_parallel..first_parallel + num_parallel]
        .iter()
        .map(|a| a.size)
        .collect();
    let path = boustrophedon_path(&extents);
    let total = path.len() as i64;

    even_chunks(total, num_threads)
        .into_iter()
        .map(|(start, count)| {
            if count == 0 {
                return ThreadInfo::default();
            }
            let start = start as usize;
            let count = count as usize;
            let first_coord = &path[start];

            let mut movement_ids = Vec::with_capacity(count);
            for i in start..start + count - 1 {
                let (cur, next) = (&path[i], &path[i + 1]);
                let mut mover = None;
                for (local_axis, (&c, &nxt)) in cur.iter().zip(next.iter()).enumerate() {
                    if c != nxt {
                        debug_assert!(mover.is_none(), "boustrophedon moves must touch one axis");
                        mover = Some((local_axis, nxt - c));
                    }
                }
                let (local_axis, delta) = mover.expect("consecutive tiles must differ somewhere");
                debug_assert_eq!(delta.abs(), 1);
                movement_ids.push(encode_move(first_parallel + local_axis, delta));
            }
            // trailing filler move: never dereferenced meaningfully since no
            // kernel invocation follows the last tile, but must decode validly.
            if count >= 1 {
                let filler = movement_ids
                    .last()
                    .copied()
                    .unwrap_or_else(|| encode_move(first_parallel, 1));
                movement_ids.push(filler);
            }

            ThreadInfo {
                offset_left: offset_for(axes, first_parallel, first_coord, TensorRole::Left),
                offset_right: offset_for(axes, first_parallel, first_coord, TensorRole::Right),
                offset_out: offset_for(axes, first_parallel, first_coord, TensorRole::Out),
                offset_out_aux: offset_for(axes, first_parallel, first_coord, TensorRole::OutAux),
                movement_ids,
                omp_local_extent: 0,
            }
        })
        .collect()
}

fn omp_partition(
    axes: &[AxisDescriptor],
    first_parallel: usize,
    num_threads: usize,
) -> Vec<ThreadInfo> {
    let extent = axes[first_parallel].size;
    even_chunks(extent, num_threads)
        .into_iter()
        .map(|(start, count)| ThreadInfo {
            offset_left: axes[first_parallel].stride_left * start,
            offset_right: axes[first_parallel].stride_right * start,
            offset_out: axes[first_parallel].stride_out * start,
            offset_out_aux: axes[first_parallel].stride_out_aux * start,
            movement_ids: Vec::new(),
            omp_local_extent: count,
        })
        .collect()
}

/// Produces one `ThreadInfo` per worker. When there are no parallel axes,
/// returns a single all-zero entry (the caller is responsible for also
/// clamping `num_threads` to 1 in that case, per §4.C6).
pub fn partition(
    axes: &[AxisDescriptor],
    first_parallel: Option<usize>,
    num_parallel: usize,
    num_threads: usize,
) -> Vec<ThreadInfo> {
    let Some(first_parallel) = first_parallel else {
        return vec![ThreadInfo::default()];
    };
    if num_parallel == 0 {
        return vec![ThreadInfo::default()];
    }

    match axes[first_parallel].exec {
        ExecKind::Sfc => sfc_partition(axes, first_parallel, num_parallel, num_threads),
        _ => omp_partition(axes, first_parallel, num_threads),
    }
}
