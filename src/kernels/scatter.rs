//! Indexed-accumulation kernels over a group index.
//!
//! A group index assigns each position along one axis of an array to a group
//! in `[0, N)`. Groups need not be contiguous or sorted. These kernels are the
//! substrate for segment softmax and sparse attention:
//!
//! 1. `scatter_add` / `scatter_max`: reduce element lanes into an N-sized buffer
//! 2. `gather`: read each element's group lane back out of such a buffer
//! 3. `par_scatter_add`: chunked rayon variant with per-chunk buffers
//!
//! All kernels are pure: they allocate a fresh output and never mutate inputs.

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, RemoveAxis, Zip};
use rayon::prelude::*;

use crate::error::{GapfillError, Result};

// ──────────────────────────────────────────────────────────────
// 1. Group resolution
// ──────────────────────────────────────────────────────────────

/// Validate an index against the grouped axis and resolve the group count.
/// `num_groups = None` infers `max(index) + 1`; an explicit count must cover
/// every referenced group.
pub(crate) fn resolve_group_count(
    index: &[usize],
    axis_len: usize,
    num_groups: Option<usize>,
) -> Result<usize> {
    if index.len() != axis_len {
        return Err(GapfillError::DimensionMismatch {
            expected: axis_len,
            actual: index.len(),
        });
    }
    let needed = index.iter().copied().max().map_or(0, |m| m + 1);
    match num_groups {
        Some(n) if needed > n => Err(GapfillError::IndexOutOfRange {
            index: needed - 1,
            groups: n,
        }),
        Some(n) => Ok(n),
        None => Ok(needed),
    }
}

// ──────────────────────────────────────────────────────────────
// 2. Scatter-add
// ──────────────────────────────────────────────────────────────

/// Sum element lanes into their group lane.
/// The grouped axis of the output has length `num_groups` (or the inferred
/// count); lanes of unreferenced groups stay zero.
pub fn scatter_add<S, D>(
    src: &ArrayBase<S, D>,
    index: &[usize],
    axis: Axis,
    num_groups: Option<usize>,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension + RemoveAxis,
{
    let n = resolve_group_count(index, src.len_of(axis), num_groups)?;
    let mut shape = src.raw_dim();
    shape.slice_mut()[axis.index()] = n;
    let mut out = Array::zeros(shape);
    for (i, &g) in index.iter().enumerate() {
        let mut dst = out.index_axis_mut(axis, g);
        dst += &src.index_axis(axis, i);
    }
    Ok(out)
}

// ──────────────────────────────────────────────────────────────
// 3. Scatter-max
// ──────────────────────────────────────────────────────────────

/// Elementwise maximum of element lanes within each group.
/// Lanes of unreferenced groups hold `-inf` (the identity of max) and carry no
/// meaning; callers must not read them back.
pub fn scatter_max<S, D>(
    src: &ArrayBase<S, D>,
    index: &[usize],
    axis: Axis,
    num_groups: Option<usize>,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension + RemoveAxis,
{
    let n = resolve_group_count(index, src.len_of(axis), num_groups)?;
    let mut shape = src.raw_dim();
    shape.slice_mut()[axis.index()] = n;
    let mut out = Array::from_elem(shape, f32::NEG_INFINITY);
    for (i, &g) in index.iter().enumerate() {
        let lane = src.index_axis(axis, i);
        let mut dst = out.index_axis_mut(axis, g);
        Zip::from(&mut dst).and(&lane).for_each(|d, &s| {
            if s > *d {
                *d = s;
            }
        });
    }
    Ok(out)
}

// ──────────────────────────────────────────────────────────────
// 4. Gather
// ──────────────────────────────────────────────────────────────

/// Read each element's group lane out of a grouped buffer.
/// `out[i] = src[index[i]]` along `axis`; the output's grouped axis has the
/// length of `index`.
pub fn gather<S, D>(src: &ArrayBase<S, D>, index: &[usize], axis: Axis) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension + RemoveAxis,
{
    let len = src.len_of(axis);
    if let Some(&bad) = index.iter().find(|&&g| g >= len) {
        return Err(GapfillError::IndexOutOfRange {
            index: bad,
            groups: len,
        });
    }
    Ok(src.select(axis, index))
}

// ──────────────────────────────────────────────────────────────
// 5. Parallel scatter-add
// ──────────────────────────────────────────────────────────────

/// Parallel `scatter_add`: elements are split into chunks, each chunk sums
/// into its own buffer, and the buffers are merged pairwise. Group collisions
/// across threads never share a write target, so no atomics are needed.
/// Summation order differs from the sequential kernel, so results agree only
/// to floating-point tolerance.
pub fn par_scatter_add<S, D>(
    src: &ArrayBase<S, D>,
    index: &[usize],
    axis: Axis,
    num_groups: Option<usize>,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension + RemoveAxis,
{
    let n = resolve_group_count(index, src.len_of(axis), num_groups)?;
    let mut shape = src.raw_dim();
    shape.slice_mut()[axis.index()] = n;

    let view = src.view();
    let chunk = index
        .len()
        .div_ceil(rayon::current_num_threads().max(1))
        .max(1);

    let out = index
        .par_chunks(chunk)
        .enumerate()
        .map(|(ci, part)| {
            let mut local = Array::zeros(shape.clone());
            for (off, &g) in part.iter().enumerate() {
                let mut dst = local.index_axis_mut(axis, g);
                dst += &view.index_axis(axis, ci * chunk + off);
            }
            local
        })
        .reduce(|| Array::zeros(shape.clone()), |a, b| a + b);
    Ok(out)
}
