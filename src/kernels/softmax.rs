//! Segment softmax: softmax computed independently over index-defined groups.

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, RemoveAxis};

use crate::error::Result;
use crate::kernels::scatter::{gather, scatter_add, scatter_max};

/// Numerically stable softmax over groups of the `axis` lanes.
///
/// For element `i` in group `g`:
/// `out_i = exp(src_i - max_g) / (Σ_{j ∈ g} exp(src_j - max_g) + eps)`
///
/// The index applies along `axis` and broadcasts across all remaining axes, so
/// a `[S, H]` input with the group axis first normalises each of the H lanes
/// independently. The max subtraction bounds every exponent at zero, which
/// rules out overflow for finite inputs. `eps` guards the division for
/// degenerate groups; `crate::config::DEFAULT_EPSILON` is the conventional
/// value. Buffer lanes of unreferenced groups are never read back.
pub fn segment_softmax<S, D>(
    src: &ArrayBase<S, D>,
    index: &[usize],
    axis: Axis,
    num_groups: Option<usize>,
    eps: f32,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension + RemoveAxis,
{
    let group_max = scatter_max(src, index, axis, num_groups)?;
    let maxes = gather(&group_max, index, axis)?;
    let shifted = (src - &maxes).mapv(f32::exp);
    let group_sum = scatter_add(&shifted, index, axis, num_groups)?;
    let sums = gather(&group_sum, index, axis)?;
    Ok(shifted / (sums + eps))
}
