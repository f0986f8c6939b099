//! Small functional array operations shared across the crate.

use ndarray::{Array, ArrayBase, Axis, Data, Dimension};

use crate::error::{GapfillError, Result};

/// Reverse an array along one axis; all other axes are unchanged.
///
/// Index `i` maps to `len - 1 - i`. Pure: returns a fresh array. Reversing
/// twice restores the original exactly. The imputation model uses this on the
/// time axis to feed the backward cell and to bring its outputs back into
/// forward-time order.
pub fn reverse_axis<A, S, D>(array: &ArrayBase<S, D>, axis: Axis) -> Array<A, D>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    let mut view = array.view();
    view.invert_axis(axis);
    view.to_owned()
}

/// Gated tanh activation.
///
/// Splits the input in two equal halves `a, b` along `axis` and returns
/// `tanh(a) ⊙ sigmoid(b)`. The split axis must have even length; the output
/// halves it. Rejects odd lengths.
pub fn gated_tanh<S, D>(input: &ArrayBase<S, D>, axis: Axis) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let len = input.len_of(axis);
    if len % 2 != 0 {
        return Err(GapfillError::Config(format!(
            "gated activation needs an even length along axis {}, got {len}",
            axis.index()
        )));
    }
    let (out_half, gate_half) = input.view().split_at(axis, len / 2);
    let mut out = out_half.to_owned();
    out.zip_mut_with(&gate_half, |o, &g| *o = o.tanh() * sigmoid(g));
    Ok(out)
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
