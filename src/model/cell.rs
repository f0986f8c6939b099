//! Call contract for externally supplied graph recurrent cells.
//!
//! The imputation model does not implement the recurrent cell itself (its
//! diffusion convolution, gating and decoder live elsewhere); it only drives
//! two cell instances through this contract and fuses what comes back.

use ndarray::{Array3, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::Graph;
use crate::ops::reverse_axis;

/// Hyperparameters handed to a cell factory.
///
/// Both directional cells are built from the same values; only their learned
/// parameters differ.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Feature width of the sequences being imputed.
    pub input_size: usize,
    /// Recurrent hidden width.
    pub hidden_size: usize,
    /// Feature width of the exogenous input, if any.
    pub exog_size: Option<usize>,
    /// Stacked recurrent layers.
    pub n_layers: usize,
    /// Node count, when known up front.
    pub n_nodes: Option<usize>,
    /// Diffusion kernel size.
    pub kernel_size: usize,
    /// Spatial order of the cell's readout decoder.
    pub decoder_order: usize,
    /// Whether the cell should normalise layer activations.
    pub layer_norm: bool,
    /// Cell-internal dropout probability.
    pub dropout: f32,
}

/// Exogenous input alongside the primary sequence. Time is axis 1 in both
/// layouts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Exogenous {
    /// Shared across nodes: `[batch, time, exog]`.
    Global(Array3<f32>),
    /// Per node: `[batch, time, nodes, exog]`.
    PerNode(Array4<f32>),
}

impl Exogenous {
    /// Feature width of the exogenous signal.
    pub fn exog_size(&self) -> usize {
        match self {
            Exogenous::Global(u) => u.shape()[2],
            Exogenous::PerNode(u) => u.shape()[3],
        }
    }

    /// Batch and time lengths.
    pub fn batch_time(&self) -> (usize, usize) {
        match self {
            Exogenous::Global(u) => (u.shape()[0], u.shape()[1]),
            Exogenous::PerNode(u) => (u.shape()[0], u.shape()[1]),
        }
    }

    /// Time-reversed copy, for the backward pass.
    pub fn reverse_time(&self) -> Self {
        match self {
            Exogenous::Global(u) => Exogenous::Global(reverse_axis(u, Axis(1))),
            Exogenous::PerNode(u) => Exogenous::PerNode(reverse_axis(u, Axis(1))),
        }
    }
}

/// Everything one directional pass produces.
#[derive(Clone, Debug)]
pub struct CellOutput<S> {
    /// Imputed sequence `[batch, time, nodes, input_size]`.
    pub output: Array4<f32>,
    /// One-step-ahead prediction sequence, same shape as `output`.
    pub prediction: Array4<f32>,
    /// Hidden representation sequence `[batch, time, nodes, representation_size]`.
    pub representation: Array4<f32>,
    /// Recurrent state at sequence end; opaque to the model and discarded by it.
    pub final_state: S,
}

/// Contract for graph recurrent imputation cells.
///
/// A cell consumes a sequence, the graph, an optional missingness mask
/// (1 = observed, 0 = missing) and optional exogenous input, and yields a
/// [`CellOutput`]. Implementations own their parameters and their internal
/// recurrence; the model treats them as black boxes.
pub trait GraphRecurrentCell {
    /// Cell-internal recurrent state type.
    type State;

    /// Feature width of the `representation` sequences this cell produces.
    fn representation_size(&self) -> usize;

    /// Run the cell over a full sequence in the time order given.
    fn forward(
        &self,
        x: &Array4<f32>,
        graph: &Graph,
        mask: Option<&Array4<f32>>,
        u: Option<&Exogenous>,
    ) -> Result<CellOutput<Self::State>>;
}
