//! # gapfill
//!
//! **Graph recurrent imputation** for multivariate time series: sparse
//! segment-aware numeric kernels plus a bidirectional recurrent model that
//! fills missing values in sequences observed over a fixed sensor graph.
//!
//! ## Components
//!
//! 1. **Scatter kernels**: indexed accumulation (add, max) and gather, with a
//!    reduction-safe parallel variant
//! 2. **Segment softmax**: numerically stable normalisation over ragged,
//!    index-defined groups
//! 3. **Sparse multi-head attention**: per-edge scores normalised per segment
//!    and scatter-aggregated into node outputs
//! 4. **Bidirectional imputer**: twin recurrent cells reading opposite time
//!    orders, fused by an mlp readout or an elementwise reduction
//! 5. **Checkpointing**: configuration-verified persistence of trained models
//!
//! ## Data layout
//!
//! - Sequences are `[batch, time, nodes, features]`, with time on axis 1
//! - Graphs are COO edge lists `[2, edges]` with optional edge weights
//! - Kernels take the normalisation axis and group indices explicitly

pub mod error;
pub mod graph;
pub mod kernels;
pub mod model;
pub mod ops;

pub use error::{GapfillError, Result};
pub use graph::Graph;
pub use kernels::attention::{sparse_multi_head_attention, sparse_multi_head_attention_dropout};
pub use kernels::scatter::{gather, par_scatter_add, scatter_add, scatter_max};
pub use kernels::softmax::segment_softmax;
pub use model::bidirectional::{BidirectionalImputer, FusionMode, ImputationOutput, ImputerConfig};
pub use model::cell::{CellConfig, CellOutput, Exogenous, GraphRecurrentCell};
pub use model::checkpoint::Checkpoint;
pub use model::embedding::NodeEmbedding;
pub use ops::{gated_tanh, reverse_axis};

/// Crate-wide constants.
pub mod config {
    /// Additive stabiliser in segment-softmax denominators.
    pub const DEFAULT_EPSILON: f32 = 1e-8;

    /// Recurrent hidden width used when a config does not override it.
    pub const DEFAULT_HIDDEN_SIZE: usize = 64;

    /// Hidden width of the mlp fusion readout.
    pub const DEFAULT_FF_SIZE: usize = 128;

    /// Diffusion kernel size forwarded to recurrent cells.
    pub const DEFAULT_KERNEL_SIZE: usize = 2;

    /// Standard deviation of freshly initialised node embeddings.
    pub const EMBEDDING_INIT_STD: f32 = 0.02;
}
