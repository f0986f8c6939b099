//! Bidirectional imputation over a graph time series.
//!
//! Two independently parameterised recurrent cells read the sequence in
//! opposite time orders. The backward branch runs on a time-reversed copy of
//! every input and its outputs are reversed back, so both branches line up in
//! forward-time order before fusion.

use std::str::FromStr;

use ndarray::{concatenate, Array4, ArrayView4, Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_FF_SIZE, DEFAULT_HIDDEN_SIZE, DEFAULT_KERNEL_SIZE};
use crate::error::{GapfillError, Result};
use crate::graph::Graph;
use crate::model::cell::{CellConfig, CellOutput, Exogenous, GraphRecurrentCell};
use crate::model::embedding::NodeEmbedding;
use crate::model::readout::MlpReadout;
use crate::ops::reverse_axis;

/// Fusion policy combining the two directional outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionMode {
    /// Feed-forward readout over both representations, the mask and the
    /// optional node embedding.
    Mlp,
    /// Elementwise mean of the two directional outputs.
    Mean,
    /// Elementwise sum.
    Sum,
    /// Elementwise minimum.
    Min,
    /// Elementwise maximum.
    Max,
}

impl FromStr for FusionMode {
    type Err = GapfillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mlp" => Ok(FusionMode::Mlp),
            "mean" => Ok(FusionMode::Mean),
            "sum" => Ok(FusionMode::Sum),
            "min" => Ok(FusionMode::Min),
            "max" => Ok(FusionMode::Max),
            other => Err(GapfillError::Config(format!(
                "unknown fusion mode '{other}' (expected mlp, mean, sum, min or max)"
            ))),
        }
    }
}

/// Elementwise reduction over the stacked directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum ReduceOp {
    Mean,
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    /// Combine the forward and backward outputs. Exact value ties under min
    /// and max keep the forward entry (first occurrence on the stacked axis).
    fn apply(self, fwd: &Array4<f32>, bwd: &Array4<f32>) -> Array4<f32> {
        match self {
            ReduceOp::Mean => (fwd + bwd) / 2.0,
            ReduceOp::Sum => fwd + bwd,
            ReduceOp::Min => Zip::from(fwd)
                .and(bwd)
                .map_collect(|&a, &b| if b < a { b } else { a }),
            ReduceOp::Max => Zip::from(fwd)
                .and(bwd)
                .map_collect(|&a, &b| if b > a { b } else { a }),
        }
    }
}

/// Fusion strategy resolved once at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum Fusion {
    Mlp(MlpReadout),
    Reduce(ReduceOp),
}

/// Hyperparameters of [`BidirectionalImputer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImputerConfig {
    /// Feature width of the sequences being imputed.
    pub input_size: usize,
    /// Recurrent hidden width forwarded to the cells.
    pub hidden_size: usize,
    /// Hidden width of the mlp fusion readout.
    pub ff_size: usize,
    /// Dropout probability inside the mlp fusion readout.
    pub ff_dropout: f32,
    /// Per-node embedding width; requires `n_nodes`.
    pub embedding_size: Option<usize>,
    /// Exogenous feature width, when `u` is supplied at forward time.
    pub exog_size: Option<usize>,
    /// Stacked recurrent layers per cell.
    pub n_layers: usize,
    /// Node count, required by embeddings and checked against inputs.
    pub n_nodes: Option<usize>,
    /// Diffusion kernel size forwarded to the cells.
    pub kernel_size: usize,
    /// Spatial order of the cell decoder.
    pub decoder_order: usize,
    /// Whether cells should normalise layer activations.
    pub layer_norm: bool,
    /// Cell-internal dropout probability.
    pub dropout: f32,
    /// How the two directions are fused.
    pub merge_mode: FusionMode,
    /// Seed for embedding and readout initialisation.
    pub seed: u64,
}

impl ImputerConfig {
    /// Reference defaults for a given feature width.
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            ff_size: DEFAULT_FF_SIZE,
            ff_dropout: 0.0,
            embedding_size: None,
            exog_size: None,
            n_layers: 1,
            n_nodes: None,
            kernel_size: DEFAULT_KERNEL_SIZE,
            decoder_order: 1,
            layer_norm: false,
            dropout: 0.0,
            merge_mode: FusionMode::Mlp,
            seed: 0,
        }
    }

    /// Cell-facing slice of the hyperparameters.
    pub fn cell_config(&self) -> CellConfig {
        CellConfig {
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            exog_size: self.exog_size,
            n_layers: self.n_layers,
            n_nodes: self.n_nodes,
            kernel_size: self.kernel_size,
            decoder_order: self.decoder_order,
            layer_norm: self.layer_norm,
            dropout: self.dropout,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(GapfillError::Config("input_size must be positive".into()));
        }
        if self.hidden_size == 0 {
            return Err(GapfillError::Config("hidden_size must be positive".into()));
        }
        if self.n_layers == 0 {
            return Err(GapfillError::Config("n_layers must be at least 1".into()));
        }
        if self.kernel_size == 0 {
            return Err(GapfillError::Config("kernel_size must be positive".into()));
        }
        if self.decoder_order == 0 {
            return Err(GapfillError::Config("decoder_order must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(GapfillError::Config(format!(
                "dropout probability must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(0.0..1.0).contains(&self.ff_dropout) {
            return Err(GapfillError::Config(format!(
                "ff_dropout probability must be in [0, 1), got {}",
                self.ff_dropout
            )));
        }
        if self.embedding_size == Some(0) {
            return Err(GapfillError::Config(
                "embedding_size must be positive when set".into(),
            ));
        }
        if self.exog_size == Some(0) {
            return Err(GapfillError::Config(
                "exog_size must be positive when set".into(),
            ));
        }
        if self.n_nodes == Some(0) {
            return Err(GapfillError::Config(
                "n_nodes must be positive when set".into(),
            ));
        }
        if self.merge_mode == FusionMode::Mlp && self.ff_size == 0 {
            return Err(GapfillError::Config(
                "ff_size must be positive for mlp fusion".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a forward pass returns. The four directional signals feed
/// auxiliary per-direction losses in the surrounding harness.
#[derive(Clone, Debug)]
pub struct ImputationOutput {
    /// Fused imputation `[batch, time, nodes, input_size]`.
    pub imputation: Array4<f32>,
    /// Forward-direction imputed sequence.
    pub fwd_out: Array4<f32>,
    /// Backward-direction imputed sequence, in forward-time order.
    pub bwd_out: Array4<f32>,
    /// Forward-direction one-step predictions.
    pub fwd_pred: Array4<f32>,
    /// Backward-direction one-step predictions, in forward-time order.
    pub bwd_pred: Array4<f32>,
}

/// Bidirectional recurrent graph imputer.
///
/// Owns two cell instances built from identical hyperparameters (their
/// learned parameters stay independent), the optional node-embedding table,
/// and the fusion strategy fixed at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidirectionalImputer<C> {
    config: ImputerConfig,
    fwd_cell: C,
    bwd_cell: C,
    embedding: Option<NodeEmbedding>,
    fusion: Fusion,
}

impl<C: GraphRecurrentCell> BidirectionalImputer<C> {
    /// Build the model. `build_cell` is invoked once per direction with the
    /// same [`CellConfig`], so both cells share hyperparameters but never
    /// parameters.
    pub fn new<F>(config: ImputerConfig, mut build_cell: F) -> Result<Self>
    where
        F: FnMut(&CellConfig) -> Result<C>,
    {
        config.validate()?;
        let cell_config = config.cell_config();
        let fwd_cell = build_cell(&cell_config)?;
        let bwd_cell = build_cell(&cell_config)?;
        if fwd_cell.representation_size() != bwd_cell.representation_size() {
            return Err(GapfillError::DimensionMismatch {
                expected: fwd_cell.representation_size(),
                actual: bwd_cell.representation_size(),
            });
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let embedding = match config.embedding_size {
            Some(embedding_size) => {
                let n_nodes = config.n_nodes.ok_or_else(|| {
                    GapfillError::Config(
                        "node embeddings need a known node count: set n_nodes alongside embedding_size"
                            .into(),
                    )
                })?;
                Some(NodeEmbedding::new(n_nodes, embedding_size, &mut rng))
            }
            None => None,
        };

        let fusion = match config.merge_mode {
            FusionMode::Mlp => {
                let repr = fwd_cell.representation_size();
                let emb_width = embedding.as_ref().map_or(0, NodeEmbedding::embedding_size);
                let in_features = 2 * repr + config.input_size + emb_width;
                Fusion::Mlp(MlpReadout::new(
                    in_features,
                    config.ff_size,
                    config.input_size,
                    config.ff_dropout,
                    &mut rng,
                )?)
            }
            FusionMode::Mean => Fusion::Reduce(ReduceOp::Mean),
            FusionMode::Sum => Fusion::Reduce(ReduceOp::Sum),
            FusionMode::Min => Fusion::Reduce(ReduceOp::Min),
            FusionMode::Max => Fusion::Reduce(ReduceOp::Max),
        };

        debug!(
            input_size = config.input_size,
            hidden_size = config.hidden_size,
            merge_mode = ?config.merge_mode,
            "constructed bidirectional imputer"
        );
        Ok(Self {
            config,
            fwd_cell,
            bwd_cell,
            embedding,
            fusion,
        })
    }

    /// Hyperparameters this model was built with.
    pub fn config(&self) -> &ImputerConfig {
        &self.config
    }

    /// The forward-time and backward-time cells.
    pub fn cells(&self) -> (&C, &C) {
        (&self.fwd_cell, &self.bwd_cell)
    }

    /// Mutable access to both cells, for parameter updates by a harness.
    pub fn cells_mut(&mut self) -> (&mut C, &mut C) {
        (&mut self.fwd_cell, &mut self.bwd_cell)
    }

    /// The node-embedding table, when configured.
    pub fn embedding(&self) -> Option<&NodeEmbedding> {
        self.embedding.as_ref()
    }

    /// Toggle dropout in the fusion readout; cells manage their own mode.
    pub fn set_training(&mut self, training: bool) {
        if let Fusion::Mlp(readout) = &mut self.fusion {
            readout.set_training(training);
        }
    }

    /// Impute a sequence batch.
    ///
    /// `x` is `[batch, time, nodes, input_size]`; `mask` marks observed
    /// entries (1) versus missing ones (0) and must match `x`'s shape. The
    /// two directional passes have no data dependency and run concurrently.
    pub fn forward(
        &self,
        x: &Array4<f32>,
        graph: &Graph,
        mask: Option<&Array4<f32>>,
        u: Option<&Exogenous>,
    ) -> Result<ImputationOutput>
    where
        C: Sync,
        C::State: Send,
    {
        self.validate_inputs(x, graph, mask, u)?;
        debug!(shape = ?x.shape(), "imputing sequence batch");

        let rev_x = reverse_axis(x, Axis(1));
        let rev_mask = mask.map(|m| reverse_axis(m, Axis(1)));
        let rev_u = u.map(Exogenous::reverse_time);

        let (fwd_pass, bwd_pass) = rayon::join(
            || self.fwd_cell.forward(x, graph, mask, u),
            || {
                self.bwd_cell
                    .forward(&rev_x, graph, rev_mask.as_ref(), rev_u.as_ref())
            },
        );
        let fwd = fwd_pass?;
        let bwd = bwd_pass?;
        self.validate_cell_output(&fwd, x)?;
        self.validate_cell_output(&bwd, x)?;

        // Reversing the backward outputs aligns both branches in forward
        // time; the final states stay in their own frames and are dropped.
        let bwd_out = reverse_axis(&bwd.output, Axis(1));
        let bwd_pred = reverse_axis(&bwd.prediction, Axis(1));
        let bwd_repr = reverse_axis(&bwd.representation, Axis(1));

        let imputation = match &self.fusion {
            Fusion::Mlp(readout) => {
                let (batch, time, _, _) = x.dim();
                let ones;
                let mask_view = match mask {
                    Some(m) => m.view(),
                    None => {
                        ones = Array4::ones(x.raw_dim());
                        ones.view()
                    }
                };
                let expanded;
                let mut parts: Vec<ArrayView4<f32>> =
                    vec![fwd.representation.view(), bwd_repr.view(), mask_view];
                if let Some(embedding) = &self.embedding {
                    expanded = embedding.expand(batch, time);
                    parts.push(expanded.view());
                }
                let features = concatenate(Axis(3), &parts)?;
                readout.forward(&features)?
            }
            Fusion::Reduce(op) => op.apply(&fwd.output, &bwd_out),
        };

        Ok(ImputationOutput {
            imputation,
            fwd_out: fwd.output,
            bwd_out,
            fwd_pred: fwd.prediction,
            bwd_pred,
        })
    }

    fn validate_inputs(
        &self,
        x: &Array4<f32>,
        graph: &Graph,
        mask: Option<&Array4<f32>>,
        u: Option<&Exogenous>,
    ) -> Result<()> {
        let (batch, time, nodes, features) = x.dim();
        if features != self.config.input_size {
            return Err(GapfillError::DimensionMismatch {
                expected: self.config.input_size,
                actual: features,
            });
        }
        if let Some(expected) = self.config.n_nodes {
            if nodes != expected {
                return Err(GapfillError::DimensionMismatch {
                    expected,
                    actual: nodes,
                });
            }
        }
        graph.validate_nodes(nodes)?;
        if let Some(m) = mask {
            if m.dim() != x.dim() {
                return Err(GapfillError::ShapeMismatch {
                    what: "mask",
                    expected: x.shape().to_vec(),
                    actual: m.shape().to_vec(),
                });
            }
        }
        if let Some(exo) = u {
            match self.config.exog_size {
                Some(expected) if exo.exog_size() != expected => {
                    return Err(GapfillError::DimensionMismatch {
                        expected,
                        actual: exo.exog_size(),
                    });
                }
                None => {
                    return Err(GapfillError::Config(
                        "exogenous input supplied but exog_size is not configured".into(),
                    ));
                }
                _ => {}
            }
            let (eb, et) = exo.batch_time();
            if (eb, et) != (batch, time) {
                return Err(GapfillError::ShapeMismatch {
                    what: "exogenous input",
                    expected: vec![batch, time],
                    actual: vec![eb, et],
                });
            }
            if let Exogenous::PerNode(arr) = exo {
                if arr.shape()[2] != nodes {
                    return Err(GapfillError::DimensionMismatch {
                        expected: nodes,
                        actual: arr.shape()[2],
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_cell_output(&self, pass: &CellOutput<C::State>, x: &Array4<f32>) -> Result<()> {
        let (batch, time, nodes, _) = x.dim();
        let checks = [
            ("cell output", &pass.output, self.config.input_size),
            ("cell prediction", &pass.prediction, self.config.input_size),
            (
                "cell representation",
                &pass.representation,
                self.fwd_cell.representation_size(),
            ),
        ];
        for (what, arr, features) in checks {
            if arr.dim() != (batch, time, nodes, features) {
                return Err(GapfillError::ShapeMismatch {
                    what,
                    expected: vec![batch, time, nodes, features],
                    actual: arr.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cell::test_cells::PrefixSumCell;
    use ndarray::Array3;
    use std::cell::RefCell;

    fn ramp(b: usize, t: usize, n: usize, f: usize) -> Array4<f32> {
        Array4::from_shape_fn((b, t, n, f), |(bi, ti, ni, fi)| {
            (bi * 1000 + ti * 100 + ni * 10 + fi) as f32 * 0.05
        })
    }

    fn ring_graph() -> Graph {
        Graph::from_edges(&[(0, 1), (1, 2), (2, 0)]).unwrap()
    }

    fn config_with(input_size: usize, merge_mode: FusionMode) -> ImputerConfig {
        let mut config = ImputerConfig::new(input_size);
        config.merge_mode = merge_mode;
        config
    }

    fn prefix_model(config: ImputerConfig) -> BidirectionalImputer<PrefixSumCell> {
        BidirectionalImputer::new(config, |cc| Ok(PrefixSumCell::new(cc.input_size))).unwrap()
    }

    #[test]
    fn test_mean_fusion_concrete_scenario() {
        let x = ramp(2, 5, 3, 4);
        let mask = Array4::<f32>::ones((2, 5, 3, 4));
        let model = prefix_model(config_with(4, FusionMode::Mean));

        let out = model.forward(&x, &ring_graph(), Some(&mask), None).unwrap();
        assert_eq!(out.imputation.shape(), &[2, 5, 3, 4]);
        assert_eq!(out.imputation, (&out.fwd_out + &out.bwd_out) / 2.0);
    }

    #[test]
    fn test_backward_branch_reversal_round_trip() {
        let x = ramp(1, 6, 3, 3);
        let graph = ring_graph();
        let model = prefix_model(config_with(3, FusionMode::Mean));
        let out = model.forward(&x, &graph, None, None).unwrap();

        let cell = PrefixSumCell::new(3);
        let fwd_manual = cell.forward(&x, &graph, None, None).unwrap();
        assert_eq!(out.fwd_out, fwd_manual.output);

        let rev_x = reverse_axis(&x, Axis(1));
        let bwd_manual = cell.forward(&rev_x, &graph, None, None).unwrap();
        assert_eq!(out.bwd_out, reverse_axis(&bwd_manual.output, Axis(1)));
        assert_eq!(out.bwd_pred, reverse_axis(&bwd_manual.prediction, Axis(1)));
    }

    #[test]
    fn test_embedding_requires_n_nodes() {
        let mut config = ImputerConfig::new(4);
        config.embedding_size = Some(8);

        let err = BidirectionalImputer::new(config, |cc| Ok(PrefixSumCell::new(cc.input_size)))
            .unwrap_err();
        match err {
            GapfillError::Config(msg) => assert!(msg.contains("n_nodes")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fusion_mode_parsing() {
        assert_eq!("mlp".parse::<FusionMode>().unwrap(), FusionMode::Mlp);
        assert_eq!("mean".parse::<FusionMode>().unwrap(), FusionMode::Mean);
        assert_eq!("sum".parse::<FusionMode>().unwrap(), FusionMode::Sum);
        assert_eq!("min".parse::<FusionMode>().unwrap(), FusionMode::Min);
        assert_eq!("max".parse::<FusionMode>().unwrap(), FusionMode::Max);

        let err = "median".parse::<FusionMode>().unwrap_err();
        match err {
            GapfillError::Config(msg) => assert!(msg.contains("median")),
            other => panic!("unexpected error: {other}"),
        }
        assert!("MLP".parse::<FusionMode>().is_err());
    }

    #[test]
    fn test_mlp_fusion_shape_with_embedding() {
        let mut config = config_with(4, FusionMode::Mlp);
        config.embedding_size = Some(8);
        config.n_nodes = Some(3);
        let model = prefix_model(config);
        assert!(model.embedding().is_some());

        let x = ramp(2, 5, 3, 4);
        let mask = Array4::<f32>::ones((2, 5, 3, 4));
        let out = model.forward(&x, &ring_graph(), Some(&mask), None).unwrap();
        assert_eq!(out.imputation.shape(), &[2, 5, 3, 4]);
    }

    #[test]
    fn test_mlp_fusion_without_mask_assumes_observed() {
        let model = prefix_model(config_with(4, FusionMode::Mlp));
        let x = ramp(1, 4, 3, 4);

        let open = model.forward(&x, &ring_graph(), None, None).unwrap();
        let mask = Array4::<f32>::ones((1, 4, 3, 4));
        let masked = model.forward(&x, &ring_graph(), Some(&mask), None).unwrap();
        assert_eq!(open.imputation, masked.imputation);
    }

    #[test]
    fn test_min_max_fusion_elementwise() {
        let x = ramp(1, 4, 3, 2);
        let graph = ring_graph();

        let min_model = prefix_model(config_with(2, FusionMode::Min));
        let out = min_model.forward(&x, &graph, None, None).unwrap();
        let expected = Zip::from(&out.fwd_out)
            .and(&out.bwd_out)
            .map_collect(|&a, &b| if b < a { b } else { a });
        assert_eq!(out.imputation, expected);

        let max_model = prefix_model(config_with(2, FusionMode::Max));
        let out = max_model.forward(&x, &graph, None, None).unwrap();
        let expected = Zip::from(&out.fwd_out)
            .and(&out.bwd_out)
            .map_collect(|&a, &b| if b > a { b } else { a });
        assert_eq!(out.imputation, expected);
    }

    #[test]
    fn test_sum_fusion() {
        let x = ramp(1, 3, 3, 2);
        let model = prefix_model(config_with(2, FusionMode::Sum));
        let out = model.forward(&x, &ring_graph(), None, None).unwrap();
        assert_eq!(out.imputation, &out.fwd_out + &out.bwd_out);
    }

    #[test]
    fn test_mask_shape_mismatch_rejected() {
        let model = prefix_model(config_with(4, FusionMode::Mean));
        let x = ramp(2, 5, 3, 4);
        let mask = Array4::<f32>::ones((2, 5, 3, 3));
        let err = model
            .forward(&x, &ring_graph(), Some(&mask), None)
            .unwrap_err();
        match err {
            GapfillError::ShapeMismatch { what, .. } => assert_eq!(what, "mask"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_input_width_mismatch_rejected() {
        let model = prefix_model(config_with(4, FusionMode::Mean));
        let x = ramp(2, 5, 3, 5);
        assert!(model.forward(&x, &ring_graph(), None, None).is_err());
    }

    #[test]
    fn test_node_count_mismatch_rejected() {
        let mut config = config_with(4, FusionMode::Mean);
        config.n_nodes = Some(4);
        let model = prefix_model(config);
        let x = ramp(2, 5, 3, 4);
        assert!(model.forward(&x, &ring_graph(), None, None).is_err());
    }

    #[test]
    fn test_graph_node_out_of_range_rejected() {
        let model = prefix_model(config_with(4, FusionMode::Mean));
        let x = ramp(1, 3, 3, 4);
        let graph = Graph::from_edges(&[(0, 5)]).unwrap();
        assert!(model.forward(&x, &graph, None, None).is_err());
    }

    #[test]
    fn test_exogenous_validation() {
        let x = ramp(1, 4, 3, 4);
        let u = Exogenous::Global(Array3::<f32>::zeros((1, 4, 2)));

        let unconfigured = prefix_model(config_with(4, FusionMode::Mean));
        assert!(unconfigured
            .forward(&x, &ring_graph(), None, Some(&u))
            .is_err());

        let mut config = config_with(4, FusionMode::Mean);
        config.exog_size = Some(2);
        let model = prefix_model(config);
        assert!(model.forward(&x, &ring_graph(), None, Some(&u)).is_ok());

        let wide = Exogenous::Global(Array3::<f32>::zeros((1, 4, 3)));
        assert!(model.forward(&x, &ring_graph(), None, Some(&wide)).is_err());
    }

    #[test]
    fn test_invalid_dropout_rejected() {
        let mut config = config_with(4, FusionMode::Mlp);
        config.ff_dropout = 1.5;
        assert!(
            BidirectionalImputer::new(config, |cc| Ok(PrefixSumCell::new(cc.input_size))).is_err()
        );
    }

    #[test]
    fn test_training_mode_gates_readout_dropout() {
        let mut config = config_with(4, FusionMode::Mlp);
        config.ff_dropout = 0.5;
        let mut model = prefix_model(config);
        let x = ramp(2, 5, 3, 4);

        let a = model.forward(&x, &ring_graph(), None, None).unwrap();
        let b = model.forward(&x, &ring_graph(), None, None).unwrap();
        assert_eq!(a.imputation, b.imputation);

        model.set_training(true);
        let c = model.forward(&x, &ring_graph(), None, None).unwrap();
        let d = model.forward(&x, &ring_graph(), None, None).unwrap();
        assert_ne!(c.imputation, d.imputation);
    }

    #[test]
    fn test_seeded_construction_is_reproducible() {
        let mut config = config_with(4, FusionMode::Mlp);
        config.seed = 9;
        let x = ramp(1, 3, 3, 4);

        let a = prefix_model(config.clone());
        let b = prefix_model(config.clone());
        let out_a = a.forward(&x, &ring_graph(), None, None).unwrap();
        let out_b = b.forward(&x, &ring_graph(), None, None).unwrap();
        assert_eq!(out_a.imputation, out_b.imputation);

        config.seed = 10;
        let c = prefix_model(config);
        let out_c = c.forward(&x, &ring_graph(), None, None).unwrap();
        assert_ne!(out_a.imputation, out_c.imputation);
    }

    #[test]
    fn test_cell_factory_called_once_per_direction() {
        let seen = RefCell::new(Vec::new());
        let config = config_with(4, FusionMode::Mean);
        let model = BidirectionalImputer::new(config, |cc: &CellConfig| {
            seen.borrow_mut().push(cc.clone());
            Ok(PrefixSumCell::new(cc.input_size))
        })
        .unwrap();

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].hidden_size, DEFAULT_HIDDEN_SIZE);
        assert_eq!(seen[0].kernel_size, DEFAULT_KERNEL_SIZE);
        let (fwd, bwd) = model.cells();
        assert_eq!(fwd, bwd);
    }

    #[test]
    fn test_model_debug_output() {
        let model = prefix_model(config_with(4, FusionMode::Mean));
        let printed = format!("{model:?}");
        assert!(printed.contains("input_size: 4"));
        assert!(printed.contains("Reduce(Mean)"));
        assert!(printed.contains("embedding: None"));
    }
}
