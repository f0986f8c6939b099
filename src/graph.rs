//! Static graph topology shared by the recurrent cells.
//!
//! The model never builds or rewires adjacency; it only forwards the structure
//! to whichever cell consumes it. Edges are stored as a `[2, E]` index matrix
//! (row 0 = source nodes, row 1 = target nodes) with optional scalar weights.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GapfillError, Result};

/// Edge list plus optional edge weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Graph {
    edge_index: Array2<usize>,
    edge_weight: Option<Array1<f32>>,
}

impl Graph {
    /// Build from a `[2, E]` edge-index matrix and optional weights of length E.
    pub fn new(edge_index: Array2<usize>, edge_weight: Option<Array1<f32>>) -> Result<Self> {
        if edge_index.nrows() != 2 {
            return Err(GapfillError::ShapeMismatch {
                what: "edge_index",
                expected: vec![2, edge_index.ncols()],
                actual: edge_index.shape().to_vec(),
            });
        }
        if let Some(w) = &edge_weight {
            if w.len() != edge_index.ncols() {
                return Err(GapfillError::DimensionMismatch {
                    expected: edge_index.ncols(),
                    actual: w.len(),
                });
            }
        }
        if edge_index.ncols() == 0 {
            warn!("graph constructed with an empty edge list");
        }
        Ok(Self {
            edge_index,
            edge_weight,
        })
    }

    /// Build an unweighted graph from `(source, target)` pairs.
    pub fn from_edges(edges: &[(usize, usize)]) -> Result<Self> {
        let mut index = Array2::zeros((2, edges.len()));
        for (e, &(src, dst)) in edges.iter().enumerate() {
            index[[0, e]] = src;
            index[[1, e]] = dst;
        }
        Self::new(index, None)
    }

    /// Build a weighted graph from `(source, target)` pairs and per-edge weights.
    pub fn with_weights(edges: &[(usize, usize)], weights: &[f32]) -> Result<Self> {
        if weights.len() != edges.len() {
            return Err(GapfillError::DimensionMismatch {
                expected: edges.len(),
                actual: weights.len(),
            });
        }
        let unweighted = Self::from_edges(edges)?;
        Self::new(unweighted.edge_index, Some(Array1::from_vec(weights.to_vec())))
    }

    /// Edge-index matrix, shape `[2, E]`.
    pub fn edge_index(&self) -> &Array2<usize> {
        &self.edge_index
    }

    /// Edge weights, length E, if present.
    pub fn edge_weight(&self) -> Option<&Array1<f32>> {
        self.edge_weight.as_ref()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edge_index.ncols()
    }

    /// Largest node id referenced by any edge, or `None` for an empty edge list.
    pub fn max_node_index(&self) -> Option<usize> {
        self.edge_index.iter().copied().max()
    }

    /// Check that every endpoint is a valid node id below `n_nodes`.
    pub fn validate_nodes(&self, n_nodes: usize) -> Result<()> {
        match self.max_node_index() {
            Some(max) if max >= n_nodes => Err(GapfillError::IndexOutOfRange {
                index: max,
                groups: n_nodes,
            }),
            _ => Ok(()),
        }
    }
}
