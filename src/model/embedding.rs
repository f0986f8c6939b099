//! Learned per-node embeddings.

use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config::EMBEDDING_INIT_STD;

/// Learned feature table with one row per graph node.
///
/// Rows are looked up per forward pass and broadcast across batch and time for
/// the fusion readout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeEmbedding {
    /// Embedding matrix `[n_nodes, embedding_size]`.
    pub weight: Array2<f32>,
}

impl NodeEmbedding {
    /// Gaussian-initialised table (std `EMBEDDING_INIT_STD`) from a seeded RNG.
    pub fn new(n_nodes: usize, embedding_size: usize, rng: &mut StdRng) -> Self {
        let weight = Array2::from_shape_fn((n_nodes, embedding_size), |_| {
            let z: f32 = StandardNormal.sample(rng);
            z * EMBEDDING_INIT_STD
        });
        Self { weight }
    }

    /// Number of nodes in the table.
    pub fn n_nodes(&self) -> usize {
        self.weight.nrows()
    }

    /// Feature width of one embedding row.
    pub fn embedding_size(&self) -> usize {
        self.weight.ncols()
    }

    /// Broadcast the table to `[batch, time, n_nodes, embedding_size]`.
    pub fn expand(&self, batch: usize, time: usize) -> Array4<f32> {
        let (n, e) = self.weight.dim();
        Array4::from_shape_fn((batch, time, n, e), |(_, _, node, feat)| {
            self.weight[[node, feat]]
        })
    }
}
