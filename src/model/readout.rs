//! Feed-forward layers for the fusion readout.

use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GapfillError, Result};

/// Dense affine layer applied along the trailing feature axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix `[in_features, out_features]`.
    pub weight: Array2<f32>,
    /// Bias vector `[out_features]`.
    pub bias: Array1<f32>,
}

impl Linear {
    /// Xavier-uniform initialised layer from a seeded RNG.
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_features + out_features) as f32).sqrt();
        let weight =
            Array2::from_shape_fn((in_features, out_features), |_| rng.gen_range(-limit..limit));
        Self {
            weight,
            bias: Array1::zeros(out_features),
        }
    }

    /// Input feature width.
    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    /// Output feature width.
    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    /// Apply to a sequence batch `[batch, time, nodes, in_features]`.
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let (b, t, n, f) = x.dim();
        if f != self.in_features() {
            return Err(GapfillError::DimensionMismatch {
                expected: self.in_features(),
                actual: f,
            });
        }
        let flat = x.to_shape((b * t * n, f))?;
        let out = flat.dot(&self.weight) + &self.bias;
        Ok(out.into_shape_with_order((b, t, n, self.out_features()))?)
    }
}

/// Inverted dropout, active only in training mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dropout {
    /// Drop probability.
    pub p: f32,
    /// Whether dropping is currently applied.
    pub training: bool,
}

impl Dropout {
    /// A dropout layer starting in inference mode.
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(GapfillError::Config(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Self { p, training: false })
    }

    /// Pass through unchanged in inference mode; in training mode zero each
    /// entry with probability `p` and rescale survivors by `1 / (1 - p)`.
    pub fn forward(&self, x: &Array4<f32>) -> Array4<f32> {
        if !self.training || self.p == 0.0 {
            return x.clone();
        }
        let keep = 1.0 - self.p;
        let mut rng = rand::thread_rng();
        x.mapv(|v| if rng.gen::<f32>() < self.p { 0.0 } else { v / keep })
    }
}

/// Two-layer feed-forward readout: `Linear → ReLU → Dropout → Linear`.
///
/// Projects the concatenated directional representations (plus mask and
/// optional node embedding) back to the input feature width.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlpReadout {
    hidden: Linear,
    output: Linear,
    dropout: Dropout,
}

impl MlpReadout {
    pub fn new(
        in_features: usize,
        ff_size: usize,
        out_features: usize,
        dropout_p: f32,
        rng: &mut StdRng,
    ) -> Result<Self> {
        Ok(Self {
            hidden: Linear::new(in_features, ff_size, rng),
            output: Linear::new(ff_size, out_features, rng),
            dropout: Dropout::new(dropout_p)?,
        })
    }

    /// Expected feature width of the concatenated input.
    pub fn in_features(&self) -> usize {
        self.hidden.in_features()
    }

    /// Toggle dropout between training and inference behaviour.
    pub fn set_training(&mut self, training: bool) {
        self.dropout.training = training;
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let h = self.hidden.forward(x)?.mapv(|v| v.max(0.0));
        let h = self.dropout.forward(&h);
        self.output.forward(&h)
    }
}
