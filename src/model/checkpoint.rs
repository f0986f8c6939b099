//! Checkpoint envelope for trained imputers.
//!
//! A checkpoint stores the model next to the hyperparameters it was built
//! from. Restoring verifies those hyperparameters against what the caller
//! expects, so a weight file never silently loads into a mismatched model.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::bidirectional::{BidirectionalImputer, ImputerConfig};
use crate::model::cell::GraphRecurrentCell;

/// Serialised pairing of a model with its configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    config: ImputerConfig,
    model: BidirectionalImputer<C>,
}

impl<C> Checkpoint<C>
where
    C: GraphRecurrentCell + Serialize + DeserializeOwned,
{
    /// Wrap a model for persistence.
    pub fn new(model: BidirectionalImputer<C>) -> Self {
        let config = model.config().clone();
        Self { config, model }
    }

    /// Hyperparameters stored in the envelope.
    pub fn config(&self) -> &ImputerConfig {
        &self.config
    }

    /// Serialise the checkpoint for persistence.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("checkpoint serialisation should not fail")
    }

    /// Deserialise a checkpoint produced by [`Checkpoint::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Recover the model, verifying the stored hyperparameters match the
    /// configuration the caller expects.
    pub fn into_model(self, expected: &ImputerConfig) -> anyhow::Result<BidirectionalImputer<C>> {
        if &self.config != expected {
            return Err(anyhow::anyhow!(
                "checkpoint hyperparameters do not match the expected configuration"
            ));
        }
        Ok(self.model)
    }

    /// Write the checkpoint to disk.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_bytes())
            .with_context(|| format!("failed to write checkpoint '{}'", path.display()))?;
        info!(path = %path.display(), "saved imputer checkpoint");
        Ok(())
    }

    /// Read a checkpoint from disk and recover its model.
    pub fn load(path: &Path, expected: &ImputerConfig) -> anyhow::Result<BidirectionalImputer<C>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read checkpoint '{}'", path.display()))?;
        let checkpoint = Self::from_bytes(&bytes)
            .with_context(|| format!("failed to decode checkpoint '{}'", path.display()))?;
        info!(path = %path.display(), "loaded imputer checkpoint");
        checkpoint.into_model(expected)
    }
}
