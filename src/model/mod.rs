//! Model layer: the recurrent cell abstraction, the bidirectional imputer,
//! node embeddings, the fusion readout, and checkpointing.

pub mod bidirectional;
pub mod cell;
pub mod checkpoint;
pub mod embedding;
pub mod readout;
