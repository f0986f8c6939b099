//! Sparse segment kernels.
//!
//! Everything here operates on a flattened batch of elements plus a group
//! index, instead of padded dense tensors:
//! - **scatter**: indexed accumulation (add/max) and gather
//! - **softmax**: numerically stable per-group softmax
//! - **attention**: scaled dot-product attention within groups

pub mod attention;
pub mod scatter;
pub mod softmax;
