//! Sparse multi-head attention over index-defined groups.
//!
//! Queries, keys and values are laid out per element as `[S, heads, channels]`
//! where S counts the sparse elements of a flattened batch. Each element's key
//! pairing is implicit in the layout: score `i` is the scaled dot product of
//! `q[i]` and `k[i]`, and normalisation happens only among elements sharing a
//! group. There is no dense S×S score matrix anywhere.

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::DEFAULT_EPSILON;
use crate::error::{GapfillError, Result};
use crate::kernels::scatter::{resolve_group_count, scatter_add};
use crate::kernels::softmax::segment_softmax;

/// Scaled dot-product attention restricted to same-group elements.
///
/// `q`, `k`: `[S, H, E]`; `v`: `[S, H, O]`; `index`: length S, mapping each
/// element to its target position in `[0, N)` with N given by `dim_size` or
/// inferred as `max(index) + 1`.
///
/// Returns the scatter-accumulated output `[N, H, O]` and the per-element
/// attention weights `[S, H]`, which sum to one within each (group, head).
pub fn sparse_multi_head_attention(
    q: &Array3<f32>,
    k: &Array3<f32>,
    v: &Array3<f32>,
    index: &[usize],
    dim_size: Option<usize>,
) -> Result<(Array3<f32>, Array2<f32>)> {
    attention_inner(q, k, v, index, dim_size, None)
}

/// Training-mode variant: inverted dropout on the normalised weights.
///
/// Kept entries are rescaled by `1 / (1 - dropout_p)` so the expected weight
/// mass is unchanged. The returned weights are post-dropout. The RNG is caller
/// held, so runs stay reproducible under a fixed seed.
pub fn sparse_multi_head_attention_dropout(
    q: &Array3<f32>,
    k: &Array3<f32>,
    v: &Array3<f32>,
    index: &[usize],
    dim_size: Option<usize>,
    dropout_p: f32,
    rng: &mut StdRng,
) -> Result<(Array3<f32>, Array2<f32>)> {
    attention_inner(q, k, v, index, dim_size, Some((dropout_p, rng)))
}

fn attention_inner(
    q: &Array3<f32>,
    k: &Array3<f32>,
    v: &Array3<f32>,
    index: &[usize],
    dim_size: Option<usize>,
    dropout: Option<(f32, &mut StdRng)>,
) -> Result<(Array3<f32>, Array2<f32>)> {
    let (s, h, e) = q.dim();
    if k.dim() != q.dim() {
        return Err(GapfillError::ShapeMismatch {
            what: "keys",
            expected: q.shape().to_vec(),
            actual: k.shape().to_vec(),
        });
    }
    let (vs, vh, _) = v.dim();
    if vs != s || vh != h {
        return Err(GapfillError::ShapeMismatch {
            what: "values",
            expected: vec![s, h],
            actual: vec![vs, vh],
        });
    }
    if e == 0 {
        return Err(GapfillError::Config(
            "attention embedding size must be positive".into(),
        ));
    }
    let n = resolve_group_count(index, s, dim_size)?;

    let scale = (e as f32).sqrt();
    let scores = (q * k).sum_axis(Axis(2)) / scale;
    let mut alpha = segment_softmax(&scores, index, Axis(0), Some(n), DEFAULT_EPSILON)?;

    if let Some((p, rng)) = dropout {
        if !(0.0..1.0).contains(&p) {
            return Err(GapfillError::Config(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        if p > 0.0 {
            let keep = 1.0 - p;
            alpha.mapv_inplace(|a| if rng.gen::<f32>() < p { 0.0 } else { a / keep });
        }
    }

    let weights = alpha.view().insert_axis(Axis(2));
    let weighted = v * &weights;
    let out = scatter_add(&weighted, index, Axis(0), Some(n))?;
    Ok((out, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::SeedableRng;

    fn seeded_qkv(s: usize, h: usize, e: usize, o: usize) -> (Array3<f32>, Array3<f32>, Array3<f32>) {
        let mut rng = StdRng::seed_from_u64(11);
        let q = Array3::from_shape_fn((s, h, e), |_| rng.gen::<f32>() * 2.0 - 1.0);
        let k = Array3::from_shape_fn((s, h, e), |_| rng.gen::<f32>() * 2.0 - 1.0);
        let v = Array3::from_shape_fn((s, h, o), |_| rng.gen::<f32>() * 2.0 - 1.0);
        (q, k, v)
    }

    #[test]
    fn test_weights_sum_to_one_per_group_and_head() {
        let (q, k, v) = seeded_qkv(6, 2, 3, 2);
        let index = [0, 1, 0, 1, 2, 2];
        let (_, alpha) = sparse_multi_head_attention(&q, &k, &v, &index, None).unwrap();

        let sums = scatter_add(&alpha, &index, Axis(0), Some(3)).unwrap();
        for g in 0..3 {
            for head in 0..2 {
                assert!(
                    (sums[[g, head]] - 1.0).abs() < 1e-5,
                    "group {} head {} sums to {}",
                    g,
                    head,
                    sums[[g, head]]
                );
            }
        }
    }

    #[test]
    fn test_single_group_matches_dense() {
        let (q, k, v) = seeded_qkv(4, 2, 3, 2);
        let index = [0usize; 4];
        let (out, alpha) = sparse_multi_head_attention(&q, &k, &v, &index, None).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2]);

        for head in 0..2 {
            // Dense reference: per-element dot scores, softmax, weighted sum.
            let scores: Vec<f32> = (0..4)
                .map(|i| {
                    (0..3).map(|c| q[[i, head, c]] * k[[i, head, c]]).sum::<f32>()
                        / (3.0f32).sqrt()
                })
                .collect();
            let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let denom: f32 = exps.iter().sum::<f32>() + DEFAULT_EPSILON;

            for (i, exp) in exps.iter().enumerate() {
                assert!((alpha[[i, head]] - exp / denom).abs() < 1e-6);
            }
            for c in 0..2 {
                let dense: f32 = (0..4)
                    .map(|i| exps[i] / denom * v[[i, head, c]])
                    .sum();
                assert!(
                    (out[[0, head, c]] - dense).abs() < 1e-5,
                    "head {} channel {}: sparse={} dense={}",
                    head,
                    c,
                    out[[0, head, c]],
                    dense
                );
            }
        }
    }

    #[test]
    fn test_qk_embedding_mismatch_rejected() {
        let (q, _, v) = seeded_qkv(3, 2, 3, 2);
        let k = Array3::<f32>::zeros((3, 2, 4));
        assert!(sparse_multi_head_attention(&q, &k, &v, &[0, 0, 0], None).is_err());
    }

    #[test]
    fn test_value_rows_mismatch_rejected() {
        let (q, k, _) = seeded_qkv(3, 2, 3, 2);
        let v = Array3::<f32>::zeros((5, 2, 2));
        assert!(sparse_multi_head_attention(&q, &k, &v, &[0, 0, 0], None).is_err());
    }

    #[test]
    fn test_explicit_dim_size_pads_with_zeros() {
        let (q, k, v) = seeded_qkv(3, 1, 2, 2);
        let index = [0, 2, 2];
        let (out, _) = sparse_multi_head_attention(&q, &k, &v, &index, Some(5)).unwrap();
        assert_eq!(out.shape(), &[5, 1, 2]);
        for g in [1usize, 3, 4] {
            for c in 0..2 {
                assert_eq!(out[[g, 0, c]], 0.0);
            }
        }
    }

    #[test]
    fn test_dropout_is_seeded() {
        let (q, k, v) = seeded_qkv(6, 2, 3, 2);
        let index = [0, 0, 1, 1, 2, 2];

        let mut rng_a = StdRng::seed_from_u64(99);
        let (out_a, alpha_a) =
            sparse_multi_head_attention_dropout(&q, &k, &v, &index, None, 0.5, &mut rng_a)
                .unwrap();
        let mut rng_b = StdRng::seed_from_u64(99);
        let (out_b, alpha_b) =
            sparse_multi_head_attention_dropout(&q, &k, &v, &index, None, 0.5, &mut rng_b)
                .unwrap();

        assert_eq!(out_a, out_b);
        assert_eq!(alpha_a, alpha_b);
    }

    #[test]
    fn test_dropout_probability_validated() {
        let (q, k, v) = seeded_qkv(2, 1, 2, 1);
        let mut rng = StdRng::seed_from_u64(0);
        let err =
            sparse_multi_head_attention_dropout(&q, &k, &v, &[0, 0], None, 1.5, &mut rng)
                .unwrap_err();
        match err {
            GapfillError::Config(msg) => assert!(msg.contains("dropout")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let q = Array3::<f32>::zeros((0, 2, 3));
        let k = Array3::<f32>::zeros((0, 2, 3));
        let v = Array3::<f32>::zeros((0, 2, 2));
        let (out, alpha) = sparse_multi_head_attention(&q, &k, &v, &[], Some(3)).unwrap();
        assert_eq!(out.shape(), &[3, 2, 2]);
        assert!(out.iter().all(|&x| x == 0.0));
        assert_eq!(alpha.shape(), &[0, 2]);
    }
}
