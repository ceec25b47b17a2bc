//! Empirical draw frequencies against the masked, temperature-scaled distribution

use midigen_core::prelude::*;
use midigen_core::sampling::softmax_scaled;

const DRAWS: usize = 40_000;
const TOLERANCE: f64 = 0.015;

fn expected(logits: &[f32], legal: &LegalSet, temperature: f32) -> Vec<f64> {
    let mut probs = softmax_scaled(logits, temperature);
    legal.apply(&mut probs);
    let total: f32 = probs.iter().sum();
    probs.iter().map(|&p| f64::from(p / total)).collect()
}

fn observed(
    sampler: &mut Sampler,
    logits: &[f32],
    legal: &LegalSet,
    params: &SamplingParams,
) -> Vec<f64> {
    let mut counts = vec![0usize; logits.len()];
    for _ in 0..DRAWS {
        let symbol = sampler.sample(logits, legal, params).unwrap();
        counts[symbol as usize] += 1;
    }
    counts.iter().map(|&c| c as f64 / DRAWS as f64).collect()
}

#[test]
fn test_unfiltered_draws_match_masked_distribution() {
    let logits = vec![3.0, 0.2, 1.0, -0.5, 4.0, 0.7, 1.5, -1.0];
    let legal = LegalSet::from_ranges([1..4, 5..8]);

    for temperature in [0.5f32, 1.0, 2.0] {
        let params = SamplingParams {
            temperature,
            top_p: 1.0,
            top_k: logits.len(),
        };
        let mut sampler = Sampler::new(Some(2024));

        let want = expected(&logits, &legal, temperature);
        let got = observed(&mut sampler, &logits, &legal, &params);
        for (symbol, (w, g)) in want.iter().zip(&got).enumerate() {
            assert!(
                (w - g).abs() < TOLERANCE,
                "temperature {} symbol {}: expected {:.4}, observed {:.4}",
                temperature,
                symbol,
                w,
                g
            );
        }
        assert_eq!(got[0], 0.0);
        assert_eq!(got[4], 0.0);
    }
}

#[test]
fn test_top_k_limits_support() {
    let logits = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let legal = LegalSet::from_ranges([0..6]);
    let params = SamplingParams {
        temperature: 1.0,
        top_p: 1.0,
        top_k: 2,
    };
    let mut sampler = Sampler::new(Some(5));

    let got = observed(&mut sampler, &logits, &legal, &params);
    assert!(got[..4].iter().all(|&p| p == 0.0));

    // e^6 / (e^5 + e^6)
    let top = 1.0 / (1.0 + (-1.0f64).exp());
    assert!((got[5] - top).abs() < TOLERANCE);
}

#[test]
fn test_nucleus_limits_support() {
    // After masking 0, symbol 1 alone carries more than top_p
    let logits = vec![5.0, 4.0, 0.0, 0.0];
    let legal = LegalSet::from_ranges([1..4]);
    let probs = softmax_scaled(&logits, 1.0);
    let params = SamplingParams {
        temperature: 1.0,
        top_p: probs[1] * 0.9,
        top_k: 4,
    };
    let mut sampler = Sampler::new(Some(8));

    let got = observed(&mut sampler, &logits, &legal, &params);
    assert_eq!(got[1], 1.0);
}
