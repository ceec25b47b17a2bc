//! Sampling policy: temperature, masking, nucleus and top-k
//!
//! Order of operations for one draw:
//!
//! 1. divide logits by the temperature and softmax over the full vocabulary
//! 2. zero the probability of every symbol outside the legal set
//! 3. keep the smallest highest-probability prefix reaching `top_p`
//! 4. keep at most `top_k` of those
//! 5. renormalize and draw
//!
//! Step 3 accumulates the masked probabilities without renormalizing them
//! first, so when the legal mass is below `top_p` every legal candidate stays.

use crate::{grammar::Symbol, mask::LegalSet, CoreError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Knobs for one draw
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Logit divisor; must be positive
    pub temperature: f32,

    /// Nucleus threshold in (0, 1]
    pub top_p: f32,

    /// Maximum number of candidates kept; at least 1
    pub top_k: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.98,
            top_k: 20,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(CoreError::invalid_parameter(
                "TEMPERATURE_NOT_POSITIVE",
                "Temperature must be a positive finite number",
                "Sampling parameter validation",
                "Use 1.0 for the model's own distribution, lower values for sharper output",
                "temperature",
                self.temperature.to_string(),
                "(0, inf)",
            ));
        }

        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(CoreError::invalid_parameter(
                "TOP_P_OUT_OF_RANGE",
                "top_p must lie in (0, 1]",
                "Sampling parameter validation",
                "Use 1.0 to disable nucleus filtering",
                "top_p",
                self.top_p.to_string(),
                "(0, 1]",
            ));
        }

        if self.top_k == 0 {
            return Err(CoreError::invalid_parameter(
                "TOP_K_ZERO",
                "top_k must keep at least one candidate",
                "Sampling parameter validation",
                "Use 1 for greedy decoding or the vocabulary size to disable truncation",
                "top_k",
                "0",
                "[1, vocab_size]",
            ));
        }

        Ok(())
    }
}

/// Draws symbols from masked distributions
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Seeded for reproducible runs, otherwise from OS entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draw one legal symbol from `logits`
    pub fn sample(
        &mut self,
        logits: &[f32],
        legal: &LegalSet,
        params: &SamplingParams,
    ) -> Result<Symbol> {
        params.validate()?;

        if legal.upper_bound() as usize > logits.len() {
            return Err(CoreError::policy(
                "MASK_OUTSIDE_DISTRIBUTION",
                format!(
                    "Legal symbol {} lies outside a distribution of {} entries",
                    legal.upper_bound() - 1,
                    logits.len()
                ),
                "Sampling sub-token",
                "Make the oracle score the registry's full vocabulary",
            ));
        }

        let probs = softmax_scaled(logits, params.temperature);
        let candidates = nucleus(&probs, legal, params.top_p, params.top_k);
        if candidates.is_empty() {
            return Err(CoreError::policy(
                "EMPTY_LEGAL_MASS",
                format!(
                    "None of the {} legal symbols has nonzero probability",
                    legal.len()
                ),
                "Sampling sub-token",
                "The oracle and the grammar disagree; check the registry the oracle was built for",
            ));
        }

        let weights = WeightedIndex::new(candidates.iter().map(|&(_, p)| p)).map_err(|e| {
            CoreError::policy(
                "INVALID_WEIGHTS",
                format!("Cannot draw from candidate weights: {}", e),
                "Sampling sub-token",
                "The oracle produced non-finite scores",
            )
        })?;

        Ok(candidates[weights.sample(&mut self.rng)].0)
    }
}

/// Softmax of `logits / temperature`.
///
/// NaN scores get zero probability. If nothing has positive mass the result
/// is all zeros.
pub fn softmax_scaled(logits: &[f32], temperature: f32) -> Vec<f32> {
    let clean = |x: f32| if x.is_nan() { f32::NEG_INFINITY } else { x.min(f32::MAX) };

    let max_logit = logits
        .iter()
        .map(|&x| clean(x))
        .fold(f32::NEG_INFINITY, f32::max);
    if max_logit == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }

    let exp_logits: Vec<f32> = logits
        .iter()
        .map(|&x| ((clean(x) - max_logit) / temperature).exp())
        .collect();
    let sum_exp: f32 = exp_logits.iter().sum();

    if sum_exp > 0.0 && sum_exp.is_finite() {
        exp_logits.iter().map(|&x| x / sum_exp).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// Legal candidates surviving nucleus and top-k filtering, highest first.
///
/// Ties keep ascending symbol order.
pub fn nucleus(probs: &[f32], legal: &LegalSet, top_p: f32, top_k: usize) -> Vec<(Symbol, f32)> {
    let mut candidates: Vec<(Symbol, f32)> = legal
        .iter()
        .filter_map(|symbol| probs.get(symbol as usize).map(|&p| (symbol, p)))
        .filter(|&(_, p)| p > 0.0)
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut cumulative = 0.0f32;
    let mut keep = candidates.len();
    for (i, &(_, p)) in candidates.iter().enumerate() {
        cumulative += p;
        if cumulative >= top_p {
            keep = i + 1;
            break;
        }
    }

    candidates.truncate(keep.min(top_k));
    candidates
}
