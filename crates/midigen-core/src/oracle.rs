//! Scoring oracle seam
//!
//! The decoder never computes scores itself. Once per row it asks the
//! oracle to scan the committed history, then once per sub-token it asks for
//! logits over the whole vocabulary given the symbols sampled so far in the
//! row. Both calls must be deterministic for a fixed oracle state.

use crate::{codec::Row, grammar::Symbol};
use std::collections::HashMap;

/// External scorer supplying logits for the next symbol
pub trait ScoringOracle {
    /// State produced by one history scan and reused for every sub-token of a row
    type Context;

    /// Scan the full committed history
    fn score_history(&self, rows: &[Row]) -> anyhow::Result<Self::Context>;

    /// Logits for the next symbol, given the symbols already chosen in this row
    fn extend(&self, context: &Self::Context, partial: &[Symbol]) -> anyhow::Result<Vec<f32>>;
}

impl<O: ScoringOracle + ?Sized> ScoringOracle for &O {
    type Context = O::Context;

    fn score_history(&self, rows: &[Row]) -> anyhow::Result<Self::Context> {
        (**self).score_history(rows)
    }

    fn extend(&self, context: &Self::Context, partial: &[Symbol]) -> anyhow::Result<Vec<f32>> {
        (**self).extend(context, partial)
    }
}

/// Model-free oracle scoring symbols by how often they appear in the history.
///
/// Position 0 is scored by the frequency of each row head; position `i` of a
/// row headed by `h` by the frequency of each symbol at position `i` in
/// earlier rows headed by `h`. Logits are `ln(count + smoothing)`, so
/// contexts never seen score uniformly.
#[derive(Debug, Clone)]
pub struct HistogramOracle {
    vocab_size: usize,
    smoothing: f32,
}

/// Symbol counts keyed by (row head, position)
#[derive(Debug, Clone, Default)]
pub struct HistogramContext {
    heads: HashMap<Symbol, u32>,
    params: HashMap<(Symbol, usize), HashMap<Symbol, u32>>,
}

impl HistogramOracle {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            smoothing: 1.0,
        }
    }

    /// Pseudo-count added to every symbol; smaller values follow the history more closely
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.max(f32::MIN_POSITIVE);
        self
    }

    fn logits_from(&self, counts: Option<&HashMap<Symbol, u32>>) -> Vec<f32> {
        let floor = self.smoothing.ln();
        let mut logits = vec![floor; self.vocab_size];
        if let Some(counts) = counts {
            for (&symbol, &count) in counts {
                if let Some(slot) = logits.get_mut(symbol as usize) {
                    *slot = (count as f32 + self.smoothing).ln();
                }
            }
        }
        logits
    }
}

impl ScoringOracle for HistogramOracle {
    type Context = HistogramContext;

    fn score_history(&self, rows: &[Row]) -> anyhow::Result<HistogramContext> {
        let mut context = HistogramContext::default();
        for row in rows {
            let Some((&head, rest)) = row.symbols().split_first() else {
                continue;
            };
            *context.heads.entry(head).or_default() += 1;
            for (offset, &symbol) in rest.iter().enumerate() {
                *context
                    .params
                    .entry((head, offset + 1))
                    .or_default()
                    .entry(symbol)
                    .or_default() += 1;
            }
        }
        Ok(context)
    }

    fn extend(&self, context: &HistogramContext, partial: &[Symbol]) -> anyhow::Result<Vec<f32>> {
        let logits = match partial.first() {
            None => self.logits_from(Some(&context.heads)),
            Some(&head) => self.logits_from(context.params.get(&(head, partial.len()))),
        };
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_is_uniform() {
        let oracle = HistogramOracle::new(8);
        let context = oracle.score_history(&[]).unwrap();
        let logits = oracle.extend(&context, &[]).unwrap();
        assert_eq!(logits.len(), 8);
        assert!(logits.iter().all(|&l| l == logits[0]));
    }

    #[test]
    fn test_counts_follow_history() {
        let oracle = HistogramOracle::new(10);
        let rows = vec![
            Row::new(vec![3, 7, 0]),
            Row::new(vec![3, 8, 0]),
            Row::new(vec![3, 7, 0]),
            Row::new(vec![4, 9, 0]),
        ];
        let context = oracle.score_history(&rows).unwrap();

        let heads = oracle.extend(&context, &[]).unwrap();
        assert!(heads[3] > heads[4]);
        assert!(heads[4] > heads[5]);

        let after_three = oracle.extend(&context, &[3]).unwrap();
        assert!(after_three[7] > after_three[8]);
        assert_eq!(after_three[9], after_three[1]);

        let after_four = oracle.extend(&context, &[4]).unwrap();
        assert!(after_four[9] > after_four[7]);
    }

    #[test]
    fn test_reference_delegates() {
        let oracle = HistogramOracle::new(4);
        let by_ref = &oracle;
        let context = by_ref.score_history(&[Row::new(vec![1, 0])]).unwrap();
        assert_eq!(by_ref.extend(&context, &[]).unwrap().len(), 4);
    }
}
