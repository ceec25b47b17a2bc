//! Grammar masking
//!
//! At each position of a row under construction only some symbols are
//! legal: an event type (or end-of-stream) at position 0, then the value
//! range of each declared parameter in turn. Sampling from a masked
//! distribution therefore can only produce rows the codec decodes.

use crate::{
    grammar::{EventSchema, ParamSchema, Registry, Symbol, EOS_ID},
    CoreError, Result,
};
use std::ops::Range;

/// A decoding position within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<E> {
    /// Position 0: choose an event type or end the stream
    EventType,
    /// Position `position >= 1`: choose the value of the event's parameter `position - 1`
    Param { event: E, position: usize },
}

impl<E: EventSchema> Slot<E> {
    /// Slot for a raw position and the event chosen at position 0, if any
    pub fn at(position: usize, chosen: Option<E>) -> Result<Self> {
        match (position, chosen) {
            (0, _) => Ok(Slot::EventType),
            (position, Some(event)) => Ok(Slot::Param { event, position }),
            (position, None) => Err(CoreError::policy(
                "MASK_NO_EVENT_TYPE",
                format!("Position {} requested before an event type was chosen", position),
                "Computing legal symbols",
                "Sample position 0 first",
            )),
        }
    }
}

/// Legal symbols at one position, as sorted disjoint ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegalSet {
    ranges: Vec<Range<Symbol>>,
}

impl LegalSet {
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = Range<Symbol>>,
    {
        let mut sorted: Vec<Range<Symbol>> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        sorted.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<Symbol>> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }

        Self { ranges: merged }
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.ranges.iter().any(|r| r.contains(&symbol))
    }

    pub fn len(&self) -> usize {
        self.ranges.iter().map(|r| (r.end - r.start) as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Range<Symbol>] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }

    /// Largest symbol plus one
    pub fn upper_bound(&self) -> Symbol {
        self.ranges.last().map(|r| r.end).unwrap_or(0)
    }

    /// Zero every entry outside the set
    pub fn apply(&self, probs: &mut [f32]) {
        let mut next = 0usize;
        for range in &self.ranges {
            let start = (range.start as usize).min(probs.len());
            probs[next..start].iter_mut().for_each(|p| *p = 0.0);
            next = (range.end as usize).min(probs.len());
        }
        probs[next..].iter_mut().for_each(|p| *p = 0.0);
    }
}

/// Computes legal symbols for each position of a row
#[derive(Debug, Clone, Copy)]
pub struct MaskPolicy<'r, E: EventSchema> {
    registry: &'r Registry<E>,
    allow_patch_change: bool,
}

impl<'r, E: EventSchema> MaskPolicy<'r, E> {
    pub fn new(registry: &'r Registry<E>, allow_patch_change: bool) -> Self {
        Self {
            registry,
            allow_patch_change,
        }
    }

    pub fn allow_patch_change(&self) -> bool {
        self.allow_patch_change
    }

    /// Legal symbols for a slot
    pub fn legal_symbols(&self, slot: Slot<E>) -> Result<LegalSet> {
        match slot {
            Slot::EventType => {
                let events = self
                    .registry
                    .event_types()
                    .iter()
                    .filter(|event| self.allow_patch_change || !event.changes_instrument())
                    .map(|&event| {
                        let symbol = self.registry.event_symbol(event);
                        symbol..symbol + 1
                    });
                Ok(LegalSet::from_ranges(
                    events.chain(std::iter::once(EOS_ID..EOS_ID + 1)),
                ))
            }
            Slot::Param { event, position } => {
                let params = self.registry.parameters_of(event);
                let param = position
                    .checked_sub(1)
                    .and_then(|idx| params.get(idx))
                    .ok_or_else(|| {
                        CoreError::policy(
                            "MASK_POSITION_OUT_OF_BOUNDS",
                            format!(
                                "Event '{}' has {} parameters, position {} requested",
                                event.name(),
                                params.len(),
                                position
                            ),
                            "Computing legal symbols",
                            "Stop sampling once the event's parameter count is reached",
                        )
                    })?;
                let range = self.registry.value_range(*param).ok_or_else(|| {
                    CoreError::policy(
                        "MASK_UNDECLARED_PARAM",
                        format!("Parameter '{}' has no symbol range", param.name()),
                        "Computing legal symbols",
                        "Registry and schema have diverged",
                    )
                })?;
                Ok(LegalSet::from_ranges([range.symbols()]))
            }
        }
    }

    /// Legal symbols for a raw position and the event chosen at position 0
    pub fn legal_at(&self, position: usize, chosen: Option<E>) -> Result<LegalSet> {
        self.legal_symbols(Slot::at(position, chosen)?)
    }
}
