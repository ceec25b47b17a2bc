//! Vocabulary and grammar registry
//!
//! The registry assigns every event type and every (parameter, value) pair a
//! symbol in one flat vocabulary. Event types and parameters are closed
//! enumerations described by [`EventSchema`] and [`ParamSchema`]; the registry
//! is built once from a schema and then only read.
//!
//! Layout of the vocabulary:
//!
//! ```text
//! 0 pad | 1 begin | 2 end | event types ... | param 0 values | param 1 values | ...
//! ```

pub mod midi;

use crate::{CoreError, Result};
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Range;

/// An index into the flat vocabulary
pub type Symbol = u32;

/// Padding symbol filling a row past its occupied length
pub const PAD_ID: Symbol = 0;
/// Begin-of-stream marker
pub const BOS_ID: Symbol = 1;
/// End-of-stream marker
pub const EOS_ID: Symbol = 2;

const STRUCTURAL_SYMBOLS: Symbol = 3;

/// A closed set of event parameters with declared value counts.
///
/// `ALL` must list every variant exactly once; its order fixes the order in
/// which parameter ranges are allocated.
pub trait ParamSchema: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    /// Stable name used in serialized output
    fn name(self) -> &'static str;

    /// Number of legal values; values are `0..cardinality`
    fn cardinality(self) -> u32;
}

/// A closed set of event types, each with a fixed parameter list.
pub trait EventSchema: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    type Param: ParamSchema;

    const ALL: &'static [Self];

    /// Stable name used in serialized output
    fn name(self) -> &'static str;

    /// Parameters this event carries, in row order
    fn params(self) -> &'static [Self::Param];

    /// Which parameters carry time
    fn timing() -> Timing<Self::Param>;

    /// Whether this event reassigns an instrument.
    ///
    /// Such events are excluded at position 0 when instrument assignment was
    /// fixed by a prompt.
    fn changes_instrument(self) -> bool {
        false
    }

    /// Look up an event type by its name
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|event| event.name() == name)
    }
}

/// Parameters carrying time within every event of a schema.
///
/// Absolute time is `resolution * sum(delta) + sub_tick`, where the resolution
/// is the sub-tick parameter's cardinality (1 when there is none). Events
/// that lack the delta parameter do not advance time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing<P> {
    pub delta: P,
    pub sub_tick: Option<P>,
}

/// The contiguous symbol range assigned to one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamRange {
    pub base: Symbol,
    pub count: u32,
}

impl ParamRange {
    pub fn symbols(&self) -> Range<Symbol> {
        self.base..self.base + self.count
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.symbols().contains(&symbol)
    }

    /// Native value of a raw symbol, if the symbol lies in this range
    pub fn value_of(&self, symbol: Symbol) -> Option<u32> {
        self.contains(symbol).then(|| symbol - self.base)
    }
}

/// What a symbol means under a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind<E: EventSchema> {
    Pad,
    Begin,
    End,
    Event(E),
    Param(E::Param, u32),
    Unknown,
}

/// Immutable symbol assignment for one event schema
#[derive(Debug, Clone)]
pub struct Registry<E: EventSchema> {
    /// Ranges indexed by position in `E::Param::ALL`
    param_ranges: Vec<ParamRange>,
    vocab_size: u32,
    row_width: usize,
    timing: Timing<E::Param>,
    _schema: PhantomData<E>,
}

impl<E: EventSchema> Registry<E> {
    /// Build the registry, validating the schema
    pub fn new() -> Result<Self> {
        if E::ALL.is_empty() {
            return Err(CoreError::configuration(
                "SCHEMA_NO_EVENTS",
                "Event schema declares no event types",
                "Building grammar registry",
                "List every event variant in EventSchema::ALL",
            ));
        }

        let mut next = STRUCTURAL_SYMBOLS + E::ALL.len() as Symbol;
        let mut param_ranges = Vec::with_capacity(E::Param::ALL.len());
        for &param in E::Param::ALL {
            let count = param.cardinality();
            if count == 0 {
                return Err(CoreError::configuration(
                    "SCHEMA_EMPTY_PARAM",
                    format!("Parameter '{}' has no legal values", param.name()),
                    "Building grammar registry",
                    "Give every parameter a cardinality of at least 1",
                ));
            }
            param_ranges.push(ParamRange { base: next, count });
            next = next.checked_add(count).ok_or_else(|| {
                CoreError::configuration(
                    "SCHEMA_VOCAB_OVERFLOW",
                    "Vocabulary does not fit in 32-bit symbols",
                    "Building grammar registry",
                    "Reduce parameter cardinalities",
                )
            })?;
        }

        for &event in E::ALL {
            for &param in event.params() {
                if position_of(E::Param::ALL, param).is_none() {
                    return Err(CoreError::configuration(
                        "SCHEMA_UNDECLARED_PARAM",
                        format!(
                            "Event '{}' uses parameter '{}' which has no declared range",
                            event.name(),
                            param.name()
                        ),
                        "Building grammar registry",
                        "Add the parameter to ParamSchema::ALL",
                    ));
                }
            }
        }

        let timing = E::timing();
        let timing_params = std::iter::once(timing.delta).chain(timing.sub_tick);
        for param in timing_params {
            if position_of(E::Param::ALL, param).is_none() {
                return Err(CoreError::configuration(
                    "SCHEMA_UNDECLARED_TIMING",
                    format!("Timing parameter '{}' has no declared range", param.name()),
                    "Building grammar registry",
                    "Add the timing parameter to ParamSchema::ALL",
                ));
            }
        }

        let row_width = 1 + E::ALL
            .iter()
            .map(|event| event.params().len())
            .max()
            .unwrap_or(0);

        Ok(Self {
            param_ranges,
            vocab_size: next,
            row_width,
            timing,
            _schema: PhantomData,
        })
    }

    /// All event types, in symbol order
    pub fn event_types(&self) -> &'static [E] {
        E::ALL
    }

    /// Ordered parameter list of an event type
    pub fn parameters_of(&self, event: E) -> &'static [E::Param] {
        event.params()
    }

    /// Symbol range assigned to a parameter
    pub fn value_range(&self, param: E::Param) -> Option<ParamRange> {
        position_of(E::Param::ALL, param).map(|idx| self.param_ranges[idx])
    }

    /// Symbol of an event type.
    ///
    /// `E::ALL` must list `event`; a schema that leaves a variant out is a
    /// programming error caught by a debug assertion.
    pub fn event_symbol(&self, event: E) -> Symbol {
        let idx = position_of(E::ALL, event);
        debug_assert!(
            idx.is_some(),
            "event type '{}' is missing from EventSchema::ALL",
            event.name()
        );
        STRUCTURAL_SYMBOLS + idx.unwrap_or(0) as Symbol
    }

    /// Symbol of a parameter value
    pub fn param_symbol(&self, param: E::Param, value: u32) -> Result<Symbol> {
        let range = self.value_range(param).ok_or_else(|| {
            CoreError::domain(
                "PARAM_UNDECLARED",
                format!("Parameter '{}' has no declared range", param.name()),
                "Looking up parameter symbol",
                "Add the parameter to ParamSchema::ALL",
            )
        })?;

        if value >= range.count {
            return Err(CoreError::domain_value(
                "PARAM_OUT_OF_RANGE",
                format!(
                    "Value {} is outside the range of '{}' (0..{})",
                    value,
                    param.name(),
                    range.count
                ),
                "Looking up parameter symbol",
                format!("Use a value below {}", range.count),
                param.name(),
                value as u64,
            ));
        }

        Ok(range.base + value)
    }

    /// Event type a symbol stands for, if any
    pub fn event_of(&self, symbol: Symbol) -> Option<E> {
        let idx = symbol.checked_sub(STRUCTURAL_SYMBOLS)? as usize;
        E::ALL.get(idx).copied()
    }

    /// Contiguous range holding every event-type symbol
    pub fn event_symbols(&self) -> Range<Symbol> {
        STRUCTURAL_SYMBOLS..STRUCTURAL_SYMBOLS + E::ALL.len() as Symbol
    }

    /// Classify a symbol
    pub fn describe(&self, symbol: Symbol) -> SymbolKind<E> {
        match symbol {
            PAD_ID => SymbolKind::Pad,
            BOS_ID => SymbolKind::Begin,
            EOS_ID => SymbolKind::End,
            _ => {
                if let Some(event) = self.event_of(symbol) {
                    return SymbolKind::Event(event);
                }
                E::Param::ALL
                    .iter()
                    .zip(&self.param_ranges)
                    .find_map(|(&param, range)| {
                        range.value_of(symbol).map(|v| SymbolKind::Param(param, v))
                    })
                    .unwrap_or(SymbolKind::Unknown)
            }
        }
    }

    /// Total number of symbols, structural ones included
    pub fn vocab_size(&self) -> usize {
        self.vocab_size as usize
    }

    /// Fixed row width: one event symbol plus the longest parameter list
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn timing(&self) -> Timing<E::Param> {
        self.timing
    }

    /// Sub-ticks per unit of the delta parameter
    pub fn sub_tick_resolution(&self) -> u64 {
        self.timing
            .sub_tick
            .map(|param| param.cardinality() as u64)
            .unwrap_or(1)
    }

    pub fn pad_id(&self) -> Symbol {
        PAD_ID
    }

    pub fn bos_id(&self) -> Symbol {
        BOS_ID
    }

    pub fn eos_id(&self) -> Symbol {
        EOS_ID
    }
}

fn position_of<T: PartialEq + Copy>(all: &[T], item: T) -> Option<usize> {
    all.iter().position(|&candidate| candidate == item)
}
