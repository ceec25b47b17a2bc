//! Event codec
//!
//! Converts structured events to fixed-width rows of symbols and back, and
//! converts absolute-time event lists to and from the delta-time form rows
//! carry.

use crate::{
    grammar::{EventSchema, ParamSchema, Registry, Symbol, BOS_ID, EOS_ID, PAD_ID},
    CoreError, Result,
};
use serde::{Deserialize, Serialize};

/// One event (or structural marker) as a left-aligned run of symbols.
///
/// Rows built by the codec are padded to the registry's row width. Rows
/// coming from outside may have any length; decoding only looks at as many
/// positions as the event type needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Vec<Symbol>);

impl Row {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }

    /// A structural row: `symbol` followed by padding
    pub fn marker(symbol: Symbol, width: usize) -> Self {
        let mut symbols = vec![PAD_ID; width.max(1)];
        symbols[0] = symbol;
        Self(symbols)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.0
    }

    /// Symbol at position 0
    pub fn head(&self) -> Option<Symbol> {
        self.0.first().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.0
    }

    /// Truncate or pad to exactly `width` symbols
    pub fn normalized(mut self, width: usize) -> Self {
        self.0.resize(width, PAD_ID);
        self
    }
}

impl From<Vec<Symbol>> for Row {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }
}

/// A decoded event: type plus parameter values in native ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<E> {
    pub kind: E,
    pub values: Vec<u32>,
}

impl<E: EventSchema> Event<E> {
    pub fn new(kind: E, values: Vec<u32>) -> Self {
        Self { kind, values }
    }

    /// Value of a named parameter, if this event type carries it
    pub fn value(&self, param: E::Param) -> Option<u32> {
        let idx = self.kind.params().iter().position(|&p| p == param)?;
        self.values.get(idx).copied()
    }

    /// Overwrite a named parameter; returns false if the event does not carry it
    pub fn set_value(&mut self, param: E::Param, value: u32) -> bool {
        let Some(idx) = self.kind.params().iter().position(|&p| p == param) else {
            return false;
        };
        match self.values.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// An event placed at an absolute time, in sub-ticks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent<E> {
    pub time: u64,
    #[serde(flatten)]
    pub event: Event<E>,
}

/// Running time state accumulated across decoded events.
///
/// Owned by whoever walks the row sequence; the codec never keeps one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeCursor {
    coarse: u64,
    now: u64,
}

impl TimeCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event's delta into the running total and return its absolute time
    pub fn advance<E: EventSchema>(&mut self, event: &Event<E>) -> u64 {
        let timing = E::timing();
        self.coarse += event.value(timing.delta).unwrap_or(0) as u64;

        let resolution = timing
            .sub_tick
            .map(|param| param.cardinality() as u64)
            .unwrap_or(1);
        let sub_tick = timing
            .sub_tick
            .and_then(|param| event.value(param))
            .unwrap_or(0) as u64;

        self.now = self.coarse * resolution + sub_tick;
        self.now
    }

    /// Absolute time of the most recent event
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Accumulated delta units
    pub fn coarse(&self) -> u64 {
        self.coarse
    }
}

/// Encoder/decoder bound to one registry
#[derive(Debug, Clone, Copy)]
pub struct EventCodec<'r, E: EventSchema> {
    registry: &'r Registry<E>,
}

impl<'r, E: EventSchema> EventCodec<'r, E> {
    pub fn new(registry: &'r Registry<E>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry<E> {
        self.registry
    }

    /// Encode an event type and its ordered values into a padded row
    pub fn encode(&self, kind: E, values: &[u32]) -> Result<Row> {
        let params = kind.params();
        if values.len() != params.len() {
            return Err(CoreError::domain(
                "EVENT_ARITY_MISMATCH",
                format!(
                    "Event '{}' takes {} values, got {}",
                    kind.name(),
                    params.len(),
                    values.len()
                ),
                "Encoding event",
                format!(
                    "Supply values for: {}",
                    params.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let mut symbols = Vec::with_capacity(self.registry.row_width());
        symbols.push(self.registry.event_symbol(kind));
        for (&param, &value) in params.iter().zip(values) {
            symbols.push(self.registry.param_symbol(param, value)?);
        }
        symbols.resize(self.registry.row_width(), PAD_ID);

        Ok(Row(symbols))
    }

    pub fn encode_event(&self, event: &Event<E>) -> Result<Row> {
        self.encode(event.kind, &event.values)
    }

    /// Decode a row.
    ///
    /// Returns `None` for structural rows, unknown heads, rows too short for
    /// their event type, and rows whose parameter symbols fall outside the
    /// declared ranges. Positions past the event's arity are ignored.
    pub fn decode(&self, row: &Row) -> Option<Event<E>> {
        let symbols = row.symbols();
        let kind = self.registry.event_of(*symbols.first()?)?;
        let params = kind.params();
        if symbols.len() <= params.len() {
            return None;
        }

        let values = params
            .iter()
            .zip(&symbols[1..])
            .map(|(&param, &symbol)| self.registry.value_range(param)?.value_of(symbol))
            .collect::<Option<Vec<_>>>()?;

        Some(Event { kind, values })
    }

    pub fn begin_row(&self) -> Row {
        Row::marker(BOS_ID, self.registry.row_width())
    }

    pub fn end_row(&self) -> Row {
        Row::marker(EOS_ID, self.registry.row_width())
    }

    /// Absolute time of `event` given the caller's running state
    pub fn absolute_time(&self, event: &Event<E>, state: &mut TimeCursor) -> u64 {
        state.advance(event)
    }

    /// Encode absolute-time events into delta-time rows.
    ///
    /// Events are ordered by time (stable for ties). The timing parameters
    /// of each event are overwritten from its absolute time.
    pub fn encode_timeline(&self, events: &[TimedEvent<E>]) -> Result<Vec<Row>> {
        let mut ordered: Vec<&TimedEvent<E>> = events.iter().collect();
        ordered.sort_by_key(|timed| timed.time);

        let mut last_coarse = 0u64;
        ordered
            .into_iter()
            .map(|timed| self.encode_at(timed, &mut last_coarse))
            .collect()
    }

    /// Encode one absolute-time event as a delta from `last_coarse`.
    ///
    /// `last_coarse` moves to the event's coarse time only when a row is
    /// produced, so a rejected event leaves the next delta measured from the
    /// last encoded one.
    pub fn encode_at(&self, timed: &TimedEvent<E>, last_coarse: &mut u64) -> Result<Row> {
        let timing = self.registry.timing();
        let resolution = self.registry.sub_tick_resolution();
        let coarse = timed.time / resolution;
        let sub_tick = timed.time % resolution;

        let delta = coarse.checked_sub(*last_coarse).ok_or_else(|| {
            CoreError::domain(
                "TIMELINE_OUT_OF_ORDER",
                format!(
                    "Event '{}' at time {} precedes the previous event",
                    timed.event.kind.name(),
                    timed.time
                ),
                "Encoding event timeline",
                "Sort events by time before encoding",
            )
        })?;
        let delta = u32::try_from(delta).map_err(|_| {
            CoreError::domain_value(
                "PARAM_OUT_OF_RANGE",
                format!("Time delta {} does not fit a parameter value", delta),
                "Encoding event timeline",
                "Insert intermediate events to shorten long gaps",
                timing.delta.name(),
                delta,
            )
        })?;

        let mut event = timed.event.clone();
        let carries_delta = event.set_value(timing.delta, delta);
        let carries_sub_tick = match timing.sub_tick {
            Some(param) => event.set_value(param, sub_tick as u32),
            None => false,
        };

        if (!carries_delta && delta != 0) || (!carries_sub_tick && sub_tick != 0) {
            return Err(CoreError::domain(
                "EVENT_CANNOT_CARRY_TIME",
                format!(
                    "Event '{}' at time {} has no timing parameter to carry the offset",
                    event.kind.name(),
                    timed.time
                ),
                "Encoding event timeline",
                "Place untimed events at the time of the preceding event",
            ));
        }

        let row = self.encode_event(&event)?;
        *last_coarse = coarse;
        Ok(row)
    }

    /// Decode rows into absolute-time events, skipping undecodable rows
    pub fn decode_timeline(&self, rows: &[Row]) -> Vec<TimedEvent<E>> {
        let mut clock = TimeCursor::new();
        rows.iter()
            .filter_map(|row| self.decode(row))
            .map(|event| TimedEvent {
                time: clock.advance(&event),
                event,
            })
            .collect()
    }
}
