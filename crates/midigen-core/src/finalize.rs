//! Stream finalizer
//!
//! Turns any prefix of a row sequence back into timed events. It reads the
//! rows and nothing else, so it can run on a finished run, a cancelled one,
//! or a run that stopped on an oracle error.

use crate::{
    codec::{Event, EventCodec, Row, TimeCursor, TimedEvent},
    grammar::{EventSchema, Registry, SymbolKind},
};
use tracing::{debug, warn};

/// Result of finalizing a row sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized<E> {
    pub events: Vec<TimedEvent<E>>,
    /// Begin, end and padding rows
    pub structural: usize,
    /// Rows that were neither structural nor decodable
    pub skipped: usize,
}

/// Decodes committed rows into absolute-time events
#[derive(Debug, Clone, Copy)]
pub struct StreamFinalizer<'r, E: EventSchema> {
    codec: EventCodec<'r, E>,
}

impl<'r, E: EventSchema> StreamFinalizer<'r, E> {
    pub fn new(registry: &'r Registry<E>) -> Self {
        Self {
            codec: EventCodec::new(registry),
        }
    }

    /// Decodable events of `rows` with their absolute times, in row order
    pub fn finalize(&self, rows: &[Row]) -> Vec<TimedEvent<E>> {
        self.finalize_report(rows).events
    }

    /// Events without times
    pub fn events(&self, rows: &[Row]) -> Vec<Event<E>> {
        self.finalize(rows).into_iter().map(|timed| timed.event).collect()
    }

    /// Finalize and count what was left out
    pub fn finalize_report(&self, rows: &[Row]) -> Finalized<E> {
        let registry = self.codec.registry();
        let mut clock = TimeCursor::new();
        let mut report = Finalized {
            events: Vec::with_capacity(rows.len()),
            structural: 0,
            skipped: 0,
        };

        for (index, row) in rows.iter().enumerate() {
            if let Some(event) = self.codec.decode(row) {
                let time = clock.advance(&event);
                report.events.push(TimedEvent { time, event });
                continue;
            }

            match row.head().map(|head| registry.describe(head)) {
                Some(SymbolKind::Pad | SymbolKind::Begin | SymbolKind::End) => {
                    report.structural += 1
                }
                _ => {
                    report.skipped += 1;
                    debug!("Skipping undecodable row {}: {:?}", index, row.symbols());
                }
            }
        }

        if report.skipped > 0 {
            warn!(
                "Skipped {} undecodable rows out of {}",
                report.skipped,
                rows.len()
            );
        }

        report
    }
}
