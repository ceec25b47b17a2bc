//! Score conversion
//!
//! A [`Score`] is the structured side of a MIDI file: ticks per beat plus
//! per-track lists of note, patch, controller and tempo events in absolute
//! ticks. Tokenizing quantizes it onto the sixteenth-of-a-beat grid of the
//! MIDI vocabulary; detokenizing maps rows back at 480 ticks per beat.

use crate::{
    codec::{Event, EventCodec, Row, TimedEvent},
    finalize::StreamFinalizer,
    grammar::{
        midi::{MidiEvent, MidiParam},
        EventSchema, Registry,
    },
    CoreError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Ticks per beat of detokenized scores
pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;

const SUB_TICKS_PER_BEAT: u64 = 16;
const MAX_TRACKS: usize = 128;
const MICROS_PER_MINUTE: u64 = 60_000_000;

/// A parsed MIDI score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub ticks_per_beat: u32,
    pub tracks: Vec<Vec<ScoreEvent>>,
}

/// One score event; times and durations are in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreEvent {
    Note {
        time: u64,
        duration: u64,
        channel: u32,
        pitch: u32,
        velocity: u32,
    },
    PatchChange {
        time: u64,
        channel: u32,
        patch: u32,
    },
    ControlChange {
        time: u64,
        channel: u32,
        controller: u32,
        value: u32,
    },
    SetTempo {
        time: u64,
        /// Microseconds per beat
        tempo: u32,
    },
}

impl ScoreEvent {
    pub fn time(&self) -> u64 {
        match *self {
            ScoreEvent::Note { time, .. }
            | ScoreEvent::PatchChange { time, .. }
            | ScoreEvent::ControlChange { time, .. }
            | ScoreEvent::SetTempo { time, .. } => time,
        }
    }

    pub fn kind(&self) -> MidiEvent {
        match self {
            ScoreEvent::Note { .. } => MidiEvent::Note,
            ScoreEvent::PatchChange { .. } => MidiEvent::PatchChange,
            ScoreEvent::ControlChange { .. } => MidiEvent::ControlChange,
            ScoreEvent::SetTempo { .. } => MidiEvent::SetTempo,
        }
    }
}

impl Score {
    pub fn new(ticks_per_beat: u32) -> Self {
        Self {
            ticks_per_beat,
            tracks: Vec::new(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Vec::len).sum()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| CoreError::io_at(e, path))?;
        let score = serde_json::from_reader(BufReader::new(file))?;
        Ok(score)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| CoreError::io_at(e, path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// An event snapped to the sub-tick grid, before delta encoding
#[derive(Debug, Clone)]
struct Quantized {
    kind: MidiEvent,
    time: u64,
    track: u64,
    /// Values after the timing and track parameters, in row order
    params: Vec<u64>,
}

type EventKey = (MidiEvent, u64, u64, Vec<u64>);

impl Quantized {
    fn new(event: &ScoreEvent, track: u64, ticks_per_beat: u64) -> Self {
        let params = match *event {
            ScoreEvent::Note {
                duration,
                channel,
                pitch,
                velocity,
                ..
            } => vec![
                to_sub_ticks(duration, ticks_per_beat).max(1),
                channel.into(),
                pitch.into(),
                velocity.into(),
            ],
            ScoreEvent::PatchChange { channel, patch, .. } => vec![channel.into(), patch.into()],
            ScoreEvent::ControlChange {
                channel,
                controller,
                value,
                ..
            } => vec![channel.into(), controller.into(), value.into()],
            ScoreEvent::SetTempo { tempo, .. } => {
                vec![MICROS_PER_MINUTE / u64::from(tempo.max(1))]
            }
        };

        Self {
            kind: event.kind(),
            time: to_sub_ticks(event.time(), ticks_per_beat),
            track,
            params,
        }
    }

    /// Events sharing a key collapse into one. Notes are keyed by voice,
    /// everything else by all values except the last.
    fn key(&self) -> EventKey {
        let identity = match self.kind {
            MidiEvent::Note => self.params[1..3].to_vec(),
            _ => self.params[..self.params.len() - 1].to_vec(),
        };
        (self.kind, self.time, self.track, identity)
    }

    fn voice(&self) -> Option<(u64, u64)> {
        (self.kind == MidiEvent::Note).then(|| (self.params[1], self.params[2]))
    }

    /// Row values with the timing parameters left at zero for the codec to fill
    fn into_timed(self) -> TimedEvent<MidiEvent> {
        let values = [0, 0, self.track]
            .into_iter()
            .chain(self.params)
            .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
            .collect();
        TimedEvent {
            time: self.time,
            event: Event::new(self.kind, values),
        }
    }
}

fn to_sub_ticks(ticks: u64, ticks_per_beat: u64) -> u64 {
    ticks
        .saturating_mul(2 * SUB_TICKS_PER_BEAT)
        .saturating_add(ticks_per_beat)
        / (2 * ticks_per_beat)
}

/// De-duplicate one track and cut notes short where the same voice restarts
fn collapse_track(events: impl Iterator<Item = Quantized>) -> Vec<Quantized> {
    let mut slots: Vec<Option<Quantized>> = Vec::new();
    let mut index: HashMap<EventKey, usize> = HashMap::new();
    let mut sounding: HashMap<(u64, u64), usize> = HashMap::new();

    for event in events {
        let voice = event.voice();
        if let Some(previous) = voice.and_then(|v| sounding.get(&v).copied()) {
            if let Some(last) = slots[previous].as_mut() {
                let gap = event.time.saturating_sub(last.time);
                last.params[0] = last.params[0].min(gap);
                if last.params[0] == 0 {
                    index.remove(&last.key());
                    slots[previous] = None;
                }
            }
        }

        let slot = match index.get(&event.key()) {
            Some(&slot) => {
                slots[slot] = Some(event);
                slot
            }
            None => {
                index.insert(event.key(), slots.len());
                slots.push(Some(event));
                slots.len() - 1
            }
        };

        if let Some(voice) = voice {
            sounding.insert(voice, slot);
        }
    }

    slots.into_iter().flatten().collect()
}

/// Convert a score into rows, optionally wrapped in begin/end rows.
///
/// Only the first 128 tracks are read. Events whose values fall outside
/// the vocabulary (a channel above 15, a gap longer than 127 beats) are
/// dropped with a warning.
pub fn tokenize_score(
    registry: &Registry<MidiEvent>,
    score: &Score,
    add_markers: bool,
) -> Result<Vec<Row>> {
    if score.ticks_per_beat == 0 {
        return Err(CoreError::invalid_parameter(
            "SCORE_ZERO_TICKS_PER_BEAT",
            "Score declares zero ticks per beat",
            "Tokenizing score",
            "Use the division from the MIDI file header",
            "ticks_per_beat",
            "0",
            "[1, 2^32)",
        ));
    }

    let ticks_per_beat = u64::from(score.ticks_per_beat);
    if score.tracks.len() > MAX_TRACKS {
        debug!(
            "Ignoring {} tracks beyond the first {}",
            score.tracks.len() - MAX_TRACKS,
            MAX_TRACKS
        );
    }

    let mut events: Vec<Quantized> = score
        .tracks
        .iter()
        .take(MAX_TRACKS)
        .enumerate()
        .flat_map(|(track, events)| {
            let mut quantized: Vec<Quantized> = events
                .iter()
                .map(|event| Quantized::new(event, track as u64, ticks_per_beat))
                .collect();
            quantized.sort_by_key(|event| event.time);
            collapse_track(quantized.into_iter())
        })
        .collect();
    events.sort_by_key(|event| (event.time, event.track));

    let codec = EventCodec::new(registry);
    let mut rows = Vec::with_capacity(events.len() + 2);
    if add_markers {
        rows.push(codec.begin_row());
    }

    let mut last_beat = 0u64;
    for event in events {
        let timed = event.into_timed();
        match codec.encode_at(&timed, &mut last_beat) {
            Ok(row) => rows.push(row),
            Err(err) => warn!(
                "Dropping {} at sub-tick {} [{}]",
                timed.event.kind.name(),
                timed.time,
                err.code()
            ),
        }
    }

    if add_markers {
        rows.push(codec.end_row());
    }

    debug!(
        "Tokenized {} score events into {} rows",
        score.event_count(),
        rows.len()
    );
    Ok(rows)
}

/// Convert rows back into a score at 480 ticks per beat.
///
/// Undecodable rows are skipped. Tracks appear in order of their first
/// event; notes are shortened so they end before the next note on the same
/// channel and pitch, and notes left without duration are removed.
pub fn detokenize(registry: &Registry<MidiEvent>, rows: &[Row]) -> Score {
    let scale = u64::from(DEFAULT_TICKS_PER_BEAT) / SUB_TICKS_PER_BEAT;

    let mut order: Vec<u32> = Vec::new();
    let mut by_track: HashMap<u32, Vec<ScoreEvent>> = HashMap::new();
    for timed in StreamFinalizer::new(registry).finalize(rows) {
        let (track, event) = to_score_event(&timed, scale);
        by_track
            .entry(track)
            .or_insert_with(|| {
                order.push(track);
                Vec::new()
            })
            .push(event);
    }

    let tracks = order
        .into_iter()
        .filter_map(|track| by_track.remove(&track))
        .map(trim_overlaps)
        .collect();

    Score {
        ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
        tracks,
    }
}

fn to_score_event(timed: &TimedEvent<MidiEvent>, scale: u64) -> (u32, ScoreEvent) {
    let event = &timed.event;
    let value = |param| event.value(param).unwrap_or(0);
    let time = timed.time * scale;

    let score_event = match event.kind {
        MidiEvent::Note => ScoreEvent::Note {
            time,
            duration: u64::from(value(MidiParam::Duration)) * scale,
            channel: value(MidiParam::Channel),
            pitch: value(MidiParam::Pitch),
            velocity: value(MidiParam::Velocity),
        },
        MidiEvent::PatchChange => ScoreEvent::PatchChange {
            time,
            channel: value(MidiParam::Channel),
            patch: value(MidiParam::Patch),
        },
        MidiEvent::ControlChange => ScoreEvent::ControlChange {
            time,
            channel: value(MidiParam::Channel),
            controller: value(MidiParam::Controller),
            value: value(MidiParam::Value),
        },
        MidiEvent::SetTempo => ScoreEvent::SetTempo {
            time,
            tempo: (MICROS_PER_MINUTE / u64::from(value(MidiParam::Bpm).max(1))) as u32,
        },
    };

    (value(MidiParam::Track), score_event)
}

fn trim_overlaps(mut track: Vec<ScoreEvent>) -> Vec<ScoreEvent> {
    track.sort_by_key(ScoreEvent::time);

    let mut next_onset: HashMap<(u32, u32), u64> = HashMap::new();
    for event in track.iter_mut().rev() {
        if let ScoreEvent::Note {
            time,
            duration,
            channel,
            pitch,
            ..
        } = event
        {
            if let Some(&onset) = next_onset.get(&(*channel, *pitch)) {
                *duration = (*duration).min(onset.saturating_sub(*time));
            }
            next_onset.insert((*channel, *pitch), *time);
        }
    }

    track.retain(|event| !matches!(event, ScoreEvent::Note { duration: 0, .. }));
    track
}
