//! MIDI event vocabulary
//!
//! Times are quantized to sixteenths of a beat: `time1` counts whole beats
//! since the previous event and `time2` the sixteenth within the beat.

use super::{EventSchema, ParamSchema, Timing};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiEvent {
    Note,
    PatchChange,
    ControlChange,
    SetTempo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiParam {
    Time1,
    Time2,
    Duration,
    Track,
    Channel,
    Pitch,
    Velocity,
    Patch,
    Controller,
    Value,
    Bpm,
}

use MidiParam::*;

const NOTE_PARAMS: &[MidiParam] = &[Time1, Time2, Track, Duration, Channel, Pitch, Velocity];
const PATCH_CHANGE_PARAMS: &[MidiParam] = &[Time1, Time2, Track, Channel, Patch];
const CONTROL_CHANGE_PARAMS: &[MidiParam] = &[Time1, Time2, Track, Channel, Controller, Value];
const SET_TEMPO_PARAMS: &[MidiParam] = &[Time1, Time2, Track, Bpm];

impl ParamSchema for MidiParam {
    const ALL: &'static [Self] = &[
        Time1, Time2, Duration, Track, Channel, Pitch, Velocity, Patch, Controller, Value, Bpm,
    ];

    fn name(self) -> &'static str {
        match self {
            Time1 => "time1",
            Time2 => "time2",
            Duration => "duration",
            Track => "track",
            Channel => "channel",
            Pitch => "pitch",
            Velocity => "velocity",
            Patch => "patch",
            Controller => "controller",
            Value => "value",
            Bpm => "bpm",
        }
    }

    fn cardinality(self) -> u32 {
        match self {
            Time1 => 128,
            Time2 => 16,
            Duration => 2048,
            Track => 128,
            Channel => 16,
            Pitch => 128,
            Velocity => 128,
            Patch => 128,
            Controller => 128,
            Value => 128,
            Bpm => 256,
        }
    }
}

impl EventSchema for MidiEvent {
    type Param = MidiParam;

    const ALL: &'static [Self] = &[
        MidiEvent::Note,
        MidiEvent::PatchChange,
        MidiEvent::ControlChange,
        MidiEvent::SetTempo,
    ];

    fn name(self) -> &'static str {
        match self {
            MidiEvent::Note => "note",
            MidiEvent::PatchChange => "patch_change",
            MidiEvent::ControlChange => "control_change",
            MidiEvent::SetTempo => "set_tempo",
        }
    }

    fn params(self) -> &'static [MidiParam] {
        match self {
            MidiEvent::Note => NOTE_PARAMS,
            MidiEvent::PatchChange => PATCH_CHANGE_PARAMS,
            MidiEvent::ControlChange => CONTROL_CHANGE_PARAMS,
            MidiEvent::SetTempo => SET_TEMPO_PARAMS,
        }
    }

    fn timing() -> Timing<MidiParam> {
        Timing {
            delta: Time1,
            sub_tick: Some(Time2),
        }
    }

    fn changes_instrument(self) -> bool {
        self == MidiEvent::PatchChange
    }
}
