//! Prompt construction
//!
//! Builders for the history a run starts from: a list of instruments
//! assigned to their own tracks and channels, or the opening of an existing
//! score.

use crate::{
    codec::{EventCodec, Row},
    grammar::{midi::MidiEvent, Registry},
    score::{tokenize_score, Score},
    CoreError, Result,
};

/// Channel reserved for percussion
pub const DRUM_CHANNEL: u32 = 9;

const CHANNELS: u32 = 16;

/// General MIDI program names, indexed by patch number
pub const GM_PATCHES: [&str; 128] = [
    "Acoustic Grand",
    "Bright Acoustic",
    "Electric Grand",
    "Honky-Tonk",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clav",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar(nylon)",
    "Acoustic Guitar(steel)",
    "Electric Guitar(jazz)",
    "Electric Guitar(clean)",
    "Electric Guitar(muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar Harmonics",
    "Acoustic Bass",
    "Electric Bass(finger)",
    "Electric Bass(pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "SynthStrings 1",
    "SynthStrings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Voice",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "SynthBrass 1",
    "SynthBrass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Skakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass+lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bagpipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

/// Patch number for a General MIDI program name (case-insensitive) or a
/// decimal patch number
pub fn patch_from_name(name: &str) -> Option<u32> {
    let name = name.trim();
    if let Ok(number) = name.parse::<u32>() {
        return (number < GM_PATCHES.len() as u32).then_some(number);
    }
    GM_PATCHES
        .iter()
        .position(|patch| patch.eq_ignore_ascii_case(name))
        .map(|idx| idx as u32)
}

/// Channel for the `index`-th instrument, skipping the percussion channel
pub fn instrument_channel(index: usize) -> u32 {
    let index = index as u32;
    if index < DRUM_CHANNEL {
        index
    } else {
        index.saturating_add(1)
    }
}

/// A begin row followed by one patch change per instrument at time zero.
///
/// Instrument `i` gets the `i`-th non-percussion channel and a track of the
/// same number, so at most 15 instruments fit. Runs primed this way should disable
/// instrument changes.
pub fn instrument_prompt(registry: &Registry<MidiEvent>, patches: &[u32]) -> Result<Vec<Row>> {
    if patches.len() >= CHANNELS as usize {
        return Err(CoreError::domain_value(
            "PROMPT_TOO_MANY_INSTRUMENTS",
            format!(
                "{} instruments requested, at most {} melodic channels exist",
                patches.len(),
                CHANNELS - 1
            ),
            "Building instrument prompt",
            "Request fewer instruments",
            "channel",
            u64::from(instrument_channel(patches.len() - 1)),
        ));
    }

    let codec = EventCodec::new(registry);
    let mut rows = Vec::with_capacity(patches.len() + 1);
    rows.push(codec.begin_row());
    for (index, &patch) in patches.iter().enumerate() {
        let channel = instrument_channel(index);
        rows.push(codec.encode(MidiEvent::PatchChange, &[0, 0, channel, channel, patch])?);
    }
    Ok(rows)
}

/// The first `max_rows` rows of a tokenized score, begin row included
pub fn score_prompt(registry: &Registry<MidiEvent>, score: &Score, max_rows: usize) -> Result<Vec<Row>> {
    let mut rows = tokenize_score(registry, score, true)?;
    rows.truncate(max_rows);
    Ok(rows)
}
