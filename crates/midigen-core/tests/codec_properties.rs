//! Property-based tests for the event codec and stream finalizer

use midigen_core::grammar::{EventSchema, ParamSchema};
use midigen_core::prelude::*;
use proptest::prelude::*;

prop_compose! {
    fn arb_event()(
        kind in prop::sample::select(MidiEvent::ALL.to_vec()),
        seeds in prop::collection::vec(any::<u32>(), 7),
    ) -> Event<MidiEvent> {
        let values = kind
            .params()
            .iter()
            .zip(seeds)
            .map(|(param, seed)| seed % param.cardinality())
            .collect();
        Event::new(kind, values)
    }
}

prop_compose! {
    /// Encoded events mixed with structural and junk rows
    fn arb_stream()(
        items in prop::collection::vec((arb_event(), 0u8..10, any::<u32>()), 0..40),
    ) -> Vec<Row> {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let codec = EventCodec::new(&registry);
        items
            .into_iter()
            .map(|(event, pick, junk)| match pick {
                0 => codec.begin_row(),
                1 => codec.end_row(),
                2 => Row::new(vec![junk % 4000, junk % 7]),
                _ => codec.encode_event(&event).unwrap(),
            })
            .collect()
    }
}

proptest! {
    #[test]
    fn test_encode_decode_round_trip(event in arb_event()) {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let codec = EventCodec::new(&registry);

        let row = codec.encode_event(&event).unwrap();
        prop_assert_eq!(row.len(), registry.row_width());
        prop_assert_eq!(codec.decode(&row), Some(event));
    }

    #[test]
    fn test_out_of_range_value_rejected(event in arb_event(), slot in 0usize..7, excess in 0u32..1000) {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let codec = EventCodec::new(&registry);
        let params = event.kind.params();
        let slot = slot % params.len();

        let mut values = event.values.clone();
        values[slot] = params[slot].cardinality() + excess;
        let err = codec.encode(event.kind, &values).unwrap_err();
        prop_assert_eq!(err.code(), "PARAM_OUT_OF_RANGE");
    }

    #[test]
    fn test_finalize_any_prefix(rows in arb_stream(), cut in 0usize..=40) {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let codec = EventCodec::new(&registry);
        let finalizer = StreamFinalizer::new(&registry);

        let k = cut.min(rows.len());
        let full = finalizer.finalize(&rows);
        let prefix = finalizer.finalize(&rows[..k]);

        let decodable = rows[..k].iter().filter(|row| codec.decode(row).is_some()).count();
        prop_assert_eq!(prefix.len(), decodable);
        prop_assert_eq!(&full[..prefix.len()], prefix.as_slice());
        prop_assert!(prefix.windows(2).all(|pair| pair[0].time <= pair[1].time));
    }

    #[test]
    fn test_timeline_round_trip(deltas in prop::collection::vec((0u64..127, 0u64..16), 1..30)) {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let codec = EventCodec::new(&registry);

        let mut beat = 0u64;
        let timed: Vec<TimedEvent<MidiEvent>> = deltas
            .iter()
            .map(|&(delta, sub_tick)| {
                beat += delta;
                TimedEvent {
                    time: beat * 16 + sub_tick,
                    event: Event::new(MidiEvent::SetTempo, vec![0, 0, 0, 120]),
                }
            })
            .collect();

        let rows = codec.encode_timeline(&timed).unwrap();
        let decoded = codec.decode_timeline(&rows);
        let times: Vec<u64> = decoded.iter().map(|e| e.time).collect();
        let mut expected: Vec<u64> = timed.iter().map(|e| e.time).collect();
        expected.sort_unstable();
        prop_assert_eq!(times, expected);
    }
}
