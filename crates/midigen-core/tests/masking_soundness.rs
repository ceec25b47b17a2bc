//! Every legal symbol decodes in place; every other symbol does not

use midigen_core::grammar::{EventSchema, EOS_ID};
use midigen_core::prelude::*;

#[test]
fn test_parameter_positions_are_exact() {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let codec = EventCodec::new(&registry);
    let policy = MaskPolicy::new(&registry, true);

    for &event in MidiEvent::ALL {
        let zeros = vec![0; event.params().len()];
        let base = codec.encode(event, &zeros).unwrap().into_symbols();

        for position in 1..=event.params().len() {
            let legal = policy.legal_at(position, Some(event)).unwrap();
            for symbol in 0..registry.vocab_size() as Symbol {
                let mut symbols = base.clone();
                symbols[position] = symbol;
                let decodes = codec.decode(&Row::new(symbols)).is_some();
                assert_eq!(
                    decodes,
                    legal.contains(symbol),
                    "{} position {} symbol {}",
                    event.name(),
                    position,
                    symbol
                );
            }
        }
    }
}

#[test]
fn test_event_type_position() {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let codec = EventCodec::new(&registry);

    for allow_patch_change in [true, false] {
        let policy = MaskPolicy::new(&registry, allow_patch_change);
        let legal = policy.legal_symbols(Slot::EventType).unwrap();

        for symbol in 0..registry.vocab_size() as Symbol {
            let expected = match registry.describe(symbol) {
                SymbolKind::End => true,
                SymbolKind::Event(event) => allow_patch_change || !event.changes_instrument(),
                _ => false,
            };
            assert_eq!(legal.contains(symbol), expected, "symbol {}", symbol);

            if let SymbolKind::Event(event) = registry.describe(symbol) {
                let row = codec.encode(event, &vec![0; event.params().len()]).unwrap();
                assert_eq!(codec.decode(&row).map(|e| e.kind), Some(event));
            }
        }
        assert!(legal.contains(EOS_ID));
    }
}

#[test]
fn test_positions_past_arity_are_rejected() {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let policy = MaskPolicy::new(&registry, true);

    for &event in MidiEvent::ALL {
        let err = policy
            .legal_at(event.params().len() + 1, Some(event))
            .unwrap_err();
        assert!(err.is_policy_violation());
    }
}
