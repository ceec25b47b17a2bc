use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use midigen_core::prelude::*;
use midigen_core::sampling::{nucleus, softmax_scaled};

fn sample_rows(registry: &Registry<MidiEvent>, count: usize) -> Vec<Row> {
    let codec = EventCodec::new(registry);
    (0..count as u32)
        .map(|i| {
            codec
                .encode(
                    MidiEvent::Note,
                    &[i % 4, i % 16, i % 3, 4 + i % 32, i % 9, 48 + i % 24, 64 + i % 40],
                )
                .unwrap()
        })
        .collect()
}

/// Benchmark encode and decode of single rows
fn bench_codec(c: &mut Criterion) {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let codec = EventCodec::new(&registry);
    let values = [1, 4, 0, 8, 0, 60, 100];
    let row = codec.encode(MidiEvent::Note, &values).unwrap();

    let mut group = c.benchmark_group("codec");
    group.bench_function("encode_note", |b| {
        b.iter(|| codec.encode(black_box(MidiEvent::Note), black_box(&values)))
    });
    group.bench_function("decode_note", |b| b.iter(|| codec.decode(black_box(&row))));
    group.finish();
}

/// Benchmark one masked draw over the full vocabulary
fn bench_sampling(c: &mut Criterion) {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let policy = MaskPolicy::new(&registry, true);
    let logits: Vec<f32> = (0..registry.vocab_size())
        .map(|i| ((i * 7919) % 113) as f32 / 17.0)
        .collect();

    let mut group = c.benchmark_group("sampling");
    for (name, slot) in [
        ("event_type", Slot::EventType),
        (
            "duration",
            Slot::Param {
                event: MidiEvent::Note,
                position: 4,
            },
        ),
    ] {
        let legal = policy.legal_symbols(slot).unwrap();
        group.bench_with_input(BenchmarkId::new("softmax_nucleus", name), &legal, |b, legal| {
            b.iter(|| {
                let probs = softmax_scaled(black_box(&logits), 1.0);
                nucleus(&probs, legal, 0.98, 20)
            })
        });

        let mut sampler = Sampler::new(Some(1));
        let params = SamplingParams::default();
        group.bench_with_input(BenchmarkId::new("sample", name), &legal, |b, legal| {
            b.iter(|| sampler.sample(black_box(&logits), legal, &params))
        });
    }
    group.finish();
}

/// Benchmark whole runs and finalization against the histogram oracle
fn bench_generation(c: &mut Criterion) {
    let registry = Registry::<MidiEvent>::new().unwrap();
    let oracle = HistogramOracle::new(registry.vocab_size());

    let mut group = c.benchmark_group("generation");
    group.sample_size(20);
    for rows in [16usize, 64] {
        let config = GenerationConfig {
            max_rows: rows,
            seed: Some(7),
            ..Default::default()
        };
        let prompt = sample_rows(&registry, 32);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("histogram_run", rows), &config, |b, config| {
            b.iter(|| {
                let mut generator =
                    Generator::with_prompt(&registry, &oracle, config, prompt.clone()).unwrap();
                let _ = generator.run();
                generator.into_rows()
            })
        });
    }

    let rows = sample_rows(&registry, 2048);
    let finalizer = StreamFinalizer::new(&registry);
    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("finalize_2048", |b| b.iter(|| finalizer.finalize(black_box(&rows))));
    group.finish();
}

criterion_group!(benches, bench_codec, bench_sampling, bench_generation);
criterion_main!(benches);
