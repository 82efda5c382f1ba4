//! Benchmarks for the audio hot paths: sample conversion and timeline mixing

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;

use study_voice::audio::buffer::AudioChunk;
use study_voice::audio::playback::{PlaybackScheduler, Timeline};
use study_voice::codec::{f32_to_pcm16, pcm16_to_f32};

fn bench_conversion(c: &mut Criterion) {
    let samples: Vec<f32> = (0..4096)
        .map(|i| ((i as f32) * 0.01).sin() * 0.8)
        .collect();
    let bytes = f32_to_pcm16(&samples);

    c.bench_function("f32_to_pcm16_4096", |b| {
        b.iter(|| f32_to_pcm16(black_box(&samples)))
    });

    c.bench_function("pcm16_to_f32_4096", |b| {
        b.iter(|| pcm16_to_f32(black_box(&bytes)))
    });
}

fn bench_mixing(c: &mut Criterion) {
    c.bench_function("timeline_mix_512", |b| {
        let chunk = AudioChunk::from_f32(&vec![0.25f32; 24_000], 24_000, 1);
        let mut out = vec![0.0f32; 512];
        b.iter_batched(
            || {
                let timeline = Arc::new(Timeline::new());
                let mut scheduler = PlaybackScheduler::new(timeline.clone());
                scheduler.schedule(&chunk);
                scheduler.schedule(&chunk);
                timeline
            },
            |timeline| timeline.mix_into(black_box(&mut out)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_conversion, bench_mixing);
criterion_main!(benches);
