use criterion::{black_box, criterion_group, criterion_main, Criterion};

use spectroprint::analysis::{apply_tone_mapping, compute_spectrogram, plan_transform, ToneParams};
use spectroprint::audio::sine_wave;
use spectroprint::OverlapPreset;

fn stft_benchmark(c: &mut Criterion) {
    let sample_rate = 48000;
    let signal = sine_wave(sample_rate as usize / 2, sample_rate, 1000.0, 0.5);
    let plan = plan_transform(sample_rate, 150.0, OverlapPreset::Medium, None);

    c.bench_function("stft_half_second_48k", |b| {
        b.iter(|| compute_spectrogram(black_box(&signal), sample_rate, plan, 65.0, 16640.0))
    });

    let params = ToneParams {
        dynamic_range_db: 60.0,
        gamma: 0.8,
        contrast: 1.9,
        log_amplitude: true,
        dithering: true,
        dither_seed: Some(1),
    };
    c.bench_function("tone_map_half_second_48k", |b| {
        b.iter_batched(
            || compute_spectrogram(&signal, sample_rate, plan, 65.0, 16640.0).ok(),
            |matrix| {
                if let Some(mut matrix) = matrix {
                    apply_tone_mapping(&mut matrix, params);
                }
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, stft_benchmark);
criterion_main!(benches);
