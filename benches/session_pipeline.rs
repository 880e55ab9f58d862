use auris_core::audio::{codec, quality};
use auris_core::speaker::embedding;
use criterion::{criterion_group, criterion_main, Criterion};

fn two_second_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..32_000 {
            let t = i as f32 / 16_000.0;
            let sample = (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.7;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn bench_per_window_path(c: &mut Criterion) {
    let bytes = two_second_wav();

    c.bench_function("codec_decode_and_resample", |b| {
        b.iter(|| codec::decode_and_resample(&bytes, Some("clip.wav")).unwrap())
    });

    let (window, _metadata) = codec::decode_and_resample(&bytes, Some("clip.wav")).unwrap();

    c.bench_function("quality_assess", |b| {
        b.iter(|| quality::assess(&window))
    });

    c.bench_function("embedding_extract", |b| {
        b.iter(|| embedding::extract(&window.samples, window.sample_rate_hz))
    });
}

criterion_group!(benches, bench_per_window_path);
criterion_main!(benches);
