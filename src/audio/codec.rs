//! Audio Codec (§4.A): format detection, decode, and resample to canonical PCM.

use std::io::Cursor;

use symphonia::core::audio::Signal;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

use crate::audio::resampler::Resampler;
use crate::audio::types::{
    AudioError, AudioMetadata, AudioWindow, ContainerFormat, CANONICAL_BIT_DEPTH,
    CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE_HZ,
};

/// Decode an arbitrary audio blob and resample it to canonical format,
/// returning the window alongside its metadata. Returns `UnsupportedFormat`
/// when symphonia can't probe a decodable stream, `DecodeError` on
/// truncated/corrupt data once decoding has begun.
pub fn decode_and_resample(
    bytes: &[u8],
    filename: Option<&str>,
) -> Result<(AudioWindow, AudioMetadata), AudioError> {
    let format = ContainerFormat::detect(filename, bytes);
    let byte_size = bytes.len();

    let (samples, source_rate, source_channels) = if format == ContainerFormat::Wav {
        decode_wav(bytes)?
    } else {
        decode_with_symphonia(bytes, format)?
    };

    let resampler = Resampler::new(source_rate, source_channels)
        .map_err(|e| AudioError::ProcessingFailed { message: e.to_string() })?;
    let canonical_samples = resampler.process_to_mono(&samples);

    let window = AudioWindow {
        samples: canonical_samples,
        sample_rate_hz: CANONICAL_SAMPLE_RATE_HZ,
        channels: CANONICAL_CHANNELS,
        bit_depth: CANONICAL_BIT_DEPTH,
    };

    let metadata = AudioMetadata {
        duration_seconds: window.duration_seconds(),
        sample_rate_hz: window.sample_rate_hz,
        channels: window.channels,
        original_format: format,
        byte_size,
        quality_score: None,
        noise_level: None,
    };

    Ok((window, metadata))
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32, u16), AudioError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut reader = hound::WavReader::new(cursor).map_err(|e| AudioError::DecodeError {
        message: format!("invalid WAV container: {e}"),
    })?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / (1i64 << (spec.bits_per_sample - 1)) as f32))
            .collect(),
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };
    let samples = samples.map_err(|e| AudioError::DecodeError {
        message: format!("truncated WAV data: {e}"),
    })?;

    Ok((samples, spec.sample_rate, spec.channels))
}

fn decode_with_symphonia(
    bytes: &[u8],
    format: ContainerFormat,
) -> Result<(Vec<f32>, u32, u16), AudioError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    match format {
        ContainerFormat::Mp3 => hint.with_extension("mp3"),
        ContainerFormat::Flac => hint.with_extension("flac"),
        ContainerFormat::Ogg => hint.with_extension("ogg"),
        ContainerFormat::Wav => hint.with_extension("wav"),
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|_| AudioError::UnsupportedFormat { format })?;

    let mut format_reader = probed.format;
    let track = format_reader
        .default_track()
        .ok_or(AudioError::UnsupportedFormat { format })?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(CANONICAL_SAMPLE_RATE_HZ);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodeError { message: e.to_string() })?;

    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(e) => {
                if samples.is_empty() {
                    return Err(AudioError::DecodeError { message: e.to_string() });
                }
                warn!(error = %e, "stopped decoding early on a truncated packet");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut buf =
                    symphonia::core::audio::SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::DecodeError { message: e.to_string() }),
        }
    }

    if samples.is_empty() {
        return Err(AudioError::DecodeError {
            message: "no audio frames decoded".to_string(),
        });
    }

    Ok((samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, duration_s: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (sample_rate as f32 * duration_s) as usize;
            for i in 0..n {
                let t = i as f32 / sample_rate as f32;
                let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn detects_wav_by_signature() {
        let bytes = wav_bytes(16_000, 1, 0.1);
        assert_eq!(ContainerFormat::detect(None, &bytes), ContainerFormat::Wav);
    }

    #[test]
    fn detects_format_by_extension_even_without_signature_match() {
        assert_eq!(
            ContainerFormat::detect(Some("clip.flac"), b"not-a-real-header"),
            ContainerFormat::Flac
        );
    }

    #[test]
    fn decodes_wav_to_canonical_format() {
        let bytes = wav_bytes(44_100, 2, 0.5);
        let (window, metadata) = decode_and_resample(&bytes, Some("clip.wav")).unwrap();
        assert!(window.is_canonical());
        assert_eq!(metadata.original_format, ContainerFormat::Wav);
        assert!(metadata.duration_seconds > 0.0);
    }

    #[test]
    fn rejects_truncated_wav() {
        let mut bytes = wav_bytes(16_000, 1, 1.0);
        bytes.truncate(20);
        assert!(decode_and_resample(&bytes, Some("clip.wav")).is_err());
    }
}
