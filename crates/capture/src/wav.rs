//! Mono 16 kHz 16-bit WAV encoding for transcription upload.

use anyhow::Result;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

pub fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode captured mono f32 samples as a 16 kHz WAV buffer, resampling
/// with linear interpolation when the device rate differs.
pub fn encode(samples: &[f32], input_rate: u32) -> Result<Vec<u8>> {
    let spec = wav_spec();

    let resampled;
    let output: &[f32] = if input_rate == TARGET_SAMPLE_RATE {
        samples
    } else {
        resampled = resample_linear(samples, input_rate, TARGET_SAMPLE_RATE);
        &resampled
    };

    let estimated_size = (output.len() * 2) + 44;
    let mut buffer = Vec::with_capacity(estimated_size);

    {
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut buffer), spec)?;
        for &sample in output {
            writer.write_sample(convert_to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(buffer)
}

/// Duration of a mono clip at the given device rate.
pub fn duration_ms(samples: usize, input_rate: u32) -> u64 {
    if input_rate == 0 {
        return 0;
    }
    (samples as u64 * 1_000) / input_rate as u64
}

fn resample_linear(samples: &[f32], input_rate: u32, target_rate: u32) -> Vec<f32> {
    if samples.is_empty() || input_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    if input_rate == target_rate {
        return samples.to_vec();
    }

    let ratio = input_rate as f64 / target_rate as f64;
    let output_len = ((samples.len() as f64) / ratio).round() as usize;
    let output_len = output_len.max(1);

    let mut out = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let base_idx = src_pos.floor() as usize;
        let base_idx = base_idx.min(samples.len().saturating_sub(1));
        let next_idx = (base_idx + 1).min(samples.len().saturating_sub(1));
        let frac = (src_pos - base_idx as f64) as f32;
        let s0 = samples[base_idx];
        let s1 = samples[next_idx];
        out.push(s0 + (s1 - s0) * frac);
    }

    out
}

fn convert_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_valid_wav_header() {
        let samples = vec![0.0f32; 1600];
        let bytes = encode(&samples, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header plus two bytes per sample.
        assert_eq!(bytes.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn resampling_halves_a_double_rate_clip() {
        let samples = vec![0.1f32; 3200];
        let bytes = encode(&samples, TARGET_SAMPLE_RATE * 2).unwrap();
        let payload = bytes.len() - 44;
        assert_eq!(payload, samples.len());
    }

    #[test]
    fn upsampling_interpolates_between_neighbors() {
        let out = resample_linear(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn long_clip_position_does_not_drift() {
        // One minute at 48 kHz down to 16 kHz must land on exactly a third.
        let samples = vec![0.0f32; 48_000 * 60];
        let out = resample_linear(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 16_000 * 60);
    }

    #[test]
    fn empty_and_degenerate_inputs() {
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
        assert!(resample_linear(&[0.5], 0, 16_000).is_empty());
        assert_eq!(resample_linear(&[0.5], 16_000, 16_000), vec![0.5]);
    }

    #[test]
    fn duration_from_sample_count() {
        assert_eq!(duration_ms(16_000, 16_000), 1_000);
        assert_eq!(duration_ms(8_000, 16_000), 500);
        assert_eq!(duration_ms(100, 0), 0);
    }

    #[test]
    fn clipping_is_clamped() {
        assert_eq!(convert_to_i16(2.0), i16::MAX);
        assert_eq!(convert_to_i16(-2.0), -i16::MAX);
    }
}
