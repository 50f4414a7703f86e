//! WAV export of synthesized audio.

use std::path::Path;

use tracing::info;

use crate::error::{ParlanceError, ParlanceResult};
use crate::synth::AudioClip;

/// Write a clip to `path` as 16-bit PCM WAV.
///
/// Samples are clamped to full scale before conversion, so a clip that was
/// pushed past 1.0 by gain shaping exports without wrapping.
///
/// # Errors
///
/// Returns an invalid input error for empty clips and a file error if the
/// file cannot be written.
pub fn export_wav<P: AsRef<Path>>(path: P, clip: &AudioClip) -> ParlanceResult<()> {
    if clip.is_empty() {
        return Err(ParlanceError::invalid_input("Cannot export an empty clip"));
    }

    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: clip.channels,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| ParlanceError::file(format!("cannot create {}: {e}", path.display())))?;

    for sample in &clip.samples {
        let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| ParlanceError::file(format!("cannot write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| ParlanceError::file(format!("cannot finalize {}: {e}", path.display())))?;

    info!(
        "exported {:.2}s of audio to {}",
        clip.duration_secs(),
        path.display()
    );
    Ok(())
}

/// Read back the header of a WAV file: (sample rate, channels).
///
/// # Errors
///
/// Returns a file error if the file is missing or not a WAV.
pub fn wav_spec<P: AsRef<Path>>(path: P) -> ParlanceResult<(u32, u16)> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .map_err(|e| ParlanceError::file(format!("cannot read {}: {e}", path.display())))?;
    let spec = reader.spec();
    Ok((spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{check_text, SpeechEngine, SynthesisOptions};
    use tempfile::TempDir;

    /// Deterministic engine standing in for the synthesis library
    struct ToneEngine {
        sample_rate: u32,
    }

    impl SpeechEngine for ToneEngine {
        fn synthesize(
            &self,
            text: &str,
            options: &SynthesisOptions,
        ) -> crate::error::ParlanceResult<AudioClip> {
            options.validate()?;
            check_text(text)?;
            let samples = (0..self.sample_rate)
                .map(|i| (i as f32 * 0.01).sin() * 0.5)
                .collect();
            Ok(AudioClip::mono(samples, self.sample_rate))
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
    }

    #[test]
    fn test_synthesize_export_round_trip_matches_engine_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("round-trip.wav");

        let engine = ToneEngine { sample_rate: 22050 };
        let clip = engine
            .synthesize("Hello, world!", &SynthesisOptions::default())
            .unwrap();
        export_wav(&path, &clip).unwrap();

        let (sample_rate, channels) = wav_spec(&path).unwrap();
        assert_eq!(sample_rate, engine.sample_rate());
        assert_eq!(channels, crate::DEFAULT_CHANNELS);
    }

    #[test]
    fn test_export_and_read_back_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("speech.wav");

        let clip = AudioClip::mono(vec![0.0, 0.5, -0.5, 1.0, -1.0], 22050);
        export_wav(&path, &clip).unwrap();

        let (sample_rate, channels) = wav_spec(&path).unwrap();
        assert_eq!(sample_rate, clip.sample_rate);
        assert_eq!(channels, clip.channels);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), clip.samples.len() as u32);
    }

    #[test]
    fn test_export_clamps_out_of_range_samples() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hot.wav");

        let clip = AudioClip::mono(vec![2.0, -2.0], 16000);
        export_wav(&path, &clip).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![i16::MAX, i16::MIN + 1]);
    }

    #[test]
    fn test_export_rejects_empty_clip() {
        let temp = TempDir::new().unwrap();
        let clip = AudioClip::mono(Vec::new(), 22050);
        let err = export_wav(temp.path().join("empty.wav"), &clip).unwrap_err();
        assert_eq!(err.category(), "input");
    }

    #[test]
    fn test_wav_spec_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(wav_spec(temp.path().join("nope.wav")).is_err());
    }
}
