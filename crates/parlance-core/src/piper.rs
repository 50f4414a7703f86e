//! Piper-backed [`SpeechEngine`] implementation.
//!
//! This is a thin pass-through to the external `piper-rs` library. piper-rs
//! reads the VITS inference scales (noise, length, noise width) from the
//! voice config at load time, so per-request overrides are honoured by
//! staging a patched copy of the config next to a hard link of the weights
//! (piper-rs derives the weights path from the config path); the staged
//! synthesizer is cached until the scales change. Volume and normalization
//! are output shaping applied to the returned sample buffer.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use piper_rs::synth::PiperSpeechSynthesizer;
use tempfile::TempDir;
use tracing::debug;

use crate::error::{ParlanceError, ParlanceResult};
use crate::model::store::STAGING_PREFIX;
use crate::model::types::{ModelFiles, VoiceConfig};
use crate::synth::{check_text, AudioClip, SpeechEngine, SynthesisOptions};

/// Inference scales quantized to a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ScaleKey {
    length: u32,
    noise: u32,
    noise_w: u32,
}

impl ScaleKey {
    fn quantize(length: f32, noise: f32, noise_w: f32) -> Self {
        // Slider resolution is far coarser than a thousandth.
        Self {
            length: (length * 1000.0).round() as u32,
            noise: (noise * 1000.0).round() as u32,
            noise_w: (noise_w * 1000.0).round() as u32,
        }
    }

    fn of_options(options: &SynthesisOptions) -> Self {
        Self::quantize(options.speed, options.noise, options.noise_w)
    }
}

struct LoadedSynth {
    key: ScaleKey,
    synth: PiperSpeechSynthesizer,
    // Keeps the patched config and linked weights alive while cached
    _staging: Option<TempDir>,
}

/// Speech engine over a local Piper voice
pub struct PiperEngine {
    files: ModelFiles,
    voice_config: VoiceConfig,
    loaded: Mutex<Option<LoadedSynth>>,
}

impl std::fmt::Debug for PiperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperEngine")
            .field("files", &self.files)
            .field("sample_rate", &self.voice_config.audio.sample_rate)
            .finish_non_exhaustive()
    }
}

impl PiperEngine {
    /// Load a voice from its local files, eagerly building a synthesizer
    /// with the voice's own inference defaults.
    ///
    /// # Errors
    ///
    /// Returns a file error if the config is unreadable and a synthesis
    /// error if piper-rs rejects the voice.
    pub fn load(files: ModelFiles) -> ParlanceResult<Self> {
        let voice_config = VoiceConfig::load(&files.config)?;
        let synth = Self::build_synthesizer(&files.config)?;
        let defaults = &voice_config.inference;
        let key = ScaleKey::quantize(
            defaults.length_scale,
            defaults.noise_scale,
            defaults.noise_w,
        );

        debug!(
            "loaded voice from {} at {} Hz",
            files.onnx.display(),
            voice_config.audio.sample_rate
        );

        Ok(Self {
            files,
            voice_config,
            loaded: Mutex::new(Some(LoadedSynth {
                key,
                synth,
                _staging: None,
            })),
        })
    }

    /// The parsed voice config
    #[must_use]
    pub fn voice_config(&self) -> &VoiceConfig {
        &self.voice_config
    }

    fn build_synthesizer(config_path: &Path) -> ParlanceResult<PiperSpeechSynthesizer> {
        let model = piper_rs::from_config_path(config_path)
            .map_err(|e| ParlanceError::synthesis(format!("cannot load voice: {e}")))?;
        PiperSpeechSynthesizer::new(model)
            .map_err(|e| ParlanceError::synthesis(format!("cannot create synthesizer: {e}")))
    }

    /// Stage a patched config (and linked weights) for non-default scales.
    fn stage_patched_config(
        &self,
        options: &SynthesisOptions,
    ) -> ParlanceResult<(PathBuf, TempDir)> {
        let parent = self.files.onnx.parent().unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| ParlanceError::file(format!("cannot create synth staging: {e}")))?;

        let onnx_name = self
            .files
            .onnx
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ParlanceError::file("weights path has no file name"))?;

        // piper-rs finds the weights next to the config, so the staged pair
        // must keep the original names.
        let linked = staging.path().join(onnx_name);
        if std::fs::hard_link(&self.files.onnx, &linked).is_err() {
            std::fs::copy(&self.files.onnx, &linked).map_err(|e| {
                ParlanceError::file(format!("cannot stage weights for synthesis: {e}"))
            })?;
        }

        let raw = std::fs::read_to_string(&self.files.config).map_err(|e| {
            ParlanceError::file(format!("cannot read voice config: {e}"))
        })?;
        let patched = patch_config(&raw, options)?;
        let config_path = staging.path().join(format!("{onnx_name}.json"));
        std::fs::write(&config_path, patched).map_err(|e| {
            ParlanceError::file(format!("cannot write patched voice config: {e}"))
        })?;

        Ok((config_path, staging))
    }

    fn ensure_loaded(
        &self,
        loaded: &mut Option<LoadedSynth>,
        options: &SynthesisOptions,
    ) -> ParlanceResult<()> {
        let key = ScaleKey::of_options(options);
        if loaded.as_ref().is_some_and(|l| l.key == key) {
            return Ok(());
        }

        let defaults = &self.voice_config.inference;
        let default_key = ScaleKey::quantize(
            defaults.length_scale,
            defaults.noise_scale,
            defaults.noise_w,
        );

        let (synth, staging) = if key == default_key {
            (Self::build_synthesizer(&self.files.config)?, None)
        } else {
            debug!(
                "restaging voice with scales length={} noise={} noise_w={}",
                options.speed, options.noise, options.noise_w
            );
            let (config_path, staging) = self.stage_patched_config(options)?;
            (Self::build_synthesizer(&config_path)?, Some(staging))
        };

        *loaded = Some(LoadedSynth {
            key,
            synth,
            _staging: staging,
        });
        Ok(())
    }
}

impl SpeechEngine for PiperEngine {
    fn synthesize(&self, text: &str, options: &SynthesisOptions) -> ParlanceResult<AudioClip> {
        options.validate()?;
        check_text(text)?;

        let mut guard = self.loaded.lock();
        self.ensure_loaded(&mut guard, options)?;
        let Some(loaded) = guard.as_ref() else {
            return Err(ParlanceError::synthesis("synthesizer not loaded"));
        };

        let chunks = loaded
            .synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| ParlanceError::synthesis(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        for chunk in chunks {
            let chunk = chunk.map_err(|e| ParlanceError::synthesis(e.to_string()))?;
            samples.append(&mut chunk.into_vec());
        }
        drop(guard);

        let mut clip = AudioClip::mono(samples, self.voice_config.audio.sample_rate);
        if clip.is_empty() {
            return Err(ParlanceError::synthesis("voice produced no audio"));
        }
        if options.normalize {
            clip.normalize();
        }
        clip.apply_gain(options.volume);
        Ok(clip)
    }

    fn sample_rate(&self) -> u32 {
        self.voice_config.audio.sample_rate
    }
}

/// Rewrite a voice config's inference section with per-request scales.
///
/// # Errors
///
/// Returns a file error if the config is not a JSON object.
fn patch_config(raw: &str, options: &SynthesisOptions) -> ParlanceResult<String> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| ParlanceError::file("voice config is not a JSON object"))?;

    let inference = object
        .entry("inference")
        .or_insert_with(|| serde_json::json!({}));
    let inference = inference
        .as_object_mut()
        .ok_or_else(|| ParlanceError::file("voice config inference section is not an object"))?;

    inference.insert("length_scale".to_string(), serde_json::json!(options.speed));
    inference.insert("noise_scale".to_string(), serde_json::json!(options.noise));
    inference.insert("noise_w".to_string(), serde_json::json!(options.noise_w));

    serde_json::to_string_pretty(&value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_config_overrides_scales() {
        let raw = r#"{
            "audio": { "sample_rate": 22050 },
            "inference": { "noise_scale": 0.667, "length_scale": 1.0, "noise_w": 0.8 },
            "num_speakers": 1
        }"#;
        let options = SynthesisOptions {
            speed: 1.5,
            noise: 0.2,
            noise_w: 0.4,
            ..SynthesisOptions::default()
        };

        let patched = patch_config(raw, &options).unwrap();
        let value: serde_json::Value = serde_json::from_str(&patched).unwrap();

        assert_eq!(value["inference"]["length_scale"], 1.5);
        assert_eq!(value["inference"]["noise_scale"], 0.2);
        assert_eq!(value["inference"]["noise_w"], 0.4);
        // Untouched sections survive
        assert_eq!(value["audio"]["sample_rate"], 22050);
        assert_eq!(value["num_speakers"], 1);
    }

    #[test]
    fn test_patch_config_creates_missing_inference_section() {
        let raw = r#"{ "audio": { "sample_rate": 16000 } }"#;
        let patched = patch_config(raw, &SynthesisOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&patched).unwrap();
        assert_eq!(value["inference"]["noise_w"], 0.8);
    }

    #[test]
    fn test_patch_config_rejects_non_object() {
        assert!(patch_config("[1, 2, 3]", &SynthesisOptions::default()).is_err());
    }

    #[test]
    fn test_scale_key_quantization() {
        let a = ScaleKey::quantize(1.0, 0.667, 0.8);
        let b = ScaleKey::quantize(1.0000001, 0.667, 0.8);
        let c = ScaleKey::quantize(1.5, 0.667, 0.8);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let defaults = SynthesisOptions::default();
        assert_eq!(ScaleKey::of_options(&defaults), a);
    }
}
