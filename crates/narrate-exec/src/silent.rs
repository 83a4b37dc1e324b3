//! Built-in provider that emits PCM WAV silence.
//!
//! Speech lasts as long as the word count suggests at a fixed rate; clips last
//! their duration hint. Useful for dry runs and tests.

use narrate_core::composition::ClipKind;

use crate::provider::{
    Artifact, ClipProvider, ClipRequest, Pricing, ProviderError, SpeechProvider, SpeechRequest,
};

const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, PartialEq)]
pub struct SilentProvider {
    pub sample_rate: u32,
    pub words_per_minute: f64,
    pub min_speech_sec: f64,
    /// Clip length when no hint is given.
    pub default_sfx_sec: f64,
    pub default_music_sec: f64,
}

impl Default for SilentProvider {
    fn default() -> Self {
        Self {
            sample_rate: 8_000,
            words_per_minute: 150.0,
            min_speech_sec: 0.25,
            default_sfx_sec: 1.0,
            default_music_sec: 8.0,
        }
    }
}

impl SilentProvider {
    fn artifact(&self, duration_sec: f64) -> Artifact {
        let bytes = wav_silence(duration_sec, self.sample_rate);
        Artifact {
            duration_sec: wav_duration(&bytes).unwrap_or(duration_sec),
            bytes,
            trailing_silence_sec: None,
            sample_rate: self.sample_rate,
            format: "wav".to_string(),
        }
    }
}

impl SpeechProvider for SilentProvider {
    fn fingerprint(&self) -> String {
        format!("silent/{}hz/{}wpm", self.sample_rate, self.words_per_minute)
    }

    fn pricing(&self) -> Pricing {
        Pricing::free("characters")
    }

    fn synthesize(&self, req: &SpeechRequest) -> Result<Artifact, ProviderError> {
        if req.text.trim().is_empty() {
            return Err(ProviderError::Rejected("empty text".into()));
        }
        let words = req.text.split_whitespace().count() as f64;
        let secs = (words * 60.0 / self.words_per_minute).max(self.min_speech_sec);
        Ok(self.artifact(secs))
    }
}

impl ClipProvider for SilentProvider {
    fn fingerprint(&self) -> String {
        format!("silent/{}hz", self.sample_rate)
    }

    fn pricing(&self) -> Pricing {
        Pricing::free("seconds")
    }

    fn generate(&self, req: &ClipRequest) -> Result<Artifact, ProviderError> {
        let fallback = match req.kind {
            ClipKind::Sfx => self.default_sfx_sec,
            ClipKind::Music => self.default_music_sec,
        };
        Ok(self.artifact(req.duration_hint.unwrap_or(fallback)))
    }
}

/// Mono 16-bit PCM WAV of the given length.
pub fn wav_silence(duration_sec: f64, sample_rate: u32) -> Vec<u8> {
    let samples = (duration_sec.max(0.0) * sample_rate as f64).round() as u32;
    let data_len = samples * 2;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(WAV_HEADER_LEN + data_len as usize, 0);
    out
}

/// Duration of a canonical 44-byte-header PCM WAV; `None` for anything else.
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < WAV_HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    let byte_rate = u32_at(28);
    if &bytes[36..40] != b"data" || byte_rate == 0 {
        return None;
    }
    Some(u32_at(40) as f64 / byte_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.into(),
            voice: None,
            instructions: None,
            owner_id: "s".into(),
            cue_id: "c".into(),
            segment: 0,
        }
    }

    #[test]
    fn wav_header_and_duration() {
        let bytes = wav_silence(1.5, 8_000);
        assert_eq!(bytes.len(), 44 + 24_000);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(wav_duration(&bytes), Some(1.5));
        assert_eq!(wav_duration(b"not a wav"), None);
    }

    #[test]
    fn speech_length_follows_words() {
        let p = SilentProvider::default();
        let a = p.synthesize(&speech("one two three four five")).unwrap();
        assert_eq!(a.duration_sec, 2.0);
        assert_eq!(a.format, "wav");
        assert!(p.synthesize(&speech("   ")).is_err());
    }

    #[test]
    fn clip_length_follows_hint() {
        let p = SilentProvider::default();
        let mut req = ClipRequest {
            clip_id: "boom".into(),
            kind: ClipKind::Sfx,
            prompt: "boom".into(),
            duration_hint: Some(0.5),
            looped: false,
            instrumental: false,
            variant: 0,
        };
        assert_eq!(p.generate(&req).unwrap().duration_sec, 0.5);
        req.duration_hint = None;
        req.kind = ClipKind::Music;
        assert_eq!(p.generate(&req).unwrap().duration_sec, 8.0);
    }
}
