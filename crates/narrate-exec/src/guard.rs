//! Corruption guard for synthesized durations, and trim decisions.

use narrate_core::config::SynthConfig;
use narrate_core::manifest::UnitKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Plausible,
    TooLong,
    TooShort,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationGuard {
    pub ceiling_sec: f64,
    pub min_sec: f64,
    pub max_short_retries: u32,
}

impl DurationGuard {
    pub fn for_kind(cfg: &SynthConfig, kind: UnitKind) -> Self {
        Self {
            ceiling_sec: match kind {
                UnitKind::Speech => cfg.speech_ceiling_sec,
                UnitKind::Sfx | UnitKind::Music => cfg.clip_ceiling_sec,
            },
            min_sec: cfg.min_duration_sec,
            max_short_retries: cfg.max_short_retries,
        }
    }

    pub fn check(&self, duration_sec: f64) -> Verdict {
        if !duration_sec.is_finite() || duration_sec > self.ceiling_sec {
            Verdict::TooLong
        } else if duration_sec < self.min_sec {
            Verdict::TooShort
        } else {
            Verdict::Plausible
        }
    }
}

/// The trim to record, if the audio really ends in more silence than the hint
/// plus the margin.
pub fn trim_to_apply(hint: Option<f64>, trailing_silence: Option<f64>, margin: f64) -> Option<f64> {
    let hint = hint.filter(|h| *h > 0.0)?;
    let silence = trailing_silence?;
    (silence > hint + margin).then_some(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_use_kind_ceilings() {
        let cfg = SynthConfig::default();
        let speech = DurationGuard::for_kind(&cfg, UnitKind::Speech);
        let music = DurationGuard::for_kind(&cfg, UnitKind::Music);
        assert_eq!(speech.check(200.0), Verdict::TooLong);
        assert_eq!(music.check(200.0), Verdict::Plausible);
        assert_eq!(speech.check(0.001), Verdict::TooShort);
        assert_eq!(speech.check(f64::NAN), Verdict::TooLong);
        assert_eq!(speech.check(2.0), Verdict::Plausible);
    }

    #[test]
    fn trim_needs_margin() {
        assert_eq!(trim_to_apply(Some(0.2), Some(0.3), 0.05), Some(0.2));
        assert_eq!(trim_to_apply(Some(0.2), Some(0.24), 0.05), None);
        assert_eq!(trim_to_apply(Some(0.2), None, 0.05), None);
        assert_eq!(trim_to_apply(None, Some(5.0), 0.05), None);
    }
}
