//! Delay and duration policies.
//!
//! Both are pure functions of the configuration and recent history:
//!
//! ```text
//! delay    = min_delay + (ai_bonus if last was AI) + per_char_delay * max(0, last_len - threshold)
//! duration = clamp(base[source] + per_char_duration * len, min_duration, max_duration)
//! ```
//!
//! The delay is measured from the end of the utterance that just finished, so
//! readers get time proportional to what they just read.

use crate::config::PacingConfig;
use crate::utterance::SourceKind;
use std::time::Duration;

/// Cooldown required after an utterance of `last_source`/`last_len` ended.
#[must_use]
pub fn required_delay(last_source: SourceKind, last_len: usize, cfg: &PacingConfig) -> Duration {
    let bonus = if last_source == SourceKind::Ai {
        cfg.ai_bonus_secs
    } else {
        0.0
    };
    let overflow = last_len.saturating_sub(cfg.long_text_threshold) as f64;
    secs(cfg.min_delay_secs + bonus + cfg.per_char_delay_secs * overflow)
}

/// On-screen dwell time for an utterance of `source` and `len` characters.
///
/// A `max_duration_secs` below `min_duration_secs` is treated as equal to it.
#[must_use]
pub fn required_duration(source: SourceKind, len: usize, cfg: &PacingConfig) -> Duration {
    let raw = cfg.base_duration_secs.for_source(source) + cfg.per_char_duration_secs * len as f64;
    let lo = finite_or_zero(cfg.min_duration_secs);
    let hi = finite_or_zero(cfg.max_duration_secs).max(lo);
    secs(finite_or_zero(raw).clamp(lo, hi))
}

/// Convert a configured number of seconds into a [`Duration`].
///
/// Negative and non-finite values become zero; values too large for a
/// `Duration` saturate.
#[must_use]
pub fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(d: Duration, expected: f64) -> bool {
        (d.as_secs_f64() - expected).abs() < 1e-6
    }

    fn delay_cfg() -> PacingConfig {
        PacingConfig {
            min_delay_secs: 2.0,
            ai_bonus_secs: 5.0,
            per_char_delay_secs: 0.02,
            long_text_threshold: 100,
            ..PacingConfig::default()
        }
    }

    #[test]
    fn long_ai_reply_earns_bonus_and_per_char_delay() {
        let d = required_delay(SourceKind::Ai, 150, &delay_cfg());
        assert!(close(d, 8.0), "got {d:?}");
    }

    #[test]
    fn short_preset_only_waits_min_delay() {
        let d = required_delay(SourceKind::Preset, 40, &delay_cfg());
        assert!(close(d, 2.0), "got {d:?}");
    }

    #[test]
    fn trigger_gets_no_ai_bonus() {
        let d = required_delay(SourceKind::Trigger, 110, &delay_cfg());
        assert!(close(d, 2.2), "got {d:?}");
    }

    #[test]
    fn duration_inside_clamp_is_linear() {
        let cfg = PacingConfig::default();
        let d = required_duration(SourceKind::Preset, 40, &cfg);
        assert!(close(d, 7.0), "got {d:?}");
    }

    #[test]
    fn duration_clamps_to_bounds() {
        let cfg = PacingConfig::default();
        assert!(close(required_duration(SourceKind::Ai, 1_000, &cfg), 16.0));

        let short = PacingConfig {
            base_duration_secs: crate::config::SourceDurations {
                preset: 1.0,
                trigger: 1.0,
                ai: 1.0,
            },
            ..PacingConfig::default()
        };
        assert!(close(required_duration(SourceKind::Trigger, 0, &short), 5.0));
    }

    #[test]
    fn ai_base_duration_exceeds_preset() {
        let cfg = PacingConfig::default();
        assert!(
            required_duration(SourceKind::Ai, 20, &cfg)
                > required_duration(SourceKind::Preset, 20, &cfg)
        );
    }

    #[test]
    fn inverted_clamp_collapses_to_min() {
        let cfg = PacingConfig {
            min_duration_secs: 6.0,
            max_duration_secs: 3.0,
            ..PacingConfig::default()
        };
        assert!(close(required_duration(SourceKind::Ai, 500, &cfg), 6.0));
    }

    #[test]
    fn degenerate_seconds_become_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
    }
}
