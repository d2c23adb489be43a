//! Effector interfaces (display, sound, haptics) and cue selection.
//!
//! Effectors are fire-and-forget. [`Effectors`] catches every failure at the
//! call site and logs it at `debug`; a broken speaker never stalls the
//! utterance lifecycle.

use crate::config::CueConfig;
use crate::error::Result;
use crate::utterance::SourceKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Sound accompanying an utterance. At most one plays per utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    /// Generic giggle used for preset phrases.
    Giggle,
    /// Reply chime for AI utterances.
    AiReply,
    /// Dedicated trigger audio path, distinct from the giggle.
    Trigger,
}

impl SoundKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Giggle => "giggle",
            Self::AiReply => "ai_reply",
            Self::Trigger => "trigger",
        }
    }

    /// Haptic pattern paired with this sound.
    #[must_use]
    pub fn haptic(self) -> HapticPattern {
        match self {
            Self::Giggle => HapticPattern::Tap,
            Self::AiReply => HapticPattern::DoubleTap,
            Self::Trigger => HapticPattern::Pulse,
        }
    }
}

/// Haptic pattern fired alongside a sound cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticPattern {
    Tap,
    DoubleTap,
    Pulse,
}

impl HapticPattern {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::DoubleTap => "double_tap",
            Self::Pulse => "pulse",
        }
    }
}

/// The audio/haptic cue chosen for one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cue {
    pub sound: SoundKind,
    pub haptic: Option<HapticPattern>,
}

/// Chooses the cue for each displayed utterance.
///
/// AI utterances always chime, triggers always use the trigger sound, and
/// presets giggle on every `preset_sound_every`-th display via a wrapping
/// counter.
#[derive(Debug, Default, Clone)]
pub struct CueSelector {
    preset_counter: u32,
}

impl CueSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the cue for an utterance that is about to render.
    ///
    /// Must only be called for utterances that pass the eligibility gate;
    /// every call for a preset advances the counter.
    pub fn select(&mut self, source: SourceKind, cfg: &CueConfig) -> Option<Cue> {
        let sound = match source {
            SourceKind::Ai => SoundKind::AiReply,
            SourceKind::Trigger => SoundKind::Trigger,
            SourceKind::Preset => {
                if cfg.preset_sound_every == 0 {
                    return None;
                }
                self.preset_counter = (self.preset_counter + 1) % cfg.preset_sound_every;
                if self.preset_counter != 0 {
                    return None;
                }
                SoundKind::Giggle
            }
        };
        Some(Cue {
            sound,
            haptic: cfg.haptics_enabled.then(|| sound.haptic()),
        })
    }
}

/// The companion's single text display surface.
pub trait DisplaySurface: Send + Sync + 'static {
    fn render(&self, text: &str, source: SourceKind) -> Result<()>;
    fn hide(&self) -> Result<()>;
}

/// Low-level sound playback.
pub trait SoundPlayer: Send + Sync + 'static {
    fn play(&self, sound: SoundKind) -> Result<()>;
}

/// Haptic feedback device.
pub trait Haptics: Send + Sync + 'static {
    fn trigger(&self, pattern: HapticPattern) -> Result<()>;
}

/// Effector that accepts everything and does nothing.
///
/// Used when a host shell renders from [`crate::runtime::OverlayEvent`]s
/// instead of being driven directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEffector;

impl DisplaySurface for NoopEffector {
    fn render(&self, _text: &str, _source: SourceKind) -> Result<()> {
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        Ok(())
    }
}

impl SoundPlayer for NoopEffector {
    fn play(&self, _sound: SoundKind) -> Result<()> {
        Ok(())
    }
}

impl Haptics for NoopEffector {
    fn trigger(&self, _pattern: HapticPattern) -> Result<()> {
        Ok(())
    }
}

/// Bundle of effectors driven by the scheduler.
#[derive(Clone)]
pub struct Effectors {
    display: Arc<dyn DisplaySurface>,
    sound: Arc<dyn SoundPlayer>,
    haptics: Arc<dyn Haptics>,
}

impl Default for Effectors {
    fn default() -> Self {
        Self::detached()
    }
}

impl Effectors {
    pub fn new(
        display: Arc<dyn DisplaySurface>,
        sound: Arc<dyn SoundPlayer>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self {
            display,
            sound,
            haptics,
        }
    }

    /// All effectors are no-ops.
    pub fn detached() -> Self {
        Self::new(
            Arc::new(NoopEffector),
            Arc::new(NoopEffector),
            Arc::new(NoopEffector),
        )
    }

    /// Replace the display surface.
    pub fn with_display(mut self, display: Arc<dyn DisplaySurface>) -> Self {
        self.display = display;
        self
    }

    /// Replace the sound player.
    pub fn with_sound(mut self, sound: Arc<dyn SoundPlayer>) -> Self {
        self.sound = sound;
        self
    }

    /// Replace the haptics device.
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Render text. Returns `false` if the surface reported a failure.
    pub fn render(&self, text: &str, source: SourceKind) -> bool {
        match self.display.render(text, source) {
            Ok(()) => true,
            Err(e) => {
                debug!("display render failed: {e}");
                false
            }
        }
    }

    pub fn hide(&self) -> bool {
        match self.display.hide() {
            Ok(()) => true,
            Err(e) => {
                debug!("display hide failed: {e}");
                false
            }
        }
    }

    /// Fire a cue's sound and optional haptic. Failures are logged only.
    pub fn fire_cue(&self, cue: Cue) {
        if let Err(e) = self.sound.play(cue.sound) {
            debug!("sound '{}' failed: {e}", cue.sound.as_str());
        }
        if let Some(pattern) = cue.haptic {
            if let Err(e) = self.haptics.trigger(pattern) {
                debug!("haptic '{}' failed: {e}", pattern.as_str());
            }
        }
    }
}

impl std::fmt::Debug for Effectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effectors").finish_non_exhaustive()
    }
}
