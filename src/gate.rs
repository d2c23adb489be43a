//! Eligibility gate: may an utterance actually render right now?

use serde::{Deserialize, Serialize};

/// An utterance renders, and its cue fires, only when the companion is
/// unmuted and its display surface is visible.
#[must_use]
pub fn is_eligible(muted: bool, surface_visible: bool) -> bool {
    !muted && surface_visible
}

/// Display surface flags reported by the overlay shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceState {
    pub muted: bool,
    pub visible: bool,
    /// Pointer is over the speech bubble; holds the current bubble open.
    pub hovered: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            muted: false,
            visible: true,
            hovered: false,
        }
    }
}

impl SurfaceState {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        is_eligible(self.muted, self.visible)
    }
}
