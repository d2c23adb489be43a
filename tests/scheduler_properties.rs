#![allow(clippy::unwrap_used, clippy::expect_used)]

use fae_overlay::scheduler::{Effect, SchedulerState};
use fae_overlay::{OverlayConfig, SourceKind, Utterance};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

fn arb_source() -> impl Strategy<Value = SourceKind> {
    prop_oneof![
        Just(SourceKind::Preset),
        Just(SourceKind::Trigger),
        Just(SourceKind::Ai),
    ]
}

/// `(text, source, gap in ms since the previous enqueue)`.
fn arb_arrivals() -> impl Strategy<Value = Vec<(String, SourceKind, u64)>> {
    prop::collection::vec(("[a-z]{1,40}", arb_source(), 0u64..20_000), 0..25)
}

struct Drive {
    state: SchedulerState,
    config: OverlayConfig,
    rendered: Vec<String>,
    last_ended: Option<Instant>,
}

impl Drive {
    fn new() -> Self {
        let mut config = OverlayConfig::default();
        config.cues.suppress_presets_during_ai = false;
        Self {
            state: SchedulerState::default(),
            config,
            rendered: Vec::new(),
            last_ended: None,
        }
    }

    /// Record renders and check that end times never move backwards.
    fn absorb(&mut self, effects: Vec<Effect>) -> Result<(), TestCaseError> {
        for effect in effects {
            if let Effect::Render { text, .. } = effect {
                self.rendered.push(text);
            }
        }
        let ended = self.state.last_display_ended_at();
        prop_assert!(ended >= self.last_ended, "end time went backwards");
        self.last_ended = ended;
        Ok(())
    }

    /// Fire every deadline at or before `until` (all of them when `None`).
    fn run_timers(&mut self, until: Option<Instant>) -> Result<(), TestCaseError> {
        let mut fired = 0;
        while let Some(deadline) = self.state.next_deadline() {
            if until.is_some_and(|u| deadline > u) {
                break;
            }
            let effects = self.state.on_timer(deadline, &self.config);
            self.absorb(effects)?;
            fired += 1;
            prop_assert!(fired < 1_000, "timers never settled");
        }
        Ok(())
    }
}

proptest! {
    #[test]
    fn every_enqueued_utterance_renders_once_in_order(arrivals in arb_arrivals()) {
        let mut drive = Drive::new();
        let mut now = Instant::now();

        for (text, source, gap_ms) in &arrivals {
            now += Duration::from_millis(*gap_ms);
            drive.run_timers(Some(now))?;
            let effects = drive
                .state
                .enqueue(Utterance::at(text.clone(), *source, now), now, &drive.config);
            let any_dropped = effects.iter().any(|e| matches!(e, Effect::Dropped { .. }));
            prop_assert!(!any_dropped);
            drive.absorb(effects)?;
        }
        drive.run_timers(None)?;

        let expected: Vec<String> = arrivals.iter().map(|(t, _, _)| t.clone()).collect();
        prop_assert_eq!(&drive.rendered, &expected);
        prop_assert_eq!(drive.state.completed(), arrivals.len() as u64);
        prop_assert_eq!(drive.state.queued(), 0);
    }

    #[test]
    fn displays_never_overlap(arrivals in arb_arrivals()) {
        let mut drive = Drive::new();
        let mut now = Instant::now();
        let mut showing = false;

        for (text, source, gap_ms) in &arrivals {
            now += Duration::from_millis(*gap_ms);
            while let Some(deadline) = drive.state.next_deadline() {
                if deadline > now {
                    break;
                }
                for effect in drive.state.on_timer(deadline, &drive.config) {
                    match effect {
                        Effect::Render { .. } => {
                            prop_assert!(!showing, "render while another is on screen");
                            showing = true;
                        }
                        Effect::Hide => showing = false,
                        _ => {}
                    }
                }
            }
            for effect in drive
                .state
                .enqueue(Utterance::at(text.clone(), *source, now), now, &drive.config)
            {
                if let Effect::Render { .. } = effect {
                    prop_assert!(!showing, "render while another is on screen");
                    showing = true;
                }
            }
        }
    }
}
