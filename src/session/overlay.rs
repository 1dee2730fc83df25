use std::time::Duration;

use serde::Serialize;

use crate::settings::OverlaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayDecision {
    Normal,
    /// Flag the UI as unresponsive without blocking it yet.
    Unresponsive,
    ShowOverlay,
}

/// Decides what to surface given how long the active session has been silent.
pub fn evaluate_overlay(
    time_since_last_activity: Duration,
    is_active_session: bool,
    settings: &OverlaySettings,
) -> OverlayDecision {
    if !is_active_session {
        return OverlayDecision::Normal;
    }

    let inactivity = Duration::from_millis(settings.inactivity_ms);
    let overlay_after = inactivity + Duration::from_millis(settings.secondary_delay_ms);

    if time_since_last_activity > overlay_after {
        OverlayDecision::ShowOverlay
    } else if time_since_last_activity >= inactivity {
        OverlayDecision::Unresponsive
    } else {
        OverlayDecision::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> OverlayDecision {
        evaluate_overlay(Duration::from_secs(secs), true, &OverlaySettings::default())
    }

    #[test]
    fn thresholds_follow_inactivity_then_secondary_delay() {
        assert_eq!(at(0), OverlayDecision::Normal);
        assert_eq!(at(14), OverlayDecision::Normal);
        assert_eq!(at(15), OverlayDecision::Unresponsive);
        assert_eq!(at(25), OverlayDecision::Unresponsive);
        assert_eq!(at(26), OverlayDecision::ShowOverlay);
    }

    #[test]
    fn idle_sessions_never_show_the_overlay() {
        let decision =
            evaluate_overlay(Duration::from_secs(600), false, &OverlaySettings::default());
        assert_eq!(decision, OverlayDecision::Normal);
    }
}
