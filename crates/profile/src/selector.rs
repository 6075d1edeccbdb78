// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Profile Selector: threshold + asymmetric hysteresis + stability hold
//! over the optimised-pipeline cardinality, deciding the active
//! optimisation profile (spec §4.J).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Active optimisation profile; these names are the authoritative values
/// written into the control-signal artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Wide top-k, minimal rollup; used when cardinality is low.
    Conservative,
    /// Default operating point.
    Balanced,
    /// Narrow top-k, aggressive rollup; used when cardinality is high.
    Aggressive,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Profile::Conservative => "conservative",
            Profile::Balanced => "balanced",
            Profile::Aggressive => "aggressive",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(Profile::Conservative),
            "balanced" => Ok(Profile::Balanced),
            "aggressive" => Ok(Profile::Aggressive),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

/// Thresholds separating the three profiles; `conservative_max` must be
/// less than `aggressive_min`.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Cardinality below which the conservative profile applies.
    pub conservative_max: f64,
    /// Cardinality above which the aggressive profile applies.
    pub aggressive_min: f64,
}

/// Outcome of one [`ProfileSelector::tick`] or forced switch.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// The resulting active profile.
    pub profile: Profile,
    /// Human-readable justification, surfaced as `trigger_reason` in the
    /// published artifact.
    pub reason: String,
    /// Whether this tick actually changed the profile.
    pub changed: bool,
}

struct State {
    current: Profile,
    last_transition: u64,
    transition_count: u64,
}

/// Selects the active profile from the current optimised-pipeline
/// cardinality, applying asymmetric hysteresis around the thresholds and
/// a minimum stability period between transitions.
pub struct ProfileSelector {
    thresholds: RwLock<Thresholds>,
    hysteresis_factor: RwLock<f64>,
    stability_period_seconds: RwLock<u64>,
    state: RwLock<State>,
}

impl ProfileSelector {
    /// Construct a selector starting in [`Profile::Balanced`].
    #[must_use]
    pub fn new(thresholds: Thresholds, hysteresis_factor: f64, stability_period_seconds: u64, now: u64) -> Self {
        Self {
            thresholds: RwLock::new(thresholds),
            hysteresis_factor: RwLock::new(hysteresis_factor),
            stability_period_seconds: RwLock::new(stability_period_seconds),
            state: RwLock::new(State { current: Profile::Balanced, last_transition: now, transition_count: 0 }),
        }
    }

    /// Currently active profile.
    #[must_use]
    pub fn current_profile(&self) -> Profile {
        self.state.read().current
    }

    /// Unix-seconds timestamp of the last actual profile transition.
    #[must_use]
    pub fn last_transition(&self) -> u64 {
        self.state.read().last_transition
    }

    /// Total number of actual profile transitions (via `tick` or
    /// `force_profile`) since construction.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.state.read().transition_count
    }

    /// Current thresholds, e.g. for the anomaly hook's `current_value >
    /// aggressiveMin` check.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.read()
    }

    /// Replace the thresholds.
    pub fn set_thresholds(&self, thresholds: Thresholds) {
        *self.thresholds.write() = thresholds;
    }

    /// Replace the hysteresis factor (expected in `[0, 1)`).
    pub fn set_hysteresis_factor(&self, hysteresis_factor: f64) {
        *self.hysteresis_factor.write() = hysteresis_factor;
    }

    /// Replace the stability period.
    pub fn set_stability_period_seconds(&self, stability_period_seconds: u64) {
        *self.stability_period_seconds.write() = stability_period_seconds;
    }

    /// Evaluate the current cardinality `optimized_ts` at time `now` and
    /// decide whether to transition (spec §4.J).
    pub fn tick(&self, optimized_ts: f64, now: u64) -> SelectionResult {
        let thresholds = *self.thresholds.read();
        let hysteresis_factor = *self.hysteresis_factor.read();
        let stability_period_seconds = *self.stability_period_seconds.read();
        let mut state = self.state.write();

        let (candidate, candidate_reason) = candidate_profile(state.current, optimized_ts, thresholds, hysteresis_factor);

        if candidate == state.current {
            return SelectionResult { profile: state.current, reason: candidate_reason, changed: false };
        }

        if now.saturating_sub(state.last_transition) < stability_period_seconds {
            return SelectionResult {
                profile: state.current,
                reason: format!("Stability hold: candidate {candidate} suppressed ({candidate_reason})"),
                changed: false,
            };
        }

        state.current = candidate;
        state.last_transition = now;
        state.transition_count += 1;
        SelectionResult { profile: candidate, reason: candidate_reason, changed: true }
    }

    /// Force the profile directly to `profile`, bypassing the stability
    /// hold and resetting the hold timer (spec §4.M anomaly override).
    pub fn force_profile(&self, profile: Profile, now: u64, reason: impl Into<String>) -> SelectionResult {
        let mut state = self.state.write();
        let changed = state.current != profile;
        state.current = profile;
        state.last_transition = now;
        SelectionResult { profile, reason: reason.into(), changed }
    }
}

fn candidate_profile(current: Profile, c: f64, thresholds: Thresholds, hysteresis_factor: f64) -> (Profile, String) {
    let mc = thresholds.conservative_max;
    let ma = thresholds.aggressive_min;
    match current {
        Profile::Conservative => {
            let upper = mc * (1.0 + hysteresis_factor);
            if c > upper {
                if c > ma {
                    (Profile::Aggressive, format!("exceeded Aggressive Min threshold ({ma}) from conservative exit boundary ({upper})"))
                } else {
                    (Profile::Balanced, format!("exceeded Conservative Max exit boundary ({upper})"))
                }
            } else {
                (Profile::Conservative, format!("within Conservative Max exit boundary ({upper})"))
            }
        }
        Profile::Aggressive => {
            let lower = ma * (1.0 - hysteresis_factor);
            if c < lower {
                if c < mc {
                    (Profile::Conservative, format!("below Conservative Max threshold ({mc}) from aggressive exit boundary ({lower})"))
                } else {
                    (Profile::Balanced, format!("below Aggressive Min exit boundary ({lower})"))
                }
            } else {
                (Profile::Aggressive, format!("above Aggressive Min exit boundary ({lower})"))
            }
        }
        Profile::Balanced => {
            if c > ma {
                (Profile::Aggressive, format!("exceeded Aggressive Min threshold ({ma})"))
            } else if c < mc {
                (Profile::Conservative, format!("below Conservative Max threshold ({mc})"))
            } else {
                (Profile::Balanced, "within balanced band".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds { conservative_max: 15_000.0, aggressive_min: 25_000.0 }
    }

    #[test]
    fn conservative_transition_from_balanced() {
        let selector = ProfileSelector::new(thresholds(), 0.1, 120, 0);
        let result = selector.tick(10_000.0, 1_000);
        assert_eq!(result.profile, Profile::Conservative);
        assert!(result.changed);
        assert!(result.reason.contains("Conservative Max"));
    }

    #[test]
    fn aggressive_transition_persists_under_hysteresis() {
        let selector = ProfileSelector::new(thresholds(), 0.1, 0, 0);
        let first = selector.tick(25_500.0, 1_000);
        assert_eq!(first.profile, Profile::Aggressive);

        let second = selector.tick(24_500.0, 1_010);
        assert_eq!(second.profile, Profile::Aggressive);
        assert!(!second.changed);
    }

    #[test]
    fn stability_hold_suppresses_transition_within_period() {
        let selector = ProfileSelector::new(thresholds(), 0.1, 120, 0);
        // Force into conservative, with "last change" 30s in the past relative to `now`.
        let _ = selector.force_profile(Profile::Conservative, 0, "seed");
        let result = selector.tick(30_000.0, 30);
        assert_eq!(result.profile, Profile::Conservative);
        assert!(!result.changed);
        assert!(result.reason.to_lowercase().contains("stability hold"));
    }

    #[test]
    fn force_profile_bypasses_stability_hold() {
        let selector = ProfileSelector::new(thresholds(), 0.1, 120, 0);
        let result = selector.force_profile(Profile::Aggressive, 5, "anomaly_detected");
        assert_eq!(result.profile, Profile::Aggressive);
        assert!(result.changed);
        assert_eq!(selector.last_transition(), 5);
    }
}
