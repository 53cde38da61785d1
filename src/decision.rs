//! Relay switching decisions
//!
//! [`decide`] is a pure function of the current reading, relay state, dwell
//! timing, thresholds and optional advisory signal. Rules are evaluated in a
//! fixed precedence order and the first match wins:
//!
//! 1. No reading: hold the current state.
//! 2. On longer than the maximum on time: force off.
//! 3. On shorter than the minimum on time: stay on.
//! 4. Off shorter than the minimum off time: stay off.
//! 5. Hysteresis on power between the turn-off and turn-on thresholds, with
//!    the advisory signal able to veto (never force) a turn-on.

use crate::advisory::AdvisorySignal;
use crate::config::ThresholdConfig;
use crate::dwell::DwellTracker;
use crate::relay::RelayState;
use crate::source::PowerReading;
use serde::Serialize;
use tokio::time::Instant;

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No measurement this tick; state held
    ReadingUnavailable,
    /// Maximum on time exceeded; forced off
    MaxOnExceeded,
    /// Minimum on time not yet reached; held on
    MinOnHold,
    /// Minimum off time not yet reached; held off
    MinOffHold,
    /// Power reached the turn-on threshold
    AboveTurnOn,
    /// Power reached the turn-on threshold but the advisory vetoed it
    AdvisoryVeto,
    /// Power fell to the turn-off threshold
    BelowTurnOff,
    /// Power inside the hysteresis band; state held
    WithinBand,
    /// Relay released by the shutdown policy, not by [`decide`]
    Shutdown,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ReadingUnavailable => "reading unavailable",
            Self::MaxOnExceeded => "maximum on time exceeded",
            Self::MinOnHold => "minimum on time not reached",
            Self::MinOffHold => "minimum off time not reached",
            Self::AboveTurnOn => "power above turn-on threshold",
            Self::AdvisoryVeto => "turn-on vetoed by advisory",
            Self::BelowTurnOff => "power below turn-off threshold",
            Self::WithinBand => "power within hysteresis band",
            Self::Shutdown => "released on shutdown",
        };
        f.write_str(text)
    }
}

/// Thresholds after applying the advisory scaling factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveThresholds {
    pub turn_on_watts: f64,
    pub turn_off_watts: f64,
}

impl EffectiveThresholds {
    /// Scale the configured thresholds by the advisory factor, if usable
    pub fn resolve(thresholds: &ThresholdConfig, advisory: Option<&AdvisorySignal>) -> Self {
        let factor = advisory
            .and_then(AdvisorySignal::usable_factor)
            .unwrap_or(1.0);
        Self {
            turn_on_watts: thresholds.turn_on_watts * factor,
            turn_off_watts: thresholds.turn_off_watts * factor,
        }
    }
}

/// Next relay state and the rule that chose it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub state: RelayState,
    pub reason: DecisionReason,
    pub thresholds: EffectiveThresholds,
}

/// Decide the next relay state
pub fn decide(
    reading: &PowerReading,
    current: RelayState,
    dwell: &DwellTracker,
    thresholds: &ThresholdConfig,
    advisory: Option<&AdvisorySignal>,
    now: Instant,
) -> Decision {
    let effective = EffectiveThresholds::resolve(thresholds, advisory);
    let verdict = |state, reason| Decision {
        state,
        reason,
        thresholds: effective,
    };

    let Some(power) = reading.watts() else {
        return verdict(current, DecisionReason::ReadingUnavailable);
    };

    match current {
        RelayState::On => {
            if dwell.max_dwell_exceeded(now) {
                verdict(RelayState::Off, DecisionReason::MaxOnExceeded)
            } else if !dwell.min_dwell_satisfied(now) {
                verdict(RelayState::On, DecisionReason::MinOnHold)
            } else if power <= effective.turn_off_watts {
                verdict(RelayState::Off, DecisionReason::BelowTurnOff)
            } else {
                verdict(RelayState::On, DecisionReason::WithinBand)
            }
        }
        RelayState::Off => {
            if !dwell.min_off_satisfied(now) {
                verdict(RelayState::Off, DecisionReason::MinOffHold)
            } else if power >= effective.turn_on_watts {
                if advisory.is_some_and(AdvisorySignal::vetoes_turn_on) {
                    verdict(RelayState::Off, DecisionReason::AdvisoryVeto)
                } else {
                    verdict(RelayState::On, DecisionReason::AboveTurnOn)
                }
            } else {
                verdict(RelayState::Off, DecisionReason::WithinBand)
            }
        }
    }
}
