use helios::config::ThresholdConfig;
use helios::decision::{DecisionReason, decide};
use helios::dwell::DwellTracker;
use helios::error::ConnectionErrorKind;
use helios::relay::RelayState;
use helios::source::{PowerReading, PowerSample};
use std::time::Duration;
use tokio::time::Instant;

fn thresholds(max_on: Option<u64>) -> ThresholdConfig {
    ThresholdConfig {
        turn_on_watts: 1000.0,
        turn_off_watts: 500.0,
        min_on_seconds: 120,
        max_on_seconds: max_on,
        min_off_seconds: 0,
        sample_interval_ms: 1000,
    }
}

fn at(watts: f64, now: Instant) -> PowerReading {
    PowerReading::Available(PowerSample::new(watts, now))
}

#[test]
fn scenario_a_turns_on_above_threshold() {
    let t = thresholds(Some(3 * 3600));
    let t0 = Instant::now();
    let dwell = DwellTracker::from_config(RelayState::Off, t0, &t);
    let now = t0 + Duration::from_secs(5);
    let d = decide(&at(1200.0, now), RelayState::Off, &dwell, &t, None, now);
    assert_eq!(d.state, RelayState::On);
    assert_eq!(d.reason, DecisionReason::AboveTurnOn);
}

#[test]
fn scenario_b_min_on_holds_relay() {
    let t = thresholds(Some(3 * 3600));
    let t0 = Instant::now();
    let dwell = DwellTracker::from_config(RelayState::On, t0, &t);
    let now = t0 + Duration::from_secs(30);
    let d = decide(&at(0.0, now), RelayState::On, &dwell, &t, None, now);
    assert_eq!(d.state, RelayState::On);
    assert_eq!(d.reason, DecisionReason::MinOnHold);
}

#[test]
fn scenario_c_turns_off_after_min_on() {
    let t = thresholds(None);
    let t0 = Instant::now();
    let dwell = DwellTracker::from_config(RelayState::On, t0, &t);
    let now = t0 + Duration::from_secs(130);
    let d = decide(&at(0.0, now), RelayState::On, &dwell, &t, None, now);
    assert_eq!(d.state, RelayState::Off);
    assert_eq!(d.reason, DecisionReason::BelowTurnOff);
}

#[test]
fn scenario_d_max_on_overrides_power() {
    let t = thresholds(Some(3 * 3600));
    let t0 = Instant::now();
    let dwell = DwellTracker::from_config(RelayState::On, t0, &t);
    let now = t0 + Duration::from_secs(4 * 3600);
    let d = decide(&at(2000.0, now), RelayState::On, &dwell, &t, None, now);
    assert_eq!(d.state, RelayState::Off);
    assert_eq!(d.reason, DecisionReason::MaxOnExceeded);
}

#[test]
fn guards_hold_across_power_and_dwell_grid() {
    let t = thresholds(Some(3 * 3600));
    let t0 = Instant::now();
    let powers = [0.0, 499.0, 500.0, 750.0, 999.0, 1000.0, 5000.0];
    let helds = [0u64, 60, 119, 120, 3600, 3 * 3600, 3 * 3600 + 1, 5 * 3600];
    let failed = PowerReading::Unavailable {
        kind: ConnectionErrorKind::Transient,
        message: "timeout".to_string(),
    };

    for state in [RelayState::Off, RelayState::On] {
        let dwell = DwellTracker::from_config(state, t0, &t);
        for held in helds {
            let now = t0 + Duration::from_secs(held);

            let d = decide(&failed, state, &dwell, &t, None, now);
            assert_eq!(d.state, state, "failure flipped relay after {held}s");

            for watts in powers {
                let d = decide(&at(watts, now), state, &dwell, &t, None, now);
                if state.is_on() && held > 3 * 3600 {
                    assert_eq!(d.state, RelayState::Off, "ceiling at {held}s {watts}W");
                } else if state.is_on() && held < 120 {
                    assert_eq!(d.state, RelayState::On, "floor at {held}s {watts}W");
                }
                if watts > 500.0 && watts < 1000.0 && d.reason != DecisionReason::MaxOnExceeded {
                    assert_eq!(d.state, state, "band flipped at {watts}W");
                }
            }
        }
    }
}
