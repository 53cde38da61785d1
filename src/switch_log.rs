//! Switching log
//!
//! Every relay transition produces one [`TransitionEvent`] with enough detail
//! (reading, rule, thresholds) to reconstruct the decision offline. Events go
//! to a [`TransitionSink`]; [`SwitchLogFile`] appends them as plain text lines.
//! With sample logging on, every tick also writes a `date power threshold`
//! line, with `n/a` for failed reads so outages show up as gaps.

use crate::decision::{Decision, DecisionReason};
use crate::error::Result;
use crate::relay::RelayState;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One relay transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub previous: RelayState,
    pub new: RelayState,
    /// Reading that triggered the switch, if one was available
    pub power_watts: Option<f64>,
    pub reason: DecisionReason,
    pub turn_on_watts: f64,
    pub turn_off_watts: f64,
}

impl TransitionEvent {
    /// Event for a decision that moved the relay away from `previous`
    pub fn from_decision(
        timestamp: DateTime<FixedOffset>,
        previous: RelayState,
        decision: &Decision,
        power_watts: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            previous,
            new: decision.state,
            power_watts,
            reason: decision.reason,
            turn_on_watts: decision.thresholds.turn_on_watts,
            turn_off_watts: decision.thresholds.turn_off_watts,
        }
    }
}

impl std::fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} power=",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.previous,
            self.new
        )?;
        match self.power_watts {
            Some(w) => write!(f, "{:.0}W", w)?,
            None => write!(f, "n/a")?,
        }
        write!(
            f,
            " on={:.0}W off={:.0}W reason={}",
            self.turn_on_watts, self.turn_off_watts, self.reason
        )
    }
}

/// Destination for switching events
pub trait TransitionSink: Send {
    /// Persist one transition
    fn record_transition(&mut self, event: &TransitionEvent) -> Result<()>;

    /// Persist one tick's reading, `None` when sampling failed; ignored by default
    fn record_sample(
        &mut self,
        _timestamp: DateTime<FixedOffset>,
        _watts: Option<f64>,
        _turn_on_watts: f64,
    ) -> Result<()> {
        Ok(())
    }
}

/// Appends events to a text file
#[derive(Debug, Clone)]
pub struct SwitchLogFile {
    path: PathBuf,
    log_samples: bool,
}

impl SwitchLogFile {
    pub fn new(path: impl Into<PathBuf>, log_samples: bool) -> Self {
        Self {
            path: path.into(),
            log_samples,
        }
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl TransitionSink for SwitchLogFile {
    fn record_transition(&mut self, event: &TransitionEvent) -> Result<()> {
        self.append_line(&event.to_string())
    }

    fn record_sample(
        &mut self,
        timestamp: DateTime<FixedOffset>,
        watts: Option<f64>,
        turn_on_watts: f64,
    ) -> Result<()> {
        if !self.log_samples {
            return Ok(());
        }
        let power = watts.map_or_else(|| "n/a".to_string(), |w| format!("{:.0}", w));
        self.append_line(&format!(
            "{} {} {:.0}",
            timestamp.format(TIMESTAMP_FORMAT),
            power,
            turn_on_watts
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-06-01T12:30:00+02:00").unwrap()
    }

    #[test]
    fn transition_line_format() {
        let event = TransitionEvent {
            timestamp: ts(),
            previous: RelayState::Off,
            new: RelayState::On,
            power_watts: Some(1234.4),
            reason: DecisionReason::AboveTurnOn,
            turn_on_watts: 1200.0,
            turn_off_watts: 1000.0,
        };
        assert_eq!(
            event.to_string(),
            "2024-06-01 12:30:00 OFF -> ON power=1234W on=1200W off=1000W reason=power above turn-on threshold"
        );
    }

    #[test]
    fn event_serializes_reason_snake_case() {
        let event = TransitionEvent {
            timestamp: ts(),
            previous: RelayState::On,
            new: RelayState::Off,
            power_watts: None,
            reason: DecisionReason::MaxOnExceeded,
            turn_on_watts: 1200.0,
            turn_off_watts: 1000.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["reason"], "max_on_exceeded");
        assert_eq!(json["previous"], "ON");
        assert!(json["power_watts"].is_null());
    }
}
