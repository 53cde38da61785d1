//! Advisory inputs
//!
//! Advisory signals are computed outside this process (a forecast job, a
//! seasonal table) and consumed read-only. They can raise or lower the
//! switching thresholds and can veto a turn-on, but never force one.
//! Unreadable or stale inputs count as "no advice", not as unfavorable.

use crate::config::AdvisoryConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Whether a threshold factor can scale the thresholds
///
/// Zero, negative and non-finite factors would collapse or invert the band.
pub fn is_usable_factor(factor: f64) -> bool {
    factor.is_finite() && factor > 0.0
}

/// Externally computed advice for the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvisorySignal {
    /// `Some(false)` vetoes turning the relay on
    #[serde(default)]
    pub favorable: Option<bool>,

    /// Multiplier applied to both switching thresholds
    #[serde(default)]
    pub threshold_factor: Option<f64>,
}

impl AdvisorySignal {
    /// Whether this signal blocks a turn-on
    pub fn vetoes_turn_on(&self) -> bool {
        self.favorable == Some(false)
    }

    /// Whether the signal carries any advice at all
    pub const fn is_empty(&self) -> bool {
        self.favorable.is_none() && self.threshold_factor.is_none()
    }

    /// Threshold factor, if present and usable
    pub fn usable_factor(&self) -> Option<f64> {
        self.threshold_factor.filter(|f| is_usable_factor(*f))
    }

    /// Combine two signals: vetoes win, usable factors multiply
    ///
    /// An unusable factor on one side is dropped without discarding the other.
    pub fn merge(self, other: Self) -> Self {
        let favorable = match (self.favorable, other.favorable) {
            (Some(a), Some(b)) => Some(a && b),
            (a, b) => a.or(b),
        };
        let threshold_factor = match (self.usable_factor(), other.usable_factor()) {
            (Some(a), Some(b)) => Some(a * b),
            (a, b) => a.or(b),
        };
        Self {
            favorable,
            threshold_factor,
        }
    }
}

/// Anything that can provide the current advisory signal
#[async_trait::async_trait]
pub trait AdvisorySource: Send {
    /// Current advice, `None` when nothing is known
    async fn current(&mut self) -> Option<AdvisorySignal>;
}

/// Per-day threshold scaling factors, one value per line
#[derive(Debug, Clone, Default)]
pub struct DailyScalingFactors {
    factors: Vec<f64>,
}

impl DailyScalingFactors {
    /// Parse factors; lines that are not numbers are skipped
    pub fn parse(contents: &str) -> Self {
        let factors = contents
            .lines()
            .filter_map(|line| line.trim().parse::<f64>().ok())
            .collect();
        Self { factors }
    }

    /// Load factors from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HeliosError::io(format!(
                "Failed to read scaling factors {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::parse(&contents))
    }

    /// Number of factors loaded
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether no factors were loaded
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Factor for a calendar date, indexed by its day of year (1-based)
    ///
    /// Unusable entries read as no scaling for that day.
    pub fn factor_for(&self, date: NaiveDate) -> Option<f64> {
        self.factors
            .get(date.ordinal() as usize)
            .copied()
            .filter(|f| is_usable_factor(*f))
    }
}

/// JSON advisory file written by an external forecaster
#[derive(Debug, Clone)]
pub struct SignalFile {
    path: PathBuf,
    max_age: Duration,
}

impl SignalFile {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    /// Read the signal if present, parseable and fresh enough
    pub async fn read(&self) -> Result<Option<AdvisorySignal>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        if age > self.max_age {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.path).await?;
        let signal: AdvisorySignal = serde_json::from_str(&contents)?;
        Ok(Some(signal))
    }
}

/// Advisory source combining the daily scaling table and the signal file
pub struct AdvisoryProvider {
    scaling: Option<DailyScalingFactors>,
    signal: Option<SignalFile>,
    tz: Tz,
    logger: StructuredLogger,
}

impl AdvisoryProvider {
    pub fn new(scaling: Option<DailyScalingFactors>, signal: Option<SignalFile>, tz: Tz) -> Self {
        Self {
            scaling,
            signal,
            tz,
            logger: get_logger("advisory"),
        }
    }

    /// Build from configuration; `None` when no advisory input is configured
    pub fn from_config(config: &AdvisoryConfig, tz: Tz) -> Result<Option<Self>> {
        let scaling = config
            .scaling_factors_file
            .as_deref()
            .map(DailyScalingFactors::load)
            .transpose()?;
        let signal = config
            .signal_file
            .as_deref()
            .map(|p| SignalFile::new(p, Duration::from_secs(config.signal_max_age_seconds)));

        if scaling.is_none() && signal.is_none() {
            return Ok(None);
        }

        let provider = Self::new(scaling, signal, tz);
        if let Some(ref s) = provider.scaling {
            if s.is_empty() {
                provider
                    .logger
                    .warn("Scaling factors file has no usable entries, thresholds stay unscaled");
            } else {
                provider
                    .logger
                    .info(&format!("Loaded {} daily scaling factors", s.len()));
            }
        }
        Ok(Some(provider))
    }

    /// Advice for a given local date
    pub async fn signal_for(&self, date: NaiveDate) -> Option<AdvisorySignal> {
        let mut signal = AdvisorySignal::default();

        if let Some(ref scaling) = self.scaling {
            let factor = scaling.factor_for(date);
            self.logger.debug(&format!(
                "Day {}, scaling factor {}",
                date.ordinal(),
                factor.map_or_else(|| "none".to_string(), |f| f.to_string())
            ));
            signal.threshold_factor = factor;
        }

        if let Some(ref file) = self.signal {
            match file.read().await {
                Ok(Some(mut external)) => {
                    if let Some(factor) = external.threshold_factor
                        && !is_usable_factor(factor)
                    {
                        self.logger.warn(&format!(
                            "Ignoring advisory threshold_factor {}",
                            factor
                        ));
                        external.threshold_factor = None;
                    }
                    signal = signal.merge(external);
                }
                Ok(None) => self.logger.debug("No fresh advisory signal"),
                Err(e) => self
                    .logger
                    .warn(&format!("Ignoring unreadable advisory signal: {}", e)),
            }
        }

        (!signal.is_empty()).then_some(signal)
    }
}

#[async_trait::async_trait]
impl AdvisorySource for AdvisoryProvider {
    async fn current(&mut self) -> Option<AdvisorySignal> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        self.signal_for(today).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_factors_skip_garbage_lines() {
        let f = DailyScalingFactors::parse("1.0\n0.8\nnot a number\n\n1.25\n");
        assert_eq!(f.len(), 3);
        let jan_1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let jan_2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let jan_9 = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(f.factor_for(jan_1), Some(0.8));
        assert_eq!(f.factor_for(jan_2), Some(1.25));
        assert_eq!(f.factor_for(jan_9), None);
    }

    #[test]
    fn merge_prefers_veto_and_multiplies_factors() {
        let a = AdvisorySignal {
            favorable: Some(true),
            threshold_factor: Some(0.5),
        };
        let b = AdvisorySignal {
            favorable: Some(false),
            threshold_factor: Some(3.0),
        };
        let m = a.merge(b);
        assert_eq!(m.favorable, Some(false));
        assert_eq!(m.threshold_factor, Some(1.5));
        assert!(m.vetoes_turn_on());

        let only_factor = AdvisorySignal {
            favorable: None,
            threshold_factor: Some(2.0),
        };
        assert_eq!(only_factor.merge(AdvisorySignal::default()), only_factor);
    }

    #[test]
    fn merge_drops_unusable_factor_and_keeps_the_other() {
        let daily = AdvisorySignal {
            favorable: None,
            threshold_factor: Some(0.5),
        };
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let external = AdvisorySignal {
                favorable: Some(true),
                threshold_factor: Some(bad),
            };
            let m = daily.merge(external);
            assert_eq!(m.threshold_factor, Some(0.5), "{bad}");
            assert_eq!(m.favorable, Some(true));

            let m = external.merge(daily);
            assert_eq!(m.threshold_factor, Some(0.5), "{bad}");
        }
    }

    #[test]
    fn unusable_daily_factor_reads_as_none() {
        let f = DailyScalingFactors::parse("1.0
0
-0.5
1.1
");
        let jan_1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let jan_2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let jan_3 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(f.factor_for(jan_1), None);
        assert_eq!(f.factor_for(jan_2), None);
        assert_eq!(f.factor_for(jan_3), Some(1.1));
        assert!(!f.is_empty());
        assert!(DailyScalingFactors::parse("# none\n").is_empty());
    }

    #[tokio::test]
    async fn provider_without_inputs_gives_no_advice() {
        let p = AdvisoryProvider::new(None, None, Tz::UTC);
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(p.signal_for(date).await, None);
    }
}
