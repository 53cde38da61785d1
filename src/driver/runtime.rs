use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep_until};

use crate::config::ShutdownPolicy;
use crate::decision::{Decision, DecisionReason, EffectiveThresholds, decide};
use crate::error::{ConnectionErrorKind, HeliosError, Result};
use crate::relay::RelayState;
use crate::source::PowerReading;
use crate::switch_log::TransitionEvent;

use super::types::{DriverState, TickReport};

/// Resolves once shutdown is requested
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    // The driver keeps the sender alive, so an error here cannot happen early
    let _ = rx.wait_for(|requested| *requested).await;
}

fn local_now(tz: Tz) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&tz).fixed_offset()
}

impl super::SwitchDriver {
    /// Configure the relay output (released) and start the startup grace clock
    pub async fn start(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting control loop: on>={}W off<={}W min_on={}s max_on={}",
            self.thresholds.turn_on_watts,
            self.thresholds.turn_off_watts,
            self.thresholds.min_on_seconds,
            self.thresholds
                .max_on_seconds
                .map_or_else(|| "unbounded".to_string(), |s| format!("{}s", s)),
        ));

        if let Err(e) = self.relay.initialize().await {
            self.relay_faulted = true;
            self.logger
                .error(&format!("Relay output initialization failed: {}", e));
            return Err(e);
        }

        let now = Instant::now();
        self.dwell.record_transition(RelayState::Off, now);
        self.started_at = Some(now);
        self.set_state(DriverState::Initializing);
        Ok(())
    }

    /// Run until shutdown is requested or a fatal error occurs
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        let result = self.run_loop().await;
        if let Err(ref e) = result {
            self.logger.error(&format!("Control loop failed: {}", e));
        }
        self.terminate().await;
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            if self.shutdown_requested() {
                self.logger.info("Shutdown signal received");
                return Ok(());
            }

            let tick_start = Instant::now();
            let report = self.tick().await?;
            if report.interrupted {
                continue;
            }

            // Schedule from the tick start so slow reads don't drift the cadence
            let deadline = tick_start + report.next_delay;
            if Instant::now() > deadline {
                self.stats.overruns += 1;
                self.logger.debug(&format!(
                    "Tick overran its {:?} interval",
                    report.next_delay
                ));
            }

            tokio::select! {
                () = sleep_until(deadline) => {}
                () = shutdown_signal(self.shutdown_rx.clone()) => {}
            }
        }
    }

    /// One sample/decide/actuate cycle
    ///
    /// Returns `Err` only for fatal conditions: a relay hardware fault, or a
    /// protocol mismatch before the first good sample.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let started = *self.started_at.get_or_insert_with(Instant::now);

        let outcome = tokio::select! {
            result = self.source.sample() => Some(result),
            () = shutdown_signal(self.shutdown_rx.clone()) => None,
        };

        let now = Instant::now();
        self.stats.ticks += 1;

        let (reading, failure, interrupted) = match outcome {
            Some(Ok(sample)) => (PowerReading::Available(sample), None, false),
            Some(Err(e)) => (PowerReading::failed(&e), Some(e), false),
            None => (
                PowerReading::Unavailable {
                    kind: ConnectionErrorKind::Transient,
                    message: "sampling interrupted by shutdown".to_string(),
                },
                None,
                true,
            ),
        };

        // Advice only matters when there is a reading to compare against
        let advisory = match (&reading, self.advisory.as_mut()) {
            (PowerReading::Available(_), Some(source)) => source.current().await,
            _ => None,
        };

        let previous = self.relay.state();
        let decision = decide(
            &reading,
            previous,
            &self.dwell,
            &self.thresholds,
            advisory.as_ref(),
            now,
        );

        if let Some(watts) = reading.watts() {
            self.logger.debug(&format!(
                "power={:.0}W relay={} -> {} ({})",
                watts, previous, decision.state, decision.reason
            ));
        }
        if !interrupted
            && let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.record_sample(
                local_now(self.tz),
                reading.watts(),
                decision.thresholds.turn_on_watts,
            )
        {
            self.logger
                .warn(&format!("Failed to write sample to switching log: {}", e));
        }

        let transitioned = match self.relay.apply(decision.state).await {
            Ok(changed) => changed,
            Err(e) => {
                self.fail_safe().await;
                return Err(e);
            }
        };
        if transitioned {
            self.dwell.record_transition(decision.state, now);
            self.record_transition(previous, &decision, reading.watts());
        }

        let next_delay = match failure {
            Some(e) => self.on_sample_failed(e, now, started)?,
            None if interrupted => Duration::ZERO,
            None => self.on_sample_ok(),
        };

        Ok(TickReport {
            reading,
            decision,
            transitioned,
            next_delay,
            interrupted,
        })
    }

    fn on_sample_ok(&mut self) -> Duration {
        let failures = self.backoff.consecutive_failures();
        if failures > 0 {
            self.logger.info(&format!(
                "Power source recovered after {} failed samples",
                failures
            ));
        }
        self.backoff.reset();

        if self.state() == DriverState::Initializing {
            self.logger.info("First power sample received");
        }
        self.set_state(DriverState::Running);
        self.thresholds.sample_interval()
    }

    fn on_sample_failed(
        &mut self,
        error: HeliosError,
        now: Instant,
        started: Instant,
    ) -> Result<Duration> {
        self.stats.failed_samples += 1;
        let kind = error
            .connection_kind()
            .unwrap_or(ConnectionErrorKind::Transient);
        let delay = self.backoff.next_delay(now, kind);

        match self.state() {
            DriverState::Initializing => {
                if kind == ConnectionErrorKind::ProtocolMismatch {
                    self.logger
                        .error(&format!("Power source unusable at startup: {}", error));
                    return Err(error);
                }
                let grace = Duration::from_secs(self.control.startup_grace_seconds);
                if now.saturating_duration_since(started) >= grace {
                    self.logger.warn(&format!(
                        "No power reading within {}s of startup, continuing with relay {}: {}",
                        self.control.startup_grace_seconds,
                        self.relay.state(),
                        error
                    ));
                    self.set_state(DriverState::Running);
                } else {
                    self.logger.warn(&format!(
                        "Startup sample failed, retrying in {:?}: {}",
                        delay, error
                    ));
                }
            }
            DriverState::Running | DriverState::Degraded { .. } => {
                let retry_count = self.backoff.consecutive_failures();
                if retry_count == 1 {
                    self.logger.warn(&format!(
                        "Power source failing, holding relay {}: {}",
                        self.relay.state(),
                        error
                    ));
                } else {
                    self.logger.debug(&format!(
                        "Sample failed again (retry {}, next in {:?}): {}",
                        retry_count, delay, error
                    ));
                }
                if self.backoff.window_exhausted() {
                    self.logger.warn(&format!(
                        "Retry budget exhausted, slowing retries to {:?}",
                        delay
                    ));
                }
                self.set_state(DriverState::Degraded { retry_count });
            }
            DriverState::Terminating => {}
        }
        Ok(delay)
    }

    fn record_transition(
        &mut self,
        previous: RelayState,
        decision: &Decision,
        power_watts: Option<f64>,
    ) {
        self.stats.transitions += 1;
        let event = TransitionEvent::from_decision(local_now(self.tz), previous, decision, power_watts);
        tracing::info!(
            target: "helios::switch",
            previous = %event.previous,
            new = %event.new,
            power_watts = ?event.power_watts,
            reason = %event.reason,
            "Relay switched"
        );
        self.logger.info(&format!("Relay switched: {}", event));

        if let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.record_transition(&event)
        {
            self.logger
                .warn(&format!("Failed to write switching log: {}", e));
        }
    }

    /// Best-effort release after a hardware fault
    async fn fail_safe(&mut self) {
        self.relay_faulted = true;
        if let Err(e) = self.relay.force_off().await {
            self.logger
                .error(&format!("Fail-safe relay release failed: {}", e));
        }
    }

    /// Apply the shutdown policy and release the power source
    pub async fn terminate(&mut self) {
        self.set_state(DriverState::Terminating);

        if self.relay_faulted {
            self.logger
                .warn("Relay position unknown after hardware fault, skipping shutdown policy");
        } else {
            match self.control.shutdown_policy {
                ShutdownPolicy::ForceOff => {
                    let previous = self.relay.state();
                    match self.relay.force_off().await {
                        Ok(()) => {
                            if previous.is_on() {
                                self.dwell.record_transition(RelayState::Off, Instant::now());
                                let decision = Decision {
                                    state: RelayState::Off,
                                    reason: DecisionReason::Shutdown,
                                    thresholds: EffectiveThresholds::resolve(
                                        &self.thresholds,
                                        None,
                                    ),
                                };
                                self.record_transition(previous, &decision, None);
                            }
                            self.logger.info("Relay released on shutdown");
                        }
                        Err(e) => self
                            .logger
                            .error(&format!("Failed to release relay on shutdown: {}", e)),
                    }
                }
                ShutdownPolicy::Hold => self
                    .logger
                    .info(&format!("Leaving relay {} on shutdown", self.relay.state())),
            }
        }

        self.source.close().await;
        self.logger.info("Control loop stopped");
    }
}
