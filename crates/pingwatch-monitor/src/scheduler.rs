use crate::classifier::{classify, ProbeOutcome, Transition};
use crate::publisher::{PublishError, Publisher, VariableStore};
use crate::registry::TargetRegistry;
use chrono::Utc;
use pingwatch_probe::ProbeRunner;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(800),
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build probe pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("probe timeout {timeout:?} must be shorter than the interval {interval:?}")]
    TimeoutNotBelowInterval { timeout: Duration, interval: Duration },
}

#[derive(Debug)]
pub struct TargetReport {
    pub id: String,
    pub outcome: ProbeOutcome,
    pub transition: Transition,
    pub published: Result<bool, PublishError>,
}

#[derive(Debug)]
pub struct TickReport {
    pub targets: Vec<TargetReport>,
    pub elapsed: Duration,
    /// How far the tick ran past the interval, if it did.
    pub overrun: Option<Duration>,
}

impl TickReport {
    pub fn publish_errors(&self) -> impl Iterator<Item = (&str, &PublishError)> {
        self.targets.iter().filter_map(|report| match &report.published {
            Ok(_) => None,
            Err(err) => Some((report.id.as_str(), err)),
        })
    }
}

/// Drives probe, classify and publish for every target once per interval.
pub struct Scheduler<S> {
    registry: Arc<TargetRegistry>,
    runner: Arc<dyn ProbeRunner>,
    publisher: Publisher<S>,
    settings: SchedulerSettings,
    pool: rayon::ThreadPool,
}

impl<S: VariableStore> Scheduler<S> {
    pub fn new(
        registry: Arc<TargetRegistry>,
        runner: Arc<dyn ProbeRunner>,
        publisher: Publisher<S>,
        settings: SchedulerSettings,
    ) -> Result<Self, SchedulerError> {
        if settings.timeout >= settings.interval {
            return Err(SchedulerError::TimeoutNotBelowInterval {
                timeout: settings.timeout,
                interval: settings.interval,
            });
        }

        let threads = settings.max_concurrency.max(1);
        let rounds = registry.len().div_ceil(threads) as u32;
        let worst_case = settings.timeout * rounds;
        if worst_case > settings.interval {
            warn!(
                targets = registry.len(),
                concurrency = threads,
                worst_case_ms = worst_case.as_millis() as u64,
                interval_ms = settings.interval.as_millis() as u64,
                "ticks can overrun the interval when probes time out"
            );
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("pingwatch-probe-{index}"))
            .build()?;

        Ok(Self {
            registry,
            runner,
            publisher,
            settings,
            pool,
        })
    }

    /// Publish every target as it currently stands, without probing.
    pub fn publish_all(&self) -> Vec<(String, PublishError)> {
        self.registry
            .targets()
            .iter()
            .filter_map(|target| match self.publisher.publish(target) {
                Ok(_) => None,
                Err(err) => Some((target.id().to_string(), err)),
            })
            .collect()
    }

    /// One pass over all targets. Reports come back in configured order.
    pub fn tick(&self) -> TickReport {
        let started = Instant::now();
        let targets: Vec<TargetReport> = self.pool.install(|| {
            (0..self.registry.len())
                .into_par_iter()
                .filter_map(|index| self.run_target(index))
                .collect()
        });

        let elapsed = started.elapsed();
        TickReport {
            targets,
            elapsed,
            overrun: elapsed
                .checked_sub(self.settings.interval)
                .filter(|over| !over.is_zero()),
        }
    }

    /// Tick every interval until `stop` is set or `max_ticks` ticks ran.
    /// Returns the number of completed ticks.
    pub fn run(
        &self,
        stop: &AtomicBool,
        max_ticks: Option<u64>,
        mut on_tick: impl FnMut(&TickReport),
    ) -> u64 {
        let mut ticks = 0;

        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let report = self.tick();
            ticks += 1;

            for (id, err) in report.publish_errors() {
                warn!(target_id = id, error = %err, "publish failed; will retry next tick");
            }
            if let Some(over) = report.overrun {
                warn!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    over_ms = over.as_millis() as u64,
                    "tick overran the interval; next tick starts late"
                );
            }
            on_tick(&report);

            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            let deadline = started + self.settings.interval;
            while !stop.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                sleep((deadline - now).min(SLEEP_SLICE));
            }
        }

        ticks
    }

    fn run_target(&self, index: usize) -> Option<TargetReport> {
        let target = self.registry.get(index)?;
        let id = target.id().to_string();

        let result = self.runner.probe(target.address(), self.settings.timeout);
        let outcome = ProbeOutcome::from_probe(&result);
        if let ProbeOutcome::Unparseable(err) = &outcome {
            warn!(
                target_id = %id,
                error = %err,
                raw = result.raw_output.as_deref().unwrap_or_default(),
                "probe replied but latency could not be read"
            );
        }

        let observed_at = Utc::now();
        let (transition, updated) = self.registry.update(index, |target| {
            let transition = classify(target, &outcome, observed_at);
            (transition, target.clone())
        })?;

        if transition.is_change() {
            info!(
                target_id = %id,
                from = %transition.from,
                to = %transition.to,
                failures = updated.consecutive_failures,
                "connectivity changed"
            );
        }

        let published = self.publisher.publish(&updated);

        Some(TargetReport {
            id,
            outcome,
            transition,
            published,
        })
    }
}
