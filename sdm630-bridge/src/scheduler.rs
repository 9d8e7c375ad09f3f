//! Wall-clock scheduling of poll cycles with single-flight and misfire handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::BrokerConnector;
use crate::bus::BusConnector;
use crate::config::ConfigError;
use crate::cycle::{CycleReport, PollCycle};

/// Fixed second offsets within every minute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    seconds: Vec<u32>,
}

impl Schedule {
    pub fn new(seconds: impl IntoIterator<Item = u32>) -> Result<Self, ConfigError> {
        let mut seconds: Vec<u32> = seconds.into_iter().collect();
        seconds.sort_unstable();
        seconds.dedup();

        match seconds.last() {
            None => Err(ConfigError::Validation(
                "schedule needs at least one second offset".to_string(),
            )),
            Some(&last) if last >= 60 => Err(ConfigError::Validation(format!(
                "schedule second {} out of range (use 0-59)",
                last
            ))),
            Some(_) => Ok(Self { seconds }),
        }
    }

    pub fn seconds(&self) -> &[u32] {
        &self.seconds
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let minute_start = now
            - TimeDelta::seconds(i64::from(now.second()))
            - TimeDelta::nanoseconds(i64::from(now.nanosecond()));

        self.seconds
            .iter()
            .map(|&s| minute_start + TimeDelta::seconds(i64::from(s)))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| {
                minute_start + TimeDelta::seconds(60 + i64::from(self.seconds[0]))
            })
    }
}

/// Whether a tick dispatched at `dispatched` for `intended` is too late to run.
///
/// Returns how late the tick is when it exceeds `grace`.
pub fn misfire(
    intended: DateTime<Utc>,
    dispatched: DateTime<Utc>,
    grace: Duration,
) -> Option<Duration> {
    let late_by = (dispatched - intended).to_std().unwrap_or_default();
    (late_by > grace).then_some(late_by)
}

fn is_set(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Holds the single-flight flag for the lifetime of a cycle.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Fires poll cycles on a [`Schedule`], one at a time.
pub struct Scheduler<B, M> {
    schedule: Schedule,
    grace: Duration,
    cycle: Arc<PollCycle<B, M>>,
    in_flight: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl<B, M> Scheduler<B, M>
where
    B: BusConnector,
    M: BrokerConnector,
{
    pub fn new(schedule: Schedule, grace: Duration, cycle: PollCycle<B, M>) -> Self {
        Self {
            schedule,
            grace,
            cycle: Arc::new(cycle),
            in_flight: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a cycle is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Handle one tick meant for `intended` and dispatched at `dispatched`.
    ///
    /// Returns the spawned cycle, or `None` when the tick was stale or a
    /// previous cycle is still running.
    pub fn dispatch(
        &self,
        intended: DateTime<Utc>,
        dispatched: DateTime<Utc>,
    ) -> Option<JoinHandle<CycleReport>> {
        if let Some(late_by) = misfire(intended, dispatched, self.grace) {
            warn!(
                intended = %intended,
                late_ms = late_by.as_millis() as u64,
                "Run time of poll cycle was missed, skipping"
            );
            return None;
        }

        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!(
                intended = %intended,
                "Previous poll cycle still running, skipping"
            );
            return None;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cycle = Arc::clone(&self.cycle);
        Some(tokio::spawn(async move {
            let _guard = guard;
            cycle.run(id).await
        }))
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// On shutdown no further ticks fire; a cycle already running is awaited.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            seconds = ?self.schedule.seconds(),
            grace_ms = self.grace.as_millis() as u64,
            "Scheduled readings"
        );

        let mut last_intended: Option<DateTime<Utc>> = None;
        let mut current: Option<JoinHandle<CycleReport>> = None;

        while !is_set(&shutdown) {
            let now = Utc::now();
            let from = last_intended.map_or(now, |last| last.max(now));
            let intended = self.schedule.next_after(from);
            let wait = (intended - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            last_intended = Some(intended);
            if let Some(handle) = self.dispatch(intended, Utc::now()) {
                current = Some(handle);
            }
        }

        info!("Scheduler stopping");

        if let Some(handle) = current {
            if !handle.is_finished() {
                info!("Waiting for running poll cycle to finish");
            }
            if let Err(e) = handle.await {
                warn!(error = %e, "Poll cycle task failed");
            }
        }
    }
}
