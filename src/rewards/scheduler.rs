//! Background task that fires the reward cycle once per period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::RewardConfig;
use crate::engine::AffinityEngine;
use crate::error::ConfigError;
use crate::rewards::RewardReport;

/// Key of the calendar month before `today`, formatted `YYYY_MM`.
pub fn previous_period_key(today: NaiveDate) -> String {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    format!("{}_{:02}", year, month)
}

/// When the reward cycle runs: a day of the month and a local time.
#[derive(Debug)]
pub struct RewardSchedule {
    day: u32,
    time: NaiveTime,
    last_fired: Mutex<Option<String>>,
}

impl RewardSchedule {
    pub fn new(day: u32, time: NaiveTime) -> Self {
        Self {
            day,
            time,
            last_fired: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RewardConfig) -> Result<Self, ConfigError> {
        let time = NaiveTime::parse_from_str(&config.cycle_time, "%H:%M").map_err(|e| {
            ConfigError::invalid(format!(
                "rewards.cycle_time '{}' is not HH:MM: {}",
                config.cycle_time, e
            ))
        })?;
        Ok(Self::new(config.cycle_day, time))
    }

    /// The period to close at `now`, if the cycle is due and has not fired for it yet.
    ///
    /// Marks the period as fired when returning it.
    pub fn due(&self, now: NaiveDateTime) -> Option<String> {
        if now.day() != self.day || now.time() < self.time {
            return None;
        }
        let period = previous_period_key(now.date());
        let mut last = self.last_fired.lock();
        if last.as_deref() == Some(period.as_str()) {
            return None;
        }
        *last = Some(period.clone());
        Some(period)
    }

    /// Check once a minute and run the engine's reward cycle when due.
    pub fn spawn(self, engine: Arc<AffinityEngine>) -> ScheduleHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let Some(period) = self.due(chrono::Local::now().naive_local()) else {
                    continue;
                };
                log::info!("Running scheduled reward cycle for {}", period);
                run_cycle_blocking(Arc::clone(&engine), period).await;
            }
        });

        ScheduleHandle { shutdown, task }
    }
}

/// Run the reward cycle on the blocking pool; it holds the store lock across file I/O.
async fn run_cycle_blocking(engine: Arc<AffinityEngine>, period: String) -> Option<RewardReport> {
    let label = period.clone();
    match tokio::task::spawn_blocking(move || engine.run_reward_cycle(&period)).await {
        Ok(Ok(report)) => {
            log::info!("{}", report);
            Some(report)
        }
        Ok(Err(e)) => {
            log::error!("Reward cycle for {} failed: {}", label, e);
            None
        }
        Err(e) => {
            log::error!("Reward cycle task for {} did not finish: {}", label, e);
            None
        }
    }
}

/// Handle to a running schedule.
#[derive(Debug)]
pub struct ScheduleHandle {
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
