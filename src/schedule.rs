//! Recurring configuration backups.
//!
//! Each active [`BackupScheduleDescriptor`] becomes one job keyed
//! `backup_{id}` whose trigger is a cron expression derived from the
//! cadence. A single driver task sleeps until the earliest next fire time,
//! runs due jobs on their own tasks and reschedules them. A job found late
//! still runs if it is within the misfire grace period; otherwise that
//! occurrence is skipped.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use cron::Schedule;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;

use crate::backup::BackupRunner;
use crate::config::SchedulerConfig;
use crate::error::ScheduleError;
use crate::model::{BackupScheduleDescriptor, Cadence};

/// Hour and minute used when a descriptor has no time of day.
const DEFAULT_TIME: (u32, u32) = (1, 0);
const DEFAULT_DAY: u32 = 1;

/// Longest the driver sleeps before re-reading the clock.
const MAX_SLEEP: Duration = Duration::from_secs(60);

impl FromStr for Cadence {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Cadence::Hourly),
            "daily" => Ok(Cadence::Daily),
            "monthly" => Ok(Cadence::Monthly),
            other => Err(ScheduleError::UnknownCadence(other.to_string())),
        }
    }
}

/// Parses `HH:MM`.
fn parse_time(time: &str) -> Result<(u32, u32), ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(time.to_string());
    let (hour, minute) = time.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Cron trigger of a job, in local time.
#[derive(Debug, Clone)]
pub struct Trigger {
    expression: String,
    schedule: Schedule,
}

impl Trigger {
    pub fn new(expression: &str) -> Result<Self, ScheduleError> {
        let schedule = Schedule::from_str(expression).map_err(|e| ScheduleError::InvalidCron {
            expr: expression.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// Hourly at minute 0; daily at the time of day; monthly on the day of
    /// month at the time of day. Time defaults to 01:00 and day to 1.
    pub fn from_descriptor(descriptor: &BackupScheduleDescriptor) -> Result<Self, ScheduleError> {
        let (hour, minute) = match descriptor.time.as_deref() {
            Some(time) if !time.trim().is_empty() => parse_time(time)?,
            _ => DEFAULT_TIME,
        };
        let expression = match descriptor.cadence {
            Cadence::Hourly => "0 0 * * * *".to_string(),
            Cadence::Daily => format!("0 {minute} {hour} * * *"),
            Cadence::Monthly => {
                let day = descriptor.day.unwrap_or(DEFAULT_DAY);
                if !(1..=31).contains(&day) {
                    return Err(ScheduleError::InvalidDay(day));
                }
                format!("0 {minute} {hour} {day} * *")
            }
        };
        Self::new(&expression)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&after).next()
    }
}

/// What to do with a job whose fire time is `scheduled` when checked at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    Run,
    /// Later than the grace period; skip this occurrence.
    Misfired,
    NotDue,
}

pub fn due(scheduled: DateTime<Local>, now: DateTime<Local>, grace: Duration) -> FireDecision {
    if now < scheduled {
        return FireDecision::NotDue;
    }
    match (now - scheduled).to_std() {
        Ok(late) if late <= grace => FireDecision::Run,
        _ => FireDecision::Misfired,
    }
}

pub fn job_key(schedule_id: u64) -> String {
    format!("backup_{schedule_id}")
}

struct Job {
    device_id: u64,
    trigger: Trigger,
    next_fire: Option<DateTime<Local>>,
}

/// A registered job as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub key: String,
    pub device_id: u64,
    pub expression: String,
    pub next_fire: Option<DateTime<Local>>,
}

struct Inner {
    runner: Arc<dyn BackupRunner>,
    config: SchedulerConfig,
    jobs: Mutex<BTreeMap<String, Job>>,
    changed: Notify,
    shutdown: broadcast::Sender<()>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the backup jobs and the task that fires them.
#[derive(Clone)]
pub struct BackupScheduler {
    inner: Arc<Inner>,
}

impl BackupScheduler {
    pub fn new(runner: Arc<dyn BackupRunner>, config: SchedulerConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                runner,
                config,
                jobs: Mutex::new(BTreeMap::new()),
                changed: Notify::new(),
                shutdown,
                driver: Mutex::new(None),
            }),
        }
    }

    /// Replaces all jobs with one per active descriptor. Descriptors with an
    /// invalid trigger are logged and skipped. Returns the number loaded.
    pub async fn load_schedules(&self, descriptors: &[BackupScheduleDescriptor]) -> usize {
        self.inner.jobs.lock().await.clear();
        let mut loaded = 0;
        for descriptor in descriptors.iter().filter(|d| d.active) {
            match self.add_schedule(descriptor).await {
                Ok(()) => loaded += 1,
                Err(err) => error!("Backup schedule {} not loaded: {}", descriptor.id, err),
            }
        }
        info!("Loaded {} backup schedules", loaded);
        loaded
    }

    /// Registers the descriptor's job, replacing a job with the same key.
    pub async fn add_schedule(
        &self,
        descriptor: &BackupScheduleDescriptor,
    ) -> Result<(), ScheduleError> {
        let trigger = Trigger::from_descriptor(descriptor)?;
        let next_fire = trigger.next_after(Local::now());
        let key = job_key(descriptor.id);
        info!(
            "Added backup schedule {} for device {} ({}), next run {:?}",
            descriptor.id,
            descriptor.device_id,
            trigger.expression(),
            next_fire
        );
        self.inner.jobs.lock().await.insert(
            key,
            Job {
                device_id: descriptor.device_id,
                trigger,
                next_fire,
            },
        );
        self.inner.changed.notify_one();
        Ok(())
    }

    /// Removes the old job and adds the new one if the descriptor is active.
    pub async fn update_schedule(
        &self,
        descriptor: &BackupScheduleDescriptor,
    ) -> Result<(), ScheduleError> {
        self.remove_schedule(descriptor.id).await;
        if descriptor.active {
            self.add_schedule(descriptor).await?;
        }
        Ok(())
    }

    /// Returns whether a job was removed.
    pub async fn remove_schedule(&self, schedule_id: u64) -> bool {
        let removed = self
            .inner
            .jobs
            .lock()
            .await
            .remove(&job_key(schedule_id))
            .is_some();
        if removed {
            info!("Removed backup schedule {}", schedule_id);
            self.inner.changed.notify_one();
        }
        removed
    }

    pub async fn jobs(&self) -> Vec<JobInfo> {
        self.inner
            .jobs
            .lock()
            .await
            .iter()
            .map(|(key, job)| JobInfo {
                key: key.clone(),
                device_id: job.device_id,
                expression: job.trigger.expression().to_string(),
                next_fire: job.next_fire,
            })
            .collect()
    }

    pub async fn next_fire(&self, key: &str) -> Option<DateTime<Local>> {
        self.inner.jobs.lock().await.get(key)?.next_fire
    }

    /// Fires every job due at `now`, reschedules fired and misfired jobs, and
    /// returns the keys of the jobs started. Each backup runs on its own task.
    pub async fn run_pending(&self, now: DateTime<Local>) -> Vec<String> {
        let grace = self.inner.config.misfire_grace();
        let mut fired = Vec::new();
        {
            let mut jobs = self.inner.jobs.lock().await;
            for (key, job) in jobs.iter_mut() {
                let Some(scheduled) = job.next_fire else {
                    continue;
                };
                match due(scheduled, now, grace) {
                    FireDecision::NotDue => continue,
                    FireDecision::Run => fired.push((key.clone(), job.device_id)),
                    FireDecision::Misfired => warn!(
                        "Job {} missed its run at {} by more than {:?}, skipping",
                        key, scheduled, grace
                    ),
                }
                job.next_fire = job.trigger.next_after(now);
            }
        }

        for (key, device_id) in &fired {
            let runner = self.inner.runner.clone();
            let key = key.clone();
            let device_id = *device_id;
            tokio::spawn(async move {
                info!("Job {} backing up device {}", key, device_id);
                match runner.run_backup(device_id).await {
                    Ok(status) => info!("Job {} finished: {:?}", key, status),
                    Err(err) => error!("Job {} failed for device {}: {}", key, device_id, err),
                }
            });
        }
        fired.into_iter().map(|(key, _)| key).collect()
    }

    async fn sleep_duration(&self, now: DateTime<Local>) -> Duration {
        let next = self
            .inner
            .jobs
            .lock()
            .await
            .values()
            .filter_map(|job| job.next_fire)
            .min();
        match next {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP),
            None => MAX_SLEEP,
        }
    }

    /// Starts the driver task. Calling it again restarts the driver.
    pub async fn start(&self) {
        let scheduler = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            debug!("Backup scheduler started");
            loop {
                let now = Local::now();
                scheduler.run_pending(now).await;
                let sleep = scheduler.sleep_duration(now).await.max(Duration::from_millis(500));
                tokio::select! {
                    _ = tokio::time::sleep(sleep) => {}
                    _ = scheduler.inner.changed.notified() => {}
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Backup scheduler stopped");
        });
        if let Some(previous) = self.inner.driver.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the driver. Backups already running finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(());
        if let Some(handle) = self.inner.driver.lock().await.take() {
            let _ = handle.await;
        }
        info!("Backup scheduler shut down");
    }
}
