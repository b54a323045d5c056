use crate::shared::util::config::WorkerConfig;
use crate::worker::error::JobError;
use crate::worker::jobs;
use crate::worker::types::JobOutcome;
use crate::worker::util::handler::{CaptureStore, JobQueue, TwitchSource};

use log::{error, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub rate_limited_sleep: Duration,
    pub page_delay: Duration,
    pub batch_delay: Duration,
    pub stale_job_timeout: Duration,
    pub stale_sweep_interval: Duration
}

impl WorkerSettings {
    pub fn from_config(config: &WorkerConfig) -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
            rate_limited_sleep: Duration::from_millis(config.rate_limited_sleep_ms),
            page_delay: Duration::from_millis(config.page_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            stale_job_timeout: Duration::from_secs(config.stale_job_timeout_seconds),
            stale_sweep_interval: Duration::from_secs(config.stale_sweep_interval_seconds.max(1))
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings::from_config(&WorkerConfig::default())
    }
}

pub struct Worker<Q, S, T> {
    queue: Q,
    store: S,
    twitch: T,
    settings: WorkerSettings
}

impl<Q: JobQueue, S: CaptureStore, T: TwitchSource> Worker<Q, S, T> {
    pub fn new(queue: Q, store: S, twitch: T, settings: WorkerSettings) -> Worker<Q, S, T> {
        Worker { queue, store, twitch, settings }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// One tick: claim at most one job, run it, record the result.
    /// Only claim and status update failures surface as `Err`.
    pub async fn process_one_job(&self) -> Result<JobOutcome, sqlx::Error> {
        let Some(job) = self.queue.claim_job().await? else {
            return Ok(JobOutcome::Idle);
        };
        info!("claimed job {} ({})", job.id, job.job_type);

        let result = match timeout(self.settings.job_timeout,
                jobs::run_job(&self.store, &self.twitch, &self.settings, &job)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::TimedOut(self.settings.job_timeout))
        };

        match result {
            Ok(()) => {
                self.queue.complete_job(job.id).await?;
                info!("job {} done", job.id);
                Ok(JobOutcome::Done(job.id))
            },
            Err(err) => {
                let message = err.to_string();
                warn!("job {} failed: {}", job.id, message);
                self.queue.fail_job(job.id, &message).await?;
                Ok(JobOutcome::Failed(job.id, message))
            }
        }
    }

    pub async fn sweep_stale_jobs(&self) -> Result<u64, sqlx::Error> {
        let failed = self.queue.fail_stale_jobs(self.settings.stale_job_timeout).await?;
        if failed > 0 {
            warn!("failed {} jobs stuck in running for over {:?}", failed, self.settings.stale_job_timeout);
        }
        Ok(failed)
    }

    /// Polls until `shutdown` flips to true. A job in flight is finished
    /// before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sweep: Option<Instant> = None;

        // Once every sender is gone no shutdown can arrive; keep to the ticker
        let mut shutdown_open = true;

        info!("worker polling every {:?}", self.settings.poll_interval);
        loop {
            if shutdown_open {
                tokio::select! {
                    _ = ticker.tick() => {},
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            warn!("shutdown channel closed, worker keeps polling");
                            shutdown_open = false;
                        }
                        if !*shutdown.borrow() {
                            continue;
                        }
                    }
                }
            } else {
                ticker.tick().await;
            }
            if *shutdown.borrow() {
                break;
            }

            if last_sweep.map_or(true, |t| t.elapsed() >= self.settings.stale_sweep_interval) {
                if let Err(err) = self.sweep_stale_jobs().await {
                    error!("stale job sweep failed: {}", err);
                }
                last_sweep = Some(Instant::now());
            }

            if let Err(err) = self.process_one_job().await {
                error!("job queue error: {}", err);
            }
        }
        info!("worker stopped");
    }
}
