//! Cron dispatcher.
//!
//! For each enabled cron job, creates at most one `job_executions` row per
//! scheduled instant that has come due. The schedule cursor is the greatest
//! `scheduled_time` already materialized for the job, so any number of
//! dispatcher replicas converge on the same instants and the unique
//! constraint lets exactly one insert win.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cadence_core::{CronJob, CronSchedule};
use cadence_db::{current_tx, transaction, DatabaseRegistry, DbError, SqlParam, TxMode};

use crate::config::DispatcherConfig;
use crate::error::DispatcherError;
use crate::queries;

pub struct CronDispatcher {
    registry: Arc<DatabaseRegistry>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl CronDispatcher {
    pub fn new(
        registry: Arc<DatabaseRegistry>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            config,
            shutdown,
        }
    }

    /// Main loop. Runs until the shutdown token fires; the tick in flight
    /// finishes its inserts before the loop exits.
    pub async fn run(&self) {
        info!(
            poll_interval = self.config.poll_interval_seconds,
            max_sleep = self.config.max_sleep_seconds,
            "cron dispatcher started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let sleep = match self.tick(Utc::now()).await {
                Ok(sleep) => sleep,
                Err(DispatcherError::Db(DbError::PoolExhausted(reason))) => {
                    warn!(%reason, "connection pool exhausted, backing off");
                    StdDuration::from_secs(10)
                }
                Err(e) => {
                    error!(error = %e, "dispatch tick failed");
                    StdDuration::from_secs(self.config.poll_interval_seconds)
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        info!("cron dispatcher stopped");
    }

    /// One dispatch pass. Returns how long to sleep before the next one.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<StdDuration, DispatcherError> {
        let jobs = self.load_enabled_jobs().await?;
        debug!(count = jobs.len(), "polled enabled cron jobs");

        let mut earliest: Option<DateTime<Utc>> = None;
        for job in &jobs {
            match self.process_job(job, now).await {
                Ok(Some(next)) => {
                    earliest = Some(match earliest {
                        Some(current) if current <= next => current,
                        _ => next,
                    });
                }
                Ok(None) => {}
                Err(DispatcherError::CronParse(e)) => {
                    error!(job = %job.name, error = %e, "cron parse error, skipping");
                }
                Err(e @ DispatcherError::CronIntervalTooShort { .. }) => {
                    warn!(job = %job.name, "{e}");
                }
                Err(e @ DispatcherError::JobCreation { .. }) => {
                    error!(job = %job.name, error = %e, "job creation failed, skipping");
                }
                Err(e @ DispatcherError::Db(_)) => return Err(e),
            }
        }

        Ok(self.sleep_after_tick(earliest, now, jobs.is_empty()))
    }

    /// Dispatch every due instant for one job. Returns the job's next
    /// future firing (for sleep calculation) or None when the schedule has
    /// no future firings.
    async fn process_job(
        &self,
        job: &CronJob,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, DispatcherError> {
        let schedule = CronSchedule::parse(&job.cron_expression)?;
        self.validate_interval(job, &schedule, now)?;

        // Cursor: the greatest scheduled_time already materialized. A job
        // with no history is seeded one poll interval back so it does not
        // backfill from the beginning of time.
        let floor = now - Duration::seconds(self.config.poll_interval_seconds as i64);
        let mut cursor = self.last_scheduled_time(job.id).await?.unwrap_or(floor);

        loop {
            let Some(next) = schedule.next_after(cursor) else {
                return Ok(None);
            };
            if next > now {
                return Ok(Some(next));
            }

            if !job.allow_overlap && self.has_incomplete_execution(job.id).await? {
                debug!(
                    job = %job.name,
                    "incomplete execution present and overlap disallowed, suppressing dispatch"
                );
                return Ok(schedule.next_after(now));
            }

            let created =
                self.insert_execution(job, next)
                    .await
                    .map_err(|source| DispatcherError::JobCreation {
                        job_id: job.id,
                        scheduled_time: next,
                        source,
                    })?;
            if created {
                info!(job = %job.name, scheduled_time = %next, "created job execution");
            } else {
                debug!(job = %job.name, scheduled_time = %next, "execution already exists");
            }

            cursor = next;
        }
    }

    fn validate_interval(
        &self,
        job: &CronJob,
        schedule: &CronSchedule,
        now: DateTime<Utc>,
    ) -> Result<(), DispatcherError> {
        let minimum = self.config.min_cron_interval_seconds as i64;
        if let Some(interval) = schedule.min_interval_from(now) {
            if interval.num_seconds() < minimum {
                return Err(DispatcherError::CronIntervalTooShort {
                    name: job.name.clone(),
                    interval_seconds: interval.num_seconds(),
                    minimum_seconds: minimum,
                });
            }
        }
        Ok(())
    }

    fn sleep_after_tick(
        &self,
        earliest: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        no_jobs: bool,
    ) -> StdDuration {
        sleep_after_tick(&self.config, earliest, now, no_jobs)
    }

    async fn load_enabled_jobs(&self) -> Result<Vec<CronJob>, DispatcherError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadOnly, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let rows = tx.fetch_all(queries::enabled_jobs(kind), &[]).await?;
            let mut jobs = Vec::with_capacity(rows.len());
            for row in &rows {
                match queries::cron_job_from_row(row) {
                    Ok(job) => jobs.push(job),
                    // A corrupt row must not block the other crons.
                    Err(e) => error!(error = %e, "failed to decode cron job row, skipping"),
                }
            }
            Ok(jobs)
        })
        .await
    }

    async fn last_scheduled_time(
        &self,
        job_id: i64,
    ) -> Result<Option<DateTime<Utc>>, DispatcherError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadOnly, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let row = tx
                .fetch_one(
                    queries::last_scheduled_time(kind),
                    &[SqlParam::from(job_id)],
                )
                .await?;
            Ok(row.get_opt_datetime("last_time")?)
        })
        .await
    }

    async fn has_incomplete_execution(&self, job_id: i64) -> Result<bool, DispatcherError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadOnly, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let row = tx
                .fetch_optional(
                    queries::has_incomplete_execution(kind),
                    &[SqlParam::from(job_id)],
                )
                .await?;
            Ok(row.is_some())
        })
        .await
    }

    async fn insert_execution(
        &self,
        job: &CronJob,
        scheduled_time: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let params = [
                SqlParam::from(job.id),
                SqlParam::from(job.handler_name.as_str()),
                SqlParam::from(scheduled_time),
                SqlParam::from(job.handler_params.clone()),
                SqlParam::from(Utc::now()),
            ];
            let kind = tx.kind();
            let affected = tx
                .execute(queries::insert_cron_execution(kind), &params)
                .await?;
            Ok(affected > 0)
        })
        .await
    }
}

/// Sleep until the earliest future firing, clamped to
/// `[1s, max_sleep_seconds]`; a plain poll interval when there is nothing
/// to wait for.
fn sleep_after_tick(
    config: &DispatcherConfig,
    earliest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    no_jobs: bool,
) -> StdDuration {
    if no_jobs {
        return StdDuration::from_secs(config.poll_interval_seconds);
    }
    match earliest {
        Some(next) => {
            let wait = (next - now).num_seconds().max(1) as u64;
            StdDuration::from_secs(wait.min(config.max_sleep_seconds))
        }
        None => StdDuration::from_secs(config.poll_interval_seconds),
    }
}
