//! Cron job management.

use chrono::Utc;
use thiserror::Error;

use cadence_core::dto::cron::{CreateCronJob, UpdateCronJob};
use cadence_core::dto::page::Page;
use cadence_core::{CronJob, CronSchedule};
use cadence_db::{current_tx, transaction, DbError, TxMode};

use crate::state::AdminState;

#[derive(Debug, Error)]
pub enum CronServiceError {
    #[error("cron job {0} not found")]
    NotFound(i64),

    #[error("cron job name '{0}' already exists")]
    DuplicateName(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Reject unparseable expressions and schedules tighter than the
/// configured minimum interval; the dispatcher refuses to run those with
/// the same threshold.
fn validate_expression(
    expression: &str,
    min_interval_seconds: u64,
) -> Result<(), CronServiceError> {
    let schedule = CronSchedule::parse(expression)
        .map_err(|e| CronServiceError::Validation(e.to_string()))?;
    if let Some(interval) = schedule.min_interval_from(Utc::now()) {
        if interval.num_seconds() < min_interval_seconds as i64 {
            return Err(CronServiceError::Validation(format!(
                "cron interval must be at least {min_interval_seconds} seconds, got {}",
                interval.num_seconds()
            )));
        }
    }
    Ok(())
}

fn validate_policy(max_retry: i32, timeout_seconds: i32) -> Result<(), CronServiceError> {
    if max_retry < 0 {
        return Err(CronServiceError::Validation(
            "max_retry must be non-negative".to_string(),
        ));
    }
    if timeout_seconds <= 0 {
        return Err(CronServiceError::Validation(
            "timeout_seconds must be positive".to_string(),
        ));
    }
    Ok(())
}

pub async fn list(
    state: &AdminState,
    page: i64,
    size: i64,
    is_enabled: Option<bool>,
) -> Result<Page<CronJob>, CronServiceError> {
    let (page, size) = super::normalize_page(page, size);
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadOnly, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        let total = crate::repository::cron::count(&mut tx, is_enabled).await?;
        let items =
            crate::repository::cron::list_paged(&mut tx, is_enabled, size, (page - 1) * size)
                .await?;
        Ok(Page::new(items, total, page, size))
    })
    .await
}

pub async fn get(state: &AdminState, id: i64) -> Result<CronJob, CronServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadOnly, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))
    })
    .await
}

pub async fn create(state: &AdminState, req: CreateCronJob) -> Result<CronJob, CronServiceError> {
    if req.name.trim().is_empty() {
        return Err(CronServiceError::Validation("name must not be empty".to_string()));
    }
    if req.handler_name.trim().is_empty() {
        return Err(CronServiceError::Validation(
            "handler_name must not be empty".to_string(),
        ));
    }
    validate_expression(&req.cron_expression, state.min_cron_interval_seconds)?;
    validate_policy(req.max_retry, req.timeout_seconds)?;

    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;

        if crate::repository::cron::find_by_name(&mut tx, &req.name)
            .await?
            .is_some()
        {
            return Err(CronServiceError::DuplicateName(req.name.clone()));
        }

        let now = Utc::now();
        let id = crate::repository::cron::insert(
            &mut tx,
            &req.name,
            req.description.clone(),
            &req.cron_expression,
            &req.handler_name,
            req.handler_params.clone(),
            req.is_enabled,
            req.allow_overlap,
            req.max_retry,
            req.timeout_seconds,
            now,
        )
        .await?;

        tracing::info!(cron_id = id, name = %req.name, "created cron job");
        crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))
    })
    .await
}

pub async fn update(
    state: &AdminState,
    id: i64,
    req: UpdateCronJob,
) -> Result<CronJob, CronServiceError> {
    if let Some(expression) = &req.cron_expression {
        validate_expression(expression, state.min_cron_interval_seconds)?;
    }

    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;

        let mut job = crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))?;

        if let Some(name) = &req.name {
            if name != &job.name {
                if crate::repository::cron::find_by_name(&mut tx, name)
                    .await?
                    .is_some()
                {
                    return Err(CronServiceError::DuplicateName(name.clone()));
                }
                job.name = name.clone();
            }
        }
        if let Some(description) = &req.description {
            job.description = Some(description.clone());
        }
        if let Some(expression) = &req.cron_expression {
            job.cron_expression = expression.clone();
        }
        if let Some(handler_name) = &req.handler_name {
            job.handler_name = handler_name.clone();
        }
        if let Some(handler_params) = &req.handler_params {
            job.handler_params = Some(handler_params.clone());
        }
        if let Some(is_enabled) = req.is_enabled {
            job.is_enabled = is_enabled;
        }
        if let Some(allow_overlap) = req.allow_overlap {
            job.allow_overlap = allow_overlap;
        }
        if let Some(max_retry) = req.max_retry {
            job.max_retry = max_retry;
        }
        if let Some(timeout_seconds) = req.timeout_seconds {
            job.timeout_seconds = timeout_seconds;
        }
        validate_policy(job.max_retry, job.timeout_seconds)?;
        job.updated_at = Utc::now();

        crate::repository::cron::update(&mut tx, &job).await?;
        tracing::info!(cron_id = id, "updated cron job");

        crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))
    })
    .await
}

pub async fn toggle(state: &AdminState, id: i64) -> Result<CronJob, CronServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;

        let job = crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))?;

        let enabled = !job.is_enabled;
        crate::repository::cron::set_enabled(&mut tx, id, enabled, Utc::now()).await?;
        tracing::info!(cron_id = id, is_enabled = enabled, "toggled cron job");

        crate::repository::cron::find_by_id(&mut tx, id)
            .await?
            .ok_or(CronServiceError::NotFound(id))
    })
    .await
}

pub async fn delete(state: &AdminState, id: i64) -> Result<(), CronServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        if !crate::repository::cron::delete(&mut tx, id).await? {
            return Err(CronServiceError::NotFound(id));
        }
        tracing::info!(cron_id = id, "deleted cron job");
        Ok(())
    })
    .await
}
