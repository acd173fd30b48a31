//! Producers of PENDING execution rows.
//!
//! [`CronDispatcher`] polls `cron_jobs` and materializes due schedule
//! points; [`queue::QueueDispatcher`] converts message-bus events. Both
//! coordinate with replicas only through the database: the
//! `UNIQUE(job_id, scheduled_time)` constraint plus conflict-ignore inserts
//! guarantee at most one row per schedule point no matter how many
//! dispatcher processes race on the same tick.

pub mod config;
pub mod cron;
pub mod error;
pub mod queue;

mod queries;

pub use config::DispatcherConfig;
pub use cron::CronDispatcher;
pub use error::DispatcherError;
