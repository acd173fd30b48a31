//! Shared domain types for the cadence batch scheduler.
//!
//! Structures here are shared between the dispatcher (creates execution
//! rows), the worker pool (drives them to a terminal status) and the admin
//! surface (CRUD over cron definitions, read access to history).

pub mod domain;
pub mod dto;
pub mod schedule;

pub use domain::cron_job::CronJob;
pub use domain::execution::{ExecutionStatus, JobExecution, ParamSource};
pub use schedule::{CronParseError, CronSchedule};
