//! Configuration document loading.
//!
//! Four YAML documents live in the config directory; all but
//! `database.yaml` are optional and fall back to defaults. Component
//! documents nest their settings under a top-level key:
//!
//! ```yaml
//! # dispatcher.yaml
//! dispatcher:
//!   poll_interval_seconds: 60
//! ```

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use cadence_admin::AdminConfig;
use cadence_db::DatabasesConfig;
use cadence_dispatcher::config::QueueDispatcherConfig;
use cadence_dispatcher::DispatcherConfig;
use cadence_worker::WorkerConfig;

#[derive(Debug, Default, Deserialize)]
struct DispatcherDoc {
    #[serde(default)]
    dispatcher: DispatcherConfig,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerDoc {
    #[serde(default)]
    worker: WorkerConfig,
}

#[derive(Debug, Default, Deserialize)]
struct AdminDoc {
    #[serde(default)]
    admin: AdminConfig,
}

#[derive(Debug, Default, Deserialize)]
struct QueueDoc {
    #[serde(default)]
    queue_dispatcher: QueueDispatcherConfig,
}

/// Everything the entry point needs, loaded and defaulted.
pub struct Documents {
    pub databases: DatabasesConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub admin: AdminConfig,
    pub queue: QueueDispatcherConfig,
}

impl Documents {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let databases: DatabasesConfig = load_required(&dir.join("database.yaml"))?;
        let dispatcher: DispatcherDoc = load_optional(&dir.join("dispatcher.yaml"))?;
        let worker: WorkerDoc = load_optional(&dir.join("worker.yaml"))?;
        let admin: AdminDoc = load_optional(&dir.join("admin.yaml"))?;
        let queue: QueueDoc = load_optional(&dir.join("queue.yaml"))?;

        Ok(Self {
            databases,
            dispatcher: dispatcher.dispatcher,
            worker: worker.worker,
            admin: admin.admin,
            queue: queue.queue_dispatcher,
        })
    }
}

fn load_required<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_optional<T: DeserializeOwned + Default>(path: &Path) -> anyhow::Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    load_required(path)
}
