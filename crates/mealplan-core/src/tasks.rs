//! Registry of background meal plan fetches.
//!
//! A fetch is started with [`TaskRegistry::start_meal_plan_fetch`], which
//! returns a task id immediately and runs the load on a spawned tokio task.
//! Callers poll the id until the entry leaves `in-progress`. Finished
//! entries are kept for the configured retention window and then removed by
//! the sweeper.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mealplan_db::models::{MealPlan, PlanId, PlanKind};

use crate::error::PlanError;
use crate::service::Planner;

/// Lifecycle of one background fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TaskStatus {
    InProgress,
    Completed { meal_plan: MealPlan },
    Failed { message: String },
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// A task id together with its current status, as returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskRegistryConfig {
    /// Wait before the load is issued.
    pub fetch_delay: Duration,
    /// How long a finished entry stays pollable.
    pub retention: Duration,
    /// Interval between sweeper passes.
    pub sweep_interval: Duration,
}

impl Default for TaskRegistryConfig {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::ZERO,
            retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct TaskEntry {
    status: TaskStatus,
    finished_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: Arc<Mutex<HashMap<Uuid, TaskEntry>>>,
    config: TaskRegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: TaskRegistryConfig) -> Self {
        Self {
            entries: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> &TaskRegistryConfig {
        &self.config
    }

    /// Register an `in-progress` entry and drive `fetch` to completion on a
    /// spawned task. The entry is updated when `fetch` resolves.
    pub async fn spawn<F>(&self, fetch: F) -> Uuid
    where
        F: Future<Output = Result<MealPlan, PlanError>> + Send + 'static,
    {
        let task_id = Uuid::new_v4();
        self.entries.lock().await.insert(
            task_id,
            TaskEntry {
                status: TaskStatus::InProgress,
                finished_at: None,
            },
        );

        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            let status = match fetch.await {
                Ok(meal_plan) => TaskStatus::Completed { meal_plan },
                Err(err) => {
                    warn!(%task_id, error = %err, "background fetch failed");
                    TaskStatus::Failed {
                        message: err.to_string(),
                    }
                }
            };
            debug!(%task_id, ?status, "background fetch finished");

            // The entry may already be gone if the registry was cleared.
            if let Some(entry) = entries.lock().await.get_mut(&task_id) {
                entry.status = status;
                entry.finished_at = Some(Instant::now());
            }
        });

        task_id
    }

    /// Start loading meal plan `meal_id` in the background.
    pub async fn start_meal_plan_fetch(&self, planner: Planner, meal_id: PlanId) -> Uuid {
        let delay = self.config.fetch_delay;
        let task_id = self
            .spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                planner
                    .get_meal_plan(meal_id)
                    .await?
                    .ok_or(PlanError::NotFound {
                        kind: PlanKind::MealPlan,
                        id: meal_id,
                    })
            })
            .await;

        info!(%task_id, meal_id, "started meal plan fetch");
        task_id
    }

    /// Current status of `task_id`, or `None` if it is unknown or expired.
    pub async fn poll(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.entries
            .lock()
            .await
            .get(&task_id)
            .map(|entry| TaskSnapshot {
                task_id,
                status: entry.status.clone(),
            })
    }

    /// Remove finished entries older than the retention window. Returns the
    /// number of entries removed.
    pub async fn sweep(&self) -> usize {
        let retention = self.config.retention;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| match entry.finished_at {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
        before - entries.len()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.config.sweep_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = registry.sweep().await;
                        if removed > 0 {
                            debug!(removed, "expired finished tasks");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}
