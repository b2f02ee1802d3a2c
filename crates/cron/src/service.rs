//! The scheduler loop: wake sessions on their configured schedule.
//!
//! One job names a `session_key` and a `message`; on its schedule the
//! message is delivered into that session as an [`AgentService::invoke`]
//! call, exactly as if an operator or channel had sent it. There is no
//! separate "cron payload" shape — a wakeup is just a turn.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use relaykit_service_traits::AgentService;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    Error, Result,
    schedule::compute_next_run,
    store::CronStore,
    types::{CronRunRecord, CronStatus, RunStatus},
};

/// Upper bound on how long a tick ever sleeps when no job is due soon.
/// Keeps the loop responsive to jobs created or edited while it sleeps.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Drives scheduled wakeups against a [`CronStore`] and an [`AgentService`].
pub struct CronService {
    store: Arc<dyn CronStore>,
    agent: Arc<dyn AgentService>,
    running: AtomicBool,
}

impl CronService {
    pub fn new(store: Arc<dyn CronStore>, agent: Arc<dyn AgentService>) -> Self {
        Self {
            store,
            agent,
            running: AtomicBool::new(false),
        }
    }

    /// Run until `shutdown` is signalled. Each iteration fires every job
    /// that is due, then sleeps until the next one is, capped at
    /// [`MAX_POLL_INTERVAL`] so newly created jobs are never missed by
    /// more than that margin.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let result = loop {
            let sleep_for = match self.tick().await {
                Ok(duration) => duration,
                Err(err) => {
                    warn!(error = %err, "cron tick failed, retrying after backoff");
                    Duration::from_secs(5)
                },
            };
            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {},
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                },
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// One scan over all jobs: fire everything due, report how long until
    /// the next job (or [`MAX_POLL_INTERVAL`], whichever is sooner).
    async fn tick(&self) -> Result<Duration> {
        let now = now_ms();
        let jobs = self.store.load_jobs().await?;
        let mut next_wake = MAX_POLL_INTERVAL;

        for job in jobs {
            if !job.enabled {
                continue;
            }
            let due_at = match job.state.next_run_at_ms {
                Some(at) => at,
                None => match compute_next_run(&job.schedule, now)
                    .map_err(|e| Error::invalid_schedule(e.to_string()))?
                {
                    Some(at) => at,
                    None => continue, // one-shot already elapsed with no cached state
                },
            };

            if due_at <= now {
                self.fire(job).await?;
            } else {
                next_wake = next_wake.min(Duration::from_millis(due_at - now));
            }
        }

        Ok(next_wake)
    }

    /// Deliver a single job's message into its session and record the run.
    async fn fire(&self, mut job: crate::types::CronJob) -> Result<()> {
        let started_at_ms = now_ms();
        let params = serde_json::json!({
            "sessionKey": job.session_key,
            "message": job.message,
        });

        let outcome = self.agent.invoke(params).await;
        let finished_at_ms = now_ms();
        let (status, error) = match &outcome {
            Ok(_) => (RunStatus::Ok, None),
            Err(err) => (RunStatus::Error, Some(err.to_string())),
        };

        info!(job_id = %job.id, session_key = %job.session_key, ?status, "cron job fired");

        self.store
            .append_run(
                &job.id,
                &CronRunRecord {
                    job_id: job.id.clone(),
                    started_at_ms,
                    finished_at_ms,
                    status,
                    error: error.clone(),
                },
            )
            .await?;

        if job.delete_after_run && status == RunStatus::Ok {
            self.store.delete_job(&job.id).await?;
            return Ok(());
        }

        job.state.last_run_at_ms = Some(finished_at_ms);
        job.state.last_status = Some(status);
        job.state.last_error = error;
        job.state.next_run_at_ms = compute_next_run(&job.schedule, finished_at_ms)
            .map_err(|e| Error::invalid_schedule(e.to_string()))?;
        self.store.update_job(&job).await?;

        Ok(())
    }

    /// Snapshot of the scheduler for `cron.status`-style reporting.
    pub async fn status(&self) -> Result<CronStatus> {
        let jobs = self.store.load_jobs().await?;
        let enabled_count = jobs.iter().filter(|j| j.enabled).count();
        let next_run_at_ms = jobs
            .iter()
            .filter(|j| j.enabled)
            .filter_map(|j| j.state.next_run_at_ms)
            .min();

        Ok(CronStatus {
            running: self.running.load(Ordering::SeqCst),
            job_count: jobs.len(),
            enabled_count,
            next_run_at_ms,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use relaykit_service_traits::{ServiceError, ServiceResult};
    use serde_json::Value;

    use super::*;
    use crate::{
        store_memory::InMemoryStore,
        types::{CronJob, CronJobState, CronSchedule},
    };

    struct RecordingAgent {
        invocations: std::sync::Mutex<Vec<Value>>,
        fail: bool,
    }

    #[async_trait]
    impl AgentService for RecordingAgent {
        async fn invoke(&self, params: Value) -> ServiceResult {
            self.invocations.lock().unwrap().push(params);
            if self.fail {
                return Err(ServiceError::message("boom"));
            }
            Ok(serde_json::json!({"turnId": "t1"}))
        }

        async fn wait(&self, _params: Value) -> ServiceResult {
            Ok(Value::Null)
        }

        async fn cancel(&self, _params: Value) -> ServiceResult {
            Ok(Value::Null)
        }
    }

    fn due_job(id: &str, now: u64) -> CronJob {
        CronJob {
            id: id.into(),
            name: "wake".into(),
            session_key: "telegram:acct1:dm:user1".into(),
            message: "good morning".into(),
            enabled: true,
            delete_after_run: false,
            schedule: CronSchedule::At { at_ms: now - 1 },
            state: CronJobState::default(),
            created_at_ms: now - 1000,
            updated_at_ms: now - 1000,
        }
    }

    #[tokio::test]
    async fn tick_fires_due_job_and_records_success() {
        let store: Arc<dyn CronStore> = Arc::new(InMemoryStore::new());
        let now = now_ms();
        store.save_job(&due_job("1", now)).await.unwrap();

        let agent = Arc::new(RecordingAgent {
            invocations: std::sync::Mutex::new(Vec::new()),
            fail: false,
        });
        let service = CronService::new(store.clone(), agent.clone());
        service.tick().await.unwrap();

        assert_eq!(agent.invocations.lock().unwrap().len(), 1);
        let runs = store.get_runs("1", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn one_shot_job_deletes_itself_after_success() {
        let store: Arc<dyn CronStore> = Arc::new(InMemoryStore::new());
        let now = now_ms();
        let mut job = due_job("1", now);
        job.delete_after_run = true;
        store.save_job(&job).await.unwrap();

        let agent = Arc::new(RecordingAgent {
            invocations: std::sync::Mutex::new(Vec::new()),
            fail: false,
        });
        let service = CronService::new(store.clone(), agent);
        service.tick().await.unwrap();

        assert!(store.load_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_invoke_is_recorded_and_job_reschedules() {
        let store: Arc<dyn CronStore> = Arc::new(InMemoryStore::new());
        let now = now_ms();
        let mut job = due_job("1", now);
        job.schedule = CronSchedule::Every {
            every_ms: 60_000,
            anchor_ms: None,
        };
        store.save_job(&job).await.unwrap();

        let agent = Arc::new(RecordingAgent {
            invocations: std::sync::Mutex::new(Vec::new()),
            fail: true,
        });
        let service = CronService::new(store.clone(), agent);
        service.tick().await.unwrap();

        let runs = store.get_runs("1", 10).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Error);
        let jobs = store.load_jobs().await.unwrap();
        assert!(jobs[0].state.next_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn disabled_job_never_fires() {
        let store: Arc<dyn CronStore> = Arc::new(InMemoryStore::new());
        let now = now_ms();
        let mut job = due_job("1", now);
        job.enabled = false;
        store.save_job(&job).await.unwrap();

        let agent = Arc::new(RecordingAgent {
            invocations: std::sync::Mutex::new(Vec::new()),
            fail: false,
        });
        let service = CronService::new(store.clone(), agent.clone());
        service.tick().await.unwrap();

        assert!(agent.invocations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_reports_job_counts() {
        let store: Arc<dyn CronStore> = Arc::new(InMemoryStore::new());
        let now = now_ms();
        store.save_job(&due_job("1", now)).await.unwrap();
        let mut disabled = due_job("2", now);
        disabled.enabled = false;
        store.save_job(&disabled).await.unwrap();

        let agent = Arc::new(RecordingAgent {
            invocations: std::sync::Mutex::new(Vec::new()),
            fail: false,
        });
        let service = CronService::new(store, agent);
        let status = service.status().await.unwrap();
        assert_eq!(status.job_count, 2);
        assert_eq!(status.enabled_count, 1);
    }
}
