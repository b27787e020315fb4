use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{
        mark_job_failed, mark_job_succeeded, requeue_stale_jobs, reserve_job, retry_job_after,
        JobQueueError, JobQueueResult,
    },
    models::Job,
    state::AppState,
};

pub mod summarize;

/// How a handler wants the queue to treat the job it just ran.
#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers,
            poll_interval,
        }
    }

    fn job_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Requeues jobs a crashed worker left in `processing`.
    pub fn recover_stale_jobs(&self, older_than: Duration) -> JobQueueResult<usize> {
        let mut conn = self.state.pool.get()?;
        let requeued = requeue_stale_jobs(&mut conn, older_than)?;
        if requeued > 0 {
            warn!(requeued, "requeued jobs abandoned by a previous worker");
        }
        Ok(requeued)
    }

    /// Polls the queue until `shutdown` resolves. A job that is already
    /// running is finished before the loop exits.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(job_types = ?self.job_types(), "worker started");

        loop {
            let idle = match self.run_once().await {
                Ok(ran) => !ran,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    true
                }
            };

            let pause = if idle { self.poll_interval } else { Duration::ZERO };
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = sleep(pause) => {}
            }
        }

        info!("worker stopped");
    }

    /// Reserves and executes at most one job. Returns `false` when the queue
    /// had nothing runnable.
    pub async fn run_once(&self) -> Result<bool, JobQueueError> {
        let job_types = self.job_types();
        if job_types.is_empty() {
            return Ok(false);
        }

        let reserved = {
            let mut conn = self.state.pool.get()?;
            reserve_job(&mut conn, &job_types)?
        };
        let Some(job) = reserved else {
            return Ok(false);
        };

        let outcome = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: format!("no handler registered for job type {}", job.job_type),
            },
        };
        self.record_outcome(&job, outcome)?;
        Ok(true)
    }

    fn record_outcome(&self, job: &Job, outcome: JobExecution) -> JobQueueResult<()> {
        let mut conn = self.state.pool.get()?;
        match outcome {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
            }
            JobExecution::Retry { delay, error } => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    delay_secs = delay.as_secs(),
                    %error,
                    "job will retry"
                );
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(())
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(summarize::SummarizeDocumentJob::new())]
}
