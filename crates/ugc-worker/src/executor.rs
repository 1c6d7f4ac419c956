//! Job executor.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info};
use ugc_models::{JobId, JobRequest};

use crate::error::WorkerError;
use crate::pipeline::{JobPipeline, JobReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Per-job result line printed by the worker binary.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSummary {
    fn from_result(job_id: JobId, result: Result<JobReport, WorkerError>) -> Self {
        match result {
            Ok(report) => Self {
                job_id,
                status: JobStatus::Succeeded,
                output: Some(report.output),
                log_path: Some(report.log_path),
                warnings: report.warnings,
                error: None,
            },
            Err(e) => Self {
                job_id,
                status: if e.is_cancelled() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                },
                output: None,
                log_path: None,
                warnings: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Runs jobs with bounded concurrency and a shared shutdown signal.
pub struct JobExecutor {
    pipeline: Arc<JobPipeline>,
    job_semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(pipeline: JobPipeline) -> Self {
        let max_concurrent_jobs = pipeline.config().max_concurrent_jobs.max(1);
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline: Arc::new(pipeline),
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            shutdown,
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Signal shutdown. Running jobs stop at their next stage boundary,
    /// queued jobs do not start.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run every request and return one summary per request, in input order.
    pub async fn run_all(&self, requests: Vec<JobRequest>) -> Vec<JobSummary> {
        info!(
            jobs = requests.len(),
            max_concurrent_jobs = self.max_concurrent_jobs,
            "Starting job executor"
        );

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let job_id = request.job_id.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&self.job_semaphore);
            let shutdown_rx = self.shutdown.subscribe();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(WorkerError::config_error("job semaphore closed"));
                    }
                };
                pipeline.run(&request, Some(&shutdown_rx)).await
            });
            handles.push((job_id, handle));
        }

        let mut summaries = Vec::with_capacity(handles.len());
        for (job_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Job task panicked");
                    Err(WorkerError::config_error(format!("job task failed: {}", e)))
                }
            };
            summaries.push(JobSummary::from_result(job_id, result));
        }

        info!("Job executor finished");
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use std::path::Path;

    fn executor(root: &Path, max_jobs: usize) -> JobExecutor {
        let config = WorkerConfig {
            max_concurrent_jobs: max_jobs,
            work_dir: root.join("work"),
            output_dir: root.join("out"),
            ..Default::default()
        };
        JobExecutor::new(JobPipeline::new(config))
    }

    async fn passthrough_request(root: &Path, name: &str) -> JobRequest {
        let source = root.join(format!("{}.mp4", name));
        let voice = root.join(format!("{}.wav", name));
        tokio::fs::write(&source, name.as_bytes()).await.unwrap();
        tokio::fs::write(&voice, b"voice").await.unwrap();
        JobRequest::new(source, voice, "none")
    }

    #[tokio::test]
    async fn test_summaries_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 2);
        let mut requests = Vec::new();
        for name in ["a", "b", "c", "d"] {
            requests.push(passthrough_request(dir.path(), name).await);
        }
        requests.insert(2, JobRequest::new(dir.path().join("missing.mp4"), dir.path().join("x.wav"), "low"));
        let ids: Vec<JobId> = requests.iter().map(|r| r.job_id.clone()).collect();

        let summaries = executor.run_all(requests).await;

        assert_eq!(summaries.iter().map(|s| s.job_id.clone()).collect::<Vec<_>>(), ids);
        let statuses: Vec<JobStatus> = summaries.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Succeeded,
                JobStatus::Succeeded,
                JobStatus::Failed,
                JobStatus::Succeeded,
                JobStatus::Succeeded
            ]
        );
        assert!(summaries[2].error.as_deref().unwrap().contains("missing.mp4"));
        assert_eq!(executor.job_semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(dir.path(), 1);
        let requests = vec![
            passthrough_request(dir.path(), "a").await,
            passthrough_request(dir.path(), "b").await,
        ];
        executor.shutdown();
        assert!(executor.is_shutting_down());

        let summaries = executor.run_all(requests).await;
        assert!(summaries.iter().all(|s| s.status == JobStatus::Cancelled));
        assert!(summaries.iter().all(|s| s.output.is_none()));
    }

    #[test]
    fn test_summary_json() {
        let summary = JobSummary {
            job_id: JobId::from_string("j1"),
            status: JobStatus::Failed,
            output: None,
            log_path: None,
            warnings: Vec::new(),
            error: Some("Job failed while checking the input files: input file not found: x".into()),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value.get("output").is_none());
        assert!(value.get("warnings").is_none());
    }
}
