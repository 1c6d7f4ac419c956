//! Command-line arguments of the worker binary.
//!
//! Flags override the matching environment settings in [`WorkerConfig`].

use clap::Parser;
use std::path::PathBuf;

use crate::WorkerConfig;

#[derive(Debug, Parser)]
#[command(name = "ugc-worker")]
#[command(about = "Randomize UGC videos and composite keyword-timed product overlays")]
pub struct Cli {
    /// Job request files (JSON), run in the given order
    #[arg(required = true, value_name = "JOB_FILE")]
    pub jobs: Vec<PathBuf>,

    /// Jobs allowed to run at once (overrides WORKER_MAX_JOBS)
    #[arg(long = "max-jobs", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_jobs: Option<u16>,

    /// Serve Prometheus metrics on this port (overrides METRICS_PORT)
    #[arg(long = "metrics-port")]
    pub metrics_port: Option<u16>,

    /// Emit JSON logs regardless of LOG_FORMAT
    #[arg(long = "json-logs", default_value_t = false)]
    pub json_logs: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut WorkerConfig) {
        if let Some(max_jobs) = self.max_jobs {
            config.max_concurrent_jobs = usize::from(max_jobs);
        }
        if self.metrics_port.is_some() {
            config.metrics_port = self.metrics_port;
        }
        if self.json_logs {
            config.json_logs = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_files_and_overrides() {
        let cli = Cli::try_parse_from([
            "ugc-worker",
            "--max-jobs",
            "4",
            "--metrics-port",
            "9100",
            "a.json",
            "b.json",
        ])
        .unwrap();
        assert_eq!(cli.jobs, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);

        let mut config = WorkerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.metrics_port, Some(9100));
        assert!(!config.json_logs);
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let cli = Cli::try_parse_from(["ugc-worker", "job.json"]).unwrap();
        let mut config = WorkerConfig::default();
        let before = format!("{:?}", config);
        cli.apply(&mut config);
        assert_eq!(format!("{:?}", config), before);
    }

    #[test]
    fn test_rejects_bad_invocations() {
        assert!(Cli::try_parse_from(["ugc-worker"]).is_err());
        assert!(Cli::try_parse_from(["ugc-worker", "--max-jobs", "0", "job.json"]).is_err());
        assert!(Cli::try_parse_from(["ugc-worker", "--metrics-port", "http", "job.json"]).is_err());
        assert!(Cli::try_parse_from(["ugc-worker", "--bogus", "job.json"]).is_err());
    }
}
