use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedMetrics {
    pub requests_per_second: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Record of one job execution, in the shape it is reported on `/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRun {
    pub job: String,
    pub run_start_time: DateTime<Utc>,
    pub run_end_time: DateTime<Utc>,
    pub status: String,
    pub processed_count: u64,
    pub failed_count: u64,
    pub error_message: Option<String>,
}

impl JobRun {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            run_start_time: Utc::now(),
            run_end_time: Utc::now(),
            status: "running".to_string(),
            processed_count: 0,
            failed_count: 0,
            error_message: None,
        }
    }

    pub fn complete(&mut self, processed: u64, failed: u64) {
        self.run_end_time = Utc::now();
        self.status = "success".to_string();
        self.processed_count = processed;
        self.failed_count = failed;
    }

    pub fn fail(&mut self, error: &str) {
        self.run_end_time = Utc::now();
        self.status = "error".to_string();
        self.error_message = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub feed: FeedMetrics,
    pub jobs: Vec<JobRun>,
}

#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<FeedMetrics>>,
    last_update: Arc<Mutex<Instant>>,
    jobs: Arc<Mutex<BTreeMap<String, JobRun>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(FeedMetrics::default())),
            last_update: Arc::new(Mutex::new(Instant::now())),
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn record_request_start(&self) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        lock(&self.metrics).rate_limiter_wait_time_ms = duration.as_millis() as f64;
    }

    pub fn record_error(&self, error: String) {
        let mut metrics = lock(&self.metrics);
        metrics.last_error = Some(error);
        metrics.last_error_time = Some(Utc::now());
    }

    /// Keeps the latest run of each job.
    pub fn record_job_run(&self, run: JobRun) {
        lock(&self.jobs).insert(run.job.clone(), run);
    }

    pub fn get_metrics(&self) -> FeedMetrics {
        lock(&self.metrics).clone()
    }

    pub fn job_runs(&self) -> Vec<JobRun> {
        lock(&self.jobs).values().cloned().collect()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            feed: self.get_metrics(),
            jobs: self.job_runs(),
        }
    }
}

pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, success: bool) {
        let duration = self.start_time.elapsed();
        let mut metrics = lock(&self.collector.metrics);

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        // Exponential moving average
        let alpha = 0.1;
        metrics.avg_response_time_ms =
            metrics.avg_response_time_ms * (1.0 - alpha) + duration.as_millis() as f64 * alpha;

        let mut last_update = lock(&self.collector.last_update);
        let elapsed = last_update.elapsed();
        if elapsed >= Duration::from_secs(1) {
            metrics.requests_per_second = metrics.total_requests as f64 / elapsed.as_secs_f64();
            *last_update = Instant::now();
        }
    }
}
