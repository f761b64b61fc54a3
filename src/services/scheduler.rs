//! Background refresh loop for the wind cache.
//!
//! Architecture:
//! - Sleeps for the refresh interval, then runs one cycle:
//!   `ensure_range(now, now + window)` followed by `cleanup(now - window)`
//! - The next sleep only starts once the previous cycle has settled, so
//!   cycles never overlap
//! - `stop()` only cancels the pending sleep; a cycle already running is
//!   allowed to finish (fetches are bounded by the HTTP timeout)
//! - Errors are logged and recorded in the status, never propagated
//! - State is in-memory (`Arc<RwLock<RefreshStatus>>`), exposed via the
//!   status endpoint

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::services::weather_cache::{EnsureReport, WeatherCache};

// ---------------------------------------------------------------------------
// Refresh status (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// Refresh loop state, exposed via the status endpoint.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RefreshStatus {
    pub active: bool,
    pub next_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    pub last_cycle_completed_at: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: Option<u64>,
    pub total_cycles: u64,
    /// Slots fetched / skipped / failed during the last cycle.
    pub last_fetched: usize,
    pub last_skipped: usize,
    pub last_failed: usize,
    pub last_error: Option<String>,
}

/// Shared refresh status handle.
pub type SharedRefreshStatus = Arc<RwLock<RefreshStatus>>;

/// How often to refresh and how far each cycle looks.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSchedule {
    pub interval: Duration,
    /// Forward download window; the cleanup horizon trails now by the same amount.
    pub window: chrono::Duration,
}

// ---------------------------------------------------------------------------
// Refresh cycle
// ---------------------------------------------------------------------------

/// Run one refresh cycle: fill the forward window, then retire old data.
pub async fn run_cycle(
    cache: &WeatherCache,
    window: chrono::Duration,
    status: &SharedRefreshStatus,
) {
    let started = Utc::now();
    {
        let mut s = status.write().await;
        s.last_cycle_started_at = Some(started);
    }

    let mut last_error = None;
    let report = match cache.ensure_range(started, started + window).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Wind refresh: ensure_range failed: {}", e);
            last_error = Some(e.to_string());
            EnsureReport::default()
        }
    };
    if let Err(e) = cache.cleanup(Some(Utc::now() - window)).await {
        tracing::error!("Wind refresh: cleanup failed: {}", e);
        last_error = Some(e.to_string());
    }

    let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
    {
        let mut s = status.write().await;
        s.last_cycle_completed_at = Some(Utc::now());
        s.last_cycle_duration_ms = Some(duration_ms);
        s.total_cycles += 1;
        s.last_fetched = report.fetched;
        s.last_skipped = report.skipped;
        s.last_failed = report.failed;
        s.last_error = last_error;
    }

    tracing::info!("Wind refresh: cycle complete in {}ms", duration_ms);
}

/// Startup job: ensure near-term coverage once, then clean up.
pub async fn run_startup(
    cache: Arc<WeatherCache>,
    startup_window: chrono::Duration,
    retention_window: chrono::Duration,
) {
    let now = Utc::now();
    if let Err(e) = cache.ensure_range(now, now + startup_window).await {
        tracing::error!("Wind startup: ensure_range failed: {}", e);
    }
    if let Err(e) = cache.cleanup(Some(now - retention_window)).await {
        tracing::error!("Wind startup: cleanup failed: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Auto-download loop
// ---------------------------------------------------------------------------

/// Handle to the running refresh loop.
pub struct AutoDownload {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoDownload {
    /// Spawn the refresh loop. It must be called from within a tokio runtime.
    pub fn start(
        cache: Arc<WeatherCache>,
        schedule: RefreshSchedule,
        status: SharedRefreshStatus,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(cache, schedule, status, stop_rx));
        Self { stop_tx, handle }
    }

    /// Cancel the next scheduled cycle. Does not interrupt a running one.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait until the loop has exited.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            tracing::error!("Wind refresh loop panicked: {}", e);
        }
    }
}

async fn run_loop(
    cache: Arc<WeatherCache>,
    schedule: RefreshSchedule,
    status: SharedRefreshStatus,
    mut stop_rx: watch::Receiver<bool>,
) {
    tracing::info!(
        "Wind refresh loop started (every {}s, window {}h)",
        schedule.interval.as_secs(),
        schedule.window.num_hours()
    );
    {
        let mut s = status.write().await;
        s.active = true;
    }

    loop {
        {
            let mut s = status.write().await;
            s.next_cycle_at = chrono::Duration::from_std(schedule.interval)
                .ok()
                .map(|d| Utc::now() + d);
        }

        tokio::select! {
            _ = tokio::time::sleep(schedule.interval) => {}
            // Fires on stop() and when the handle is dropped.
            _ = stop_rx.changed() => break,
        }
        if *stop_rx.borrow() {
            break;
        }

        run_cycle(&cache, schedule.window, &status).await;
    }

    let mut s = status.write().await;
    s.active = false;
    s.next_cycle_at = None;
    tracing::info!("Wind refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gfs::{GfsClient, FETCH_TIMEOUT};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cache_for(server: &MockServer, root: &std::path::Path) -> Arc<WeatherCache> {
        let client = GfsClient::new(&format!("{}/filter", server.uri()), FETCH_TIMEOUT).unwrap();
        Arc::new(WeatherCache::new(root, client, chrono::Duration::hours(6)))
    }

    async fn wait_for_cycles(status: &SharedRefreshStatus, n: u64) {
        for _ in 0..200 {
            if status.read().await.total_cycles >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("refresh loop did not complete {} cycles in time", n);
    }

    #[tokio::test]
    async fn test_run_cycle_records_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GRIB".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());
        let status = SharedRefreshStatus::default();

        run_cycle(&cache, chrono::Duration::hours(2), &status).await;

        let s = status.read().await;
        assert_eq!(s.total_cycles, 1);
        assert_eq!(s.last_fetched + s.last_skipped, 3);
        assert_eq!(s.last_failed, 0);
        assert!(s.last_error.is_none());
        assert!(s.last_cycle_completed_at.is_some());
    }

    #[tokio::test]
    async fn test_run_cycle_swallows_fetch_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());
        let status = SharedRefreshStatus::default();

        run_cycle(&cache, chrono::Duration::hours(1), &status).await;

        let s = status.read().await;
        assert_eq!(s.total_cycles, 1);
        assert_eq!(s.last_failed, 2);
    }

    #[tokio::test]
    async fn test_auto_download_runs_cycles_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GRIB".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());
        let status = SharedRefreshStatus::default();

        let auto = AutoDownload::start(
            cache,
            RefreshSchedule {
                interval: Duration::from_millis(20),
                window: chrono::Duration::hours(1),
            },
            status.clone(),
        );
        wait_for_cycles(&status, 2).await;
        auto.shutdown().await;

        let s = status.read().await;
        assert!(!s.active);
        assert!(s.next_cycle_at.is_none());
    }

    #[tokio::test]
    async fn test_stop_before_first_tick_runs_no_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());
        let status = SharedRefreshStatus::default();

        let auto = AutoDownload::start(
            cache,
            RefreshSchedule {
                interval: Duration::from_secs(3600),
                window: chrono::Duration::hours(1),
            },
            status.clone(),
        );
        auto.shutdown().await;

        assert_eq!(status.read().await.total_cycles, 0);
    }

    #[tokio::test]
    async fn test_stop_during_cycle_lets_it_finish() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"GRIB".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(2)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());
        let status = SharedRefreshStatus::default();

        let auto = AutoDownload::start(
            cache.clone(),
            RefreshSchedule {
                interval: Duration::from_millis(20),
                window: chrono::Duration::hours(1),
            },
            status.clone(),
        );

        for _ in 0..200 {
            if status.read().await.last_cycle_started_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(status.read().await.last_cycle_started_at.is_some());
        assert_eq!(status.read().await.total_cycles, 0);

        auto.stop();
        auto.shutdown().await;

        let s = status.read().await;
        assert_eq!(s.total_cycles, 1);
        assert_eq!(s.last_fetched, 2);
        assert!(!s.active);
        assert!(cache.lookup(Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_startup_fills_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GRIB".to_vec()))
            .expect(2)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(&server, dir.path());

        run_startup(
            cache.clone(),
            chrono::Duration::hours(1),
            chrono::Duration::hours(24),
        )
        .await;

        assert!(cache.lookup(Utc::now()).await.is_ok());
    }
}
