//! Directory-backed wind forecast cache.
//!
//! Files live under `<weather_root>/wind/<YYYYMMDD>/` (see [`crate::services::slots`]).
//! Several model runs may cover the same target hour; [`WeatherCache::cleanup`]
//! keeps only the freshest one and drops whole days past the retention cutoff.
//!
//! Downloads are deduplicated per target hour through an in-flight set, so an
//! overlapping manual request and scheduled refresh never fetch the same slot
//! twice.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::services::gfs::GfsClient;
use crate::services::slots::{
    day_dir_name, floor_to_hour, hourly_slots, parse_day_dir, ModelRun, SlotFile,
};

/// Errors raised by the wind cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("from must be earlier than to, got {from} -> {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("No cached wind data for {hour}")]
    NoData { hour: DateTime<Utc> },

    #[error("Wind fetch failed: {0}")]
    Fetch(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a single `download` call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A new file was fetched and written.
    Fetched { path: PathBuf, bytes: usize },
    /// The slot file already exists and overwrite was not requested.
    AlreadyCached,
    /// Another download for the same target hour is outstanding.
    InFlight,
}

/// Per-call summary of `ensure_range`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    pub requested: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-call summary of `cleanup`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub days_removed: usize,
    pub files_removed: usize,
    /// Days or files that could not be removed; the pass carries on past them.
    pub failures: usize,
}

/// A slot found on disk by `lookup`.
#[derive(Debug, Clone)]
pub struct CachedSlot {
    pub target_hour: DateTime<Utc>,
    /// `None` when the file is an analysis.
    pub run_time: Option<DateTime<Utc>>,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Wind forecast cache manager.
pub struct WeatherCache {
    wind_dir: PathBuf,
    client: GfsClient,
    publication_lag: Duration,
    pending: DashSet<DateTime<Utc>>,
}

/// Removes a target hour from the in-flight set when the download ends,
/// whichever way it ends.
struct InFlightClaim<'a> {
    pending: &'a DashSet<DateTime<Utc>>,
    hour: DateTime<Utc>,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.hour);
    }
}

impl WeatherCache {
    pub fn new(weather_root: &Path, client: GfsClient, publication_lag: Duration) -> Self {
        Self {
            wind_dir: weather_root.join("wind"),
            client,
            publication_lag,
            pending: DashSet::new(),
        }
    }

    pub fn wind_dir(&self) -> &Path {
        &self.wind_dir
    }

    /// Test-and-set on the in-flight set.
    fn claim(&self, hour: DateTime<Utc>) -> Option<InFlightClaim<'_>> {
        self.pending.insert(hour).then(|| InFlightClaim {
            pending: &self.pending,
            hour,
        })
    }

    /// Download every hourly slot from `floor(from)` through `floor(to)`.
    ///
    /// Slots are fetched one after another. A failed slot is logged and
    /// counted; it does not stop the remaining ones.
    pub async fn ensure_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EnsureReport, CacheError> {
        if from >= to {
            return Err(CacheError::InvalidRange { from, to });
        }

        let slots = hourly_slots(from, to);
        let mut report = EnsureReport {
            requested: slots.len(),
            ..Default::default()
        };

        for slot in slots {
            match self.download(slot, false).await {
                Ok(DownloadOutcome::Fetched { .. }) => report.fetched += 1,
                Ok(DownloadOutcome::AlreadyCached | DownloadOutcome::InFlight) => {
                    report.skipped += 1
                }
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            "Wind: data from {} to {} ensured ({} fetched, {} skipped, {} failed)",
            floor_to_hour(from),
            to,
            report.fetched,
            report.skipped,
            report.failed,
        );
        Ok(report)
    }

    /// Download the slot for `target`, using the freshest run published as of now.
    pub async fn download(
        &self,
        target: DateTime<Utc>,
        overwrite: bool,
    ) -> Result<DownloadOutcome, CacheError> {
        self.download_at(target, Utc::now(), overwrite).await
    }

    pub(crate) async fn download_at(
        &self,
        target: DateTime<Utc>,
        now: DateTime<Utc>,
        overwrite: bool,
    ) -> Result<DownloadOutcome, CacheError> {
        let target_hour = floor_to_hour(target);
        let run = ModelRun::for_target(target_hour, now, self.publication_lag);
        let slot = SlotFile::new(target_hour, &run);
        let description = run.describe(target_hour);

        let Some(_claim) = self.claim(target_hour) else {
            tracing::debug!("Wind: download for {} already in flight", description);
            return Ok(DownloadOutcome::InFlight);
        };

        let file_path = self.wind_dir.join(slot.relative_path());
        if !overwrite && tokio::fs::try_exists(&file_path).await? {
            return Ok(DownloadOutcome::AlreadyCached);
        }

        tracing::debug!("Wind: requesting grib for {}...", description);
        let payload = match self.client.fetch(&run).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Wind: can't download data for {}: {}", description, e);
                return Err(e);
            }
        };

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, &payload).await?;
        tracing::debug!(
            "Wind: saved grib file for {} ({} bytes)",
            description,
            payload.len()
        );

        Ok(DownloadOutcome::Fetched {
            path: file_path,
            bytes: payload.len(),
        })
    }

    /// Retire old data.
    ///
    /// Day directories dated before `delete_before`'s day are removed
    /// entirely. In every remaining day, only the freshest file per target
    /// hour is kept. `None` skips the day-level pass.
    pub async fn cleanup(
        &self,
        delete_before: Option<DateTime<Utc>>,
    ) -> Result<CleanupReport, CacheError> {
        let mut report = CleanupReport::default();
        if !tokio::fs::try_exists(&self.wind_dir).await? {
            return Ok(report);
        }

        let cutoff_day = delete_before.map(|d| d.date_naive());
        let mut days = tokio::fs::read_dir(&self.wind_dir).await?;
        while let Some(entry) = days.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(day) = parse_day_dir(&name) else {
                tracing::warn!("Wind: ignoring unexpected directory {}", name);
                continue;
            };

            if cutoff_day.is_some_and(|cutoff| day < cutoff) {
                match tokio::fs::remove_dir_all(entry.path()).await {
                    Ok(()) => {
                        tracing::debug!("Wind: removed outdated day {}", name);
                        report.days_removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("Wind: can't remove outdated day {}: {}", name, e);
                        report.failures += 1;
                    }
                }
            } else if let Err(e) = dedupe_day(day, &entry.path(), &mut report).await {
                tracing::warn!("Wind: can't clean up day {}: {}", name, e);
                report.failures += 1;
            }
        }

        tracing::info!(
            "Wind: cache cleaned up ({} days, {} superseded files removed, {} failures)",
            report.days_removed,
            report.files_removed,
            report.failures,
        );
        Ok(report)
    }

    /// Find the cached file for `hour`. Never downloads.
    pub async fn lookup(&self, hour: DateTime<Utc>) -> Result<CachedSlot, CacheError> {
        let hour = floor_to_hour(hour);
        let day_path = self.wind_dir.join(day_dir_name(hour));
        if !tokio::fs::try_exists(&day_path).await? {
            return Err(CacheError::NoData { hour });
        }

        let (slot, path) = slots_in_day(hour.date_naive(), &day_path)
            .await?
            .into_iter()
            .filter(|(slot, _)| slot.target_hour == hour)
            .max_by_key(|(slot, _)| slot.recency())
            .ok_or(CacheError::NoData { hour })?;

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(CachedSlot {
            target_hour: hour,
            run_time: slot.run_time,
            path,
            size_bytes,
        })
    }
}

/// Every parseable slot file in one day directory.
async fn slots_in_day(day: NaiveDate, dir: &Path) -> Result<Vec<(SlotFile, PathBuf)>, CacheError> {
    let mut slots = Vec::new();
    let mut files = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = files.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match SlotFile::parse(day, &name) {
            Some(slot) => slots.push((slot, entry.path())),
            None => tracing::debug!("Wind: skipping unrecognised file {}", name),
        }
    }
    Ok(slots)
}

/// Keep only the freshest file per target hour. A file that can't be
/// removed is logged and counted; the rest of the day is still processed.
async fn dedupe_day(
    day: NaiveDate,
    dir: &Path,
    report: &mut CleanupReport,
) -> Result<(), CacheError> {
    let mut by_hour: BTreeMap<DateTime<Utc>, Vec<(SlotFile, PathBuf)>> = BTreeMap::new();
    for (slot, path) in slots_in_day(day, dir).await? {
        by_hour.entry(slot.target_hour).or_default().push((slot, path));
    }

    for mut files in by_hour.into_values() {
        files.sort_by(|a, b| b.0.recency().cmp(&a.0.recency()));
        let Some(((keep, _), stale)) = files.split_first() else {
            continue;
        };
        if stale.is_empty() {
            continue;
        }

        tracing::debug!(
            "Wind: deleting {} / keeping {}",
            stale
                .iter()
                .map(|(slot, _)| slot.file_name())
                .collect::<Vec<_>>()
                .join(","),
            keep.file_name(),
        );
        for (_, path) in stale {
            match tokio::fs::remove_file(path).await {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Wind: {} already gone", path.display());
                }
                Err(e) => {
                    tracing::warn!("Wind: can't delete {}: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        }
    }
    Ok(())
}
