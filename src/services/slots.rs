//! Hourly cache slots, GFS model runs and the on-disk file naming scheme.
//!
//! A slot is one target hour. It can be produced by several model runs; the
//! file name records which one:
//!
//! ```text
//! wind/<YYYYMMDD>/<HH>.0p25.anl.grib2                 analysis (offset 0)
//! wind/<YYYYMMDD>/<HH>.0p25.f<runYYYYMMDD>-<runHH>.grib2  forecast
//! ```
//!
//! Everything here is pure; no I/O.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};

/// GFS runs are issued every 6 hours (00, 06, 12, 18 UTC).
pub const RUN_INTERVAL_HOURS: u32 = 6;

/// Resolution tag embedded in every file name.
const RESOLUTION_TAG: &str = "0p25";

const FILE_EXTENSION: &str = "grib2";

/// Day directory name format (`20260301`).
const DAY_FORMAT: &str = "%Y%m%d";

// ---------------------------------------------------------------------------
// Time window helpers
// ---------------------------------------------------------------------------

/// Floor a datetime to the start of its hour.
pub fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.time().hour(), 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(dt)
}

/// Floor a datetime to the most recent model run boundary.
fn floor_to_run(dt: DateTime<Utc>) -> DateTime<Utc> {
    let hour = dt.time().hour();
    dt.date_naive()
        .and_hms_opt(hour - hour % RUN_INTERVAL_HOURS, 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(dt)
}

/// Every hourly slot from `floor(from)` through `floor(to)`, inclusive.
///
/// Returns an empty list when `from > to`; range validation is the caller's job.
pub fn hourly_slots(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let last = floor_to_hour(to);
    let mut slots = Vec::new();
    let mut current = floor_to_hour(from);
    while current <= last {
        slots.push(current);
        current += Duration::hours(1);
    }
    slots
}

// ---------------------------------------------------------------------------
// Model runs
// ---------------------------------------------------------------------------

/// The upstream model run chosen to serve a target hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRun {
    /// Issuance time, always on a 6-hour boundary.
    pub run_time: DateTime<Utc>,
    /// Hours between `run_time` and the target hour.
    pub forecast_offset: u32,
}

impl ModelRun {
    /// Pick the freshest run usable for `target` as of `now`.
    ///
    /// The run is never newer than `now - publication_lag` (upstream needs
    /// time to publish it) and never newer than the target itself, then it
    /// is floored to a run boundary.
    pub fn for_target(
        target: DateTime<Utc>,
        now: DateTime<Utc>,
        publication_lag: Duration,
    ) -> Self {
        let target = floor_to_hour(target);
        let latest_published = now - publication_lag;
        let base = if target > latest_published {
            latest_published
        } else {
            target
        };
        let run_time = floor_to_run(base);
        let offset_hours = ((target - run_time).num_seconds() as f64 / 3600.0).round();

        Self {
            run_time,
            forecast_offset: offset_hours.max(0.0) as u32,
        }
    }

    /// An offset of zero is an analysis, not a forecast.
    pub fn is_analysis(&self) -> bool {
        self.forecast_offset == 0
    }

    /// Upstream file identifier, e.g. `gfs.t06z.pgrb2.0p25.f012`.
    pub fn upstream_file(&self) -> String {
        format!(
            "gfs.t{:02}z.pgrb2.{}.f{:03}",
            self.run_time.hour(),
            RESOLUTION_TAG,
            self.forecast_offset
        )
    }

    /// Upstream publication directory, e.g. `/gfs.20260301/06`.
    pub fn upstream_dir(&self) -> String {
        format!(
            "/gfs.{}/{:02}",
            self.run_time.format(DAY_FORMAT),
            self.run_time.hour()
        )
    }

    /// Human description used in log lines.
    pub fn describe(&self, target: DateTime<Utc>) -> String {
        if self.is_analysis() {
            target.format("%Y-%m-%dT%H").to_string()
        } else {
            format!(
                "{} (forecast from {})",
                target.format("%Y-%m-%dT%H"),
                self.run_time.format("%Y-%m-%dT%H")
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Slot files
// ---------------------------------------------------------------------------

/// A slot file on disk: the target hour plus the run that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFile {
    pub target_hour: DateTime<Utc>,
    /// `None` for an analysis file.
    pub run_time: Option<DateTime<Utc>>,
}

impl SlotFile {
    pub fn new(target: DateTime<Utc>, run: &ModelRun) -> Self {
        Self {
            target_hour: floor_to_hour(target),
            run_time: (!run.is_analysis()).then_some(run.run_time),
        }
    }

    pub fn is_analysis(&self) -> bool {
        self.run_time.is_none()
    }

    /// Day directory holding this file.
    pub fn day_dir(&self) -> String {
        day_dir_name(self.target_hour)
    }

    pub fn file_name(&self) -> String {
        let suffix = match self.run_time {
            None => "anl".to_string(),
            Some(run) => format!("f{}-{:02}", run.format(DAY_FORMAT), run.hour()),
        };
        format!(
            "{:02}.{}.{}.{}",
            self.target_hour.hour(),
            RESOLUTION_TAG,
            suffix,
            FILE_EXTENSION
        )
    }

    /// Path relative to the wind directory.
    pub fn relative_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.day_dir()).join(self.file_name())
    }

    /// Parse a file name found inside the day directory `day`.
    ///
    /// Returns `None` for anything that does not follow the naming scheme.
    pub fn parse(day: NaiveDate, file_name: &str) -> Option<Self> {
        let mut parts = file_name.split('.');
        let hour: u32 = parts.next()?.parse().ok()?;
        if parts.next()? != RESOLUTION_TAG {
            return None;
        }
        let run_part = parts.next()?;
        if parts.next()? != FILE_EXTENSION || parts.next().is_some() {
            return None;
        }

        let target_hour = Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0)?);
        let run_time = if run_part == "anl" {
            None
        } else {
            let (run_day, run_hour) = run_part.strip_prefix('f')?.split_once('-')?;
            let run_day = NaiveDate::parse_from_str(run_day, DAY_FORMAT).ok()?;
            let run_hour: u32 = run_hour.parse().ok()?;
            Some(Utc.from_utc_datetime(&run_day.and_hms_opt(run_hour, 0, 0)?))
        };

        Some(Self {
            target_hour,
            run_time,
        })
    }

    /// Retention rank; higher is fresher.
    ///
    /// An analysis outranks every forecast for its hour, forecasts rank by
    /// run time.
    pub fn recency(&self) -> (bool, Option<DateTime<Utc>>) {
        (self.is_analysis(), self.run_time)
    }
}

/// Day directory name for a timestamp.
pub fn day_dir_name(dt: DateTime<Utc>) -> String {
    dt.format(DAY_FORMAT).to_string()
}

/// Parse a day directory name back into a date.
pub fn parse_day_dir(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(name, DAY_FORMAT).ok()
}
