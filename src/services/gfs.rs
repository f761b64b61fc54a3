//! NOAA NOMADS GFS 0.25° filter client.
//!
//! Fetches wind components (UGRD/VGRD) at a fixed set of pressure levels for
//! one model run file, over the whole globe. The response is a GRIB2 blob
//! that is stored verbatim; it is never decoded here.
//! See: https://nomads.ncep.noaa.gov/

use bytes::Bytes;
use std::time::Duration;

use crate::services::slots::ModelRun;
use crate::services::weather_cache::CacheError;

pub const GFS_FILTER_URL: &str = "https://nomads.ncep.noaa.gov/cgi-bin/filter_gfs_0p25.pl";

/// Upper bound for a single fetch. A hung upstream must not stall the refresh loop.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Lowest and highest pressure levels requested (mb), and the step between them.
const PRESSURE_LEVEL_MIN_MB: u32 = 100;
const PRESSURE_LEVEL_MAX_MB: u32 = 900;
const PRESSURE_LEVEL_STEP_MB: u32 = 50;

/// Wind vector components.
const WIND_VARIABLES: [&str; 2] = ["UGRD", "VGRD"];

/// Client for the GFS grib filter endpoint.
#[derive(Debug, Clone)]
pub struct GfsClient {
    client: reqwest::Client,
    base_url: String,
}

/// Pressure levels requested for every slot, in millibars.
pub fn pressure_levels() -> Vec<u32> {
    (PRESSURE_LEVEL_MIN_MB..=PRESSURE_LEVEL_MAX_MB)
        .step_by(PRESSURE_LEVEL_STEP_MB as usize)
        .collect()
}

/// Query string for one run file: file/dir selectors, level and variable
/// toggles, and a full-globe bounding box.
pub fn filter_query(run: &ModelRun) -> Vec<(String, String)> {
    let mut params = vec![
        ("file".to_string(), run.upstream_file()),
        ("dir".to_string(), run.upstream_dir()),
    ];
    for level in pressure_levels() {
        params.push((format!("lev_{}_mb", level), "on".to_string()));
    }
    for var in WIND_VARIABLES {
        params.push((format!("var_{}", var), "on".to_string()));
    }
    params.extend(
        [
            ("leftlon", "0"),
            ("rightlon", "360"),
            ("toplat", "90"),
            ("bottomlat", "-90"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    params
}

impl GfsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Download the wind file for `run`. The whole body is buffered in memory.
    pub async fn fetch(&self, run: &ModelRun) -> Result<Bytes, CacheError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&filter_query(run))
            .send()
            .await
            .map_err(|e| CacheError::Fetch(format!("GFS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CacheError::Fetch(format!(
                "GFS returned HTTP {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::Fetch(format!("GFS body read failed: {}", e)))
    }
}
