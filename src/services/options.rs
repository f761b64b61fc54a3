//! Calculation options: defaults, normalization and validation.
//!
//! User input is an arbitrary JSON value. Only recognised keys are read; the
//! rest is ignored. `precision` and `directions` are coerced (never rejected),
//! every other field is type- and range-checked so malformed input never
//! reaches the engine.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Default departure: Paris.
const DEFAULT_DEPARTURE: Location = Location::new(48.856614, 2.3522219);
/// Default arrival: New York City.
const DEFAULT_ARRIVAL: Location = Location::new(40.7127753, -74.0059728);
pub const DEFAULT_AIRCRAFT: &str = "Cessna 172";
const DEFAULT_PRECISION: u32 = 100;
const DEFAULT_DIRECTIONS: u32 = 1;
const DEFAULT_HEURISTIC_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("options must be a JSON object")]
    NotAnObject,

    #[error("invalid {field}: {reason}")]
    InvalidLocation { field: &'static str, reason: String },

    #[error("invalid departureTime: {0}")]
    InvalidDepartureTime(String),

    #[error("invalid aircraft: {0}")]
    InvalidAircraft(String),

    #[error("invalid heuristicWeight: {0}")]
    InvalidHeuristicWeight(String),

    #[error("{field} must be a boolean")]
    InvalidFlag { field: &'static str },
}

/// A point on the globe (WGS84 degrees, altitude in metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

impl Location {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, alt: 0.0 }
    }
}

/// Fully-specified options passed to the engine as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalculationOptions {
    pub departure: Location,
    pub arrival: Location,
    /// Unset means the engine departs at its own start time.
    pub departure_time: Option<DateTime<Utc>>,
    /// Aircraft performance profile name.
    pub aircraft: String,
    /// Grid resolution, >= 1.
    pub precision: u32,
    /// Outgoing directions explored per graph node, >= 1.
    pub directions: u32,
    /// 0 = uniform-cost search; larger values are greedier.
    pub heuristic_weight: f64,
    /// Use cached wind data.
    pub weather: bool,
    /// Include the exploration graph in the result stats.
    pub export_graph: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            departure: DEFAULT_DEPARTURE,
            arrival: DEFAULT_ARRIVAL,
            departure_time: None,
            aircraft: DEFAULT_AIRCRAFT.to_string(),
            precision: DEFAULT_PRECISION,
            directions: DEFAULT_DIRECTIONS,
            heuristic_weight: DEFAULT_HEURISTIC_WEIGHT,
            weather: false,
            export_graph: false,
        }
    }
}

impl CalculationOptions {
    /// Merge raw user input over the defaults.
    ///
    /// `null` (or a missing key, or a key set to `null`) keeps the default.
    /// Normalizing the JSON form of an already-normalized value yields the
    /// same value.
    pub fn normalize(raw: &Value) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        let obj = match raw {
            Value::Null => return Ok(options),
            Value::Object(obj) => obj,
            _ => return Err(OptionsError::NotAnObject),
        };

        if let Some(v) = field(obj, "precision") {
            options.precision = coerce_positive_int(v);
        }
        if let Some(v) = field(obj, "directions") {
            options.directions = coerce_positive_int(v);
        }
        if let Some(v) = field(obj, "departure") {
            options.departure = parse_location("departure", v)?;
        }
        if let Some(v) = field(obj, "arrival") {
            options.arrival = parse_location("arrival", v)?;
        }
        if let Some(v) = field(obj, "departureTime") {
            options.departure_time = Some(parse_departure_time(v)?);
        }
        if let Some(v) = field(obj, "aircraft") {
            options.aircraft = parse_aircraft(v)?;
        }
        if let Some(v) = field(obj, "heuristicWeight") {
            options.heuristic_weight = parse_heuristic_weight(v)?;
        }
        if let Some(v) = field(obj, "weather") {
            options.weather = v
                .as_bool()
                .ok_or(OptionsError::InvalidFlag { field: "weather" })?;
        }
        if let Some(v) = field(obj, "exportGraph") {
            options.export_graph = v
                .as_bool()
                .ok_or(OptionsError::InvalidFlag { field: "exportGraph" })?;
        }

        Ok(options)
    }

    /// Re-establish the invariants of a typed value built by hand.
    pub fn normalized(mut self) -> Self {
        self.precision = self.precision.max(1);
        self.directions = self.directions.max(1);
        self.departure.alt = 0.0;
        self.arrival.alt = 0.0;
        self
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// Round to the nearest integer; anything non-numeric or below 1 becomes 1.
pub fn coerce_positive_int(value: &Value) -> u32 {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n.map(f64::round) {
        Some(r) if r.is_finite() && r >= 1.0 => r as u32,
        _ => 1,
    }
}

fn parse_location(field: &'static str, value: &Value) -> Result<Location, OptionsError> {
    let invalid = |reason: &str| OptionsError::InvalidLocation {
        field,
        reason: reason.to_string(),
    };
    let obj = value.as_object().ok_or_else(|| invalid("expected an object"))?;
    let coord = |key: &str, limit: f64| -> Result<f64, OptionsError> {
        let v = obj
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid(&format!("{} must be a number", key)))?;
        if !v.is_finite() || v.abs() > limit {
            return Err(invalid(&format!("{} out of range: {}", key, v)));
        }
        Ok(v)
    };
    Ok(Location::new(coord("lat", 90.0)?, coord("lon", 180.0)?))
}

/// RFC 3339 string or epoch milliseconds.
fn parse_departure_time(value: &Value) -> Result<DateTime<Utc>, OptionsError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OptionsError::InvalidDepartureTime(format!("{}: {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| OptionsError::InvalidDepartureTime(format!("{} is out of range", n))),
        other => Err(OptionsError::InvalidDepartureTime(format!(
            "expected RFC 3339 string or epoch milliseconds, got {}",
            other
        ))),
    }
}

fn parse_aircraft(value: &Value) -> Result<String, OptionsError> {
    let name = value
        .as_str()
        .ok_or_else(|| OptionsError::InvalidAircraft("expected a string".to_string()))?
        .trim();
    if name.is_empty() {
        return Err(OptionsError::InvalidAircraft("name is empty".to_string()));
    }
    Ok(name.to_string())
}

fn parse_heuristic_weight(value: &Value) -> Result<f64, OptionsError> {
    match value.as_f64() {
        Some(w) if w.is_finite() && w >= 0.0 => Ok(w),
        Some(w) => Err(OptionsError::InvalidHeuristicWeight(format!(
            "must be >= 0, got {}",
            w
        ))),
        None => Err(OptionsError::InvalidHeuristicWeight(
            "expected a number".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(v: Value) -> CalculationOptions {
        CalculationOptions::normalize(&v).unwrap()
    }

    #[test]
    fn test_null_and_empty_give_defaults() {
        assert_eq!(normalize(Value::Null), CalculationOptions::default());
        assert_eq!(normalize(json!({})), CalculationOptions::default());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert_eq!(
            CalculationOptions::normalize(&json!([1, 2])),
            Err(OptionsError::NotAnObject)
        );
        assert_eq!(
            CalculationOptions::normalize(&json!("precision")),
            Err(OptionsError::NotAnObject)
        );
    }

    #[test]
    fn test_precision_is_rounded_and_floored_to_one() {
        assert_eq!(normalize(json!({ "precision": 0 })).precision, 1);
        assert_eq!(normalize(json!({ "precision": 2.6 })).precision, 3);
        assert_eq!(normalize(json!({ "precision": -12 })).precision, 1);
        assert_eq!(normalize(json!({ "precision": 0.4 })).precision, 1);
        assert_eq!(normalize(json!({ "precision": "7" })).precision, 7);
        assert_eq!(normalize(json!({ "precision": "abc" })).precision, 1);
        assert_eq!(normalize(json!({ "precision": true })).precision, 1);
        assert_eq!(normalize(json!({ "precision": { "x": 1 } })).precision, 1);
    }

    #[test]
    fn test_directions_coerced_like_precision() {
        assert_eq!(normalize(json!({ "directions": 0 })).directions, 1);
        assert_eq!(normalize(json!({ "directions": 4.5 })).directions, 5);
        assert_eq!(normalize(json!({ "directions": 8 })).directions, 8);
    }

    #[test]
    fn test_location_keeps_only_lat_lon() {
        let options = normalize(json!({
            "departure": { "lat": 47.45, "lon": 8.56, "alt": 3000, "name": "ZRH" }
        }));
        assert_eq!(options.departure, Location::new(47.45, 8.56));
        assert_eq!(options.arrival, DEFAULT_ARRIVAL);
    }

    #[test]
    fn test_location_validation() {
        for bad in [
            json!({ "arrival": { "lat": 95.0, "lon": 0.0 } }),
            json!({ "arrival": { "lat": 10.0, "lon": -181.0 } }),
            json!({ "arrival": { "lat": 10.0 } }),
            json!({ "arrival": { "lat": "10", "lon": 0.0 } }),
            json!({ "arrival": "Paris" }),
        ] {
            let err = CalculationOptions::normalize(&bad).unwrap_err();
            assert!(
                matches!(err, OptionsError::InvalidLocation { field: "arrival", .. }),
                "{:?} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_departure_time_formats() {
        let expected = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let from_str = normalize(json!({ "departureTime": "2026-03-01T09:00:00+01:00" }));
        assert_eq!(from_str.departure_time, Some(expected));
        let from_ms = normalize(json!({ "departureTime": expected.timestamp_millis() }));
        assert_eq!(from_ms.departure_time, Some(expected));

        let err = CalculationOptions::normalize(&json!({ "departureTime": "tomorrow" }));
        assert!(matches!(err, Err(OptionsError::InvalidDepartureTime(_))));
        let err = CalculationOptions::normalize(&json!({ "departureTime": false }));
        assert!(matches!(err, Err(OptionsError::InvalidDepartureTime(_))));
    }

    #[test]
    fn test_aircraft_validation() {
        assert_eq!(
            normalize(json!({ "aircraft": "  Boeing 737-800 " })).aircraft,
            "Boeing 737-800"
        );
        assert!(matches!(
            CalculationOptions::normalize(&json!({ "aircraft": "   " })),
            Err(OptionsError::InvalidAircraft(_))
        ));
        assert!(matches!(
            CalculationOptions::normalize(&json!({ "aircraft": 737 })),
            Err(OptionsError::InvalidAircraft(_))
        ));
    }

    #[test]
    fn test_heuristic_weight_validation() {
        assert_eq!(normalize(json!({ "heuristicWeight": 0 })).heuristic_weight, 0.0);
        assert_eq!(normalize(json!({ "heuristicWeight": 2.5 })).heuristic_weight, 2.5);
        assert!(matches!(
            CalculationOptions::normalize(&json!({ "heuristicWeight": -1 })),
            Err(OptionsError::InvalidHeuristicWeight(_))
        ));
        assert!(matches!(
            CalculationOptions::normalize(&json!({ "heuristicWeight": "high" })),
            Err(OptionsError::InvalidHeuristicWeight(_))
        ));
    }

    #[test]
    fn test_flags_must_be_booleans() {
        let options = normalize(json!({ "weather": true, "exportGraph": true }));
        assert!(options.weather);
        assert!(options.export_graph);
        assert_eq!(
            CalculationOptions::normalize(&json!({ "weather": "yes" })),
            Err(OptionsError::InvalidFlag { field: "weather" })
        );
        assert_eq!(
            CalculationOptions::normalize(&json!({ "exportGraph": 1 })),
            Err(OptionsError::InvalidFlag { field: "exportGraph" })
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let options = normalize(json!({ "display": { "color": "red" }, "speed": 9000 }));
        assert_eq!(options, CalculationOptions::default());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            Value::Null,
            json!({ "precision": 2.6, "directions": -3 }),
            json!({
                "departure": { "lat": -33.9, "lon": 151.2, "alt": 12 },
                "arrival": { "lat": 1.35, "lon": 103.99 },
                "departureTime": "2026-03-01T08:15:30.250Z",
                "aircraft": " A320 ",
                "heuristicWeight": 0.75,
                "weather": true,
                "exportGraph": true,
                "extra": [1, 2, 3]
            }),
            json!({ "departureTime": 1772352000000i64, "precision": "12" }),
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(serde_json::to_value(&once).unwrap());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_serializes_camel_case() {
        let v = serde_json::to_value(CalculationOptions::default()).unwrap();
        assert!(v.get("heuristicWeight").is_some());
        assert!(v.get("exportGraph").is_some());
        assert!(v.get("departureTime").unwrap().is_null());
        assert_eq!(v["departure"]["alt"], json!(0.0));
    }

    #[test]
    fn test_normalized_clamps_typed_values() {
        let options = CalculationOptions {
            precision: 0,
            directions: 0,
            departure: Location {
                lat: 1.0,
                lon: 2.0,
                alt: 500.0,
            },
            ..Default::default()
        }
        .normalized();
        assert_eq!(options.precision, 1);
        assert_eq!(options.directions, 1);
        assert_eq!(options.departure.alt, 0.0);
    }
}
