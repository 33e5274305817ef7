//! Common utility functions shared across CLI commands.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveTime, Utc};
use clockgate_core::GeoLocation;

/// Parse a `LAT,LNG` pair in decimal degrees.
pub fn parse_location(text: &str) -> Result<GeoLocation> {
    let Some((lat, lng)) = text.split_once(',') else {
        bail!("Invalid location '{text}': expected LAT,LNG");
    };
    let (Ok(lat), Ok(lng)) = (lat.trim().parse::<f64>(), lng.trim().parse::<f64>()) else {
        bail!("Invalid location '{text}': coordinates must be numbers");
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        bail!("Invalid location '{text}': out of range");
    }
    Ok(GeoLocation { lat, lng })
}

/// Wall-clock time of a record, or a dash when unset.
pub fn format_time(time: Option<NaiveTime>) -> String {
    time.map_or_else(|| "--:--".to_string(), |t| t.format("%H:%M").to_string())
}

pub fn format_instant(instant: Option<DateTime<Utc>>) -> String {
    format_time(instant.map(|i| i.time()))
}

pub fn format_hours(hours: Option<f64>) -> String {
    hours.map_or_else(|| "-".to_string(), |h| format!("{h:.1}h"))
}
