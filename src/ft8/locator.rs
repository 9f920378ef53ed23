//! Maidenhead grid locators

use regex::Regex;
use std::sync::LazyLock;

const EARTH_RADIUS_KM: f64 = 6371.0;

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-R]{2}[0-9]{2}(?:[A-X]{2})?").expect("locator pattern is valid")
});

/// All distinct locators in `message`, in order of first appearance
pub fn extract_locators(message: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in LOCATOR.find_iter(message) {
        if !found.iter().any(|f| f == m.as_str()) {
            found.push(m.as_str().to_string());
        }
    }
    found
}

/// Latitude and longitude (degrees) at the centre of a 4 or 6 character square
pub fn to_lat_lon(locator: &str) -> Option<(f64, f64)> {
    let chars: Vec<u8> = locator.to_ascii_uppercase().into_bytes();
    let whole = LOCATOR.find(locator).is_some_and(|m| m.len() == locator.len());
    if !whole || !matches!(chars.len(), 4 | 6) {
        return None;
    }

    let mut lon = (chars[0] - b'A') as f64 * 20.0 - 180.0;
    let mut lat = (chars[1] - b'A') as f64 * 10.0 - 90.0;
    lon += (chars[2] - b'0') as f64 * 2.0;
    lat += (chars[3] - b'0') as f64;

    if chars.len() == 6 {
        lon += (chars[4] - b'A') as f64 * (5.0 / 60.0);
        lat += (chars[5] - b'A') as f64 * (2.5 / 60.0);
        lon += 5.0 / 120.0;
        lat += 1.25 / 120.0;
    } else {
        lon += 1.0;
        lat += 0.5;
    }

    Some((lat, lon))
}

/// Great-circle distance in kilometres
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance between two locators, if both are valid
pub fn distance_km(from: &str, to: &str) -> Option<f64> {
    Some(haversine_km(to_lat_lon(from)?, to_lat_lon(to)?))
}
