use crate::models::dashboard::{Coordinates, GpsPoint, GpsStats, SignalQuality};
use rand::seq::SliceRandom;
use rand::Rng;

pub const POINTS_PER_REQUEST: usize = 50;

/// Degrees of jitter around the requested base coordinate.
const SPREAD_DEG: f64 = 0.0005;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn generate_points(base: Coordinates, count: usize) -> Vec<GpsPoint> {
    let mut rng = rand::thread_rng();
    let qualities = [SignalQuality::Excellent, SignalQuality::Good, SignalQuality::Acceptable];

    (0..count)
        .map(|i| GpsPoint {
            id: format!("#{}", rng.gen_range(1000..=9999) + i),
            lat: base.lat + rng.gen_range(-SPREAD_DEG..=SPREAD_DEG),
            lon: base.lon + rng.gen_range(-SPREAD_DEG..=SPREAD_DEG),
            alt: round_to(rng.gen_range(190.0..200.0), 1),
            acc: round_to(rng.gen_range(1.5..5.0), 2),
            quality: *qualities.choose(&mut rng).unwrap_or(&SignalQuality::Good),
        })
        .collect()
}

/// Summary of a point cloud around `base`; `None` for an empty set.
pub fn summarize(base: Coordinates, points: &[GpsPoint]) -> Option<GpsStats> {
    if points.is_empty() {
        return None;
    }

    let most_accurate = points.iter().map(|p| p.acc).fold(f64::INFINITY, f64::min);
    let average_accuracy = points.iter().map(|p| p.acc).sum::<f64>() / points.len() as f64;
    let coverage_m = points
        .iter()
        .map(|p| haversine_m(base, Coordinates { lat: p.lat, lon: p.lon }))
        .fold(0.0, f64::max);

    let quality = if average_accuracy < 2.5 {
        SignalQuality::Excellent
    } else if average_accuracy < 4.0 {
        SignalQuality::Good
    } else {
        SignalQuality::Acceptable
    };

    Some(GpsStats {
        most_accurate,
        average_accuracy,
        coverage_m,
        quality,
    })
}

pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
