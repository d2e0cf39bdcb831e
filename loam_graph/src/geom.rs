// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry helpers over resolved lon/lat point lists.

use kurbo::Point;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Shoelace signed area in square degrees. Positive for counter-clockwise
/// rings (y up = north).
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum
}

/// Whether the ring winds clockwise.
pub fn is_clockwise(points: &[Point]) -> bool {
    signed_area(points) < 0.0
}

/// Great-circle length of the polyline in meters.
pub fn length_meters(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|pair| great_circle_distance(pair[0], pair[1]))
        .sum()
}

/// Great-circle distance between two lon/lat points in meters (haversine).
pub fn great_circle_distance(a: Point, b: Point) -> f64 {
    let (lon1, lat1) = (a.x.to_radians(), a.y.to_radians());
    let (lon2, lat2) = (b.x.to_radians(), b.y.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Area-weighted centroid of a ring; falls back to the vertex average for
/// degenerate rings.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let area = signed_area(points);
    if area.abs() < 1e-12 {
        let n = points.len() as f64;
        let sum = points
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
        return Some(Point::new(sum.0 / n, sum.1 / n));
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    let scale = 1.0 / (6.0 * area);
    Some(Point::new(cx * scale, cy * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_ccw() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]
    }

    #[test]
    fn area_and_winding() {
        let ccw = square_ccw();
        assert_eq!(signed_area(&ccw), 1.0);
        assert!(!is_clockwise(&ccw));

        let cw: Vec<Point> = ccw.iter().rev().copied().collect();
        assert_eq!(signed_area(&cw), -1.0);
        assert!(is_clockwise(&cw));
    }

    #[test]
    fn centroid_of_square() {
        let c = centroid(&square_ccw()).unwrap();
        assert!((c.x - 0.5).abs() < 1e-12);
        assert!((c.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn equator_degree_is_about_111km() {
        let d = great_circle_distance(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
        assert!((d - 111_319.0).abs() < 100.0, "got {d}");
    }
}
