//! Polyline parsing and reduction shared by both parser strategies.
//!
//! Reduction runs in the source XY space, before axis coercion, so both
//! strategies produce identical geometry for the same document.

use super::model::Point;

/// Douglas-Peucker tolerance in source units.
pub(crate) const SIMPLIFY_EPSILON: f64 = 5.0;

/// Hard cap on points per lane after simplification.
pub(crate) const MAX_POINTS_PER_LANE: usize = 20;

/// Parses a whitespace-separated list of `x,y` pairs. Pairs that are not two
/// finite numbers are skipped.
pub(crate) fn parse_shape(shape: &str) -> Vec<(f64, f64)> {
    shape
        .split_whitespace()
        .filter_map(|pair| {
            let (x, y) = pair.split_once(',')?;
            let x = x.parse::<f64>().ok()?;
            let y = y.parse::<f64>().ok()?;
            (x.is_finite() && y.is_finite()).then_some((x, y))
        })
        .collect()
}

/// Applies simplification and sampling with the module constants. Polylines
/// of four points or fewer pass through untouched.
pub(crate) fn reduce(points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let mut points = points;
    if points.len() > 4 {
        points = rdp_simplify(&points, SIMPLIFY_EPSILON);
    }
    if points.len() > MAX_POINTS_PER_LANE {
        points = sample_points(&points, MAX_POINTS_PER_LANE);
    }
    points
}

/// Turns a lane `shape` attribute into reduced render-order points.
pub(crate) fn lane_points(shape: &str) -> Vec<Point> {
    reduce(parse_shape(shape))
        .into_iter()
        .map(|(x, y)| Point::from_xy(x, y))
        .collect()
}

/// Turns a junction `shape` attribute into render-order points, unreduced.
pub(crate) fn polygon_points(shape: &str) -> Vec<Point> {
    parse_shape(shape)
        .into_iter()
        .map(|(x, y)| Point::from_xy(x, y))
        .collect()
}

/// Ramer-Douglas-Peucker line simplification. Endpoints are always kept.
fn rdp_simplify(points: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let epsilon_squared = epsilon * epsilon;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];

    while let Some((start, end)) = stack.pop() {
        let mut max_dist_sq = 0.0;
        let mut max_idx = 0;

        for i in start + 1..end {
            let dist_sq = point_to_segment_distance_sq(points[i], points[start], points[end]);
            if dist_sq > max_dist_sq {
                max_dist_sq = dist_sq;
                max_idx = i;
            }
        }

        if max_dist_sq > epsilon_squared {
            keep[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    points
        .iter()
        .enumerate()
        .filter(|(i, _)| keep[*i])
        .map(|(_, p)| *p)
        .collect()
}

fn point_to_segment_distance_sq(p: (f64, f64), v: (f64, f64), w: (f64, f64)) -> f64 {
    let l2 = (v.0 - w.0).powi(2) + (v.1 - w.1).powi(2);
    if l2 == 0.0 {
        return (p.0 - v.0).powi(2) + (p.1 - v.1).powi(2);
    }

    let t = (((p.0 - v.0) * (w.0 - v.0) + (p.1 - v.1) * (w.1 - v.1)) / l2).clamp(0.0, 1.0);
    let proj_x = v.0 + t * (w.0 - v.0);
    let proj_y = v.1 + t * (w.1 - v.1);

    (p.0 - proj_x).powi(2) + (p.1 - proj_y).powi(2)
}

/// Uniform downsampling that always keeps the last point.
fn sample_points(points: &[(f64, f64)], max_points: usize) -> Vec<(f64, f64)> {
    if points.len() <= max_points {
        return points.to_vec();
    }

    let step = (points.len() as f64 / max_points as f64).ceil() as usize;
    let mut result: Vec<(f64, f64)> = points.iter().step_by(step).copied().collect();

    if result.last() != points.last() {
        if let Some(last) = points.last() {
            result.push(*last);
        }
    }

    result
}
