// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Distance functions and their mapping to similarity scores.
//!
//! | Metric       | Distance           | Score            |
//! |--------------|--------------------|------------------|
//! | Cosine       | `1 - cos(a, b)`    | `1 - distance`   |
//! | Euclidean    | `‖a - b‖₂`         | `1 / (1 + d)`    |
//! | Dot product  | `-(a · b)`         | `a · b`          |
//!
//! Smaller distance is always closer, so the graph code never needs to know
//! which metric is in use.

use aegis_core::domain::node_config::DistanceMetric;

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::Euclidean => euclidean_distance(a, b),
        DistanceMetric::DotProduct => -(dot(a, b) as f32),
    }
}

pub fn similarity(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - distance,
        DistanceMetric::Euclidean => 1.0 / (1.0 + distance),
        DistanceMetric::DotProduct => -distance,
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn norm(a: &[f32]) -> f64 {
    dot(a, a).sqrt()
}

/// Zero vectors have no direction; they sit at distance 1 from everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 1.0;
    }
    let cos = (dot(a, b) / denom).clamp(-1.0, 1.0);
    (1.0 - cos).max(0.0) as f32
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / n) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_cosine_of_identical_normalized_vectors_is_zero() {
        let mut v = vec![0.3, -0.4, 0.5, 0.1];
        normalize(&mut v);
        assert!(distance(DistanceMetric::Cosine, &v, &v).abs() < EPS);
        assert!((similarity(DistanceMetric::Cosine, 0.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_of_orthogonal_vectors_is_one() {
        let d = distance(DistanceMetric::Cosine, &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 1.0).abs() < EPS);
    }

    #[test]
    fn test_euclidean_three_four_five() {
        let d = distance(DistanceMetric::Euclidean, &[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]);
        assert!((d - 5.0).abs() < EPS);
        assert!((similarity(DistanceMetric::Euclidean, d) - 1.0 / 6.0).abs() < EPS);
    }

    #[test]
    fn test_dot_product_score_is_raw_dot() {
        let d = distance(DistanceMetric::DotProduct, &[1.0, 2.0], &[3.0, 4.0]);
        assert!((similarity(DistanceMetric::DotProduct, d) - 11.0).abs() < EPS);
    }

    #[test]
    fn test_zero_vector_cosine_is_defined() {
        let d = distance(DistanceMetric::Cosine, &[0.0, 0.0], &[1.0, 0.0]);
        assert_eq!(d, 1.0);
    }
}
