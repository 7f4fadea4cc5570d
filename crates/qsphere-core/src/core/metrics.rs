//! Stateless quality metrics over spherical point sets.
//!
//! All functions assume pre-normalized unit vectors and have no side effects.

use nalgebra::Vector3;
use std::f64::consts::{FRAC_PI_2, PI};

/// Regularization added to squared pair distances before inversion, so that
/// coincident or antipodal-coincident points never produce a singular term.
pub const PAIR_EPSILON: f64 = 1e-9;

/// Covering radius of a point set: the arccosine of the largest pairwise inner
/// product (absolute value under antipodal symmetry).
///
/// Returns `π/2` by convention for fewer than two points. The result lies in
/// `[0, π/2]` when `antipodal`, `[0, π]` otherwise, and is invariant under
/// global rotation and permutation of the input.
pub fn covering_radius(points: &[Vector3<f64>], antipodal: bool) -> f64 {
    if points.len() < 2 {
        return FRAC_PI_2;
    }
    let mut max_dot = f64::NEG_INFINITY;
    for i in 0..points.len() - 1 {
        for j in i + 1..points.len() {
            let mut dot = points[i].dot(&points[j]);
            if antipodal {
                dot = dot.abs();
            }
            max_dot = max_dot.max(dot);
        }
    }
    max_dot.clamp(-1.0, 1.0).acos()
}

/// Closed-form spherical-code upper bound on the covering radius of a set of
/// `n` points. Returns `π/2` for fewer than three points.
pub fn covering_radius_upper_bound(n: usize) -> f64 {
    if n < 3 {
        return FRAC_PI_2;
    }
    let n = n as f64;
    let euc_sq = 4.0 - (1.0 / (PI * n / (6.0 * (n - 2.0))).sin()).powi(2);
    ((2.0 - euc_sq) / 2.0).clamp(-1.0, 1.0).acos()
}

/// Upper bound for a shell of `n` points, doubling the count under antipodal
/// symmetry (each direction occupies two antipodal caps).
pub fn covering_radius_bound_for(n: usize, antipodal: bool) -> f64 {
    covering_radius_upper_bound(if antipodal { 2 * n } else { n })
}

/// Electrostatic energy of a point set: the sum over unordered pairs of
/// `1 / (Σ_c (pᵢ−pⱼ)_c^order + ε)`, plus the matching `pᵢ+pⱼ` term when
/// `antipodal`. With the default `order = 2` this is the inverse squared
/// chord-distance repulsion used as a smooth surrogate for the covering
/// radius.
pub fn electrostatic_energy(points: &[Vector3<f64>], order: i32, antipodal: bool) -> f64 {
    let mut energy = 0.0;
    for i in 0..points.len().saturating_sub(1) {
        for j in i + 1..points.len() {
            let diff = points[j] - points[i];
            let d: f64 = diff.iter().map(|c| c.powi(order)).sum();
            energy += 1.0 / (d + PAIR_EPSILON);
            if antipodal {
                let sum = points[j] + points[i];
                let s: f64 = sum.iter().map(|c| c.powi(order)).sum();
                energy += 1.0 / (s + PAIR_EPSILON);
            }
        }
    }
    energy
}

/// Norm of the mean direction vector; an isotropy diagnostic (0 for a
/// perfectly balanced set).
pub fn norm_of_mean(points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let mean: Vector3<f64> = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
    mean.norm()
}

/// Packing-density score accumulated while appending `new_points` after
/// `existing`: for every growing prefix, `(1 − cos(covering radius)) / 2`
/// scaled by the prefix size. Larger values mean the growing prefixes stay
/// better separated.
pub fn packing_density(
    new_points: &[Vector3<f64>],
    existing: &[Vector3<f64>],
    antipodal: bool,
) -> f64 {
    let mut all: Vec<Vector3<f64>> = existing.to_vec();
    all.extend_from_slice(new_points);
    let start = existing.len();
    (1..=new_points.len())
        .map(|k| {
            let prefix = &all[..start + k];
            (1.0 - covering_radius(prefix, antipodal).cos()) / 2.0 * (start + k) as f64
        })
        .sum()
}

/// Weighted multi-shell combinator: `w/S · Σ_s f(shell_s) + (1−w) · f(union)`.
pub fn weighted_multi_shell<F>(shells: &[Vec<Vector3<f64>>], weight: f64, f: F) -> f64
where
    F: Fn(&[Vector3<f64>]) -> f64,
{
    let combined: Vec<Vector3<f64>> = shells.iter().flatten().copied().collect();
    let per_shell: f64 = shells.iter().map(|s| f(s)).sum();
    weight / shells.len() as f64 * per_shell + (1.0 - weight) * f(&combined)
}
