//! Electrostatic initializer.
//!
//! Treats every point as a unit charge and minimizes a weighted multi-group
//! electrostatic energy: each shell group (by default every singleton shell
//! plus the group of all shells) contributes its pairwise repulsion, so
//! per-shell uniformity is balanced against uniformity of the union. The
//! minimizer is a projected gradient descent with Armijo backtracking that
//! re-normalizes every point to the sphere after each step. Best effort: it
//! never fails on non-convergence.

use nalgebra::{DMatrix, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, warn};

use super::config::GeemConfig;
use super::error::EngineError;
use crate::core::metrics::PAIR_EPSILON;

const GRAD_TOLERANCE: f64 = 1e-8;
const RELATIVE_TOLERANCE: f64 = 1e-10;
const ARMIJO_C: f64 = 1e-4;
const MIN_STEP: f64 = 1e-14;

/// The default shell grouping: one singleton group per shell plus one group
/// containing every shell, all with unit weight.
pub fn default_shell_groups(num_shells: usize) -> (Vec<Vec<usize>>, Vec<f64>) {
    let mut groups: Vec<Vec<usize>> = (0..num_shells).map(|s| vec![s]).collect();
    groups.push((0..num_shells).collect());
    let alphas = vec![1.0; groups.len()];
    (groups, alphas)
}

/// Builds the S×S pair-weight matrix from shell groups: each group adds
/// `alpha / (Σ group counts)²` to every ordered shell pair it contains.
pub fn compute_weights(
    points_per_shell: &[usize],
    shell_groups: &[Vec<usize>],
    alphas: &[f64],
) -> Result<DMatrix<f64>, EngineError> {
    if shell_groups.len() != alphas.len() {
        return Err(EngineError::InputMismatch(format!(
            "{} shell groups with {} group weights",
            shell_groups.len(),
            alphas.len()
        )));
    }
    let s = points_per_shell.len();
    let mut weights = DMatrix::zeros(s, s);
    for (group, &alpha) in shell_groups.iter().zip(alphas) {
        let total: usize = group.iter().map(|&i| points_per_shell[i]).sum();
        if total == 0 {
            continue;
        }
        let contribution = alpha / (total * total) as f64;
        for &a in group {
            for &b in group {
                weights[(a, b)] += contribution;
            }
        }
    }
    Ok(weights)
}

fn shell_of(offsets: &[usize], flat_index: usize) -> usize {
    offsets
        .iter()
        .rposition(|&o| o <= flat_index)
        .unwrap_or(0)
        .min(offsets.len().saturating_sub(2))
}

fn energy_and_grad(
    points: &[Vector3<f64>],
    shells: &[usize],
    weights: &DMatrix<f64>,
    antipodal: bool,
) -> (f64, Vec<Vector3<f64>>) {
    let mut energy = 0.0;
    let mut grad = vec![Vector3::zeros(); points.len()];
    for i in 0..points.len().saturating_sub(1) {
        for j in i + 1..points.len() {
            let w = weights[(shells[i], shells[j])];
            if w == 0.0 {
                continue;
            }
            let diff = points[i] - points[j];
            let td = 1.0 / (diff.norm_squared() + PAIR_EPSILON);
            energy += w * td;
            let gd = diff * (-2.0 * w * td * td);
            grad[i] += gd;
            grad[j] -= gd;
            if antipodal {
                let sum = points[i] + points[j];
                let ts = 1.0 / (sum.norm_squared() + PAIR_EPSILON);
                energy += w * ts;
                let gs = sum * (-2.0 * w * ts * ts);
                grad[i] += gs;
                grad[j] += gs;
            }
        }
    }
    (energy, grad)
}

fn random_unit_vector(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let n = v.norm();
        if n > 1e-3 && n <= 1.0 {
            return v / n;
        }
    }
}

/// Minimizes the weighted multi-group electrostatic energy for the given
/// shell sizes. Returns the flat point list in shell order, unit-normalized.
#[instrument(skip_all, name = "geem_optimize", fields(shells = points_per_shell.len()))]
pub fn optimize(
    points_per_shell: &[usize],
    weights: &DMatrix<f64>,
    config: &GeemConfig,
    init_points: Option<Vec<Vector3<f64>>>,
) -> Result<Vec<Vector3<f64>>, EngineError> {
    let total: usize = points_per_shell.iter().sum();
    let mut offsets = vec![0usize];
    for &k in points_per_shell {
        offsets.push(offsets.last().unwrap() + k);
    }
    let shells: Vec<usize> = (0..total).map(|i| shell_of(&offsets, i)).collect();

    let mut points: Vec<Vector3<f64>> = match init_points {
        Some(init) => {
            if init.len() != total {
                return Err(EngineError::InputMismatch(format!(
                    "initialization holds {} points but shell sizes require {}",
                    init.len(),
                    total
                )));
            }
            init.iter().map(|p| p.normalize()).collect()
        }
        None => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            (0..total).map(|_| random_unit_vector(&mut rng)).collect()
        }
    };

    let (mut energy, mut grad) = energy_and_grad(&points, &shells, weights, config.antipodal);
    let mut step = 1.0;
    let mut converged = false;

    for iter in 0..config.max_iter {
        // Project onto the tangent space of each point's sphere constraint.
        for (g, p) in grad.iter_mut().zip(&points) {
            *g -= p * g.dot(p);
        }
        let grad_sq: f64 = grad.iter().map(|g| g.norm_squared()).sum();
        if grad_sq.sqrt() < GRAD_TOLERANCE {
            converged = true;
            break;
        }

        let mut accepted = false;
        while step >= MIN_STEP {
            let trial: Vec<Vector3<f64>> = points
                .iter()
                .zip(&grad)
                .map(|(p, g)| (p - g * step).normalize())
                .collect();
            let (trial_energy, trial_grad) =
                energy_and_grad(&trial, &shells, weights, config.antipodal);
            if trial_energy <= energy - ARMIJO_C * step * grad_sq {
                let drop = energy - trial_energy;
                points = trial;
                grad = trial_grad;
                if !trial_energy.is_finite() {
                    return Err(EngineError::NonFinite {
                        context: "electrostatic initializer",
                    });
                }
                if drop <= RELATIVE_TOLERANCE * energy.abs() {
                    converged = true;
                }
                energy = trial_energy;
                step *= 2.0;
                accepted = true;
                break;
            }
            step *= 0.5;
        }
        if !accepted || converged {
            converged = true;
            debug!(iter, energy, "electrostatic descent converged");
            break;
        }
    }
    if !converged {
        warn!(
            max_iter = config.max_iter,
            energy, "electrostatic initializer stopped at iteration budget; returning last iterate"
        );
    }

    Ok(points)
}

/// Convenience entry: default shell groups, default weights.
pub fn optimize_default(
    points_per_shell: &[usize],
    config: &GeemConfig,
    init_points: Option<Vec<Vector3<f64>>>,
) -> Result<Vec<Vector3<f64>>, EngineError> {
    let (groups, alphas) = default_shell_groups(points_per_shell.len());
    let weights = compute_weights(points_per_shell, &groups, &alphas)?;
    optimize(points_per_shell, &weights, config, init_points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::{covering_radius, electrostatic_energy};
    use approx::assert_relative_eq;

    #[test]
    fn default_groups_are_singletons_plus_union() {
        let (groups, alphas) = default_shell_groups(3);
        assert_eq!(groups, vec![vec![0], vec![1], vec![2], vec![0, 1, 2]]);
        assert_eq!(alphas.len(), 4);
    }

    #[test]
    fn weights_for_one_shell_blend_shell_and_union_terms() {
        let (groups, alphas) = default_shell_groups(1);
        let w = compute_weights(&[10], &groups, &alphas).unwrap();
        // Singleton and union groups coincide: 2 / 100.
        assert_relative_eq!(w[(0, 0)], 0.02, epsilon = 1e-15);
    }

    #[test]
    fn group_and_alpha_count_mismatch_is_rejected() {
        let err = compute_weights(&[10, 10], &[vec![0], vec![1]], &[1.0]).unwrap_err();
        assert!(matches!(err, EngineError::InputMismatch(_)));
    }

    #[test]
    fn descent_reduces_energy_and_keeps_unit_norms() {
        let config = GeemConfig {
            max_iter: 300,
            ..GeemConfig::default()
        };
        let points = optimize_default(&[12], &config, None).unwrap();
        assert_eq!(points.len(), 12);
        for p in &points {
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-9);
        }
        // A converged layout beats a clearly bad one.
        let clustered: Vec<Vector3<f64>> = (0..12)
            .map(|i| Vector3::new(1.0, 1e-3 * i as f64, 0.0).normalize())
            .collect();
        assert!(
            electrostatic_energy(&points, 2, true) < electrostatic_energy(&clustered, 2, true)
        );
    }

    #[test]
    fn six_free_charges_settle_into_an_octahedron() {
        let config = GeemConfig {
            antipodal: false,
            max_iter: 2000,
            ..GeemConfig::default()
        };
        let points = optimize_default(&[6], &config, None).unwrap();
        let cr = covering_radius(&points, false);
        // Thomson optimum for six charges is the octahedron, pi/2 between
        // neighbors; the regularized surrogate lands close.
        assert!(cr > 1.35, "covering radius {cr} too small");
    }

    #[test]
    fn six_antipodal_directions_settle_into_an_icosahedral_packing() {
        let config = GeemConfig {
            max_iter: 2000,
            ..GeemConfig::default()
        };
        let points = optimize_default(&[6], &config, None).unwrap();
        let cr = covering_radius(&points, true);
        // Six lines pack optimally along icosahedral axes, arccos(1/sqrt 5)
        // apart; pairwise-orthogonal lines are impossible beyond three.
        assert!(cr > 1.05, "covering radius {cr} too small");
    }

    #[test]
    fn supplied_initialization_of_wrong_size_is_rejected() {
        let config = GeemConfig::default();
        let err = optimize_default(&[4], &config, Some(vec![Vector3::x(); 3])).unwrap_err();
        assert!(matches!(err, EngineError::InputMismatch(_)));
    }
}
