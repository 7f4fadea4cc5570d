//! Continuous angular-separation refinement.
//!
//! Maximizes a weighted combination of the per-shell separation angles and
//! the union separation angle, subject to unit-norm constraints on every
//! point. The separation constraints are only generated for candidate pairs
//! that are already close in the starting layout; pairs further apart than
//! the theoretical covering-radius bound plus a slack of `2 * delta` can
//! never become binding at the optimum.
//!
//! Besides the separation inequalities the model carries a trust region
//! (no point may deviate more than `delta` radians from its initializer),
//! the per-shell link `theta_shell >= theta_union`, and the unit-norm
//! equalities.
//!
//! The solver is an augmented Lagrangian over the analytic gradients: the
//! unit-norm equalities carry classic multiplier terms, the inequalities
//! use the shifted quadratic penalty
//! `psi(c) = (max(0, lambda - mu c)^2 - lambda^2) / (2 mu)`, and the angle
//! variables are kept inside their box bounds by projection. Progress is
//! tracked on restored iterates (points renormalized, angle variables set
//! to the separations actually attained), so the returned scheme is the
//! best feasible layout seen; on a stalled run that best iterate is
//! returned rather than failing.

use nalgebra::{DVector, Vector3};
use tracing::{debug, instrument, warn};

use super::config::CnloConfig;
use super::error::EngineError;
use crate::core::metrics::covering_radius_bound_for;

const ACOS_EPSILON: f64 = 1e-10;
const FEASIBILITY_TOL: f64 = 1e-6;
const GRAD_TOLERANCE: f64 = 1e-8;
const ARMIJO_C: f64 = 1e-4;
const MIN_STEP: f64 = 1e-14;
const INITIAL_PENALTY: f64 = 10.0;
const PENALTY_GROWTH: f64 = 2.0;

fn transform(dot: f64, antipodal: bool) -> f64 {
    if antipodal { dot.abs() } else { dot }
}

fn grad_transform(dot: f64, antipodal: bool) -> f64 {
    if antipodal { dot.signum() } else { 1.0 }
}

/// One angular-separation inequality `acos(t(p_i . p_j)) - theta >= 0`.
struct PairConstraint {
    i: usize,
    j: usize,
    /// Index of the angle variable this pair bounds (shell index, or S for
    /// the union angle).
    angle: usize,
}

struct Model {
    offsets: Vec<usize>,
    num_points: usize,
    num_shells: usize,
    antipodal: bool,
    weight: f64,
    delta: f64,
    /// Starting layout; every point is trust-region-bound to its entry.
    init: Vec<Vector3<f64>>,
    pairs: Vec<PairConstraint>,
    angle_bounds: Vec<f64>,
}

/// One multiplier estimate per constraint, grouped by family.
struct Multipliers {
    norms: Vec<f64>,
    pairs: Vec<f64>,
    trust: Vec<f64>,
    links: Vec<f64>,
}

impl Multipliers {
    fn zeros(model: &Model) -> Self {
        Self {
            norms: vec![0.0; model.num_points],
            pairs: vec![0.0; model.pairs.len()],
            trust: vec![0.0; model.num_points],
            links: vec![0.0; model.num_shells],
        }
    }
}

impl Model {
    fn new(shells: &[Vec<Vector3<f64>>], points: &[Vector3<f64>], config: &CnloConfig) -> Self {
        let num_shells = shells.len();
        let mut offsets = vec![0usize];
        for shell in shells {
            offsets.push(offsets.last().unwrap() + shell.len());
        }
        let num_points = *offsets.last().unwrap();

        let mut angle_bounds: Vec<f64> = shells
            .iter()
            .map(|shell| covering_radius_bound_for(shell.len(), config.antipodal))
            .collect();
        let union_bound = covering_radius_bound_for(num_points, config.antipodal);
        angle_bounds.push(union_bound);

        let shell_of = |index: usize| offsets.iter().rposition(|&o| o <= index).unwrap();

        // Candidate pairs from the starting layout. A pair enters the
        // per-shell constraint set when its angle is below the shell bound
        // plus slack, and the union set when below the union bound plus
        // slack.
        let mut pairs = Vec::new();
        for i in 0..num_points.saturating_sub(1) {
            for j in i + 1..num_points {
                let t = transform(points[i].dot(&points[j]), config.antipodal);
                let si = shell_of(i);
                if si == shell_of(j) && t >= (2.0 * config.delta + angle_bounds[si]).cos() {
                    pairs.push(PairConstraint { i, j, angle: si });
                }
                if t >= (2.0 * config.delta + union_bound).cos() {
                    pairs.push(PairConstraint {
                        i,
                        j,
                        angle: num_shells,
                    });
                }
            }
        }

        Self {
            offsets,
            num_points,
            num_shells,
            antipodal: config.antipodal,
            weight: config.weight,
            delta: config.delta,
            init: points.to_vec(),
            pairs,
            angle_bounds,
        }
    }

    fn dim(&self) -> usize {
        3 * self.num_points + self.num_shells + 1
    }

    fn point(&self, x: &DVector<f64>, i: usize) -> Vector3<f64> {
        Vector3::new(x[3 * i], x[3 * i + 1], x[3 * i + 2])
    }

    fn angle_index(&self, k: usize) -> usize {
        3 * self.num_points + k
    }

    fn add_to_point(&self, grad: &mut DVector<f64>, i: usize, v: Vector3<f64>) {
        grad[3 * i] += v.x;
        grad[3 * i + 1] += v.y;
        grad[3 * i + 2] += v.z;
    }

    fn initial_state(&self, points: &[Vector3<f64>]) -> DVector<f64> {
        let mut x = DVector::zeros(self.dim());
        for (i, p) in points.iter().enumerate() {
            x[3 * i] = p.x;
            x[3 * i + 1] = p.y;
            x[3 * i + 2] = p.z;
        }
        self.restored(&x)
    }

    /// Nearest interesting feasible state: points renormalized, every angle
    /// variable pulled down to the separation its constraint set actually
    /// attains (and the union angle never above any shell angle). Only the
    /// trust region can remain violated in the result.
    fn restored(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut out = x.clone();
        for i in 0..self.num_points {
            let p = self.point(x, i).normalize();
            out[3 * i] = p.x;
            out[3 * i + 1] = p.y;
            out[3 * i + 2] = p.z;
        }
        let mut angles = self.angle_bounds.clone();
        for pc in &self.pairs {
            let t = transform(
                self.point(&out, pc.i).dot(&self.point(&out, pc.j)),
                self.antipodal,
            );
            angles[pc.angle] = angles[pc.angle].min(t.clamp(-1.0, 1.0).acos());
        }
        let shell_floor = angles[..self.num_shells]
            .iter()
            .fold(f64::INFINITY, |m, &a| m.min(a));
        angles[self.num_shells] = angles[self.num_shells].min(shell_floor);
        for (k, angle) in angles.iter().enumerate() {
            out[self.angle_index(k)] = angle.max(0.0);
        }
        out
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        let per_shell: f64 = (0..self.num_shells)
            .map(|k| x[self.angle_index(k)])
            .sum::<f64>()
            / self.num_shells as f64;
        let union = x[self.angle_index(self.num_shells)];
        -(self.weight * per_shell + (1.0 - self.weight) * union)
    }

    fn trust_slack(&self, x: &DVector<f64>, i: usize) -> f64 {
        let dot = self.point(x, i).dot(&self.init[i]).clamp(-1.0, 1.0);
        self.delta - transform(dot, self.antipodal).acos()
    }

    /// Maximum violation over all four constraint families.
    fn violation(&self, x: &DVector<f64>) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..self.num_points {
            worst = worst.max((self.point(x, i).norm_squared() - 1.0).abs());
            worst = worst.max(-self.trust_slack(x, i));
        }
        for pc in &self.pairs {
            let t = transform(
                self.point(x, pc.i).dot(&self.point(x, pc.j)),
                self.antipodal,
            );
            let c = t.clamp(-1.0, 1.0).acos() - x[self.angle_index(pc.angle)];
            worst = worst.max(-c);
        }
        let union = x[self.angle_index(self.num_shells)];
        for s in 0..self.num_shells {
            worst = worst.max(union - x[self.angle_index(s)]);
        }
        worst
    }

    /// Augmented Lagrangian value and gradient.
    fn lagrangian(&self, x: &DVector<f64>, m: &Multipliers, mu: f64) -> (f64, DVector<f64>) {
        let mut value = self.objective(x);
        let mut grad = DVector::zeros(self.dim());
        let shell_coeff = -self.weight / self.num_shells as f64;
        for k in 0..self.num_shells {
            grad[self.angle_index(k)] = shell_coeff;
        }
        grad[self.angle_index(self.num_shells)] = -(1.0 - self.weight);

        for (i, &lambda) in m.norms.iter().enumerate() {
            let p = self.point(x, i);
            let h = p.norm_squared() - 1.0;
            let coeff = lambda + mu * h;
            value += lambda * h + 0.5 * mu * h * h;
            self.add_to_point(&mut grad, i, p * (2.0 * coeff));
        }

        for (pc, &lambda) in self.pairs.iter().zip(&m.pairs) {
            let pi = self.point(x, pc.i);
            let pj = self.point(x, pc.j);
            let dot = pi.dot(&pj).clamp(-1.0, 1.0);
            let t = transform(dot, self.antipodal);
            let c = t.acos() - x[self.angle_index(pc.angle)];
            let active = (lambda - mu * c).max(0.0);
            value += (active * active - lambda * lambda) / (2.0 * mu);
            if active > 0.0 {
                let dacos =
                    -grad_transform(dot, self.antipodal) / (1.0 - t * t + ACOS_EPSILON).sqrt();
                let scale = -active * dacos;
                self.add_to_point(&mut grad, pc.i, pj * scale);
                self.add_to_point(&mut grad, pc.j, pi * scale);
                grad[self.angle_index(pc.angle)] += active;
            }
        }

        for (i, &lambda) in m.trust.iter().enumerate() {
            let dot = self.point(x, i).dot(&self.init[i]).clamp(-1.0, 1.0);
            let t = transform(dot, self.antipodal);
            let c = self.delta - t.acos();
            let active = (lambda - mu * c).max(0.0);
            value += (active * active - lambda * lambda) / (2.0 * mu);
            if active > 0.0 {
                // dc/dp = grad_transform / sqrt(1 - t^2) * init.
                let dacos =
                    grad_transform(dot, self.antipodal) / (1.0 - t * t + ACOS_EPSILON).sqrt();
                self.add_to_point(&mut grad, i, self.init[i] * (-active * dacos));
            }
        }

        let union_idx = self.angle_index(self.num_shells);
        for (s, &lambda) in m.links.iter().enumerate() {
            let c = x[self.angle_index(s)] - x[union_idx];
            let active = (lambda - mu * c).max(0.0);
            value += (active * active - lambda * lambda) / (2.0 * mu);
            if active > 0.0 {
                grad[self.angle_index(s)] -= active;
                grad[union_idx] += active;
            }
        }
        (value, grad)
    }

    /// First-order multiplier update at the end of an outer iteration.
    fn update_multipliers(&self, x: &DVector<f64>, m: &mut Multipliers, mu: f64) {
        for (i, lambda) in m.norms.iter_mut().enumerate() {
            *lambda += mu * (self.point(x, i).norm_squared() - 1.0);
        }
        for (pc, lambda) in self.pairs.iter().zip(m.pairs.iter_mut()) {
            let t = transform(
                self.point(x, pc.i).dot(&self.point(x, pc.j)),
                self.antipodal,
            );
            let c = t.clamp(-1.0, 1.0).acos() - x[self.angle_index(pc.angle)];
            *lambda = (*lambda - mu * c).max(0.0);
        }
        for (i, lambda) in m.trust.iter_mut().enumerate() {
            *lambda = (*lambda - mu * self.trust_slack(x, i)).max(0.0);
        }
        let union = x[self.angle_index(self.num_shells)];
        for (s, lambda) in m.links.iter_mut().enumerate() {
            let c = x[self.angle_index(s)] - union;
            *lambda = (*lambda - mu * c).max(0.0);
        }
    }

    /// Zeroes gradient components that push an angle variable out of its
    /// box, so stationarity at an active bound is visible.
    fn reduce_gradient(&self, x: &DVector<f64>, grad: &mut DVector<f64>) {
        for k in 0..=self.num_shells {
            let idx = self.angle_index(k);
            if (x[idx] <= 0.0 && grad[idx] > 0.0)
                || (x[idx] >= self.angle_bounds[k] && grad[idx] < 0.0)
            {
                grad[idx] = 0.0;
            }
        }
    }

    /// Clamps the angle variables into their box bounds.
    fn project(&self, x: &mut DVector<f64>) {
        for k in 0..=self.num_shells {
            let idx = self.angle_index(k);
            x[idx] = x[idx].clamp(0.0, self.angle_bounds[k]);
        }
    }

    fn extract_shells(&self, x: &DVector<f64>) -> Vec<Vec<Vector3<f64>>> {
        (0..self.num_shells)
            .map(|s| {
                (self.offsets[s]..self.offsets[s + 1])
                    .map(|i| self.point(x, i).normalize())
                    .collect()
            })
            .collect()
    }
}

/// Refines the given shells in place of their starting layout. Input points
/// are taken as the initialization and must be reasonably spread already
/// (an electrostatic start works well).
#[instrument(skip_all, name = "cnlo_optimize", fields(shells = shells.len()))]
pub fn optimize(
    shells: &[Vec<Vector3<f64>>],
    config: &CnloConfig,
) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    if shells.iter().all(|s| s.is_empty()) {
        return Err(EngineError::InputMismatch(
            "no points to optimize".to_string(),
        ));
    }
    let points: Vec<Vector3<f64>> = shells
        .iter()
        .flatten()
        .map(|p| p.normalize())
        .collect();
    let model = Model::new(shells, &points, config);
    debug!(
        pairs = model.pairs.len(),
        points = model.num_points,
        "candidate constraint set built"
    );

    let mut x = model.initial_state(&points);
    let mut multipliers = Multipliers::zeros(&model);
    let mut mu = INITIAL_PENALTY;

    // The initial state is feasible by construction, so the best iterate is
    // never worse than the starting layout.
    let mut best = x.clone();
    let mut best_objective = model.objective(&x);
    let mut previous_violation = f64::INFINITY;
    let mut budget = config.max_iter;
    let mut step = 1.0;

    while budget > 0 {
        // Inner descent on the augmented Lagrangian at fixed multipliers.
        let (mut value, mut grad) = model.lagrangian(&x, &multipliers, mu);
        if !value.is_finite() {
            return Err(EngineError::NonFinite {
                context: "separation refinement",
            });
        }
        let mut inner_done = false;
        while budget > 0 && !inner_done {
            budget -= 1;
            model.reduce_gradient(&x, &mut grad);
            let grad_norm = grad.norm();
            if grad_norm < GRAD_TOLERANCE {
                break;
            }
            let mut accepted = false;
            while step >= MIN_STEP {
                let mut trial = &x - &grad * step;
                model.project(&mut trial);
                let (trial_value, trial_grad) = model.lagrangian(&trial, &multipliers, mu);
                if !trial_value.is_finite() {
                    return Err(EngineError::NonFinite {
                        context: "separation refinement",
                    });
                }
                if trial_value <= value - ARMIJO_C * step * grad_norm * grad_norm {
                    x = trial;
                    value = trial_value;
                    grad = trial_grad;
                    step *= 2.0;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                inner_done = true;
            }
        }

        let violation = model.violation(&x);
        model.update_multipliers(&x, &mut multipliers, mu);
        if violation > 0.25 * previous_violation {
            mu *= PENALTY_GROWTH;
        }
        previous_violation = violation;

        // Penalty-phase iterates rarely satisfy every constraint to
        // tolerance, so progress is measured on their restored projection,
        // which is feasible except possibly in the trust region.
        let candidate = model.restored(&x);
        let candidate_objective = model.objective(&candidate);
        if model.violation(&candidate) <= FEASIBILITY_TOL
            && candidate_objective < best_objective
        {
            best.copy_from(&candidate);
            best_objective = candidate_objective;
        }
        model.reduce_gradient(&x, &mut grad);
        if violation <= FEASIBILITY_TOL && grad.norm() < GRAD_TOLERANCE {
            debug!(objective = best_objective, violation, "refinement converged");
            return Ok(model.extract_shells(&best));
        }
        step = 1.0;
    }

    warn!(
        objective = best_objective,
        "separation refinement stopped at iteration budget; returning best iterate"
    );
    Ok(model.extract_shells(&best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::covering_radius;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn perturbed(points: &[Vector3<f64>], magnitude: f64) -> Vec<Vector3<f64>> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let noise = Vector3::new(
                    ((i * 7 + 1) as f64).sin(),
                    ((i * 13 + 2) as f64).sin(),
                    ((i * 29 + 3) as f64).sin(),
                ) * magnitude;
                (p + noise).normalize()
            })
            .collect()
    }

    #[test]
    fn transform_respects_symmetry_mode() {
        assert_relative_eq!(transform(-0.5, true), 0.5);
        assert_relative_eq!(transform(-0.5, false), -0.5);
        assert_relative_eq!(grad_transform(-0.5, true), -1.0);
        assert_relative_eq!(grad_transform(-0.5, false), 1.0);
    }

    #[test]
    fn octahedron_is_recovered_for_six_free_points() {
        // Six free points maximize their minimum separation at the
        // octahedron, pi/2 between neighbors.
        let ideal = vec![
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            -Vector3::x(),
            -Vector3::y(),
            -Vector3::z(),
        ];
        let start = perturbed(&ideal, 0.05);
        let config = CnloConfig {
            antipodal: false,
            max_iter: 4000,
            ..CnloConfig::default()
        };
        let refined = optimize(&[start.clone()], &config).unwrap();
        let cr = covering_radius(&refined[0], false);
        assert!(cr > covering_radius(&start, false) - 1e-9);
        assert_relative_eq!(cr, PI / 2.0, epsilon = 0.05);
    }

    #[test]
    fn refinement_never_leaves_the_trust_region() {
        // A clustered start wants to spread much further than delta allows.
        let start: Vec<Vector3<f64>> = (0..4)
            .map(|i| {
                Vector3::new(1.0, 0.05 * i as f64, 0.02 * i as f64).normalize()
            })
            .collect();
        let delta = 0.05;
        let config = CnloConfig {
            antipodal: false,
            delta,
            max_iter: 2000,
            ..CnloConfig::default()
        };
        let refined = optimize(&[start.clone()], &config).unwrap();
        for (p, q) in refined[0].iter().zip(&start) {
            let moved = p.dot(q).clamp(-1.0, 1.0).acos();
            assert!(moved <= delta + 1e-3, "point moved {moved} > {delta}");
        }
    }

    #[test]
    fn tetrahedron_is_recovered_without_symmetry() {
        let a = 1.0 / 3f64.sqrt();
        let ideal = vec![
            Vector3::new(a, a, a),
            Vector3::new(a, -a, -a),
            Vector3::new(-a, a, -a),
            Vector3::new(-a, -a, a),
        ];
        let start = perturbed(&ideal, 0.05);
        let config = CnloConfig {
            antipodal: false,
            max_iter: 4000,
            ..CnloConfig::default()
        };
        let refined = optimize(&[start], &config).unwrap();
        let cr = covering_radius(&refined[0], false);
        assert_relative_eq!(cr, (-1.0f64 / 3.0).acos(), epsilon = 0.02);
    }

    #[test]
    fn output_points_stay_unit_norm() {
        let shell = perturbed(
            &[
                Vector3::x(),
                Vector3::y(),
                Vector3::z(),
                Vector3::new(1.0, 1.0, 1.0).normalize(),
            ],
            0.1,
        );
        let config = CnloConfig {
            max_iter: 500,
            ..CnloConfig::default()
        };
        let refined = optimize(&[shell], &config).unwrap();
        for p in &refined[0] {
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn multi_shell_refinement_improves_both_levels() {
        let shell_a = perturbed(&[Vector3::x(), Vector3::y(), Vector3::z()], 0.15);
        let shell_b = perturbed(
            &[
                Vector3::new(1.0, 1.0, 0.0).normalize(),
                Vector3::new(0.0, 1.0, 1.0).normalize(),
                Vector3::new(1.0, 0.0, 1.0).normalize(),
            ],
            0.15,
        );
        let start_union: Vec<Vector3<f64>> =
            shell_a.iter().chain(&shell_b).copied().collect();
        let config = CnloConfig {
            antipodal: true,
            max_iter: 3000,
            ..CnloConfig::default()
        };
        let refined = optimize(&[shell_a.clone(), shell_b.clone()], &config).unwrap();
        let union: Vec<Vector3<f64>> = refined.iter().flatten().copied().collect();
        assert!(covering_radius(&union, true) >= covering_radius(&start_union, true) - 0.05);
        assert!(covering_radius(&refined[0], true) >= covering_radius(&shell_a, true) - 0.05);
    }

    #[test]
    fn empty_input_is_rejected() {
        let config = CnloConfig::default();
        assert!(matches!(
            optimize(&[Vec::new()], &config),
            Err(EngineError::InputMismatch(_))
        ));
    }
}
