//! Polarity optimization.
//!
//! For acquisitions without antipodal symmetry the sign of every direction
//! matters. This module picks one orientation per point, over all shells at
//! once, so that either the minimal pairwise angle of the scheme is
//! maximized (distance criterion) or its electrostatic energy is minimized
//! (energy criterion). Both criteria become linear once each pair carries a
//! continuous XOR of the two endpoint flip bits, so the search runs as a
//! single MILP with the identity assignment as warm start.

use good_lp::{Expression, constraint, Variable};
use nalgebra::Vector3;
use tracing::{debug, instrument};

use super::config::{Criterion, FlipConfig};
use super::error::EngineError;
use super::milp::{MilpModel, Sense};
use crate::core::metrics::PAIR_EPSILON;

/// Electrostatic cost of one oriented pair, in cosine form: the charge sits
/// at angle arccos(c), so the cost of keeping the orientation is `f(c)` and
/// of flipping one endpoint is `f(-c)`.
fn pair_energy(cosine: f64, order: i32) -> f64 {
    1.0 / ((1.0 - cosine).powi(order) + PAIR_EPSILON)
}

/// Pins the continuous `x` to `a XOR b` via the four standard facets; with
/// binary endpoints they leave `x` no slack, so no extra integer variable
/// enters the model.
fn constrain_xor(model: &mut MilpModel, x: Variable, a: Variable, b: Variable) {
    model.constrain(constraint!(x <= a + b));
    model.constrain(constraint!(x + b >= a));
    model.constrain(constraint!(x + a >= b));
    model.constrain(constraint!(x + a + b <= 2.0));
}

/// Chooses a sign for every point and returns the reoriented shells.
#[instrument(skip_all, name = "flip_optimize", fields(shells = shells.len()))]
pub fn flip(
    shells: &[Vec<Vector3<f64>>],
    config: &FlipConfig,
) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    let points: Vec<Vector3<f64>> = shells.iter().flatten().copied().collect();
    if points.len() < 2 {
        return Ok(shells.to_vec());
    }
    let num_shells = shells.len();
    let shell_of: Vec<usize> = shells
        .iter()
        .enumerate()
        .flat_map(|(s, shell)| std::iter::repeat(s).take(shell.len()))
        .collect();

    let mut model = MilpModel::new();
    let flips: Vec<Variable> = (0..points.len()).map(|_| model.binary()).collect();
    // Global sign symmetry: pin the first point.
    model.constrain(constraint!(flips[0] <= 0.0));
    for &f in &flips {
        model.warm_start(f, 0.0);
    }

    // One XOR per pair; the flipped cosine is d_ij * (1 - 2 x_ij), linear
    // in the XOR bit.
    let mut xors = vec![vec![None::<Variable>; points.len()]; points.len()];
    for i in 0..points.len() - 1 {
        for j in i + 1..points.len() {
            let x = model.continuous(0.0, 1.0);
            constrain_xor(&mut model, x, flips[i], flips[j]);
            model.warm_start(x, 0.0);
            xors[i][j] = Some(x);
        }
    }

    let objective = match config.criterion {
        Criterion::Distance => {
            // Per-shell and union worst cosines; minimizing their weighted
            // sum maximizes the weighted minimal angles.
            let worst_union = model.continuous(-1.0, 1.0);
            let worst_shell: Vec<Variable> =
                (0..num_shells).map(|_| model.continuous(-1.0, 1.0)).collect();
            for i in 0..points.len() - 1 {
                for j in i + 1..points.len() {
                    let x = xors[i][j].unwrap();
                    let dot = points[i].dot(&points[j]);
                    model.constrain(constraint!(worst_union + 2.0 * dot * x >= dot));
                    if shell_of[i] == shell_of[j] {
                        let ws = worst_shell[shell_of[i]];
                        model.constrain(constraint!(ws + 2.0 * dot * x >= dot));
                    }
                }
            }
            let mut expr: Expression = (1.0 - config.weight) * worst_union;
            let shell_coeff = config.weight / num_shells as f64;
            for &ws in &worst_shell {
                expr += shell_coeff * ws;
            }
            expr
        }
        Criterion::Electrostatic => {
            let mut expr = Expression::from_other_affine(0.0);
            for i in 0..points.len() - 1 {
                for j in i + 1..points.len() {
                    let x = xors[i][j].unwrap();
                    let mut coeff = 1.0 - config.weight;
                    if shell_of[i] == shell_of[j] {
                        coeff += config.weight / num_shells as f64;
                    }
                    let dot = points[i].dot(&points[j]).clamp(-1.0, 1.0);
                    let same = pair_energy(dot, config.order);
                    let opposed = pair_energy(-dot, config.order);
                    expr += coeff * same;
                    expr += coeff * (opposed - same) * x;
                }
            }
            expr
        }
    };

    let solution = model.solve(Sense::Minimize, objective, &config.solve)?;
    let signs: Vec<f64> = flips
        .iter()
        .map(|&f| if solution.is_set(f) { -1.0 } else { 1.0 })
        .collect();
    debug!(
        flipped = signs.iter().filter(|&&s| s < 0.0).count(),
        total = points.len(),
        "polarity assignment solved"
    );

    let mut index = 0;
    let reoriented = shells
        .iter()
        .map(|shell| {
            shell
                .iter()
                .map(|p| {
                    let q = p * signs[index];
                    index += 1;
                    q
                })
                .collect()
        })
        .collect();
    Ok(reoriented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::{covering_radius, electrostatic_energy};
    use approx::assert_relative_eq;

    fn tetrahedron() -> Vec<Vector3<f64>> {
        let a = 1.0 / 3f64.sqrt();
        vec![
            Vector3::new(a, a, a),
            Vector3::new(a, -a, -a),
            Vector3::new(-a, a, -a),
            Vector3::new(-a, -a, a),
        ]
    }

    #[test]
    fn recovers_tetrahedron_from_one_bad_sign() {
        let mut shell = tetrahedron();
        shell[1] = -shell[1];
        assert_relative_eq!(
            covering_radius(&shell, false),
            (1.0f64 / 3.0).acos(),
            epsilon = 1e-9
        );
        let config = FlipConfig {
            criterion: Criterion::Distance,
            ..FlipConfig::default()
        };
        let flipped = flip(&[shell], &config).unwrap();
        assert_relative_eq!(
            covering_radius(&flipped[0], false),
            (-1.0f64 / 3.0).acos(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn never_worse_than_the_identity_assignment() {
        let shell = vec![
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(-1.0, 0.4, 0.2).normalize(),
        ];
        let before = covering_radius(&shell, false);
        let config = FlipConfig {
            criterion: Criterion::Distance,
            ..FlipConfig::default()
        };
        let flipped = flip(&[shell], &config).unwrap();
        assert!(covering_radius(&flipped[0], false) >= before - 1e-9);
    }

    #[test]
    fn energy_criterion_does_not_increase_energy() {
        let mut shell = tetrahedron();
        shell[2] = -shell[2];
        let before = electrostatic_energy(&shell, 1, false);
        let config = FlipConfig {
            criterion: Criterion::Electrostatic,
            ..FlipConfig::default()
        };
        let flipped = flip(&[shell], &config).unwrap();
        assert!(electrostatic_energy(&flipped[0], 1, false) <= before + 1e-9);
        // With first-order charges the tetrahedron costs 6 * f(-1/3) while
        // any single remaining bad sign costs three f(1/3) pairs; the energy
        // optimum is the exact tetrahedron.
        assert_relative_eq!(
            covering_radius(&flipped[0], false),
            (-1.0f64 / 3.0).acos(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn multi_shell_flip_improves_the_union() {
        let t = tetrahedron();
        let shell_a = vec![t[0], -t[1]];
        let shell_b = vec![t[2], t[3]];
        let union_before: Vec<Vector3<f64>> =
            shell_a.iter().chain(&shell_b).copied().collect();
        let config = FlipConfig {
            criterion: Criterion::Distance,
            ..FlipConfig::default()
        };
        let flipped = flip(&[shell_a, shell_b], &config).unwrap();
        let union: Vec<Vector3<f64>> = flipped.iter().flatten().copied().collect();
        assert!(covering_radius(&union, false) > covering_radius(&union_before, false) + 0.1);
        assert_eq!(flipped[0].len(), 2);
        assert_eq!(flipped[1].len(), 2);
    }

    #[test]
    fn single_point_passes_through() {
        let config = FlipConfig::default();
        let out = flip(&[vec![Vector3::x()]], &config).unwrap();
        assert_eq!(out[0], vec![Vector3::x()]);
    }
}
