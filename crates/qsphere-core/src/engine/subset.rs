//! Subset selection.
//!
//! Picks fixed-size subsets out of oversampled candidate pools so that the
//! chosen points stay as uniform as possible, per shell and over the union.
//! Three pool shapes are supported: one subset from one pool, several
//! disjoint shells from one shared pool, and one subset per pool from
//! per-shell pools. The distance criterion maximizes the weighted minimal
//! angles through big-M indicator constraints; the energy criterion
//! minimizes a pairwise electrostatic surrogate that is linear in the
//! selection bits.

use good_lp::{Expression, Variable, constraint};
use nalgebra::Vector3;
use tracing::{debug, instrument};

use super::config::{Criterion, SubsetConfig};
use super::error::EngineError;
use super::milp::{BigM, MilpModel, Sense, SolveFailure, sum_vars};
use crate::core::metrics::{PAIR_EPSILON, covering_radius_bound_for};

fn angle(u: &Vector3<f64>, v: &Vector3<f64>, antipodal: bool) -> f64 {
    let mut dot = u.dot(v).clamp(-1.0, 1.0);
    if antipodal {
        dot = dot.abs();
    }
    dot.acos()
}

/// Electrostatic surrogate of one pair, expressed in the (transformed)
/// cosine so both the direct and the mirrored charge are covered.
fn pair_energy(u: &Vector3<f64>, v: &Vector3<f64>, order: i32, antipodal: bool) -> f64 {
    let mut dot = u.dot(v).clamp(-1.0, 1.0);
    if antipodal {
        dot = dot.abs();
    }
    1.0 / ((1.0 - dot).powi(order) + PAIR_EPSILON)
        + 1.0 / ((1.0 + dot).powi(order) + PAIR_EPSILON)
}

fn attach_sizes(failure: SolveFailure, requested: &[usize]) -> EngineError {
    match failure {
        SolveFailure::Infeasible => EngineError::Infeasible {
            requested: requested.to_vec(),
        },
        SolveFailure::Backend(message) => EngineError::Solver(message),
    }
}

fn check_lower_bounds(config: &SubsetConfig, expected: usize) -> Result<Vec<f64>, EngineError> {
    match &config.lower_bounds {
        None => Ok(vec![0.0; expected]),
        Some(lb) if lb.len() == expected => Ok(lb.clone()),
        Some(lb) => Err(EngineError::InputMismatch(format!(
            "{} angle lower bounds supplied where {} are required",
            lb.len(),
            expected
        ))),
    }
}

/// Selects `k` points out of a single pool.
#[instrument(skip_all, name = "subset_single", fields(pool = pool.len(), k))]
pub fn single_from_single(
    pool: &[Vector3<f64>],
    k: usize,
    config: &SubsetConfig,
) -> Result<Vec<Vector3<f64>>, EngineError> {
    if k > pool.len() {
        return Err(EngineError::Infeasible { requested: vec![k] });
    }
    let lb = check_lower_bounds(config, 1)?;

    let mut model = MilpModel::new();
    let picks: Vec<Variable> = (0..pool.len()).map(|_| model.binary()).collect();
    model.constrain(constraint!(sum_vars(&picks) == k as f64));

    let solution = match config.criterion {
        Criterion::Distance => {
            let m = BigM::angle().value();
            let theta =
                model.continuous(lb[0], covering_radius_bound_for(k, config.antipodal));
            for i in 0..pool.len().saturating_sub(1) {
                for j in i + 1..pool.len() {
                    let d = angle(&pool[i], &pool[j], config.antipodal);
                    let (hi, hj) = (picks[i], picks[j]);
                    model.constrain(constraint!(theta + m * hi + m * hj <= d + 2.0 * m));
                }
            }
            model.solve(Sense::Maximize, Expression::from(theta), &config.solve)
        }
        Criterion::Electrostatic => {
            let energies: Vec<(usize, usize, f64)> = pairs(pool.len())
                .map(|(i, j)| {
                    (
                        i,
                        j,
                        pair_energy(&pool[i], &pool[j], config.order, config.antipodal),
                    )
                })
                .collect();
            let m = big_m_for(&energies);
            let mut objective = Expression::from_other_affine(0.0);
            for &(i, j, f) in &energies {
                let e = model.continuous(0.0, f64::INFINITY);
                let (hi, hj) = (picks[i], picks[j]);
                model.constrain(constraint!(e - m * hi - m * hj >= f - 2.0 * m));
                objective += e;
            }
            model.solve(Sense::Minimize, objective, &config.solve)
        }
    }
    .map_err(|e| attach_sizes(e, &[k]))?;

    let chosen: Vec<Vector3<f64>> = pool
        .iter()
        .zip(&picks)
        .filter(|&(_, &h)| solution.is_set(h))
        .map(|(p, _)| *p)
        .collect();
    debug!(chosen = chosen.len(), "single-pool selection solved");
    Ok(chosen)
}

/// Splits one shared pool into disjoint shells of the requested sizes.
#[instrument(skip_all, name = "subset_multi_from_pool", fields(pool = pool.len()))]
pub fn multi_from_single(
    pool: &[Vector3<f64>],
    points_per_shell: &[usize],
    config: &SubsetConfig,
) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    let total: usize = points_per_shell.iter().sum();
    if total > pool.len() {
        return Err(EngineError::Infeasible {
            requested: points_per_shell.to_vec(),
        });
    }
    let num_shells = points_per_shell.len();
    let lb = check_lower_bounds(config, num_shells + 1)?;

    let mut model = MilpModel::new();
    let picks: Vec<Vec<Variable>> = (0..pool.len())
        .map(|_| (0..num_shells).map(|_| model.binary()).collect())
        .collect();
    // Each pool point lands in at most one shell.
    for row in &picks {
        model.one_hot(row);
    }
    for (s, &k) in points_per_shell.iter().enumerate() {
        let column: Vec<Variable> = picks.iter().map(|row| row[s]).collect();
        model.constrain(constraint!(sum_vars(&column) == k as f64));
    }

    let solution = match config.criterion {
        Criterion::Distance => {
            let m = BigM::angle().value();
            let theta_shell: Vec<Variable> = points_per_shell
                .iter()
                .enumerate()
                .map(|(s, &k)| {
                    model.continuous(lb[s], covering_radius_bound_for(k, config.antipodal))
                })
                .collect();
            let theta_union = model.continuous(
                lb[num_shells],
                covering_radius_bound_for(total, config.antipodal),
            );
            for (i, j) in pairs(pool.len()) {
                let d = angle(&pool[i], &pool[j], config.antipodal);
                for s in 0..num_shells {
                    let (hi, hj) = (picks[i][s], picks[j][s]);
                    let ts = theta_shell[s];
                    model.constrain(constraint!(ts + m * hi + m * hj <= d + 2.0 * m));
                }
                let gi = sum_vars(&picks[i]);
                let gj = sum_vars(&picks[j]);
                model.constrain(constraint!(
                    theta_union + m * gi + m * gj <= d + 2.0 * m
                ));
            }
            let mut objective: Expression = (1.0 - config.weight) * theta_union;
            for &t in &theta_shell {
                objective += config.weight / num_shells as f64 * t;
            }
            model.solve(Sense::Maximize, objective, &config.solve)
        }
        Criterion::Electrostatic => {
            let energies: Vec<(usize, usize, f64)> = pairs(pool.len())
                .map(|(i, j)| {
                    (
                        i,
                        j,
                        pair_energy(&pool[i], &pool[j], config.order, config.antipodal),
                    )
                })
                .collect();
            let m = big_m_for(&energies);
            let mut objective = Expression::from_other_affine(0.0);
            for &(i, j, f) in &energies {
                for (s, &k) in points_per_shell.iter().enumerate() {
                    let e = model.continuous(0.0, f64::INFINITY);
                    let (hi, hj) = (picks[i][s], picks[j][s]);
                    model.constrain(constraint!(e - m * hi - m * hj >= f - 2.0 * m));
                    objective += config.weight / (k * k).max(1) as f64 * e;
                }
                let e = model.continuous(0.0, f64::INFINITY);
                let gi = sum_vars(&picks[i]);
                let gj = sum_vars(&picks[j]);
                model.constrain(constraint!(e - m * gi - m * gj >= f - 2.0 * m));
                objective += (1.0 - config.weight) / (total * total).max(1) as f64 * e;
            }
            model.solve(Sense::Minimize, objective, &config.solve)
        }
    }
    .map_err(|e| attach_sizes(e, points_per_shell))?;

    let mut shells = vec![Vec::new(); num_shells];
    for (point, row) in pool.iter().zip(&picks) {
        for (s, &h) in row.iter().enumerate() {
            if solution.is_set(h) {
                shells[s].push(*point);
            }
        }
    }
    debug!(sizes = ?shells.iter().map(Vec::len).collect::<Vec<_>>(), "shared-pool selection solved");
    Ok(shells)
}

/// Selects one subset per pool, balancing each shell against the union of
/// all selections. Only the distance criterion is defined for disjoint
/// pools.
#[instrument(skip_all, name = "subset_multi_from_pools", fields(pools = pools.len()))]
pub fn multi_from_multi(
    pools: &[Vec<Vector3<f64>>],
    points_per_shell: &[usize],
    config: &SubsetConfig,
) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    if pools.len() != points_per_shell.len() {
        return Err(EngineError::InputMismatch(format!(
            "{} candidate pools for {} requested shell sizes",
            pools.len(),
            points_per_shell.len()
        )));
    }
    if matches!(config.criterion, Criterion::Electrostatic) {
        return Err(EngineError::InputMismatch(
            "energy criterion requires a single shared pool".to_string(),
        ));
    }
    if pools
        .iter()
        .zip(points_per_shell)
        .any(|(pool, &k)| k > pool.len())
    {
        return Err(EngineError::Infeasible {
            requested: points_per_shell.to_vec(),
        });
    }
    let num_shells = pools.len();
    let total: usize = points_per_shell.iter().sum();
    let lb = check_lower_bounds(config, num_shells + 1)?;
    let m = BigM::angle().value();

    let mut model = MilpModel::new();
    let picks: Vec<Vec<Variable>> = pools
        .iter()
        .map(|pool| (0..pool.len()).map(|_| model.binary()).collect())
        .collect();
    for (s, &k) in points_per_shell.iter().enumerate() {
        model.constrain(constraint!(sum_vars(&picks[s]) == k as f64));
    }

    let theta_shell: Vec<Variable> = points_per_shell
        .iter()
        .enumerate()
        .map(|(s, &k)| model.continuous(lb[s], covering_radius_bound_for(k, config.antipodal)))
        .collect();
    let theta_union = model.continuous(
        lb[num_shells],
        covering_radius_bound_for(total, config.antipodal),
    );

    // The union angle binds every selected pair, intra-shell ones included.
    for s in 0..num_shells {
        for (i, j) in pairs(pools[s].len()) {
            let d = angle(&pools[s][i], &pools[s][j], config.antipodal);
            let (hi, hj) = (picks[s][i], picks[s][j]);
            let ts = theta_shell[s];
            model.constrain(constraint!(ts + m * hi + m * hj <= d + 2.0 * m));
            model.constrain(constraint!(theta_union + m * hi + m * hj <= d + 2.0 * m));
        }
    }
    for s in 0..num_shells.saturating_sub(1) {
        for t in s + 1..num_shells {
            for i in 0..pools[s].len() {
                for j in 0..pools[t].len() {
                    let d = angle(&pools[s][i], &pools[t][j], config.antipodal);
                    let (hi, hj) = (picks[s][i], picks[t][j]);
                    model.constrain(constraint!(
                        theta_union + m * hi + m * hj <= d + 2.0 * m
                    ));
                }
            }
        }
    }

    let mut objective: Expression = (1.0 - config.weight) * theta_union;
    for &t in &theta_shell {
        objective += config.weight / num_shells as f64 * t;
    }
    let solution = model
        .solve(Sense::Maximize, objective, &config.solve)
        .map_err(|e| attach_sizes(e, points_per_shell))?;

    let shells = pools
        .iter()
        .zip(&picks)
        .map(|(pool, row)| {
            pool.iter()
                .zip(row)
                .filter(|&(_, &h)| solution.is_set(h))
                .map(|(p, _)| *p)
                .collect()
        })
        .collect();
    Ok(shells)
}

fn pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n.saturating_sub(1)).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
}

fn big_m_for(energies: &[(usize, usize, f64)]) -> f64 {
    let max = energies.iter().map(|&(_, _, f)| f).fold(0.0, f64::max);
    BigM::new(max, max).value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::{covering_radius, electrostatic_energy};
    use approx::assert_relative_eq;

    fn cube() -> Vec<Vector3<f64>> {
        let a = 1.0 / 3f64.sqrt();
        [
            (1.0, 1.0, 1.0),
            (1.0, 1.0, -1.0),
            (1.0, -1.0, 1.0),
            (1.0, -1.0, -1.0),
            (-1.0, 1.0, 1.0),
            (-1.0, 1.0, -1.0),
            (-1.0, -1.0, 1.0),
            (-1.0, -1.0, -1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vector3::new(x * a, y * a, z * a))
        .collect()
    }

    #[test]
    fn four_of_a_cube_under_symmetry_keep_distinct_axes() {
        let config = SubsetConfig {
            antipodal: true,
            ..SubsetConfig::default()
        };
        let chosen = single_from_single(&cube(), 4, &config).unwrap();
        assert_eq!(chosen.len(), 4);
        // Four distinct cube diagonals pairwise subtend acos(1/3).
        assert_relative_eq!(
            covering_radius(&chosen, true),
            (1.0f64 / 3.0).acos(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn four_of_a_cube_without_symmetry_form_a_tetrahedron() {
        let config = SubsetConfig {
            antipodal: false,
            ..SubsetConfig::default()
        };
        let chosen = single_from_single(&cube(), 4, &config).unwrap();
        assert_relative_eq!(
            covering_radius(&chosen, false),
            (-1.0f64 / 3.0).acos(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn oversized_request_reports_the_sizes() {
        let config = SubsetConfig::default();
        match single_from_single(&cube(), 9, &config) {
            Err(EngineError::Infeasible { requested }) => assert_eq!(requested, vec![9]),
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn lower_bound_arity_is_validated() {
        let config = SubsetConfig {
            lower_bounds: Some(vec![0.1, 0.1]),
            ..SubsetConfig::default()
        };
        assert!(matches!(
            single_from_single(&cube(), 4, &config),
            Err(EngineError::InputMismatch(_))
        ));
    }

    #[test]
    fn shared_pool_split_is_disjoint_and_exhaustive() {
        let config = SubsetConfig {
            antipodal: true,
            ..SubsetConfig::default()
        };
        let shells = multi_from_single(&cube(), &[4, 4], &config).unwrap();
        assert_eq!(shells[0].len(), 4);
        assert_eq!(shells[1].len(), 4);
        let mut all: Vec<Vector3<f64>> = shells.iter().flatten().copied().collect();
        all.sort_by(|a, b| a.as_slice().partial_cmp(b.as_slice()).unwrap());
        all.dedup();
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn per_pool_selection_respects_pool_membership() {
        let pool_a = cube();
        let pool_b = vec![Vector3::x(), Vector3::y(), Vector3::z()];
        let config = SubsetConfig {
            antipodal: true,
            ..SubsetConfig::default()
        };
        let shells =
            multi_from_multi(&[pool_a.clone(), pool_b.clone()], &[2, 2], &config).unwrap();
        assert_eq!(shells[0].len(), 2);
        assert_eq!(shells[1].len(), 2);
        assert!(shells[0].iter().all(|p| pool_a.contains(p)));
        assert!(shells[1].iter().all(|p| pool_b.contains(p)));
    }

    #[test]
    fn pool_count_mismatch_is_rejected() {
        let config = SubsetConfig::default();
        assert!(matches!(
            multi_from_multi(&[cube()], &[2, 2], &config),
            Err(EngineError::InputMismatch(_))
        ));
    }

    #[test]
    fn three_point_selection_reaches_the_great_circle_triangle() {
        // An equilateral triangle on the equator subtends 2*pi/3 > 2, so the
        // indicator slack must admit the full angle range. The near-duplicate
        // of the first vertex and the slightly tilted runner-up triangle
        // (min angle about 2.077) expose any slack that tops out below pi.
        let tilt = 0.1f64;
        let mut pool = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-0.5, 3f64.sqrt() / 2.0, 0.0),
            Vector3::new(-0.5, -3f64.sqrt() / 2.0, 0.0),
            Vector3::new(0.01f64.cos(), 0.01f64.sin(), 0.0),
        ];
        for azimuth in [1, 3, 5] {
            let phi = azimuth as f64 * std::f64::consts::FRAC_PI_3;
            pool.push(Vector3::new(
                tilt.cos() * phi.cos(),
                tilt.cos() * phi.sin(),
                tilt.sin(),
            ));
        }
        let config = SubsetConfig {
            antipodal: false,
            criterion: Criterion::Distance,
            ..SubsetConfig::default()
        };
        let chosen = single_from_single(&pool, 3, &config).unwrap();
        assert_relative_eq!(
            covering_radius(&chosen, false),
            2.0 * std::f64::consts::FRAC_PI_3,
            epsilon = 1e-6
        );
    }

    #[test]
    fn energy_criterion_beats_a_clustered_pick() {
        let config = SubsetConfig {
            antipodal: true,
            criterion: Criterion::Electrostatic,
            ..SubsetConfig::default()
        };
        let pool = cube();
        let chosen = single_from_single(&pool, 4, &config).unwrap();
        assert_eq!(chosen.len(), 4);
        // A pick containing an antipodal pair collapses two charges onto
        // one axis and costs far more.
        let collapsed = vec![pool[0], pool[1], pool[2], pool[7]];
        assert!(
            electrostatic_energy(&chosen, 1, true) < electrostatic_energy(&collapsed, 1, true)
        );
    }
}
