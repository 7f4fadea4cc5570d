//! Acquisition-order optimization.
//!
//! Reorders a finished scheme so that every prefix of the sequence is itself
//! as uniform as possible, which keeps interrupted scans usable. The order
//! is built batch by batch: a greedy pass re-sorts the remaining points to
//! seed the solver, then a small assignment MILP places the next batch of
//! points into sequence positions, minimizing position-weighted worst
//! cosines over all prefixes. Polarity is irrelevant to ordering, so all
//! angles here are antipodal.

use good_lp::{Expression, Variable, constraint};
use nalgebra::Vector3;
use tracing::{debug, instrument};

use super::config::OrderConfig;
use super::error::EngineError;
use super::milp::{BigM, MilpModel, Sense};
use crate::core::metrics::{covering_radius, covering_radius_bound_for, packing_density};

/// Splits `n` points into batches of `batch`, with one smaller trailing
/// batch for the remainder.
pub fn gen_split(batch: usize, n: usize) -> Vec<usize> {
    if batch == 0 {
        return if n > 0 { vec![n] } else { Vec::new() };
    }
    let mut splits = vec![batch; n / batch];
    if n % batch != 0 {
        splits.push(n % batch);
    }
    splits
}

fn abs_cos(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    u.dot(v).abs().clamp(0.0, 1.0)
}

fn greedy_from(points: &[Vector3<f64>], first: usize, start: &[Vector3<f64>]) -> Vec<usize> {
    let mut order = vec![first];
    let mut remaining: Vec<usize> = (0..points.len()).filter(|&i| i != first).collect();
    while !remaining.is_empty() {
        let mut best = (0, f64::NEG_INFINITY);
        for (slot, &candidate) in remaining.iter().enumerate() {
            let to_chosen = order
                .iter()
                .map(|&i| abs_cos(&points[candidate], &points[i]).acos());
            let to_start = start
                .iter()
                .map(|p| abs_cos(&points[candidate], p).acos());
            let separation = to_chosen
                .chain(to_start)
                .fold(f64::INFINITY, f64::min);
            if separation > best.1 {
                best = (slot, separation);
            }
        }
        order.push(remaining.remove(best.0));
    }
    order
}

/// Greedy pre-sort: tries every point as the opener and keeps the order
/// with the best packing-density score after the already committed prefix.
pub fn greedy_order(points: &[Vector3<f64>], start: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let mut best: Option<(f64, Vec<usize>)> = None;
    for first in 0..points.len() {
        let order = greedy_from(points, first, start);
        let sorted: Vec<Vector3<f64>> = order.iter().map(|&i| points[i]).collect();
        let score = packing_density(&sorted, start, true);
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, order));
        }
    }
    let (_, order) = best.unwrap();
    order.iter().map(|&i| points[i]).collect()
}

/// Prefix-membership expression: whether pool point `i` is assigned to one
/// of the first `k + 1` positions of the batch.
fn prefix_sum(assign: &[Vec<Variable>], i: usize, k: usize) -> Expression {
    assign[i][..=k].iter().map(|&v| Expression::from(v)).sum()
}

fn batch_model(
    model: &mut MilpModel,
    pool_len: usize,
    num: usize,
) -> Vec<Vec<Variable>> {
    let assign: Vec<Vec<Variable>> = (0..pool_len)
        .map(|_| (0..num).map(|_| model.binary()).collect())
        .collect();
    for k in 0..num {
        let column: Vec<Variable> = assign.iter().map(|row| row[k]).collect();
        let filled: Expression = column.iter().map(|&v| Expression::from(v)).sum();
        model.constrain(constraint!(filled == 1.0));
    }
    for row in &assign {
        model.one_hot(row);
    }
    // The batch after a greedy pre-sort is already a strong incumbent.
    for (i, row) in assign.iter().enumerate() {
        for (k, &v) in row.iter().enumerate() {
            model.warm_start(v, if i == k { 1.0 } else { 0.0 });
        }
    }
    assign
}

fn read_assignment(
    solution: &super::milp::MilpSolution,
    assign: &[Vec<Variable>],
    num: usize,
) -> Result<Vec<usize>, EngineError> {
    let mut picked = vec![usize::MAX; num];
    for (i, row) in assign.iter().enumerate() {
        for (k, &v) in row.iter().enumerate() {
            if solution.is_set(v) {
                picked[k] = i;
            }
        }
    }
    if picked.iter().any(|&i| i == usize::MAX) {
        return Err(EngineError::Solver(
            "assignment solution leaves a sequence position unfilled".to_string(),
        ));
    }
    Ok(picked)
}

/// Places the next `num` pool points into sequence positions after `fixed`.
/// Returns indices into the pool, in acquisition order.
fn order_batch(
    fixed: &[Vector3<f64>],
    pool: &[Vector3<f64>],
    num: usize,
    config: &OrderConfig,
) -> Result<Vec<usize>, EngineError> {
    let n = pool.len();
    let committed = fixed.len();
    let m = BigM::cosine().value();
    let fixed_cos = if committed > 0 {
        covering_radius(fixed, true).cos()
    } else {
        0.0
    };

    let mut model = MilpModel::new();
    let assign = batch_model(&mut model, n, num);

    let worst: Vec<Variable> = (0..num)
        .map(|k| {
            let bound = covering_radius_bound_for(committed + k + 1, true).cos();
            model.continuous(fixed_cos.max(bound), 1.0)
        })
        .collect();
    for k in 0..num {
        let w = worst[k];
        for i in 0..n.saturating_sub(1) {
            for j in i + 1..n {
                let d = abs_cos(&pool[i], &pool[j]);
                let si = prefix_sum(&assign, i, k);
                let sj = prefix_sum(&assign, j, k);
                model.constrain(constraint!(w - m * si - m * sj >= d - 2.0 * m));
            }
        }
        for i in 0..n {
            for f in fixed {
                let d = abs_cos(&pool[i], f);
                let si = prefix_sum(&assign, i, k);
                model.constrain(constraint!(w - m * si >= d - m));
            }
        }
        if k + 1 < num {
            let next = worst[k + 1];
            model.constrain(constraint!(w <= next));
        }
    }

    let mut objective = Expression::from_other_affine(0.0);
    for (k, &w) in worst.iter().enumerate() {
        objective += (committed + k + 1) as f64 * w;
    }
    let solution = model.solve(Sense::Minimize, objective, &config.solve)?;
    read_assignment(&solution, &assign, num)
}

/// Orders a single-shell scheme so every prefix stays well spread.
#[instrument(skip_all, name = "order_single", fields(points = points.len()))]
pub fn order_single_shell(
    points: &[Vector3<f64>],
    config: &OrderConfig,
) -> Result<Vec<Vector3<f64>>, EngineError> {
    let mut committed: Vec<Vector3<f64>> = Vec::with_capacity(points.len());
    let mut remaining = points.to_vec();
    for num in gen_split(config.batch, points.len()) {
        remaining = greedy_order(&remaining, &committed);
        let picked = order_batch(&committed, &remaining, num, config)?;
        for &i in &picked {
            committed.push(remaining[i]);
        }
        let mut drop = picked.clone();
        drop.sort_unstable_by(|a, b| b.cmp(a));
        for i in drop {
            remaining.remove(i);
        }
        debug!(committed = committed.len(), "batch placed");
    }
    Ok(committed)
}

/// Multi-shell batch: the union prefix and every per-shell prefix are scored
/// together, each shell weighted by its share of the scheme.
#[allow(clippy::too_many_arguments)]
fn order_batch_multi(
    fixed: &[Vector3<f64>],
    fixed_labels: &[f64],
    pool: &[Vector3<f64>],
    pool_labels: &[f64],
    fractions: &[f64],
    bvalues: &[f64],
    num: usize,
    config: &OrderConfig,
) -> Result<Vec<usize>, EngineError> {
    let n = pool.len();
    let committed = fixed.len();
    let num_shells = bvalues.len();
    let m = BigM::cosine().value();
    let fixed_cos = if committed > 0 {
        covering_radius(fixed, true).cos()
    } else {
        0.0
    };

    let mut model = MilpModel::new();
    let assign = batch_model(&mut model, n, num);

    let worst_union: Vec<Variable> = (0..num)
        .map(|k| {
            let bound = covering_radius_bound_for(committed + k + 1, true).cos();
            model.continuous(fixed_cos.max(bound), 1.0)
        })
        .collect();
    let worst_shell: Vec<Vec<Variable>> = (0..num_shells)
        .map(|_| (0..num).map(|_| model.continuous(0.0, 1.0)).collect())
        .collect();

    for k in 0..num {
        for i in 0..n.saturating_sub(1) {
            for j in i + 1..n {
                let d = abs_cos(&pool[i], &pool[j]);
                let si = prefix_sum(&assign, i, k);
                let sj = prefix_sum(&assign, j, k);
                let wu = worst_union[k];
                model.constrain(constraint!(wu - m * si - m * sj >= d - 2.0 * m));
                for (s, &bval) in bvalues.iter().enumerate() {
                    if pool_labels[i] == bval && pool_labels[j] == bval {
                        let ws = worst_shell[s][k];
                        let si = prefix_sum(&assign, i, k);
                        let sj = prefix_sum(&assign, j, k);
                        model.constrain(constraint!(ws - m * si - m * sj >= d - 2.0 * m));
                    }
                }
            }
        }
        for i in 0..n {
            for (f, &label) in fixed.iter().zip(fixed_labels) {
                let d = abs_cos(&pool[i], f);
                let si = prefix_sum(&assign, i, k);
                let wu = worst_union[k];
                model.constrain(constraint!(wu - m * si >= d - m));
                for (s, &bval) in bvalues.iter().enumerate() {
                    if pool_labels[i] == bval && label == bval {
                        let ws = worst_shell[s][k];
                        let si = prefix_sum(&assign, i, k);
                        model.constrain(constraint!(ws - m * si >= d - m));
                    }
                }
            }
        }
        if k + 1 < num {
            let (wu, wn) = (worst_union[k], worst_union[k + 1]);
            model.constrain(constraint!(wu <= wn));
            for shell in &worst_shell {
                let (ws, wsn) = (shell[k], shell[k + 1]);
                model.constrain(constraint!(ws <= wsn));
            }
        }
    }

    let mut objective = Expression::from_other_affine(0.0);
    for k in 0..num {
        let position = (committed + k + 1) as f64;
        objective += (1.0 - config.weight) * position * worst_union[k];
        for s in 0..num_shells {
            objective += config.weight / num_shells as f64
                * position
                * fractions[s]
                * worst_shell[s][k];
        }
    }
    let solution = model.solve(Sense::Minimize, objective, &config.solve)?;
    read_assignment(&solution, &assign, num)
}

/// Orders a multi-shell scheme; returns the interleaved points with their
/// b-values in acquisition order.
#[instrument(skip_all, name = "order_multi", fields(shells = shells.len()))]
pub fn order_multi_shell(
    shells: &[Vec<Vector3<f64>>],
    bvalues: &[f64],
    config: &OrderConfig,
) -> Result<(Vec<Vector3<f64>>, Vec<f64>), EngineError> {
    if shells.len() != bvalues.len() {
        return Err(EngineError::InputMismatch(format!(
            "{} shells with {} b-values",
            shells.len(),
            bvalues.len()
        )));
    }
    let total: usize = shells.iter().map(Vec::len).sum();
    let fractions: Vec<f64> = shells
        .iter()
        .map(|s| s.len() as f64 / total as f64)
        .collect();

    let mut pool: Vec<Vector3<f64>> = shells.iter().flatten().copied().collect();
    let mut pool_labels: Vec<f64> = shells
        .iter()
        .zip(bvalues)
        .flat_map(|(shell, &b)| std::iter::repeat(b).take(shell.len()))
        .collect();
    let mut fixed = Vec::with_capacity(total);
    let mut fixed_labels = Vec::with_capacity(total);

    for num in gen_split(config.batch, total) {
        let picked = order_batch_multi(
            &fixed,
            &fixed_labels,
            &pool,
            &pool_labels,
            &fractions,
            bvalues,
            num,
            config,
        )?;
        for &i in &picked {
            fixed.push(pool[i]);
            fixed_labels.push(pool_labels[i]);
        }
        let mut drop = picked.clone();
        drop.sort_unstable_by(|a, b| b.cmp(a));
        for i in drop {
            pool.remove(i);
            pool_labels.remove(i);
        }
        debug!(committed = fixed.len(), "batch placed");
    }
    Ok((fixed, fixed_labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spread_five() -> Vec<Vector3<f64>> {
        vec![
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(1.0, -1.0, 1.0).normalize(),
        ]
    }

    fn sort_key(points: &[Vector3<f64>]) -> Vec<[i64; 3]> {
        let mut keys: Vec<[i64; 3]> = points
            .iter()
            .map(|p| {
                [
                    (p.x * 1e9).round() as i64,
                    (p.y * 1e9).round() as i64,
                    (p.z * 1e9).round() as i64,
                ]
            })
            .collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn split_covers_the_whole_count() {
        assert_eq!(gen_split(3, 10), vec![3, 3, 3, 1]);
        assert_eq!(gen_split(4, 8), vec![4, 4]);
        assert_eq!(gen_split(3, 2), vec![2]);
        assert!(gen_split(3, 0).is_empty());
    }

    #[test]
    fn greedy_order_is_a_permutation() {
        let points = spread_five();
        let sorted = greedy_order(&points, &[]);
        assert_eq!(sort_key(&sorted), sort_key(&points));
    }

    #[test]
    fn greedy_opens_with_a_well_separated_pair() {
        let points = spread_five();
        let sorted = greedy_order(&points, &[]);
        // The best opening pair in this set is orthogonal.
        assert_relative_eq!(sorted[0].dot(&sorted[1]).abs(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn ordered_sequence_is_a_permutation_with_monotone_prefix_radius() {
        let points = spread_five();
        let config = OrderConfig {
            batch: 2,
            ..OrderConfig::default()
        };
        let ordered = order_single_shell(&points, &config).unwrap();
        assert_eq!(sort_key(&ordered), sort_key(&points));
        for k in 2..ordered.len() {
            let shorter = covering_radius(&ordered[..k], true);
            let longer = covering_radius(&ordered[..=k], true);
            assert!(longer <= shorter + 1e-12);
        }
        // The first batch picks the orthogonal pair.
        assert_relative_eq!(ordered[0].dot(&ordered[1]).abs(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn multi_shell_order_preserves_point_label_pairing() {
        let shell_a = vec![Vector3::x(), Vector3::y(), Vector3::z()];
        let shell_b = vec![
            Vector3::new(1.0, 1.0, 0.0).normalize(),
            Vector3::new(0.0, 1.0, 1.0).normalize(),
            Vector3::new(1.0, 0.0, 1.0).normalize(),
        ];
        let config = OrderConfig {
            batch: 2,
            ..OrderConfig::default()
        };
        let (points, labels) =
            order_multi_shell(&[shell_a.clone(), shell_b.clone()], &[1000.0, 2000.0], &config)
                .unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(labels.len(), 6);
        for (p, &b) in points.iter().zip(&labels) {
            let home = if b == 1000.0 { &shell_a } else { &shell_b };
            assert!(home.iter().any(|q| (q - p).norm() < 1e-9));
        }
    }

    #[test]
    fn shell_and_label_count_mismatch_is_rejected() {
        let config = OrderConfig::default();
        assert!(matches!(
            order_multi_shell(&[vec![Vector3::x()]], &[1000.0, 2000.0], &config),
            Err(EngineError::InputMismatch(_))
        ));
    }
}
