//! Quality reporting for finished schemes.

use nalgebra::Vector3;

use crate::core::metrics::{
    covering_radius, electrostatic_energy, norm_of_mean, weighted_multi_shell,
};

/// Quality figures of one point set.
#[derive(Debug, Clone)]
pub struct ShellStats {
    pub count: usize,
    /// Covering radius in radians.
    pub covering_radius: f64,
    pub energy: f64,
    pub norm_of_mean: f64,
}

impl ShellStats {
    pub fn covering_radius_degrees(&self) -> f64 {
        self.covering_radius.to_degrees()
    }
}

/// Per-shell and combined figures, plus the weighted covering-radius score
/// used by the optimizers' objectives.
#[derive(Debug, Clone)]
pub struct SchemeStats {
    pub shells: Vec<ShellStats>,
    pub combined: ShellStats,
    pub weighted_covering_radius: f64,
}

pub fn shell_stats(points: &[Vector3<f64>], antipodal: bool, order: i32) -> ShellStats {
    ShellStats {
        count: points.len(),
        covering_radius: covering_radius(points, antipodal),
        energy: electrostatic_energy(points, order, antipodal),
        norm_of_mean: norm_of_mean(points),
    }
}

pub fn scheme_stats(
    shells: &[Vec<Vector3<f64>>],
    antipodal: bool,
    order: i32,
    weight: f64,
) -> SchemeStats {
    let combined: Vec<Vector3<f64>> = shells.iter().flatten().copied().collect();
    SchemeStats {
        shells: shells
            .iter()
            .map(|s| shell_stats(s, antipodal, order))
            .collect(),
        combined: shell_stats(&combined, antipodal, order),
        weighted_covering_radius: weighted_multi_shell(shells, weight, |s| {
            covering_radius(s, antipodal)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn axes_report_the_orthogonal_radius() {
        let shell = vec![Vector3::x(), Vector3::y(), Vector3::z()];
        let stats = shell_stats(&shell, true, 2);
        assert_eq!(stats.count, 3);
        assert_relative_eq!(stats.covering_radius, FRAC_PI_2);
        assert_relative_eq!(stats.covering_radius_degrees(), 90.0);
    }

    #[test]
    fn weighted_score_blends_shell_and_union_radii() {
        let shell_a = vec![Vector3::x(), Vector3::y()];
        let shell_b = vec![Vector3::z()];
        let stats = scheme_stats(&[shell_a, shell_b], true, 2, 0.5);
        assert_eq!(stats.shells.len(), 2);
        assert_eq!(stats.combined.count, 3);
        let expected = 0.25 * (FRAC_PI_2 + FRAC_PI_2) + 0.5 * FRAC_PI_2;
        assert_relative_eq!(stats.weighted_covering_radius, expected);
    }
}
