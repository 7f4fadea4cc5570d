//! Scheme generation: electrostatic initialization followed by continuous
//! angular refinement.

use nalgebra::Vector3;
use tracing::{info, instrument};

use crate::engine::config::{CnloConfig, GeemConfig, GenerateConfig};
use crate::engine::error::EngineError;
use crate::engine::{cnlo, geem};

fn split_into_shells(
    flat: Vec<Vector3<f64>>,
    points_per_shell: &[usize],
) -> Vec<Vec<Vector3<f64>>> {
    let mut shells = Vec::with_capacity(points_per_shell.len());
    let mut rest = flat;
    for &k in points_per_shell {
        let tail = rest.split_off(k);
        shells.push(rest);
        rest = tail;
    }
    shells
}

/// Electrostatic-only generation, one shell per requested size.
#[instrument(skip_all, name = "generate_electrostatic")]
pub fn generate_electrostatic(
    points_per_shell: &[usize],
    antipodal: bool,
    max_iter: usize,
) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    let geem_config = GeemConfig {
        antipodal,
        max_iter,
        ..GeemConfig::default()
    };
    let flat = geem::optimize_default(points_per_shell, &geem_config, None)?;
    Ok(split_into_shells(flat, points_per_shell))
}

/// Full generation: an electrostatic start (or a caller-supplied one)
/// refined by the continuous separation optimizer.
#[instrument(skip_all, name = "generate", fields(shells = config.points_per_shell.len()))]
pub fn generate(config: &GenerateConfig) -> Result<Vec<Vec<Vector3<f64>>>, EngineError> {
    let total: usize = config.points_per_shell.iter().sum();
    let flat = match &config.initialization {
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
            let geem_config = GeemConfig {
                antipodal: config.antipodal,
                max_iter: config.max_iter,
                ..GeemConfig::default()
            };
            geem::optimize_default(&config.points_per_shell, &geem_config, None)?
        }
    };
    let shells = split_into_shells(flat, &config.points_per_shell);

    let cnlo_config = CnloConfig {
        antipodal: config.antipodal,
        delta: config.delta,
        weight: config.weight,
        max_iter: config.max_iter,
    };
    let refined = cnlo::optimize(&shells, &cnlo_config)?;
    info!(
        points = total,
        shells = refined.len(),
        "scheme generation finished"
    );
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::covering_radius;
    use approx::assert_relative_eq;

    #[test]
    fn shell_sizes_are_honored() {
        let config = GenerateConfig::new(vec![4, 6]).max_iter(200);
        let shells = generate(&config).unwrap();
        assert_eq!(shells.len(), 2);
        assert_eq!(shells[0].len(), 4);
        assert_eq!(shells[1].len(), 6);
        for p in shells.iter().flatten() {
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn supplied_initialization_replaces_the_electrostatic_start() {
        let init = vec![
            nalgebra::Vector3::x(),
            nalgebra::Vector3::y(),
            nalgebra::Vector3::z(),
        ];
        let config = GenerateConfig::new(vec![3])
            .max_iter(200)
            .initialization(init);
        let shells = generate(&config).unwrap();
        // Three orthogonal axes are already optimal under symmetry.
        assert_relative_eq!(
            covering_radius(&shells[0], true),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn initialization_size_mismatch_is_rejected() {
        let config = GenerateConfig::new(vec![4])
            .initialization(vec![nalgebra::Vector3::x(); 3]);
        assert!(matches!(
            generate(&config),
            Err(EngineError::InputMismatch(_))
        ));
    }

    #[test]
    fn electrostatic_only_stage_produces_spread_shells() {
        let shells = generate_electrostatic(&[6], true, 500).unwrap();
        assert_eq!(shells[0].len(), 6);
        assert!(covering_radius(&shells[0], true) > 1.0);
    }
}
