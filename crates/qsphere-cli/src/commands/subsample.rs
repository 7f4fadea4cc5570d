use qsphere::core::io;
use qsphere::engine::config::SubsetConfig;
use qsphere::engine::subset;
use tracing::info;

use crate::cli::SubsampleArgs;
use crate::commands::solve_options;
use crate::error::{CliError, Result};
use crate::utils::{parse_counts, parse_floats, parse_paths, scheme_paths};

pub fn run(args: SubsampleArgs) -> Result<()> {
    let inputs = parse_paths(&args.input);
    let counts = parse_counts(&args.number)?;
    let pools = inputs
        .iter()
        .map(|path| io::read_points(path, args.fslgrad))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let config = SubsetConfig {
        antipodal: !args.asym,
        weight: args.weight,
        criterion: args.criterion.into(),
        order: args.order,
        lower_bounds: args
            .lower_bound
            .as_deref()
            .map(parse_floats)
            .transpose()?,
        solve: solve_options(args.time_limit),
    };

    // One pool: a plain subset or a split into shells. Several pools: one
    // subset per pool.
    let shells = match (pools.len(), counts.len()) {
        (1, 1) => vec![subset::single_from_single(&pools[0], counts[0], &config)?],
        (1, _) => subset::multi_from_single(&pools[0], &counts, &config)?,
        _ if pools.len() == counts.len() => {
            subset::multi_from_multi(&pools, &counts, &config)?
        }
        _ => {
            return Err(CliError::Argument(format!(
                "{} input files for {} shell sizes",
                pools.len(),
                counts.len()
            )));
        }
    };

    let paths = scheme_paths(&args.output, shells.len());
    for (shell, path) in shells.iter().zip(&paths) {
        io::write_points(path, shell, args.fslgrad)?;
        info!(path = %path.display(), points = shell.len(), "wrote shell");
    }
    Ok(())
}
