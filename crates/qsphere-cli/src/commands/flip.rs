use qsphere::core::io;
use qsphere::engine::config::FlipConfig;
use qsphere::engine::flip;
use tracing::info;

use crate::cli::FlipArgs;
use crate::commands::solve_options;
use crate::error::Result;
use crate::utils::{parse_paths, scheme_paths};

pub fn run(args: FlipArgs) -> Result<()> {
    let inputs = parse_paths(&args.input);
    let shells = inputs
        .iter()
        .map(|path| io::read_points(path, args.fslgrad))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let config = FlipConfig {
        criterion: args.criterion.into(),
        order: args.order,
        weight: args.weight,
        solve: solve_options(args.time_limit),
    };
    let flipped = flip::flip(&shells, &config)?;

    let paths = scheme_paths(&args.output, flipped.len());
    for (shell, path) in flipped.iter().zip(&paths) {
        io::write_points(path, shell, args.fslgrad)?;
        info!(path = %path.display(), points = shell.len(), "wrote shell");
    }
    Ok(())
}
