use qsphere::core::io;
use qsphere::workflows::generate;
use tracing::info;

use crate::cli::GeemArgs;
use crate::error::Result;
use crate::utils::{parse_counts, scheme_paths};

pub fn run(args: GeemArgs) -> Result<()> {
    let counts = parse_counts(&args.number)?;
    let shells = generate::generate_electrostatic(&counts, !args.asym, args.max_iter)?;

    let paths = scheme_paths(&args.output, shells.len());
    for (shell, path) in shells.iter().zip(&paths) {
        io::write_points(path, shell, args.fslgrad)?;
        info!(path = %path.display(), points = shell.len(), "wrote shell");
    }
    Ok(())
}
