use qsphere::core::io;
use qsphere::engine::config::GenerateConfig;
use qsphere::workflows::generate;
use tracing::info;

use crate::cli::GenerateArgs;
use crate::error::Result;
use crate::utils::{parse_counts, scheme_paths};

pub fn run(args: GenerateArgs) -> Result<()> {
    let counts = parse_counts(&args.number)?;
    let mut config = GenerateConfig::new(counts)
        .antipodal(!args.asym)
        .weight(args.weight)
        .delta(args.delta)
        .max_iter(args.max_iter);
    if let Some(init_path) = &args.initialization {
        config = config.initialization(io::read_points(init_path, args.fslgrad)?);
    }

    let shells = generate::generate(&config)?;

    let paths = scheme_paths(&args.output, shells.len());
    for (shell, path) in shells.iter().zip(&paths) {
        io::write_points(path, shell, args.fslgrad)?;
        info!(path = %path.display(), points = shell.len(), "wrote shell");
    }
    Ok(())
}
