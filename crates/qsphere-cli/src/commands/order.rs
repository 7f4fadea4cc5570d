use qsphere::core::io;
use qsphere::engine::config::OrderConfig;
use qsphere::engine::order;
use tracing::info;

use crate::cli::OrderArgs;
use crate::commands::solve_options;
use crate::error::Result;
use crate::utils::suffixed_path;

pub fn run(args: OrderArgs) -> Result<()> {
    let config = OrderConfig {
        weight: args.weight,
        batch: args.split,
        solve: solve_options(args.time_limit),
    };

    match &args.bval {
        Some(bval_path) => {
            let (bvalues, shells) =
                io::read_labeled_points(&args.bvec, bval_path, args.fslgrad)?;
            let (points, labels) = if shells.len() == 1 {
                let ordered = order::order_single_shell(&shells[0], &config)?;
                let labels = vec![bvalues[0]; ordered.len()];
                (ordered, labels)
            } else {
                order::order_multi_shell(&shells, &bvalues, &config)?
            };
            let bvec_out = suffixed_path(&args.output, "_bvec");
            let bval_out = suffixed_path(&args.output, "_bval");
            io::write_points(&bvec_out, &points, args.fslgrad)?;
            io::write_scalars(&bval_out, &labels, args.fslgrad)?;
            info!(
                bvec = %bvec_out.display(),
                bval = %bval_out.display(),
                points = points.len(),
                "wrote ordered scheme"
            );
        }
        None => {
            let points = io::read_points(&args.bvec, args.fslgrad)?;
            let ordered = order::order_single_shell(&points, &config)?;
            io::write_points(&args.output, &ordered, args.fslgrad)?;
            info!(path = %args.output.display(), points = ordered.len(), "wrote ordered scheme");
        }
    }
    Ok(())
}
