use qsphere::core::io;
use qsphere::core::scheme::Scheme;
use qsphere::engine::error::EngineError;
use tracing::info;

use crate::cli::CombineArgs;
use crate::error::Result;
use crate::utils::{parse_floats, parse_paths, suffixed_path};

pub fn run(args: CombineArgs) -> Result<()> {
    let inputs = parse_paths(&args.input);
    let bvalues = parse_floats(&args.bval)?;
    let shells = inputs
        .iter()
        .map(|path| io::read_points(path, args.fslgrad))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let scheme = Scheme::with_labels(shells, bvalues).map_err(EngineError::from)?;
    let (points, labels) = scheme.combined().map_err(EngineError::from)?;

    let bvec_out = suffixed_path(&args.output, "_bvec");
    let bval_out = suffixed_path(&args.output, "_bval");
    io::write_points(&bvec_out, &points, args.fslgrad)?;
    io::write_scalars(&bval_out, &labels, args.fslgrad)?;
    info!(
        bvec = %bvec_out.display(),
        bval = %bval_out.display(),
        points = points.len(),
        "wrote combined scheme"
    );
    Ok(())
}
