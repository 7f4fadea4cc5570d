use qsphere::core::io;
use tracing::info;

use crate::cli::{CombineArgs, FlipArgs, GenerateArgs, OrderArgs, PipelineArgs};
use crate::commands::{combine, flip, generate, order};
use crate::error::{CliError, Result};
use crate::utils::{parse_counts, parse_floats, shell_path, suffixed_path};

/// Generate, flip and order in sequence, staging intermediate files in a
/// temporary directory like the individual commands would.
pub fn run(args: PipelineArgs) -> Result<()> {
    let counts = parse_counts(&args.number)?;
    let bvalues = args.bval.as_deref().map(parse_floats).transpose()?;
    if let Some(b) = &bvalues {
        if b.len() != counts.len() {
            return Err(CliError::Argument(format!(
                "{} b-values for {} shells",
                b.len(),
                counts.len()
            )));
        }
    }
    if counts.len() > 1 && bvalues.is_none() {
        return Err(CliError::Argument(
            "multi-shell pipelines need one b-value per shell".to_string(),
        ));
    }

    let staging = tempfile::tempdir()?;
    let scheme = staging.path().join("scheme.txt");
    let flipped = staging.path().join("flipped.txt");

    generate::run(GenerateArgs {
        number: args.number.clone(),
        output: scheme.clone(),
        initialization: args.initialization.clone(),
        asym: false,
        weight: args.weight,
        delta: 0.1,
        max_iter: args.max_iter,
        fslgrad: args.fslgrad,
    })?;

    if counts.len() == 1 {
        flip::run(FlipArgs {
            input: scheme.display().to_string(),
            output: flipped.clone(),
            criterion: args.criterion,
            order: 1,
            weight: args.weight,
            time_limit: args.time_limit,
            fslgrad: args.fslgrad,
        })?;

        let bval_file = match &bvalues {
            Some(b) => {
                let path = staging.path().join("bval.txt");
                io::write_scalars(&path, &vec![b[0]; counts[0]], args.fslgrad)?;
                Some(path)
            }
            None => None,
        };
        order::run(OrderArgs {
            bvec: flipped,
            bval: bval_file,
            output: args.output.clone(),
            split: args.split,
            weight: args.weight,
            time_limit: args.time_limit,
            fslgrad: args.fslgrad,
        })?;
    } else {
        let shell_list = |stem: &std::path::Path| {
            (0..counts.len())
                .map(|i| shell_path(stem, i).display().to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        flip::run(FlipArgs {
            input: shell_list(&scheme),
            output: flipped.clone(),
            criterion: args.criterion,
            order: 1,
            weight: args.weight,
            time_limit: args.time_limit,
            fslgrad: args.fslgrad,
        })?;

        let combined = staging.path().join("combine.txt");
        combine::run(CombineArgs {
            input: shell_list(&flipped),
            bval: args.bval.clone().unwrap(),
            output: combined.clone(),
            fslgrad: args.fslgrad,
        })?;

        order::run(OrderArgs {
            bvec: suffixed_path(&combined, "_bvec"),
            bval: Some(suffixed_path(&combined, "_bval")),
            output: args.output.clone(),
            split: args.split,
            weight: args.weight,
            time_limit: args.time_limit,
            fslgrad: args.fslgrad,
        })?;
    }
    info!(output = %args.output.display(), "pipeline finished");
    Ok(())
}
