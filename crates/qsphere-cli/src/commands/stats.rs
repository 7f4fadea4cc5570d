use qsphere::core::io;
use qsphere::workflows::statistics::{self, ShellStats};

use crate::cli::StatsArgs;
use crate::error::Result;

fn print_stats(label: &str, stats: &ShellStats) {
    println!(
        "{label}: {} points, covering radius {:.4} rad ({:.2} deg), energy {:.4}, |mean| {:.4}",
        stats.count,
        stats.covering_radius,
        stats.covering_radius_degrees(),
        stats.energy,
        stats.norm_of_mean
    );
}

pub fn run(args: StatsArgs) -> Result<()> {
    let antipodal = !args.asym;
    let shells = match &args.bval {
        Some(bval_path) => {
            let (bvalues, shells) =
                io::read_labeled_points(&args.bvec, bval_path, args.fslgrad)?;
            for (shell, b) in shells.iter().zip(&bvalues) {
                print_stats(
                    &format!("shell b={b}"),
                    &statistics::shell_stats(shell, antipodal, args.order),
                );
            }
            shells
        }
        None => vec![io::read_points(&args.bvec, args.fslgrad)?],
    };

    let report = statistics::scheme_stats(&shells, antipodal, args.order, args.weight);
    if shells.len() > 1 {
        print_stats("combined", &report.combined);
        println!(
            "weighted covering radius: {:.4} rad ({:.2} deg)",
            report.weighted_covering_radius,
            report.weighted_covering_radius.to_degrees()
        );
    } else {
        print_stats("scheme", &report.combined);
    }
    Ok(())
}
