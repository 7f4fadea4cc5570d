pub mod combine;
pub mod flip;
pub mod generate;
pub mod geem;
pub mod order;
pub mod pipeline;
pub mod stats;
pub mod subsample;

use qsphere::engine::config::SolveOptions;

/// Solver options shared by the discrete commands; solver chatter is only
/// enabled at debug verbosity.
pub(crate) fn solve_options(time_limit_secs: f64) -> SolveOptions {
    SolveOptions {
        time_limit_secs,
        verbose: tracing::enabled!(tracing::Level::DEBUG),
    }
}
