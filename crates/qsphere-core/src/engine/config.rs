//! Configuration objects for the optimization operations.
//!
//! Each operation takes exactly one configuration struct; the command-line
//! surface is a thin translation layer onto these.

use nalgebra::Vector3;

/// Objective family for the discrete formulations: maximize the minimum
/// pairwise separation, or minimize an inverse-power electrostatic surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criterion {
    Distance,
    #[default]
    Electrostatic,
}

/// Budget and verbosity handed to each discrete solver invocation. The time
/// limit is the sole cancellation mechanism for a running solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub time_limit_secs: f64,
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit_secs: 600.0,
            verbose: false,
        }
    }
}

/// Electrostatic initializer settings.
#[derive(Debug, Clone)]
pub struct GeemConfig {
    pub antipodal: bool,
    pub max_iter: usize,
    /// Seed for the random starting configuration; fixed by default so batch
    /// runs are reproducible.
    pub seed: u64,
}

impl Default for GeemConfig {
    fn default() -> Self {
        Self {
            antipodal: true,
            max_iter: 1000,
            seed: 0,
        }
    }
}

/// Continuous geometric refinement settings.
#[derive(Debug, Clone)]
pub struct CnloConfig {
    pub antipodal: bool,
    /// Trust-region radius: maximum angular deviation of a refined point from
    /// its initializer, in radians.
    pub delta: f64,
    /// Balance between per-shell and combined covering radius.
    pub weight: f64,
    pub max_iter: usize,
}

impl Default for CnloConfig {
    fn default() -> Self {
        Self {
            antipodal: true,
            delta: 0.1,
            weight: 0.5,
            max_iter: 1000,
        }
    }
}

/// Polarity-flip settings.
#[derive(Debug, Clone)]
pub struct FlipConfig {
    pub criterion: Criterion,
    /// Inverse-power order of the electrostatic criterion.
    pub order: i32,
    pub weight: f64,
    pub solve: SolveOptions,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            criterion: Criterion::default(),
            order: 1,
            weight: 0.5,
            solve: SolveOptions::default(),
        }
    }
}

/// Subset-selection settings.
#[derive(Debug, Clone)]
pub struct SubsetConfig {
    pub antipodal: bool,
    pub weight: f64,
    pub criterion: Criterion,
    pub order: i32,
    /// Optional covering-radius lower bounds, one per shell plus one for the
    /// combined set, used to cut the solver's search space.
    pub lower_bounds: Option<Vec<f64>>,
    pub solve: SolveOptions,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            antipodal: true,
            weight: 0.5,
            criterion: Criterion::Distance,
            order: 1,
            lower_bounds: None,
            solve: SolveOptions::default(),
        }
    }
}

/// Incremental-ordering settings.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    pub weight: f64,
    /// Number of points ordered per solver batch.
    pub batch: usize,
    pub solve: SolveOptions,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            weight: 0.5,
            batch: 3,
            solve: SolveOptions::default(),
        }
    }
}

/// Settings for the composed generation workflow: electrostatic
/// initialization followed by continuous refinement.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub points_per_shell: Vec<usize>,
    pub antipodal: bool,
    pub weight: f64,
    pub delta: f64,
    pub max_iter: usize,
    /// Pre-supplied starting points (flat, in shell order) instead of the
    /// electrostatic initializer.
    pub initialization: Option<Vec<Vector3<f64>>>,
}

impl GenerateConfig {
    pub fn new(points_per_shell: Vec<usize>) -> Self {
        Self {
            points_per_shell,
            antipodal: true,
            weight: 0.5,
            delta: 0.1,
            max_iter: 1000,
            initialization: None,
        }
    }

    pub fn antipodal(mut self, antipodal: bool) -> Self {
        self.antipodal = antipodal;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn initialization(mut self, points: Vec<Vector3<f64>>) -> Self {
        self.initialization = Some(points);
        self
    }
}
