//! # qsphere Core Library
//!
//! A library for designing quasi-uniform point sets on the unit sphere, used to
//! prescribe gradient directions for diffusion MRI acquisitions over one or
//! several concentric shells.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless quality metrics over point
//!   sets (`metrics`), the shell-grouped scheme model (`scheme`), and the plain /
//!   transposed gradient-file formats (`io`).
//!
//! - **[`engine`]: The Logic Core.** The optimizers: the electrostatic
//!   initializer (`geem`), the constrained continuous refiner (`cnlo`), the
//!   mixed-integer formulations for polarity flips (`flip`), subset selection
//!   (`subset`) and incremental ordering (`order`), together with the solver
//!   adapter (`milp`), configuration objects, and the engine error taxonomy.
//!
//! - **[`workflows`]: The Public API.** User-facing operations that compose the
//!   engine into complete procedures, such as scheme generation
//!   (initialization followed by continuous refinement) and statistics reporting.

pub mod core;
pub mod engine;
pub mod workflows;
