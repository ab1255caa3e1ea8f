//! Approximate minimum covering designs.
//!
//! Given a universe of `n` samples, the [`Solver`] selects a family of `k`-element groups such
//! that every `j`-combination of the universe has enough of its `s`-subsets inside the groups:
//! at least one (mode A), at least `N` distinct ones (mode B) or all of them (mode C).
//!
//! ```
//! use covering::{Config, Params, Solver, Status};
//!
//! let solver = Solver::new(Config::default());
//! let params = Params::new(45, 7, 5, 3, 4, 1).with_samples((1..=7).collect());
//! let solution = solver.solve(&params);
//! assert_eq!(solution.status, Status::Success);
//! assert_eq!(solution.coverage_ratio, 1.0);
//! ```

pub mod combinations;
pub mod config;
pub mod coverage;
pub mod errors;
pub mod ids;
mod par;
pub mod preprocess;
pub mod sets;
pub mod solve;
pub mod universe;

/// An element of the sample domain.
pub type Elem = u32;

pub use combinations::{generate_random_samples, CombinationGenerator, CombinationIter, SubsetIndex};
pub use config::Config;
pub use coverage::{CoverageCalculator, CoverageMode, CoverageResult};
pub use errors::{CoverError, CoverResult};
pub use preprocess::{Preprocessor, Strategy};
pub use sets::SetOps;
pub use solve::{Metrics, Mode, Params, Solution, Solver, Status};
pub use universe::Universe;
