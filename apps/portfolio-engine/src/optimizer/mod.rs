//! Portfolio weight optimization.

mod solver;
mod types;
mod worker;

pub use solver::{OptimizerError, covariance, invert_matrix, optimize};
pub use types::{
    OptimizationMethod, OptimizationRequest, OptimizationResult, WeightConstraints,
};
pub use worker::optimize_on_worker;
