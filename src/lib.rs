pub mod config;
pub mod error;
pub mod models;
pub mod parse;
pub mod problem;
pub mod report;
pub mod solver;

pub use config::{ModelConfig, RunConfig, SolverConfig};
pub use error::{Error, Result};
pub use models::schedule::{ScheduleMilp, ScheduleResult};
pub use problem::Problem;

use solver::MilpSolver;

/// Builds the scheduling model for `problem` and solves it
pub fn run(problem: &Problem, config: &RunConfig, solver: &dyn MilpSolver) -> Result<ScheduleResult> {
    config.validate()?;
    let milp = ScheduleMilp::build(problem, &config.model)?;
    milp.solve(solver, &config.solver)
}
