//! Solver backends for [`Model`]. Every backend honours the lexicographic objective ranking:
//! priority levels are optimized from the largest priority down, objectives sharing a
//! priority are blended by their weights.

#[cfg(feature = "gurobi")]
pub mod gurobi;
pub mod sequential;

use derive_more::Display;
use typed_index_collections::TiVec;

use crate::config::SolverConfig;
use crate::error::Result;
use crate::models::milp::{Model, VarId};

#[cfg(feature = "gurobi")]
pub use gurobi::GurobiSolver;
pub use sequential::MicrolpSolver;

/// How a solve terminated
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Status {
    #[display(fmt = "optimal")]
    Optimal,
    #[display(fmt = "infeasible")]
    Infeasible,
    #[display(fmt = "unbounded")]
    Unbounded,
    #[display(fmt = "time limit reached")]
    TimeLimit,
    #[display(fmt = "{}", _0)]
    Other(String),
}

/// The answer of a backend. Values are only present for an optimal solve.
#[derive(Debug, Clone)]
pub struct Solved {
    pub status: Status,
    /// A value for every variable of the model
    pub values: Option<TiVec<VarId, f64>>,
}

impl Solved {
    pub fn failed(status: Status) -> Solved {
        Solved { status, values: None }
    }
}

pub trait MilpSolver {
    fn name(&self) -> &'static str;

    /// Solves the model. Infeasibility and other non-optimal terminations are reported in the
    /// status, errors are reserved for failures of the solver itself.
    fn solve(&self, model: &Model, config: &SolverConfig) -> Result<Solved>;
}

/// The available backends
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    #[display(fmt = "microlp")]
    Microlp,
    #[display(fmt = "gurobi")]
    Gurobi,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microlp" => Ok(Backend::Microlp),
            "gurobi" => Ok(Backend::Gurobi),
            other => Err(format!("unknown solver `{}`, expected microlp or gurobi", other)),
        }
    }
}

impl Backend {
    pub fn solver(self) -> Result<Box<dyn MilpSolver>> {
        match self {
            Backend::Microlp => Ok(Box::new(MicrolpSolver)),
            #[cfg(feature = "gurobi")]
            Backend::Gurobi => Ok(Box::new(GurobiSolver)),
            #[cfg(not(feature = "gurobi"))]
            Backend::Gurobi => Err(crate::error::Error::Config {
                key: "solver".to_string(),
                reason: "this build does not include the gurobi feature".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn backends_parse_by_name() {
        assert_eq!("microlp".parse::<Backend>(), Ok(Backend::Microlp));
        assert_eq!(" Gurobi".parse::<Backend>(), Ok(Backend::Gurobi));
        assert!("cplex".parse::<Backend>().is_err());
        assert_eq!(Backend::Microlp.solver().unwrap().name(), "microlp");
    }

    #[cfg(not(feature = "gurobi"))]
    #[test]
    fn gurobi_needs_the_feature() {
        assert!(matches!(Backend::Gurobi.solver(), Err(Error::Config { .. })));
    }

    #[test]
    fn statuses_read_naturally() {
        assert_eq!(Status::TimeLimit.to_string(), "time limit reached");
        assert_eq!(Status::Other("numeric trouble".to_string()).to_string(), "numeric trouble");
    }
}
