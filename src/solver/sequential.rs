//! Lexicographic optimization by a sequence of single objective solves with `microlp`.
//!
//! The priority levels are solved from the most important one down. After a level is solved
//! its blended objective is held at its optimum while the later levels are optimized. Only when
//! a later level turns out infeasible under the exact optima is the hold relaxed by
//! `objective_tolerance`.
//!
//! With a time limit every level is solved on a worker thread. A worker that misses the
//! deadline is abandoned and the solve reports [`Status::TimeLimit`].

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use microlp::{ComparisonOp, OptimizationDirection, Problem};
use typed_index_collections::TiVec;

use super::{MilpSolver, Solved, Status};
use crate::config::SolverConfig;
use crate::error::{Error, Result};
use crate::models::milp::{Constraint, LinExpr, Model, Sense, VarDomain, VarId};

/// Tolerance used to decide whether a constraint without terms holds
const EMPTY_ROW_TOLERANCE: f64 = 1e-9;

/// Pure Rust branch and bound through `microlp`
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpSolver;

/// A bound on a solved priority level
struct LevelBound {
    expr: LinExpr,
    optimum: f64,
    slack: f64,
}

impl LevelBound {
    fn limit(&self, relaxed: bool) -> f64 {
        if relaxed {
            self.optimum + self.slack
        } else {
            self.optimum
        }
    }
}

/// Outcome of one level: values for every variable, or the status that ended it
type LevelOutcome = std::result::Result<TiVec<VarId, f64>, Status>;

fn comparison(sense: Sense) -> ComparisonOp {
    match sense {
        Sense::Le => ComparisonOp::Le,
        Sense::Ge => ComparisonOp::Ge,
        Sense::Eq => ComparisonOp::Eq,
    }
}

fn integer_bound(value: f64) -> i32 {
    if value >= i32::MAX as f64 {
        i32::MAX
    } else if value <= i32::MIN as f64 {
        i32::MIN
    } else {
        value.round() as i32
    }
}

/// Whether a constraint without variables holds, i.e. `0 (sense) rhs`
fn constant_row_holds(sense: Sense, rhs: f64) -> bool {
    match sense {
        Sense::Le => 0.0 <= rhs + EMPTY_ROW_TOLERANCE,
        Sense::Ge => 0.0 >= rhs - EMPTY_ROW_TOLERANCE,
        Sense::Eq => rhs.abs() <= EMPTY_ROW_TOLERANCE,
    }
}

/// Solves a built problem and reads back the value of every variable
fn optimize(
    problem: Problem,
    vars: TiVec<VarId, microlp::Variable>,
) -> std::result::Result<TiVec<VarId, f64>, microlp::Error> {
    let solution = problem.solve()?;
    Ok(vars.iter().map(|var| *solution.var_value(*var)).collect())
}

impl MicrolpSolver {
    /// Builds the model for a single objective under the bounds of the levels solved so far.
    /// Returns `Err(Status::Infeasible)` when a constraint without terms cannot hold.
    fn build_level(
        model: &Model,
        objective: &LinExpr,
        bounds: &[LevelBound],
        relaxed: bool,
    ) -> std::result::Result<(Problem, TiVec<VarId, microlp::Variable>), Status> {
        let mut problem = Problem::new(OptimizationDirection::Minimize);

        let vars: TiVec<VarId, microlp::Variable> = model
            .vars()
            .iter_enumerated()
            .map(|(id, decl)| {
                let cost = objective.coeff(id);
                match decl.domain {
                    VarDomain::Binary => problem.add_binary_var(cost),
                    VarDomain::Integer => {
                        problem.add_integer_var(cost, (integer_bound(decl.lower), integer_bound(decl.upper)))
                    }
                    VarDomain::Continuous => problem.add_var(cost, (decl.lower, decl.upper)),
                }
            })
            .collect();

        let rows = model
            .constraints()
            .iter()
            .map(|c: &Constraint| (&c.expr, c.sense, c.rhs))
            .chain(bounds.iter().map(|b| (&b.expr, Sense::Le, b.limit(relaxed))));

        for (expr, sense, rhs) in rows {
            let terms: Vec<(microlp::Variable, f64)> = expr.terms().map(|(id, coeff)| (vars[id], coeff)).collect();
            if terms.is_empty() {
                if !constant_row_holds(sense, rhs) {
                    return Err(Status::Infeasible);
                }
                continue;
            }
            problem.add_constraint(terms, comparison(sense), rhs);
        }

        Ok((problem, vars))
    }

    /// Solves one level, on a worker thread when there is a deadline
    fn solve_level(
        model: &Model,
        objective: &LinExpr,
        bounds: &[LevelBound],
        relaxed: bool,
        deadline: Option<Instant>,
    ) -> Result<LevelOutcome> {
        let (problem, vars) = match Self::build_level(model, objective, bounds, relaxed) {
            Ok(built) => built,
            Err(status) => return Ok(Err(status)),
        };

        let outcome = match deadline {
            None => optimize(problem, vars),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(Err(Status::TimeLimit));
                }

                let (tx, rx) = mpsc::channel();
                std::thread::spawn(move || {
                    // the receiver is gone when the deadline has passed
                    let _ = tx.send(optimize(problem, vars));
                });
                match rx.recv_timeout(remaining) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => return Ok(Err(Status::TimeLimit)),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(Error::SolverRuntime("the microlp worker stopped without an answer".to_string()))
                    }
                }
            }
        };

        match outcome {
            Ok(values) => Ok(Ok(values)),
            Err(microlp::Error::Infeasible) => Ok(Err(Status::Infeasible)),
            Err(microlp::Error::Unbounded) => Ok(Err(Status::Unbounded)),
            Err(microlp::Error::InternalError(msg)) => Err(Error::SolverRuntime(msg)),
        }
    }
}

impl MilpSolver for MicrolpSolver {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &Model, config: &SolverConfig) -> Result<Solved> {
        config.validate()?;
        if config.mip_gap.is_some() {
            warn!("the microlp backend always solves to optimality, ignoring mip_gap");
        }
        // limits beyond what an `Instant` can represent never expire
        let deadline = config
            .time_limit
            .and_then(|limit| Duration::try_from_secs_f64(limit).ok())
            .and_then(|limit| Instant::now().checked_add(limit));

        let levels = model.priority_levels();
        info!(
            "Solving {} with microlp: {} variables, {} constraints, {} priority levels",
            model.name(),
            model.vars().len(),
            model.constraints().len(),
            levels.len()
        );

        let mut bounds: Vec<LevelBound> = Vec::with_capacity(levels.len());
        let mut values = None;

        // a model without objectives is a feasibility problem
        let objectives: Vec<(i32, LinExpr)> = if levels.is_empty() {
            vec![(0, LinExpr::new())]
        } else {
            levels.iter().map(|level| (level.priority, level.blended())).collect()
        };

        for (priority, objective) in objectives {
            let outcome = match Self::solve_level(model, &objective, &bounds, false, deadline)? {
                Err(Status::Infeasible) if !bounds.is_empty() => {
                    debug!(
                        "priority level {} is infeasible at the exact optima above it, relaxing them",
                        priority
                    );
                    Self::solve_level(model, &objective, &bounds, true, deadline)?
                }
                outcome => outcome,
            };
            let solution = match outcome {
                Ok(solution) => solution,
                Err(status) => {
                    info!("priority level {} terminated: {}", priority, status);
                    return Ok(Solved::failed(status));
                }
            };

            let optimum = objective.eval(&solution);
            debug!("priority level {} solved with objective {}", priority, optimum);

            bounds.push(LevelBound {
                expr: objective,
                optimum,
                slack: config.objective_tolerance * optimum.abs().max(1.0),
            });
            values = Some(solution);
        }

        match values {
            Some(values) => Ok(Solved {
                status: Status::Optimal,
                values: Some(values),
            }),
            None => Ok(Solved::failed(Status::Other("no priority level was solved".to_string()))),
        }
    }
}
