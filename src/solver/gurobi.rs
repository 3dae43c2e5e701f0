//! Gurobi backend using its native hierarchical multi-objective support.

use grb::prelude::*;
use log::info;
use typed_index_collections::TiVec;

use super::{MilpSolver, Solved, Status};
use crate::config::SolverConfig;
use crate::error::{Error, Result};
use crate::models::milp::{self, Model as Milp, Sense, VarDomain, VarId};

#[derive(Debug, Clone, Copy, Default)]
pub struct GurobiSolver;

#[allow(non_snake_case)]
pub trait NObjectives {
    /// Adds a new objective to the model
    ///
    /// # Arguments
    ///
    /// *`expr` - A linear expression
    ///
    /// *`priority` - The priority of the objective. Larger priorities are optimized first.
    ///
    /// *`weight` - Weight of the objective among the objectives sharing its priority
    ///
    /// *`index` - The index of the objective, i.e. objective number *i* in the model. **Starts at 0.**
    ///
    /// *`name` - A string slice that holds the name of the objective.
    fn set_objective_N(
        &mut self,
        expr: grb::expr::LinExpr,
        priority: i32,
        weight: f64,
        index: i32,
        name: &str,
    ) -> grb::Result<()>;
}

impl NObjectives for grb::Model {
    fn set_objective_N(
        &mut self,
        expr: grb::expr::LinExpr,
        priority: i32,
        weight: f64,
        index: i32,
        name: &str,
    ) -> grb::Result<()> {
        self.update()?;
        let (coeff_map, obj_cons) = expr.into_parts();

        // number of objective is set to the max of the current number and the index+1
        let num_objectives = i32::max(self.get_attr(attr::NumObj)?, index + 1);
        self.set_attr(attr::NumObj, num_objectives)?;

        // select the objective the ObjN attributes refer to
        self.set_param(param::ObjNumber, index)?;
        self.set_obj_attr_batch(attr::ObjN, coeff_map)?;
        self.set_attr(attr::ObjNCon, obj_cons)?;
        self.set_attr(attr::ObjNPriority, priority)?;
        self.set_attr(attr::ObjNWeight, weight)?;
        self.set_attr(attr::ObjNName, name)?;

        Ok(())
    }
}

fn status(status: grb::Status) -> Status {
    match status {
        grb::Status::Optimal => Status::Optimal,
        grb::Status::Infeasible => Status::Infeasible,
        grb::Status::Unbounded => Status::Unbounded,
        grb::Status::TimeLimit => Status::TimeLimit,
        other => Status::Other(format!("{:?}", other)),
    }
}

fn linear(expr: &milp::LinExpr, vars: &TiVec<VarId, Var>) -> grb::expr::LinExpr {
    let mut out = grb::expr::LinExpr::new();
    for (id, coeff) in expr.terms() {
        out.add_term(coeff, vars[id]);
    }
    out.add_constant(expr.get_constant());
    out
}

impl GurobiSolver {
    fn build(milp: &Milp, config: &SolverConfig) -> grb::Result<(grb::Model, TiVec<VarId, Var>)> {
        let mut model = grb::Model::new(milp.name())?;
        model.set_param(param::OutputFlag, if config.verbose { 1 } else { 0 })?;
        if let Some(limit) = config.time_limit {
            model.set_param(param::TimeLimit, limit)?;
        }
        if let Some(gap) = config.mip_gap {
            model.set_param(param::MIPGap, gap)?;
        }

        let mut vars = TiVec::with_capacity(milp.vars().len());
        for decl in milp.vars() {
            let vtype = match decl.domain {
                VarDomain::Continuous => VarType::Continuous,
                VarDomain::Integer => VarType::Integer,
                VarDomain::Binary => VarType::Binary,
            };
            vars.push(model.add_var(&decl.name, vtype, 0.0, decl.lower, decl.upper, std::iter::empty())?);
        }
        model.update()?;

        for constraint in milp.constraints() {
            let lhs = linear(&constraint.expr, &vars);
            let rhs = constraint.rhs;
            match constraint.sense {
                Sense::Le => model.add_constr(&constraint.name, c!(lhs <= rhs))?,
                Sense::Ge => model.add_constr(&constraint.name, c!(lhs >= rhs))?,
                Sense::Eq => model.add_constr(&constraint.name, c!(lhs == rhs))?,
            };
        }

        // reset current objectives
        model.set_param(param::ObjNumber, 0)?;
        model.set_attr(attr::NumObj, 0)?;
        for (index, objective) in milp.objectives().iter().enumerate() {
            model.set_objective_N(
                linear(&objective.expr, &vars),
                objective.priority,
                objective.weight,
                index as i32,
                &objective.kind.to_string(),
            )?;
        }

        Ok((model, vars))
    }

    fn run(milp: &Milp, config: &SolverConfig) -> grb::Result<Solved> {
        let (mut model, vars) = Self::build(milp, config)?;

        info!("Solving {} with gurobi", milp.name());
        model.optimize()?;
        let status = status(model.status()?);
        info!("Finished optimizing {}: {}", milp.name(), status);

        if status != Status::Optimal {
            return Ok(Solved::failed(status));
        }

        let values: TiVec<VarId, f64> = model.get_obj_attr_batch(attr::X, vars.iter().copied())?.into();
        Ok(Solved {
            status,
            values: Some(values),
        })
    }
}

impl MilpSolver for GurobiSolver {
    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn solve(&self, model: &Milp, config: &SolverConfig) -> Result<Solved> {
        config.validate()?;
        Self::run(model, config).map_err(|e| Error::SolverRuntime(e.to_string()))
    }
}
