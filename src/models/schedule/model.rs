use itertools::iproduct;
use log::{debug, info};
use typed_index_collections::TiVec;

use super::objectives::set_objectives;
use super::results::ScheduleResult;
use super::sets_and_parameters::{Parameters, Sets};
use crate::config::{ModelConfig, SolverConfig};
use crate::error::{Error, Result};
use crate::models::milp::{Family, LinExpr, Model, Sense, VarDomain, VarId};
use crate::models::utils::{slot_vars, AddVars, SlotVars};
use crate::problem::{MachineIndex, PartIndex, Problem, WeekIndex};
use crate::solver::{MilpSolver, Status};

/// Tolerance of the verification pass run on every returned solution
const VERIFY_TOLERANCE: f64 = 1e-5;

/// The decision variables of the scheduling model
pub struct Variables {
    /// Units of part j produced on machine i in week k
    pub n: SlotVars,
    /// 1 if machine i is scheduled to produce part j in week k
    pub b: SlotVars,
    /// 1 if part j is the part machine i is set up for at the start of week k
    pub c: SlotVars,
    /// 1 if c switches on from week k to week k + 1
    pub c_plus: SlotVars,
    /// 1 if c switches off from week k to week k + 1
    pub c_minus: SlotVars,
    /// 1 if setup time for part j is charged on machine i in week k
    pub a: SlotVars,
    /// Hours machine i operates in week k
    pub h: TiVec<MachineIndex, TiVec<WeekIndex, VarId>>,
    /// Overtime hours of machine i in week k
    pub v: TiVec<MachineIndex, TiVec<WeekIndex, VarId>>,
    /// Overtime of machine i beyond the contractual cap in week k
    pub e: TiVec<MachineIndex, TiVec<WeekIndex, VarId>>,
    /// 1 if machine i produces at least two different parts in week k
    pub x: TiVec<MachineIndex, TiVec<WeekIndex, VarId>>,
    /// The largest overtime of any machine in week k
    pub w: TiVec<WeekIndex, VarId>,
    /// Backlog of part j at the end of week k
    pub p: TiVec<PartIndex, TiVec<WeekIndex, VarId>>,
    /// Stock of part j at the end of week k
    pub t: TiVec<PartIndex, TiVec<WeekIndex, VarId>>,
}

/// The production scheduling MILP together with the index sets it was built over
pub struct ScheduleMilp {
    pub model: Model,
    pub vars: Variables,
    pub sets: Sets,
}

#[allow(non_snake_case)]
impl ScheduleMilp {
    /// Builds the complete model: variables, every constraint family and the objectives.
    pub fn build(problem: &Problem, config: &ModelConfig) -> Result<ScheduleMilp> {
        config.validate()?;
        config.check_big_m(problem.peak_demand());

        info!(
            "Building scheduling model for {} machines, {} parts and {} weeks",
            problem.machines(),
            problem.parts(),
            problem.weeks()
        );

        let sets = Sets::new(problem);
        let parameters = Parameters::new(problem, &sets, config);
        let mut model = Model::new("production_scheduling");

        for j in sets.orphan_parts() {
            debug!("part {} cannot be produced on any machine", j);
        }

        let vars = Self::variables(&mut model, &sets);

        Self::gate_constraints(&mut model, &sets, &parameters, &vars);
        Self::demand_constraints(&mut model, &sets, &parameters, &vars);
        Self::balance_constraints(&mut model, &sets, &parameters, &vars);
        Self::capacity_constraints(&mut model, &sets, &parameters, &vars);
        Self::overtime_constraints(&mut model, &sets, &parameters, &vars);
        Self::setup_constraints(&mut model, &sets, &vars);
        Self::changeover_constraints(&mut model, &sets, &vars);
        Self::multi_part_constraints(&mut model, &sets, &parameters, &vars);

        set_objectives(&mut model, &sets, &vars, problem.costs());

        for (family, count) in model.family_counts() {
            debug!("{:>20}: {} constraints", family, count);
        }
        info!(
            "Successfully built scheduling model with {} variables and {} constraints",
            model.vars().len(),
            model.constraints().len()
        );

        Ok(ScheduleMilp { model, vars, sets })
    }

    /// Solves the model and reshapes the optimal assignment into result tables. Anything but
    /// an optimal solve is reported as a [`Error::SolverFailure`].
    pub fn solve(&self, solver: &dyn MilpSolver, config: &SolverConfig) -> Result<ScheduleResult> {
        info!("Solving scheduling model with {}", solver.name());
        let solved = solver.solve(&self.model, config)?;
        info!("Finished optimizing scheduling model: {}", solved.status);

        let values = match (solved.status, solved.values) {
            (Status::Optimal, Some(values)) => values,
            (Status::Optimal, None) => {
                return Err(Error::SolverRuntime("optimal status without a solution".to_string()))
            }
            (status, _) => return Err(Error::SolverFailure(status)),
        };

        let violations = self.model.violations(&values, VERIFY_TOLERANCE);
        if violations.is_empty() {
            debug!("solution satisfies every constraint and bound");
        }
        for violation in &violations {
            match violation.family {
                Some(family) => debug!("{} ({}) violated by {}", violation.name, family, violation.amount),
                None => debug!("bound of {} violated by {}", violation.name, violation.amount),
            }
        }

        Ok(ScheduleResult::new(self, &values))
    }

    fn variables(model: &mut Model, sets: &Sets) -> Variables {
        let unbounded = 0.0..f64::INFINITY;
        let binary = 0.0..1.0;
        let M = &sets.M[..];
        let J = &sets.J[..];
        let K = &sets.K[..];

        Variables {
            n: slot_vars(sets.valid_weeks(), model, VarDomain::Integer, &unbounded, "n"),
            b: slot_vars(sets.valid_weeks(), model, VarDomain::Binary, &binary, "b"),
            h: (M, K).cont(model, "h"),
            v: (M, K).cont(model, "v"),
            e: (M, K).cont(model, "e"),
            w: K.cont(model, "w"),
            c: slot_vars(sets.valid_weeks(), model, VarDomain::Binary, &binary, "c"),
            c_plus: slot_vars(sets.valid_weeks(), model, VarDomain::Binary, &binary, "c_plus"),
            c_minus: slot_vars(sets.valid_weeks(), model, VarDomain::Binary, &binary, "c_minus"),
            a: slot_vars(sets.valid_weeks(), model, VarDomain::Binary, &binary, "a"),
            x: (M, K).binary(model, "x"),
            p: (J, K).int(model, "p"),
            t: (J, K).int(model, "t"),
        }
    }

    /// Total production of part j in week k over every machine able to make it
    fn production(sets: &Sets, vars: &Variables, j: PartIndex, k: WeekIndex) -> LinExpr {
        sets.machines_of(j).iter().map(|&i| vars.n[(i, j, k)]).sum()
    }

    /// Production only takes place when it is scheduled
    fn gate_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        for (i, j, k) in sets.valid_weeks() {
            model.add_constr(
                &format!("gate_{i}_{j}_{k}"),
                Family::Gate,
                vars.n[(i, j, k)],
                Sense::Le,
                parameters.big_m * vars.b[(i, j, k)],
            );
        }
    }

    /// Total production over the horizon covers the total demand
    fn demand_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        for &j in &sets.J {
            let lhs: LinExpr = sets.K.iter().map(|&k| Self::production(sets, vars, j, k)).sum();
            model.add_constr(
                &format!("total_demand_{j}"),
                Family::TotalDemand,
                lhs,
                Sense::Ge,
                parameters.D_tot(j),
            );
        }
    }

    /// Backlog is carried into the next week and stock serves the next week's demand. There is
    /// no backlog or stock before the first week, and the last week has to close both.
    fn balance_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let last = sets.K.len() - 1;

        for &j in &sets.J {
            for &k in &sets.K {
                let produced = Self::production(sets, vars, j, k);
                let demand = parameters.D[k][j];
                let (p, t) = (&vars.p[j], &vars.t[j]);

                let (lhs, rhs) = match *k {
                    // single week horizon: nothing to carry in or out
                    0 if last == 0 => (produced, LinExpr::constant(demand)),
                    0 => (produced + p[k], t[k] + demand),
                    n if n == last => {
                        let prev = WeekIndex::from(n - 1);
                        (produced + t[prev], p[prev] + demand)
                    }
                    n => {
                        let prev = WeekIndex::from(n - 1);
                        (produced + p[k] + t[prev], p[prev] + t[k] + demand)
                    }
                };

                model.add_constr(&format!("balance_{j}_{k}"), Family::Balance, lhs, Sense::Ge, rhs);
            }
        }
    }

    /// Production and setup time must fit in the hours a machine operates
    fn capacity_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        for (i, &k) in iproduct!(sets.active_machines(), &sets.K) {
            let used: LinExpr = sets.J_m[i]
                .iter()
                .map(|&j| {
                    parameters.hours_per_unit[i][j] * vars.n[(i, j, k)]
                        + parameters.S[i][j] * vars.a[(i, j, k)]
                })
                .sum();

            model.add_constr(&format!("time_{i}_{k}"), Family::Capacity, used, Sense::Le, vars.h[i][k]);
        }
    }

    /// Overtime starts after the regular hours, overtime beyond the contractual cap is logged
    /// separately and the weekly peak overtime covers every machine.
    fn overtime_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        for (&i, &k) in iproduct!(&sets.M, &sets.K) {
            let (h, v, e) = (vars.h[i][k], vars.v[i][k], vars.e[i][k]);

            model.add_constr(
                &format!("overtime_{i}_{k}"),
                Family::Overtime,
                v,
                Sense::Ge,
                h - parameters.regular_hours,
            );
            model.add_constr(
                &format!("exceed_{i}_{k}"),
                Family::OvertimeCap,
                v,
                Sense::Le,
                e + parameters.overtime_cap,
            );
            model.add_constr(
                &format!("peak_overtime_{i}_{k}"),
                Family::PeakOvertime,
                vars.w[k],
                Sense::Ge,
                v,
            );
        }
    }

    /// Setup time is charged for every scheduled part except the one the machine is already
    /// set up for, and that part must have been produced the week before.
    fn setup_constraints(model: &mut Model, sets: &Sets, vars: &Variables) {
        for (i, j, k) in sets.valid_weeks() {
            model.add_constr(
                &format!("setup_charge_{i}_{j}_{k}"),
                Family::SetupCharge,
                vars.a[(i, j, k)],
                Sense::Ge,
                vars.b[(i, j, k)] - vars.c[(i, j, k)],
            );
        }

        for (i, &k) in iproduct!(sets.active_machines(), &sets.K) {
            let lhs: LinExpr = sets.parts_of(i).iter().map(|&j| vars.c[(i, j, k)]).sum();
            model.add_constr(&format!("one_setup_{i}_{k}"), Family::SingleSetup, lhs, Sense::Eq, 1.0);
        }

        for (i, j, k) in sets.valid_weeks().filter(|(_, _, k)| **k > 0) {
            let prev = WeekIndex::from(*k - 1);
            model.add_constr(
                &format!("setup_{i}_{j}_{k}"),
                Family::SetupContinuity,
                vars.c[(i, j, k)],
                Sense::Le,
                vars.b[(i, j, prev)],
            );
        }
    }

    /// Splits the change of c between consecutive weeks into an up and a down jump
    fn changeover_constraints(model: &mut Model, sets: &Sets, vars: &Variables) {
        for (&(i, j), &k) in iproduct!(&sets.valid, sets.transitions()) {
            let next = WeekIndex::from(*k + 1);
            let (plus, minus) = (vars.c_plus[(i, j, k)], vars.c_minus[(i, j, k)]);

            model.add_constr(
                &format!("linearization_{i}_{j}_{k}"),
                Family::SetupChange,
                plus - minus,
                Sense::Eq,
                vars.c[(i, j, next)] - vars.c[(i, j, k)],
            );
            model.add_constr(
                &format!("legalization_{i}_{j}_{k}"),
                Family::SetupChangeBound,
                plus + minus,
                Sense::Le,
                1.0,
            );
        }
    }

    /// x is 1 exactly when a machine produces two or more parts in a week, and then the
    /// initial setup of the machine changes into the next week.
    fn multi_part_constraints(model: &mut Model, sets: &Sets, parameters: &Parameters, vars: &Variables) {
        let big_m = parameters.big_m;

        for (i, &k) in iproduct!(sets.active_machines(), sets.transitions()) {
            let x = vars.x[i][k];
            let scheduled: LinExpr = sets.parts_of(i).iter().map(|&j| vars.b[(i, j, k)]).sum();
            let flips: LinExpr = sets.J_m[i]
                .iter()
                .map(|&j| vars.c_plus[(i, j, k)] + vars.c_minus[(i, j, k)])
                .sum();

            model.add_constr(
                &format!("upper_{i}_{k}"),
                Family::MultiPartUpper,
                scheduled.clone(),
                Sense::Le,
                big_m * x + 1.0,
            );
            model.add_constr(
                &format!("lower_{i}_{k}"),
                Family::MultiPartLower,
                scheduled,
                Sense::Ge,
                LinExpr::constant(2.0) - big_m * (LinExpr::constant(1.0) - x),
            );
            model.add_constr(&format!("difference_{i}_{k}"), Family::MultiPartFlips, flips, Sense::Eq, 2.0 * x);
        }
    }
}
