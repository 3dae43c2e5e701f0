use std::fmt;

use ndarray::{Array1, Array2, Array3, ArrayView2};
use serde::Serialize;
use typed_index_collections::TiVec;

use super::model::ScheduleMilp;
use crate::models::milp::{VarDomain, VarId};
use crate::models::utils::SlotVars;
use crate::problem::{ObjectiveKind, WeekIndex};

/// Integer and binary values closer than this to an integer are snapped to it
pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;
/// Continuous values closer than this to an integer are solver noise and snapped as well
pub const NOISE_TOLERANCE: f64 = 1e-9;

/// The realized value of one objective
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveValue {
    pub kind: ObjectiveKind,
    pub priority: i32,
    pub weight: f64,
    pub value: f64,
}

/// The optimal schedule, reshaped into per-week tables.
///
/// Three dimensional tables are indexed `[week, machine, part]`, machine tables
/// `[week, machine]` and part tables `[week, part]`. Slots of invalid (machine, part) pairs
/// hold zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleResult {
    /// Objective values, most important first
    pub objectives: Vec<ObjectiveValue>,
    pub n: Array3<f64>,
    pub b: Array3<f64>,
    pub c: Array3<f64>,
    pub c_plus: Array3<f64>,
    pub c_minus: Array3<f64>,
    pub a: Array3<f64>,
    pub h: Array2<f64>,
    pub v: Array2<f64>,
    pub e: Array2<f64>,
    pub x: Array2<f64>,
    pub w: Array1<f64>,
    pub p: Array2<f64>,
    pub t: Array2<f64>,
}

/// Snaps near-integral values and drops negative zeros
fn clean(domain: VarDomain, value: f64) -> f64 {
    let rounded = value.round();
    let tolerance = match domain {
        VarDomain::Continuous => NOISE_TOLERANCE,
        VarDomain::Integer | VarDomain::Binary => INTEGRALITY_TOLERANCE,
    };
    let value = if (value - rounded).abs() <= tolerance { rounded } else { value };
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

struct Extractor<'a> {
    values: &'a TiVec<VarId, f64>,
    shape: (usize, usize, usize),
}

impl<'a> Extractor<'a> {
    fn value(&self, id: VarId) -> f64 {
        self.values[id]
    }

    fn sparse(&self, vars: &SlotVars) -> Array3<f64> {
        let (machines, parts, weeks) = self.shape;
        let mut out = Array3::zeros((weeks, machines, parts));
        for (slot, id) in vars.iter() {
            out[[*slot.week, *slot.machine, *slot.part]] = self.value(*id);
        }
        out
    }

    fn by_week<I>(&self, vars: &TiVec<I, TiVec<WeekIndex, VarId>>) -> Array2<f64> {
        let weeks = self.shape.2;
        Array2::from_shape_fn((weeks, vars.len()), |(k, i)| self.value(vars.raw[i].raw[k]))
    }

    fn weekly(&self, vars: &TiVec<WeekIndex, VarId>) -> Array1<f64> {
        vars.iter().map(|id| self.value(*id)).collect()
    }
}

impl ScheduleResult {
    /// Reshapes an assignment of the scheduling model. A pure function of the assignment.
    pub fn new(milp: &ScheduleMilp, values: &TiVec<VarId, f64>) -> ScheduleResult {
        let values: TiVec<VarId, f64> = values
            .iter_enumerated()
            .map(|(id, value)| clean(milp.model.var(id).domain, *value))
            .collect();
        let extractor = Extractor {
            values: &values,
            shape: (milp.sets.M.len(), milp.sets.J.len(), milp.sets.K.len()),
        };
        let vars = &milp.vars;

        let mut objectives: Vec<ObjectiveValue> = milp
            .model
            .objectives()
            .iter()
            .map(|objective| ObjectiveValue {
                kind: objective.kind,
                priority: objective.priority,
                weight: objective.weight,
                value: objective.expr.eval(&values),
            })
            .collect();
        objectives.sort_by_key(|objective| std::cmp::Reverse(objective.priority));

        ScheduleResult {
            objectives,
            n: extractor.sparse(&vars.n),
            b: extractor.sparse(&vars.b),
            c: extractor.sparse(&vars.c),
            c_plus: extractor.sparse(&vars.c_plus),
            c_minus: extractor.sparse(&vars.c_minus),
            a: extractor.sparse(&vars.a),
            h: extractor.by_week(&vars.h),
            v: extractor.by_week(&vars.v),
            e: extractor.by_week(&vars.e),
            x: extractor.by_week(&vars.x),
            w: extractor.weekly(&vars.w),
            p: extractor.by_week(&vars.p),
            t: extractor.by_week(&vars.t),
        }
    }

    pub fn machines(&self) -> usize {
        self.n.shape()[1]
    }

    pub fn parts(&self) -> usize {
        self.n.shape()[2]
    }

    pub fn weeks(&self) -> usize {
        self.n.shape()[0]
    }

    pub fn objective(&self, kind: ObjectiveKind) -> Option<&ObjectiveValue> {
        self.objectives.iter().find(|objective| objective.kind == kind)
    }

    /// Units of each part produced each week, summed over the machines, indexed `[week, part]`
    pub fn production(&self) -> Array2<f64> {
        self.n.sum_axis(ndarray::Axis(1))
    }

    /// The three dimensional tables with their names
    pub fn slot_tables(&self) -> [(&'static str, &Array3<f64>); 6] {
        [
            ("n", &self.n),
            ("b", &self.b),
            ("c", &self.c),
            ("a", &self.a),
            ("c_plus", &self.c_plus),
            ("c_minus", &self.c_minus),
        ]
    }

    /// The per machine tables with their names. `x` flags a machine running several parts in
    /// a week, so its columns are machines.
    pub fn machine_tables(&self) -> [(&'static str, &Array2<f64>); 4] {
        [("h", &self.h), ("v", &self.v), ("e", &self.e), ("x", &self.x)]
    }

    /// The per part tables with their names
    pub fn part_tables(&self) -> [(&'static str, &Array2<f64>); 2] {
        [("p", &self.p), ("t", &self.t)]
    }
}

fn write_table(
    f: &mut fmt::Formatter<'_>,
    table: ArrayView2<'_, f64>,
    row_label: &str,
    col_label: &str,
) -> fmt::Result {
    write!(f, "{:>12}", "")?;
    for col in 0..table.ncols() {
        write!(f, "{:>12}", format!("{} {}", col_label, col + 1))?;
    }
    writeln!(f)?;
    for (row, values) in table.rows().into_iter().enumerate() {
        write!(f, "{:>12}", format!("{} {}", row_label, row + 1))?;
        for value in values {
            write!(f, "{:>12}", value)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for ScheduleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Objective values")?;
        for objective in &self.objectives {
            writeln!(
                f,
                "  {:<10} priority {:>3}  weight {:>6}  value {}",
                objective.kind.to_string(),
                objective.priority,
                objective.weight,
                objective.value
            )?;
        }

        for (name, table) in self.slot_tables() {
            writeln!(f, "\n{}", name)?;
            for (week, block) in table.outer_iter().enumerate() {
                writeln!(f, "Week {}", week + 1)?;
                write_table(f, block, "Machine", "Part")?;
            }
        }
        for (name, table) in self.machine_tables() {
            writeln!(f, "\n{}", name)?;
            write_table(f, table.view(), "Week", "Machine")?;
        }
        writeln!(f, "\nw")?;
        write_table(f, self.w.view().insert_axis(ndarray::Axis(1)), "Week", "w")?;
        for (name, table) in self.part_tables() {
            writeln!(f, "\n{}", name)?;
            write_table(f, table.view(), "Week", "Part")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, SolverConfig};
    use crate::problem::tests::{costs, three_weeks, tiny};
    use crate::problem::{MachineIndex, PartIndex, Problem};
    use crate::solver::{MicrolpSolver, MilpSolver, Status};

    fn solve(problem: &Problem, config: &ModelConfig) -> (ScheduleMilp, TiVec<VarId, f64>) {
        let milp = ScheduleMilp::build(problem, config).unwrap();
        let solved = MicrolpSolver.solve(&milp.model, &SolverConfig::default()).unwrap();
        assert_eq!(solved.status, Status::Optimal);
        let values = solved.values.unwrap();
        (milp, values)
    }

    /// One machine making two parts over two weeks
    fn two_parts() -> Problem {
        Problem::new(
            vec![vec![4.0, 2.0]],
            vec![vec![1.0, 1.0]],
            vec![vec![2.0, 3.0]],
            vec![vec![8.0, 0.0], vec![0.0, 4.0]],
            costs(5),
        )
        .unwrap()
    }

    fn small_m() -> ModelConfig {
        ModelConfig {
            big_m: 50.0,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn tiny_instance_meets_demand_without_overtime() {
        let (milp, values) = solve(&tiny(), &ModelConfig::default());
        let result = ScheduleResult::new(&milp, &values);

        assert!(result.production().sum() >= 8.0);
        assert!(result.v.iter().all(|v| *v == 0.0));
        assert!(result.e.iter().all(|e| *e == 0.0));
        assert!(result.w.iter().all(|w| *w == 0.0));
        assert!(result.p.iter().all(|p| *p == 0.0));
        assert_eq!(result.objective(ObjectiveKind::Penalty).unwrap().value, 0.0);
        assert_eq!(result.objectives[0].kind, ObjectiveKind::Penalty);
    }

    #[test]
    fn solution_satisfies_every_constraint() {
        for (problem, config) in [(tiny(), ModelConfig::default()), (two_parts(), small_m())] {
            let (milp, values) = solve(&problem, &config);
            assert_eq!(milp.model.violations(&values, 1e-5), vec![]);
        }
    }

    #[test]
    fn stock_and_backlog_conserve_flow() {
        let (milp, values) = solve(&two_parts(), &small_m());
        let result = ScheduleResult::new(&milp, &values);
        let produced = result.production();

        for j in 0..result.parts() {
            // week 0: production + p0 >= demand + t0
            let first = produced[[0, j]] + result.p[[0, j]] - result.t[[0, j]];
            assert!(first >= two_parts().demand(WeekIndex::from(0), j.into()) - 1e-6);
            // last week closes the carried backlog and consumes the carried stock
            let last = produced[[1, j]] + result.t[[0, j]] - result.p[[0, j]];
            assert!(last >= two_parts().demand(WeekIndex::from(1), j.into()) - 1e-6);
        }
    }

    #[test]
    fn exactly_one_initial_setup_per_machine_and_week() {
        let (milp, values) = solve(&two_parts(), &small_m());
        let result = ScheduleResult::new(&milp, &values);

        for week in result.c.outer_iter() {
            for machine in week.rows() {
                assert_eq!(machine.sum(), 1.0);
            }
        }
    }

    #[test]
    fn nothing_is_produced_unless_scheduled() {
        let (milp, values) = solve(&two_parts(), &small_m());
        let result = ScheduleResult::new(&milp, &values);

        for (n, b) in result.n.iter().zip(result.b.iter()) {
            if *b == 0.0 {
                assert_eq!(*n, 0.0);
            }
        }
    }

    #[test]
    fn extraction_is_idempotent_and_snaps_integers() {
        let (milp, mut values) = solve(&tiny(), &ModelConfig::default());
        let slot = (MachineIndex::from(0), PartIndex::from(0), WeekIndex::from(0));
        let n = milp.vars.n[slot];
        values[n] = values[n].round() + 1e-8;

        let first = ScheduleResult::new(&milp, &values);
        let second = ScheduleResult::new(&milp, &values);
        assert_eq!(first, second);
        assert_eq!(first.n[[0, 0, 0]], first.n[[0, 0, 0]].round());
    }

    #[test]
    fn display_labels_are_one_based() {
        let (milp, values) = solve(&tiny(), &ModelConfig::default());
        let text = ScheduleResult::new(&milp, &values).to_string();

        assert!(text.starts_with("Objective values"));
        assert!(text.contains("Week 2"));
        assert!(text.contains("Machine 1"));
        assert!(!text.contains("Week 0"));
    }

    #[test]
    fn clean_snaps_integers_and_solver_noise() {
        assert_eq!(clean(VarDomain::Integer, 2.0000004), 2.0);
        assert_eq!(clean(VarDomain::Binary, -0.0), 0.0);
        assert_eq!(clean(VarDomain::Integer, 2.4), 2.4);
        assert_eq!(clean(VarDomain::Continuous, 2.0000004), 2.0000004);
        assert_eq!(clean(VarDomain::Continuous, 120.0 + 1e-12), 120.0);
        assert_eq!(clean(VarDomain::Continuous, -1e-13), 0.0);
    }

    #[test]
    fn overtime_absorbs_a_capacity_shortfall() {
        // 200 hours of work in a single week, 120 regular and 48 contractual overtime hours
        let problem = Problem::new(vec![vec![1.0]], vec![vec![1.0]], vec![vec![1.0]], vec![vec![200.0]], costs(5))
            .unwrap();
        let config = ModelConfig::default();
        let (milp, values) = solve(&problem, &config);
        let result = ScheduleResult::new(&milp, &values);

        assert!(result.p.iter().all(|p| *p == 0.0));
        assert!((result.production().sum() - 200.0).abs() < 1e-6);
        let (h, v, e) = (result.h[[0, 0]], result.v[[0, 0]], result.e[[0, 0]]);
        assert!(e > 0.0);
        assert!((v - (h - config.regular_hours)).abs() < 1e-6);
        assert!((e - (v - config.overtime_cap)).abs() < 1e-6);
        assert!((result.w[0] - v).abs() < 1e-6);
        assert!(result.objective(ObjectiveKind::Time).unwrap().value > 0.0);
    }

    #[test]
    fn middle_weeks_carry_backlog_and_stock() {
        let (milp, values) = solve(&three_weeks(), &ModelConfig::default());
        assert_eq!(milp.model.violations(&values, 1e-5), vec![]);
        let result = ScheduleResult::new(&milp, &values);
        let produced = result.production();
        let demand = |k: usize| three_weeks().demand(WeekIndex::from(k), PartIndex::from(0));

        // production + p1 + t0 >= demand + p0 + t1
        let middle = produced[[1, 0]] + result.p[[1, 0]] + result.t[[0, 0]];
        assert!(middle >= demand(1) + result.p[[0, 0]] + result.t[[1, 0]] - 1e-6);
        assert!(produced.sum() >= demand(0) + demand(1) + demand(2) - 1e-6);
        assert!(result.p.iter().all(|p| *p == 0.0));
    }
}
