use derive_more::{Deref, Display, From, Into};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::error::{Error, Result};

/// Units of a part produced per hour
pub type Rate = f64;
/// Hours
pub type Hours = f64;
/// Units of a part
pub type Quantity = f64;

#[derive(Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct MachineIndex(usize);

#[derive(Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct PartIndex(usize);

#[derive(Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct WeekIndex(usize);

/// The five cost terms of the schedule, in the order their objectives are declared.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Overtime beyond the contractual cap
    Time,
    /// Overtime on the machines
    Machine,
    /// Weekly peak overtime, paid to the operators
    Personnel,
    /// Backlog
    Penalty,
    /// Stock
    Inventory,
}

impl ObjectiveKind {
    pub const ALL: [ObjectiveKind; 5] = [
        ObjectiveKind::Time,
        ObjectiveKind::Machine,
        ObjectiveKind::Personnel,
        ObjectiveKind::Penalty,
        ObjectiveKind::Inventory,
    ];

    /// Position of the objective in the declaration order
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::str::FromStr for ObjectiveKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ObjectiveKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown cost label `{}`", s.trim()))
    }
}

/// One row of the cost table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Cost per unit of the penalised quantity
    pub unit_cost: f64,
    /// Lexicographic priority, a larger value is optimized first
    pub priority: i32,
    /// Weight used to blend objectives sharing a priority
    pub weight: f64,
}

/// Cost, priority and weight of each objective
#[derive(Debug, Clone, PartialEq)]
pub struct CostTable([CostEntry; 5]);

impl CostTable {
    pub fn new(entries: [CostEntry; 5]) -> CostTable {
        CostTable(entries)
    }

    pub fn get(&self, kind: ObjectiveKind) -> &CostEntry {
        &self.0[kind.index()]
    }
}

/// A validated production scheduling instance.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Units of part j per hour on machine i, zero when the machine cannot make the part
    production_rate: TiVec<MachineIndex, TiVec<PartIndex, Rate>>,
    /// Yield of each part, shared by all machines
    yield_rate: TiVec<PartIndex, f64>,
    /// Hours needed to set machine i up for part j
    setup_time: TiVec<MachineIndex, TiVec<PartIndex, Hours>>,
    /// Units of part j due by the end of week k
    demand: TiVec<WeekIndex, TiVec<PartIndex, Quantity>>,
    /// Objective costs and their ranking
    costs: CostTable,
}

fn shape(table: &[Vec<f64>]) -> (usize, usize) {
    (table.len(), table.first().map(|row| row.len()).unwrap_or(0))
}

fn check_shape(name: &str, table: &[Vec<f64>], expected: (usize, usize)) -> Result<()> {
    let (rows, cols) = shape(table);
    let ragged = table.iter().any(|row| row.len() != cols);
    if rows != expected.0 || cols != expected.1 || ragged {
        return Err(Error::ShapeMismatch {
            table: name.to_string(),
            expected_rows: expected.0,
            expected_cols: expected.1,
            rows,
            cols,
        });
    }
    Ok(())
}

fn check_values(name: &str, table: &[Vec<f64>], valid: impl Fn(f64) -> bool, what: &str) -> Result<()> {
    for (r, row) in table.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            if !value.is_finite() || !valid(value) {
                return Err(Error::format(
                    name,
                    format!("value {} at row {}, column {} is not {}", value, r, c, what),
                ));
            }
        }
    }
    Ok(())
}

fn typed<I: From<usize>, J: From<usize>>(table: Vec<Vec<f64>>) -> TiVec<I, TiVec<J, f64>> {
    table.into_iter().map(TiVec::from).collect()
}

impl Problem {
    /// Validates the raw tables and derives the dimensions from them. The machine and part
    /// counts come from the production rate table, the week count from the demand table.
    pub fn new(
        production_rate: Vec<Vec<f64>>,
        yield_rate: Vec<Vec<f64>>,
        setup_time: Vec<Vec<f64>>,
        demand: Vec<Vec<f64>>,
        costs: CostTable,
    ) -> Result<Problem> {
        let (machines, parts) = shape(&production_rate);
        let weeks = demand.len();

        if machines == 0 || parts == 0 {
            return Err(Error::ShapeMismatch {
                table: "ProductionRate".to_string(),
                expected_rows: machines.max(1),
                expected_cols: parts.max(1),
                rows: machines,
                cols: parts,
            });
        }
        if weeks == 0 {
            return Err(Error::ShapeMismatch {
                table: "Demand".to_string(),
                expected_rows: 1,
                expected_cols: parts,
                rows: 0,
                cols: 0,
            });
        }

        check_shape("ProductionRate", &production_rate, (machines, parts))?;
        check_shape("YieldRate", &yield_rate, (1, parts))?;
        check_shape("SetupTime", &setup_time, (machines, parts))?;
        check_shape("Demand", &demand, (weeks, parts))?;

        check_values("ProductionRate", &production_rate, |x| x >= 0.0, "a non-negative rate")?;
        check_values("YieldRate", &yield_rate, |x| x > 0.0 && x <= 1.0, "a yield in (0, 1]")?;
        check_values("SetupTime", &setup_time, |x| x >= 0.0, "a non-negative duration")?;
        check_values("Demand", &demand, |x| x >= 0.0, "a non-negative demand")?;

        for kind in ObjectiveKind::ALL {
            let entry = costs.get(kind);
            if !entry.unit_cost.is_finite() || !entry.weight.is_finite() {
                return Err(Error::format("Cost", format!("{} has a non-finite cost or weight", kind)));
            }
        }

        let yield_rate = yield_rate.into_iter().next().unwrap_or_default();

        Ok(Problem {
            production_rate: typed(production_rate),
            yield_rate: yield_rate.into(),
            setup_time: typed(setup_time),
            demand: typed(demand),
            costs,
        })
    }

    /// The number of machines
    pub fn machines(&self) -> usize {
        self.production_rate.len()
    }

    /// The number of parts
    pub fn parts(&self) -> usize {
        self.yield_rate.len()
    }

    /// The number of weeks in the planning horizon
    pub fn weeks(&self) -> usize {
        self.demand.len()
    }

    pub fn production_rate(&self, machine: MachineIndex, part: PartIndex) -> Rate {
        self.production_rate[machine][part]
    }

    pub fn yield_rate(&self, part: PartIndex) -> f64 {
        self.yield_rate[part]
    }

    pub fn setup_time(&self, machine: MachineIndex, part: PartIndex) -> Hours {
        self.setup_time[machine][part]
    }

    pub fn demand(&self, week: WeekIndex, part: PartIndex) -> Quantity {
        self.demand[week][part]
    }

    /// Demand of a part summed over the whole horizon
    pub fn total_demand(&self, part: PartIndex) -> Quantity {
        self.demand.iter().map(|week| week[part]).sum()
    }

    /// The largest demand of any part in any single week
    pub fn peak_demand(&self) -> Quantity {
        self.demand
            .iter()
            .flat_map(|week| week.iter().copied())
            .fold(0.0, f64::max)
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn costs(penalty_priority: i32) -> CostTable {
        let entry = |priority| CostEntry {
            unit_cost: 1.0,
            priority,
            weight: 1.0,
        };
        CostTable::new([
            entry(1),
            entry(1),
            entry(1),
            entry(penalty_priority),
            entry(0),
        ])
    }

    /// One machine, one part, two weeks
    pub fn tiny() -> Problem {
        Problem::new(
            vec![vec![2.0]],
            vec![vec![1.0]],
            vec![vec![1.0]],
            vec![vec![5.0], vec![3.0]],
            costs(5),
        )
        .unwrap()
    }

    /// One machine, one part, three weeks
    pub fn three_weeks() -> Problem {
        Problem::new(
            vec![vec![2.0]],
            vec![vec![1.0]],
            vec![vec![1.0]],
            vec![vec![4.0], vec![6.0], vec![2.0]],
            costs(5),
        )
        .unwrap()
    }

    #[test]
    fn dimensions_follow_tables() {
        let problem = Problem::new(
            vec![vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 0.0]],
            vec![vec![1.0, 0.9, 0.5]],
            vec![vec![1.0, 1.0, 1.0], vec![2.0, 2.0, 2.0]],
            vec![vec![1.0, 2.0, 3.0]; 4],
            costs(2),
        )
        .unwrap();

        assert_eq!(problem.machines(), 2);
        assert_eq!(problem.parts(), 3);
        assert_eq!(problem.weeks(), 4);
        assert_eq!(problem.total_demand(PartIndex::from(2)), 12.0);
        assert_eq!(problem.peak_demand(), 3.0);
        assert_eq!(problem.setup_time(MachineIndex::from(1), PartIndex::from(0)), 2.0);
    }

    #[test]
    fn setup_time_must_match_production_rate() {
        let err = Problem::new(
            vec![vec![1.0, 1.0]],
            vec![vec![1.0, 1.0]],
            vec![vec![1.0]],
            vec![vec![1.0, 1.0]],
            costs(2),
        )
        .unwrap_err();

        match err {
            Error::ShapeMismatch { table, .. } => assert_eq!(table, "SetupTime"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn demand_must_cover_every_part() {
        let err = Problem::new(
            vec![vec![1.0, 1.0]],
            vec![vec![1.0, 1.0]],
            vec![vec![1.0, 1.0]],
            vec![vec![1.0, 1.0], vec![1.0]],
            costs(2),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { ref table, .. } if table == "Demand"));
    }

    #[test]
    fn yield_outside_unit_interval_is_rejected() {
        let err = Problem::new(
            vec![vec![1.0]],
            vec![vec![1.5]],
            vec![vec![1.0]],
            vec![vec![1.0]],
            costs(2),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DataFormat { ref sheet, .. } if sheet == "YieldRate"));
    }

    #[test]
    fn empty_horizon_is_rejected() {
        let err = Problem::new(vec![vec![1.0]], vec![vec![1.0]], vec![vec![1.0]], vec![], costs(2))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn cost_labels_parse_case_insensitively() {
        assert_eq!("penalty".parse::<ObjectiveKind>(), Ok(ObjectiveKind::Penalty));
        assert_eq!(" Inventory ".parse::<ObjectiveKind>(), Ok(ObjectiveKind::Inventory));
        assert!("Overtime".parse::<ObjectiveKind>().is_err());
    }
}
