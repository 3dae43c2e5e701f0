use itertools::iproduct;
use log::debug;
use typed_index_collections::TiVec;

use crate::config::ModelConfig;
use crate::problem::{Hours, MachineIndex, PartIndex, Problem, WeekIndex};

/// Index sets of the scheduling model
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of machines
    pub M: Vec<MachineIndex>,
    /// Set of parts
    pub J: Vec<PartIndex>,
    /// Set of weeks
    pub K: Vec<WeekIndex>,
    /// (machine, part) pairs with a positive production rate, ordered by machine then part
    pub valid: Vec<(MachineIndex, PartIndex)>,
    /// Parts each machine can produce
    pub J_m: TiVec<MachineIndex, Vec<PartIndex>>,
    /// Machines able to produce each part
    pub M_j: TiVec<PartIndex, Vec<MachineIndex>>,
}

#[allow(non_snake_case)]
impl Sets {
    pub fn new(problem: &Problem) -> Sets {
        macro_rules! set {
            ($type:ident, $n:expr) => {
                (0..$n).map($type::from).collect::<Vec<_>>()
            };
        }

        let M = set!(MachineIndex, problem.machines());
        let J = set!(PartIndex, problem.parts());
        let K = set!(WeekIndex, problem.weeks());

        let valid: Vec<(MachineIndex, PartIndex)> = iproduct!(M.iter().copied(), J.iter().copied())
            .filter(|&(i, j)| problem.production_rate(i, j) > 0.0)
            .collect();

        let mut J_m: TiVec<MachineIndex, Vec<PartIndex>> = vec![Vec::new(); M.len()].into();
        let mut M_j: TiVec<PartIndex, Vec<MachineIndex>> = vec![Vec::new(); J.len()].into();
        for &(i, j) in &valid {
            J_m[i].push(j);
            M_j[j].push(i);
        }

        debug!(
            "{} machines, {} parts, {} weeks, {} valid pairs",
            M.len(),
            J.len(),
            K.len(),
            valid.len()
        );

        Sets {
            M,
            J,
            K,
            valid,
            J_m,
            M_j,
        }
    }

    /// Parts machine i can produce
    pub fn parts_of(&self, i: MachineIndex) -> &[PartIndex] {
        &self.J_m[i]
    }

    /// Machines able to produce part j
    pub fn machines_of(&self, j: PartIndex) -> &[MachineIndex] {
        &self.M_j[j]
    }

    /// Machines that can produce at least one part
    pub fn active_machines(&self) -> impl Iterator<Item = MachineIndex> + '_ {
        self.M.iter().copied().filter(move |i| !self.J_m[*i].is_empty())
    }

    /// Machines without any valid part
    pub fn idle_machines(&self) -> impl Iterator<Item = MachineIndex> + '_ {
        self.M.iter().copied().filter(move |i| self.J_m[*i].is_empty())
    }

    /// Parts no machine can produce
    pub fn orphan_parts(&self) -> impl Iterator<Item = PartIndex> + '_ {
        self.J.iter().copied().filter(move |j| self.M_j[*j].is_empty())
    }

    /// Every valid pair in every week
    pub fn valid_weeks(&self) -> impl Iterator<Item = (MachineIndex, PartIndex, WeekIndex)> + '_ {
        iproduct!(self.valid.iter().copied(), self.K.iter().copied()).map(|((i, j), k)| (i, j, k))
    }

    /// All weeks except the last one, i.e. the weeks that have a successor
    pub fn transitions(&self) -> &[WeekIndex] {
        &self.K[..self.K.len().saturating_sub(1)]
    }
}

/// Parameters of the scheduling model
#[allow(non_snake_case)]
pub struct Parameters {
    /// Hours machine i needs per good unit of part j, `1 / (rate * yield)`. Zero for invalid pairs.
    pub hours_per_unit: TiVec<MachineIndex, TiVec<PartIndex, Hours>>,
    /// Hours to set machine i up for part j
    pub S: TiVec<MachineIndex, TiVec<PartIndex, Hours>>,
    /// Units of part j due by the end of week k
    pub D: TiVec<WeekIndex, TiVec<PartIndex, f64>>,
    /// Big-M used by the logical implications
    pub big_m: f64,
    /// Regular hours per machine and week
    pub regular_hours: Hours,
    /// Contractual overtime per machine and week
    pub overtime_cap: Hours,
}

#[allow(non_snake_case)]
impl Parameters {
    pub fn new(problem: &Problem, sets: &Sets, config: &ModelConfig) -> Parameters {
        let hours_per_unit = sets
            .M
            .iter()
            .map(|&i| {
                sets.J
                    .iter()
                    .map(|&j| match problem.production_rate(i, j) {
                        rate if rate > 0.0 => 1.0 / (rate * problem.yield_rate(j)),
                        _ => 0.0,
                    })
                    .collect()
            })
            .collect();

        let S = sets
            .M
            .iter()
            .map(|&i| sets.J.iter().map(|&j| problem.setup_time(i, j)).collect())
            .collect();

        let D = sets
            .K
            .iter()
            .map(|&k| sets.J.iter().map(|&j| problem.demand(k, j)).collect())
            .collect();

        Parameters {
            hours_per_unit,
            S,
            D,
            big_m: config.big_m,
            regular_hours: config.regular_hours,
            overtime_cap: config.overtime_cap,
        }
    }

    /// Total demand of part j over the horizon
    pub fn D_tot(&self, j: PartIndex) -> f64 {
        self.D.iter().map(|week| week[j]).sum()
    }
}
