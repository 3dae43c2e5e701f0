use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::{Index, Range};

use typed_index_collections::TiVec;

use super::milp::{Model, VarDomain, VarId};
use crate::problem::{MachineIndex, PartIndex, WeekIndex};

pub trait AddVars {
    type Out;

    /// Create a variable for any type
    fn vars(&self, model: &mut Model, base_name: &str, domain: VarDomain, bounds: &Range<f64>) -> Self::Out;

    /// Binary variables
    fn binary(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarDomain::Binary, &(0.0..1.0))
    }

    /// A continuous non-negative variable
    fn cont(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarDomain::Continuous, &(0.0..f64::INFINITY))
    }

    /// A non-negative integer variable
    fn int(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarDomain::Integer, &(0.0..f64::INFINITY))
    }
}

impl<I> AddVars for [I]
where
    I: Copy + Display + From<usize> + Into<usize>,
{
    type Out = TiVec<I, VarId>;

    fn vars(&self, model: &mut Model, base_name: &str, domain: VarDomain, bounds: &Range<f64>) -> Self::Out {
        self.iter()
            .map(|i| model.add_var(&format!("{}_{}", base_name, i), domain, bounds.start, bounds.end))
            .collect()
    }
}

impl<I, K> AddVars for (&[I], &[K])
where
    I: Copy + Display + From<usize> + Into<usize>,
    K: Copy + Display + From<usize> + Into<usize>,
{
    type Out = TiVec<I, TiVec<K, VarId>>;

    fn vars(&self, model: &mut Model, base_name: &str, domain: VarDomain, bounds: &Range<f64>) -> Self::Out {
        self.0
            .iter()
            .map(|i| self.1.vars(model, &format!("{}_{}", base_name, i), domain, bounds))
            .collect()
    }
}

/// A (machine, part, week) index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub machine: MachineIndex,
    pub part: PartIndex,
    pub week: WeekIndex,
}

impl From<(MachineIndex, PartIndex, WeekIndex)> for Slot {
    fn from((machine, part, week): (MachineIndex, PartIndex, WeekIndex)) -> Self {
        Slot { machine, part, week }
    }
}

/// Variables defined on a sparse set of slots
#[derive(Debug, Clone, Default)]
pub struct SlotVars(BTreeMap<Slot, VarId>);

impl SlotVars {
    pub fn get(&self, slot: impl Into<Slot>) -> Option<VarId> {
        self.0.get(&slot.into()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &VarId)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<(MachineIndex, PartIndex, WeekIndex)> for SlotVars {
    type Output = VarId;

    fn index(&self, index: (MachineIndex, PartIndex, WeekIndex)) -> &VarId {
        &self.0[&Slot::from(index)]
    }
}

/// Creates one variable per slot, skipping every slot the iterator does not yield
pub fn slot_vars(
    slots: impl Iterator<Item = (MachineIndex, PartIndex, WeekIndex)>,
    model: &mut Model,
    domain: VarDomain,
    bounds: &Range<f64>,
    base_name: &str,
) -> SlotVars {
    SlotVars(
        slots
            .map(|(i, j, k)| {
                let name = format!("{}_{}_{}_{}", base_name, i, j, k);
                ((i, j, k).into(), model.add_var(&name, domain, bounds.start, bounds.end))
            })
            .collect(),
    )
}
