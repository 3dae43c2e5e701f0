use itertools::iproduct;

use super::model::Variables;
use super::sets_and_parameters::Sets;
use crate::models::milp::{LinExpr, Model, Objective};
use crate::problem::{CostTable, ObjectiveKind};

/// The penalised quantity behind each objective, before costing
fn quantity(kind: ObjectiveKind, sets: &Sets, vars: &Variables) -> LinExpr {
    match kind {
        ObjectiveKind::Time => iproduct!(&sets.M, &sets.K).map(|(&i, &k)| vars.e[i][k]).sum(),
        ObjectiveKind::Machine => iproduct!(&sets.M, &sets.K).map(|(&i, &k)| vars.v[i][k]).sum(),
        ObjectiveKind::Personnel => sets.K.iter().map(|&k| vars.w[k]).sum(),
        ObjectiveKind::Penalty => iproduct!(&sets.J, &sets.K).map(|(&j, &k)| vars.p[j][k]).sum(),
        ObjectiveKind::Inventory => iproduct!(&sets.J, &sets.K).map(|(&j, &k)| vars.t[j][k]).sum(),
    }
}

/// Declares the five objectives in their fixed order, each costed and ranked by the cost table
pub fn set_objectives(model: &mut Model, sets: &Sets, vars: &Variables, costs: &CostTable) {
    for kind in ObjectiveKind::ALL {
        let entry = costs.get(kind);
        model.set_objective_n(
            kind.index(),
            Objective {
                kind,
                expr: entry.unit_cost * quantity(kind, sets, vars),
                priority: entry.priority,
                weight: entry.weight,
            },
        );
    }
}
