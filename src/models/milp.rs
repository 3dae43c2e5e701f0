//! A solver independent mixed integer linear program.
//!
//! The model owns its variable declarations, its constraints and its ordered list of
//! objectives. Solver backends get a read-only view of it and answer with a value for every variable.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use derive_more::{Deref, Display, From, Into};
use log::trace;
use slice_group_by::GroupBy;
use typed_index_collections::TiVec;

use crate::problem::ObjectiveKind;

/// Identity of a variable, stable for the lifetime of the model
#[derive(Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct VarId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarDomain {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub domain: VarDomain,
    pub lower: f64,
    pub upper: f64,
}

/// A linear expression `sum(coeff * var) + constant`. Terms on the same variable are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> LinExpr {
        LinExpr::default()
    }

    pub fn constant(value: f64) -> LinExpr {
        LinExpr {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        *self.terms.entry(var).or_insert(0.0) += coeff;
    }

    /// The non-zero terms, ordered by variable
    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms
            .iter()
            .filter(|(_, coeff)| **coeff != 0.0)
            .map(|(var, coeff)| (*var, *coeff))
    }

    pub fn coeff(&self, var: VarId) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    pub fn get_constant(&self) -> f64 {
        self.constant
    }

    /// Evaluates the expression against a value for each variable
    pub fn eval(&self, values: &TiVec<VarId, f64>) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(var, coeff)| coeff * values[*var])
                .sum::<f64>()
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        let mut expr = LinExpr::new();
        expr.add_term(var, 1.0);
        expr
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl<T: Into<LinExpr>> AddAssign<T> for LinExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        for (var, coeff) in rhs.terms {
            self.add_term(var, coeff);
        }
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> LinExpr {
        self += rhs;
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> LinExpr {
        let rhs: LinExpr = rhs.into();
        self += -rhs;
        self
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, rhs: f64) -> LinExpr {
        self.terms.values_mut().for_each(|coeff| *coeff *= rhs);
        self.constant *= rhs;
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

impl<T: Into<LinExpr>> Add<T> for VarId {
    type Output = LinExpr;

    fn add(self, rhs: T) -> LinExpr {
        LinExpr::from(self) + rhs
    }
}

impl<T: Into<LinExpr>> Sub<T> for VarId {
    type Output = LinExpr;

    fn sub(self, rhs: T) -> LinExpr {
        LinExpr::from(self) - rhs
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: VarId) -> LinExpr {
        let mut expr = LinExpr::new();
        expr.add_term(rhs, self);
        expr
    }
}

impl Mul<LinExpr> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: LinExpr) -> LinExpr {
        rhs * self
    }
}

impl<T: Into<LinExpr>> std::iter::Sum<T> for LinExpr {
    fn sum<I: Iterator<Item = T>>(iter: I) -> Self {
        iter.fold(LinExpr::new(), |acc, item| acc + item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Sense {
    #[display(fmt = "<=")]
    Le,
    #[display(fmt = ">=")]
    Ge,
    #[display(fmt = "=")]
    Eq,
}

/// Which constraint family a constraint instance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Family {
    #[display(fmt = "scheduling gate")]
    Gate,
    #[display(fmt = "total demand")]
    TotalDemand,
    #[display(fmt = "weekly balance")]
    Balance,
    #[display(fmt = "capacity")]
    Capacity,
    #[display(fmt = "overtime")]
    Overtime,
    #[display(fmt = "overtime cap")]
    OvertimeCap,
    #[display(fmt = "peak overtime")]
    PeakOvertime,
    #[display(fmt = "setup charge")]
    SetupCharge,
    #[display(fmt = "single setup")]
    SingleSetup,
    #[display(fmt = "setup continuity")]
    SetupContinuity,
    #[display(fmt = "setup change")]
    SetupChange,
    #[display(fmt = "setup change bound")]
    SetupChangeBound,
    #[display(fmt = "multi-part upper")]
    MultiPartUpper,
    #[display(fmt = "multi-part lower")]
    MultiPartLower,
    #[display(fmt = "multi-part flips")]
    MultiPartFlips,
    /// Added by a sequential lexicographic solve to hold a solved priority level
    #[display(fmt = "objective level")]
    ObjectiveLevel,
}

/// A linear constraint in the normalized form `expr (sense) rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub family: Family,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    fn new(name: String, family: Family, lhs: LinExpr, sense: Sense, rhs: LinExpr) -> Constraint {
        let mut expr = lhs - rhs;
        let rhs = if expr.constant == 0.0 { 0.0 } else { -expr.constant };
        expr.constant = 0.0;
        Constraint {
            name,
            family,
            expr,
            sense,
            rhs,
        }
    }

    /// How far the assignment is from satisfying the constraint, zero when it holds
    pub fn violation(&self, values: &TiVec<VarId, f64>) -> f64 {
        let lhs = self.expr.eval(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// A linear objective, always minimized
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub kind: ObjectiveKind,
    pub expr: LinExpr,
    /// Larger priorities are optimized first
    pub priority: i32,
    /// Blending weight among objectives of equal priority
    pub weight: f64,
}

/// Objectives sharing one priority, blended by their weights
#[derive(Debug, Clone)]
pub struct PriorityLevel<'a> {
    pub priority: i32,
    pub objectives: Vec<&'a Objective>,
}

impl<'a> PriorityLevel<'a> {
    /// The weighted sum of the objectives on this level
    pub fn blended(&self) -> LinExpr {
        self.objectives
            .iter()
            .map(|objective| objective.weight * objective.expr.clone())
            .sum()
    }
}

/// A constraint that does not hold for an assignment
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub name: String,
    /// `None` for a bound or integrality violation
    pub family: Option<Family>,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    vars: TiVec<VarId, VarDecl>,
    constraints: Vec<Constraint>,
    objectives: Vec<Objective>,
}

impl Model {
    pub fn new(name: &str) -> Model {
        Model {
            name: name.to_string(),
            vars: TiVec::new(),
            constraints: Vec::new(),
            objectives: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: &str, domain: VarDomain, lower: f64, upper: f64) -> VarId {
        let (lower, upper) = match domain {
            VarDomain::Binary => (0.0, 1.0),
            _ => (lower, upper),
        };
        self.vars.push_and_get_key(VarDecl {
            name: name.to_string(),
            domain,
            lower,
            upper,
        })
    }

    pub fn add_constr(
        &mut self,
        name: &str,
        family: Family,
        lhs: impl Into<LinExpr>,
        sense: Sense,
        rhs: impl Into<LinExpr>,
    ) {
        let constraint = Constraint::new(name.to_string(), family, lhs.into(), sense, rhs.into());
        trace!(
            "{}: {:?} {} {}",
            constraint.name,
            constraint.expr.terms().collect::<Vec<_>>(),
            constraint.sense,
            constraint.rhs
        );
        self.constraints.push(constraint);
    }

    /// Adds (or replaces) objective number `index`
    pub fn set_objective_n(&mut self, index: usize, objective: Objective) {
        if index < self.objectives.len() {
            self.objectives[index] = objective;
        } else {
            assert_eq!(index, self.objectives.len(), "objectives must be added in order");
            self.objectives.push(objective);
        }
    }

    pub fn vars(&self) -> &TiVec<VarId, VarDecl> {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// Number of constraints in each family
    pub fn family_counts(&self) -> BTreeMap<Family, usize> {
        let mut counts = BTreeMap::new();
        for constraint in &self.constraints {
            *counts.entry(constraint.family).or_insert(0) += 1;
        }
        counts
    }

    /// The objectives grouped by priority, most important level first
    pub fn priority_levels(&self) -> Vec<PriorityLevel<'_>> {
        let mut sorted: Vec<&Objective> = self.objectives.iter().collect();
        // stable, so objectives keep their declaration order within a level
        sorted.sort_by_key(|objective| std::cmp::Reverse(objective.priority));

        sorted
            .linear_group_by_key(|objective| objective.priority)
            .map(|group| PriorityLevel {
                priority: group[0].priority,
                objectives: group.to_vec(),
            })
            .collect()
    }

    /// Every constraint or bound the assignment violates by more than `tolerance`
    pub fn violations(&self, values: &TiVec<VarId, f64>, tolerance: f64) -> Vec<Violation> {
        let mut out = Vec::new();

        for (id, decl) in self.vars.iter_enumerated() {
            let value = values[id];
            let mut amount = (decl.lower - value).max(0.0) + (value - decl.upper).max(0.0);
            if decl.domain != VarDomain::Continuous {
                amount += (value - value.round()).abs();
            }
            if amount > tolerance {
                out.push(Violation {
                    name: decl.name.clone(),
                    family: None,
                    amount,
                });
            }
        }

        for constraint in &self.constraints {
            let amount = constraint.violation(values);
            if amount > tolerance {
                out.push(Violation {
                    name: constraint.name.clone(),
                    family: Some(constraint.family),
                    amount,
                });
            }
        }

        out
    }

    /// Writes the model in CPLEX LP format
    pub fn write_lp<W: std::io::Write>(&self, mut out: W) -> std::io::Result<()> {
        let term_list = |expr: &LinExpr| -> String {
            let mut s = String::new();
            for (var, coeff) in expr.terms() {
                let sign = if coeff < 0.0 { '-' } else { '+' };
                s.push_str(&format!(" {} {} {}", sign, coeff.abs(), self.vars[var].name));
            }
            if s.is_empty() {
                s.push_str(" 0");
            }
            s
        };

        writeln!(out, "\\ Model {}", self.name)?;
        writeln!(out, "Minimize multi-objectives")?;
        for objective in &self.objectives {
            writeln!(
                out,
                " {}: Priority={} Weight={}",
                objective.kind, objective.priority, objective.weight
            )?;
            writeln!(out, "  {}", term_list(&objective.expr))?;
        }

        writeln!(out, "Subject To")?;
        for constraint in &self.constraints {
            writeln!(
                out,
                " {}:{} {} {}",
                constraint.name,
                term_list(&constraint.expr),
                constraint.sense,
                constraint.rhs
            )?;
        }

        writeln!(out, "Bounds")?;
        for decl in self.vars.iter().filter(|d| d.domain != VarDomain::Binary) {
            if decl.upper.is_finite() {
                writeln!(out, " {} <= {} <= {}", decl.lower, decl.name, decl.upper)?;
            } else {
                writeln!(out, " {} >= {}", decl.name, decl.lower)?;
            }
        }

        let names = |domain: VarDomain| {
            self.vars
                .iter()
                .filter(move |d| d.domain == domain)
                .map(|d| d.name.as_str())
        };
        writeln!(out, "Generals")?;
        for name in names(VarDomain::Integer) {
            writeln!(out, " {}", name)?;
        }
        writeln!(out, "Binaries")?;
        for name in names(VarDomain::Binary) {
            writeln!(out, " {}", name)?;
        }
        writeln!(out, "End")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective(kind: ObjectiveKind, priority: i32, expr: LinExpr) -> Objective {
        Objective {
            kind,
            expr,
            priority,
            weight: 1.0,
        }
    }

    #[test]
    fn expressions_merge_terms() {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarDomain::Continuous, 0.0, f64::INFINITY);
        let y = model.add_var("y", VarDomain::Integer, 0.0, f64::INFINITY);

        let expr = x + 2.0 * y - 3.0 * x + 4.0;
        assert_eq!(expr.coeff(x), -2.0);
        assert_eq!(expr.coeff(y), 2.0);
        assert_eq!(expr.get_constant(), 4.0);

        let values: TiVec<VarId, f64> = vec![1.0, 2.0].into();
        assert_eq!(expr.eval(&values), 6.0);
    }

    #[test]
    fn constraints_are_normalized() {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarDomain::Continuous, 0.0, f64::INFINITY);
        let y = model.add_var("y", VarDomain::Continuous, 0.0, f64::INFINITY);

        // x + 5 >= 2y + 1  <=>  x - 2y >= -4
        model.add_constr("c", Family::Balance, x + 5.0, Sense::Ge, 2.0 * y + 1.0);
        let c = &model.constraints()[0];
        assert_eq!(c.expr.coeff(x), 1.0);
        assert_eq!(c.expr.coeff(y), -2.0);
        assert_eq!(c.rhs, -4.0);

        let ok: TiVec<VarId, f64> = vec![0.0, 2.0].into();
        let bad: TiVec<VarId, f64> = vec![0.0, 3.0].into();
        assert_eq!(c.violation(&ok), 0.0);
        assert_eq!(c.violation(&bad), 2.0);
    }

    #[test]
    fn binaries_are_bounded_and_checked_for_integrality() {
        let mut model = Model::new("test");
        let b = model.add_var("b", VarDomain::Binary, -5.0, 5.0);
        assert_eq!(model.var(b).lower, 0.0);
        assert_eq!(model.var(b).upper, 1.0);

        let half: TiVec<VarId, f64> = vec![0.5].into();
        let violations = model.violations(&half, 1e-6);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "b");
    }

    #[test]
    fn priority_levels_are_ordered_and_blended() {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarDomain::Continuous, 0.0, f64::INFINITY);
        let y = model.add_var("y", VarDomain::Continuous, 0.0, f64::INFINITY);

        model.set_objective_n(0, objective(ObjectiveKind::Time, 1, x.into()));
        model.set_objective_n(1, objective(ObjectiveKind::Machine, 3, y.into()));
        let mut weighted = objective(ObjectiveKind::Penalty, 1, 2.0 * y);
        weighted.weight = 0.5;
        model.set_objective_n(2, weighted);

        let levels = model.priority_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].priority, 3);
        assert_eq!(levels[1].priority, 1);
        assert_eq!(
            levels[1].objectives.iter().map(|o| o.kind).collect::<Vec<_>>(),
            vec![ObjectiveKind::Time, ObjectiveKind::Penalty]
        );

        let blended = levels[1].blended();
        assert_eq!(blended.coeff(x), 1.0);
        assert_eq!(blended.coeff(y), 1.0);
    }

    #[test]
    fn lp_output_lists_every_section() {
        let mut model = Model::new("lp");
        let n = model.add_var("n_0", VarDomain::Integer, 0.0, f64::INFINITY);
        let b = model.add_var("b_0", VarDomain::Binary, 0.0, 1.0);
        model.add_constr("gate_0", Family::Gate, n, Sense::Le, 100.0 * b);
        model.set_objective_n(0, objective(ObjectiveKind::Time, 0, n.into()));

        let mut buffer = Vec::new();
        model.write_lp(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("gate_0: + 1 n_0 - 100 b_0 <= 0"));
        assert!(text.contains("Generals\n n_0"));
        assert!(text.contains("Binaries\n b_0"));
        assert!(text.ends_with("End\n"));
    }
}
