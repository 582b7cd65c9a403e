//! Solver-neutral mixed-integer linear program.
//!
//! Model builders write into a [`LinearProgram`]; backends translate it into
//! whatever their solver expects. Variables are addressed by [`VarId`],
//! constraints keep their names so the owning module can be traced back from
//! a solver log.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Index of a variable inside its [`LinearProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Continuous,
    Binary,
    Integer,
}

impl VarKind {
    pub fn code(&self) -> i32 {
        match self {
            VarKind::Continuous => 0,
            VarKind::Binary => 1,
            VarKind::Integer => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(VarKind::Continuous),
            1 => Some(VarKind::Binary),
            2 => Some(VarKind::Integer),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, VarKind::Continuous)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// `f64::NEG_INFINITY` when unbounded below
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above
    pub upper: f64,
}

/// Affine expression `Σ coef·var + constant`.
///
/// Terms are kept in insertion order and may repeat a variable; call
/// [`LinearExpr::compact`] to merge them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Merge repeated variables and drop zero coefficients. Order follows the
    /// first appearance of each variable.
    pub fn compact(mut self) -> Self {
        let mut position: HashMap<VarId, usize> = HashMap::with_capacity(self.terms.len());
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(self.terms.len());
        for (var, coef) in self.terms.drain(..) {
            match position.get(&var) {
                Some(&idx) => merged[idx].1 += coef,
                None => {
                    position.insert(var, merged.len());
                    merged.push((var, coef));
                }
            }
        }
        merged.retain(|(_, coef)| *coef != 0.0);
        self.terms = merged;
        self
    }

    /// Value of the expression for a full assignment indexed by `VarId`.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    pub fn sum<I, E>(items: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<LinearExpr>,
    {
        let mut acc = LinearExpr::new();
        for item in items {
            let expr: LinearExpr = item.into();
            acc += expr;
        }
        acc
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1.0)
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        LinearExpr::constant(value)
    }
}

impl From<&LinearExpr> for LinearExpr {
    fn from(expr: &LinearExpr) -> Self {
        expr.clone()
    }
}

impl AddAssign for LinearExpr {
    fn add_assign(&mut self, rhs: LinearExpr) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl AddAssign<VarId> for LinearExpr {
    fn add_assign(&mut self, rhs: VarId) {
        self.terms.push((rhs, 1.0));
    }
}

impl AddAssign<f64> for LinearExpr {
    fn add_assign(&mut self, rhs: f64) {
        self.constant += rhs;
    }
}

impl SubAssign for LinearExpr {
    fn sub_assign(&mut self, rhs: LinearExpr) {
        *self += -rhs;
    }
}

impl SubAssign<VarId> for LinearExpr {
    fn sub_assign(&mut self, rhs: VarId) {
        self.terms.push((rhs, -1.0));
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        let rhs: LinearExpr = rhs.into();
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(mut self, rhs: T) -> LinearExpr {
        let rhs: LinearExpr = rhs.into();
        self -= rhs;
        self
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: f64) -> LinearExpr {
        for (_, coef) in self.terms.iter_mut() {
            *coef *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<f64> for VarId {
    type Output = LinearExpr;

    fn mul(self, rhs: f64) -> LinearExpr {
        LinearExpr::term(self, rhs)
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: VarId) -> LinearExpr {
        LinearExpr::term(rhs, self)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self * -1.0
    }
}

impl<T: Into<LinearExpr>> Add<T> for VarId {
    type Output = LinearExpr;

    fn add(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) + rhs
    }
}

impl<T: Into<LinearExpr>> Sub<T> for VarId {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) - rhs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sense {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "=")]
    Eq,
}

impl Sense {
    pub fn symbol(&self) -> &'static str {
        match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<=" => Some(Sense::Le),
            ">=" => Some(Sense::Ge),
            "=" | "==" => Some(Sense::Eq),
            _ => None,
        }
    }
}

/// `Σ coef·var  sense  rhs`. Constants are folded into `rhs` on insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[f64], tol: f64) -> bool {
        let lhs: f64 = self
            .terms
            .iter()
            .map(|(v, c)| c * values.get(v.0).copied().unwrap_or(0.0))
            .sum();
        match self.sense {
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Ge => lhs >= self.rhs - tol,
            Sense::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

/// Mixed-integer linear program, always minimized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearProgram {
    pub protocol_version: i32,
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    pub objective: LinearExpr,
    /// Solver name for plugins that host several backends
    pub solver: String,
    /// Wall-clock limit; 0 means none
    pub timeout_seconds: u64,
    /// Passed through to the solver verbatim
    pub options: BTreeMap<String, String>,
    #[serde(skip)]
    by_name: HashMap<String, VarId>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            ..Default::default()
        }
    }

    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind, lower: f64, upper: f64) -> VarId {
        let name = name.into();
        let id = VarId(self.variables.len());
        let (lower, upper) = match kind {
            VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        self.by_name.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        id
    }

    pub fn continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.add_var(name, VarKind::Continuous, lower, upper)
    }

    /// Continuous variable bounded below by zero.
    pub fn nonneg(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarKind::Continuous, 0.0, f64::INFINITY)
    }

    pub fn free(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarKind::Continuous, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_var(name, VarKind::Binary, 0.0, 1.0)
    }

    /// Add `lhs sense rhs`, moving every constant to the right-hand side.
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        sense: Sense,
        rhs: impl Into<LinearExpr>,
    ) {
        let expr = (lhs.into() - rhs.into()).compact();
        self.constraints.push(Constraint {
            name: name.into(),
            terms: expr.terms,
            sense,
            rhs: -expr.constant,
        });
    }

    pub fn le(&mut self, name: impl Into<String>, lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) {
        self.add_constraint(name, lhs, Sense::Le, rhs);
    }

    pub fn ge(&mut self, name: impl Into<String>, lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) {
        self.add_constraint(name, lhs, Sense::Ge, rhs);
    }

    pub fn eq(&mut self, name: impl Into<String>, lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) {
        self.add_constraint(name, lhs, Sense::Eq, rhs);
    }

    /// Replace the objective (minimized).
    pub fn minimize(&mut self, objective: impl Into<LinearExpr>) {
        self.objective = objective.into().compact();
    }

    /// Pin a variable to a single value by collapsing its bounds.
    pub fn fix(&mut self, id: VarId, value: f64) {
        let var = &mut self.variables[id.0];
        var.lower = value;
        var.upper = value;
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Rebuild the name index after deserialization.
    pub fn reindex(&mut self) {
        self.by_name = self
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), VarId(i)))
            .collect();
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_integer(&self) -> usize {
        self.variables.iter().filter(|v| v.kind.is_integer()).count()
    }

    pub fn num_nonzeros(&self) -> usize {
        self.constraints.iter().map(|c| c.terms.len()).sum()
    }

    /// Objective coefficient per variable, dense.
    pub fn objective_coefficients(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.variables.len()];
        for (var, coef) in &self.objective.terms {
            dense[var.0] += coef;
        }
        dense
    }

    /// Check bounds and constraints for an assignment. Returns the names of
    /// violated rows.
    pub fn violations(&self, values: &[f64], tol: f64) -> Vec<String> {
        let mut out = Vec::new();
        for (i, var) in self.variables.iter().enumerate() {
            let v = values.get(i).copied().unwrap_or(0.0);
            if v < var.lower - tol || v > var.upper + tol {
                out.push(format!("bound:{}", var.name));
            }
        }
        for con in &self.constraints {
            if !con.is_satisfied(values, tol) {
                out.push(con.name.clone());
            }
        }
        out
    }
}
