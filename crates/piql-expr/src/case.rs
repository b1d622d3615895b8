//! Builder for `case base when .. then .. else .. end` expressions
//!
//! ```ignore
//! let spending = Expr::path("annual_spending", ValueType::Int);
//! let tier = spending
//!     .when(1000)?.then(1)?
//!     .when(2000)?.then(2)?
//!     .when(5000)?.then(3)?
//!     .otherwise(4)?;
//! ```
//!
//! The chain is a typestate: [`CaseForEq`] (no branches yet) -> [`CaseWhen`]
//! (condition pending) -> [`Cases`] (at least one branch) -> `Expr`.
//! Calling `then` without a pending `when`, or `otherwise` before any branch,
//! does not compile.

use std::collections::VecDeque;

use crate::node::{Expr, ExprError, Operator, ValueType};

/// One completed `when .. then ..` branch
#[derive(Debug, Clone)]
struct CaseElement {
    condition: Expr,
    result: Expr,
}

#[derive(Debug, Clone)]
struct CaseState {
    base: Expr,
    /// Most recently completed branch first
    elements: VecDeque<CaseElement>,
    /// Captured from the first result, shared by every branch
    value_type: Option<ValueType>,
}

impl CaseState {
    fn when(self, condition: Expr) -> Result<CaseWhen, ExprError> {
        let base = self.base.value_type();
        let got = condition.value_type();
        if base != got {
            return Err(ExprError::ConditionType { base, got });
        }
        Ok(CaseWhen {
            state: self,
            condition,
        })
    }

    fn check_result(&mut self, result: &Expr) -> Result<ValueType, ExprError> {
        let got = result.value_type();
        match self.value_type {
            Some(expected) if expected != got => Err(ExprError::ResultType { expected, got }),
            Some(expected) => Ok(expected),
            None => {
                self.value_type = Some(got);
                Ok(got)
            }
        }
    }
}

/// Start of a case chain over `base`; no branches recorded yet
#[derive(Debug, Clone)]
pub struct CaseForEq {
    state: CaseState,
}

impl CaseForEq {
    pub fn new(base: Expr) -> Self {
        Self {
            state: CaseState {
                base,
                elements: VecDeque::new(),
                value_type: None,
            },
        }
    }

    pub fn when(self, condition: impl Into<Expr>) -> Result<CaseWhen, ExprError> {
        self.state.when(condition.into())
    }
}

/// A `when` whose `then` has not been supplied yet
#[derive(Debug, Clone)]
pub struct CaseWhen {
    state: CaseState,
    condition: Expr,
}

impl CaseWhen {
    pub fn then(self, result: impl Into<Expr>) -> Result<Cases, ExprError> {
        let result = result.into();
        let mut state = self.state;
        state.check_result(&result)?;
        state.elements.push_front(CaseElement {
            condition: self.condition,
            result,
        });
        Ok(Cases { state })
    }
}

/// A chain with at least one complete branch
#[derive(Debug, Clone)]
pub struct Cases {
    state: CaseState,
}

impl Cases {
    pub fn when(self, condition: impl Into<Expr>) -> Result<CaseWhen, ExprError> {
        self.state.when(condition.into())
    }

    /// Number of `when .. then ..` branches recorded so far
    pub fn len(&self) -> usize {
        self.state.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.elements.is_empty()
    }

    /// Close the chain with a default and fold it into nested
    /// `CASE_EQ_WHEN(base, condition, result, rest)` nodes ending in
    /// `CASE_EQ_ELSE(default)`.
    ///
    /// Branches are stored newest first, so folding in storage order wraps the
    /// earliest `when` last: it ends up outermost and is tested first.
    pub fn otherwise(self, default: impl Into<Expr>) -> Result<Expr, ExprError> {
        let default = default.into();
        let mut state = self.state;
        let value_type = state.check_result(&default)?;

        log::trace!(
            "folding case chain with {} branch(es) into {}",
            state.elements.len(),
            value_type
        );

        let base = state.base;
        let last = Expr::operation(Operator::CaseEqElse, value_type, vec![default])?;
        state.elements.into_iter().try_fold(last, |last, element| {
            Expr::operation(
                Operator::CaseEqWhen,
                value_type,
                vec![base.clone(), element.condition, element.result, last],
            )
        })
    }
}

impl Expr {
    /// Start a case chain comparing `self` against `target`
    pub fn when(self, target: impl Into<Expr>) -> Result<CaseWhen, ExprError> {
        CaseForEq::new(self).when(target)
    }
}
