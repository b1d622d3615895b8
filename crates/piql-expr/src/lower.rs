//! Lowering of expression trees into Polars expressions
//!
//! Paths become columns named by their dotted form, case chains become nested
//! `when/then/otherwise`, so a lowered tree can be used directly in
//! `LazyFrame::select`, `filter` or `with_columns`.

use polars::prelude::{self as pl, NULL, col, lit, when};
use thiserror::Error;

use crate::dispatch::{DispatchError, Visitor, walk};
use crate::node::{Expr, Literal, Operation, Operator, Path};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LowerError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

type Result<T> = std::result::Result<T, LowerError>;

/// Convert `expr` into an equivalent Polars expression
pub fn to_polars(expr: &Expr) -> Result<pl::Expr> {
    walk(&mut Lowering, expr)
}

impl Expr {
    pub fn to_polars(&self) -> Result<pl::Expr> {
        to_polars(self)
    }
}

struct Lowering;

impl Visitor for Lowering {
    type Output = pl::Expr;
    type Error = LowerError;

    fn family(&self) -> &str {
        "polars"
    }

    fn visit_constant(&mut self, value: &Literal) -> Result<pl::Expr> {
        Ok(match value {
            Literal::String(v) => lit(v.clone()),
            Literal::Int(v) => lit(*v),
            Literal::Float(v) => lit(*v),
            Literal::Bool(v) => lit(*v),
            Literal::Null => lit(NULL),
        })
    }

    fn visit_path(&mut self, path: &Path) -> Result<pl::Expr> {
        Ok(col(path.dotted()))
    }

    fn visit_operation(&mut self, op: &Operation) -> Result<pl::Expr> {
        let lowered = match (op.operator(), op.args()) {
            (Operator::CountAll, []) => pl::len(),
            (operator, [inner]) => {
                let e = walk(self, inner)?;
                match operator {
                    Operator::Not => e.not(),
                    Operator::IsNull => e.is_null(),
                    Operator::IsNotNull => e.is_not_null(),
                    Operator::Neg => lit(0) - e,
                    Operator::CaseEqElse => e,
                    other => return Err(malformed(other, 1)),
                }
            }
            // The chain under CASE_EQ already carries the base
            (Operator::CaseEq, [_, chain]) => walk(self, chain)?,
            (operator, [lhs, rhs]) => {
                let l = walk(self, lhs)?;
                let r = walk(self, rhs)?;
                match operator {
                    Operator::Eq => l.eq(r),
                    Operator::Ne => l.neq(r),
                    Operator::Lt => l.lt(r),
                    Operator::Le => l.lt_eq(r),
                    Operator::Gt => l.gt(r),
                    Operator::Ge => l.gt_eq(r),
                    Operator::And => l.and(r),
                    Operator::Or => l.or(r),
                    Operator::Add => l + r,
                    Operator::Sub => l - r,
                    Operator::Mul => l * r,
                    Operator::Div => l / r,
                    other => return Err(malformed(other, 2)),
                }
            }
            (Operator::CaseEqWhen, [base, condition, result, rest]) => {
                let matches = walk(self, base)?.eq(walk(self, condition)?);
                when(matches)
                    .then(walk(self, result)?)
                    .otherwise(walk(self, rest)?)
            }
            (operator, args) => return Err(malformed(operator, args.len())),
        };
        Ok(lowered)
    }
}

fn malformed(operator: Operator, operands: usize) -> LowerError {
    DispatchError::Handler(format!("{} with {} operands", operator, operands)).into()
}
