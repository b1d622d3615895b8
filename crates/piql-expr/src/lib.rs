//! piql-expr - typed expression trees for PiQL queries
//!
//! Builds predicate and value trees, folds `when/then/otherwise` chains into
//! nested case operations, and dispatches tree nodes to per-variant handlers.
//!
//! ## Quick Start
//!
//! ```ignore
//! use piql_expr::{EvalContext, Expr, Literal, ValueType, evaluate};
//!
//! let spending = Expr::path("annual_spending", ValueType::Int);
//! let tier = spending
//!     .when(1000)?.then(1)?
//!     .when(2000)?.then(2)?
//!     .when(5000)?.then(3)?
//!     .otherwise(4)?;
//!
//! let ctx = EvalContext::new().with_value("annual_spending", 2000);
//! assert_eq!(evaluate(&tier, &ctx)?, Literal::Int(2));
//!
//! // Or run it against a dataframe
//! let lf = df.lazy().select([tier.to_polars()?.alias("tier")]);
//! ```
//!
//! ## Traversal
//!
//! - [`Visitor`] + [`walk`]: exhaustive, compile-time handler selection
//! - [`VisitorFamily`] + [`Dispatcher`]: handlers registered at runtime,
//!   families extending parent families, resolution cached per node shape

mod case;
mod dispatch;
mod eval;
mod lower;
mod node;
mod pretty;

use thiserror::Error;

// ============ Node Model ============

pub use node::{
    Expr, ExprError, Literal, NodeKind, Operation, Operator, Path, Shape, ValueType,
};

// ============ Case Builder ============

pub use case::{CaseForEq, CaseWhen, Cases};

// ============ Dispatch ============

pub use dispatch::{
    DispatchError, Dispatcher, FamilyBuilder, Handler, Visitor, VisitorFamily, walk,
};

// ============ Consumers ============

pub use eval::{EvalContext, EvalError, evaluate};
pub use lower::{LowerError, to_polars};
pub use pretty::RenderOptions;

// ============ Errors ============

#[derive(Error, Debug)]
pub enum PiqlExprError {
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Lower error: {0}")]
    Lower(#[from] LowerError),
}
