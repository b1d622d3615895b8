//! Rendering of expression trees
//!
//! Produces a single-line, SQL-flavoured form:
//! `case annual_spending when 1000 then 1 when 2000 then 2 else 4 end`.

use std::fmt::{self, Display};

use crate::dispatch::{DispatchError, Visitor, walk};
use crate::node::{Expr, Literal, Operation, Operator, Path};

/// Options for [`Expr::render`]
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// `CASE .. WHEN .. END` instead of `case .. when .. end`
    pub uppercase_keywords: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uppercase_keywords(mut self, uppercase: bool) -> Self {
        self.uppercase_keywords = uppercase;
        self
    }
}

// ============ Display ============

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{}", n)
                }
            }
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.render(&RenderOptions::default()).map_err(|_| fmt::Error)?;
        write!(f, "{}", rendered)
    }
}

impl Expr {
    pub fn render(&self, options: &RenderOptions) -> Result<String, DispatchError> {
        walk(&mut Renderer { options }, self)
    }
}

// ============ Renderer ============

struct Renderer<'a> {
    options: &'a RenderOptions,
}

impl Renderer<'_> {
    fn keyword(&self, keyword: &str) -> String {
        if self.options.uppercase_keywords {
            keyword.to_uppercase()
        } else {
            keyword.to_string()
        }
    }

    /// Render an operand, parenthesizing infix operations
    fn operand(&mut self, expr: &Expr) -> Result<String, DispatchError> {
        let rendered = walk(self, expr)?;
        let needs_parens = matches!(expr, Expr::Operation(op) if infix(op.operator()).is_some());
        if needs_parens {
            Ok(format!("({})", rendered))
        } else {
            Ok(rendered)
        }
    }

    fn case_when(&mut self, op: &Operation) -> Result<String, DispatchError> {
        let [base, condition, result, rest] = op.args() else {
            return Err(DispatchError::Handler(format!(
                "{} with {} operands",
                op.operator(),
                op.args().len()
            )));
        };

        let mut out = format!("{} {}", self.keyword("case"), self.operand(base)?);
        let (mut condition, mut result, mut rest) = (condition, result, rest);
        loop {
            out.push_str(&format!(
                " {} {} {} {}",
                self.keyword("when"),
                self.operand(condition)?,
                self.keyword("then"),
                self.operand(result)?
            ));

            match rest {
                Expr::Operation(next) if next.operator() == Operator::CaseEqWhen => {
                    match next.args() {
                        [next_base, c, r, tail] if next_base == base => {
                            (condition, result, rest) = (c, r, tail);
                            continue;
                        }
                        _ => {
                            let default = walk(self, rest)?;
                            out.push_str(&format!(" {} {}", self.keyword("else"), default));
                        }
                    }
                }
                Expr::Operation(last) if last.operator() == Operator::CaseEqElse => {
                    if let Some(default) = last.arg(0) {
                        let default = self.operand(default)?;
                        out.push_str(&format!(" {} {}", self.keyword("else"), default));
                    }
                }
                other => {
                    out.push_str(&format!(" {} {}", self.keyword("else"), self.operand(other)?));
                }
            }
            break;
        }

        out.push_str(&format!(" {}", self.keyword("end")));
        Ok(out)
    }
}

fn infix(op: Operator) -> Option<&'static str> {
    let symbol = match op {
        Operator::Eq => "=",
        Operator::Ne => "<>",
        Operator::Lt => "<",
        Operator::Le => "<=",
        Operator::Gt => ">",
        Operator::Ge => ">=",
        Operator::And => "and",
        Operator::Or => "or",
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mul => "*",
        Operator::Div => "/",
        _ => return None,
    };
    Some(symbol)
}

impl Visitor for Renderer<'_> {
    type Output = String;
    type Error = DispatchError;

    fn family(&self) -> &str {
        "render"
    }

    fn visit_constant(&mut self, value: &Literal) -> Result<String, DispatchError> {
        Ok(value.to_string())
    }

    fn visit_path(&mut self, path: &Path) -> Result<String, DispatchError> {
        Ok(path.dotted())
    }

    fn visit_operation(&mut self, op: &Operation) -> Result<String, DispatchError> {
        let args = op.args();
        if let (Some(symbol), [lhs, rhs]) = (infix(op.operator()), args) {
            let symbol = self.keyword(symbol);
            return Ok(format!("{} {} {}", self.operand(lhs)?, symbol, self.operand(rhs)?));
        }

        match (op.operator(), args) {
            (Operator::Not, [inner]) => {
                Ok(format!("{} {}", self.keyword("not"), self.operand(inner)?))
            }
            (Operator::IsNull, [inner]) => {
                Ok(format!("{} {}", self.operand(inner)?, self.keyword("is null")))
            }
            (Operator::IsNotNull, [inner]) => {
                Ok(format!("{} {}", self.operand(inner)?, self.keyword("is not null")))
            }
            (Operator::Neg, [inner]) => {
                // `--` opens a SQL line comment
                let operand = self.operand(inner)?;
                if operand.starts_with('-') {
                    Ok(format!("-({operand})"))
                } else {
                    Ok(format!("-{operand}"))
                }
            }
            (Operator::CountAll, []) => Ok(format!("{}(*)", self.keyword("count"))),
            (Operator::CaseEqWhen, _) => self.case_when(op),
            // The chain under CASE_EQ already carries the base
            (Operator::CaseEq, [_, chain]) => walk(self, chain),
            (Operator::CaseEqElse, [default]) => Ok(format!(
                "{} {} {} {}",
                self.keyword("case"),
                self.keyword("else"),
                self.operand(default)?,
                self.keyword("end")
            )),
            (operator, args) => Err(DispatchError::Handler(format!(
                "{} with {} operands",
                operator,
                args.len()
            ))),
        }
    }
}
