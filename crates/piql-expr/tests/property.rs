use piql_expr::{
    Dispatcher, EvalContext, Expr, ExprError, Literal, NodeKind, Operator, ValueType,
    VisitorFamily, evaluate,
};
use proptest::prelude::*;

const ALL_OPERATORS: [Operator; 20] = [
    Operator::Eq,
    Operator::Ne,
    Operator::Lt,
    Operator::Le,
    Operator::Gt,
    Operator::Ge,
    Operator::And,
    Operator::Or,
    Operator::Not,
    Operator::IsNull,
    Operator::IsNotNull,
    Operator::Add,
    Operator::Sub,
    Operator::Mul,
    Operator::Div,
    Operator::Neg,
    Operator::CaseEq,
    Operator::CaseEqWhen,
    Operator::CaseEqElse,
    Operator::CountAll,
];

fn arb_branches() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..20, -100i64..100), 1..8)
}

fn build_case(branches: &[(i64, i64)], default: i64) -> Result<Expr, ExprError> {
    let base = Expr::path("x", ValueType::Int);
    let (first, rest) = branches
        .split_first()
        .expect("strategy generates at least one branch");
    let mut cases = base.when(first.0)?.then(first.1)?;
    for (condition, result) in rest {
        cases = cases.when(*condition)?.then(*result)?;
    }
    cases.otherwise(default)
}

/// Reference semantics: first matching branch in declaration order
fn expected(branches: &[(i64, i64)], default: i64, x: i64) -> i64 {
    branches
        .iter()
        .find(|(condition, _)| *condition == x)
        .map(|(_, result)| *result)
        .unwrap_or(default)
}

fn arb_leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0i64..100).prop_map(|n| Expr::constant(n)),
        Just(Expr::path("x", ValueType::Int)),
        Just(Expr::path("y", ValueType::Int)),
    ]
}

fn arb_tree() -> impl Strategy<Value = Expr> {
    arb_leaf().prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.add(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.gt(b).and(Expr::constant(true))),
            inner.clone().prop_map(|a| a.is_null().not()),
            (inner.clone(), 0i64..5, inner).prop_map(|(a, c, b)| {
                a.when(c)
                    .and_then(|w| w.then(b.clone()))
                    .and_then(|cases| cases.otherwise(b.clone()))
                    .unwrap_or(b)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn first_matching_branch_wins(
        branches in arb_branches(),
        default in -100i64..100,
        x in 0i64..25,
    ) {
        let expr = build_case(&branches, default).unwrap();
        let ctx = EvalContext::new().with_value("x", x);
        prop_assert_eq!(
            evaluate(&expr, &ctx).unwrap(),
            Literal::Int(expected(&branches, default, x))
        );
    }

    #[test]
    fn arity_mismatch_always_fails(op_index in 0usize..20, count in 0usize..6) {
        let operator = ALL_OPERATORS[op_index];
        let args = vec![Expr::constant(1); count];
        let result = Expr::operation(operator, ValueType::Int, args);
        if count == operator.arity() {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(
                result.unwrap_err(),
                ExprError::Arity { operator, expected: operator.arity(), got: count }
            );
        }
    }

    #[test]
    fn result_type_mismatch_fails_at_then(first in -10i64..10, label in "[a-z]{1,8}") {
        let result = Expr::path("x", ValueType::Int)
            .when(1)
            .and_then(|w| w.then(first))
            .and_then(|c| c.when(2))
            .and_then(|w| w.then(label));
        prop_assert!(
            matches!(result, Err(ExprError::ResultType { .. })),
            "expected ResultType error"
        );
    }

    #[test]
    fn total_family_never_reports_unhandled(tree in arb_tree()) {
        let mut builder = VisitorFamily::<usize>::root("count");
        for kind in NodeKind::ALL {
            builder = builder.on(kind, |d, count: &mut usize, expr| {
                *count += 1;
                d.descend(count, expr)
            });
        }
        let dispatcher = Dispatcher::new(builder.build());

        let mut first = 0;
        dispatcher.dispatch(&mut first, &tree).unwrap();
        let resolved = dispatcher.resolutions();
        let mut second = 0;
        dispatcher.dispatch(&mut second, &tree).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(dispatcher.resolutions(), resolved);
    }
}
