// tests/rewrite_tests.rs

mod common;

use std::sync::Arc;

use common::{bind_filter, critter_type, critters};
use plume_query::error::RewriteError;
use plume_query::expr::{BinaryOp, Expr, ExprKind, ExprRef, Lambda, Parameter, QueryMethod};
use plume_query::rewrite::{ExpressionRewriter, QueryRewrite, QueryRewriter};
use plume_query::{QueryExpression, RecursiveRewriteVisitor, TreePatternMatcher, TypeRef, Value};

fn int(n: i64) -> ExprRef {
    Expr::constant(Value::Integer(n), TypeRef::Int32)
}

fn add(left: ExprRef, right: ExprRef) -> ExprRef {
    Expr::binary(BinaryOp::Add, left, right, TypeRef::Int32)
}

fn number() -> ExprRef {
    Expr::member(
        Expr::parameter("_this", critter_type()),
        "Number",
        TypeRef::Int32,
    )
}

/// `x + 0` => `x`
fn add_zero_matcher() -> TreePatternMatcher {
    let x = Parameter::new("x", TypeRef::Int32);
    let search = Lambda::new(vec![x.clone()], add(x.to_expr(), int(0)));
    let replace = Lambda::new(vec![x.clone()], x.to_expr());
    TreePatternMatcher::from_lambdas(&search, Some(&replace)).unwrap()
}

fn body(filter: &str) -> ExprRef {
    bind_filter(filter).as_lambda().unwrap().body.clone()
}

// ============================================================================
// Tree pattern matcher
// ============================================================================

#[test]
fn test_parameters_become_typed_captures() {
    let matcher = add_zero_matcher();
    assert_eq!(
        matcher.search_pattern(),
        &add(Expr::capture("p0:Int32", TypeRef::Int32), int(0))
    );
    assert_eq!(
        matcher.replace_pattern(),
        Some(&Expr::capture("p0:Int32", TypeRef::Int32))
    );
}

#[test]
fn test_match_binds_captures() {
    let matcher = add_zero_matcher();
    let candidate = add(number(), int(0));
    let captures = matcher.matches(&candidate).unwrap().unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures.get("p0:Int32"), Some(&number()));
    assert_eq!(matcher.match_and_rewrite(&candidate).unwrap(), Some(number()));
}

#[test]
fn test_no_match() {
    let matcher = add_zero_matcher();
    assert!(matcher.matches(&add(number(), int(1))).unwrap().is_none());
    assert!(matcher.match_and_rewrite(&number()).unwrap().is_none());
}

#[test]
fn test_capture_type_must_agree() {
    let matcher = add_zero_matcher();
    let long_add = Expr::binary(
        BinaryOp::Add,
        Expr::constant(Value::Integer(5), TypeRef::Int64),
        int(0),
        TypeRef::Int32,
    );
    assert!(matcher.matches(&long_add).unwrap().is_none());
}

#[test]
fn test_object_capture_matches_any_type() {
    let matcher = TreePatternMatcher::new(
        Expr::binary(
            BinaryOp::Equal,
            Expr::capture("any", TypeRef::Object),
            Expr::null(TypeRef::Object),
            TypeRef::Boolean,
        ),
        None,
    );
    let candidate = Expr::binary(
        BinaryOp::Equal,
        Expr::member(Expr::parameter("_this", critter_type()), "Name", TypeRef::String),
        Expr::null(TypeRef::Object),
        TypeRef::Boolean,
    );
    assert!(matcher.matches(&candidate).unwrap().is_some());
    // Without a replace pattern nothing is rewritten.
    assert!(matcher.match_and_rewrite(&candidate).unwrap().is_none());
}

#[test]
fn test_rewrite_all_replaces_every_occurrence() {
    let matcher = add_zero_matcher();
    let tree = Expr::binary(
        BinaryOp::Multiply,
        add(number(), int(0)),
        add(int(7), int(0)),
        TypeRef::Int32,
    );
    let rewritten = matcher.rewrite_all(&tree).unwrap();
    assert_eq!(rewritten.to_string(), "(_this.Number * 7)");
}

#[test]
fn test_alpha_equivalent_lambdas_match() {
    let pattern = bind_filter("any(weapons, w:w.strength gt 3)");
    let matcher = TreePatternMatcher::from_lambdas(pattern.as_lambda().unwrap(), None).unwrap();
    let captures = matcher
        .matches(&body("any(weapons, v:v.strength gt 3)"))
        .unwrap()
        .expect("lambdas differing only in parameter names should match");
    assert_eq!(
        captures.get("p0:Critter"),
        Some(&Expr::parameter("_this", critter_type()))
    );
    assert!(matcher
        .matches(&body("any(weapons, v:v.strength gt 4)"))
        .unwrap()
        .is_none());
}

#[test]
fn test_capture_count_mismatch() {
    let x = Parameter::new("x", TypeRef::Int32);
    let y = Parameter::new("y", TypeRef::Int32);
    let search = Lambda::new(vec![x.clone()], x.to_expr());
    let replace = Lambda::new(vec![x.clone(), y.clone()], add(x.to_expr(), y.to_expr()));
    assert!(matches!(
        TreePatternMatcher::from_lambdas(&search, Some(&replace)),
        Err(RewriteError::CaptureMismatch(_))
    ));
}

#[test]
fn test_capture_type_mismatch() {
    let search = Lambda::new(
        vec![Parameter::new("x", TypeRef::Int32)],
        int(1),
    );
    let replace = Lambda::new(
        vec![Parameter::new("x", TypeRef::String)],
        int(1),
    );
    let err = TreePatternMatcher::from_lambdas(&search, Some(&replace)).unwrap_err();
    assert!(err.to_string().contains("Int32"), "{}", err);
}

#[test]
fn test_type_is_matches_on_test_type() {
    let matcher = TreePatternMatcher::new(body("isof(t'MusicalCritter')"), None);
    assert!(matcher.matches(&body("isof(t'MusicalCritter')")).unwrap().is_some());
    assert!(matcher.matches(&body("number eq 1")).unwrap().is_none());

    let number_matcher = TreePatternMatcher::new(body("number eq 1"), None);
    assert!(number_matcher
        .matches(&body("isof(t'MusicalCritter')"))
        .unwrap()
        .is_none());
}

/// `b && true` => `b`
fn and_true_matcher() -> TreePatternMatcher {
    let b = Parameter::new("b", TypeRef::Boolean);
    let search = Lambda::new(
        vec![b.clone()],
        Expr::binary(
            BinaryOp::AndAlso,
            b.to_expr(),
            Expr::constant(Value::Boolean(true), TypeRef::Boolean),
            TypeRef::Boolean,
        ),
    );
    let replace = Lambda::new(vec![b.clone()], b.to_expr());
    TreePatternMatcher::from_lambdas(&search, Some(&replace)).unwrap()
}

#[test]
fn test_capture_binds_type_is_operand() {
    let matcher = and_true_matcher();
    let candidate = body("isof(t'MusicalCritter') and true");
    let captures = matcher.matches(&candidate).unwrap().unwrap();
    assert_eq!(
        captures.get("p0:Boolean"),
        Some(&body("isof(t'MusicalCritter')"))
    );

    let visitor = RecursiveRewriteVisitor::new().with_rewriter(and_true_matcher());
    let rewritten = visitor
        .rewrite(&bind_filter("isof(t'MusicalCritter') and true"))
        .unwrap();
    assert_eq!(rewritten.to_string(), "_this => (_this Is MusicalCritter)");
}

#[test]
fn test_capture_candidate_is_unimplemented() {
    let matcher = add_zero_matcher();
    let candidate = add(Expr::capture("c", TypeRef::Int32), int(0));
    assert_eq!(
        matcher.matches(&candidate),
        Err(RewriteError::Unimplemented("Capture"))
    );
}

// ============================================================================
// Recursive rewrite visitor
// ============================================================================

/// Folds `constant + constant` over integers.
struct FoldAdd;

impl ExpressionRewriter for FoldAdd {
    fn visits(&self) -> &[ExprKind] {
        &[ExprKind::Binary]
    }

    fn rewrite(&self, node: &ExprRef) -> Result<Option<ExprRef>, RewriteError> {
        let Expr::Binary {
            op: BinaryOp::Add,
            left,
            right,
            ..
        } = node.as_ref()
        else {
            return Ok(None);
        };
        match (left.as_constant(), right.as_constant()) {
            (Some(Value::Integer(a)), Some(Value::Integer(b))) => Ok(Some(int(a + b))),
            _ => Ok(None),
        }
    }
}

/// Swaps the operands of `==` forever.
struct Flip;

impl ExpressionRewriter for Flip {
    fn visits(&self) -> &[ExprKind] {
        &[ExprKind::Binary]
    }

    fn rewrite(&self, node: &ExprRef) -> Result<Option<ExprRef>, RewriteError> {
        match node.as_ref() {
            Expr::Binary {
                op: BinaryOp::Equal,
                left,
                right,
                ty,
            } => Ok(Some(Expr::binary(
                BinaryOp::Equal,
                right.clone(),
                left.clone(),
                ty.clone(),
            ))),
            _ => Ok(None),
        }
    }
}

#[test]
fn test_nested_pattern_reaches_fixed_point() {
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(add_zero_matcher());
    let tree = add(add(add(number(), int(0)), int(0)), int(0));
    assert_eq!(visitor.rewrite(&tree).unwrap(), number());
}

#[test]
fn test_parent_retried_after_children_change() {
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(FoldAdd);
    let tree = add(int(1), add(int(2), add(int(3), int(4))));
    assert_eq!(visitor.rewrite(&tree).unwrap(), int(10));
}

#[test]
fn test_rewriters_combine() {
    let visitor = RecursiveRewriteVisitor::new()
        .with_rewriter(FoldAdd)
        .with_rewriter(add_zero_matcher());
    let tree = Expr::binary(
        BinaryOp::Equal,
        add(number(), add(int(0), int(0))),
        int(8),
        TypeRef::Boolean,
    );
    assert_eq!(visitor.rewrite(&tree).unwrap().to_string(), "(_this.Number == 8)");
}

#[test]
fn test_rewrite_is_idempotent() {
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(add_zero_matcher());
    let once = visitor.rewrite(&add(add(number(), int(0)), int(5))).unwrap();
    let twice = visitor.rewrite(&once).unwrap();
    assert!(Arc::ptr_eq(&once, &twice));
}

#[test]
fn test_untouched_tree_keeps_identity() {
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(FoldAdd);
    let tree = bind_filter("name eq 'Bob' and number gt 3");
    assert!(Arc::ptr_eq(&visitor.rewrite(&tree).unwrap(), &tree));
}

#[test]
fn test_ping_pong_has_no_fixed_point() {
    let visitor = RecursiveRewriteVisitor::new()
        .with_rewriter(Flip)
        .with_max_iterations(4);
    let tree = Expr::binary(BinaryOp::Equal, number(), int(8), TypeRef::Boolean);
    assert_eq!(visitor.rewrite(&tree), Err(RewriteError::NoFixedPoint(4)));
}

// ============================================================================
// Query rewriters
// ============================================================================

/// Drops `Skip(source, 0)`.
struct DropEmptySkip;

impl QueryRewriter for DropEmptySkip {
    fn operators(&self) -> &[QueryMethod] {
        &[QueryMethod::Skip]
    }

    fn rewrite_query(&self, query: &QueryExpression) -> Result<Option<ExprRef>, RewriteError> {
        if query.count() == Some(0) {
            Ok(query.source_node().cloned())
        } else {
            Ok(None)
        }
    }
}

fn critter_source() -> QueryExpression {
    QueryExpression::from_source(Expr::constant(
        Value::Array(critters()),
        TypeRef::queryable(critter_type()),
    ))
}

#[test]
fn test_query_rewriter_sees_its_operators() {
    let source = critter_source();
    let query = source.skip(0).unwrap().take(2).unwrap();
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(QueryRewrite(DropEmptySkip));

    let rewritten = QueryExpression::wrap(&visitor.rewrite(query.node()).unwrap());
    assert_eq!(rewritten.method(), Some(QueryMethod::Take));
    assert_eq!(rewritten.source(), Some(source));
}

#[test]
fn test_query_rewriter_leaves_other_calls() {
    let query = critter_source().skip(1).unwrap().take(2).unwrap();
    let visitor = RecursiveRewriteVisitor::new().with_rewriter(QueryRewrite(DropEmptySkip));
    assert!(Arc::ptr_eq(&visitor.rewrite(query.node()).unwrap(), query.node()));
}
