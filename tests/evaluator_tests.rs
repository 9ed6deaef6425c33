// tests/evaluator_tests.rs

mod common;

use std::sync::Arc;

use common::{FakeClient, bind_filter, critter, critter_type, critters, schema};
use plume_query::expr::{BinaryOp, Expr, Lambda, Parameter};
use plume_query::proxy::LazyReference;
use plume_query::{EvalContext, EvalError, Evaluator, QueryExpression, TypeRef, Value};
use rust_decimal::Decimal;

fn names(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| match v {
            Value::Resource(r) => r.get("Name").map(Value::as_string).unwrap_or_default(),
            other => other.as_string(),
        })
        .collect()
}

/// Names of the fixture critters matching `filter`.
fn matching(filter: &str) -> Vec<String> {
    let schema = schema();
    let predicate = bind_filter(filter);
    let evaluator = Evaluator::with_mapper(&schema);
    let matches = evaluator
        .filter(&predicate, &critters())
        .unwrap_or_else(|e| panic!("'{}' failed: {}", filter, e));
    names(&matches)
}

fn source() -> QueryExpression {
    QueryExpression::from_source(Expr::constant(
        Value::Array(critters()),
        TypeRef::queryable(critter_type()),
    ))
}

fn x() -> Parameter {
    Parameter::new("x", critter_type())
}

fn key(name: &str, ty: TypeRef) -> Lambda {
    Lambda::new(vec![x()], Expr::member(x().to_expr(), name, ty))
}

fn number_gt(n: i64) -> Lambda {
    Lambda::new(
        vec![x()],
        Expr::binary(
            BinaryOp::GreaterThan,
            Expr::member(x().to_expr(), "Number", TypeRef::Int32),
            Expr::constant(Value::Integer(n), TypeRef::Int32),
            TypeRef::Boolean,
        ),
    )
}

fn run(query: &QueryExpression) -> Result<Value, EvalError> {
    Evaluator::new().execute(query, &EvalContext::new())
}

fn run_items(query: &QueryExpression) -> Vec<String> {
    match run(query) {
        Ok(Value::Array(items)) => names(&items),
        other => panic!("Expected array, got {:?}", other),
    }
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_simple_comparisons() {
    assert_eq!(matching("number ne 8"), vec!["Alice", "Zed"]);
    assert_eq!(matching("number gt 2.5 and number lt 10"), vec!["Bob", "Alice"]);
    assert_eq!(matching("name eq 'Zed' or id eq 1"), vec!["Bob", "Zed"]);
    assert_eq!(matching("not (number ge 8)"), vec!["Alice"]);
}

#[test]
fn test_nested_member() {
    assert_eq!(matching("hat.hattype eq 'whatever'"), vec!["Alice"]);
}

#[test]
fn test_enum_comparison() {
    assert_eq!(matching("state eq 'sleeping'"), vec!["Alice"]);
}

#[test]
fn test_decimal_comparison() {
    assert_eq!(matching("price gt 19"), vec!["Bob", "Alice", "Zed"]);
    assert!(matching("price gt 20").is_empty());
}

#[test]
fn test_any_over_value_objects() {
    assert_eq!(matching("any(weapons, w:w.strength gt 3)"), vec!["Bob", "Alice"]);
    assert_eq!(matching("weapons.count() eq 0"), vec!["Zed"]);
}

#[test]
fn test_in_list() {
    assert_eq!(matching("name in ['Zed', 'Bob']"), vec!["Bob", "Zed"]);
}

#[test]
fn test_null_semantics() {
    assert_eq!(matching("score gt 2"), vec!["Alice"]);
    assert_eq!(matching("score eq null"), vec!["Bob", "Zed"]);
    assert_eq!(matching("friend eq null"), vec!["Bob", "Alice", "Zed"]);
    // Member access through null yields null, which compares unequal.
    assert!(matching("friend.name eq 'x'").is_empty());
}

#[test]
fn test_string_functions() {
    assert_eq!(matching("startswith(name, 'B')"), vec!["Bob"]);
    assert_eq!(matching("endswith(name, 'd')"), vec!["Zed"]);
    assert_eq!(matching("substringof('e', name)"), vec!["Alice", "Zed"]);
    assert_eq!(matching("tolower(name) eq 'bob'"), vec!["Bob"]);
    assert_eq!(matching("length(name) eq 3"), vec!["Bob", "Zed"]);
    assert_eq!(matching("indexof(name, 'l') eq 1"), vec!["Alice"]);
    assert_eq!(matching("substring(name, 1, 2) eq 'li'"), vec!["Alice"]);
    assert_eq!(matching("name add '!' eq 'Zed!'"), vec!["Zed"]);
}

#[test]
fn test_date_parts() {
    assert_eq!(matching("year(birthdate) eq 2014 and hour(birthdate) eq 12").len(), 3);
    assert!(matching("month(birthdate) eq 3").is_empty());
}

#[test]
fn test_arithmetic() {
    assert_eq!(matching("number mod 4 eq 0"), vec!["Bob", "Zed"]);
    assert_eq!(matching("number div 2 eq 1"), vec!["Alice"]);
    assert_eq!(matching("number mul 2 sub 1 eq 15"), vec!["Bob"]);
}

#[test]
fn test_type_test_sees_subclasses() {
    let schema = schema();
    let mut musician = critter(4, "Mo", 1).with("Instrument", "drum");
    musician.type_name = Some("MusicalCritter".to_string());

    let mut items = critters();
    items.push(Value::Resource(musician));

    let evaluator = Evaluator::with_mapper(&schema);
    let matches = evaluator.filter(&bind_filter("isof(t'MusicalCritter')"), &items).unwrap();
    assert_eq!(names(&matches), vec!["Mo"]);
    let matches = evaluator.filter(&bind_filter("isof(t'Critter')"), &items).unwrap();
    assert_eq!(matches.len(), 4);
}

#[test]
fn test_lazy_reference_member() {
    let client = Arc::new(FakeClient::default().with(
        "http://test/hats/9",
        Value::Resource(common::hat(9, "beret")),
    ));
    let item = Value::Resource(
        critter(9, "Lazy", 1).with(
            "Hat",
            Value::Reference(LazyReference::new(
                "http://test/hats/9",
                Some("Hat".to_string()),
                client.clone(),
            )),
        ),
    );
    let evaluator = Evaluator::new();
    assert!(evaluator.test(&bind_filter("hat.hattype eq 'beret'"), &item).unwrap());
    assert!(evaluator.test(&bind_filter("hat.size eq 8"), &item).unwrap());
    assert_eq!(client.fetch_count(), 1);
}

#[test]
fn test_failed_fetch_is_an_error() {
    let client = Arc::new(FakeClient::default());
    let item = Value::Resource(critter(9, "Lazy", 1).with(
        "Hat",
        Value::Reference(LazyReference::new("http://test/hats/404", None, client)),
    ));
    let err = Evaluator::new()
        .test(&bind_filter("hat.hattype eq 'beret'"), &item)
        .unwrap_err();
    assert!(matches!(err, EvalError::Proxy(_)));
}

#[test]
fn test_predicate_must_be_lambda() {
    let not_a_lambda = Expr::constant(Value::Boolean(true), TypeRef::Boolean);
    assert!(matches!(
        Evaluator::new().test(&not_a_lambda, &Value::Null),
        Err(EvalError::Unsupported(_))
    ));
}

#[test]
fn test_unbound_parameter() {
    let expr = Expr::parameter("nobody", TypeRef::Int32);
    assert_eq!(
        Evaluator::new().eval(&expr, &EvalContext::new()),
        Err(EvalError::UnboundParameter("nobody".to_string()))
    );
    let bound = EvalContext::new().with_binding("nobody", Value::Integer(4));
    assert_eq!(Evaluator::new().eval(&expr, &bound), Ok(Value::Integer(4)));
}

// ============================================================================
// Query chains
// ============================================================================

#[test]
fn test_where_order_take() {
    let query = source()
        .filter(number_gt(2))
        .unwrap()
        .order_by_descending(key("Number", TypeRef::Int32))
        .unwrap()
        .take(2)
        .unwrap();
    assert_eq!(run_items(&query), vec!["Zed", "Bob"]);
}

#[test]
fn test_then_by_is_stable_composite_sort() {
    let query = source()
        .order_by(key("Price", TypeRef::Decimal))
        .unwrap()
        .then_by_descending(key("Name", TypeRef::String))
        .unwrap();
    assert_eq!(run_items(&query), vec!["Zed", "Bob", "Alice"]);
}

#[test]
fn test_skip_and_select() {
    let query = source()
        .order_by(key("Name", TypeRef::String))
        .unwrap()
        .skip(1)
        .unwrap()
        .select(key("Name", TypeRef::String))
        .unwrap();
    assert_eq!(
        run(&query),
        Ok(Value::Array(vec![Value::from("Bob"), Value::from("Zed")]))
    );
}

#[test]
fn test_select_many_flattens() {
    let query = source()
        .select_many(key("Weapons", TypeRef::array(TypeRef::structured("Weapon"))))
        .unwrap()
        .count_where(None)
        .unwrap();
    assert_eq!(run(&query), Ok(Value::Integer(4)));
}

#[test]
fn test_group_by_keeps_first_seen_order() {
    let query = source()
        .group_by(key("State", TypeRef::Enum("CritterState".into())))
        .unwrap();
    let Ok(Value::Array(groups)) = run(&query) else {
        panic!("Expected groups");
    };
    let summary: Vec<(String, usize)> = groups
        .iter()
        .map(|g| match g {
            Value::Grouping { key, items } => (key.as_string(), items.len()),
            other => panic!("Expected grouping, got {:?}", other),
        })
        .collect();
    assert_eq!(
        summary,
        vec![("Alive".to_string(), 2), ("Sleeping".to_string(), 1)]
    );
}

#[test]
fn test_first_and_single() {
    let first = source().first(Some(number_gt(5))).unwrap();
    assert_eq!(names(&[run(&first).unwrap()]), vec!["Bob"]);

    let none = source().first(Some(number_gt(100))).unwrap();
    assert_eq!(run(&none), Err(EvalError::EmptySequence));

    let or_default = source().first_or_default(Some(number_gt(100))).unwrap();
    assert_eq!(run(&or_default), Ok(Value::Null));

    let single = source().single(Some(number_gt(10))).unwrap();
    assert_eq!(names(&[run(&single).unwrap()]), vec!["Zed"]);

    let many = source().single(Some(number_gt(1))).unwrap();
    assert_eq!(run(&many), Err(EvalError::MoreThanOneElement));

    let many_or_default = source().single_or_default(Some(number_gt(1))).unwrap();
    assert_eq!(run(&many_or_default), Err(EvalError::MoreThanOneElement));
}

#[test]
fn test_any_all_count_contains() {
    assert_eq!(run(&source().any(Some(number_gt(10))).unwrap()), Ok(Value::Boolean(true)));
    assert_eq!(run(&source().all(number_gt(3)).unwrap()), Ok(Value::Boolean(false)));
    assert_eq!(run(&source().count_where(Some(number_gt(3))).unwrap()), Ok(Value::Integer(2)));

    let numbers = QueryExpression::from_source(Expr::constant(
        Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
        TypeRef::array(TypeRef::Int32),
    ));
    let query = numbers
        .contains(Expr::constant(Value::Integer(2), TypeRef::Int32))
        .unwrap();
    assert_eq!(run(&query), Ok(Value::Boolean(true)));
}

#[test]
fn test_aggregates() {
    let src = source();
    assert_eq!(
        run(&src.sum(Some(key("Number", TypeRef::Int32))).unwrap()),
        Ok(Value::Integer(23))
    );
    assert_eq!(
        run(&src.max(Some(key("Number", TypeRef::Int32))).unwrap()),
        Ok(Value::Integer(12))
    );
    assert_eq!(
        run(&src.min(Some(key("Score", TypeRef::Double.nullable()))).unwrap()),
        Ok(Value::Float(2.5))
    );
    assert_eq!(
        run(&src.average(Some(key("Price", TypeRef::Decimal))).unwrap()),
        Ok(Value::Decimal(Decimal::new(1999, 2)))
    );
    match run(&src.average(Some(key("Number", TypeRef::Int32))).unwrap()) {
        Ok(Value::Float(avg)) => assert!((avg - 23.0 / 3.0).abs() < 1e-9),
        other => panic!("Expected float average, got {:?}", other),
    }
}

#[test]
fn test_aggregates_over_empty_sequence() {
    let empty = source().filter(number_gt(100)).unwrap();
    assert_eq!(
        run(&empty.sum(Some(key("Number", TypeRef::Int32))).unwrap()),
        Ok(Value::Integer(0))
    );
    assert_eq!(
        run(&empty.max(Some(key("Number", TypeRef::Int32))).unwrap()),
        Err(EvalError::EmptySequence)
    );
    assert_eq!(
        run(&empty.max(Some(key("Score", TypeRef::Double.nullable()))).unwrap()),
        Ok(Value::Null)
    );
    assert_eq!(
        run(&empty.average(Some(key("Number", TypeRef::Int32))).unwrap()),
        Err(EvalError::EmptySequence)
    );
}

#[test]
fn test_distinct_concat_default_if_empty() {
    let src = source();
    let doubled = src.concat(&src).unwrap();
    assert_eq!(run_items(&doubled).len(), 6);
    assert_eq!(run_items(&doubled.distinct().unwrap()), vec!["Bob", "Alice", "Zed"]);

    let empty = src.filter(number_gt(100)).unwrap().default_if_empty().unwrap();
    assert_eq!(run(&empty), Ok(Value::Array(vec![Value::Null])));
}

#[test]
fn test_zip_pairs_up_to_shorter() {
    let numbers = QueryExpression::from_source(Expr::constant(
        Value::Array(vec![Value::Integer(10), Value::Integer(20)]),
        TypeRef::array(TypeRef::Int32),
    ));
    let n = Parameter::new("n", TypeRef::Int32);
    let selector = Lambda::new(
        vec![x(), n.clone()],
        Expr::binary(
            BinaryOp::Add,
            Expr::member(x().to_expr(), "Number", TypeRef::Int32),
            n.to_expr(),
            TypeRef::Int32,
        ),
    );
    let query = source().zip(&numbers, selector).unwrap();
    assert_eq!(
        run(&query),
        Ok(Value::Array(vec![Value::Integer(18), Value::Integer(23)]))
    );
}

#[test]
fn test_of_type_and_cast() {
    let mixed = QueryExpression::from_source(Expr::constant(
        Value::Array(vec![Value::Integer(1), Value::from("two"), Value::Integer(3)]),
        TypeRef::array(TypeRef::Object),
    ));
    let ints = mixed.of_type(TypeRef::Int32).unwrap();
    assert_eq!(
        run(&ints),
        Ok(Value::Array(vec![Value::Integer(1), Value::Integer(3)]))
    );

    let doubles = ints.cast(TypeRef::Double).unwrap();
    assert_eq!(
        run(&doubles),
        Ok(Value::Array(vec![Value::Float(1.0), Value::Float(3.0)]))
    );

    let bad = mixed.cast(TypeRef::Int32).unwrap();
    assert!(matches!(run(&bad), Err(EvalError::InvalidCast(_))));
}

#[test]
fn test_parameter_source() {
    let query = QueryExpression::from_source(Expr::parameter(
        "critters",
        TypeRef::queryable(critter_type()),
    ))
    .filter(number_gt(5))
    .unwrap();
    let context = EvalContext::new().with_binding("critters", Value::Array(critters()));
    let result = Evaluator::new().execute(&query, &context).unwrap();
    assert_eq!(names(result.as_items().unwrap()), vec!["Bob", "Zed"]);
}
