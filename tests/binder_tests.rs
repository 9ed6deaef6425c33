// tests/binder_tests.rs

mod common;

use common::{bind_filter, critter_type, filter_text, schema};
use plume_query::expr::{BinaryOp, Expr, Parameter};
use plume_query::{QueryParser, TypeRef, Value, parse_filter, parse_select_list};
use proptest::prelude::*;

fn bind_error(filter: &str) -> plume_query::QueryParseError {
    let schema = schema();
    parse_filter(&schema, &critter_type(), filter).unwrap_err()
}

fn body_type_of_right(filter: &str) -> TypeRef {
    let lambda = bind_filter(filter);
    let lambda = lambda.as_lambda().unwrap();
    match lambda.body.as_ref() {
        Expr::Binary { right, .. } => right.ty(),
        other => panic!("Expected binary body, got {}", other),
    }
}

// ============================================================================
// Comparisons and precedence
// ============================================================================

#[test]
fn test_not_equal_renders_as_lambda() {
    assert_eq!(filter_text("Number ne 8"), "_this => (_this.Number != 8)");
}

#[test]
fn test_matches_hand_built_tree() {
    let this = Parameter::new("_this", critter_type());
    let expected = Expr::lambda(
        vec![this.clone()],
        Expr::binary(
            BinaryOp::NotEqual,
            Expr::member(this.to_expr(), "Number", TypeRef::Int32),
            Expr::constant(Value::Integer(8), TypeRef::Int32),
            TypeRef::Boolean,
        ),
    );
    assert_eq!(bind_filter("Number ne 8"), expected);
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(
        filter_text("Number eq 2 add 3"),
        "_this => (_this.Number == (2 + 3))"
    );
    assert_eq!(
        filter_text("Number eq 2 add 3 mul 4"),
        "_this => (_this.Number == (2 + (3 * 4)))"
    );
}

#[test]
fn test_and_or() {
    assert_eq!(
        filter_text("name eq 'a' and number gt 1 or number lt 0"),
        "_this => (((_this.Name == \"a\") AndAlso (_this.Number > 1)) OrElse (_this.Number < 0))"
    );
}

#[test]
fn test_not() {
    assert_eq!(
        filter_text("not (number ge 3)"),
        "_this => Not((_this.Number >= 3))"
    );
}

#[test]
fn test_property_names_are_case_insensitive() {
    assert_eq!(filter_text("NAME eq 'x'"), "_this => (_this.Name == \"x\")");
}

#[test]
fn test_nested_member() {
    assert_eq!(
        filter_text("hat.hattype eq 'whatever'"),
        "_this => (_this.Hat.HatType == \"whatever\")"
    );
}

#[test]
fn test_this_keyword() {
    assert_eq!(filter_text("this.number eq 1"), "_this => (_this.Number == 1)");
}

// ============================================================================
// Coercions
// ============================================================================

#[test]
fn test_literal_retyped_to_decimal() {
    assert_eq!(filter_text("price gt 10"), "_this => (_this.Price > 10)");
    assert_eq!(body_type_of_right("price gt 10"), TypeRef::Decimal);
}

#[test]
fn test_member_widened_with_convert() {
    assert_eq!(
        filter_text("number gt 2.5"),
        "_this => (Convert(_this.Number, Double) > 2.5)"
    );
}

#[test]
fn test_int32_bounds_stay_int32() {
    assert_eq!(
        filter_text("number eq -2147483648"),
        "_this => (_this.Number == -2147483648)"
    );
    assert_eq!(body_type_of_right("number eq -2147483648"), TypeRef::Int32);
    assert_eq!(
        filter_text("number eq -2147483649"),
        "_this => (Convert(_this.Number, Int64) == -2147483649)"
    );
}

#[test]
fn test_nullable_lifting() {
    assert_eq!(body_type_of_right("score gt 2"), TypeRef::Double.nullable());
}

#[test]
fn test_null_takes_other_operand_type() {
    assert_eq!(filter_text("name eq null"), "_this => (_this.Name == null)");
    assert_eq!(body_type_of_right("score eq null"), TypeRef::Double.nullable());
}

#[test]
fn test_null_against_value_type_lifts_member() {
    assert_eq!(
        filter_text("number eq null"),
        "_this => (Convert(_this.Number, Nullable<Int32>) == null)"
    );
}

#[test]
fn test_enum_member_from_string() {
    assert_eq!(
        filter_text("state eq 'sleeping'"),
        "_this => (_this.State == \"Sleeping\")"
    );
    assert_eq!(
        body_type_of_right("state eq 'sleeping'"),
        TypeRef::Enum("CritterState".to_string())
    );
}

#[test]
fn test_unknown_enum_member() {
    let err = bind_error("state eq 'hungry'");
    assert!(err.message.contains("hungry"), "{}", err.message);
}

#[test]
fn test_string_add_is_concat() {
    assert_eq!(
        filter_text("name add 'x' eq 'Bobx'"),
        "_this => (String.Concat(_this.Name, \"x\") == \"Bobx\")"
    );
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_any_with_lambda() {
    assert_eq!(
        filter_text("any(weapons, w:w.strength gt 3)"),
        "_this => _this.Weapons.Any(w => (w.Strength > 3))"
    );
}

#[test]
fn test_count_dot_call() {
    assert_eq!(
        filter_text("weapons.count() gt 1"),
        "_this => (_this.Weapons.Count() > 1)"
    );
}

#[test]
fn test_in_operator() {
    assert_eq!(
        filter_text("name in ['Bob', 'Alice']"),
        "_this => new String[] {\"Bob\", \"Alice\"}.Contains(_this.Name)"
    );
}

#[test]
fn test_dictionary_index() {
    assert_eq!(
        filter_text("attributes['color'] eq 'red'"),
        "_this => (_this.Attributes.get_Item(\"color\") == \"red\")"
    );
}

#[test]
fn test_string_functions() {
    assert_eq!(
        filter_text("startswith(name, 'B')"),
        "_this => _this.Name.StartsWith(\"B\")"
    );
    assert_eq!(
        filter_text("substringof('o', name)"),
        "_this => _this.Name.Contains(\"o\")"
    );
    assert_eq!(
        filter_text("length(name) eq 3"),
        "_this => (_this.Name.Length == 3)"
    );
    assert_eq!(
        filter_text("tolower(name) eq 'bob'"),
        "_this => (_this.Name.ToLower() == \"bob\")"
    );
}

#[test]
fn test_date_parts() {
    assert_eq!(
        filter_text("year(birthdate) eq 2014"),
        "_this => (_this.BirthDate.Year == 2014)"
    );
}

#[test]
fn test_type_tests_and_casts() {
    assert_eq!(
        filter_text("isof(t'MusicalCritter')"),
        "_this => (_this Is MusicalCritter)"
    );
    assert_eq!(
        filter_text("cast(friend, t'MusicalCritter').instrument eq 'drum'"),
        "_this => (Convert(_this.Friend, MusicalCritter).Instrument == \"drum\")"
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unknown_property() {
    let err = bind_error("nme eq 'x'");
    assert_eq!((err.line, err.column), (1, 1));
    assert!(err.message.contains("no property 'nme'"), "{}", err.message);
}

#[test]
fn test_filter_must_be_boolean() {
    let err = bind_error("number add 1");
    assert!(err.message.contains("Boolean"), "{}", err.message);
}

#[test]
fn test_incompatible_operands() {
    let err = bind_error("name eq 3");
    assert!(err.message.contains("incompatible"), "{}", err.message);
}

#[test]
fn test_unknown_function() {
    let err = bind_error("frobnicate(name)");
    assert!(err.message.contains("frobnicate"), "{}", err.message);
}

#[test]
fn test_lambda_outside_call() {
    assert!(parse_filter(&schema(), &critter_type(), "w:w.strength").is_err());
}

// ============================================================================
// Select lists
// ============================================================================

#[test]
fn test_select_list_anonymous() {
    let schema = schema();
    let projection = parse_select_list(&schema, &critter_type(), "name, hat.hattype as hat", true).unwrap();
    assert_eq!(
        projection.to_string(),
        "_this => new <>f__AnonymousType(Name = _this.Name, hat = _this.Hat.HatType)"
    );
    let lambda = projection.as_lambda().unwrap();
    assert_eq!(
        lambda.return_type(),
        TypeRef::Anonymous(vec![
            ("Name".to_string(), TypeRef::String),
            ("hat".to_string(), TypeRef::String),
        ])
    );
}

#[test]
fn test_select_list_dictionary_boxes_value_types() {
    let schema = schema();
    let projection = parse_select_list(&schema, &critter_type(), "name, number", false).unwrap();
    assert_eq!(
        projection.to_string(),
        "_this => new Dictionary`2() {Void Add(String, Object)(\"Name\", _this.Name), \
         Void Add(String, Object)(\"Number\", Convert(_this.Number, Object))}"
    );
}

#[test]
fn test_select_list_requires_alias_for_expressions() {
    let schema = schema();
    let err = parse_select_list(&schema, &critter_type(), "number add 1", true).unwrap_err();
    assert!(err.message.contains("alias"), "{}", err.message);
}

#[test]
fn test_select_list_rejects_duplicates() {
    let schema = schema();
    let err = parse_select_list(&schema, &critter_type(), "name, hat.hattype as NAME", true).unwrap_err();
    assert!(err.message.contains("duplicate"), "{}", err.message);
    assert_eq!(err.column, 7);
}

#[test]
fn test_query_parser_is_reusable() {
    let schema = schema();
    let mut parser = QueryParser::new(&schema, critter_type());
    assert!(parser.parse_filter("nme eq 1").is_err());
    let ok = parser.parse_filter("number eq 1").unwrap();
    assert_eq!(ok.to_string(), "_this => (_this.Number == 1)");
    let key = parser.parse_expression("hat.size").unwrap();
    assert_eq!(key.as_lambda().unwrap().return_type(), TypeRef::Int32);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_multiplication_binds_tighter(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
        let text = filter_text(&format!("number eq {} add {} mul {}", a, b, c));
        prop_assert_eq!(text, format!("_this => (_this.Number == ({} + ({} * {})))", a, b, c));
    }

    #[test]
    fn prop_subtraction_is_left_associative(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
        let text = filter_text(&format!("number eq {} sub {} sub {}", a, b, c));
        prop_assert_eq!(text, format!("_this => (_this.Number == (({} - {}) - {}))", a, b, c));
    }
}
