// tests/parser_tests.rs

use plume_query::ast::{BinOp, Literal, Node, NodeKind, UnaryOperator};
use plume_query::lexer::Lexer;
use plume_query::parser::Parser;

fn parse(input: &str) -> Node {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer).unwrap();
    parser.parse().unwrap()
}

fn parse_err(input: &str) -> plume_query::QueryParseError {
    let lexer = Lexer::new(input);
    match Parser::new(lexer) {
        Ok(mut parser) => parser.parse().unwrap_err(),
        Err(e) => e,
    }
}

fn binary(node: &Node) -> (BinOp, &Node, &Node) {
    match &node.kind {
        NodeKind::Binary { op, left, right } => (*op, left, right),
        other => panic!("Expected binary, got {:?}", other),
    }
}

fn ident(node: &Node) -> &str {
    match &node.kind {
        NodeKind::Identifier(name) => name,
        other => panic!("Expected identifier, got {:?}", other),
    }
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_parse_literals() {
    let cases = vec![
        ("42", Literal::Integer(42)),
        ("42L", Literal::Long(42)),
        ("1.5", Literal::Double(1.5)),
        ("'text'", Literal::String("text".to_string())),
        ("true", Literal::Boolean(true)),
        ("null", Literal::Null),
        ("t'Hat'", Literal::TypeName("Hat".to_string())),
    ];
    for (input, expected) in cases {
        assert_eq!(parse(input).kind, NodeKind::Literal(expected), "input: {}", input);
    }
}

#[test]
fn test_negative_literal_is_folded() {
    assert_eq!(parse("-5").kind, NodeKind::Literal(Literal::Integer(-5)));
    assert_eq!(parse("-2.5").kind, NodeKind::Literal(Literal::Double(-2.5)));
}

#[test]
fn test_integer_width_follows_sign() {
    let cases = vec![
        ("2147483647", Literal::Integer(2_147_483_647)),
        ("2147483648", Literal::Long(2_147_483_648)),
        ("-2147483648", Literal::Integer(-2_147_483_648)),
        ("-2147483649", Literal::Long(-2_147_483_649)),
        ("-5L", Literal::Long(-5)),
    ];
    for (input, expected) in cases {
        assert_eq!(parse(input).kind, NodeKind::Literal(expected), "input: {}", input);
    }
}

#[test]
fn test_negate_member_is_unary() {
    match parse("-number").kind {
        NodeKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOperator::Negate);
            assert_eq!(ident(&operand), "number");
        }
        other => panic!("Expected unary, got {:?}", other),
    }
}

// ============================================================================
// Operators and precedence
// ============================================================================

#[test]
fn test_comparison() {
    let node = parse("number ne 8");
    let (op, left, right) = binary(&node);
    assert_eq!(op, BinOp::NotEqual);
    assert_eq!(ident(left), "number");
    assert_eq!(right.kind, NodeKind::Literal(Literal::Integer(8)));
}

#[test]
fn test_arithmetic_binds_tighter_than_equality() {
    let node = parse("number eq 2 add 3");
    let (op, left, right) = binary(&node);
    assert_eq!(op, BinOp::Equal);
    assert_eq!(ident(left), "number");
    let (inner, _, _) = binary(right);
    assert_eq!(inner, BinOp::Add);
}

#[test]
fn test_multiplicative_binds_tighter_than_additive() {
    let node = parse("1 add 2 mul 3");
    let (op, left, right) = binary(&node);
    assert_eq!(op, BinOp::Add);
    assert_eq!(left.kind, NodeKind::Literal(Literal::Integer(1)));
    assert_eq!(binary(right).0, BinOp::Multiply);
}

#[test]
fn test_and_binds_tighter_than_or() {
    let node = parse("a or b and c");
    let (op, left, right) = binary(&node);
    assert_eq!(op, BinOp::Or);
    assert_eq!(ident(left), "a");
    assert_eq!(binary(right).0, BinOp::And);
}

#[test]
fn test_left_associative() {
    let node = parse("10 sub 4 sub 3");
    let (op, left, right) = binary(&node);
    assert_eq!(op, BinOp::Subtract);
    assert_eq!(binary(left).0, BinOp::Subtract);
    assert_eq!(right.kind, NodeKind::Literal(Literal::Integer(3)));
}

#[test]
fn test_parentheses_override_precedence() {
    let node = parse("(a or b) and c");
    let (op, left, _) = binary(&node);
    assert_eq!(op, BinOp::And);
    assert_eq!(binary(left).0, BinOp::Or);
}

#[test]
fn test_not() {
    match parse("not (a eq 1)").kind {
        NodeKind::Unary { op, operand } => {
            assert_eq!(op, UnaryOperator::Not);
            assert_eq!(binary(&operand).0, BinOp::Equal);
        }
        other => panic!("Expected unary, got {:?}", other),
    }
}

#[test]
fn test_in_with_array() {
    let node = parse("name in ['a', 'b']");
    let (op, _, right) = binary(&node);
    assert_eq!(op, BinOp::In);
    match &right.kind {
        NodeKind::Array(items) => assert_eq!(items.len(), 2),
        other => panic!("Expected array, got {:?}", other),
    }
}

// ============================================================================
// Postfix: members, calls, indexing, lambdas
// ============================================================================

#[test]
fn test_member_chain() {
    match parse("hat.hattype").kind {
        NodeKind::Member { target, name } => {
            assert_eq!(name, "hattype");
            assert_eq!(ident(&target), "hat");
        }
        other => panic!("Expected member, got {:?}", other),
    }
}

#[test]
fn test_function_call_with_lambda() {
    match parse("any(weapons, w:w.strength gt 3)").kind {
        NodeKind::Call { name, target, args } => {
            assert_eq!(name, "any");
            assert!(target.is_none());
            assert_eq!(args.len(), 2);
            match &args[1].kind {
                NodeKind::Lambda { param, body } => {
                    assert_eq!(param, "w");
                    assert_eq!(binary(body).0, BinOp::GreaterThan);
                }
                other => panic!("Expected lambda, got {:?}", other),
            }
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_dot_call() {
    match parse("weapons.count()").kind {
        NodeKind::Call { name, target, args } => {
            assert_eq!(name, "count");
            assert_eq!(ident(target.as_deref().unwrap()), "weapons");
            assert!(args.is_empty());
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_index() {
    match parse("attributes['color']").kind {
        NodeKind::Index { target, key } => {
            assert_eq!(ident(&target), "attributes");
            assert_eq!(key.kind, NodeKind::Literal(Literal::String("color".to_string())));
        }
        other => panic!("Expected index, got {:?}", other),
    }
}

// ============================================================================
// Select lists
// ============================================================================

#[test]
fn test_select_list_with_aliases() {
    let mut parser = Parser::new(Lexer::new("name, hat.hattype as hat, count(weapons) as n")).unwrap();
    let items = parser.parse_select_list().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].alias, None);
    assert_eq!(items[1].alias.as_deref(), Some("hat"));
    assert_eq!(items[2].alias.as_deref(), Some("n"));
    assert_eq!(items[1].pos.column, 7);
}

#[test]
fn test_select_list_alias_must_be_identifier() {
    let mut parser = Parser::new(Lexer::new("name as 'x'")).unwrap();
    assert!(parser.parse_select_list().is_err());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_diagram_for_unknown_operator() {
    let err = parse_err("name eo 'blah'");
    assert_eq!((err.line, err.column), (1, 5));
    assert_eq!(err.diagram, "name eo 'blah'\n    |/");
    assert_eq!(
        err.to_string(),
        format!(
            "Error on line 1 character 5 of query: {}\nname eo 'blah'\n    |/",
            err.message
        )
    );
}

#[test]
fn test_error_diagram_points_at_token_after_wide_gap() {
    let err = parse_err("name   eo 'blah'");
    assert_eq!((err.line, err.column), (1, 7));
    assert_eq!(err.diagram, "name   eo 'blah'\n      |/");
}

#[test]
fn test_error_missing_operand() {
    let err = parse_err("number eq");
    assert_eq!(err.line, 1);
    assert!(err.message.contains("expected"), "{}", err.message);
}

#[test]
fn test_error_unclosed_paren() {
    let err = parse_err("(a eq 1");
    assert!(err.message.contains("')'"), "{}", err.message);
    assert_eq!(err.column, 8);
}

#[test]
fn test_error_on_second_line() {
    let err = parse_err("name eq 'x'\nand eq");
    assert_eq!(err.line, 2);
    assert!(err.diagram.starts_with("and eq\n"));
}
