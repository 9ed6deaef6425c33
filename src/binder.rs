//! Binding: untyped syntax to typed expression trees.
//!
//! Names are resolved through a [`TypeResolver`]. Operands of differing
//! types are coerced the way a strongly typed lambda would be compiled, so
//! a parsed filter is structurally equal to its hand-written counterpart:
//! numeric promotion (literals are re-typed, other operands get a
//! `Convert`), nullable lifting, enum members given as strings, `null`
//! taking the other operand's type, and `As`/`Convert` around operands of
//! type `Object`.

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use tracing::debug;

use crate::{
    ast::{BinOp, Literal, Node, NodeKind, SelectItem, UnaryOperator},
    error::QueryParseError,
    expr::{BinaryOp, Expr, ExprRef, Function, Lambda, Method, Parameter, QueryMethod, UnaryOp},
    lexer::{Lexer, Position},
    parser::Parser,
    schema::TypeResolver,
    types::TypeRef,
    value::Value,
};

/// Name of the root parameter of every parsed lambda.
pub const ROOT_PARAMETER: &str = "_this";

type BindResult<T> = Result<T, QueryParseError>;

/// Parses filter and select-list text against a root type.
pub struct QueryParser<'r> {
    resolver: &'r dyn TypeResolver,
    source: String,
    root: Parameter,
    /// Lambda parameters in scope, innermost last.
    scopes: Vec<Parameter>,
}

impl<'r> QueryParser<'r> {
    pub fn new(resolver: &'r dyn TypeResolver, root_type: TypeRef) -> Self {
        QueryParser {
            resolver,
            source: String::new(),
            root: Parameter::new(ROOT_PARAMETER, root_type),
            scopes: Vec::new(),
        }
    }

    /// `text` as a predicate lambda `_this => ...` over the root type.
    pub fn parse_filter(&mut self, text: &str) -> BindResult<ExprRef> {
        debug!(query = text, root = %self.root.ty, "parsing filter");
        self.source = text.to_string();
        let syntax = Parser::new(Lexer::new(text))?.parse()?;
        let body = self.bind(&syntax)?;
        if body.ty().underlying() != &TypeRef::Boolean {
            return Err(self.error(
                syntax.pos,
                format!("filter must be a Boolean expression, found {}", body.ty()),
            ));
        }
        Ok(Expr::lambda(vec![self.root.clone()], body))
    }

    /// `text` as an untyped-result lambda, e.g. for order-by keys.
    pub fn parse_expression(&mut self, text: &str) -> BindResult<ExprRef> {
        debug!(query = text, root = %self.root.ty, "parsing expression");
        self.source = text.to_string();
        let syntax = Parser::new(Lexer::new(text))?.parse()?;
        let body = self.bind(&syntax)?;
        Ok(Expr::lambda(vec![self.root.clone()], body))
    }

    /// `text` as a projection lambda.
    ///
    /// With `use_anonymous` the projection builds an anonymous record whose
    /// members are named after the aliases (or the last path segment);
    /// otherwise it builds a `Dictionary<String,Object>`.
    pub fn parse_select_list(&mut self, text: &str, use_anonymous: bool) -> BindResult<ExprRef> {
        debug!(query = text, root = %self.root.ty, use_anonymous, "parsing select list");
        self.source = text.to_string();
        let items = Parser::new(Lexer::new(text))?.parse_select_list()?;

        let mut members: Vec<(String, ExprRef)> = Vec::with_capacity(items.len());
        for SelectItem { expr, alias, pos } in &items {
            let bound = self.bind(expr)?;
            let name = match (alias, bound.as_ref()) {
                (Some(alias), _) => alias.clone(),
                (None, Expr::Member { name, .. }) => name.clone(),
                (None, _) => {
                    return Err(self.error(*pos, "select item needs an alias ('as name')"));
                }
            };
            if members.iter().any(|(existing, _)| existing.eq_ignore_ascii_case(&name)) {
                return Err(self.error(*pos, format!("duplicate select item '{}'", name)));
            }
            members.push((name, bound));
        }

        let body = if use_anonymous {
            let fields = members
                .iter()
                .map(|(name, value)| (name.clone(), value.ty()))
                .collect();
            Expr::new_object(TypeRef::Anonymous(fields), members)
        } else {
            let boxed = members
                .into_iter()
                .map(|(name, value)| {
                    let value = if value.ty().is_value_type() || value.ty().is_nullable() {
                        Expr::convert(value, TypeRef::Object)
                    } else {
                        value
                    };
                    (name, value)
                })
                .collect();
            Expr::new_object(TypeRef::dictionary(TypeRef::Object), boxed)
        };
        Ok(Expr::lambda(vec![self.root.clone()], body))
    }

    fn error(&self, pos: Position, message: impl Into<String>) -> QueryParseError {
        QueryParseError::new(&self.source, pos, message)
    }

    fn bind(&mut self, node: &Node) -> BindResult<ExprRef> {
        match &node.kind {
            NodeKind::Literal(literal) => self.bind_literal(literal, node.pos),
            NodeKind::Identifier(name) => self.bind_identifier(name, node.pos),
            NodeKind::Member { target, name } => {
                let target = self.bind(target)?;
                self.member(&target, name, node.pos)
            }
            NodeKind::Index { target, key } => {
                let target = self.bind(target)?;
                let key = self.bind(key)?;
                let TypeRef::Dictionary(value_type) = target.ty() else {
                    return Err(self.error(
                        node.pos,
                        format!("cannot index into a value of type {}", target.ty()),
                    ));
                };
                if key.ty().underlying() != &TypeRef::String {
                    return Err(self.error(node.pos, "dictionary keys must be strings"));
                }
                Ok(Expr::call(Method::DictionaryGet, vec![target, key], *value_type))
            }
            NodeKind::Binary { op, left, right } => self.bind_binary(*op, left, right, node.pos),
            NodeKind::Unary { op, operand } => {
                let operand = self.bind(operand)?;
                match op {
                    UnaryOperator::Not => {
                        self.require_boolean(&operand, node.pos, "not")?;
                        Ok(Expr::unary(UnaryOp::Not, operand.clone(), operand.ty()))
                    }
                    UnaryOperator::Negate => {
                        if !operand.ty().is_numeric() {
                            return Err(self.error(
                                node.pos,
                                format!("cannot negate a value of type {}", operand.ty()),
                            ));
                        }
                        Ok(Expr::unary(UnaryOp::Negate, operand.clone(), operand.ty()))
                    }
                }
            }
            NodeKind::Call { name, target, args } => {
                let mut all_args: Vec<&Node> = Vec::with_capacity(args.len() + 1);
                if let Some(target) = target {
                    all_args.push(target);
                }
                all_args.extend(args.iter());
                self.bind_call(name, &all_args, node.pos)
            }
            NodeKind::Lambda { .. } => Err(self.error(
                node.pos,
                "a lambda is only allowed as a function argument",
            )),
            NodeKind::Array(items) => self.bind_array(items, None, node.pos),
        }
    }

    fn bind_literal(&self, literal: &Literal, pos: Position) -> BindResult<ExprRef> {
        let (value, ty) = match literal {
            Literal::Integer(n) => (Value::Integer(*n), TypeRef::Int32),
            Literal::Long(n) => (Value::Integer(*n), TypeRef::Int64),
            Literal::Double(n) => (Value::Float(*n), TypeRef::Double),
            Literal::Decimal(n) => (Value::Decimal(*n), TypeRef::Decimal),
            Literal::String(s) => (Value::String(s.clone()), TypeRef::String),
            Literal::Boolean(b) => (Value::Boolean(*b), TypeRef::Boolean),
            Literal::Null => (Value::Null, TypeRef::Null),
            Literal::Guid(g) => (Value::Guid(*g), TypeRef::Guid),
            Literal::DateTime(d) => (Value::DateTime(*d), TypeRef::DateTime),
            Literal::TypeName(name) => {
                let ty = self
                    .resolver
                    .resolve_type(name)
                    .ok_or_else(|| self.error(pos, format!("unknown type '{}'", name)))?;
                (Value::Type(ty), TypeRef::Type)
            }
        };
        Ok(Expr::constant(value, ty))
    }

    fn bind_identifier(&self, name: &str, pos: Position) -> BindResult<ExprRef> {
        if name == "this" || name == ROOT_PARAMETER {
            return Ok(self.root.to_expr());
        }
        if let Some(parameter) = self.scopes.iter().rev().find(|p| p.name == name) {
            return Ok(parameter.to_expr());
        }
        let root = self.root.to_expr();
        self.member(&root, name, pos)
    }

    fn member(&self, target: &ExprRef, name: &str, pos: Position) -> BindResult<ExprRef> {
        self.resolver.resolve_property(target, name).ok_or_else(|| {
            self.error(
                pos,
                format!("type {} has no property '{}'", target.ty(), name),
            )
        })
    }

    fn require_boolean(&self, expr: &ExprRef, pos: Position, context: &str) -> BindResult<()> {
        if expr.ty().underlying() == &TypeRef::Boolean {
            Ok(())
        } else {
            Err(self.error(
                pos,
                format!("operand of '{}' must be Boolean, found {}", context, expr.ty()),
            ))
        }
    }

    fn bind_binary(&mut self, op: BinOp, left: &Node, right: &Node, pos: Position) -> BindResult<ExprRef> {
        if op == BinOp::In {
            let needle = self.bind(left)?;
            return self.bind_in(needle, right, pos);
        }

        let left = self.bind(left)?;
        let right = self.bind(right)?;

        match op {
            BinOp::And | BinOp::Or => {
                let keyword = if op == BinOp::And { "and" } else { "or" };
                self.require_boolean(&left, pos, keyword)?;
                self.require_boolean(&right, pos, keyword)?;
                let (left, right) = self.unify(left, right, pos)?;
                let ty = left.ty();
                let op = if op == BinOp::And {
                    BinaryOp::AndAlso
                } else {
                    BinaryOp::OrElse
                };
                Ok(Expr::binary(op, left, right, ty))
            }
            BinOp::Add
                if left.ty().underlying() == &TypeRef::String
                    || right.ty().underlying() == &TypeRef::String =>
            {
                Ok(Expr::call(
                    Method::Func(Function::Concat),
                    vec![left, right],
                    TypeRef::String,
                ))
            }
            _ if op.is_arithmetic() => {
                let (left, right) = self.unify(left, right, pos)?;
                if !left.ty().is_numeric() {
                    return Err(self.error(
                        pos,
                        format!("arithmetic is not defined for {}", left.ty()),
                    ));
                }
                let ty = left.ty();
                Ok(Expr::binary(arithmetic_op(op), left, right, ty))
            }
            _ => {
                let (left, right) = self.unify(left, right, pos)?;
                Ok(Expr::binary(comparison_op(op), left, right, TypeRef::Boolean))
            }
        }
    }

    /// `x in [a, b]` becomes `Enumerable.Contains(new T[] {a, b}, x)`.
    fn bind_in(&mut self, needle: ExprRef, haystack: &Node, pos: Position) -> BindResult<ExprRef> {
        let haystack = match &haystack.kind {
            NodeKind::Array(items) => self.bind_array(items, Some(needle.ty()), haystack.pos)?,
            _ => self.bind(haystack)?,
        };
        let Some(element) = haystack.ty().element_type().cloned() else {
            return Err(self.error(
                pos,
                format!("right operand of 'in' must be a collection, found {}", haystack.ty()),
            ));
        };
        let needle = self.coerce_to(needle, &element, pos)?;
        Ok(Expr::call(
            Method::Enumerable(QueryMethod::Contains),
            vec![haystack, needle],
            TypeRef::Boolean,
        ))
    }

    /// Array literal; items are unified to `hint` when given, else to the
    /// widest item type.
    fn bind_array(&mut self, items: &[Node], hint: Option<TypeRef>, pos: Position) -> BindResult<ExprRef> {
        let bound = items
            .iter()
            .map(|item| self.bind(item))
            .collect::<BindResult<Vec<_>>>()?;

        let element = match hint {
            Some(hint) => hint,
            None => {
                let mut element: Option<TypeRef> = None;
                for item in &bound {
                    let ty = item.ty();
                    element = Some(match element {
                        None => ty,
                        Some(current) => self.common_type(&current, &ty).ok_or_else(|| {
                            self.error(
                                pos,
                                format!("array items of types {} and {} do not mix", current, ty),
                            )
                        })?,
                    });
                }
                match element {
                    Some(TypeRef::Null) | None => TypeRef::Object,
                    Some(ty) => ty,
                }
            }
        };

        let items = bound
            .into_iter()
            .map(|item| self.coerce_to(item, &element, pos))
            .collect::<BindResult<Vec<_>>>()?;
        Ok(Expr::new_array(element, items))
    }

    /// The type both `a` and `b` can be widened to, if any.
    fn common_type(&self, a: &TypeRef, b: &TypeRef) -> Option<TypeRef> {
        if a == b {
            return Some(a.clone());
        }
        let nullable = a.is_nullable() || b.is_nullable();
        let lift = |ty: TypeRef| if nullable { ty.nullable() } else { ty };
        match (a, b) {
            (TypeRef::Null, other) | (other, TypeRef::Null) => Some(other.clone().nullable()),
            (TypeRef::Object, _) | (_, TypeRef::Object) => Some(TypeRef::Object),
            _ if a.underlying() == b.underlying() => Some(lift(a.underlying().clone())),
            _ => match (a.numeric_rank(), b.numeric_rank()) {
                (Some(ra), Some(rb)) => {
                    let wider = if ra >= rb { a } else { b };
                    Some(lift(wider.underlying().clone()))
                }
                _ if self.resolver.can_assign(a, b) => Some(a.clone()),
                _ if self.resolver.can_assign(b, a) => Some(b.clone()),
                _ => None,
            },
        }
    }

    /// Coerces both operands of a binary operator to one type.
    fn unify(&self, left: ExprRef, right: ExprRef, pos: Position) -> BindResult<(ExprRef, ExprRef)> {
        let (lt, rt) = (left.ty(), right.ty());
        if lt == rt {
            return Ok((left, right));
        }

        // Enum member spelled as a string literal
        if let TypeRef::Enum(_) = lt.underlying()
            && rt == TypeRef::String
        {
            let right = self.enum_member(&right, &lt, pos)?;
            return Ok((left, right));
        }
        if let TypeRef::Enum(_) = rt.underlying()
            && lt == TypeRef::String
        {
            let left = self.enum_member(&left, &rt, pos)?;
            return Ok((left, right));
        }

        // Object operands are cast to the concrete side
        if lt == TypeRef::Object && rt != TypeRef::Null {
            return Ok((cast_object(left, &rt), right));
        }
        if rt == TypeRef::Object && lt != TypeRef::Null {
            return Ok((left, cast_object(right, &lt)));
        }

        let target = self.common_type(&lt, &rt).ok_or_else(|| {
            self.error(pos, format!("operands of types {} and {} are incompatible", lt, rt))
        })?;
        Ok((
            self.coerce_to(left, &target, pos)?,
            self.coerce_to(right, &target, pos)?,
        ))
    }

    /// Converts `expr` to `target`: literals are re-typed in place, anything
    /// else is wrapped in a `Convert`.
    fn coerce_to(&self, expr: ExprRef, target: &TypeRef, pos: Position) -> BindResult<ExprRef> {
        let ty = expr.ty();
        if &ty == target {
            return Ok(expr);
        }
        if let Some(value) = expr.as_constant() {
            if value.is_null() {
                if !target.can_be_null() && !target.is_nullable() {
                    return Err(self.error(pos, format!("null is not a valid {}", target)));
                }
                return Ok(Expr::null(target.clone()));
            }
            if let TypeRef::Enum(_) = target.underlying()
                && ty == TypeRef::String
            {
                return self.enum_member(&expr, target, pos);
            }
            if let Some(converted) = convert_literal(value, target.underlying()) {
                return Ok(Expr::constant(converted, target.clone()));
            }
        }
        if target == &TypeRef::Object {
            return Ok(Expr::convert(expr, TypeRef::Object));
        }
        if ty.underlying() == target.underlying()
            || (ty.is_numeric() && target.is_numeric())
            || self.resolver.can_assign(target, &ty)
        {
            return Ok(Expr::convert(expr, target.clone()));
        }
        if ty == TypeRef::Object {
            return Ok(cast_object(expr, target));
        }
        Err(self.error(pos, format!("cannot convert {} to {}", ty, target)))
    }

    /// A string literal re-typed as a member of `enum_type`.
    fn enum_member(&self, literal: &ExprRef, enum_type: &TypeRef, pos: Position) -> BindResult<ExprRef> {
        let (Some(Value::String(member)), TypeRef::Enum(name)) =
            (literal.as_constant(), enum_type.underlying())
        else {
            return Err(self.error(
                pos,
                format!("only string literals can be compared with enum {}", enum_type),
            ));
        };
        let members = self.resolver.enum_values(name).unwrap_or_default();
        let Some(canonical) = members.iter().find(|m| m.eq_ignore_ascii_case(member)) else {
            return Err(self.error(
                pos,
                format!("'{}' is not a member of enum {}", member, name),
            ));
        };
        Ok(Expr::constant(
            Value::String(canonical.clone()),
            enum_type.clone(),
        ))
    }

    /// Binds `param:body` with `param` typed as `param_type`.
    fn bind_lambda(&mut self, node: &Node, param_type: TypeRef) -> BindResult<Lambda> {
        let NodeKind::Lambda { param, body } = &node.kind else {
            return Err(self.error(node.pos, "expected a lambda argument 'x:expression'"));
        };
        let parameter = Parameter::new(param.clone(), param_type);
        self.scopes.push(parameter.clone());
        let body = self.bind(body);
        self.scopes.pop();
        Ok(Lambda::new(vec![parameter], body?))
    }

    fn bind_call(&mut self, name: &str, args: &[&Node], pos: Position) -> BindResult<ExprRef> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "any" | "all" | "count" | "first" | "firstdefault" | "where" | "select" | "sum"
            | "max" | "min" | "take" | "skip" => self.bind_sequence_call(&lowered, args, pos),
            "cast" | "isof" => {
                let (operand, type_node) = match args {
                    [type_node] => (self.root.to_expr(), *type_node),
                    [operand, type_node] => (self.bind(operand)?, *type_node),
                    _ => return Err(self.arity(name, "1 or 2", pos)),
                };
                let ty = self.type_argument(type_node)?;
                if lowered == "cast" {
                    Ok(Expr::convert(operand, ty))
                } else {
                    Ok(Expr::type_is(operand, ty))
                }
            }
            "iif" => {
                let [test, if_true, if_false] = args else {
                    return Err(self.arity(name, "3", pos));
                };
                let test = self.bind(test)?;
                self.require_boolean(&test, pos, "iif")?;
                let (if_true, if_false) = {
                    let a = self.bind(if_true)?;
                    let b = self.bind(if_false)?;
                    self.unify(a, b, pos)?
                };
                Ok(Expr::conditional(test, if_true, if_false))
            }
            "contains" => {
                let [first, second] = args else {
                    return Err(self.arity(name, "2", pos));
                };
                let first = self.bind(first)?;
                if first.ty().element_type().is_some() {
                    let needle = self.bind(second)?;
                    let element = first.ty().element_type().cloned().unwrap_or(TypeRef::Object);
                    let needle = self.coerce_to(needle, &element, pos)?;
                    let method = sequence_method(&first.ty(), QueryMethod::Contains);
                    return Ok(Expr::call(method, vec![first, needle], TypeRef::Boolean));
                }
                let second = self.bind(second)?;
                self.string_call(Function::Contains, vec![first, second], TypeRef::Boolean, pos)
            }
            "substringof" => {
                let [needle, haystack] = args else {
                    return Err(self.arity(name, "2", pos));
                };
                let needle = self.bind(needle)?;
                let haystack = self.bind(haystack)?;
                self.string_call(Function::Contains, vec![haystack, needle], TypeRef::Boolean, pos)
            }
            "startswith" | "endswith" | "indexof" | "concat" => {
                let [a, b] = args else {
                    return Err(self.arity(name, "2", pos));
                };
                let (function, ty) = match lowered.as_str() {
                    "startswith" => (Function::StartsWith, TypeRef::Boolean),
                    "endswith" => (Function::EndsWith, TypeRef::Boolean),
                    "indexof" => (Function::IndexOf, TypeRef::Int32),
                    _ => (Function::Concat, TypeRef::String),
                };
                let a = self.bind(a)?;
                let b = self.bind(b)?;
                self.string_call(function, vec![a, b], ty, pos)
            }
            "tolower" | "toupper" | "trim" | "length" => {
                let [operand] = args else {
                    return Err(self.arity(name, "1", pos));
                };
                let operand = self.bind(operand)?;
                match lowered.as_str() {
                    "length" => {
                        self.require_string(&operand, pos)?;
                        Ok(Expr::member(operand, "Length", TypeRef::Int32))
                    }
                    "tolower" => self.string_call(Function::ToLower, vec![operand], TypeRef::String, pos),
                    "toupper" => self.string_call(Function::ToUpper, vec![operand], TypeRef::String, pos),
                    _ => self.string_call(Function::Trim, vec![operand], TypeRef::String, pos),
                }
            }
            "substring" => {
                let (text, start, length) = match args {
                    [text, start] => (text, start, None),
                    [text, start, length] => (text, start, Some(length)),
                    _ => return Err(self.arity(name, "2 or 3", pos)),
                };
                let mut bound = vec![self.bind(text)?];
                let start = self.bind(start)?;
                bound.push(self.coerce_to(start, &TypeRef::Int32, pos)?);
                if let Some(length) = length {
                    let length = self.bind(length)?;
                    bound.push(self.coerce_to(length, &TypeRef::Int32, pos)?);
                }
                self.string_call(Function::Substring, bound, TypeRef::String, pos)
            }
            "replace" => {
                let [text, from, to] = args else {
                    return Err(self.arity(name, "3", pos));
                };
                let bound = vec![self.bind(text)?, self.bind(from)?, self.bind(to)?];
                self.string_call(Function::Replace, bound, TypeRef::String, pos)
            }
            "year" | "month" | "day" | "hour" | "minute" | "second" => {
                let [operand] = args else {
                    return Err(self.arity(name, "1", pos));
                };
                let mut operand = self.bind(operand)?;
                if operand.ty().underlying() != &TypeRef::DateTime {
                    return Err(self.error(
                        pos,
                        format!("{}() expects a DateTime, found {}", lowered, operand.ty()),
                    ));
                }
                if operand.ty().is_nullable() {
                    operand = Expr::member(operand, "Value", TypeRef::DateTime);
                }
                Ok(Expr::member(operand, date_part(&lowered), TypeRef::Int32))
            }
            "round" | "floor" | "ceiling" => {
                let [operand] = args else {
                    return Err(self.arity(name, "1", pos));
                };
                let operand = self.bind(operand)?;
                let operand = match operand.ty().underlying() {
                    TypeRef::Double | TypeRef::Decimal => operand,
                    TypeRef::Int32 | TypeRef::Int64 => self.coerce_to(operand, &TypeRef::Double, pos)?,
                    other => {
                        return Err(self.error(
                            pos,
                            format!("{}() expects a number, found {}", lowered, other),
                        ));
                    }
                };
                let function = match lowered.as_str() {
                    "round" => Function::Round,
                    "floor" => Function::Floor,
                    _ => Function::Ceiling,
                };
                let ty = operand.ty();
                Ok(Expr::call(Method::Func(function), vec![operand], ty))
            }
            _ => Err(self.error(pos, format!("unknown function '{}'", name))),
        }
    }

    /// `any`, `select` and friends: the first argument is the source
    /// sequence, an optional lambda ranges over its elements.
    fn bind_sequence_call(&mut self, name: &str, args: &[&Node], pos: Position) -> BindResult<ExprRef> {
        let Some((source, rest)) = args.split_first() else {
            return Err(self.arity(name, "at least 1", pos));
        };
        let source = self.bind(source)?;
        let source_type = source.ty();
        let Some(element) = source_type.element_type().cloned() else {
            return Err(self.error(
                pos,
                format!("{}() expects a collection, found {}", name, source_type),
            ));
        };

        let query_method = match name {
            "any" => QueryMethod::Any,
            "all" => QueryMethod::All,
            "count" => QueryMethod::Count,
            "first" => QueryMethod::First,
            "firstdefault" => QueryMethod::FirstOrDefault,
            "where" => QueryMethod::Where,
            "select" => QueryMethod::Select,
            "sum" => QueryMethod::Sum,
            "max" => QueryMethod::Max,
            "min" => QueryMethod::Min,
            "take" => QueryMethod::Take,
            _ => QueryMethod::Skip,
        };
        let method = sequence_method(&source_type, query_method);

        if matches!(query_method, QueryMethod::Take | QueryMethod::Skip) {
            let [count] = rest else {
                return Err(self.arity(name, "2", pos));
            };
            let count = self.bind(count)?;
            let count = self.coerce_to(count, &TypeRef::Int32, pos)?;
            return Ok(Expr::call(method, vec![source, count], source_type));
        }

        let lambda = match rest {
            [] => None,
            [lambda] => Some(self.bind_lambda(lambda, element.clone())?),
            _ => return Err(self.arity(name, "1 or 2", pos)),
        };

        let requires_lambda = matches!(
            query_method,
            QueryMethod::All | QueryMethod::Where | QueryMethod::Select
        );
        if requires_lambda && lambda.is_none() {
            return Err(self.arity(name, "2", pos));
        }

        let is_predicate = matches!(
            query_method,
            QueryMethod::Any
                | QueryMethod::All
                | QueryMethod::Count
                | QueryMethod::First
                | QueryMethod::FirstOrDefault
                | QueryMethod::Where
        );
        if is_predicate
            && let Some(lambda) = &lambda
            && lambda.return_type().underlying() != &TypeRef::Boolean
        {
            return Err(self.error(
                pos,
                format!("{}() expects a Boolean predicate, found {}", name, lambda.return_type()),
            ));
        }

        let result_type = match query_method {
            QueryMethod::Any | QueryMethod::All => TypeRef::Boolean,
            QueryMethod::Count => TypeRef::Int32,
            QueryMethod::First | QueryMethod::FirstOrDefault => element.clone(),
            QueryMethod::Where => source_type.clone(),
            QueryMethod::Select => {
                let projected = lambda.as_ref().map(Lambda::return_type).unwrap_or(TypeRef::Object);
                source_type.sequence_like(projected)
            }
            _ => {
                let value = lambda.as_ref().map(Lambda::return_type).unwrap_or(element.clone());
                if query_method == QueryMethod::Sum && !value.is_numeric() {
                    return Err(self.error(
                        pos,
                        format!("sum() expects numbers, found {}", value),
                    ));
                }
                value
            }
        };

        let mut call_args = vec![source];
        if let Some(lambda) = lambda {
            let lambda = lambda.into_expr();
            call_args.push(if method.is_queryable() {
                Expr::quote(lambda)
            } else {
                lambda
            });
        }
        Ok(Expr::call(method, call_args, result_type))
    }

    fn type_argument(&self, node: &Node) -> BindResult<TypeRef> {
        match &node.kind {
            NodeKind::Literal(Literal::TypeName(name)) => self
                .resolver
                .resolve_type(name)
                .ok_or_else(|| self.error(node.pos, format!("unknown type '{}'", name))),
            _ => Err(self.error(node.pos, "expected a type literal t'Name'")),
        }
    }

    fn require_string(&self, expr: &ExprRef, pos: Position) -> BindResult<()> {
        if expr.ty().underlying() == &TypeRef::String {
            Ok(())
        } else {
            Err(self.error(pos, format!("expected a String, found {}", expr.ty())))
        }
    }

    fn string_call(
        &self,
        function: Function,
        args: Vec<ExprRef>,
        ty: TypeRef,
        pos: Position,
    ) -> BindResult<ExprRef> {
        if let Some(first) = args.first() {
            self.require_string(first, pos)?;
        }
        Ok(Expr::call(Method::Func(function), args, ty))
    }

    fn arity(&self, name: &str, expected: &str, pos: Position) -> QueryParseError {
        self.error(pos, format!("{}() takes {} argument(s)", name, expected))
    }
}

fn sequence_method(source: &TypeRef, method: QueryMethod) -> Method {
    if source.is_queryable() {
        Method::Queryable(method)
    } else {
        Method::Enumerable(method)
    }
}

fn comparison_op(op: BinOp) -> BinaryOp {
    match op {
        BinOp::Equal => BinaryOp::Equal,
        BinOp::NotEqual => BinaryOp::NotEqual,
        BinOp::LessThan => BinaryOp::LessThan,
        BinOp::GreaterThan => BinaryOp::GreaterThan,
        BinOp::LessEqual => BinaryOp::LessThanOrEqual,
        _ => BinaryOp::GreaterThanOrEqual,
    }
}

fn arithmetic_op(op: BinOp) -> BinaryOp {
    match op {
        BinOp::Add => BinaryOp::Add,
        BinOp::Subtract => BinaryOp::Subtract,
        BinOp::Multiply => BinaryOp::Multiply,
        BinOp::Divide => BinaryOp::Divide,
        _ => BinaryOp::Modulo,
    }
}

fn date_part(function: &str) -> &'static str {
    match function {
        "year" => "Year",
        "month" => "Month",
        "day" => "Day",
        "hour" => "Hour",
        "minute" => "Minute",
        _ => "Second",
    }
}

/// `(x As T)` for reference types, `Convert(x, T)` for value types.
fn cast_object(expr: ExprRef, target: &TypeRef) -> ExprRef {
    if target.is_value_type() || target.is_nullable() {
        Expr::convert(expr, target.clone())
    } else {
        Expr::type_as(expr, target.clone())
    }
}

/// Re-types a numeric literal, or `None` when it cannot be done exactly.
fn convert_literal(value: &Value, target: &TypeRef) -> Option<Value> {
    match (value, target) {
        (Value::Integer(n), TypeRef::Int32) => i32::try_from(*n).ok().map(|_| Value::Integer(*n)),
        (Value::Integer(n), TypeRef::Int64) => Some(Value::Integer(*n)),
        (Value::Integer(n), TypeRef::Decimal) => Some(Value::Decimal(Decimal::from(*n))),
        (Value::Integer(n), TypeRef::Double) => Some(Value::Float(*n as f64)),
        (Value::Decimal(d), TypeRef::Double) => d.to_f64().map(Value::Float),
        (Value::Float(f), TypeRef::Decimal) => Decimal::from_f64(*f).map(Value::Decimal),
        (Value::Float(f), TypeRef::Double) => Some(Value::Float(*f)),
        (Value::Decimal(d), TypeRef::Decimal) => Some(Value::Decimal(*d)),
        (Value::Boolean(_) | Value::String(_) | Value::Guid(_) | Value::DateTime(_), _)
            if target.is_value_type() || target == &TypeRef::String =>
        {
            let same = value.runtime_type().is_some_and(|ty| ty.underlying() == target);
            same.then(|| value.clone())
        }
        _ => None,
    }
}

/// Convenience wrapper around [`QueryParser::parse_filter`].
pub fn parse_filter(
    resolver: &dyn TypeResolver,
    root_type: &TypeRef,
    text: &str,
) -> Result<ExprRef, QueryParseError> {
    QueryParser::new(resolver, root_type.clone()).parse_filter(text)
}

/// Convenience wrapper around [`QueryParser::parse_select_list`].
pub fn parse_select_list(
    resolver: &dyn TypeResolver,
    root_type: &TypeRef,
    text: &str,
    use_anonymous: bool,
) -> Result<ExprRef, QueryParseError> {
    QueryParser::new(resolver, root_type.clone()).parse_select_list(text, use_anonymous)
}
