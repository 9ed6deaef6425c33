use std::cmp::Ordering;

use chrono::{Datelike, Timelike};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use thiserror::Error;

use crate::{
    error::ProxyError,
    expr::{BinaryOp, Expr, ExprRef, Function, Lambda, Method, QueryMethod, UnaryOp},
    query::QueryExpression,
    schema::TypeMapper,
    types::TypeRef,
    value::{Resource, Value},
};

/// Parameter bindings visible while evaluating a lambda body.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Innermost binding last.
    bindings: Vec<(String, Value)>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context with `name` bound to `value` on top of the current ones.
    pub fn with_binding(&self, name: impl Into<String>, value: Value) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.push((name.into(), value));
        EvalContext { bindings }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }
}

/// Errors that can occur during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    #[error("Type error: {0}")]
    TypeError(String),

    /// Invalid member access or index
    #[error("Access error: {0}")]
    AccessError(String),

    #[error("Unbound parameter: {0}")]
    UnboundParameter(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Sequence contains no elements")]
    EmptySequence,

    #[error("Sequence contains more than one element")]
    MoreThanOneElement,

    #[error("Invalid cast: {0}")]
    InvalidCast(String),

    /// Node kinds that only make sense inside patterns or as arguments
    #[error("Cannot evaluate {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// In-memory execution of typed expressions and query chains.
///
/// Query operators run LINQ-to-objects style over [`Value::Array`]s (lazy
/// lists are resolved on first use). A mapper, when given, lets type tests
/// see subclasses.
#[derive(Default)]
pub struct Evaluator<'m> {
    mapper: Option<&'m dyn TypeMapper>,
}

impl<'m> Evaluator<'m> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapper(mapper: &'m dyn TypeMapper) -> Self {
        Evaluator {
            mapper: Some(mapper),
        }
    }

    /// Applies a lambda to its arguments.
    pub fn invoke(&self, lambda: &Lambda, args: &[Value]) -> Result<Value, EvalError> {
        self.invoke_in(lambda, args, &EvalContext::new())
    }

    /// Evaluates a one-parameter predicate lambda (`_this => ...`).
    pub fn test(&self, predicate: &ExprRef, item: &Value) -> Result<bool, EvalError> {
        let lambda = predicate
            .as_lambda()
            .ok_or(EvalError::Unsupported("a predicate that is not a lambda"))?;
        Ok(self.invoke(lambda, std::slice::from_ref(item))? == Value::Boolean(true))
    }

    /// The items that satisfy `predicate`.
    pub fn filter(&self, predicate: &ExprRef, items: &[Value]) -> Result<Vec<Value>, EvalError> {
        let mut result = Vec::new();
        for item in items {
            if self.test(predicate, item)? {
                result.push(item.clone());
            }
        }
        Ok(result)
    }

    /// Runs a query chain whose sources are constants or bound parameters.
    pub fn execute(&self, query: &QueryExpression, context: &EvalContext) -> Result<Value, EvalError> {
        self.eval(query.node(), context)
    }

    pub fn eval(&self, expr: &ExprRef, context: &EvalContext) -> Result<Value, EvalError> {
        match expr.as_ref() {
            Expr::Constant { value, .. } => Ok(value.clone()),
            Expr::Parameter(parameter) => context
                .lookup(&parameter.name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundParameter(parameter.name.clone())),
            Expr::Member { target, name, .. } => {
                let target = self.eval(target, context)?;
                self.apply_member(&target, name)
            }
            Expr::Binary { op, left, right, .. } => match op {
                BinaryOp::AndAlso => {
                    if self.eval(left, context)? != Value::Boolean(true) {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(self.eval(right, context)? == Value::Boolean(true)))
                }
                BinaryOp::OrElse => {
                    if self.eval(left, context)? == Value::Boolean(true) {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(self.eval(right, context)? == Value::Boolean(true)))
                }
                _ => {
                    let left = self.eval(left, context)?;
                    let right = self.eval(right, context)?;
                    apply_binop(*op, &left, &right)
                }
            },
            Expr::Unary { op, operand, ty } => {
                if *op == UnaryOp::Quote {
                    return Err(EvalError::Unsupported("a quoted lambda outside a query operator"));
                }
                let value = self.eval(operand, context)?;
                match op {
                    UnaryOp::Not => match value {
                        Value::Null => Ok(Value::Null),
                        Value::Boolean(b) => Ok(Value::Boolean(!b)),
                        other => Err(EvalError::TypeError(format!(
                            "Cannot negate {}",
                            other.kind_name()
                        ))),
                    },
                    UnaryOp::Negate => match value {
                        Value::Null => Ok(Value::Null),
                        Value::Integer(n) => n.checked_neg().map(Value::Integer).ok_or(EvalError::Overflow),
                        Value::Float(n) => Ok(Value::Float(-n)),
                        Value::Decimal(d) => Ok(Value::Decimal(-d)),
                        other => Err(EvalError::TypeError(format!(
                            "Cannot negate {}",
                            other.kind_name()
                        ))),
                    },
                    UnaryOp::TypeAs => Ok(if self.is_of_type(&value, ty) {
                        value
                    } else {
                        Value::Null
                    }),
                    _ => self.convert(value, ty),
                }
            }
            Expr::Call { method, args, ty } => self.eval_call(expr, *method, args, ty, context),
            Expr::Lambda(_) => Err(EvalError::Unsupported("a lambda outside a query operator")),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => {
                if self.eval(test, context)? == Value::Boolean(true) {
                    self.eval(if_true, context)
                } else {
                    self.eval(if_false, context)
                }
            }
            Expr::NewArray { items, .. } => items
                .iter()
                .map(|item| self.eval(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::New { ty, members } => {
                let mut resource = match ty {
                    TypeRef::Structured(name) => Resource::new(name.clone()),
                    _ => Resource::anonymous(),
                };
                for (name, value) in members {
                    resource.set(name.clone(), self.eval(value, context)?);
                }
                Ok(match ty {
                    TypeRef::Dictionary(_) => Value::Dictionary(resource.properties),
                    _ => Value::Resource(resource),
                })
            }
            Expr::TypeIs { operand, test_type } => {
                let value = self.eval(operand, context)?;
                Ok(Value::Boolean(self.is_of_type(&value, test_type)))
            }
            Expr::Capture { .. } => Err(EvalError::Unsupported("a pattern capture")),
        }
    }

    fn invoke_in(&self, lambda: &Lambda, args: &[Value], context: &EvalContext) -> Result<Value, EvalError> {
        if lambda.parameters.len() != args.len() {
            return Err(EvalError::TypeError(format!(
                "Lambda expects {} argument(s), got {}",
                lambda.parameters.len(),
                args.len()
            )));
        }
        let mut scope = context.clone();
        for (parameter, arg) in lambda.parameters.iter().zip(args) {
            scope = scope.with_binding(parameter.name.clone(), arg.clone());
        }
        self.eval(&lambda.body, &scope)
    }

    fn apply_member(&self, target: &Value, name: &str) -> Result<Value, EvalError> {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Resource(resource) => Ok(resource.get_ignore_case(name).cloned().unwrap_or(Value::Null)),
            Value::Reference(reference) => Ok(reference.get(name)?),
            Value::Dictionary(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Value::Grouping { key, .. } if name == "Key" => Ok((**key).clone()),
            Value::String(s) if name == "Length" => Ok(Value::Integer(s.chars().count() as i64)),
            Value::DateTime(d) => match name {
                "Year" => Ok(Value::Integer(d.year().into())),
                "Month" => Ok(Value::Integer(d.month().into())),
                "Day" => Ok(Value::Integer(d.day().into())),
                "Hour" => Ok(Value::Integer(d.hour().into())),
                "Minute" => Ok(Value::Integer(d.minute().into())),
                "Second" => Ok(Value::Integer(d.second().into())),
                "Value" => Ok(target.clone()),
                _ => Err(EvalError::AccessError(format!("DateTime has no member '{}'", name))),
            },
            other => Err(EvalError::AccessError(format!(
                "Cannot access member '{}' of {}",
                name,
                other.kind_name()
            ))),
        }
    }

    /// Whether `value` is an instance of `ty` (`Is` / `OfType` / `As`).
    fn is_of_type(&self, value: &Value, ty: &TypeRef) -> bool {
        match (value, ty.underlying()) {
            (Value::Null, _) => false,
            (_, TypeRef::Object) => true,
            (Value::Resource(_) | Value::Reference(_), TypeRef::Structured(target)) => {
                let Some(TypeRef::Structured(actual)) = value.runtime_type() else {
                    return false;
                };
                match self.mapper {
                    Some(mapper) => mapper.is_subclass(&actual, target),
                    None => &actual == target,
                }
            }
            (Value::Resource(resource), TypeRef::Anonymous(_)) => resource.type_name.is_none(),
            (Value::Integer(n), TypeRef::Int32) => i32::try_from(*n).is_ok(),
            (Value::Integer(_), TypeRef::Int64) => true,
            (Value::String(_), TypeRef::Enum(_)) => true,
            (Value::Array(_) | Value::List(_), TypeRef::Array(_) | TypeRef::Queryable(_)) => true,
            (Value::Dictionary(_), TypeRef::Dictionary(_)) => true,
            (Value::Grouping { .. }, TypeRef::Grouping(..)) => true,
            (other, target) => other.runtime_type().as_ref() == Some(target),
        }
    }

    fn convert(&self, value: Value, ty: &TypeRef) -> Result<Value, EvalError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let invalid = |value: &Value| {
            EvalError::InvalidCast(format!("{} to {}", value.kind_name(), ty))
        };
        match ty.underlying() {
            TypeRef::Object | TypeRef::Null => Ok(value),
            TypeRef::Int32 | TypeRef::Int64 => match &value {
                Value::Integer(_) => Ok(value),
                Value::Float(f) => Ok(Value::Integer(f.trunc() as i64)),
                Value::Decimal(d) => d.trunc().to_i64().map(Value::Integer).ok_or(EvalError::Overflow),
                other => Err(invalid(other)),
            },
            TypeRef::Double => value.as_float().map(Value::Float).ok_or_else(|| invalid(&value)),
            TypeRef::Decimal => value.as_decimal().map(Value::Decimal).ok_or_else(|| invalid(&value)),
            TypeRef::Array(_) | TypeRef::Queryable(_) | TypeRef::Dictionary(_) | TypeRef::Grouping(..) => {
                Ok(value)
            }
            target => {
                if self.is_of_type(&value, target) {
                    Ok(value)
                } else {
                    Err(invalid(&value))
                }
            }
        }
    }

    fn eval_call(
        &self,
        node: &ExprRef,
        method: Method,
        args: &[ExprRef],
        ty: &TypeRef,
        context: &EvalContext,
    ) -> Result<Value, EvalError> {
        match method {
            Method::DictionaryGet => {
                let [target, key] = args else {
                    return Err(EvalError::TypeError("get_Item takes two arguments".to_string()));
                };
                let target = self.eval(target, context)?;
                let key = self.eval(key, context)?;
                match (&target, &key) {
                    (Value::Null, _) => Ok(Value::Null),
                    (Value::Dictionary(map), Value::String(k)) => {
                        Ok(map.get(k).cloned().unwrap_or(Value::Null))
                    }
                    (a, b) => Err(EvalError::TypeError(format!(
                        "Cannot index {} with {}",
                        a.kind_name(),
                        b.kind_name()
                    ))),
                }
            }
            Method::Func(function) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, context))
                    .collect::<Result<Vec<_>, _>>()?;
                apply_function(function, &values)
            }
            Method::Queryable(_) | Method::Enumerable(_) => {
                let query = QueryExpression::wrap(node);
                if matches!(query, QueryExpression::Source(_)) {
                    return Err(EvalError::TypeError(format!(
                        "Unrecognised query operator call {}",
                        node
                    )));
                }
                self.eval_query(&query, ty, context)
            }
        }
    }

    fn sequence(&self, source: &ExprRef, context: &EvalContext) -> Result<Vec<Value>, EvalError> {
        let value = self.eval(source, context)?;
        self.items(value)
    }

    fn items(&self, value: Value) -> Result<Vec<Value>, EvalError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) | Value::Grouping { items, .. } => Ok(items),
            Value::List(list) => Ok(list.resolve()?),
            other => Err(EvalError::TypeError(format!(
                "Expected a sequence, found {}",
                other.kind_name()
            ))),
        }
    }

    fn call1(&self, lambda: &Lambda, item: &Value, context: &EvalContext) -> Result<Value, EvalError> {
        self.invoke_in(lambda, std::slice::from_ref(item), context)
    }

    fn matches(&self, predicate: Option<&Lambda>, item: &Value, context: &EvalContext) -> Result<bool, EvalError> {
        match predicate {
            Some(predicate) => Ok(self.call1(predicate, item, context)? == Value::Boolean(true)),
            None => Ok(true),
        }
    }

    fn eval_query(&self, query: &QueryExpression, ty: &TypeRef, context: &EvalContext) -> Result<Value, EvalError> {
        match query {
            QueryExpression::Source(node) => self.eval(node, context),
            QueryExpression::Where {
                source, predicate, ..
            } => self.method_where(source, predicate, context),
            QueryExpression::Select { source, selector, .. } => {
                let items = self.sequence(source, context)?;
                items
                    .iter()
                    .map(|item| self.call1(selector, item, context))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            QueryExpression::SelectMany { source, selector, .. } => {
                let mut result = Vec::new();
                for item in self.sequence(source, context)? {
                    let inner = self.call1(selector, &item, context)?;
                    result.extend(self.items(inner)?);
                }
                Ok(Value::Array(result))
            }
            QueryExpression::OrderBy { .. } | QueryExpression::ThenBy { .. } => {
                self.method_sort(query, context)
            }
            QueryExpression::GroupBy {
                source,
                key_selector,
                ..
            } => self.method_group_by(source, key_selector, context),
            QueryExpression::Take { source, count, .. } => {
                let count = self.count_arg(count, context)?;
                let items = self.sequence(source, context)?;
                Ok(Value::Array(items.into_iter().take(count).collect()))
            }
            QueryExpression::Skip { source, count, .. } => {
                let count = self.count_arg(count, context)?;
                let items = self.sequence(source, context)?;
                Ok(Value::Array(items.into_iter().skip(count).collect()))
            }
            QueryExpression::Distinct { source, .. } => {
                let mut result: Vec<Value> = Vec::new();
                for item in self.sequence(source, context)? {
                    if !result.iter().any(|seen| seen.loosely_equals(&item)) {
                        result.push(item);
                    }
                }
                Ok(Value::Array(result))
            }
            QueryExpression::OfType { source, ty, .. } => {
                let items = self.sequence(source, context)?;
                Ok(Value::Array(
                    items.into_iter().filter(|item| self.is_of_type(item, ty)).collect(),
                ))
            }
            QueryExpression::Cast { source, ty, .. } => self
                .sequence(source, context)?
                .into_iter()
                .map(|item| self.convert(item, ty))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            QueryExpression::Zip {
                source,
                source2,
                result_selector,
                ..
            } => {
                let first = self.sequence(source, context)?;
                let second = self.sequence(source2, context)?;
                first
                    .into_iter()
                    .zip(second)
                    .map(|(a, b)| self.invoke_in(result_selector, &[a, b], context))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            QueryExpression::DefaultIfEmpty { source, .. } => {
                let items = self.sequence(source, context)?;
                if items.is_empty() {
                    Ok(Value::Array(vec![Value::Null]))
                } else {
                    Ok(Value::Array(items))
                }
            }
            QueryExpression::Concat { source, source2, .. } => {
                let mut items = self.sequence(source, context)?;
                items.extend(self.sequence(source2, context)?);
                Ok(Value::Array(items))
            }
            QueryExpression::First {
                source,
                predicate,
                or_default,
                ..
            } => {
                for item in self.sequence(source, context)? {
                    if self.matches(predicate.as_ref(), &item, context)? {
                        return Ok(item);
                    }
                }
                if *or_default {
                    Ok(Value::Null)
                } else {
                    Err(EvalError::EmptySequence)
                }
            }
            QueryExpression::Single {
                source,
                predicate,
                or_default,
                ..
            } => {
                let mut found = None;
                for item in self.sequence(source, context)? {
                    if self.matches(predicate.as_ref(), &item, context)? {
                        if found.is_some() {
                            return Err(EvalError::MoreThanOneElement);
                        }
                        found = Some(item);
                    }
                }
                match found {
                    Some(item) => Ok(item),
                    None if *or_default => Ok(Value::Null),
                    None => Err(EvalError::EmptySequence),
                }
            }
            QueryExpression::Any {
                source, predicate, ..
            } => {
                for item in self.sequence(source, context)? {
                    if self.matches(predicate.as_ref(), &item, context)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            QueryExpression::All {
                source, predicate, ..
            } => {
                for item in self.sequence(source, context)? {
                    if !self.matches(Some(predicate), &item, context)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            QueryExpression::Count {
                source, predicate, ..
            } => {
                let mut count = 0i64;
                for item in self.sequence(source, context)? {
                    if self.matches(predicate.as_ref(), &item, context)? {
                        count += 1;
                    }
                }
                Ok(Value::Integer(count))
            }
            QueryExpression::Contains { source, item, .. } => {
                let needle = self.eval(item, context)?;
                let items = self.sequence(source, context)?;
                Ok(Value::Boolean(items.iter().any(|i| i.loosely_equals(&needle))))
            }
            QueryExpression::Aggregate {
                source,
                function,
                selector,
                ..
            } => {
                let mut values = Vec::new();
                for item in self.sequence(source, context)? {
                    let value = match selector {
                        Some(selector) => self.call1(selector, &item, context)?,
                        None => item,
                    };
                    values.push(value);
                }
                match function {
                    QueryMethod::Sum => method_sum(&values, ty),
                    QueryMethod::Min => method_extreme(&values, ty, Ordering::Less),
                    QueryMethod::Max => method_extreme(&values, ty, Ordering::Greater),
                    _ => method_average(&values, ty),
                }
            }
        }
    }

    fn count_arg(&self, count: &ExprRef, context: &EvalContext) -> Result<usize, EvalError> {
        let value = self.eval(count, context)?;
        value
            .as_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| EvalError::TypeError(format!("Invalid count {}", value.as_string())))
    }

    fn method_where(&self, source: &ExprRef, predicate: &Lambda, context: &EvalContext) -> Result<Value, EvalError> {
        let mut result = Vec::new();
        for item in self.sequence(source, context)? {
            if self.call1(predicate, &item, context)? == Value::Boolean(true) {
                result.push(item);
            }
        }
        Ok(Value::Array(result))
    }

    /// `OrderBy(...).ThenBy(...)...` as one stable sort on composite keys.
    fn method_sort(&self, query: &QueryExpression, context: &EvalContext) -> Result<Value, EvalError> {
        let mut stages = vec![query.clone()];
        let source = loop {
            let next = match stages.last() {
                Some(QueryExpression::ThenBy { source, .. }) => QueryExpression::wrap(source),
                Some(QueryExpression::OrderBy { source, .. }) => break source.clone(),
                _ => {
                    return Err(EvalError::TypeError(
                        "ThenBy must follow OrderBy".to_string(),
                    ));
                }
            };
            stages.push(next);
        };
        let keys: Vec<(&Lambda, bool)> = stages
            .iter()
            .rev()
            .filter_map(|stage| match stage {
                QueryExpression::OrderBy {
                    key_selector,
                    descending,
                    ..
                }
                | QueryExpression::ThenBy {
                    key_selector,
                    descending,
                    ..
                } => Some((key_selector, *descending)),
                _ => None,
            })
            .collect();

        let mut keyed = Vec::new();
        for item in self.sequence(&source, context)? {
            let key = keys
                .iter()
                .map(|(selector, _)| self.call1(selector, &item, context))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((key, item));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (index, (_, descending)) in keys.iter().enumerate() {
                let ordering = a[index].compare(&b[index]);
                let ordering = if *descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
    }

    fn method_group_by(&self, source: &ExprRef, key_selector: &Lambda, context: &EvalContext) -> Result<Value, EvalError> {
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in self.sequence(source, context)? {
            let key = self.call1(key_selector, &item, context)?;
            match groups.iter_mut().find(|(existing, _)| existing.loosely_equals(&key)) {
                Some((_, members)) => members.push(item),
                None => groups.push((key, vec![item])),
            }
        }
        Ok(Value::Array(
            groups
                .into_iter()
                .map(|(key, items)| Value::Grouping {
                    key: Box::new(key),
                    items,
                })
                .collect(),
        ))
    }
}

/// Arithmetic and comparison. Integers stay exact, decimals stay decimal,
/// and integer/float mixes go through `Decimal` to avoid binary noise.
fn apply_binop(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if op.is_comparison() {
        return Ok(Value::Boolean(compare_values(op, left, right)));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Subtract => a.checked_sub(*b),
                BinaryOp::Multiply => a.checked_mul(*b),
                BinaryOp::Divide | BinaryOp::Modulo if *b == 0 => {
                    return Err(EvalError::DivisionByZero);
                }
                BinaryOp::Divide => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Integer).ok_or(EvalError::Overflow)
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(op, *a, *b))),
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
                return Err(arith_error(op, left, right));
            };
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b.is_zero() => {
                    return Err(EvalError::DivisionByZero);
                }
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Decimal).ok_or(EvalError::Overflow)
        }
        (Value::Integer(a), Value::Float(b)) => Ok(mixed_op(op, Decimal::from_i64(*a), Decimal::from_f64(*b))
            .unwrap_or_else(|| Value::Float(float_op(op, *a as f64, *b)))),
        (Value::Float(a), Value::Integer(b)) => Ok(mixed_op(op, Decimal::from_f64(*a), Decimal::from_i64(*b))
            .unwrap_or_else(|| Value::Float(float_op(op, *a, *b as f64)))),
        (a, b) => Err(arith_error(op, a, b)),
    }
}

fn arith_error(op: BinaryOp, a: &Value, b: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "Cannot apply '{}' to {} and {}",
        op.symbol(),
        a.kind_name(),
        b.kind_name()
    ))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        _ => a % b,
    }
}

fn mixed_op(op: BinaryOp, a: Option<Decimal>, b: Option<Decimal>) -> Option<Value> {
    let (a, b) = (a?, b?);
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        _ => a.checked_rem(b),
    }?;
    result.to_f64().map(Value::Float)
}

/// Lifted comparison: ordering against `null` is false, `null == null`.
fn compare_values(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Equal => left.loosely_equals(right),
        BinaryOp::NotEqual => !left.loosely_equals(right),
        _ if left.is_null() || right.is_null() => false,
        BinaryOp::GreaterThan => left.compare(right) == Ordering::Greater,
        BinaryOp::GreaterThanOrEqual => left.compare(right) != Ordering::Less,
        BinaryOp::LessThan => left.compare(right) == Ordering::Less,
        _ => left.compare(right) != Ordering::Greater,
    }
}

fn apply_function(function: Function, args: &[Value]) -> Result<Value, EvalError> {
    if args.first().is_some_and(Value::is_null) && function != Function::Concat {
        return Ok(Value::Null);
    }
    let text = |index: usize| {
        args.get(index).and_then(Value::as_str).ok_or_else(|| {
            EvalError::TypeError(format!("{} expects a string argument", function.name()))
        })
    };
    let int = |index: usize| {
        args.get(index)
            .and_then(Value::as_int)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| EvalError::TypeError(format!("{} expects a non-negative index", function.name())))
    };

    match function {
        Function::StartsWith => Ok(Value::Boolean(text(0)?.starts_with(text(1)?))),
        Function::EndsWith => Ok(Value::Boolean(text(0)?.ends_with(text(1)?))),
        Function::Contains => Ok(Value::Boolean(text(0)?.contains(text(1)?))),
        Function::IndexOf => {
            let haystack = text(0)?;
            let index = haystack
                .find(text(1)?)
                .map(|byte| haystack[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Integer(index))
        }
        Function::ToLower => Ok(Value::String(text(0)?.to_lowercase())),
        Function::ToUpper => Ok(Value::String(text(0)?.to_uppercase())),
        Function::Trim => Ok(Value::String(text(0)?.trim().to_string())),
        Function::Concat => Ok(Value::String(
            args.iter()
                .filter(|arg| !arg.is_null())
                .map(Value::as_string)
                .collect(),
        )),
        Function::Substring => {
            let chars: Vec<char> = text(0)?.chars().collect();
            let start = int(1)?;
            let end = match args.get(2) {
                Some(_) => start.saturating_add(int(2)?),
                None => chars.len(),
            };
            if start > chars.len() || end > chars.len() {
                return Err(EvalError::AccessError(format!(
                    "Substring({}, {}) is out of range for length {}",
                    start,
                    end - start,
                    chars.len()
                )));
            }
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        Function::Replace => Ok(Value::String(text(0)?.replace(text(1)?, text(2)?))),
        Function::Round | Function::Floor | Function::Ceiling => match &args[..] {
            [Value::Decimal(d)] => Ok(Value::Decimal(match function {
                Function::Round => d.round(),
                Function::Floor => d.floor(),
                _ => d.ceil(),
            })),
            [Value::Float(f)] => Ok(Value::Float(match function {
                Function::Round => f.round_ties_even(),
                Function::Floor => f.floor(),
                _ => f.ceil(),
            })),
            [Value::Integer(n)] => Ok(Value::Integer(*n)),
            _ => Err(EvalError::TypeError(format!(
                "{} expects a number",
                function.name()
            ))),
        },
    }
}

fn zero_of(ty: &TypeRef) -> Value {
    match ty.underlying() {
        TypeRef::Decimal => Value::Decimal(Decimal::ZERO),
        TypeRef::Double => Value::Float(0.0),
        _ => Value::Integer(0),
    }
}

fn method_sum(values: &[Value], ty: &TypeRef) -> Result<Value, EvalError> {
    let mut total = zero_of(ty);
    for value in values.iter().filter(|v| !v.is_null()) {
        total = apply_binop(BinaryOp::Add, &total, value)?;
    }
    Ok(total)
}

fn method_extreme(values: &[Value], ty: &TypeRef, keep: Ordering) -> Result<Value, EvalError> {
    let mut best: Option<&Value> = None;
    for value in values.iter().filter(|v| !v.is_null()) {
        match best {
            Some(current) if value.compare(current) != keep => {}
            _ => best = Some(value),
        }
    }
    match best {
        Some(value) => Ok(value.clone()),
        None if ty.can_be_null() || ty.is_nullable() => Ok(Value::Null),
        None => Err(EvalError::EmptySequence),
    }
}

fn method_average(values: &[Value], ty: &TypeRef) -> Result<Value, EvalError> {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return if ty.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(EvalError::EmptySequence)
        };
    }
    let count = present.len();
    if ty.underlying() == &TypeRef::Decimal {
        let mut total = Decimal::ZERO;
        for value in &present {
            let d = value
                .as_decimal()
                .ok_or_else(|| EvalError::TypeError(format!("Cannot average {}", value.kind_name())))?;
            total = total.checked_add(d).ok_or(EvalError::Overflow)?;
        }
        return total
            .checked_div(Decimal::from(count))
            .map(Value::Decimal)
            .ok_or(EvalError::Overflow);
    }
    let mut total = 0.0;
    for value in &present {
        total += value
            .as_float()
            .ok_or_else(|| EvalError::TypeError(format!("Cannot average {}", value.kind_name())))?;
    }
    Ok(Value::Float(total / count as f64))
}

#[test]
fn test_mixed_arithmetic_avoids_float_noise() {
    let result = apply_binop(BinaryOp::Add, &Value::Integer(1), &Value::Float(0.1)).unwrap();
    assert_eq!(result, Value::Float(1.1));
    let result = apply_binop(BinaryOp::Divide, &Value::Integer(7), &Value::Integer(2)).unwrap();
    assert_eq!(result, Value::Integer(3));
    assert_eq!(
        apply_binop(BinaryOp::Modulo, &Value::Integer(1), &Value::Integer(0)),
        Err(EvalError::DivisionByZero)
    );
}
