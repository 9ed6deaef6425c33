//! Typed views over standard query operator calls.
//!
//! A query is just an expression: `Queryable.Where(source, x => ...)` and
//! friends, chained through their first argument. [`QueryExpression::wrap`]
//! recognises those calls and exposes their arguments by role (source,
//! predicate, selector, ...). The builder methods are the only way to
//! construct a call here, and they validate their arguments first, so every
//! call they produce wraps back to the same variant.
//!
//! ```text
//! critters.filter(x => x.Number > 3)?.order_by(x => x.Name)?.take(10)?
//! ```

use std::sync::Arc;

use crate::{
    error::QueryError,
    expr::{Expr, ExprRef, Lambda, Method, QueryMethod},
    types::TypeRef,
    value::Value,
};

/// A recognised query operator call, or the source it starts from.
///
/// Lambda arguments are stored unquoted; the underlying node keeps the
/// `Quote` wrapper that queryable operators carry.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    /// Anything that is not a recognised operator call.
    Source(ExprRef),
    Where {
        node: ExprRef,
        source: ExprRef,
        predicate: Lambda,
    },
    Select {
        node: ExprRef,
        source: ExprRef,
        selector: Lambda,
    },
    SelectMany {
        node: ExprRef,
        source: ExprRef,
        selector: Lambda,
    },
    OrderBy {
        node: ExprRef,
        source: ExprRef,
        key_selector: Lambda,
        descending: bool,
    },
    ThenBy {
        node: ExprRef,
        source: ExprRef,
        key_selector: Lambda,
        descending: bool,
    },
    GroupBy {
        node: ExprRef,
        source: ExprRef,
        key_selector: Lambda,
    },
    Take {
        node: ExprRef,
        source: ExprRef,
        count: ExprRef,
    },
    Skip {
        node: ExprRef,
        source: ExprRef,
        count: ExprRef,
    },
    Distinct {
        node: ExprRef,
        source: ExprRef,
    },
    OfType {
        node: ExprRef,
        source: ExprRef,
        ty: TypeRef,
    },
    Cast {
        node: ExprRef,
        source: ExprRef,
        ty: TypeRef,
    },
    Zip {
        node: ExprRef,
        source: ExprRef,
        source2: ExprRef,
        result_selector: Lambda,
    },
    DefaultIfEmpty {
        node: ExprRef,
        source: ExprRef,
    },
    Concat {
        node: ExprRef,
        source: ExprRef,
        source2: ExprRef,
    },
    /// `First`/`FirstOrDefault`
    First {
        node: ExprRef,
        source: ExprRef,
        predicate: Option<Lambda>,
        or_default: bool,
    },
    /// `Single`/`SingleOrDefault`
    Single {
        node: ExprRef,
        source: ExprRef,
        predicate: Option<Lambda>,
        or_default: bool,
    },
    Any {
        node: ExprRef,
        source: ExprRef,
        predicate: Option<Lambda>,
    },
    All {
        node: ExprRef,
        source: ExprRef,
        predicate: Lambda,
    },
    Count {
        node: ExprRef,
        source: ExprRef,
        predicate: Option<Lambda>,
    },
    Contains {
        node: ExprRef,
        source: ExprRef,
        item: ExprRef,
    },
    /// `Sum`, `Min`, `Max` and `Average`
    Aggregate {
        node: ExprRef,
        source: ExprRef,
        function: QueryMethod,
        selector: Option<Lambda>,
    },
}

impl QueryExpression {
    /// A query starting at `node` (a queryable or in-memory sequence).
    pub fn from_source(node: ExprRef) -> Self {
        QueryExpression::Source(node)
    }

    /// Recognises an operator call; anything else wraps as a source.
    pub fn wrap(node: &ExprRef) -> QueryExpression {
        recognise(node).unwrap_or_else(|| QueryExpression::Source(node.clone()))
    }

    /// The underlying expression.
    pub fn node(&self) -> &ExprRef {
        match self {
            QueryExpression::Source(node)
            | QueryExpression::Where { node, .. }
            | QueryExpression::Select { node, .. }
            | QueryExpression::SelectMany { node, .. }
            | QueryExpression::OrderBy { node, .. }
            | QueryExpression::ThenBy { node, .. }
            | QueryExpression::GroupBy { node, .. }
            | QueryExpression::Take { node, .. }
            | QueryExpression::Skip { node, .. }
            | QueryExpression::Distinct { node, .. }
            | QueryExpression::OfType { node, .. }
            | QueryExpression::Cast { node, .. }
            | QueryExpression::Zip { node, .. }
            | QueryExpression::DefaultIfEmpty { node, .. }
            | QueryExpression::Concat { node, .. }
            | QueryExpression::First { node, .. }
            | QueryExpression::Single { node, .. }
            | QueryExpression::Any { node, .. }
            | QueryExpression::All { node, .. }
            | QueryExpression::Count { node, .. }
            | QueryExpression::Contains { node, .. }
            | QueryExpression::Aggregate { node, .. } => node,
        }
    }

    pub fn into_node(self) -> ExprRef {
        self.node().clone()
    }

    pub fn ty(&self) -> TypeRef {
        self.node().ty()
    }

    /// The operator behind this node, `None` for a source.
    pub fn method(&self) -> Option<QueryMethod> {
        match self.node().as_ref() {
            Expr::Call { method, .. } if !matches!(self, QueryExpression::Source(_)) => {
                method.query_method()
            }
            _ => None,
        }
    }

    /// The previous stage of the chain.
    pub fn source(&self) -> Option<QueryExpression> {
        self.source_node().map(QueryExpression::wrap)
    }

    pub fn source_node(&self) -> Option<&ExprRef> {
        match self {
            QueryExpression::Source(_) => None,
            QueryExpression::Where { source, .. }
            | QueryExpression::Select { source, .. }
            | QueryExpression::SelectMany { source, .. }
            | QueryExpression::OrderBy { source, .. }
            | QueryExpression::ThenBy { source, .. }
            | QueryExpression::GroupBy { source, .. }
            | QueryExpression::Take { source, .. }
            | QueryExpression::Skip { source, .. }
            | QueryExpression::Distinct { source, .. }
            | QueryExpression::OfType { source, .. }
            | QueryExpression::Cast { source, .. }
            | QueryExpression::Zip { source, .. }
            | QueryExpression::DefaultIfEmpty { source, .. }
            | QueryExpression::Concat { source, .. }
            | QueryExpression::First { source, .. }
            | QueryExpression::Single { source, .. }
            | QueryExpression::Any { source, .. }
            | QueryExpression::All { source, .. }
            | QueryExpression::Count { source, .. }
            | QueryExpression::Contains { source, .. }
            | QueryExpression::Aggregate { source, .. } => Some(source),
        }
    }

    /// Second input of `Zip` and `Concat`.
    pub fn source2(&self) -> Option<QueryExpression> {
        match self {
            QueryExpression::Zip { source2, .. } | QueryExpression::Concat { source2, .. } => {
                Some(QueryExpression::wrap(source2))
            }
            _ => None,
        }
    }

    /// Predicate of `Where`, `Any`, `All`, `Count`, `First` and `Single`.
    pub fn predicate(&self) -> Option<&Lambda> {
        match self {
            QueryExpression::Where { predicate, .. } | QueryExpression::All { predicate, .. } => {
                Some(predicate)
            }
            QueryExpression::Any { predicate, .. }
            | QueryExpression::Count { predicate, .. }
            | QueryExpression::First { predicate, .. }
            | QueryExpression::Single { predicate, .. } => predicate.as_ref(),
            _ => None,
        }
    }

    /// Selector of `Select`, `SelectMany` and aggregates.
    pub fn selector(&self) -> Option<&Lambda> {
        match self {
            QueryExpression::Select { selector, .. }
            | QueryExpression::SelectMany { selector, .. } => Some(selector),
            QueryExpression::Aggregate { selector, .. } => selector.as_ref(),
            _ => None,
        }
    }

    pub fn key_selector(&self) -> Option<&Lambda> {
        match self {
            QueryExpression::OrderBy { key_selector, .. }
            | QueryExpression::ThenBy { key_selector, .. }
            | QueryExpression::GroupBy { key_selector, .. } => Some(key_selector),
            _ => None,
        }
    }

    /// Constant count of `Take`/`Skip`, when it is a constant.
    pub fn count(&self) -> Option<i64> {
        match self {
            QueryExpression::Take { count, .. } | QueryExpression::Skip { count, .. } => {
                count.as_constant().and_then(Value::as_int)
            }
            _ => None,
        }
    }

    /// The chain from its source to this node, innermost first.
    pub fn chain(&self) -> Vec<QueryExpression> {
        let mut stages = vec![self.clone()];
        let mut current = self.source();
        while let Some(stage) = current {
            current = stage.source();
            stages.push(stage);
        }
        stages.reverse();
        stages
    }

    /// Rebuilds this node with every child passed through `f`.
    ///
    /// Returns `self` unchanged (same node) when no child changed identity.
    pub fn visit_children<E>(
        &self,
        f: impl FnMut(&ExprRef) -> Result<ExprRef, E>,
    ) -> Result<QueryExpression, E> {
        let node = self.node();
        let rebuilt = Expr::map_children(node, f)?;
        if Arc::ptr_eq(&rebuilt, node) {
            Ok(self.clone())
        } else {
            Ok(QueryExpression::wrap(&rebuilt))
        }
    }

    // Builders

    pub fn filter(&self, predicate: Lambda) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("Where")?;
        check_predicate("Where", &predicate, &element)?;
        let ty = self.ty();
        Ok(self.build(QueryMethod::Where, vec![], Some(predicate), ty))
    }

    pub fn select(&self, selector: Lambda) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("Select")?;
        check_lambda("Select", &selector, &[element])?;
        let ty = self.ty().sequence_like(selector.return_type());
        Ok(self.build(QueryMethod::Select, vec![], Some(selector), ty))
    }

    pub fn select_many(&self, selector: Lambda) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("SelectMany")?;
        check_lambda("SelectMany", &selector, &[element])?;
        let Some(inner) = selector.return_type().element_type().cloned() else {
            return Err(QueryError::InvalidArgument {
                operator: "SelectMany",
                message: format!("selector must return a sequence, found {}", selector.return_type()),
            });
        };
        let ty = self.ty().sequence_like(inner);
        Ok(self.build(QueryMethod::SelectMany, vec![], Some(selector), ty))
    }

    pub fn order_by(&self, key_selector: Lambda) -> Result<QueryExpression, QueryError> {
        self.ordered(QueryMethod::OrderBy, "OrderBy", key_selector)
    }

    pub fn order_by_descending(&self, key_selector: Lambda) -> Result<QueryExpression, QueryError> {
        self.ordered(QueryMethod::OrderByDescending, "OrderByDescending", key_selector)
    }

    pub fn then_by(&self, key_selector: Lambda) -> Result<QueryExpression, QueryError> {
        self.require_ordered("ThenBy")?;
        self.ordered(QueryMethod::ThenBy, "ThenBy", key_selector)
    }

    pub fn then_by_descending(&self, key_selector: Lambda) -> Result<QueryExpression, QueryError> {
        self.require_ordered("ThenByDescending")?;
        self.ordered(QueryMethod::ThenByDescending, "ThenByDescending", key_selector)
    }

    pub fn group_by(&self, key_selector: Lambda) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("GroupBy")?;
        check_lambda("GroupBy", &key_selector, &[element.clone()])?;
        let group = TypeRef::Grouping(Box::new(key_selector.return_type()), Box::new(element));
        let ty = self.ty().sequence_like(group);
        Ok(self.build(QueryMethod::GroupBy, vec![], Some(key_selector), ty))
    }

    pub fn take(&self, count: i32) -> Result<QueryExpression, QueryError> {
        self.paged(QueryMethod::Take, "Take", count)
    }

    pub fn skip(&self, count: i32) -> Result<QueryExpression, QueryError> {
        self.paged(QueryMethod::Skip, "Skip", count)
    }

    pub fn distinct(&self) -> Result<QueryExpression, QueryError> {
        self.element_type("Distinct")?;
        let ty = self.ty();
        Ok(self.build(QueryMethod::Distinct, vec![], None, ty))
    }

    pub fn default_if_empty(&self) -> Result<QueryExpression, QueryError> {
        self.element_type("DefaultIfEmpty")?;
        let ty = self.ty();
        Ok(self.build(QueryMethod::DefaultIfEmpty, vec![], None, ty))
    }

    pub fn of_type(&self, ty: TypeRef) -> Result<QueryExpression, QueryError> {
        self.element_type("OfType")?;
        let result = self.ty().sequence_like(ty.clone());
        let arg = Expr::constant(Value::Type(ty), TypeRef::Type);
        Ok(self.build(QueryMethod::OfType, vec![arg], None, result))
    }

    pub fn cast(&self, ty: TypeRef) -> Result<QueryExpression, QueryError> {
        self.element_type("Cast")?;
        let result = self.ty().sequence_like(ty.clone());
        let arg = Expr::constant(Value::Type(ty), TypeRef::Type);
        Ok(self.build(QueryMethod::Cast, vec![arg], None, result))
    }

    pub fn zip(&self, other: &QueryExpression, result_selector: Lambda) -> Result<QueryExpression, QueryError> {
        let first = self.element_type("Zip")?;
        let second = other.element_type("Zip")?;
        check_lambda("Zip", &result_selector, &[first, second])?;
        let ty = self.ty().sequence_like(result_selector.return_type());
        Ok(self.build(
            QueryMethod::Zip,
            vec![other.node().clone()],
            Some(result_selector),
            ty,
        ))
    }

    pub fn concat(&self, other: &QueryExpression) -> Result<QueryExpression, QueryError> {
        let first = self.element_type("Concat")?;
        let second = other.element_type("Concat")?;
        if first != second {
            return Err(QueryError::ParameterType {
                operator: "Concat",
                expected: first.to_string(),
                found: second.to_string(),
            });
        }
        let ty = self.ty();
        Ok(self.build(QueryMethod::Concat, vec![other.node().clone()], None, ty))
    }

    pub fn first(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.element_query(QueryMethod::First, "First", predicate)
    }

    pub fn first_or_default(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.element_query(QueryMethod::FirstOrDefault, "FirstOrDefault", predicate)
    }

    pub fn single(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.element_query(QueryMethod::Single, "Single", predicate)
    }

    pub fn single_or_default(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.element_query(QueryMethod::SingleOrDefault, "SingleOrDefault", predicate)
    }

    pub fn any(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("Any")?;
        if let Some(predicate) = &predicate {
            check_predicate("Any", predicate, &element)?;
        }
        Ok(self.build(QueryMethod::Any, vec![], predicate, TypeRef::Boolean))
    }

    pub fn all(&self, predicate: Lambda) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("All")?;
        check_predicate("All", &predicate, &element)?;
        Ok(self.build(QueryMethod::All, vec![], Some(predicate), TypeRef::Boolean))
    }

    pub fn count_where(&self, predicate: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("Count")?;
        if let Some(predicate) = &predicate {
            check_predicate("Count", predicate, &element)?;
        }
        Ok(self.build(QueryMethod::Count, vec![], predicate, TypeRef::Int32))
    }

    pub fn contains(&self, item: ExprRef) -> Result<QueryExpression, QueryError> {
        let element = self.element_type("Contains")?;
        if item.ty().underlying() != element.underlying() && item.ty() != TypeRef::Null {
            return Err(QueryError::ParameterType {
                operator: "Contains",
                expected: element.to_string(),
                found: item.ty().to_string(),
            });
        }
        Ok(self.build(QueryMethod::Contains, vec![item], None, TypeRef::Boolean))
    }

    pub fn sum(&self, selector: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.aggregate(QueryMethod::Sum, "Sum", selector)
    }

    pub fn min(&self, selector: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.aggregate(QueryMethod::Min, "Min", selector)
    }

    pub fn max(&self, selector: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.aggregate(QueryMethod::Max, "Max", selector)
    }

    pub fn average(&self, selector: Option<Lambda>) -> Result<QueryExpression, QueryError> {
        self.aggregate(QueryMethod::Average, "Average", selector)
    }

    fn element_type(&self, operator: &'static str) -> Result<TypeRef, QueryError> {
        let ty = self.ty();
        ty.element_type()
            .cloned()
            .ok_or_else(|| QueryError::NotASequence {
                operator,
                found: ty.to_string(),
            })
    }

    fn require_ordered(&self, operator: &'static str) -> Result<(), QueryError> {
        match self {
            QueryExpression::OrderBy { .. } | QueryExpression::ThenBy { .. } => Ok(()),
            _ => Err(QueryError::InvalidArgument {
                operator,
                message: "source must be ordered (OrderBy or ThenBy)".to_string(),
            }),
        }
    }

    fn ordered(
        &self,
        method: QueryMethod,
        operator: &'static str,
        key_selector: Lambda,
    ) -> Result<QueryExpression, QueryError> {
        let element = self.element_type(operator)?;
        check_lambda(operator, &key_selector, &[element])?;
        let ty = self.ty();
        Ok(self.build(method, vec![], Some(key_selector), ty))
    }

    fn paged(&self, method: QueryMethod, operator: &'static str, count: i32) -> Result<QueryExpression, QueryError> {
        self.element_type(operator)?;
        if count < 0 {
            return Err(QueryError::InvalidArgument {
                operator,
                message: format!("count must not be negative, found {}", count),
            });
        }
        let count = Expr::constant(Value::Integer(count.into()), TypeRef::Int32);
        let ty = self.ty();
        Ok(self.build(method, vec![count], None, ty))
    }

    fn element_query(
        &self,
        method: QueryMethod,
        operator: &'static str,
        predicate: Option<Lambda>,
    ) -> Result<QueryExpression, QueryError> {
        let element = self.element_type(operator)?;
        if let Some(predicate) = &predicate {
            check_predicate(operator, predicate, &element)?;
        }
        Ok(self.build(method, vec![], predicate, element))
    }

    fn aggregate(
        &self,
        method: QueryMethod,
        operator: &'static str,
        selector: Option<Lambda>,
    ) -> Result<QueryExpression, QueryError> {
        let element = self.element_type(operator)?;
        let value_type = match &selector {
            Some(selector) => {
                check_lambda(operator, selector, &[element])?;
                selector.return_type()
            }
            None => element,
        };
        let numeric_only = matches!(method, QueryMethod::Sum | QueryMethod::Average);
        if numeric_only && !value_type.is_numeric() {
            return Err(QueryError::InvalidArgument {
                operator,
                message: format!("values must be numeric, found {}", value_type),
            });
        }
        let ty = match method {
            QueryMethod::Average if value_type.underlying() == &TypeRef::Decimal => value_type,
            QueryMethod::Average if value_type.is_nullable() => TypeRef::Double.nullable(),
            QueryMethod::Average => TypeRef::Double,
            _ => value_type,
        };
        Ok(self.build(method, vec![], selector, ty))
    }

    /// `Method(source, extra..., lambda?)`, quoting the lambda for
    /// queryable sources.
    fn build(
        &self,
        method: QueryMethod,
        extra: Vec<ExprRef>,
        lambda: Option<Lambda>,
        ty: TypeRef,
    ) -> QueryExpression {
        let source = self.node().clone();
        let queryable = source.ty().is_queryable();
        let mut args = Vec::with_capacity(extra.len() + 2);
        args.push(source);
        args.extend(extra);
        if let Some(lambda) = lambda {
            let lambda = lambda.into_expr();
            args.push(if queryable { Expr::quote(lambda) } else { lambda });
        }
        let method = if queryable {
            Method::Queryable(method)
        } else {
            Method::Enumerable(method)
        };
        QueryExpression::wrap(&Expr::call(method, args, ty))
    }
}

fn check_lambda(operator: &'static str, lambda: &Lambda, parameters: &[TypeRef]) -> Result<(), QueryError> {
    if lambda.parameters.len() != parameters.len() {
        return Err(QueryError::LambdaArity {
            operator,
            expected: parameters.len(),
        });
    }
    for (parameter, expected) in lambda.parameters.iter().zip(parameters) {
        if &parameter.ty != expected {
            return Err(QueryError::ParameterType {
                operator,
                expected: expected.to_string(),
                found: parameter.ty.to_string(),
            });
        }
    }
    Ok(())
}

fn check_predicate(operator: &'static str, predicate: &Lambda, element: &TypeRef) -> Result<(), QueryError> {
    check_lambda(operator, predicate, std::slice::from_ref(element))?;
    if predicate.return_type().underlying() != &TypeRef::Boolean {
        return Err(QueryError::NotAPredicate {
            operator,
            found: predicate.return_type().to_string(),
        });
    }
    Ok(())
}

fn lambda_arg(arg: &ExprRef) -> Option<Lambda> {
    arg.as_lambda().cloned()
}

fn type_arg(arg: &ExprRef) -> Option<TypeRef> {
    match arg.as_constant() {
        Some(Value::Type(ty)) => Some(ty.clone()),
        _ => None,
    }
}

/// Reads a call's arguments by position; `None` when the shape is not a
/// known operator shape.
fn recognise(node: &ExprRef) -> Option<QueryExpression> {
    let Expr::Call { method, args, .. } = node.as_ref() else {
        return None;
    };
    let query_method = method.query_method()?;
    let (source, rest) = args.split_first()?;
    let node = node.clone();
    let source = source.clone();

    let expression = match (query_method, rest) {
        (QueryMethod::Where, [predicate]) => QueryExpression::Where {
            node,
            source,
            predicate: lambda_arg(predicate)?,
        },
        (QueryMethod::Select, [selector]) => QueryExpression::Select {
            node,
            source,
            selector: lambda_arg(selector)?,
        },
        (QueryMethod::SelectMany, [selector]) => QueryExpression::SelectMany {
            node,
            source,
            selector: lambda_arg(selector)?,
        },
        (QueryMethod::OrderBy | QueryMethod::OrderByDescending, [key]) => QueryExpression::OrderBy {
            node,
            source,
            key_selector: lambda_arg(key)?,
            descending: query_method == QueryMethod::OrderByDescending,
        },
        (QueryMethod::ThenBy | QueryMethod::ThenByDescending, [key]) => QueryExpression::ThenBy {
            node,
            source,
            key_selector: lambda_arg(key)?,
            descending: query_method == QueryMethod::ThenByDescending,
        },
        (QueryMethod::GroupBy, [key]) => QueryExpression::GroupBy {
            node,
            source,
            key_selector: lambda_arg(key)?,
        },
        (QueryMethod::Take, [count]) => QueryExpression::Take {
            node,
            source,
            count: count.clone(),
        },
        (QueryMethod::Skip, [count]) => QueryExpression::Skip {
            node,
            source,
            count: count.clone(),
        },
        (QueryMethod::Distinct, []) => QueryExpression::Distinct { node, source },
        (QueryMethod::DefaultIfEmpty, []) => QueryExpression::DefaultIfEmpty { node, source },
        (QueryMethod::OfType, [ty]) => QueryExpression::OfType {
            node,
            source,
            ty: type_arg(ty)?,
        },
        (QueryMethod::Cast, [ty]) => QueryExpression::Cast {
            node,
            source,
            ty: type_arg(ty)?,
        },
        (QueryMethod::Zip, [source2, selector]) => QueryExpression::Zip {
            node,
            source,
            source2: source2.clone(),
            result_selector: lambda_arg(selector)?,
        },
        (QueryMethod::Concat, [source2]) => QueryExpression::Concat {
            node,
            source,
            source2: source2.clone(),
        },
        (QueryMethod::First | QueryMethod::FirstOrDefault, rest) if rest.len() <= 1 => {
            QueryExpression::First {
                node,
                source,
                predicate: optional_lambda(rest)?,
                or_default: query_method == QueryMethod::FirstOrDefault,
            }
        }
        (QueryMethod::Single | QueryMethod::SingleOrDefault, rest) if rest.len() <= 1 => {
            QueryExpression::Single {
                node,
                source,
                predicate: optional_lambda(rest)?,
                or_default: query_method == QueryMethod::SingleOrDefault,
            }
        }
        (QueryMethod::Any, rest) if rest.len() <= 1 => QueryExpression::Any {
            node,
            source,
            predicate: optional_lambda(rest)?,
        },
        (QueryMethod::All, [predicate]) => QueryExpression::All {
            node,
            source,
            predicate: lambda_arg(predicate)?,
        },
        (QueryMethod::Count, rest) if rest.len() <= 1 => QueryExpression::Count {
            node,
            source,
            predicate: optional_lambda(rest)?,
        },
        (QueryMethod::Contains, [item]) => QueryExpression::Contains {
            node,
            source,
            item: item.clone(),
        },
        (
            QueryMethod::Sum | QueryMethod::Min | QueryMethod::Max | QueryMethod::Average,
            rest,
        ) if rest.len() <= 1 => QueryExpression::Aggregate {
            node,
            source,
            function: query_method,
            selector: optional_lambda(rest)?,
        },
        _ => return None,
    };
    Some(expression)
}

/// `Some(None)` for no argument, `None` when the argument is not a lambda.
fn optional_lambda(rest: &[ExprRef]) -> Option<Option<Lambda>> {
    match rest {
        [] => Some(None),
        [lambda] => lambda_arg(lambda).map(Some),
        _ => None,
    }
}

#[test]
fn test_wrap_non_call_is_source() {
    let node = Expr::parameter("critters", TypeRef::queryable(TypeRef::structured("Critter")));
    let wrapped = QueryExpression::wrap(&node);
    assert_eq!(wrapped, QueryExpression::Source(node));
    assert!(wrapped.source().is_none());
    assert!(wrapped.method().is_none());
}
