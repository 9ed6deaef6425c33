//! Typed, immutable expression trees.
//!
//! Nodes are shared through [`ExprRef`] (`Arc<Expr>`). Nothing is edited in
//! place: rewriting rebuilds the spine above a change and keeps untouched
//! subtrees by pointer, so "did anything change?" is an `Arc::ptr_eq` check.

mod display;
pub mod method;

use std::sync::Arc;

pub use method::{Function, Method, QueryMethod};

use crate::{types::TypeRef, value::Value};

pub type ExprRef = Arc<Expr>;

/// A named, typed lambda (or root) parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Parameter {
            name: name.into(),
            ty,
        }
    }

    pub fn to_expr(&self) -> ExprRef {
        Arc::new(Expr::Parameter(self.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub body: ExprRef,
}

impl Lambda {
    pub fn new(parameters: Vec<Parameter>, body: ExprRef) -> Self {
        Lambda { parameters, body }
    }

    pub fn return_type(&self) -> TypeRef {
        self.body.ty()
    }

    pub fn ty(&self) -> TypeRef {
        TypeRef::Function(
            self.parameters.iter().map(|p| p.ty.clone()).collect(),
            Box::new(self.body.ty()),
        )
    }

    pub fn into_expr(self) -> ExprRef {
        Arc::new(Expr::Lambda(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    AndAlso,
    OrElse,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::AndAlso => "AndAlso",
            BinaryOp::OrElse => "OrElse",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Value conversion or reference cast; fails at runtime if impossible.
    Convert,
    /// Reference cast yielding `null` when the value is not of the type.
    TypeAs,
    /// Marks a lambda passed as data to a queryable operator.
    Quote,
}

/// Node kinds, used to key rewriters and for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant,
    Parameter,
    Member,
    Binary,
    Unary,
    Call,
    Lambda,
    Conditional,
    NewArray,
    New,
    TypeIs,
    Capture,
}

impl ExprKind {
    pub const ALL: [ExprKind; 12] = [
        ExprKind::Constant,
        ExprKind::Parameter,
        ExprKind::Member,
        ExprKind::Binary,
        ExprKind::Unary,
        ExprKind::Call,
        ExprKind::Lambda,
        ExprKind::Conditional,
        ExprKind::NewArray,
        ExprKind::New,
        ExprKind::TypeIs,
        ExprKind::Capture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExprKind::Constant => "Constant",
            ExprKind::Parameter => "Parameter",
            ExprKind::Member => "MemberAccess",
            ExprKind::Binary => "Binary",
            ExprKind::Unary => "Unary",
            ExprKind::Call => "Call",
            ExprKind::Lambda => "Lambda",
            ExprKind::Conditional => "Conditional",
            ExprKind::NewArray => "NewArrayInit",
            ExprKind::New => "New",
            ExprKind::TypeIs => "TypeIs",
            ExprKind::Capture => "Capture",
        }
    }
}

/// Typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: Value,
        ty: TypeRef,
    },
    Parameter(Parameter),
    Member {
        target: ExprRef,
        name: String,
        ty: TypeRef,
    },
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
        ty: TypeRef,
    },
    Unary {
        op: UnaryOp,
        operand: ExprRef,
        ty: TypeRef,
    },
    Call {
        method: Method,
        args: Vec<ExprRef>,
        ty: TypeRef,
    },
    Lambda(Lambda),
    Conditional {
        test: ExprRef,
        if_true: ExprRef,
        if_false: ExprRef,
        ty: TypeRef,
    },
    NewArray {
        element_type: TypeRef,
        items: Vec<ExprRef>,
    },
    /// Object construction: an anonymous record or a string-keyed
    /// dictionary, depending on `ty`.
    New {
        ty: TypeRef,
        members: Vec<(String, ExprRef)>,
    },
    TypeIs {
        operand: ExprRef,
        test_type: TypeRef,
    },
    /// Pattern placeholder that matches any subexpression of its type.
    Capture {
        name: String,
        ty: TypeRef,
    },
}

impl Expr {
    pub fn constant(value: Value, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Constant { value, ty })
    }

    pub fn null(ty: TypeRef) -> ExprRef {
        Expr::constant(Value::Null, ty)
    }

    pub fn parameter(name: impl Into<String>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Parameter(Parameter::new(name, ty)))
    }

    pub fn member(target: ExprRef, name: impl Into<String>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Member {
            target,
            name: name.into(),
            ty,
        })
    }

    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Binary {
            op,
            left,
            right,
            ty,
        })
    }

    pub fn unary(op: UnaryOp, operand: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Unary { op, operand, ty })
    }

    pub fn convert(operand: ExprRef, ty: TypeRef) -> ExprRef {
        Expr::unary(UnaryOp::Convert, operand, ty)
    }

    pub fn type_as(operand: ExprRef, ty: TypeRef) -> ExprRef {
        Expr::unary(UnaryOp::TypeAs, operand, ty)
    }

    pub fn quote(lambda: ExprRef) -> ExprRef {
        let ty = lambda.ty();
        Expr::unary(UnaryOp::Quote, lambda, ty)
    }

    pub fn call(method: Method, args: Vec<ExprRef>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Call { method, args, ty })
    }

    pub fn lambda(parameters: Vec<Parameter>, body: ExprRef) -> ExprRef {
        Lambda::new(parameters, body).into_expr()
    }

    pub fn conditional(test: ExprRef, if_true: ExprRef, if_false: ExprRef) -> ExprRef {
        let ty = if_true.ty();
        Arc::new(Expr::Conditional {
            test,
            if_true,
            if_false,
            ty,
        })
    }

    pub fn new_array(element_type: TypeRef, items: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::NewArray {
            element_type,
            items,
        })
    }

    pub fn new_object(ty: TypeRef, members: Vec<(String, ExprRef)>) -> ExprRef {
        Arc::new(Expr::New { ty, members })
    }

    pub fn type_is(operand: ExprRef, test_type: TypeRef) -> ExprRef {
        Arc::new(Expr::TypeIs { operand, test_type })
    }

    pub fn capture(name: impl Into<String>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Capture {
            name: name.into(),
            ty,
        })
    }

    /// Static type of the node.
    pub fn ty(&self) -> TypeRef {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Conditional { ty, .. }
            | Expr::New { ty, .. }
            | Expr::Capture { ty, .. } => ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Lambda(lambda) => lambda.ty(),
            Expr::NewArray { element_type, .. } => TypeRef::array(element_type.clone()),
            Expr::TypeIs { .. } => TypeRef::Boolean,
        }
    }

    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Constant { .. } => ExprKind::Constant,
            Expr::Parameter(_) => ExprKind::Parameter,
            Expr::Member { .. } => ExprKind::Member,
            Expr::Binary { .. } => ExprKind::Binary,
            Expr::Unary { .. } => ExprKind::Unary,
            Expr::Call { .. } => ExprKind::Call,
            Expr::Lambda(_) => ExprKind::Lambda,
            Expr::Conditional { .. } => ExprKind::Conditional,
            Expr::NewArray { .. } => ExprKind::NewArray,
            Expr::New { .. } => ExprKind::New,
            Expr::TypeIs { .. } => ExprKind::TypeIs,
            Expr::Capture { .. } => ExprKind::Capture,
        }
    }

    /// The lambda behind an optional `Quote`.
    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            Expr::Unary {
                op: UnaryOp::Quote,
                operand,
                ..
            } => operand.as_lambda(),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Constant { .. } | Expr::Parameter(_) | Expr::Capture { .. } => vec![],
            Expr::Member { target, .. } => vec![target],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } | Expr::TypeIs { operand, .. } => vec![operand],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => vec![test, if_true, if_false],
            Expr::NewArray { items, .. } => items.iter().collect(),
            Expr::New { members, .. } => members.iter().map(|(_, value)| value).collect(),
        }
    }

    /// Rebuilds `node` with every direct child passed through `f`.
    ///
    /// Returns `node` itself (same `Arc`) when `f` returned every child
    /// unchanged.
    pub fn map_children<E>(
        node: &ExprRef,
        mut f: impl FnMut(&ExprRef) -> Result<ExprRef, E>,
    ) -> Result<ExprRef, E> {
        let mut changed = false;
        let mut visit = |child: &ExprRef| -> Result<ExprRef, E> {
            let rewritten = f(child)?;
            if !Arc::ptr_eq(&rewritten, child) {
                changed = true;
            }
            Ok(rewritten)
        };

        let rebuilt = match node.as_ref() {
            Expr::Constant { .. } | Expr::Parameter(_) | Expr::Capture { .. } => {
                return Ok(node.clone());
            }
            Expr::Member { target, name, ty } => Expr::Member {
                target: visit(target)?,
                name: name.clone(),
                ty: ty.clone(),
            },
            Expr::Binary {
                op,
                left,
                right,
                ty,
            } => Expr::Binary {
                op: *op,
                left: visit(left)?,
                right: visit(right)?,
                ty: ty.clone(),
            },
            Expr::Unary { op, operand, ty } => Expr::Unary {
                op: *op,
                operand: visit(operand)?,
                ty: ty.clone(),
            },
            Expr::Call { method, args, ty } => Expr::Call {
                method: *method,
                args: args.iter().map(&mut visit).collect::<Result<_, _>>()?,
                ty: ty.clone(),
            },
            Expr::Lambda(lambda) => Expr::Lambda(Lambda {
                parameters: lambda.parameters.clone(),
                body: visit(&lambda.body)?,
            }),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => Expr::Conditional {
                test: visit(test)?,
                if_true: visit(if_true)?,
                if_false: visit(if_false)?,
                ty: ty.clone(),
            },
            Expr::NewArray {
                element_type,
                items,
            } => Expr::NewArray {
                element_type: element_type.clone(),
                items: items.iter().map(&mut visit).collect::<Result<_, _>>()?,
            },
            Expr::New { ty, members } => Expr::New {
                ty: ty.clone(),
                members: members
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), visit(value)?)))
                    .collect::<Result<_, E>>()?,
            },
            Expr::TypeIs { operand, test_type } => Expr::TypeIs {
                operand: visit(operand)?,
                test_type: test_type.clone(),
            },
        };

        if changed {
            Ok(Arc::new(rebuilt))
        } else {
            Ok(node.clone())
        }
    }

    /// Replaces parameter occurrences for which `f` yields a substitute.
    pub fn replace_parameters(
        node: &ExprRef,
        f: &dyn Fn(&Parameter) -> Option<ExprRef>,
    ) -> ExprRef {
        if let Expr::Parameter(p) = node.as_ref()
            && let Some(replacement) = f(p)
        {
            return replacement;
        }
        let result: Result<ExprRef, std::convert::Infallible> =
            Expr::map_children(node, |child| Ok(Expr::replace_parameters(child, f)));
        match result {
            Ok(rewritten) => rewritten,
            Err(never) => match never {},
        }
    }
}
