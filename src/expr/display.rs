use std::fmt;

use crate::{
    expr::{Expr, Lambda, Method, UnaryOp},
    types::TypeRef,
    value::Value,
};

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameters.as_slice() {
            [single] => write!(f, "{} => {}", single.name, self.body),
            params => {
                f.write_str("(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&p.name)?;
                }
                write!(f, ") => {}", self.body)
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: impl IntoIterator<Item = impl fmt::Display>) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_constant(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::String(s) => write!(f, "\"{}\"", s),
        Value::Guid(g) => write!(f, "{}", g),
        Value::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
        Value::Type(t) => write!(f, "typeof({})", t),
        Value::Array(items) => {
            f.write_str("value(")?;
            write_list(f, items.iter().map(|v| v.as_string()))?;
            f.write_str(")")
        }
        other => f.write_str(&other.as_string()),
    }
}

/// Renders trees in the familiar C# expression notation, e.g.
/// `_this => (_this.Number != 8)`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, .. } => write_constant(f, value),
            Expr::Parameter(p) => f.write_str(&p.name),
            Expr::Member { target, name, .. } => write!(f, "{}.{}", target, name),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, operand, ty } => match op {
                UnaryOp::Not => write!(f, "Not({})", operand),
                UnaryOp::Negate => write!(f, "-{}", operand),
                UnaryOp::Convert => write!(f, "Convert({}, {})", operand, ty),
                UnaryOp::TypeAs => write!(f, "({} As {})", operand, ty),
                UnaryOp::Quote => write!(f, "{}", operand),
            },
            Expr::Call { method, args, .. } => match method {
                Method::Queryable(m) | Method::Enumerable(m) => {
                    let (receiver, rest) = match args.split_first() {
                        Some((first, rest)) => (first.to_string(), rest),
                        None => (String::new(), &args[..]),
                    };
                    write!(f, "{}.{}(", receiver, m.name())?;
                    write_list(f, rest)?;
                    f.write_str(")")
                }
                Method::Func(func) if func.is_static() => {
                    let owner = if matches!(func.name(), "Concat") { "String" } else { "Math" };
                    write!(f, "{}.{}(", owner, func.name())?;
                    write_list(f, args)?;
                    f.write_str(")")
                }
                Method::Func(func) => {
                    let (receiver, rest) = match args.split_first() {
                        Some((first, rest)) => (first.to_string(), rest),
                        None => (String::new(), &args[..]),
                    };
                    write!(f, "{}.{}(", receiver, func.name())?;
                    write_list(f, rest)?;
                    f.write_str(")")
                }
                Method::DictionaryGet => match args.as_slice() {
                    [target, key] => write!(f, "{}.get_Item({})", target, key),
                    _ => f.write_str("get_Item(?)"),
                },
            },
            Expr::Lambda(lambda) => write!(f, "{}", lambda),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => write!(f, "IIF({}, {}, {})", test, if_true, if_false),
            Expr::NewArray {
                element_type,
                items,
            } => {
                write!(f, "new {}[] {{", element_type)?;
                write_list(f, items)?;
                f.write_str("}")
            }
            Expr::New { ty, members } => {
                match ty {
                    TypeRef::Dictionary(_) => f.write_str("new Dictionary`2() {")?,
                    _ => f.write_str("new <>f__AnonymousType(")?,
                }
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match ty {
                        TypeRef::Dictionary(_) => write!(f, "Void Add(String, Object)(\"{}\", {})", name, value)?,
                        _ => write!(f, "{} = {}", name, value)?,
                    }
                }
                match ty {
                    TypeRef::Dictionary(_) => f.write_str("}"),
                    _ => f.write_str(")"),
                }
            }
            Expr::TypeIs { operand, test_type } => write!(f, "({} Is {})", operand, test_type),
            Expr::Capture { name, ty } => write!(f, "capture<{}>({})", ty, name),
        }
    }
}
