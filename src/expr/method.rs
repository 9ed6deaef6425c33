use std::fmt;

/// Standard query operators, shared by the queryable and in-memory flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMethod {
    Where,
    Select,
    SelectMany,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    GroupBy,
    Take,
    Skip,
    Distinct,
    OfType,
    Cast,
    Zip,
    DefaultIfEmpty,
    Concat,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All,
    Count,
    Contains,
    Sum,
    Min,
    Max,
    Average,
}

impl QueryMethod {
    pub fn name(self) -> &'static str {
        match self {
            QueryMethod::Where => "Where",
            QueryMethod::Select => "Select",
            QueryMethod::SelectMany => "SelectMany",
            QueryMethod::OrderBy => "OrderBy",
            QueryMethod::OrderByDescending => "OrderByDescending",
            QueryMethod::ThenBy => "ThenBy",
            QueryMethod::ThenByDescending => "ThenByDescending",
            QueryMethod::GroupBy => "GroupBy",
            QueryMethod::Take => "Take",
            QueryMethod::Skip => "Skip",
            QueryMethod::Distinct => "Distinct",
            QueryMethod::OfType => "OfType",
            QueryMethod::Cast => "Cast",
            QueryMethod::Zip => "Zip",
            QueryMethod::DefaultIfEmpty => "DefaultIfEmpty",
            QueryMethod::Concat => "Concat",
            QueryMethod::First => "First",
            QueryMethod::FirstOrDefault => "FirstOrDefault",
            QueryMethod::Single => "Single",
            QueryMethod::SingleOrDefault => "SingleOrDefault",
            QueryMethod::Any => "Any",
            QueryMethod::All => "All",
            QueryMethod::Count => "Count",
            QueryMethod::Contains => "Contains",
            QueryMethod::Sum => "Sum",
            QueryMethod::Min => "Min",
            QueryMethod::Max => "Max",
            QueryMethod::Average => "Average",
        }
    }
}

/// Scalar helper functions reachable from the filter language.
///
/// Instance-style functions take their receiver as the first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    StartsWith,
    EndsWith,
    Contains,
    IndexOf,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Substring,
    Replace,
    Round,
    Floor,
    Ceiling,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::StartsWith => "StartsWith",
            Function::EndsWith => "EndsWith",
            Function::Contains => "Contains",
            Function::IndexOf => "IndexOf",
            Function::ToLower => "ToLower",
            Function::ToUpper => "ToUpper",
            Function::Trim => "Trim",
            Function::Concat => "Concat",
            Function::Substring => "Substring",
            Function::Replace => "Replace",
            Function::Round => "Round",
            Function::Floor => "Floor",
            Function::Ceiling => "Ceiling",
        }
    }

    /// Static functions render as `Type.Name(args)`, the rest as `arg0.Name(rest)`.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            Function::Concat | Function::Round | Function::Floor | Function::Ceiling
        )
    }
}

/// Identity of a called method. Two calls target the same method exactly
/// when their `Method` values are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Operator over an expression-backed source; lambda arguments are quoted.
    Queryable(QueryMethod),
    /// Operator over an in-memory sequence; lambda arguments are plain.
    Enumerable(QueryMethod),
    Func(Function),
    /// `dictionary[key]`
    DictionaryGet,
}

impl Method {
    pub fn query_method(self) -> Option<QueryMethod> {
        match self {
            Method::Queryable(m) | Method::Enumerable(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_queryable(self) -> bool {
        matches!(self, Method::Queryable(_))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Queryable(m) => write!(f, "Queryable.{}", m.name()),
            Method::Enumerable(m) => write!(f, "Enumerable.{}", m.name()),
            Method::Func(func) => f.write_str(func.name()),
            Method::DictionaryGet => f.write_str("get_Item"),
        }
    }
}
